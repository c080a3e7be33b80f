// ==============================================================================
// genome23andme.rs - 23andMe Raw Data Parser
// ==============================================================================
// Description: Streaming parser for 23andMe raw genome data (plain or gzip)
// Author: Matt Barham
// Created: 2025-11-04
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================
// Format: Tab-delimited text with header comments
// Example:
//   # rsid    chromosome    position    genotype
//   rs548049170    1    69869    TT
//   rs13328684    1    74792    --
//   rs9283150    1    565508    AA
// ==============================================================================

use flate2::read::MultiGzDecoder;
use std::io::{BufRead, BufReader, Read};
use thiserror::Error;
use tracing::debug;

use crate::genotype::normalize_genotype;
use crate::models::{CallSequence, GenomeCall};

/// Gzip magic number (same check as the upload validator)
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const FIELD_COUNT: usize = 4;

/// Errors that can occur while reading a genome stream
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Unreadable input: {0}")]
    UnreadableInput(String),
}

impl From<std::io::Error> for InputError {
    fn from(err: std::io::Error) -> Self {
        InputError::UnreadableInput(err.to_string())
    }
}

/// Parser for 23andMe raw genome files
#[derive(Debug, Clone, Copy, Default)]
pub struct Genome23Parser;

impl Genome23Parser {
    pub fn new() -> Self {
        Self
    }

    /// Open a raw byte stream, transparently decompressing gzip input
    ///
    /// Compression is detected from the first two bytes, not a file name.
    pub fn open<'a, R: Read + 'a>(
        &self,
        raw: R,
    ) -> Result<CallReader<BufReader<Box<dyn Read + 'a>>>, InputError> {
        let mut buffered = BufReader::new(raw);
        let is_gzipped = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);

        let stream: Box<dyn Read + 'a> = if is_gzipped {
            Box::new(MultiGzDecoder::new(buffered))
        } else {
            Box::new(buffered)
        };
        debug!("Opened genome stream (gzip: {})", is_gzipped);

        Ok(CallReader::new(BufReader::new(stream)))
    }

    /// Drain a byte stream into an ordered call sequence
    ///
    /// # Returns
    /// * `Ok(CallSequence)` - Calls in input order plus skip counters
    /// * `Err(InputError::UnreadableInput)` - Stream could not be read or decompressed
    ///
    /// Comment lines ('#'), blank lines and malformed lines never abort the parse.
    pub fn parse<R: Read>(&self, raw: R) -> Result<CallSequence, InputError> {
        let mut reader = self.open(raw)?;
        let mut calls = Vec::new();
        for call in reader.by_ref() {
            calls.push(call?);
        }

        debug!(
            "Parsed {} calls ({} malformed, {} comments, {} blank)",
            calls.len(),
            reader.malformed_count(),
            reader.comment_count(),
            reader.blank_count()
        );

        Ok(CallSequence::with_counts(
            calls,
            reader.malformed_count(),
            reader.comment_count(),
            reader.blank_count(),
        ))
    }
}

/// Parse a raw byte stream with the default parser
pub fn parse<R: Read>(raw: R) -> Result<CallSequence, InputError> {
    Genome23Parser::new().parse(raw)
}

/// Parse an in-memory upload with the default parser
pub fn parse_bytes(bytes: &[u8]) -> Result<CallSequence, InputError> {
    parse(bytes)
}

/// Lazy, single-pass sequence of genome calls
///
/// Yields `Err` once if the underlying stream fails, then ends.
pub struct CallReader<R> {
    reader: R,
    buffer: Vec<u8>,
    lines_read: u64,
    malformed: u64,
    comments: u64,
    blanks: u64,
    finished: bool,
}

impl<R: BufRead> CallReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(128),
            lines_read: 0,
            malformed: 0,
            comments: 0,
            blanks: 0,
            finished: false,
        }
    }

    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    pub fn comment_count(&self) -> u64 {
        self.comments
    }

    pub fn blank_count(&self) -> u64 {
        self.blanks
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    fn classify(&mut self, line: &str) -> Option<GenomeCall> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            self.blanks += 1;
            return None;
        }
        if trimmed.starts_with('#') {
            self.comments += 1;
            return None;
        }

        let call = parse_line(line);
        if call.is_none() {
            debug!("Skipping malformed line {}", self.lines_read);
            self.malformed += 1;
        }
        call
    }
}

impl<R: BufRead> Iterator for CallReader<R> {
    type Item = Result<GenomeCall, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.buffer.clear();
            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => self.finished = true,
                Ok(_) => {
                    self.lines_read += 1;
                    let call = match std::str::from_utf8(&self.buffer) {
                        Ok(text) => {
                            let line = text.trim_end_matches(['\n', '\r']).to_string();
                            self.classify(&line)
                        }
                        Err(_) => {
                            self.malformed += 1;
                            None
                        }
                    };
                    if call.is_some() {
                        return call.map(Ok);
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }
        None
    }
}

/// Parse a single data line; None when the line is malformed
fn parse_line(line: &str) -> Option<GenomeCall> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != FIELD_COUNT {
        return None;
    }

    let rsid = fields[0].trim();
    let chromosome = fields[1].trim();
    let position = fields[2].trim().parse::<u64>().ok()?;
    let genotype = normalize_genotype(fields[3]);

    if rsid.is_empty() || chromosome.is_empty() || genotype.is_empty() {
        return None;
    }

    Some(GenomeCall {
        rsid: rsid.to_string(),
        chromosome: chromosome.to_string(),
        position,
        genotype,
    })
}
