// ==============================================================================
// snpedia.rs - SNPedia Wiki Markup Parser
// ==============================================================================
// Description: Extracts annotation fields from SNPedia-style page content
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Recognized markup:
//   {{Rsnum|rs53576|A|G|Slightly more empathetic}}   genotype interpretation
//   magnitude = 2.5                                   significance score
//   repute = Good                                     polarity
//   summary = Oxytocin receptor                       free text
//   PMID 12345678 / PMID:12345678                     references
// ==============================================================================

use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::genotype::{normalize_genotype, normalize_rsid};
use crate::models::{Repute, VariantRecord};

/// A single corpus record that could not be turned into a VariantRecord
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Record has an empty identifier")]
    MissingIdentifier,

    #[error("Record {rsid} has no content")]
    EmptyContent { rsid: String },

    #[error("Record {rsid} has an invalid magnitude: '{value}'")]
    InvalidMagnitude { rsid: String, value: String },
}

/// Compiled field extractors for wiki page content
#[derive(Debug, Clone)]
pub struct SnpediaParser {
    genotype: Regex,
    magnitude: Regex,
    repute: Regex,
    summary: Regex,
    pmid: Regex,
}

impl Default for SnpediaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SnpediaParser {
    pub fn new() -> Self {
        // Patterns are literals; failure to compile is a programming error
        Self {
            genotype: Regex::new(r"\{\{Rsnum\|([^|]+)\|([^|]+)\|([^|}]+)(?:\|([^}]*))?\}\}")
                .expect("genotype pattern"),
            magnitude: Regex::new(r"[Mm]agnitude\s*=\s*([^|\n}]*)").expect("magnitude pattern"),
            repute: Regex::new(r"[Rr]epute\s*=\s*([^|\n}]+)").expect("repute pattern"),
            summary: Regex::new(r"[Ss]ummary\s*=\s*([^|\n}]+)").expect("summary pattern"),
            pmid: Regex::new(r"PMID[:\s]*(\d+)").expect("pmid pattern"),
        }
    }

    /// Parse one `(rsid, content)` row into a VariantRecord
    pub fn parse_record(&self, rsid: &str, content: &str) -> Result<VariantRecord, RecordError> {
        let rsid = normalize_rsid(rsid);
        if rsid.is_empty() {
            return Err(RecordError::MissingIdentifier);
        }
        if content.trim().is_empty() {
            return Err(RecordError::EmptyContent { rsid });
        }

        let magnitude = match self.capture(&self.magnitude, content) {
            Some(raw) if !raw.is_empty() => match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => Some(value),
                _ => {
                    return Err(RecordError::InvalidMagnitude {
                        rsid,
                        value: raw.to_string(),
                    })
                }
            },
            _ => None,
        };

        let repute = self
            .capture(&self.repute, content)
            .map(Repute::from_text)
            .unwrap_or_default();

        let summary = self
            .capture(&self.summary, content)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let mut genotypes = BTreeMap::new();
        for caps in self.genotype.captures_iter(content) {
            let alleles = normalize_genotype(&format!("{}{}", &caps[2], &caps[3]));
            let text = caps.get(4).map(|m| m.as_str().trim()).unwrap_or_default();
            genotypes.entry(alleles).or_insert_with(|| text.to_string());
        }

        let references = self
            .pmid
            .captures_iter(content)
            .map(|caps| caps[1].to_string())
            .collect();

        Ok(VariantRecord {
            rsid,
            summary,
            magnitude,
            repute,
            genotypes,
            references,
        })
    }

    fn capture<'a>(&self, pattern: &Regex, content: &'a str) -> Option<&'a str> {
        pattern
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
    }
}
