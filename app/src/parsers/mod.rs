// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Parsers for personal genome files and reference corpus content
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

pub mod genome23andme;
pub mod snpedia;

pub use genome23andme::{parse, parse_bytes, CallReader, Genome23Parser, InputError, GZIP_MAGIC};
pub use snpedia::{RecordError, SnpediaParser};
