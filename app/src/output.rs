// ==============================================================================
// output.rs - Result Export
// ==============================================================================
// Description: Serializes an AnalysisResult to JSON or TSV for delivery
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================
// Formats:
//   - JSON: every field of the result, pretty-printed, fixed field order
//   - TSV: header + one row per finding
//          identifier  genotype  magnitude  repute  summary
// Export is pure: the same result always yields the same bytes.
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::models::AnalysisResult;

pub const TSV_HEADER: [&str; 5] = ["identifier", "genotype", "magnitude", "repute", "summary"];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TSV serialization failed: {0}")]
    Tsv(#[from] csv::Error),

    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Full result (best for web APIs and JavaScript)
    Json,
    /// Findings table (best for spreadsheets and shell tools)
    Tsv,
}

impl ExportFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Tsv => "tsv",
        }
    }
}

/// Serialize a result in the requested format
pub fn export(result: &AnalysisResult, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Json => export_json(result),
        ExportFormat::Tsv => export_tsv(result),
    }
}

fn export_json(result: &AnalysisResult) -> Result<Vec<u8>, ExportError> {
    let mut bytes = serde_json::to_vec_pretty(result)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn export_tsv(result: &AnalysisResult) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());

    writer.write_record(TSV_HEADER)?;
    for finding in &result.findings {
        let magnitude = finding.magnitude.map(|m| m.to_string()).unwrap_or_default();
        writer.write_record([
            finding.rsid.as_str(),
            finding.genotype.as_str(),
            magnitude.as_str(),
            finding.repute.as_str(),
            finding.summary.as_deref().unwrap_or_default(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))
}

/// Export to `<dir>/<stem>.<ext>` and return the written path
pub fn write_export(
    result: &AnalysisResult,
    format: ExportFormat,
    dir: &Path,
    stem: &str,
) -> Result<std::path::PathBuf, ExportError> {
    let bytes = export(result, format)?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.{}", stem, format.extension()));
    std::fs::write(&path, &bytes)?;

    info!(
        "Wrote {} export ({} bytes, {} findings) to {}",
        format.extension(),
        bytes.len(),
        result.findings.len(),
        path.display()
    );
    Ok(path)
}
