// ==============================================================================
// models.rs - Annotation Engine Data Models
// ==============================================================================
// Description: Reference records, genome calls, findings and analysis results
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-10-18
// Version: 3.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Qualitative polarity assigned to a variant by the reference corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Repute {
    Good,
    Bad,
    Neutral,
    #[default]
    Unknown,
}

impl Repute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Repute::Good => "Good",
            Repute::Bad => "Bad",
            Repute::Neutral => "Neutral",
            Repute::Unknown => "Unknown",
        }
    }

    /// Classify free-text repute values ("good", "Bad ", "neutral", ...)
    pub fn from_text(text: &str) -> Self {
        let lowered = text.trim().to_ascii_lowercase();
        if lowered.contains("good") {
            Repute::Good
        } else if lowered.contains("bad") {
            Repute::Bad
        } else if lowered.contains("neutral") {
            Repute::Neutral
        } else {
            Repute::Unknown
        }
    }

    /// +1 for beneficial, -1 for harmful, 0 otherwise
    pub fn polarity(&self) -> f64 {
        match self {
            Repute::Good => 1.0,
            Repute::Bad => -1.0,
            Repute::Neutral | Repute::Unknown => 0.0,
        }
    }
}

/// Reference Index entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    /// Normalized identifier (e.g., "rs53576", "i3003137")
    pub rsid: String,

    /// Free-text annotation summary
    #[serde(default)]
    pub summary: Option<String>,

    /// Significance score; None means untyped
    #[serde(default)]
    pub magnitude: Option<f64>,

    #[serde(default)]
    pub repute: Repute,

    /// Genotype-specific interpretations keyed by allele pair (e.g., "AG")
    #[serde(default)]
    pub genotypes: BTreeMap<String, String>,

    /// PubMed identifiers cited by the annotation
    #[serde(default)]
    pub references: Vec<String>,
}

/// One observed genotype from a personal genome file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeCall {
    /// SNP identifier as written in the input file
    pub rsid: String,
    /// Chromosome ("1"-"22", "X", "Y", "MT")
    pub chromosome: String,
    /// Base pair position (GRCh37/hg19)
    pub position: u64,
    /// Two-letter genotype (e.g., "AG", "--" for no-call)
    pub genotype: String,
}

/// Ordered, parsed call sequence plus the parser's skip counters
#[derive(Debug, Clone, Default)]
pub struct CallSequence {
    calls: Arc<[GenomeCall]>,
    pub malformed_count: u64,
    pub comment_count: u64,
    pub blank_count: u64,
}

impl CallSequence {
    pub fn new(calls: Vec<GenomeCall>) -> Self {
        Self {
            calls: calls.into(),
            ..Self::default()
        }
    }

    pub fn with_counts(calls: Vec<GenomeCall>, malformed: u64, comments: u64, blanks: u64) -> Self {
        Self {
            calls: calls.into(),
            malformed_count: malformed,
            comment_count: comments,
            blank_count: blanks,
        }
    }

    pub fn calls(&self) -> &[GenomeCall] {
        &self.calls
    }

    /// First `limit` calls in input order (all calls when `limit` is None)
    pub fn limited(&self, limit: Option<usize>) -> &[GenomeCall] {
        match limit {
            Some(n) if n < self.calls.len() => &self.calls[..n],
            _ => &self.calls,
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// A matched, annotated observation at one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rsid: String,
    pub genotype: String,
    pub chromosome: String,
    pub position: u64,
    pub magnitude: Option<f64>,
    pub repute: Repute,
    pub summary: Option<String>,
    /// Interpretation for the observed allele pair, if the corpus has one
    pub interpretation: Option<String>,
    pub references: Vec<String>,
}

/// Execution lane kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneKind {
    Scalar,
    Vector,
    Accelerator,
}

impl LaneKind {
    pub const ALL: [LaneKind; 3] = [LaneKind::Scalar, LaneKind::Vector, LaneKind::Accelerator];

    pub fn as_str(&self) -> &'static str {
        match self {
            LaneKind::Scalar => "scalar",
            LaneKind::Vector => "vector",
            LaneKind::Accelerator => "accelerator",
        }
    }

    pub fn slot(&self) -> usize {
        match self {
            LaneKind::Scalar => 0,
            LaneKind::Vector => 1,
            LaneKind::Accelerator => 2,
        }
    }
}

impl std::fmt::Display for LaneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recoverable lane degradation recorded in the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneWarning {
    pub lane: LaneKind,
    pub reason: String,
}

/// Parameters of one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Minimum magnitude; values <= 0 accept any defined magnitude
    pub magnitude_threshold: f64,
    /// Maximum number of calls examined, in input order
    pub limit: Option<usize>,
}

impl Default for AnalysisRequest {
    fn default() -> Self {
        Self {
            magnitude_threshold: 0.0,
            limit: None,
        }
    }
}

impl AnalysisRequest {
    pub fn passes(&self, magnitude: Option<f64>) -> bool {
        match magnitude {
            None => false,
            Some(_) if self.magnitude_threshold <= 0.0 => true,
            Some(value) => value >= self.magnitude_threshold,
        }
    }
}

/// Bounded percentage scores derived from the reported findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub risk_appetite: u32,
    pub discipline: u32,
    pub panic_propensity: u32,
    pub resilience: u32,
}

/// Strategy label chosen from the first two metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    Momentum,
    Value,
    CalculatedRisk,
    Balanced,
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Momentum => "Momentum",
            Strategy::Value => "Value",
            Strategy::CalculatedRisk => "Calculated Risk",
            Strategy::Balanced => "Balanced",
        }
    }
}

/// Run counters. `total_calls == matched + unmatched` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisCounters {
    pub total_calls: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub above_threshold: u64,
    /// Matched calls whose record has no magnitude
    pub without_magnitude: u64,
    /// Reported findings at or above the policy's significant magnitude (2.0)
    pub significant: u64,
    /// Reported findings at or above the policy's high magnitude (3.0)
    pub high_magnitude: u64,
    pub good_repute: u64,
    pub bad_repute: u64,
    pub with_interpretation: u64,
}

/// Magnitude distribution of the reported findings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagnitudeHistogram {
    #[serde(rename = "0-1")]
    pub below_one: u64,
    #[serde(rename = "1-2")]
    pub one_to_two: u64,
    #[serde(rename = "2-3")]
    pub two_to_three: u64,
    #[serde(rename = "3-4")]
    pub three_to_four: u64,
    #[serde(rename = "4+")]
    pub four_plus: u64,
}

impl MagnitudeHistogram {
    pub fn record(&mut self, magnitude: f64) {
        if magnitude < 1.0 {
            self.below_one += 1;
        } else if magnitude < 2.0 {
            self.one_to_two += 1;
        } else if magnitude < 3.0 {
            self.two_to_three += 1;
        } else if magnitude < 4.0 {
            self.three_to_four += 1;
        } else {
            self.four_plus += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.below_one + self.one_to_two + self.two_to_three + self.three_to_four + self.four_plus
    }
}

/// Final, immutable report of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub request: AnalysisRequest,
    /// Findings above threshold, in input order
    pub findings: Vec<Finding>,
    pub counters: AnalysisCounters,
    pub magnitude_distribution: MagnitudeHistogram,
    /// Mean magnitude of the significant findings, two decimals; 0 when none
    pub average_magnitude: f64,
    pub metrics: AggregateMetrics,
    pub strategy: Strategy,
    /// Lanes demoted during the run (empty on a clean run)
    pub degraded_lanes: Vec<LaneWarning>,
}

impl AnalysisResult {
    /// Up to `n` findings with magnitude >= `min_magnitude`, highest first
    ///
    /// Equal magnitudes keep input order.
    pub fn top_findings(&self, n: usize, min_magnitude: f64) -> Vec<&Finding> {
        let mut ranked: Vec<&Finding> = self
            .findings
            .iter()
            .filter(|f| f.magnitude.is_some_and(|m| m >= min_magnitude))
            .collect();
        ranked.sort_by(|a, b| {
            let (a, b) = (a.magnitude.unwrap_or(0.0), b.magnitude.unwrap_or(0.0));
            b.total_cmp(&a)
        });
        ranked.truncate(n);
        ranked
    }

    /// Findings whose summary or interpretation contains `keyword`, ignoring case
    pub fn search(&self, keyword: &str) -> Vec<&Finding> {
        let keyword = keyword.to_lowercase();
        let contains = |text: &Option<String>| {
            text.as_ref()
                .is_some_and(|t| t.to_lowercase().contains(&keyword))
        };
        self.findings
            .iter()
            .filter(|f| contains(&f.summary) || contains(&f.interpretation))
            .collect()
    }

    /// Findings the corpus assigns a repute to (medically annotated)
    pub fn with_repute(&self) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.repute != Repute::Unknown)
            .collect()
    }
}
