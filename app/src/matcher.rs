// ==============================================================================
// matcher.rs - Call Matching and Result Assembly
// ==============================================================================
// Description: Joins genome calls against the reference index and aggregates
//              per-call outcomes into an AnalysisResult
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Pipeline:
//   1. match_call       per-call kernel, shared by every execution lane
//   2. assemble_result  ordered outcomes -> counters, threshold filter, metrics
// Both steps are pure; identical inputs always produce identical results.
// ==============================================================================

use std::sync::Arc;
use tracing::debug;

use crate::genotype::interpretation_for;
use crate::models::{
    AnalysisCounters, AnalysisRequest, AnalysisResult, CallSequence, Finding, GenomeCall,
    LaneWarning, MagnitudeHistogram, Repute, VariantRecord,
};
use crate::reference_index::ReferenceIndex;
use crate::scoring::ScoringPolicy;

/// Look up one call; None when the identifier is not in the index
pub fn match_call(index: &ReferenceIndex, call: &GenomeCall) -> Option<Finding> {
    index.get(&call.rsid).map(|record| {
        let interpretation = interpretation_for(&record.genotypes, &call.genotype);
        finding_from(record, call, interpretation)
    })
}

/// Build a Finding from a matched record and a resolved interpretation
///
/// Every lane constructs findings through this function so lane choice has no
/// effect on the output.
pub fn finding_from(
    record: &VariantRecord,
    call: &GenomeCall,
    interpretation: Option<&String>,
) -> Finding {
    Finding {
        rsid: record.rsid.clone(),
        genotype: call.genotype.clone(),
        chromosome: call.chromosome.clone(),
        position: call.position,
        magnitude: record.magnitude,
        repute: record.repute,
        summary: record.summary.clone(),
        interpretation: interpretation.cloned(),
        references: record.references.clone(),
    }
}

/// Aggregate per-call outcomes (in input order) into the final result
///
/// # Arguments
/// * `outcomes` - One entry per examined call, None for unmatched calls
/// * `request` - Threshold applied to matched findings
/// * `policy` - Metric and strategy policy
/// * `degraded_lanes` - Lane warnings collected during scheduling
pub fn assemble_result(
    outcomes: Vec<Option<Finding>>,
    request: &AnalysisRequest,
    policy: &ScoringPolicy,
    degraded_lanes: Vec<LaneWarning>,
) -> AnalysisResult {
    let mut counters = AnalysisCounters {
        total_calls: outcomes.len() as u64,
        ..AnalysisCounters::default()
    };
    let mut histogram = MagnitudeHistogram::default();
    let mut significant = Vec::new();
    let mut findings = Vec::new();

    for outcome in outcomes {
        let finding = match outcome {
            Some(finding) => finding,
            None => {
                counters.unmatched += 1;
                continue;
            }
        };

        counters.matched += 1;
        if finding.magnitude.is_none() {
            counters.without_magnitude += 1;
        }
        if !request.passes(finding.magnitude) {
            continue;
        }

        counters.above_threshold += 1;
        if let Some(magnitude) = finding.magnitude {
            histogram.record(magnitude);
            if magnitude >= policy.significant_magnitude {
                counters.significant += 1;
                if magnitude.is_finite() {
                    significant.push(magnitude);
                }
            }
            if magnitude >= policy.high_magnitude {
                counters.high_magnitude += 1;
            }
        }
        match finding.repute {
            Repute::Good => counters.good_repute += 1,
            Repute::Bad => counters.bad_repute += 1,
            Repute::Neutral | Repute::Unknown => {}
        }
        if finding.interpretation.is_some() {
            counters.with_interpretation += 1;
        }

        findings.push(finding);
    }

    let (metrics, strategy) = policy.score(&findings);
    let average_magnitude = average_of(&significant);

    debug!(
        "Assembled result: {} calls, {} matched, {} reported, strategy {}",
        counters.total_calls,
        counters.matched,
        counters.above_threshold,
        strategy.label()
    );

    AnalysisResult {
        request: *request,
        findings,
        counters,
        magnitude_distribution: histogram,
        average_magnitude,
        metrics,
        strategy,
        degraded_lanes,
    }
}

/// Mean rounded to two decimals; 0 for an empty slice
fn average_of(magnitudes: &[f64]) -> f64 {
    if magnitudes.is_empty() {
        return 0.0;
    }
    let n = magnitudes.len() as f64;
    let mean: f64 = magnitudes.iter().map(|m| m / n).sum();
    let rounded = (mean * 100.0).round() / 100.0;
    if rounded.is_finite() {
        rounded
    } else {
        mean
    }
}

/// Single-threaded reference matcher
///
/// The scheduler's lanes must reproduce this output exactly.
pub struct Matcher {
    index: Arc<ReferenceIndex>,
    policy: ScoringPolicy,
}

impl Matcher {
    pub fn new(index: Arc<ReferenceIndex>, policy: ScoringPolicy) -> Self {
        Self { index, policy }
    }

    pub fn analyze(&self, calls: &CallSequence, request: &AnalysisRequest) -> AnalysisResult {
        let outcomes = calls
            .limited(request.limit)
            .iter()
            .map(|call| match_call(&self.index, call))
            .collect();

        assemble_result(outcomes, request, &self.policy, Vec::new())
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }
}
