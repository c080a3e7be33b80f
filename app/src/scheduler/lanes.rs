// ==============================================================================
// scheduler/lanes.rs - Execution Lane Backends
// ==============================================================================
// Description: Scalar, vector and accelerator batch kernels over the index
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Lanes:
//   - Scalar: rayon pool, order-preserving parallel map of match_call
//   - Vector: structure-of-arrays kernel (lookup column, interpretation
//     column, then finding construction)
//   - Accelerator: packed single-byte genotype codes resolved in bulk, with a
//     string fallback for codes outside the -ACGT alphabet
// All lanes build findings through matcher::finding_from and must return one
// outcome per call, in call order.
// ==============================================================================

use rayon::prelude::*;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::genotype::{encode_genotype, interpretation_for, is_no_call, swap_alleles};
use crate::matcher::{finding_from, match_call};
use crate::models::{Finding, GenomeCall, LaneKind, VariantRecord};
use crate::reference_index::ReferenceIndex;

/// Recoverable lane failure; the scheduler demotes the lane and continues
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LaneError {
    #[error("Lane {lane} unavailable: {reason}")]
    LaneUnavailable { lane: LaneKind, reason: String },
}

/// One execution lane
pub trait LaneBackend: Send + Sync {
    fn kind(&self) -> LaneKind;

    /// Check the lane's backing resource before the run
    fn probe(&self) -> Result<(), LaneError> {
        Ok(())
    }

    /// Match a batch; the returned vector is parallel to `calls`
    fn run_batch(
        &self,
        index: &ReferenceIndex,
        calls: &[GenomeCall],
    ) -> Result<Vec<Option<Finding>>, LaneError>;
}

/// Worker-pool lane
pub struct ScalarLane {
    pool: rayon::ThreadPool,
}

impl ScalarLane {
    /// Build a lane backed by a dedicated pool of `workers` threads
    pub fn new(workers: usize) -> Result<Self, LaneError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("scalar-lane-{}", i))
            .build()
            .map_err(|e| LaneError::LaneUnavailable {
                lane: LaneKind::Scalar,
                reason: format!("failed to create worker pool: {}", e),
            })?;

        debug!("Scalar lane pool ready with {} workers", pool.current_num_threads());
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl LaneBackend for ScalarLane {
    fn kind(&self) -> LaneKind {
        LaneKind::Scalar
    }

    fn run_batch(
        &self,
        index: &ReferenceIndex,
        calls: &[GenomeCall],
    ) -> Result<Vec<Option<Finding>>, LaneError> {
        Ok(self
            .pool
            .install(|| calls.par_iter().map(|call| match_call(index, call)).collect()))
    }
}

/// Bulk columnar lane
#[derive(Debug, Default)]
pub struct VectorLane;

impl LaneBackend for VectorLane {
    fn kind(&self) -> LaneKind {
        LaneKind::Vector
    }

    fn run_batch(
        &self,
        index: &ReferenceIndex,
        calls: &[GenomeCall],
    ) -> Result<Vec<Option<Finding>>, LaneError> {
        let records: Vec<Option<&VariantRecord>> =
            calls.iter().map(|call| index.get(&call.rsid)).collect();

        let interpretations: Vec<Option<&String>> = records
            .iter()
            .zip(calls)
            .map(|(record, call)| {
                record.and_then(|r| interpretation_for(&r.genotypes, &call.genotype))
            })
            .collect();

        Ok(records
            .into_iter()
            .zip(interpretations)
            .zip(calls)
            .map(|((record, interpretation), call)| {
                record.map(|r| finding_from(r, call, interpretation))
            })
            .collect())
    }
}

/// Packed-code batch lane
#[derive(Debug)]
pub struct AcceleratorLane {
    unavailable: Option<String>,
}

impl Default for AcceleratorLane {
    fn default() -> Self {
        Self::new()
    }
}

impl AcceleratorLane {
    pub fn new() -> Self {
        Self { unavailable: None }
    }

    /// A lane whose probe fails with `reason`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
        }
    }
}

impl LaneBackend for AcceleratorLane {
    fn kind(&self) -> LaneKind {
        LaneKind::Accelerator
    }

    fn probe(&self) -> Result<(), LaneError> {
        match &self.unavailable {
            Some(reason) => Err(LaneError::LaneUnavailable {
                lane: LaneKind::Accelerator,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn run_batch(
        &self,
        index: &ReferenceIndex,
        calls: &[GenomeCall],
    ) -> Result<Vec<Option<Finding>>, LaneError> {
        self.probe()?;

        // None = no-call, Some(None) = outside the packed alphabet
        let codes: Vec<Option<Option<u8>>> = calls
            .iter()
            .map(|call| (!is_no_call(&call.genotype)).then(|| encode_genotype(&call.genotype)))
            .collect();

        Ok(calls
            .iter()
            .zip(codes)
            .map(|(call, code)| {
                let record = index.get(&call.rsid)?;
                let interpretation = match code {
                    None => None,
                    Some(Some(code)) => resolve_packed(&record.genotypes, code),
                    Some(None) => interpretation_for(&record.genotypes, &call.genotype),
                };
                Some(finding_from(record, call, interpretation))
            })
            .collect())
    }
}

fn resolve_packed(genotypes: &BTreeMap<String, String>, code: u8) -> Option<&String> {
    let find = |wanted: u8| {
        genotypes
            .iter()
            .find(|(key, _)| encode_genotype(key) == Some(wanted))
            .map(|(_, text)| text)
    };

    find(code).or_else(|| {
        let swapped = swap_alleles(code);
        if swapped != code {
            find(swapped)
        } else {
            None
        }
    })
}
