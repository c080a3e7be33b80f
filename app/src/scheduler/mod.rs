// ==============================================================================
// scheduler/mod.rs - Compute-Lane Scheduler
// ==============================================================================
// Description: Partitions calls into batches, assigns them to execution lanes
//              by spare capacity and merges outcomes back into input order
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Execution model:
//   - One coordinator (the calling thread) cuts batches and assigns lanes
//   - Each lane runs `concurrency` scoped worker threads fed by a bounded
//     crossbeam queue; completions return over one bounded channel
//   - The coordinator blocks on that channel whenever every lane is saturated
//   - Each batch owns a result slot; only the coordinator writes slots, and
//     slots are concatenated by batch index at the end
//   - A failing lane is demoted for the rest of the run and its batch is
//     re-queued; the run fails only when no lane remains
//   - Cancellation is checked between assignments; in-flight batches finish
//     and their outcomes are dropped
// ==============================================================================

pub mod lanes;
pub mod probe;

use crossbeam_channel::{bounded, Sender};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::matcher::assemble_result;
use crate::models::{
    AnalysisRequest, AnalysisResult, CallSequence, Finding, GenomeCall, LaneKind, LaneWarning,
};
use crate::reference_index::ReferenceIndex;
use crate::scoring::ScoringPolicy;

pub use lanes::{AcceleratorLane, LaneBackend, LaneError, ScalarLane, VectorLane};
pub use probe::{
    spare_capacity, FixedLoadProbe, OccupancyProbe, SystemLoadProbe, UtilizationProbe,
};

/// Scheduler failures (lane failures alone are recoverable)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("No compute lanes available")]
    NoLanesAvailable,

    #[error("Analysis cancelled")]
    Cancelled,
}

/// Per-lane tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneConfig {
    /// Calls per batch
    pub batch_size: usize,
    /// Maximum batches in flight on this lane
    pub concurrency: usize,
    pub enabled: bool,
}

impl LaneConfig {
    pub const fn new(batch_size: usize, concurrency: usize) -> Self {
        Self {
            batch_size,
            concurrency,
            enabled: true,
        }
    }
}

/// Lane assignment policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanePolicy {
    /// Most spare capacity wins, with starvation guard
    #[default]
    Adaptive,
    /// Use one lane; other lanes only take over after it is demoted
    Only(LaneKind),
    /// Rotate across available lanes
    RoundRobin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub scalar: LaneConfig,
    pub vector: LaneConfig,
    pub accelerator: LaneConfig,
    /// Threads in the scalar lane's pool
    pub scalar_workers: usize,
    /// Consecutive skips after which a lane is force-selected once
    pub starvation_limit: u32,
    pub policy: LanePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scalar: LaneConfig::new(512, 2),
            vector: LaneConfig::new(2048, 1),
            accelerator: LaneConfig::new(8192, 1),
            scalar_workers: num_cpus::get().max(1),
            starvation_limit: 8,
            policy: LanePolicy::Adaptive,
        }
    }
}

impl SchedulerConfig {
    pub fn lane(&self, kind: LaneKind) -> &LaneConfig {
        match kind {
            LaneKind::Scalar => &self.scalar,
            LaneKind::Vector => &self.vector,
            LaneKind::Accelerator => &self.accelerator,
        }
    }
}

/// Cooperative cancellation flag shared between a session and its run
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives (calls completed, calls total) after every merged batch
pub type ProgressSink<'a> = &'a (dyn Fn(u64, u64) + Sync);

/// Per-lane counters for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStats {
    pub lane: LaneKind,
    pub batches: u64,
    pub calls: u64,
    pub failures: u64,
    pub demoted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleStats {
    pub lanes: Vec<LaneStats>,
    pub batches: u64,
    pub requeued: u64,
}

impl Default for ScheduleStats {
    fn default() -> Self {
        Self {
            lanes: LaneKind::ALL
                .iter()
                .map(|&lane| LaneStats {
                    lane,
                    batches: 0,
                    calls: 0,
                    failures: 0,
                    demoted: false,
                })
                .collect(),
            batches: 0,
            requeued: 0,
        }
    }
}

/// Merged outcomes of one scheduled run
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    /// One entry per call, in input order
    pub outcomes: Vec<Option<Finding>>,
    pub warnings: Vec<LaneWarning>,
    pub stats: ScheduleStats,
}

struct Job {
    batch: usize,
    range: Range<usize>,
}

struct Completion {
    lane: LaneKind,
    batch: usize,
    range: Range<usize>,
    result: Result<Vec<Option<Finding>>, LaneError>,
}

/// Assignment bookkeeping owned by the coordinator
struct Assigner {
    active: [bool; 3],
    in_flight: [usize; 3],
    skipped: [u32; 3],
    cursor: usize,
}

pub struct Scheduler {
    lanes: [Option<Box<dyn LaneBackend>>; 3],
    config: SchedulerConfig,
    probe: Box<dyn UtilizationProbe>,
}

impl Scheduler {
    /// Scheduler with the built-in scalar, vector and accelerator lanes
    pub fn new(config: SchedulerConfig) -> Self {
        let mut lanes: Vec<Box<dyn LaneBackend>> = Vec::new();
        match ScalarLane::new(config.scalar_workers) {
            Ok(lane) => lanes.push(Box::new(lane)),
            Err(e) => warn!("{}", e),
        }
        lanes.push(Box::new(VectorLane));
        lanes.push(Box::new(AcceleratorLane::new()));
        Self::with_lanes(config, lanes)
    }

    /// Scheduler over caller-supplied backends; the first backend per kind wins
    pub fn with_lanes(config: SchedulerConfig, backends: Vec<Box<dyn LaneBackend>>) -> Self {
        let mut lanes: [Option<Box<dyn LaneBackend>>; 3] = [None, None, None];
        for backend in backends {
            let slot = backend.kind().slot();
            if lanes[slot].is_none() {
                lanes[slot] = Some(backend);
            }
        }
        Self {
            lanes,
            config,
            probe: Box::new(SystemLoadProbe::new()),
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn UtilizationProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Schedule, merge and aggregate one analysis
    pub fn analyze(
        &self,
        index: &ReferenceIndex,
        calls: &CallSequence,
        request: &AnalysisRequest,
        policy: &ScoringPolicy,
        cancel: &CancellationToken,
        progress: ProgressSink<'_>,
    ) -> Result<(AnalysisResult, ScheduleStats), ScheduleError> {
        let outcome = self.run(index, calls.limited(request.limit), cancel, progress)?;
        let result = assemble_result(outcome.outcomes, request, policy, outcome.warnings);
        Ok((result, outcome.stats))
    }

    /// Match every call across the available lanes
    ///
    /// # Returns
    /// * `Ok(ScheduleOutcome)` - Outcomes in input order plus lane warnings
    /// * `Err(ScheduleError::NoLanesAvailable)` - Every lane disabled or demoted
    /// * `Err(ScheduleError::Cancelled)` - Token set before the last assignment
    pub fn run(
        &self,
        index: &ReferenceIndex,
        calls: &[GenomeCall],
        cancel: &CancellationToken,
        progress: ProgressSink<'_>,
    ) -> Result<ScheduleOutcome, ScheduleError> {
        let mut warnings = Vec::new();
        let mut stats = ScheduleStats::default();
        let mut assigner = Assigner {
            active: [false; 3],
            in_flight: [0; 3],
            skipped: [0; 3],
            cursor: 0,
        };

        for (slot, lane) in self.lanes.iter().enumerate() {
            let Some(lane) = lane else { continue };
            let config = self.config.lane(lane.kind());
            if !config.enabled || config.concurrency == 0 || config.batch_size == 0 {
                debug!("Lane {} disabled by configuration", lane.kind());
                continue;
            }
            match lane.probe() {
                Ok(()) => assigner.active[slot] = true,
                Err(e) => {
                    warn!("Demoting lane before dispatch: {}", e);
                    stats.lanes[slot].demoted = true;
                    warnings.push(LaneWarning {
                        lane: lane.kind(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !assigner.active.iter().any(|&a| a) {
            return Err(ScheduleError::NoLanesAvailable);
        }

        let total = calls.len();
        if total == 0 {
            progress(0, 0);
            return Ok(ScheduleOutcome {
                outcomes: Vec::new(),
                warnings,
                stats,
            });
        }

        info!(
            "Scheduling {} calls across lanes {:?} with {:?} policy",
            total,
            LaneKind::ALL
                .iter()
                .filter(|k| assigner.active[k.slot()])
                .map(|k| k.as_str())
                .collect::<Vec<_>>(),
            self.config.policy
        );

        let slots = thread::scope(|scope| {
            let capacity: usize = LaneKind::ALL
                .iter()
                .filter(|k| assigner.active[k.slot()])
                .map(|k| self.config.lane(*k).concurrency)
                .sum();
            let (done_tx, done_rx) = bounded::<Completion>(capacity.max(1));

            let mut queues: [Option<Sender<Job>>; 3] = [None, None, None];
            for lane in self.lanes.iter().flatten() {
                let kind = lane.kind();
                if !assigner.active[kind.slot()] {
                    continue;
                }
                let concurrency = self.config.lane(kind).concurrency;
                let (job_tx, job_rx) = bounded::<Job>(concurrency);
                for _ in 0..concurrency {
                    let job_rx = job_rx.clone();
                    let done_tx = done_tx.clone();
                    let lane: &dyn LaneBackend = &**lane;
                    scope.spawn(move || {
                        for job in job_rx.iter() {
                            let batch = &calls[job.range.clone()];
                            let result = catch_unwind(AssertUnwindSafe(|| lane.run_batch(index, batch)))
                                .unwrap_or_else(|_| {
                                    Err(LaneError::LaneUnavailable {
                                        lane: kind,
                                        reason: "batch kernel panicked".to_string(),
                                    })
                                });
                            // Receiver is gone only after the run was abandoned
                            let _ = done_tx.send(Completion {
                                lane: kind,
                                batch: job.batch,
                                range: job.range,
                                result,
                            });
                        }
                    });
                }
                queues[kind.slot()] = Some(job_tx);
            }
            drop(done_tx);

            let mut slots: Vec<Option<Vec<Option<Finding>>>> = Vec::new();
            let mut requeue: VecDeque<Job> = VecDeque::new();
            let mut next_start = 0usize;
            let mut completed = 0u64;

            loop {
                if cancel.is_cancelled() {
                    info!("Cancellation requested; abandoning remaining batches");
                    return Err(ScheduleError::Cancelled);
                }

                let pending = !requeue.is_empty() || next_start < total;
                let in_flight: usize = assigner.in_flight.iter().sum();
                if !pending && in_flight == 0 {
                    break;
                }

                if pending {
                    if let Some(kind) = self.select_lane(&mut assigner) {
                        let job = match requeue.pop_front() {
                            Some(job) => job,
                            None => {
                                let end = (next_start + self.config.lane(kind).batch_size).min(total);
                                let job = Job {
                                    batch: slots.len(),
                                    range: next_start..end,
                                };
                                slots.push(None);
                                next_start = end;
                                stats.batches += 1;
                                job
                            }
                        };

                        debug!(
                            "Batch {} ({} calls) -> {} lane",
                            job.batch,
                            job.range.len(),
                            kind
                        );
                        let slot = kind.slot();
                        let sent = match &queues[slot] {
                            Some(queue) => queue.send(job).map_err(|e| e.into_inner()),
                            None => Err(job),
                        };
                        match sent {
                            Ok(()) => assigner.in_flight[slot] += 1,
                            Err(job) => {
                                warn!("Lane {} stopped accepting batches; demoting", kind);
                                assigner.active[slot] = false;
                                queues[slot] = None;
                                stats.lanes[slot].demoted = true;
                                warnings.push(LaneWarning {
                                    lane: kind,
                                    reason: "worker queue closed".to_string(),
                                });
                                requeue.push_front(job);
                            }
                        }
                        continue;
                    }
                }

                if in_flight == 0 {
                    // Work remains but no lane can take it
                    return Err(ScheduleError::NoLanesAvailable);
                }

                let done = match done_rx.recv() {
                    Ok(done) => done,
                    Err(_) => return Err(ScheduleError::NoLanesAvailable),
                };
                let slot = done.lane.slot();
                assigner.in_flight[slot] -= 1;

                let expected = done.range.len();
                let result = done.result.and_then(|outcomes| {
                    if outcomes.len() == expected {
                        Ok(outcomes)
                    } else {
                        Err(LaneError::LaneUnavailable {
                            lane: done.lane,
                            reason: format!(
                                "returned {} outcomes for {} calls",
                                outcomes.len(),
                                expected
                            ),
                        })
                    }
                });

                match result {
                    Ok(outcomes) => {
                        stats.lanes[slot].batches += 1;
                        stats.lanes[slot].calls += expected as u64;
                        slots[done.batch] = Some(outcomes);
                        completed += expected as u64;
                        progress(completed, total as u64);
                    }
                    Err(e) => {
                        stats.lanes[slot].failures += 1;
                        stats.requeued += 1;
                        if assigner.active[slot] {
                            warn!("Demoting lane for the rest of the run: {}", e);
                            assigner.active[slot] = false;
                            queues[slot] = None;
                            stats.lanes[slot].demoted = true;
                            warnings.push(LaneWarning {
                                lane: done.lane,
                                reason: e.to_string(),
                            });
                        }
                        requeue.push_back(Job {
                            batch: done.batch,
                            range: done.range,
                        });
                    }
                }
            }

            Ok(slots)
        })?;

        let mut outcomes = Vec::with_capacity(total);
        for slot in slots {
            match slot {
                Some(batch) => outcomes.extend(batch),
                None => return Err(ScheduleError::NoLanesAvailable),
            }
        }

        info!(
            "Scheduled {} batches ({} re-queued), {} lane warnings",
            stats.batches,
            stats.requeued,
            warnings.len()
        );

        Ok(ScheduleOutcome {
            outcomes,
            warnings,
            stats,
        })
    }

    /// Pick the lane for the next batch, or None when every active lane is full
    fn select_lane(&self, assigner: &mut Assigner) -> Option<LaneKind> {
        let has_slot = |kind: LaneKind, a: &Assigner| {
            a.active[kind.slot()] && a.in_flight[kind.slot()] < self.config.lane(kind).concurrency
        };

        let chosen = match self.config.policy {
            LanePolicy::Only(kind) if assigner.active[kind.slot()] => {
                has_slot(kind, assigner).then_some(kind)
            }
            LanePolicy::RoundRobin => {
                let pick = (0..LaneKind::ALL.len())
                    .map(|offset| LaneKind::ALL[(assigner.cursor + offset) % LaneKind::ALL.len()])
                    .find(|&kind| has_slot(kind, assigner));
                if let Some(kind) = pick {
                    assigner.cursor = (kind.slot() + 1) % LaneKind::ALL.len();
                }
                pick
            }
            LanePolicy::Adaptive | LanePolicy::Only(_) => {
                let starving = LaneKind::ALL.iter().copied().find(|&kind| {
                    has_slot(kind, assigner)
                        && assigner.skipped[kind.slot()] > self.config.starvation_limit
                });
                starving.or_else(|| self.most_spare(assigner))
            }
        }?;

        for kind in LaneKind::ALL {
            let slot = kind.slot();
            if kind == chosen {
                assigner.skipped[slot] = 0;
            } else if assigner.active[slot] {
                assigner.skipped[slot] = assigner.skipped[slot].saturating_add(1);
            }
        }
        Some(chosen)
    }

    fn most_spare(&self, assigner: &Assigner) -> Option<LaneKind> {
        let mut best: Option<(LaneKind, f64)> = None;
        for kind in LaneKind::ALL {
            let slot = kind.slot();
            let ceiling = self.config.lane(kind).concurrency;
            if !assigner.active[slot] || assigner.in_flight[slot] >= ceiling {
                continue;
            }
            let spare = spare_capacity(ceiling, assigner.in_flight[slot], self.probe.external_load(kind));
            if best.map_or(true, |(_, top)| spare > top) {
                best = Some((kind, spare));
            }
        }
        best.map(|(kind, _)| kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::match_call;
    use crate::models::{Repute, VariantRecord};
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn fixture(n: usize) -> (ReferenceIndex, Vec<GenomeCall>) {
        let index = ReferenceIndex::from_records((0..n).step_by(2).map(|i| VariantRecord {
            rsid: format!("rs{}", i),
            summary: Some(format!("variant {}", i)),
            magnitude: Some((i % 5) as f64),
            repute: Repute::Neutral,
            genotypes: BTreeMap::new(),
            references: vec![],
        }));
        let calls = (0..n)
            .map(|i| GenomeCall {
                rsid: format!("rs{}", i),
                chromosome: "1".to_string(),
                position: i as u64,
                genotype: "AG".to_string(),
            })
            .collect();
        (index, calls)
    }

    fn small_config(policy: LanePolicy) -> SchedulerConfig {
        SchedulerConfig {
            scalar: LaneConfig::new(7, 2),
            vector: LaneConfig::new(13, 1),
            accelerator: LaneConfig::new(31, 1),
            scalar_workers: 2,
            starvation_limit: 3,
            policy,
        }
    }

    /// Fails every batch after the first `healthy` ones
    struct FlakyLane {
        kind: LaneKind,
        healthy: usize,
        seen: AtomicUsize,
    }

    impl LaneBackend for FlakyLane {
        fn kind(&self) -> LaneKind {
            self.kind
        }

        fn run_batch(
            &self,
            index: &ReferenceIndex,
            calls: &[GenomeCall],
        ) -> Result<Vec<Option<Finding>>, LaneError> {
            if self.seen.fetch_add(1, Ordering::SeqCst) >= self.healthy {
                return Err(LaneError::LaneUnavailable {
                    lane: self.kind,
                    reason: "device lost".to_string(),
                });
            }
            Ok(calls.iter().map(|c| match_call(index, c)).collect())
        }
    }

    #[test]
    fn test_every_policy_preserves_order() {
        let (index, calls) = fixture(500);
        let expected: Vec<Option<Finding>> = calls.iter().map(|c| match_call(&index, c)).collect();

        for policy in [
            LanePolicy::Adaptive,
            LanePolicy::RoundRobin,
            LanePolicy::Only(LaneKind::Scalar),
            LanePolicy::Only(LaneKind::Vector),
            LanePolicy::Only(LaneKind::Accelerator),
        ] {
            let scheduler = Scheduler::new(small_config(policy));
            let outcome = scheduler
                .run(&index, &calls, &CancellationToken::new(), &|_, _| {})
                .unwrap();
            assert_eq!(outcome.outcomes, expected, "policy {:?}", policy);
            assert!(outcome.warnings.is_empty());
        }
    }

    #[test]
    fn test_only_policy_uses_single_lane() {
        let (index, calls) = fixture(200);
        let scheduler = Scheduler::new(small_config(LanePolicy::Only(LaneKind::Vector)));
        let outcome = scheduler
            .run(&index, &calls, &CancellationToken::new(), &|_, _| {})
            .unwrap();

        let vector = outcome.stats.lanes[LaneKind::Vector.slot()];
        assert_eq!(vector.calls, 200);
        assert_eq!(outcome.stats.batches, vector.batches);
    }

    #[test]
    fn test_round_robin_mixes_lanes() {
        let (index, calls) = fixture(400);
        let scheduler = Scheduler::new(small_config(LanePolicy::RoundRobin));
        let outcome = scheduler
            .run(&index, &calls, &CancellationToken::new(), &|_, _| {})
            .unwrap();

        let used = outcome.stats.lanes.iter().filter(|l| l.batches > 0).count();
        assert!(used >= 2, "expected a lane mix: {:?}", outcome.stats);
    }

    #[test]
    fn test_progress_is_monotonic_and_complete() {
        let (index, calls) = fixture(300);
        let seen = Mutex::new(Vec::new());
        let scheduler = Scheduler::new(small_config(LanePolicy::Adaptive));
        scheduler
            .run(&index, &calls, &CancellationToken::new(), &|done, total| {
                seen.lock().unwrap().push((done, total));
            })
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(seen.last(), Some(&(300, 300)));
    }

    #[test]
    fn test_lane_failure_requeues_batches() {
        let (index, calls) = fixture(300);
        let expected: Vec<Option<Finding>> = calls.iter().map(|c| match_call(&index, c)).collect();
        let lanes: Vec<Box<dyn LaneBackend>> = vec![
            Box::new(FlakyLane {
                kind: LaneKind::Accelerator,
                healthy: 1,
                seen: AtomicUsize::new(0),
            }),
            Box::new(VectorLane),
        ];
        let scheduler = Scheduler::with_lanes(small_config(LanePolicy::RoundRobin), lanes);

        let outcome = scheduler
            .run(&index, &calls, &CancellationToken::new(), &|_, _| {})
            .unwrap();

        assert_eq!(outcome.outcomes, expected);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].lane, LaneKind::Accelerator);
        assert!(outcome.stats.lanes[LaneKind::Accelerator.slot()].demoted);
    }

    #[test]
    fn test_all_lanes_failing() {
        let (index, calls) = fixture(50);
        let lanes: Vec<Box<dyn LaneBackend>> = vec![Box::new(FlakyLane {
            kind: LaneKind::Scalar,
            healthy: 0,
            seen: AtomicUsize::new(0),
        })];
        let scheduler = Scheduler::with_lanes(small_config(LanePolicy::Adaptive), lanes);

        let result = scheduler.run(&index, &calls, &CancellationToken::new(), &|_, _| {});
        assert_eq!(result.unwrap_err(), ScheduleError::NoLanesAvailable);
    }

    #[test]
    fn test_unavailable_lane_is_reported_not_fatal() {
        let (index, calls) = fixture(40);
        let lanes: Vec<Box<dyn LaneBackend>> = vec![
            Box::new(AcceleratorLane::unavailable("no device")),
            Box::new(VectorLane),
        ];
        let scheduler = Scheduler::with_lanes(small_config(LanePolicy::Adaptive), lanes);

        let outcome = scheduler
            .run(&index, &calls, &CancellationToken::new(), &|_, _| {})
            .unwrap();
        assert_eq!(outcome.outcomes.len(), 40);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_cancelled_before_dispatch() {
        let (index, calls) = fixture(100);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let scheduler = Scheduler::new(small_config(LanePolicy::Adaptive));
        let result = scheduler.run(&index, &calls, &cancel, &|_, _| {});
        assert_eq!(result.unwrap_err(), ScheduleError::Cancelled);
    }

    #[test]
    fn test_adaptive_starvation_guard() {
        let (index, calls) = fixture(600);
        // Scalar looks fully loaded, vector idle; scalar must still get work
        let probe = FixedLoadProbe::new()
            .with_load(LaneKind::Scalar, 0.99)
            .with_load(LaneKind::Accelerator, 0.99);
        let scheduler =
            Scheduler::new(small_config(LanePolicy::Adaptive)).with_probe(Box::new(probe));

        let outcome = scheduler
            .run(&index, &calls, &CancellationToken::new(), &|_, _| {})
            .unwrap();
        assert_eq!(outcome.outcomes.len(), 600);
        assert!(outcome.stats.lanes.iter().all(|l| l.batches > 0));
    }

    #[test]
    fn test_empty_input() {
        let (index, _) = fixture(10);
        let scheduler = Scheduler::new(small_config(LanePolicy::Adaptive));
        let outcome = scheduler
            .run(&index, &[], &CancellationToken::new(), &|_, _| {})
            .unwrap();
        assert!(outcome.outcomes.is_empty());
    }
}
