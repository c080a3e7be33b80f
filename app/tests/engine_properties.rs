// ==============================================================================
// engine_properties.rs - End-to-End Engine Properties
// ==============================================================================
// Description: Lane equivalence, determinism, threshold monotonicity,
//              accounting, metric bounds and session scenarios
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use snp_annotator::config::EngineConfig;
use snp_annotator::matcher::{match_call, Matcher};
use snp_annotator::models::{
    AnalysisRequest, CallSequence, Finding, GenomeCall, LaneKind, Repute, VariantRecord,
};
use snp_annotator::output::{export, ExportFormat};
use snp_annotator::reference_index::ReferenceIndex;
use snp_annotator::scheduler::{
    AcceleratorLane, CancellationToken, LaneBackend, LaneConfig, LaneError, LanePolicy,
    ScalarLane, Scheduler, SchedulerConfig, VectorLane,
};
use snp_annotator::scoring::ScoringPolicy;
use snp_annotator::session::{AnalysisService, CorpusHandle, InMemorySessionStore, SessionState};

const CALLS: usize = 10_000;
const SUMMARIES: [&str; 6] = [
    "Cortisol and stress resilience",
    "Associated with anxiety and panic disorder",
    "Working memory and attention",
    "Longevity; endurance athletes",
    "No known trait association",
    "Impulsive behaviour, self-control deficits",
];
const GENOTYPES: [&str; 9] = ["AA", "AG", "GA", "CT", "TC", "GG", "--", "DI", "A"];

fn synthetic_index(rng: &mut StdRng) -> ReferenceIndex {
    let records = (0..6_000).step_by(2).map(|i| {
        let mut genotypes = BTreeMap::new();
        if rng.gen_bool(0.6) {
            genotypes.insert("AG".to_string(), format!("heterozygous {}", i));
        }
        if rng.gen_bool(0.3) {
            genotypes.insert("TT".to_string(), format!("risk allele {}", i));
        }
        if rng.gen_bool(0.05) {
            genotypes.insert("DI".to_string(), format!("indel {}", i));
        }

        VariantRecord {
            rsid: format!("rs{}", i),
            summary: rng
                .gen_bool(0.9)
                .then(|| SUMMARIES[rng.gen_range(0..SUMMARIES.len())].to_string()),
            magnitude: rng
                .gen_bool(0.85)
                .then(|| (rng.gen_range(0..=50) as f64) / 10.0),
            repute: [Repute::Good, Repute::Bad, Repute::Neutral, Repute::Unknown]
                [rng.gen_range(0..4)],
            genotypes,
            references: vec![],
        }
    });
    ReferenceIndex::from_records(records.collect::<Vec<_>>())
}

fn synthetic_calls(rng: &mut StdRng) -> CallSequence {
    let calls = (0..CALLS)
        .map(|i| GenomeCall {
            rsid: format!("rs{}", rng.gen_range(0..8_000)),
            chromosome: ((i % 22) + 1).to_string(),
            position: i as u64 * 17,
            genotype: GENOTYPES[rng.gen_range(0..GENOTYPES.len())].to_string(),
        })
        .collect();
    CallSequence::new(calls)
}

fn fixture() -> (Arc<ReferenceIndex>, CallSequence) {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let index = Arc::new(synthetic_index(&mut rng));
    let calls = synthetic_calls(&mut rng);
    (index, calls)
}

fn small_batches(policy: LanePolicy) -> SchedulerConfig {
    SchedulerConfig {
        scalar: LaneConfig::new(97, 3),
        vector: LaneConfig::new(501, 2),
        accelerator: LaneConfig::new(1500, 1),
        scalar_workers: 4,
        starvation_limit: 4,
        policy,
    }
}

fn json(result: &snp_annotator::models::AnalysisResult) -> Vec<u8> {
    export(result, ExportFormat::Json).unwrap()
}

/// Healthy for `healthy` batches, then fails every batch
struct FailingLane {
    kind: LaneKind,
    healthy: usize,
    seen: AtomicUsize,
}

impl LaneBackend for FailingLane {
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
                reason: "device reset".to_string(),
            });
        }
        Ok(calls.iter().map(|call| match_call(index, call)).collect())
    }
}

#[test]
fn test_lane_equivalence_across_policies() {
    let (index, calls) = fixture();
    let request = AnalysisRequest::default();
    let policy = ScoringPolicy::default();

    // Single-threaded reference and a one-worker scalar lane
    let reference = json(&Matcher::new(Arc::clone(&index), policy.clone()).analyze(&calls, &request));
    let one_worker = Scheduler::with_lanes(
        small_batches(LanePolicy::Only(LaneKind::Scalar)),
        vec![Box::new(ScalarLane::new(1).unwrap())],
    );

    let mut schedulers = vec![("scalar, one worker", one_worker)];
    for (name, lane_policy) in [
        ("scalar only", LanePolicy::Only(LaneKind::Scalar)),
        ("vector only", LanePolicy::Only(LaneKind::Vector)),
        ("accelerator only", LanePolicy::Only(LaneKind::Accelerator)),
        ("round robin", LanePolicy::RoundRobin),
        ("adaptive", LanePolicy::Adaptive),
    ] {
        schedulers.push((name, Scheduler::new(small_batches(lane_policy))));
    }

    for (name, scheduler) in schedulers {
        let (result, stats) = scheduler
            .analyze(&index, &calls, &request, &policy, &CancellationToken::new(), &|_, _| {})
            .unwrap();

        assert_eq!(json(&result), reference, "{} diverged from the reference", name);
        let scheduled: u64 = stats.lanes.iter().map(|l| l.calls).sum();
        assert_eq!(scheduled, CALLS as u64, "{}", name);
    }
}

#[test]
fn test_forced_mix_uses_every_lane() {
    let (index, calls) = fixture();
    let scheduler = Scheduler::new(small_batches(LanePolicy::RoundRobin));

    let (_, stats) = scheduler
        .analyze(
            &index,
            &calls,
            &AnalysisRequest::default(),
            &ScoringPolicy::default(),
            &CancellationToken::new(),
            &|_, _| {},
        )
        .unwrap();

    for lane in &stats.lanes {
        assert!(lane.batches > 0, "lane {} never ran: {:?}", lane.lane, stats);
    }
}

#[test]
fn test_threshold_monotonicity_and_accounting() {
    let (index, calls) = fixture();
    let matcher = Matcher::new(index, ScoringPolicy::default());

    let mut previous = usize::MAX;
    for threshold in [0.0, 0.1, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0, 6.0] {
        for limit in [None, Some(0), Some(1), Some(2_500)] {
            let result = matcher.analyze(
                &calls,
                &AnalysisRequest {
                    magnitude_threshold: threshold,
                    limit,
                },
            );
            let counters = result.counters;
            assert_eq!(counters.total_calls, counters.matched + counters.unmatched);
            assert_eq!(counters.above_threshold as usize, result.findings.len());
            assert_eq!(result.magnitude_distribution.total(), counters.above_threshold);

            if limit.is_none() {
                assert!(result.findings.len() <= previous, "threshold {}", threshold);
                previous = result.findings.len();
            }
        }
    }
    assert_eq!(previous, 0);
}

#[test]
fn test_metrics_bounded_for_extreme_inputs() {
    let policy = ScoringPolicy::default();
    let bounds = policy.bounds();
    let check = |records: Vec<VariantRecord>, calls: Vec<GenomeCall>| {
        let matcher = Matcher::new(Arc::new(ReferenceIndex::from_records(records)), policy.clone());
        let result = matcher.analyze(&CallSequence::new(calls), &AnalysisRequest::default());
        let m = result.metrics;
        for (value, b) in [m.risk_appetite, m.discipline, m.panic_propensity, m.resilience]
            .iter()
            .zip(bounds)
        {
            assert!(b.contains(*value), "{} outside [{}, {}]", value, b.floor, b.ceiling);
        }
    };

    let record = |i: usize, magnitude: f64| VariantRecord {
        rsid: format!("rs{}", i),
        summary: Some(SUMMARIES.join(" ")),
        magnitude: Some(magnitude),
        repute: if i % 2 == 0 { Repute::Good } else { Repute::Bad },
        genotypes: BTreeMap::new(),
        references: vec![],
    };
    let call = |i: usize| GenomeCall {
        rsid: format!("rs{}", i),
        chromosome: "1".to_string(),
        position: i as u64,
        genotype: "AA".to_string(),
    };

    check(vec![], vec![]);
    check((0..100).map(|i| record(i, 0.0)).collect(), (0..100).map(call).collect());
    check((0..100).map(|i| record(i, 1e9)).collect(), (0..100).map(call).collect());
    check((0..100).map(|i| record(i, -1e9)).collect(), (0..100).map(call).collect());
}

#[test]
fn test_matched_and_unmatched_scenario() {
    let index = ReferenceIndex::from_records(vec![
        VariantRecord {
            rsid: "R1".to_string(),
            summary: Some("high risk".to_string()),
            magnitude: Some(4.0),
            repute: Repute::Bad,
            genotypes: BTreeMap::new(),
            references: vec![],
        },
        VariantRecord {
            rsid: "R2".to_string(),
            summary: None,
            magnitude: Some(1.0),
            repute: Repute::Good,
            genotypes: BTreeMap::new(),
            references: vec![],
        },
    ]);
    let calls = CallSequence::new(vec![
        GenomeCall {
            rsid: "R1".to_string(),
            chromosome: "1".to_string(),
            position: 1,
            genotype: "AG".to_string(),
        },
        GenomeCall {
            rsid: "R3".to_string(),
            chromosome: "1".to_string(),
            position: 2,
            genotype: "TT".to_string(),
        },
    ]);

    let result = Matcher::new(Arc::new(index), ScoringPolicy::default())
        .analyze(&calls, &AnalysisRequest::default());

    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].rsid, "r1");
    assert_eq!(result.findings[0].magnitude, Some(4.0));
    assert_eq!(result.counters.matched, 1);
    assert_eq!(result.counters.unmatched, 1);
}

#[tokio::test]
async fn test_session_rerun_is_byte_identical() {
    let (index, calls) = fixture();
    let mut config = EngineConfig::default();
    config.scheduler = small_batches(LanePolicy::Adaptive);
    let service = AnalysisService::new(CorpusHandle::resident(index), config).unwrap();
    let session = service.create_session();
    let request = AnalysisRequest {
        magnitude_threshold: 1.5,
        limit: None,
    };

    service
        .start_analysis_with_calls(session, calls.clone(), request)
        .unwrap();
    assert_eq!(service.wait(session).await.unwrap(), SessionState::Completed);
    let first = json(&service.get_result(session).unwrap());

    // Completed sessions accept a new request and replace the result
    service.start_analysis(session, request).unwrap();
    assert_eq!(service.wait(session).await.unwrap(), SessionState::Completed);
    let second = json(&service.get_result(session).unwrap());

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_empty_input_reports_floors() {
    let (index, _) = fixture();
    let service = AnalysisService::new(CorpusHandle::resident(index), EngineConfig::default()).unwrap();
    let session = service.create_session();

    service
        .start_analysis_with_calls(session, CallSequence::new(vec![]), AnalysisRequest::default())
        .unwrap();
    assert_eq!(service.wait(session).await.unwrap(), SessionState::Completed);

    let result = service.get_result(session).unwrap();
    let floors = ScoringPolicy::default().bounds().map(|b| b.floor);
    assert!(result.findings.is_empty());
    assert_eq!(result.counters.total_calls, 0);
    assert_eq!(
        [
            result.metrics.risk_appetite,
            result.metrics.discipline,
            result.metrics.panic_propensity,
            result.metrics.resilience
        ],
        floors
    );
}

#[tokio::test]
async fn test_lane_failure_mid_run_degrades_gracefully() {
    let (index, calls) = fixture();
    let reference = Matcher::new(Arc::clone(&index), ScoringPolicy::default())
        .analyze(&calls, &AnalysisRequest::default());

    let config = EngineConfig {
        scheduler: small_batches(LanePolicy::RoundRobin),
        ..EngineConfig::default()
    };
    let lanes: Vec<Box<dyn LaneBackend>> = vec![
        Box::new(ScalarLane::new(2).unwrap()),
        Box::new(VectorLane),
        Box::new(FailingLane {
            kind: LaneKind::Accelerator,
            healthy: 1,
            seen: AtomicUsize::new(0),
        }),
    ];
    let scheduler = Scheduler::with_lanes(config.scheduler.clone(), lanes);
    let service = AnalysisService::with_scheduler(
        CorpusHandle::resident(index),
        config,
        InMemorySessionStore::default(),
        scheduler,
    )
    .unwrap();

    let session = service.create_session();
    service
        .start_analysis_with_calls(session, calls, AnalysisRequest::default())
        .unwrap();
    assert_eq!(service.wait(session).await.unwrap(), SessionState::Completed);

    let result = service.get_result(session).unwrap();
    assert_eq!(result.degraded_lanes.len(), 1);
    assert_eq!(result.degraded_lanes[0].lane, LaneKind::Accelerator);
    assert_eq!(result.findings, reference.findings);
    assert_eq!(result.counters, reference.counters);
    assert_eq!(result.metrics, reference.metrics);

    let status = service.get_status(session).unwrap();
    let schedule = status.schedule.unwrap();
    assert!(schedule.lanes[LaneKind::Accelerator.slot()].demoted);
    assert!(schedule.requeued >= 1);
}

#[tokio::test]
async fn test_unavailable_accelerator_still_completes() {
    let (index, calls) = fixture();
    let config = EngineConfig {
        scheduler: small_batches(LanePolicy::Only(LaneKind::Accelerator)),
        ..EngineConfig::default()
    };
    let lanes: Vec<Box<dyn LaneBackend>> = vec![
        Box::new(VectorLane),
        Box::new(AcceleratorLane::unavailable("no device present")),
    ];
    let scheduler = Scheduler::with_lanes(config.scheduler.clone(), lanes);
    let service = AnalysisService::with_scheduler(
        CorpusHandle::resident(index),
        config,
        InMemorySessionStore::default(),
        scheduler,
    )
    .unwrap();

    let session = service.create_session();
    service
        .start_analysis_with_calls(session, calls, AnalysisRequest::default())
        .unwrap();
    assert_eq!(service.wait(session).await.unwrap(), SessionState::Completed);

    let result = service.get_result(session).unwrap();
    assert_eq!(result.counters.total_calls, CALLS as u64);
    assert_eq!(result.degraded_lanes[0].reason, "Lane accelerator unavailable: no device present");
}

#[tokio::test]
async fn test_all_lanes_failing_fails_session() {
    let (index, calls) = fixture();
    let config = EngineConfig::default();
    let lanes: Vec<Box<dyn LaneBackend>> = vec![Box::new(FailingLane {
        kind: LaneKind::Vector,
        healthy: 0,
        seen: AtomicUsize::new(0),
    })];
    let scheduler = Scheduler::with_lanes(config.scheduler.clone(), lanes);
    let service = AnalysisService::with_scheduler(
        CorpusHandle::resident(index),
        config,
        InMemorySessionStore::default(),
        scheduler,
    )
    .unwrap();

    let session = service.create_session();
    service
        .start_analysis_with_calls(session, calls, AnalysisRequest::default())
        .unwrap();
    assert_eq!(service.wait(session).await.unwrap(), SessionState::Failed);
    assert_eq!(
        service.get_result(session).unwrap_err(),
        snp_annotator::session::SessionError::NoLanesAvailable
    );
}
