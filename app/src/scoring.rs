// ==============================================================================
// scoring.rs - Aggregate Metric Policy
// ==============================================================================
// Description: Bounded percentage metrics and strategy label over findings
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.1.0
// ==============================================================================
// Metrics (floor/ceiling are policy constants):
//   1. risk_appetite     [5, 95]   mean magnitude vs reference maximum
//   2. discipline        [15, 95]  keyword hits, Good repute amplifies
//   3. panic_propensity  [5, 85]   keyword hits, Bad repute amplifies
//   4. resilience        [10, 90]  keyword hits, Good repute amplifies
// Every metric sits at its floor for an empty report and never leaves
// [floor, ceiling]. Adding findings that match a metric's keywords, or raising
// magnitudes, never lowers a metric.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::models::{AggregateMetrics, Finding, Strategy};

/// Inclusive clamp range for one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricBounds {
    pub floor: u32,
    pub ceiling: u32,
}

impl MetricBounds {
    pub const fn new(floor: u32, ceiling: u32) -> Self {
        Self { floor, ceiling }
    }

    /// Round and clamp a raw score
    ///
    /// +inf lands on the ceiling; NaN and -inf land on the floor. Inverted
    /// bounds never panic: the ceiling wins.
    pub fn clamp(&self, raw: f64) -> u32 {
        if raw.is_nan() {
            return self.floor;
        }
        raw.round()
            .max(self.floor as f64)
            .min(self.ceiling as f64) as u32
    }

    pub fn contains(&self, value: u32) -> bool {
        (self.floor..=self.ceiling).contains(&value)
    }
}

/// Keyword-driven metric definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMetric {
    /// Lowercase keywords matched against summary and interpretation text
    pub keywords: Vec<String>,
    pub bounds: MetricBounds,
    /// Points contributed by one matching finding
    pub weight: f64,
    /// Repute adjustment: a finding contributes weight * (1 + bias * polarity)
    pub repute_bias: f64,
}

impl KeywordMetric {
    fn new(keywords: &[&str], bounds: MetricBounds, weight: f64, repute_bias: f64) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            bounds,
            weight,
            repute_bias,
        }
    }

    fn matches(&self, text: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| !keyword.is_empty() && text.contains(&keyword.to_ascii_lowercase()))
    }

    fn score(&self, findings: &[Finding]) -> u32 {
        let bias = self.repute_bias.clamp(-0.95, 0.95);
        let weight = self.weight.max(0.0);

        let raw: f64 = findings
            .iter()
            .filter(|f| self.matches(&searchable_text(f)))
            .map(|f| weight * (1.0 + bias * f.repute.polarity()))
            .sum();

        self.bounds.clamp(raw)
    }
}

/// Label cutoffs, evaluated in priority order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyRules {
    /// risk_appetite above this => Momentum
    pub momentum_above: u32,
    /// risk_appetite below this => Value
    pub value_below: u32,
    /// discipline above this => CalculatedRisk
    pub calculated_risk_above: u32,
}

impl StrategyRules {
    pub fn classify(&self, metrics: &AggregateMetrics) -> Strategy {
        if metrics.risk_appetite > self.momentum_above {
            Strategy::Momentum
        } else if metrics.risk_appetite < self.value_below {
            Strategy::Value
        } else if metrics.discipline > self.calculated_risk_above {
            Strategy::CalculatedRisk
        } else {
            Strategy::Balanced
        }
    }
}

/// Complete scoring policy, passed explicitly into the matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub risk_bounds: MetricBounds,
    /// Magnitude that maps to 100 before clamping
    pub reference_magnitude: f64,
    /// Findings at or above this magnitude add `high_magnitude_bonus`
    pub high_magnitude: f64,
    pub high_magnitude_bonus: f64,
    /// Counted as "significant" in the result counters
    pub significant_magnitude: f64,
    pub discipline: KeywordMetric,
    pub panic_propensity: KeywordMetric,
    pub resilience: KeywordMetric,
    pub strategy: StrategyRules,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            risk_bounds: MetricBounds::new(5, 95),
            reference_magnitude: 4.0,
            high_magnitude: 3.0,
            high_magnitude_bonus: 2.0,
            significant_magnitude: 2.0,
            discipline: KeywordMetric::new(
                &["self-control", "executive", "attention", "memory", "cognitive", "conscientious"],
                MetricBounds::new(15, 95),
                6.0,
                0.5,
            ),
            panic_propensity: KeywordMetric::new(
                &["anxiety", "panic", "fear", "neuroticism", "depression", "impulsive"],
                MetricBounds::new(5, 85),
                6.0,
                -0.5,
            ),
            resilience: KeywordMetric::new(
                &["stress", "cortisol", "resilience", "persistence", "endurance", "longevity"],
                MetricBounds::new(10, 90),
                5.0,
                0.5,
            ),
            strategy: StrategyRules {
                momentum_above: 80,
                value_below: 30,
                calculated_risk_above: 70,
            },
        }
    }
}

impl ScoringPolicy {
    /// Score the reported (above-threshold) findings
    pub fn score(&self, reported: &[Finding]) -> (AggregateMetrics, Strategy) {
        let metrics = AggregateMetrics {
            risk_appetite: self.risk_appetite(reported),
            discipline: self.discipline.score(reported),
            panic_propensity: self.panic_propensity.score(reported),
            resilience: self.resilience.score(reported),
        };
        (metrics, self.strategy.classify(&metrics))
    }

    fn risk_appetite(&self, reported: &[Finding]) -> u32 {
        let magnitudes: Vec<f64> = reported
            .iter()
            .filter_map(|f| f.magnitude)
            .filter(|m| !m.is_nan())
            .collect();
        if magnitudes.is_empty() || self.reference_magnitude <= 0.0 {
            return self.risk_bounds.clamp(0.0);
        }

        // Divide before summing so large magnitudes cannot overflow the mean
        let n = magnitudes.len() as f64;
        let mean: f64 = magnitudes.iter().map(|m| m / n).sum();
        let high = magnitudes.iter().filter(|&&m| m >= self.high_magnitude).count();

        let raw = mean / self.reference_magnitude * 100.0
            + high as f64 * self.high_magnitude_bonus.max(0.0);
        self.risk_bounds.clamp(raw)
    }

    /// Bounds of the four metrics, in result order
    pub fn bounds(&self) -> [MetricBounds; 4] {
        [
            self.risk_bounds,
            self.discipline.bounds,
            self.panic_propensity.bounds,
            self.resilience.bounds,
        ]
    }
}

fn searchable_text(finding: &Finding) -> String {
    let mut text = String::new();
    if let Some(summary) = &finding.summary {
        text.push_str(&summary.to_ascii_lowercase());
    }
    if let Some(interpretation) = &finding.interpretation {
        text.push(' ');
        text.push_str(&interpretation.to_ascii_lowercase());
    }
    text
}
