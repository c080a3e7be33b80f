// ==============================================================================
// scheduler/probe.rs - Lane Utilization Sampling
// ==============================================================================
// Description: External load sources consulted before each batch assignment
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.1.0
// ==============================================================================

use std::sync::Mutex;
use std::time::Instant;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};

use crate::models::LaneKind;

/// Source of external load on a lane's backing resource
///
/// Loads are fractions in [0, 1]; 0 means idle, 1 means fully busy. The
/// scheduler combines this with its own queue occupancy.
pub trait UtilizationProbe: Send + Sync {
    fn external_load(&self, lane: LaneKind) -> f64;
}

/// Queue occupancy only: no external load on any lane
#[derive(Debug, Clone, Copy, Default)]
pub struct OccupancyProbe;

impl UtilizationProbe for OccupancyProbe {
    fn external_load(&self, _lane: LaneKind) -> f64 {
        0.0
    }
}

/// Fixed per-lane loads, used to steer assignment deterministically
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLoadProbe {
    loads: [f64; 3],
}

impl FixedLoadProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_load(mut self, lane: LaneKind, load: f64) -> Self {
        self.loads[lane.slot()] = load;
        self
    }
}

impl UtilizationProbe for FixedLoadProbe {
    fn external_load(&self, lane: LaneKind) -> f64 {
        self.loads[lane.slot()]
    }
}

/// Processor load sampled through sysinfo for the CPU-backed lanes
///
/// Load is the larger of global CPU usage and the one-minute load average
/// over the core count. CPU usage is refreshed at most once per
/// `MINIMUM_CPU_UPDATE_INTERVAL`; calls in between reuse the last sample.
/// The accelerator lane reports no external load.
pub struct SystemLoadProbe {
    sampler: Mutex<CpuSampler>,
    cores: usize,
}

struct CpuSampler {
    system: System,
    sampled_at: Instant,
    usage: f64,
}

impl Default for SystemLoadProbe {
    fn default() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            sampler: Mutex::new(CpuSampler {
                system,
                sampled_at: Instant::now(),
                usage: 0.0,
            }),
            cores: num_cpus::get().max(1),
        }
    }
}

impl SystemLoadProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn cpu_usage(&self) -> f64 {
        let mut sampler = self
            .sampler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if sampler.sampled_at.elapsed() >= MINIMUM_CPU_UPDATE_INTERVAL {
            sampler.system.refresh_cpu_usage();
            sampler.usage = f64::from(sampler.system.global_cpu_usage()) / 100.0;
            sampler.sampled_at = Instant::now();
        }
        sampler.usage
    }

    fn cpu_load(&self) -> f64 {
        let average = System::load_average().one / self.cores as f64;
        combined_load(self.cpu_usage(), average)
    }
}

impl UtilizationProbe for SystemLoadProbe {
    fn external_load(&self, lane: LaneKind) -> f64 {
        match lane {
            LaneKind::Scalar | LaneKind::Vector => self.cpu_load(),
            LaneKind::Accelerator => 0.0,
        }
    }
}

/// Larger of two load readings, ignoring non-finite ones, capped at 1
fn combined_load(usage: f64, average: f64) -> f64 {
    [usage, average]
        .into_iter()
        .filter(|load| load.is_finite())
        .fold(0.0_f64, f64::max)
        .clamp(0.0, 1.0)
}

/// Spare capacity of a lane: free slot fraction scaled by external headroom
pub fn spare_capacity(ceiling: usize, in_flight: usize, external_load: f64) -> f64 {
    if ceiling == 0 || in_flight >= ceiling {
        return 0.0;
    }
    let load = if external_load.is_finite() {
        external_load.clamp(0.0, 1.0)
    } else {
        1.0
    };
    (ceiling - in_flight) as f64 / ceiling as f64 * (1.0 - load)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spare_capacity() {
        assert_eq!(spare_capacity(4, 0, 0.0), 1.0);
        assert_eq!(spare_capacity(4, 2, 0.0), 0.5);
        assert_eq!(spare_capacity(4, 2, 0.5), 0.25);
        assert_eq!(spare_capacity(4, 4, 0.0), 0.0);
        assert_eq!(spare_capacity(0, 0, 0.0), 0.0);
        assert_eq!(spare_capacity(2, 0, f64::NAN), 0.0);
        assert_eq!(spare_capacity(2, 0, 7.0), 0.0);
    }

    #[test]
    fn test_fixed_load_probe() {
        let probe = FixedLoadProbe::new().with_load(LaneKind::Vector, 0.75);
        assert_eq!(probe.external_load(LaneKind::Vector), 0.75);
        assert_eq!(probe.external_load(LaneKind::Scalar), 0.0);
    }

    #[test]
    fn test_combined_load() {
        assert_eq!(combined_load(0.25, 0.5), 0.5);
        assert_eq!(combined_load(0.75, 0.5), 0.75);
        assert_eq!(combined_load(f64::NAN, 0.5), 0.5);
        assert_eq!(combined_load(0.2, 3.0), 1.0);
        assert_eq!(combined_load(-1.0, f64::INFINITY), 0.0);
    }

    #[test]
    fn test_system_load_in_range() {
        let probe = SystemLoadProbe::new();
        for lane in [LaneKind::Scalar, LaneKind::Vector] {
            let load = probe.external_load(lane);
            assert!((0.0..=1.0).contains(&load), "{} load {}", lane, load);
        }
        assert_eq!(probe.external_load(LaneKind::Accelerator), 0.0);
    }
}
