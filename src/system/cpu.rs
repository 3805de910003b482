use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use super::source::{CounterSource, CpuTimes};
use super::stats::CpuStats;
use crate::error::SourceResult;

#[derive(Clone, Copy, Debug)]
struct Baseline {
    times: CpuTimes,
    taken_at: SystemTime,
}

/// Turns successive cumulative CPU readings into a usage percentage.
///
/// Holds the one retained reading. The lock is held across the counter read
/// and the baseline update, so overlapping callers always see a complete
/// previous reading.
#[derive(Debug, Default)]
pub struct CpuDeltaEngine {
    baseline: Mutex<Option<Baseline>>,
}

impl CpuDeltaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the CPU counters and compute usage since the previous call.
    ///
    /// The first call reports a usage of 0. The baseline is replaced on every
    /// successful read; a failed read leaves it untouched.
    pub fn sample<S: CounterSource + ?Sized>(&self, source: &S) -> SourceResult<CpuStats> {
        let (usage, now) = {
            let mut baseline = self.baseline.lock().unwrap_or_else(PoisonError::into_inner);
            let now = source.cpu_times()?;
            let usage = baseline
                .as_ref()
                .map_or(0.0, |prev| usage_between(&prev.times, &now));
            *baseline = Some(Baseline {
                times: now,
                taken_at: SystemTime::now(),
            });
            (usage, now)
        };

        let identity = source.cpu_identity();
        Ok(CpuStats {
            usage,
            cores: identity.cores,
            model_name: identity.model_name.unwrap_or_default(),
            user: now.user,
            system: now.system,
            idle: now.idle,
        })
    }

    /// Wall-clock time of the retained reading, if any.
    pub fn last_sample_time(&self) -> Option<SystemTime> {
        self.baseline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|b| b.taken_at)
    }
}

/// Busy share between two readings, in percent.
///
/// Any counter regression (a restarted or wrapped source) yields 0, and
/// the result is always within 0..=100.
pub fn usage_between(prev: &CpuTimes, now: &CpuTimes) -> f64 {
    if now.user < prev.user || now.system < prev.system || now.idle < prev.idle {
        return 0.0;
    }
    let total_delta = now.total() as i128 - prev.total() as i128;
    let idle_delta = now.idle as i128 - prev.idle as i128;
    if total_delta <= 0 {
        return 0.0;
    }
    let total_delta = total_delta as f64;
    let idle_delta = idle_delta as f64;
    (100.0 * (total_delta - idle_delta) / total_delta).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::source::{Capability, ScriptedSource};
    use proptest::prelude::*;

    fn times(user: u64, system: u64, idle: u64) -> CpuTimes {
        CpuTimes::new(user, system, idle)
    }

    #[test]
    fn first_call_reports_zero() {
        let source = ScriptedSource::new().with_cpu_times([times(5_000, 2_000, 90_000)]);
        let engine = CpuDeltaEngine::new();
        assert!(engine.last_sample_time().is_none());
        let stats = engine.sample(&source).unwrap();
        assert_eq!(stats.usage, 0.0);
        assert_eq!((stats.user, stats.system, stats.idle), (5_000, 2_000, 90_000));
        assert!(engine.last_sample_time().is_some());
    }

    #[test]
    fn scripted_two_call_round_trip() {
        let source = ScriptedSource::new()
            .with_identity(8, Some("Scripted CPU"))
            .with_cpu_times([times(100, 50, 850), times(200, 100, 1600)]);
        let engine = CpuDeltaEngine::new();

        assert_eq!(engine.sample(&source).unwrap().usage, 0.0);
        let second = engine.sample(&source).unwrap();

        // total 1000 -> 1900, idle 850 -> 1600
        let expected = 100.0 * (900.0 - 750.0) / 900.0;
        assert!((second.usage - expected).abs() < 1e-9);
        assert!((second.usage - 16.666_666_666_666_668).abs() < 1e-9);
        assert_eq!(second.cores, 8);
        assert_eq!(second.model_name, "Scripted CPU");
    }

    #[test]
    fn identical_counters_mean_no_work() {
        let source = ScriptedSource::new().with_cpu_times([times(10, 10, 10)]);
        let engine = CpuDeltaEngine::new();
        engine.sample(&source).unwrap();
        assert_eq!(engine.sample(&source).unwrap().usage, 0.0);
    }

    #[test]
    fn all_idle_and_all_busy() {
        assert_eq!(usage_between(&times(10, 10, 10), &times(10, 10, 60)), 0.0);
        assert_eq!(usage_between(&times(10, 10, 10), &times(40, 30, 10)), 100.0);
    }

    #[test]
    fn regression_is_clamped_to_zero() {
        assert_eq!(usage_between(&times(500, 500, 500), &times(1, 1, 1)), 0.0);
    }

    #[test]
    fn idle_regression_with_growing_total_reports_zero() {
        // Idle 100 -> 50 while the total grows 100 -> 350.
        assert_eq!(usage_between(&times(0, 0, 100), &times(300, 0, 50)), 0.0);
        // User went backwards while idle grew.
        assert_eq!(usage_between(&times(50, 0, 0), &times(10, 0, 500)), 0.0);
    }

    #[test]
    fn engine_reports_zero_after_idle_regression() {
        let source = ScriptedSource::new().with_cpu_times([times(0, 0, 100), times(300, 0, 50)]);
        let engine = CpuDeltaEngine::new();
        engine.sample(&source).unwrap();
        assert_eq!(engine.sample(&source).unwrap().usage, 0.0);
    }

    #[test]
    fn missing_model_name_is_empty() {
        let source = ScriptedSource::new().with_identity(2, None);
        let stats = CpuDeltaEngine::new().sample(&source).unwrap();
        assert_eq!(stats.model_name, "");
        assert_eq!(stats.cores, 2);
    }

    #[test]
    fn failed_read_keeps_baseline() {
        let engine = CpuDeltaEngine::new();
        let failing = ScriptedSource::new().failing(Capability::CpuTimes);
        assert!(engine.sample(&failing).is_err());
        assert!(engine.last_sample_time().is_none());
    }

    #[test]
    fn overlapping_callers_see_consistent_deltas() {
        let readings: Vec<CpuTimes> = (1..=200).map(|i| times(i * 10, i * 5, i * 85)).collect();
        let source = ScriptedSource::new().with_cpu_times(readings);
        let engine = CpuDeltaEngine::new();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        let usage = engine.sample(&source).unwrap().usage;
                        // Every step is 10 user + 5 system out of 100.
                        assert!(usage == 0.0 || (usage - 15.0).abs() < 1e-9);
                    }
                });
            }
        });
    }

    proptest! {
        #[test]
        fn usage_is_a_percentage(
            pu in 0u64..1_000_000, ps in 0u64..1_000_000, pi in 0u64..1_000_000,
            nu in 0u64..1_000_000, ns in 0u64..1_000_000, ni in 0u64..1_000_000,
        ) {
            let usage = usage_between(&times(pu, ps, pi), &times(nu, ns, ni));
            prop_assert!((0.0..=100.0).contains(&usage));
        }

        #[test]
        fn shrinking_totals_report_zero(
            u in 1u64..1_000_000, s in 1u64..1_000_000, i in 1u64..1_000_000,
            du in 0u64..1_000, ds in 0u64..1_000, di in 1u64..1_000,
        ) {
            let prev = times(u + du, s + ds, i + di);
            let now = times(u, s, i);
            prop_assert_eq!(usage_between(&prev, &now), 0.0);
        }

        #[test]
        fn any_component_regression_reports_zero(
            u in 1u64..1_000_000, s in 0u64..1_000_000, i in 0u64..1_000_000,
            back in 1u64..1_000, grow in 0u64..1_000_000, which in 0usize..3,
        ) {
            let prev = times(u + back, s + back, i + back);
            let mut now = times(u + back + grow, s + back + grow, i + back + grow);
            match which {
                0 => now.user = u,
                1 => now.system = s,
                _ => now.idle = i,
            }
            prop_assert_eq!(usage_between(&prev, &now), 0.0);
        }
    }
}
