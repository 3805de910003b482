use std::sync::atomic::AtomicBool;

use super::cpu::CpuDeltaEngine;
use super::memory::sample_memory;
use super::process::{ProcessEnumerator, RankingPolicy};
use super::source::CounterSource;
use super::stats::{CpuStats, MemoryStats, ProcessInfo, SystemStats};
use crate::error::{Result, SampleError, SourceError, SourceResult};

/// Assembles [`SystemStats`] from a counter source.
///
/// Owns the CPU baseline, so keep one `Sampler` alive for as long as usage
/// percentages should be computed against the previous call.
pub struct Sampler<S> {
    source: S,
    cpu: CpuDeltaEngine,
    processes: ProcessEnumerator,
}

impl<S: CounterSource> Sampler<S> {
    pub fn new(source: S) -> Self {
        Self::with_ranking(source, RankingPolicy::default())
    }

    pub fn with_ranking(source: S, ranking: RankingPolicy) -> Self {
        Sampler {
            source,
            cpu: CpuDeltaEngine::new(),
            processes: ProcessEnumerator::new(ranking),
        }
    }

    /// Take one snapshot: CPU, memory, processes, uptime, in that order.
    ///
    /// The first failing sub-sample aborts the snapshot and is named by the
    /// returned error.
    pub fn get_system_stats(&self) -> Result<SystemStats> {
        self.get_system_stats_with_cancel(&AtomicBool::new(false))
    }

    /// Snapshot whose process scan stops early once `cancel` is set.
    pub fn get_system_stats_with_cancel(&self, cancel: &AtomicBool) -> Result<SystemStats> {
        let _span = tracing::debug_span!("sampler.sample").entered();
        self.assemble(cancel).inspect_err(|err| {
            tracing::warn!(stage = %err.stage(), error = %err, "snapshot failed");
        })
    }

    fn assemble(&self, cancel: &AtomicBool) -> Result<SystemStats> {
        let cpu = self.sample_cpu().map_err(SampleError::Cpu)?;
        let memory = self.sample_memory().map_err(SampleError::Memory)?;
        let processes = self
            .sample_processes_with_cancel(cancel)
            .map_err(SampleError::Processes)?;
        let uptime = self.sample_uptime().map_err(SampleError::Uptime)?;

        Ok(SystemStats {
            cpu,
            memory,
            processes,
            uptime,
        })
    }

    pub fn sample_cpu(&self) -> SourceResult<CpuStats> {
        let _span = tracing::debug_span!("sampler.cpu").entered();
        self.cpu.sample(&self.source)
    }

    pub fn sample_memory(&self) -> SourceResult<MemoryStats> {
        let _span = tracing::debug_span!("sampler.memory").entered();
        sample_memory(&self.source)
    }

    pub fn sample_processes_with_cancel(
        &self,
        cancel: &AtomicBool,
    ) -> SourceResult<Vec<ProcessInfo>> {
        let _span = tracing::debug_span!("sampler.processes").entered();
        self.processes.sample_with_cancel(&self.source, cancel)
    }

    pub fn sample_uptime(&self) -> SourceResult<f64> {
        let _span = tracing::debug_span!("sampler.uptime").entered();
        let uptime = self.source.uptime()?;
        if !uptime.is_finite() || uptime < 0.0 {
            return Err(SourceError::parse("uptime", format!("out of range: {uptime}")));
        }
        Ok(uptime)
    }
}
