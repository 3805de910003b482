use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::{CounterSource, CpuIdentity, CpuTimes, ProcessCounters, SwapCounters, VirtualMemory};
use crate::error::{SourceError, SourceResult};

/// A capability of [`ScriptedSource`] that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    CpuTimes,
    VirtualMemory,
    ProcessList,
    Uptime,
}

/// In-memory counter source replaying fixed values.
///
/// CPU readings are consumed one per `cpu_times` call; once the script runs
/// dry the last reading repeats. Used to drive the sampler deterministically.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    cpu: Mutex<CpuScript>,
    identity: CpuIdentity,
    memory: VirtualMemory,
    swap: Option<SwapCounters>,
    processes: Vec<(u32, Option<ProcessCounters>)>,
    uptime: f64,
    failing: Vec<Capability>,
}

#[derive(Debug, Default)]
struct CpuScript {
    pending: VecDeque<CpuTimes>,
    current: CpuTimes,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cpu_times(mut self, readings: impl IntoIterator<Item = CpuTimes>) -> Self {
        self.cpu
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .extend(readings);
        self
    }

    pub fn with_identity(mut self, cores: usize, model_name: Option<&str>) -> Self {
        self.identity = CpuIdentity {
            cores,
            model_name: model_name.map(str::to_string),
        };
        self
    }

    pub fn with_memory(mut self, memory: VirtualMemory) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_swap(mut self, total: u64, free: u64) -> Self {
        self.swap = Some(SwapCounters { total, free });
        self
    }

    pub fn with_process(mut self, pid: u32, counters: ProcessCounters) -> Self {
        self.processes.push((pid, Some(counters)));
        self
    }

    /// A pid that is listed but has exited by the time it is read.
    pub fn with_vanished_process(mut self, pid: u32) -> Self {
        self.processes.push((pid, None));
        self
    }

    pub fn with_uptime(mut self, seconds: f64) -> Self {
        self.uptime = seconds;
        self
    }

    pub fn failing(mut self, capability: Capability) -> Self {
        self.failing.push(capability);
        self
    }

    fn check(&self, capability: Capability) -> SourceResult<()> {
        if self.failing.contains(&capability) {
            let what = match capability {
                Capability::CpuTimes => "cpu counters",
                Capability::VirtualMemory => "memory counters",
                Capability::ProcessList => "process list",
                Capability::Uptime => "uptime",
            };
            return Err(SourceError::unavailable(what));
        }
        Ok(())
    }
}

impl CounterSource for ScriptedSource {
    fn cpu_times(&self) -> SourceResult<CpuTimes> {
        self.check(Capability::CpuTimes)?;
        let mut script = self.cpu.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = script.pending.pop_front() {
            script.current = next;
        }
        Ok(script.current)
    }

    fn cpu_identity(&self) -> CpuIdentity {
        self.identity.clone()
    }

    fn virtual_memory(&self) -> SourceResult<VirtualMemory> {
        self.check(Capability::VirtualMemory)?;
        Ok(self.memory)
    }

    fn swap(&self) -> Option<SwapCounters> {
        self.swap
    }

    fn process_ids(&self) -> SourceResult<Vec<u32>> {
        self.check(Capability::ProcessList)?;
        Ok(self.processes.iter().map(|(pid, _)| *pid).collect())
    }

    fn process(&self, pid: u32) -> SourceResult<ProcessCounters> {
        self.processes
            .iter()
            .find(|(candidate, _)| *candidate == pid)
            .and_then(|(_, counters)| counters.clone())
            .ok_or_else(|| SourceError::unavailable(format!("process {pid}")))
    }

    fn uptime(&self) -> SourceResult<f64> {
        if self.failing.contains(&Capability::Uptime) {
            return Err(SourceError::parse("uptime", "invalid uptime format"));
        }
        Ok(self.uptime)
    }
}
