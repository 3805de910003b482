use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

use super::{CounterSource, CpuIdentity, CpuTimes, ProcessCounters, SwapCounters, VirtualMemory};
use crate::error::{SourceError, SourceResult};

/// Synthetic ticks per second per CPU, matching USER_HZ.
const TICKS_PER_SEC: f64 = 100.0;

/// Counter source backed by the `sysinfo` crate.
///
/// sysinfo reports CPU usage as a percentage rather than cumulative
/// counters, so this source integrates that percentage over wall time into
/// synthetic tick counters. Busy time is credited to `user`; `system` stays
/// zero.
pub struct SysinfoSource {
    inner: Mutex<Inner>,
}

struct Inner {
    sys: System,
    ticks: CpuTimes,
    last_cpu_refresh: Option<Instant>,
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();
        SysinfoSource {
            inner: Mutex::new(Inner {
                sys,
                ticks: CpuTimes::default(),
                last_cpu_refresh: Some(Instant::now()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CounterSource for SysinfoSource {
    fn cpu_times(&self) -> SourceResult<CpuTimes> {
        let mut inner = self.lock();
        inner.sys.refresh_cpu_all();
        let cpus = inner.sys.cpus().len();
        if cpus == 0 {
            return Err(SourceError::unavailable("sysinfo cpu list"));
        }

        let now = Instant::now();
        if let Some(last) = inner.last_cpu_refresh {
            let elapsed = now.duration_since(last).as_secs_f64() * TICKS_PER_SEC * cpus as f64;
            let busy_share = f64::from(inner.sys.global_cpu_usage()).clamp(0.0, 100.0) / 100.0;
            let busy = (elapsed * busy_share).round() as u64;
            let idle = (elapsed.round() as u64).saturating_sub(busy);
            inner.ticks.user = inner.ticks.user.saturating_add(busy);
            inner.ticks.idle = inner.ticks.idle.saturating_add(idle);
        }
        inner.last_cpu_refresh = Some(now);
        Ok(inner.ticks)
    }

    fn cpu_identity(&self) -> CpuIdentity {
        let inner = self.lock();
        let cpus = inner.sys.cpus();
        CpuIdentity {
            cores: cpus.len(),
            model_name: cpus
                .first()
                .map(|cpu| cpu.brand().trim().to_string())
                .filter(|brand| !brand.is_empty()),
        }
    }

    fn virtual_memory(&self) -> SourceResult<VirtualMemory> {
        let mut inner = self.lock();
        inner.sys.refresh_memory();
        let total = inner.sys.total_memory();
        if total == 0 {
            return Err(SourceError::unavailable("sysinfo memory counters"));
        }
        Ok(VirtualMemory {
            total,
            available: Some(inner.sys.available_memory()),
            free: inner.sys.free_memory(),
            buffers: 0,
            cached: 0,
        })
    }

    fn swap(&self) -> Option<SwapCounters> {
        let mut inner = self.lock();
        inner.sys.refresh_memory();
        let total = inner.sys.total_swap();
        if total == 0 {
            return None;
        }
        Some(SwapCounters {
            total,
            free: inner.sys.free_swap(),
        })
    }

    fn process_ids(&self) -> SourceResult<Vec<u32>> {
        let mut inner = self.lock();
        inner.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
        let mut pids: Vec<u32> = inner
            .sys
            .processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, _)| pid.as_u32())
            .collect();
        if pids.is_empty() {
            return Err(SourceError::unavailable("sysinfo process table"));
        }
        pids.sort_unstable();
        Ok(pids)
    }

    fn process(&self, pid: u32) -> SourceResult<ProcessCounters> {
        let inner = self.lock();
        let process = inner
            .sys
            .process(Pid::from_u32(pid))
            .ok_or_else(|| SourceError::unavailable(format!("process {pid}")))?;

        let name = process.name().to_string_lossy().to_string();
        Ok(ProcessCounters {
            name: Some(name).filter(|n| !n.is_empty()),
            exe: process.exe().map(|p| p.to_path_buf()),
            state: Some(status_code(process.status()).to_string()),
            cpu_percent: Some(f64::from(process.cpu_usage())),
            resident_bytes: Some(process.memory()),
            threads: process.tasks().map(|tasks| tasks.len() as u32),
        })
    }

    fn uptime(&self) -> SourceResult<f64> {
        Ok(System::uptime() as f64)
    }
}

/// Map sysinfo's status onto the single-letter codes of `/proc/[pid]/status`.
fn status_code(status: ProcessStatus) -> &'static str {
    match status {
        ProcessStatus::Run => "R",
        ProcessStatus::Sleep => "S",
        ProcessStatus::Idle => "I",
        ProcessStatus::UninterruptibleDiskSleep => "D",
        ProcessStatus::Stop => "T",
        ProcessStatus::Tracing => "t",
        ProcessStatus::Zombie => "Z",
        ProcessStatus::Dead => "X",
        _ => "?",
    }
}
