use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::SourceResult;

mod procfs;
mod scripted;
mod sysinfo_source;

pub use self::procfs::ProcfsSource;
pub use self::scripted::{Capability, ScriptedSource};
pub use self::sysinfo_source::SysinfoSource;

/// Cumulative CPU time-in-state counters, summed over all CPUs.
///
/// Units are whatever the source counts in (kernel ticks for `/proc/stat`);
/// only differences between two readings of the same source are meaningful.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub system: u64,
    pub idle: u64,
}

impl CpuTimes {
    pub fn new(user: u64, system: u64, idle: u64) -> Self {
        CpuTimes { user, system, idle }
    }

    pub fn total(&self) -> u128 {
        self.user as u128 + self.system as u128 + self.idle as u128
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuIdentity {
    /// Logical cores.
    pub cores: usize,
    pub model_name: Option<String>,
}

/// Raw virtual-memory counters in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VirtualMemory {
    pub total: u64,
    /// `None` when the source cannot estimate available memory.
    pub available: Option<u64>,
    pub free: u64,
    pub buffers: u64,
    pub cached: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwapCounters {
    pub total: u64,
    pub free: u64,
}

/// Per-process counters. Every field is best-effort.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessCounters {
    pub name: Option<String>,
    pub exe: Option<PathBuf>,
    pub state: Option<String>,
    pub cpu_percent: Option<f64>,
    pub resident_bytes: Option<u64>,
    pub threads: Option<u32>,
}

/// Provider of raw host counters.
///
/// Implementations must be shareable across threads; any internal caching
/// they need is their own business.
pub trait CounterSource: Send + Sync {
    fn cpu_times(&self) -> SourceResult<CpuTimes>;

    /// Never fails: unknown values are reported as zero / `None`.
    fn cpu_identity(&self) -> CpuIdentity;

    fn virtual_memory(&self) -> SourceResult<VirtualMemory>;

    /// `None` when swap counters are not (completely) available.
    fn swap(&self) -> Option<SwapCounters>;

    /// Memory and swap counters from one read of the host's memory state.
    fn memory_counters(&self) -> SourceResult<(VirtualMemory, Option<SwapCounters>)> {
        Ok((self.virtual_memory()?, self.swap()))
    }

    fn process_ids(&self) -> SourceResult<Vec<u32>>;

    /// Fails when the process is gone or cannot be read at all.
    fn process(&self, pid: u32) -> SourceResult<ProcessCounters>;

    /// Seconds since boot.
    fn uptime(&self) -> SourceResult<f64>;
}

impl<S: CounterSource + ?Sized> CounterSource for Box<S> {
    fn cpu_times(&self) -> SourceResult<CpuTimes> {
        (**self).cpu_times()
    }

    fn cpu_identity(&self) -> CpuIdentity {
        (**self).cpu_identity()
    }

    fn virtual_memory(&self) -> SourceResult<VirtualMemory> {
        (**self).virtual_memory()
    }

    fn swap(&self) -> Option<SwapCounters> {
        (**self).swap()
    }

    fn memory_counters(&self) -> SourceResult<(VirtualMemory, Option<SwapCounters>)> {
        (**self).memory_counters()
    }

    fn process_ids(&self) -> SourceResult<Vec<u32>> {
        (**self).process_ids()
    }

    fn process(&self, pid: u32) -> SourceResult<ProcessCounters> {
        (**self).process(pid)
    }

    fn uptime(&self) -> SourceResult<f64> {
        (**self).uptime()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Auto,
    Procfs,
    Sysinfo,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(SourceKind::Auto),
            "procfs" => Ok(SourceKind::Procfs),
            "sysinfo" => Ok(SourceKind::Sysinfo),
            other => Err(format!(
                "unknown source `{other}` (expected auto, procfs or sysinfo)"
            )),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Auto => "auto",
            SourceKind::Procfs => "procfs",
            SourceKind::Sysinfo => "sysinfo",
        })
    }
}

/// Open the counter source selected by `kind`.
///
/// `Auto` prefers the kernel interface on Linux when `proc_root` is readable
/// and falls back to the sysinfo library everywhere else.
pub fn open_source(kind: SourceKind, proc_root: &Path) -> SourceResult<Box<dyn CounterSource>> {
    match kind {
        SourceKind::Procfs => {
            let source = ProcfsSource::with_root(proc_root);
            source.check_readable()?;
            Ok(Box::new(source))
        }
        SourceKind::Sysinfo => Ok(Box::new(SysinfoSource::new())),
        SourceKind::Auto => {
            if procfs_supported() {
                let source = ProcfsSource::with_root(proc_root);
                match source.check_readable() {
                    Ok(()) => return Ok(Box::new(source)),
                    Err(err) => {
                        tracing::debug!(error = %err, "proc root not usable, using sysinfo");
                    }
                }
            }
            Ok(Box::new(SysinfoSource::new()))
        }
    }
}

fn procfs_supported() -> bool {
    cfg!(target_os = "linux")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_parses_case_insensitively() {
        assert_eq!("procfs".parse::<SourceKind>(), Ok(SourceKind::Procfs));
        assert_eq!("SysInfo".parse::<SourceKind>(), Ok(SourceKind::Sysinfo));
        assert_eq!("auto".parse::<SourceKind>(), Ok(SourceKind::Auto));
        assert!("wmi".parse::<SourceKind>().is_err());
    }

    #[test]
    fn cpu_times_total_does_not_overflow() {
        let times = CpuTimes::new(u64::MAX, u64::MAX, u64::MAX);
        assert_eq!(times.total(), 3 * u64::MAX as u128);
    }

    #[test]
    fn procfs_with_missing_root_is_rejected() {
        let result = open_source(
            SourceKind::Procfs,
            Path::new("/nonexistent/hostpulse/proc"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn boxed_source_delegates() {
        let source: Box<dyn CounterSource> =
            Box::new(ScriptedSource::new().with_uptime(42.5));
        assert_eq!(source.uptime().ok(), Some(42.5));
    }
}
