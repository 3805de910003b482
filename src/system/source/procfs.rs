use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use super::{CounterSource, CpuIdentity, CpuTimes, ProcessCounters, SwapCounters, VirtualMemory};
use crate::error::{SourceError, SourceResult};

/// Clock ticks per second assumed for `/proc/[pid]/stat` times (USER_HZ).
const USER_HZ: f64 = 100.0;

/// Counter source backed by the Linux `/proc` filesystem.
#[derive(Debug)]
pub struct ProcfsSource {
    root: PathBuf,
    /// Uptime read when the process table was last listed, shared by every
    /// per-process CPU figure of that scan.
    scan_uptime: Mutex<Option<f64>>,
}

impl Default for ProcfsSource {
    fn default() -> Self {
        Self::with_root("/proc")
    }
}

impl ProcfsSource {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        ProcfsSource {
            root: root.into(),
            scan_uptime: Mutex::new(None),
        }
    }

    /// Check that the aggregate CPU counters can be read.
    pub fn check_readable(&self) -> SourceResult<()> {
        self.cpu_times().map(|_| ())
    }

    fn read(&self, rel: &str) -> SourceResult<String> {
        let path = self.root.join(rel);
        fs::read_to_string(&path).map_err(|e| SourceError::io(path.display().to_string(), e))
    }

    /// Uptime of the current scan, or a fresh read outside of one.
    fn uptime_for_scan(&self) -> Option<f64> {
        let cached = *self.scan_uptime.lock().unwrap_or_else(PoisonError::into_inner);
        cached.or_else(|| self.uptime().ok())
    }
}

impl CounterSource for ProcfsSource {
    fn cpu_times(&self) -> SourceResult<CpuTimes> {
        parse_stat_cpu(&self.read("stat")?)
    }

    fn cpu_identity(&self) -> CpuIdentity {
        self.read("cpuinfo")
            .map(|contents| parse_cpuinfo(&contents))
            .unwrap_or_default()
    }

    fn virtual_memory(&self) -> SourceResult<VirtualMemory> {
        parse_meminfo(&self.read("meminfo")?)
    }

    fn swap(&self) -> Option<SwapCounters> {
        parse_swap(&self.read("meminfo").ok()?)
    }

    fn memory_counters(&self) -> SourceResult<(VirtualMemory, Option<SwapCounters>)> {
        let meminfo = self.read("meminfo")?;
        Ok((parse_meminfo(&meminfo)?, parse_swap(&meminfo)))
    }

    /// Listing the table starts a scan: uptime is read once here and reused
    /// by every following [`process`](CounterSource::process) call.
    fn process_ids(&self) -> SourceResult<Vec<u32>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| SourceError::io(self.root.display().to_string(), e))?;
        let mut pids: Vec<u32> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();

        *self.scan_uptime.lock().unwrap_or_else(PoisonError::into_inner) = self.uptime().ok();
        Ok(pids)
    }

    fn process(&self, pid: u32) -> SourceResult<ProcessCounters> {
        let dir = self.root.join(pid.to_string());

        // A process whose status file is gone has exited.
        let status_path = dir.join("status");
        let status = fs::read_to_string(&status_path)
            .map_err(|e| SourceError::io(status_path.display().to_string(), e))?;
        let fields = parse_status(&status);

        let name = fs::read_to_string(dir.join("comm"))
            .ok()
            .map(|comm| comm.trim().to_string())
            .filter(|comm| !comm.is_empty());
        let exe = fs::read_link(dir.join("exe")).ok();

        let cpu_percent = fs::read_to_string(dir.join("stat"))
            .ok()
            .and_then(|stat| parse_pid_stat_times(&stat))
            .zip(self.uptime_for_scan())
            .and_then(|(times, uptime)| times.lifetime_cpu_percent(uptime));

        Ok(ProcessCounters {
            name,
            exe,
            state: fields.state,
            cpu_percent,
            resident_bytes: fields.resident_bytes,
            threads: fields.threads,
        })
    }

    fn uptime(&self) -> SourceResult<f64> {
        parse_uptime(&self.read("uptime")?)
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
fn parse_stat_cpu(contents: &str) -> SourceResult<CpuTimes> {
    let line = contents
        .lines()
        .next()
        .ok_or_else(|| SourceError::parse("/proc/stat", "empty file"))?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.first() != Some(&"cpu") || fields.len() < 5 {
        return Err(SourceError::parse(
            "/proc/stat",
            format!("unexpected first line `{line}`"),
        ));
    }
    // cpu user(1) nice(2) system(3) idle(4) ...
    let field = |idx: usize| -> SourceResult<u64> {
        fields[idx]
            .parse()
            .map_err(|_| SourceError::parse("/proc/stat", format!("bad counter `{}`", fields[idx])))
    };
    Ok(CpuTimes {
        user: field(1)?,
        system: field(3)?,
        idle: field(4)?,
    })
}

fn parse_cpuinfo(contents: &str) -> CpuIdentity {
    let mut identity = CpuIdentity::default();
    for line in contents.lines() {
        if line.starts_with("processor") {
            identity.cores += 1;
        } else if identity.model_name.is_none()
            && line.starts_with("model name")
            && let Some((_, value)) = line.split_once(':')
        {
            let value = value.trim();
            if !value.is_empty() {
                identity.model_name = Some(value.to_string());
            }
        }
    }
    identity
}

/// Iterate `Key: value kB` lines of `/proc/meminfo`, values converted to bytes.
fn meminfo_entries(contents: &str) -> impl Iterator<Item = (&str, u64)> {
    contents.lines().filter_map(|line| {
        let mut parts = line.split_whitespace();
        let key = parts.next()?.strip_suffix(':')?;
        let value: u64 = parts.next()?.parse().ok()?;
        Some((key, value.saturating_mul(1024)))
    })
}

fn parse_meminfo(contents: &str) -> SourceResult<VirtualMemory> {
    let mut total = None;
    let mut memory = VirtualMemory::default();
    for (key, value) in meminfo_entries(contents) {
        match key {
            "MemTotal" => total = Some(value),
            "MemAvailable" => memory.available = Some(value),
            "MemFree" => memory.free = value,
            "Buffers" => memory.buffers = value,
            "Cached" => memory.cached = value,
            _ => {}
        }
    }
    memory.total = total.ok_or_else(|| SourceError::parse("/proc/meminfo", "no MemTotal line"))?;
    Ok(memory)
}

fn parse_swap(contents: &str) -> Option<SwapCounters> {
    let mut total = None;
    let mut free = None;
    for (key, value) in meminfo_entries(contents) {
        match key {
            "SwapTotal" => total = Some(value),
            "SwapFree" => free = Some(value),
            _ => {}
        }
    }
    Some(SwapCounters {
        total: total?,
        free: free?,
    })
}

#[derive(Debug, Default, PartialEq)]
struct StatusFields {
    state: Option<String>,
    threads: Option<u32>,
    resident_bytes: Option<u64>,
}

fn parse_status(contents: &str) -> StatusFields {
    let mut fields = StatusFields::default();
    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        match key {
            "State:" => fields.state = Some(value.to_string()),
            "Threads:" => fields.threads = value.parse().ok(),
            "VmRSS:" => {
                fields.resident_bytes = value.parse::<u64>().ok().map(|kb| kb.saturating_mul(1024))
            }
            _ => {}
        }
    }
    fields
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PidTimes {
    utime: u64,
    stime: u64,
    starttime: u64,
}

impl PidTimes {
    /// Average CPU share over the whole life of the process, as `ps` reports it.
    fn lifetime_cpu_percent(&self, uptime: f64) -> Option<f64> {
        let elapsed = uptime - self.starttime as f64 / USER_HZ;
        if elapsed <= 0.0 {
            return None;
        }
        let busy = (self.utime + self.stime) as f64 / USER_HZ;
        Some(100.0 * busy / elapsed)
    }
}

fn parse_pid_stat_times(contents: &str) -> Option<PidTimes> {
    // comm field may contain spaces and parens, so find the closing )
    let after_comm = contents.rfind(')')? + 1;
    let fields: Vec<&str> = contents[after_comm..].split_whitespace().collect();
    // Fields after comm: state(0) ... utime(11) stime(12) cutime(13)
    // cstime(14) priority(15) nice(16) num_threads(17) itrealvalue(18)
    // starttime(19)
    Some(PidTimes {
        utime: fields.get(11)?.parse().ok()?,
        stime: fields.get(12)?.parse().ok()?,
        starttime: fields.get(19)?.parse().ok()?,
    })
}

fn parse_uptime(contents: &str) -> SourceResult<f64> {
    let first = contents
        .split_whitespace()
        .next()
        .ok_or_else(|| SourceError::parse("/proc/uptime", "invalid uptime format"))?;
    first
        .parse()
        .map_err(|_| SourceError::parse("/proc/uptime", format!("bad uptime `{first}`")))
}
