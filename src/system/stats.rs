use serde::Serialize;

/// One point-in-time sample of the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SystemStats {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    /// Ranked and truncated to at most [`MAX_PROCESSES`](crate::system::process::MAX_PROCESSES).
    pub processes: Vec<ProcessInfo>,
    /// Seconds since boot.
    pub uptime: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    /// Busy share of the interval since the previous sample, 0..=100.
    pub usage: f64,
    pub cores: usize,
    pub model_name: String,
    pub user: u64,
    pub system: u64,
    pub idle: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub used_percent: f64,
    pub free: u64,
    pub buffers: u64,
    pub cached: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub swap_used: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub state: String,
    pub cpu: f64,
    /// Resident set size in bytes.
    pub memory: u64,
    pub threads: u32,
}
