use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;

use super::source::{CounterSource, ProcessCounters};
use super::stats::ProcessInfo;
use crate::error::SourceResult;

/// Upper bound on the number of processes in one snapshot.
pub const MAX_PROCESSES: usize = 50;

/// Which processes survive truncation to [`MAX_PROCESSES`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum RankingPolicy {
    /// Read every process, keep the 50 with the largest resident set.
    /// Ties are broken by ascending pid.
    #[default]
    #[serde(rename = "memory")]
    ResidentMemory,
    /// Keep the first 50 readable processes in listing order.
    #[serde(rename = "enumeration")]
    EnumerationOrder,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnumerator {
    policy: RankingPolicy,
}

impl ProcessEnumerator {
    pub fn new(policy: RankingPolicy) -> Self {
        ProcessEnumerator { policy }
    }

    /// List the process table and read each entry.
    ///
    /// Only a failure to list the table is an error. Processes that vanish
    /// or cannot be read are skipped.
    pub fn sample<S: CounterSource + ?Sized>(&self, source: &S) -> SourceResult<Vec<ProcessInfo>> {
        self.sample_with_cancel(source, &AtomicBool::new(false))
    }

    /// Like [`sample`](Self::sample), but stops reading further processes
    /// once `cancel` is set. Entries read so far are still ranked and
    /// returned.
    pub fn sample_with_cancel<S: CounterSource + ?Sized>(
        &self,
        source: &S,
        cancel: &AtomicBool,
    ) -> SourceResult<Vec<ProcessInfo>> {
        let pids = source.process_ids()?;
        let listed = pids.len();

        let readable = pids
            .into_iter()
            .take_while(|_| !cancel.load(Ordering::Relaxed))
            .filter_map(|pid| read_process(source, pid));

        let processes = match self.policy {
            RankingPolicy::EnumerationOrder => readable.take(MAX_PROCESSES).collect(),
            RankingPolicy::ResidentMemory => rank_by_memory(readable.collect()),
        };

        tracing::debug!(listed, kept = processes.len(), policy = ?self.policy, "process table sampled");
        Ok(processes)
    }
}

/// Sort descending by resident memory (ties by pid) and keep the top entries.
pub fn rank_by_memory(mut processes: Vec<ProcessInfo>) -> Vec<ProcessInfo> {
    processes.sort_by(|a, b| b.memory.cmp(&a.memory).then(a.pid.cmp(&b.pid)));
    processes.truncate(MAX_PROCESSES);
    processes
}

fn read_process<S: CounterSource + ?Sized>(source: &S, pid: u32) -> Option<ProcessInfo> {
    match source.process(pid) {
        Ok(counters) => Some(to_process_info(pid, counters)),
        Err(err) => {
            tracing::trace!(pid, error = %err, "skipping unreadable process");
            None
        }
    }
}

fn to_process_info(pid: u32, counters: ProcessCounters) -> ProcessInfo {
    let name = counters
        .name
        .filter(|name| !name.is_empty())
        .or_else(|| {
            counters
                .exe
                .as_deref()
                .and_then(|exe| exe.file_name())
                .map(|file| file.to_string_lossy().to_string())
        })
        .unwrap_or_default();

    ProcessInfo {
        pid,
        name,
        state: counters.state.unwrap_or_default(),
        cpu: counters
            .cpu_percent
            .filter(|cpu| cpu.is_finite() && *cpu >= 0.0)
            .unwrap_or(0.0),
        memory: counters.resident_bytes.unwrap_or(0),
        threads: counters.threads.unwrap_or(0),
    }
}
