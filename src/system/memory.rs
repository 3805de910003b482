use super::source::{CounterSource, SwapCounters, VirtualMemory};
use super::stats::MemoryStats;
use crate::error::SourceResult;

/// Read memory and swap counters and derive the used fields.
pub fn sample_memory<S: CounterSource + ?Sized>(source: &S) -> SourceResult<MemoryStats> {
    let (memory, swap) = source.memory_counters()?;
    if swap.is_none() {
        tracing::debug!("swap counters unavailable, reporting zero swap");
    }
    Ok(build_memory_stats(&memory, swap))
}

/// Pure transform of one counter read.
///
/// Without an available-memory estimate `used` and `used_percent` stay 0.
/// Swap fields are all 0 unless both swap counters are present and
/// consistent.
pub fn build_memory_stats(memory: &VirtualMemory, swap: Option<SwapCounters>) -> MemoryStats {
    let used = memory
        .available
        .map_or(0, |available| memory.total.saturating_sub(available));
    let used_percent = if memory.total > 0 {
        used as f64 / memory.total as f64 * 100.0
    } else {
        0.0
    };

    let (swap_total, swap_free, swap_used) = swap
        .and_then(|s| Some((s.total, s.free, s.total.checked_sub(s.free)?)))
        .unwrap_or((0, 0, 0));

    MemoryStats {
        total: memory.total,
        available: memory.available.unwrap_or(0),
        used,
        used_percent,
        free: memory.free,
        buffers: memory.buffers,
        cached: memory.cached,
        swap_total,
        swap_free,
        swap_used,
    }
}
