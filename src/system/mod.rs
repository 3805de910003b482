pub mod cpu;
pub mod memory;
pub mod process;
pub mod sampler;
pub mod source;
pub mod stats;

pub use sampler::Sampler;
pub use stats::{CpuStats, MemoryStats, ProcessInfo, SystemStats};
