pub mod config;
pub mod error;
pub mod format;
pub mod system;

pub use error::{SampleError, SampleStage, SourceError};
pub use system::{Sampler, SystemStats};
