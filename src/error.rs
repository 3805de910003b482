use std::fmt;

use thiserror::Error;

/// Failure of a single Counter Source capability.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot read {what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {what}: {detail}")]
    Parse { what: String, detail: String },
    #[error("{0} is unavailable")]
    Unavailable(String),
}

impl SourceError {
    pub fn io(what: impl Into<String>, source: std::io::Error) -> Self {
        SourceError::Io {
            what: what.into(),
            source,
        }
    }

    pub fn parse(what: impl Into<String>, detail: impl Into<String>) -> Self {
        SourceError::Parse {
            what: what.into(),
            detail: detail.into(),
        }
    }

    pub fn unavailable(what: impl Into<String>) -> Self {
        SourceError::Unavailable(what.into())
    }
}

/// The four hard sub-samples of one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStage {
    Cpu,
    Memory,
    Processes,
    Uptime,
}

impl fmt::Display for SampleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleStage::Cpu => "cpu",
            SampleStage::Memory => "memory",
            SampleStage::Processes => "processes",
            SampleStage::Uptime => "uptime",
        };
        f.write_str(name)
    }
}

/// A hard failure that aborted a whole snapshot.
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("failed to get CPU stats: {0}")]
    Cpu(#[source] SourceError),
    #[error("failed to get memory stats: {0}")]
    Memory(#[source] SourceError),
    #[error("failed to get process list: {0}")]
    Processes(#[source] SourceError),
    #[error("failed to get uptime: {0}")]
    Uptime(#[source] SourceError),
}

impl SampleError {
    pub fn stage(&self) -> SampleStage {
        match self {
            SampleError::Cpu(_) => SampleStage::Cpu,
            SampleError::Memory(_) => SampleStage::Memory,
            SampleError::Processes(_) => SampleStage::Processes,
            SampleError::Uptime(_) => SampleStage::Uptime,
        }
    }
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;
pub type Result<T> = std::result::Result<T, SampleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_error_names_failing_stage() {
        let err = SampleError::Memory(SourceError::unavailable("/proc/meminfo"));
        assert_eq!(err.stage(), SampleStage::Memory);
        assert_eq!(
            err.to_string(),
            "failed to get memory stats: /proc/meminfo is unavailable"
        );
    }

    #[test]
    fn io_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = SampleError::Uptime(SourceError::io("/proc/uptime", io));
        assert_eq!(err.stage(), SampleStage::Uptime);
        let source = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(source.as_deref(), Some("cannot read /proc/uptime: gone"));
    }
}
