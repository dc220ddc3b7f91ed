use std::io;
use thiserror::Error;

/// Failures that prevent an assembly outcome from being produced.
///
/// A source that fails to assemble is not an error; it is an
/// [`AssemblyResult`](super::AssemblyResult) with `compiled == false`.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("assembly source is {len} bytes, limit is {max}")]
    SourceTooLarge { len: usize, max: usize },

    #[error("failed to stage assembly source: {0}")]
    Staging(#[source] io::Error),

    #[error("failed to start assembler '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to collect assembler output: {0}")]
    Wait(#[source] io::Error),

    #[error("assembler did not finish within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

impl AssembleError {
    /// Short reason safe to hand to clients (no paths, no OS detail)
    pub const fn public_reason(&self) -> &'static str {
        match self {
            Self::SourceTooLarge { .. } => "assembly source too large",
            Self::Staging(_) => "could not stage assembly source",
            Self::Spawn { .. } => "assembler unavailable",
            Self::Wait(_) => "assembler output could not be collected",
            Self::Timeout { .. } => "assembler timed out",
        }
    }
}
