//! Assembler invocation module
//!
//! Runs the external cross-assembler against one request's source text and
//! turns its exit status and diagnostics into an [`AssemblyResult`].
//! Each call stages its input in a private temporary directory, so
//! concurrent calls never see each other's files.

mod error;
mod staging;

use serde::Serialize;
use std::path::Path;
use std::process::{ExitStatus, Output, Stdio};
use tokio::process::Command;

use crate::config::AssemblerConfig;
use crate::logger;
use staging::StagingArea;

pub use error::AssembleError;

/// Prefix of the message returned for sources that assemble cleanly
pub const SUCCESS_NOTE: &str = "Compilation successful.";

/// Outcome of one assembler run, serialized as the response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyResult {
    pub compiled: bool,
    pub message: String,
}

/// Invokes the configured assembler binary
#[derive(Debug, Clone)]
pub struct Assembler {
    config: AssemblerConfig,
}

impl Assembler {
    pub const fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Assemble `source` and report whether the tool accepted it.
    ///
    /// A rejected source is `Ok` with `compiled == false`; `Err` is reserved
    /// for failures of the environment (staging, spawning, timeout).
    pub async fn assemble(&self, source: &str) -> Result<AssemblyResult, AssembleError> {
        if source.len() > self.config.max_source_bytes {
            return Err(AssembleError::SourceTooLarge {
                len: source.len(),
                max: self.config.max_source_bytes,
            });
        }

        let staging = StagingArea::create(self.config.staging_dir.as_deref(), source).await?;
        logger::log_debug(&format!(
            "[Assembler] Staged {} bytes in {}",
            source.len(),
            staging.dir_path().display()
        ));

        let output = self.run(&staging).await?;
        let diagnostics = String::from_utf8_lossy(&output.stderr);
        let message = staging.sanitize(&diagnostics, &self.config.placeholder);

        Ok(classify(output.status, message))
    }

    /// Spawn the assembler and wait for it, bounded by the configured timeout.
    ///
    /// On timeout the pending wait is dropped, which kills the child.
    async fn run(&self, staging: &StagingArea) -> Result<Output, AssembleError> {
        let child = self
            .command(staging.source_path(), staging.artifact_path())
            .spawn()
            .map_err(|source| AssembleError::Spawn {
                binary: self.config.binary.clone(),
                source,
            })?;

        match tokio::time::timeout(self.config.timeout(), child.wait_with_output()).await {
            Ok(output) => output.map_err(AssembleError::Wait),
            Err(_) => Err(AssembleError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }),
        }
    }

    /// `<binary> <flags...> <source> -o <artifact>` with the locale forced
    fn command(&self, source: &Path, artifact: &Path) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .args(&self.config.flags)
            .arg(source)
            .arg("-o")
            .arg(artifact)
            .env("LANG", &self.config.locale)
            // Either of these would override LANG
            .env_remove("LC_ALL")
            .env_remove("LC_MESSAGES")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Whether the assembler binary can be found (used by the readiness probe)
    pub async fn is_available(&self) -> bool {
        let binary = Path::new(&self.config.binary);
        if binary.components().count() > 1 {
            return is_file(binary).await;
        }
        let Some(paths) = std::env::var_os("PATH") else {
            return false;
        };
        for dir in std::env::split_paths(&paths) {
            if is_file(&dir.join(binary)).await {
                return true;
            }
        }
        false
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}

/// Exit code zero means the source assembled
fn classify(status: ExitStatus, diagnostics: String) -> AssemblyResult {
    if status.success() {
        return AssemblyResult {
            compiled: true,
            message: format!("{SUCCESS_NOTE}{diagnostics}"),
        };
    }

    let message = if diagnostics.trim().is_empty() {
        match status.code() {
            Some(code) => format!("Assembler exited with status {code}"),
            None => "Assembler terminated by a signal".to_string(),
        }
    } else {
        diagnostics
    };

    AssemblyResult {
        compiled: false,
        message,
    }
}
