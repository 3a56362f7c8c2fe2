//! External Converter Engine
//!
//! Runs a converter program as `<program> [args…] <input.pdf> <output.docx>`
//! and judges the run by its exit status, its error channel, and whether the
//! output file exists afterwards.
//!
//! ## Error channel policy
//!
//! With [`StderrPolicy::Fatal`] (the default) any text on stderr fails the
//! conversion, even when the program exits cleanly and leaves an output file
//! behind. [`StderrPolicy::Tolerate`] logs the text instead.
//!
//! The wait is bounded: when the timeout expires the child is killed and the
//! conversion fails with reason `timeout`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{ConversionEngine, ConversionError, EngineReport};
use crate::config::{EngineKind, StderrPolicy};

/// Configuration for the external converter
#[derive(Debug, Clone)]
pub struct ExternalEngineConfig {
    /// Converter executable
    pub program: String,
    /// Arguments placed before the input and output paths
    pub args: Vec<String>,
    pub timeout: Duration,
    pub stderr_policy: StderrPolicy,
}

/// Strategy B: delegate to an external program
pub struct ExternalEngine {
    config: ExternalEngineConfig,
}

impl ExternalEngine {
    pub fn new(config: ExternalEngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConversionEngine for ExternalEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::External
    }

    fn describe(&self) -> String {
        if self.config.args.is_empty() {
            self.config.program.clone()
        } else {
            format!("{} {}", self.config.program, self.config.args.join(" "))
        }
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<EngineReport, ConversionError> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            ConversionError::engine_failed(format!("failed to start: {}", e), String::new())
        })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let result = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                ConversionError::engine_failed(format!("failed to wait: {}", e), String::new())
            })?,
            Err(_) => {
                tracing::warn!(
                    program = %self.config.program,
                    timeout_secs = self.config.timeout.as_secs_f64(),
                    "Converter timed out, killed"
                );
                return Err(ConversionError::engine_failed("timeout", String::new()));
            }
        };

        let stdout = String::from_utf8_lossy(&result.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();

        if !stderr.is_empty() {
            match self.config.stderr_policy {
                StderrPolicy::Fatal => {
                    return Err(ConversionError::engine_failed("engine reported errors", stderr));
                }
                StderrPolicy::Tolerate => {
                    tracing::warn!(program = %self.config.program, stderr = %stderr, "Converter wrote to stderr");
                }
            }
        }

        if !result.status.success() {
            let reason = match result.status.code() {
                Some(code) => format!("exited with code {}", code),
                None => "terminated by signal".to_string(),
            };
            return Err(ConversionError::engine_failed(reason, join_output(&stdout, &stderr)));
        }

        let produced = tokio::fs::metadata(output)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !produced {
            return Err(ConversionError::engine_failed("output file not created", stdout));
        }

        Ok(EngineReport { diagnostics: stdout })
    }
}

fn join_output(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (false, false) => format!("{}\n{}", stdout, stderr),
        (false, true) => stdout.to_string(),
        _ => stderr.to_string(),
    }
}
