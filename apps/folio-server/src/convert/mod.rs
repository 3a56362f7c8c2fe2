//! Conversion Engine Adapter
//!
//! Turns one uploaded PDF into one Word document. The actual byte
//! transformation is delegated to a [`ConversionEngine`]:
//!
//! - [`LibraryEngine`]: in-process (`lopdf` page text → `docx-rs` document)
//! - [`ExternalEngine`]: an external converter program
//!
//! The engine is picked once at startup from [`EngineConfig`]; a request never
//! mixes strategies. [`Converter`] wraps the engine with job bookkeeping,
//! admission control, and scratch-file ownership.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = convert::build_engine(&config.engine)?;
//! let converter = Converter::new(engine, config.engine.max_concurrent, scratch);
//!
//! let artifact = converter.convert(upload).await?;
//! // artifact.file is the DOCX; dropping the artifact removes both scratch files
//! ```

mod external;
mod job;
mod library;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::config::{ConfigError, EngineConfig, EngineKind};
use crate::scratch::{ScratchDir, ScratchFile};
use crate::upload::UploadedFile;

pub use external::{ExternalEngine, ExternalEngineConfig};
pub use job::{ConversionJob, JobStatus};
pub use library::{assemble_docx, extract_pages, LibraryEngine, PAGE_SEPARATOR};

/// Content type of the produced artifact
pub const DOCX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Conversion failures
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Failed to assemble DOCX: {0}")]
    Assembly(String),

    #[error("Conversion engine failed: {reason}")]
    EngineFailed { reason: String, diagnostics: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConversionError {
    pub fn engine_failed(reason: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::EngineFailed {
            reason: reason.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Short reason recorded on the job
    fn reason(&self) -> String {
        match self {
            Self::EngineFailed { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }

    fn diagnostics(&self) -> &str {
        match self {
            Self::EngineFailed { diagnostics, .. } => diagnostics,
            _ => "",
        }
    }
}

/// What an engine reports back on success
#[derive(Debug, Default)]
pub struct EngineReport {
    /// Captured, non-fatal engine output
    pub diagnostics: String,
}

/// A strategy that converts the PDF at `input` into a DOCX at `output`
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Human-readable description for diagnostics
    fn describe(&self) -> String;

    async fn convert(&self, input: &Path, output: &Path) -> Result<EngineReport, ConversionError>;
}

/// Build the engine selected by configuration
pub fn build_engine(config: &EngineConfig) -> Result<Arc<dyn ConversionEngine>, ConfigError> {
    match config.kind {
        EngineKind::Library => Ok(Arc::new(LibraryEngine::new())),
        EngineKind::External => {
            let program = config.program.clone().ok_or(ConfigError::MissingProgram)?;
            Ok(Arc::new(ExternalEngine::new(ExternalEngineConfig {
                program,
                args: config.args.clone(),
                timeout: config.timeout,
                stderr_policy: config.stderr_policy,
            })))
        }
    }
}

/// A successfully produced document, ready to stream.
///
/// Owns both scratch files of the request: dropping it removes them.
#[derive(Debug)]
pub struct Artifact {
    pub file: ScratchFile,
    pub source: ScratchFile,
    pub content_type: &'static str,
    pub suggested_filename: String,
    pub size_bytes: u64,
}

/// Runs uploads through the configured engine
#[derive(Clone)]
pub struct Converter {
    engine: Arc<dyn ConversionEngine>,
    slots: Arc<Semaphore>,
    scratch: ScratchDir,
}

impl Converter {
    pub fn new(engine: Arc<dyn ConversionEngine>, max_concurrent: usize, scratch: ScratchDir) -> Self {
        Self {
            engine,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            scratch,
        }
    }

    pub fn engine(&self) -> &dyn ConversionEngine {
        self.engine.as_ref()
    }

    /// Convert `upload` into a DOCX artifact.
    ///
    /// Waits for a free conversion slot first. On failure the input and any
    /// output the engine left behind are removed before the error returns.
    pub async fn convert(&self, upload: UploadedFile) -> Result<Artifact, ConversionError> {
        let UploadedFile {
            file: source,
            original_name,
            size_bytes: input_bytes,
            ..
        } = upload;
        let output = self.scratch.adopt(self.scratch.allocate("docx"));
        let mut job = ConversionJob::new(source.path(), output.path());

        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| ConversionError::Internal("conversion slots closed".to_string()))?;

        job.start();
        tracing::info!(
            job_id = %job.id,
            engine = ?self.engine.kind(),
            file_name = %original_name,
            bytes = input_bytes,
            "Conversion started"
        );
        let started = Instant::now();

        match run_engine(self.engine.as_ref(), &job).await {
            Ok((report, size_bytes)) => {
                job.succeed(report.diagnostics);
                tracing::info!(
                    job_id = %job.id,
                    output_bytes = size_bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Conversion succeeded"
                );
                tracing::debug!(job_id = %job.id, engine_output = %job.engine_output(), "Engine output");

                Ok(Artifact {
                    file: output,
                    source,
                    content_type: DOCX_MIME_TYPE,
                    suggested_filename: suggested_filename(&original_name, "docx"),
                    size_bytes,
                })
            }
            Err(err) => {
                job.fail(err.reason(), err.diagnostics().to_string());
                tracing::error!(
                    job_id = %job.id,
                    reason = job.failure_reason().unwrap_or_default(),
                    engine_output = %job.engine_output(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Conversion failed"
                );
                drop(source);
                drop(output);
                Err(err)
            }
        }
    }
}

async fn run_engine(
    engine: &dyn ConversionEngine,
    job: &ConversionJob,
) -> Result<(EngineReport, u64), ConversionError> {
    let report = engine.convert(&job.input_path, &job.output_path).await?;
    let size_bytes = tokio::fs::metadata(&job.output_path).await?.len();
    Ok((report, size_bytes))
}

/// Download name: the upload's basename with `extension` substituted.
///
/// Path components, quotes and control characters are stripped; an empty
/// result becomes `document`.
pub fn suggested_filename(original_name: &str, extension: &str) -> String {
    let base = original_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    // ".pdf" has an empty stem and falls back below
    let stem = match base.rfind('.') {
        Some(index) => &base[..index],
        None => base,
    };
    let cleaned: String = stem
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        format!("document.{}", extension)
    } else {
        format!("{}.{}", cleaned, extension)
    }
}
