//! Conversion job bookkeeping

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Lifecycle of one conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One input PDF on its way to one output document.
///
/// Only the converter mutates a job, and it reaches a terminal state once;
/// later transitions are ignored.
#[derive(Debug)]
pub struct ConversionJob {
    pub id: Uuid,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    status: JobStatus,
    engine_output: String,
    failure_reason: Option<String>,
}

impl ConversionJob {
    pub fn new(input_path: &Path, output_path: &Path) -> Self {
        Self {
            id: Uuid::new_v4(),
            input_path: input_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            status: JobStatus::Pending,
            engine_output: String::new(),
            failure_reason: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Diagnostic text captured from the engine
    pub fn engine_output(&self) -> &str {
        &self.engine_output
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn start(&mut self) {
        if self.status != JobStatus::Pending {
            tracing::warn!(job_id = %self.id, status = ?self.status, "Job already started");
            return;
        }
        self.status = JobStatus::Running;
    }

    pub fn succeed(&mut self, engine_output: String) {
        if self.finish_guard() {
            self.status = JobStatus::Succeeded;
            self.engine_output = engine_output;
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>, engine_output: String) {
        if self.finish_guard() {
            self.status = JobStatus::Failed;
            self.failure_reason = Some(reason.into());
            self.engine_output = engine_output;
        }
    }

    fn finish_guard(&self) -> bool {
        if self.status.is_terminal() {
            tracing::warn!(job_id = %self.id, status = ?self.status, "Job already finished");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ConversionJob {
        ConversionJob::new(Path::new("uploads/in.pdf"), Path::new("uploads/in.docx"))
    }

    #[test]
    fn test_success_path() {
        let mut job = job();
        assert_eq!(job.status(), JobStatus::Pending);

        job.start();
        assert_eq!(job.status(), JobStatus::Running);

        job.succeed("Conversion successful".to_string());
        assert_eq!(job.status(), JobStatus::Succeeded);
        assert_eq!(job.engine_output(), "Conversion successful");
        assert!(job.failure_reason().is_none());
    }

    #[test]
    fn test_terminal_state_reached_once() {
        let mut job = job();
        job.start();
        job.fail("timeout", String::new());

        job.succeed("late".to_string());
        job.fail("again", "ignored".to_string());

        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.failure_reason(), Some("timeout"));
        assert_eq!(job.engine_output(), "");
    }
}
