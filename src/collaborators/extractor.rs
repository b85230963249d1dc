use super::script::{clip, ScriptError, ScriptOutput, ScriptRunner};
use crate::monitoring::metrics::observe_collaborator;
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("extractor reported: {0}")]
    Reported(String),

    #[error("extractor exited with status {status}: {output}")]
    Failed { status: String, output: String },

    #[error("invalid extractor output: {reason}: {output}")]
    InvalidOutput { reason: String, output: String },
}

/// Turns an uploaded file into plain text.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

#[derive(Debug, Deserialize)]
struct ExtractPayload {
    text: Option<String>,
    error: Option<String>,
}

/// Extractor backed by `extract.py --file <path>`, which prints
/// `{"text": ...}` or `{"error": ...}` on stdout.
#[derive(Debug, Clone)]
pub struct ScriptExtractor {
    runner: ScriptRunner,
    collapse: bool,
    max_bytes: Option<u64>,
}

impl ScriptExtractor {
    pub fn new(runner: ScriptRunner) -> Self {
        Self {
            runner,
            collapse: false,
            max_bytes: None,
        }
    }

    /// Ask the script to collapse whitespace runs into single spaces.
    pub fn with_collapse(mut self, collapse: bool) -> Self {
        self.collapse = collapse;
        self
    }

    /// Cap the extracted text size; `Some(0)` lifts the script's own cap.
    pub fn with_max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    fn args(&self, path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--file".into(), path.as_os_str().to_owned()];
        if self.collapse {
            args.push("--collapse".into());
        }
        if let Some(max) = self.max_bytes {
            args.push("--max-bytes".into());
            args.push(max.to_string().into());
        }
        args
    }
}

#[async_trait]
impl Extractor for ScriptExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let started = Instant::now();
        let result = match self.runner.run(self.args(path)).await {
            Ok(output) => parse_extract_output(&output),
            Err(e) => Err(e.into()),
        };
        let outcome = if result.is_ok() { "ok" } else { "error" };
        observe_collaborator("extractor", outcome, started.elapsed().as_secs_f64() * 1000.0);
        if let Err(e) = &result {
            tracing::warn!(path = %path.display(), error = %e, "text extraction failed");
        }
        result
    }
}

/// Interpret the extractor's stdout. An `error` field wins over the exit
/// status so the script's own message reaches the caller.
pub(crate) fn parse_extract_output(output: &ScriptOutput) -> Result<String, ExtractError> {
    match serde_json::from_str::<ExtractPayload>(output.stdout.trim()) {
        Ok(ExtractPayload {
            error: Some(error), ..
        }) if !error.is_empty() => Err(ExtractError::Reported(clip(&error, 2000))),
        _ if !output.success => Err(ExtractError::Failed {
            status: output.status_label(),
            output: output.combined(),
        }),
        Ok(ExtractPayload { text: Some(text), .. }) => Ok(text),
        Ok(_) => Err(ExtractError::InvalidOutput {
            reason: "missing 'text' field".to_string(),
            output: output.combined(),
        }),
        Err(e) => Err(ExtractError::InvalidOutput {
            reason: e.to_string(),
            output: output.combined(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn output(code: i32, stdout: &str) -> ScriptOutput {
        ScriptOutput {
            code: Some(code),
            success: code == 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_parse_success() {
        let text = parse_extract_output(&output(0, "{\"text\":\"hello world\"}\n")).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_parse_reported_error() {
        let err = parse_extract_output(&output(1, "{\"error\":\"file_not_found\"}")).unwrap_err();
        assert!(matches!(err, ExtractError::Reported(ref m) if m == "file_not_found"));
    }

    #[test]
    fn test_parse_nonzero_exit_without_payload() {
        let err = parse_extract_output(&output(2, "Traceback (most recent call last)")).unwrap_err();
        assert!(matches!(err, ExtractError::Failed { ref status, .. } if status == "2"));
    }

    #[test]
    fn test_parse_malformed() {
        let err = parse_extract_output(&output(0, "not json")).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidOutput { .. }));
        let err = parse_extract_output(&output(0, "{\"other\":1}")).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidOutput { ref reason, .. } if reason.contains("text")));
    }

    #[test]
    fn test_args() {
        let runner = ScriptRunner::new("extractor", "python3", None, Duration::from_secs(1));
        let extractor = ScriptExtractor::new(runner)
            .with_collapse(true)
            .with_max_bytes(Some(0));
        let args = extractor.args(Path::new("/tmp/upload.pdf"));
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["--file", "/tmp/upload.pdf", "--collapse", "--max-bytes", "0"]
        );
    }
}
