//! Subprocess plumbing shared by the script-backed collaborators.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Default locations of the extractor script, relative to the working
/// directory first, then the container layout.
pub const EXTRACTOR_CANDIDATES: &[&str] = &["app/utils/extract.py", "/app/app/utils/extract.py"];

pub const RISK_CANDIDATES: &[&str] = &[
    "app/models/risk_detector.py",
    "/app/app/models/risk_detector.py",
];

/// Longest stdout/stderr excerpt carried inside an error detail
const MAX_DETAIL_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("{0} script not found")]
    NotFound(&'static str),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} timed out after {secs}s")]
    Timeout { name: &'static str, secs: u64 },
}

/// Captured result of one script run.
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    /// Exit code; `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ScriptOutput {
    pub fn status_label(&self) -> String {
        self.code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string())
    }

    /// stdout followed by stderr, clipped for use in error details.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim().to_string();
        let err = self.stderr.trim();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        clip(&out, MAX_DETAIL_CHARS)
    }
}

/// Runs `<program> <script> <args...>` with a deadline.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    name: &'static str,
    program: PathBuf,
    script: Option<PathBuf>,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(
        name: &'static str,
        program: impl Into<PathBuf>,
        script: Option<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            name,
            program: program.into(),
            script,
            timeout,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn script(&self) -> Option<&Path> {
        self.script.as_deref()
    }

    /// Run the script to completion. A non-zero exit is not an error here;
    /// callers decide what it means from the captured output.
    pub async fn run<I, S>(&self, args: I) -> Result<ScriptOutput, ScriptError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let script = self.script.as_ref().ok_or(ScriptError::NotFound(self.name))?;
        let program = self.program.display().to_string();
        let start = Instant::now();

        let child = Command::new(&self.program)
            .arg(script)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ScriptError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Dropping the child on timeout kills it
        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ScriptError::Timeout {
                name: self.name,
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| ScriptError::Wait { program, source })?;

        let result = ScriptOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: start.elapsed(),
        };
        tracing::debug!(
            collaborator = self.name,
            status = %result.status_label(),
            duration_ms = result.duration.as_millis() as u64,
            stdout_bytes = result.stdout.len(),
            "script finished"
        );
        Ok(result)
    }
}

/// Interpreter for the scripts: explicit override, else `python3` or
/// `python` on PATH, else plain `python`.
pub fn find_python(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    ["python3", "python"]
        .iter()
        .find_map(|candidate| which::which(candidate).ok())
        .unwrap_or_else(|| PathBuf::from("python"))
}

/// Script location: explicit override as given, else the first existing
/// candidate (made absolute).
pub fn find_script(explicit: Option<&Path>, candidates: &[&str]) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    candidates
        .iter()
        .map(Path::new)
        .find(|p| p.is_file())
        .map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf()))
}

pub(crate) fn clip(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((offset, _)) => format!("{}…", &s[..offset]),
        None => s.to_string(),
    }
}
