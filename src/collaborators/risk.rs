use super::script::{ScriptError, ScriptOutput, ScriptRunner};
use crate::monitoring::metrics::observe_collaborator;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;
use thiserror::Error;

/// Largest text passed to the risk script. It travels as a single argv
/// entry and Linux caps one argument at 128 KiB.
pub const MAX_RISK_TEXT_BYTES: usize = 100 * 1024;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("risk analyzer exited with status {status}: {output}")]
    Failed { status: String, output: String },

    #[error("invalid risk analyzer output: {reason}: {output}")]
    InvalidOutput { reason: String, output: String },

    #[error("text of {len} bytes exceeds the {limit} byte risk limit")]
    TooLarge { len: usize, limit: usize },
}

/// Scores free text and returns an arbitrary JSON document.
#[async_trait]
pub trait RiskAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<Value, RiskError>;
}

/// Risk analyzer backed by `risk_detector.py "<text>"`.
#[derive(Debug, Clone)]
pub struct ScriptRiskAnalyzer {
    runner: ScriptRunner,
}

impl ScriptRiskAnalyzer {
    pub fn new(runner: ScriptRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }
}

#[async_trait]
impl RiskAnalyzer for ScriptRiskAnalyzer {
    async fn analyze(&self, text: &str) -> Result<Value, RiskError> {
        if text.len() > MAX_RISK_TEXT_BYTES {
            return Err(RiskError::TooLarge {
                len: text.len(),
                limit: MAX_RISK_TEXT_BYTES,
            });
        }
        let started = Instant::now();
        let result = match self.runner.run([text]).await {
            Ok(output) => parse_risk_output(&output),
            Err(e) => Err(e.into()),
        };
        let outcome = if result.is_ok() { "ok" } else { "error" };
        observe_collaborator("risk", outcome, started.elapsed().as_secs_f64() * 1000.0);
        if let Err(e) = &result {
            tracing::warn!(text_bytes = text.len(), error = %e, "risk analysis failed");
        }
        result
    }
}

pub(crate) fn parse_risk_output(output: &ScriptOutput) -> Result<Value, RiskError> {
    if !output.success {
        return Err(RiskError::Failed {
            status: output.status_label(),
            output: output.combined(),
        });
    }
    serde_json::from_str(output.stdout.trim()).map_err(|e| RiskError::InvalidOutput {
        reason: e.to_string(),
        output: output.combined(),
    })
}
