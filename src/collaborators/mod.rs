//! External collaborators driven by the API layer.
//!
//! Both collaborators are opaque processes. The traits keep handlers
//! independent of how text is extracted or scored, so tests can swap in
//! in-process fakes.

pub mod extractor;
pub mod risk;
pub mod script;

pub use extractor::{ExtractError, Extractor, ScriptExtractor};
pub use risk::{RiskAnalyzer, RiskError, ScriptRiskAnalyzer, MAX_RISK_TEXT_BYTES};
pub use script::{ScriptError, ScriptOutput, ScriptRunner};

use crate::config::ApiConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Resolve interpreter and script paths from configuration and build the
/// script-backed collaborators.
pub fn from_config(config: &ApiConfig) -> (Arc<dyn Extractor>, Arc<dyn RiskAnalyzer>) {
    let python = script::find_python(config.python_bin.as_deref());
    let extract_script =
        script::find_script(config.extract_script.as_deref(), script::EXTRACTOR_CANDIDATES);
    let risk_script = script::find_script(config.risk_script.as_deref(), script::RISK_CANDIDATES);

    info!(python = %python.display(), "collaborator interpreter");
    match &extract_script {
        Some(path) => info!(script = %path.display(), "extractor script"),
        None => warn!(
            candidates = ?script::EXTRACTOR_CANDIDATES,
            "extractor script not found; file uploads will fail until PY_EXTRACT_SCRIPT is set"
        ),
    }
    match &risk_script {
        Some(path) => info!(script = %path.display(), "risk script"),
        None => warn!(
            candidates = ?script::RISK_CANDIDATES,
            "risk script not found; /risk will fail until RISK_SCRIPT is set"
        ),
    }

    let extractor = ScriptExtractor::new(ScriptRunner::new(
        "extractor",
        python.clone(),
        extract_script,
        config.collaborator_timeout,
    ))
    .with_collapse(config.extract_collapse)
    .with_max_bytes(config.extract_max_bytes);

    let risk = ScriptRiskAnalyzer::new(ScriptRunner::new(
        "risk analyzer",
        python,
        risk_script,
        config.collaborator_timeout,
    ));

    (Arc::new(extractor), Arc::new(risk))
}
