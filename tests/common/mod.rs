#![allow(dead_code)]

use async_trait::async_trait;
use chunk_ingest::api::AppState;
use chunk_ingest::collaborators::{
    ExtractError, Extractor, RiskAnalyzer, RiskError, ScriptError,
};
use chunk_ingest::config::ApiConfig;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// What the fake extractor saw when it was called
#[derive(Debug, Clone)]
pub struct SeenUpload {
    pub path: PathBuf,
    pub existed: bool,
    pub contents: Vec<u8>,
}

pub struct FakeExtractor {
    pub reply: Result<String, String>,
    pub seen: Mutex<Option<SeenUpload>>,
}

impl FakeExtractor {
    pub fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            seen: Mutex::new(None),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            seen: Mutex::new(None),
        })
    }

    pub fn seen(&self) -> Option<SeenUpload> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        *self.seen.lock().unwrap() = Some(SeenUpload {
            path: path.to_path_buf(),
            existed: path.is_file(),
            contents: std::fs::read(path).unwrap_or_default(),
        });
        self.reply.clone().map_err(ExtractError::Reported)
    }
}

pub enum RiskReply {
    Report(Value),
    Missing,
    Garbage,
}

pub struct FakeRisk {
    pub reply: RiskReply,
    pub seen: Mutex<Vec<String>>,
}

impl FakeRisk {
    pub fn new(reply: RiskReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn report() -> Arc<Self> {
        Self::new(RiskReply::Report(json!([
            {"type": "auto_renewal", "severity": "medium"}
        ])))
    }
}

#[async_trait]
impl RiskAnalyzer for FakeRisk {
    async fn analyze(&self, text: &str) -> Result<Value, RiskError> {
        self.seen.lock().unwrap().push(text.to_string());
        match &self.reply {
            RiskReply::Report(v) => Ok(v.clone()),
            RiskReply::Missing => Err(ScriptError::NotFound("risk analyzer").into()),
            RiskReply::Garbage => Err(RiskError::InvalidOutput {
                reason: "expected value at line 1 column 1".to_string(),
                output: "high risk".to_string(),
            }),
        }
    }
}

pub fn state_with(
    config: &ApiConfig,
    extractor: Arc<dyn Extractor>,
    risk: Arc<dyn RiskAnalyzer>,
) -> AppState {
    AppState::new(config, extractor, risk)
}

pub fn default_state() -> AppState {
    state_with(
        &ApiConfig::default(),
        FakeExtractor::ok("extracted text"),
        FakeRisk::report(),
    )
}

pub const BOUNDARY: &str = "----chunkingestboundary";

pub enum Part<'a> {
    File {
        filename: &'a str,
        contents: &'a [u8],
    },
    Text(&'a str),
    Other {
        name: &'a str,
        value: &'a str,
    },
}

/// Encode a multipart/form-data body
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File { filename, contents } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(contents);
            }
            Part::Text(text) => {
                body.extend_from_slice(
                    b"Content-Disposition: form-data; name=\"text\"\r\n\r\n",
                );
                body.extend_from_slice(text.as_bytes());
            }
            Part::Other { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Build the app around `state` with every route registered
#[macro_export]
macro_rules! app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state))
                .configure(chunk_ingest::api::configure),
        )
        .await
    };
}

/// Same as `app!`, with request tracing and latency recording in front
#[macro_export]
macro_rules! traced_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state))
                .configure(chunk_ingest::api::configure)
                .wrap(chunk_ingest::monitoring::TraceMiddleware::new()),
        )
        .await
    };
}
