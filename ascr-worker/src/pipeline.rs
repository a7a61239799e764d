//! Curation pipeline contract
//!
//! The pipeline takes a document (an uploaded article), the label it was
//! uploaded under and the curation instructions, and answers either
//! `{"status": "success", "data": ...}` or `{"status": "failed", "errors": [...]}`.
//! Its internals are opaque to the worker.

use ascr_common::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Instructions used when no instruction file is configured
pub const DEFAULT_INSTRUCTIONS: &str = "\
Extract every stem cell line described in the article.
Record each line under cell_line with its hpscreg_name as the identifier.
Only extract information that is explicitly stated in the text.";

#[derive(Debug, Clone)]
pub struct CurationInput {
    pub label: String,
    pub document: Vec<u8>,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CurationOutcome {
    Success { data: Value },
    Failed {
        #[serde(default)]
        errors: Vec<String>,
    },
}

impl CurationOutcome {
    /// Curated documents carried by a successful outcome
    ///
    /// An array yields its elements, `null` nothing, anything else is a
    /// single document.
    pub fn documents(&self) -> Vec<Value> {
        match self {
            CurationOutcome::Success { data: Value::Array(items) } => items.clone(),
            CurationOutcome::Success { data: Value::Null } => Vec::new(),
            CurationOutcome::Success { data } => vec![data.clone()],
            CurationOutcome::Failed { .. } => Vec::new(),
        }
    }
}

#[async_trait]
pub trait CurationPipeline: Send + Sync {
    async fn curate(&self, input: &CurationInput) -> Result<CurationOutcome>;
}

#[derive(Serialize)]
struct CurationRequest<'a> {
    label: &'a str,
    /// Base64-encoded document bytes
    document: String,
    instructions: &'a str,
}

/// Pipeline reached over HTTP
pub struct HttpCurationPipeline {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCurationPipeline {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CurationPipeline for HttpCurationPipeline {
    async fn curate(&self, input: &CurationInput) -> Result<CurationOutcome> {
        let request = CurationRequest {
            label: &input.label,
            document: general_purpose::STANDARD.encode(&input.document),
            instructions: &input.instructions,
        };

        debug!(label = %input.label, endpoint = %self.endpoint, bytes = input.document.len(), "Sending document for curation");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let outcome = response.json::<CurationOutcome>().await.map_err(|e| {
            Error::Internal(format!("Unexpected curation response from {}: {}", self.endpoint, e))
        })?;
        Ok(outcome)
    }
}
