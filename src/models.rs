use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Canonical result of a discovery query, produced by [`crate::normalize`].
///
/// Always well-formed: a response the normalizer could not interpret yields
/// empty text fields and an empty `results` list, with the untouched upstream
/// payload kept in `raw_response` for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResult {
    pub query_understanding: String,
    pub results: Vec<DataProductEntry>,
    pub recommended_action: String,
    /// Original upstream payload, retained for diagnostics only.
    pub raw_response: Value,
}

impl ParsedResult {
    /// Placeholder result for payloads with no extractable content.
    pub fn placeholder(raw_response: Value) -> Self {
        Self {
            query_understanding: String::new(),
            results: Vec::new(),
            recommended_action: String::new(),
            raw_response,
        }
    }

    /// True when the result carries nothing displayable.
    pub fn is_empty(&self) -> bool {
        self.query_understanding.is_empty()
            && self.results.is_empty()
            && self.recommended_action.is_empty()
    }
}

/// A single ranked data product entry. Rank order comes from upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataProductEntry {
    #[serde(default, alias = "data_product_name")]
    pub name: String,
    #[serde(default)]
    pub full_identifier: String,
    #[serde(default)]
    pub description: String,
    /// Fraction in [0,1]. Percentage inputs are converted on coercion.
    #[serde(default)]
    pub completeness_score: Option<f64>,
    #[serde(default)]
    pub health_status: Option<String>,
    #[serde(default)]
    pub table_names: Vec<String>,
}

/// A single role-tagged message sent to the serving endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Discovery query request
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Reuse an existing UI session; a fresh one is issued when absent.
    pub session_id: Option<Uuid>,
}

/// Discovery query response
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub session_id: Uuid,
    pub query: String,
    /// False when the upstream response could not be interpreted and the
    /// result is a placeholder.
    pub interpreted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub result: ParsedResult,
    pub queried_at: DateTime<Utc>,
}

/// Access request submission
#[derive(Debug, Clone, Deserialize)]
pub struct AccessRequest {
    pub data_product_name: String,
    pub session_id: Option<Uuid>,
    /// Overrides the configured catalog.schema securable when present.
    pub securable_full_name: Option<String>,
    pub comment: Option<String>,
}

/// Acknowledgment returned after submitting an access request
#[derive(Debug, Clone, Serialize)]
pub struct AccessRequestAck {
    pub success: bool,
    pub message: String,
    /// Upstream acknowledgment body, passed through untouched.
    pub response: Value,
}
