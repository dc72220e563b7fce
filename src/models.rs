use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::AppError;
use crate::normalizer::WorkflowStage;

// ============ Upstream (Sellsy) Models ============

/// Response body of the OAuth2 client-credentials exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token.
    pub access_token: Option<String>,
    /// Nominal lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Usually "Bearer".
    #[serde(default)]
    pub token_type: Option<String>,
}

/// One page of the opportunities list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpportunityPage {
    /// Opportunity objects, decoded leniently one by one.
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Pagination metadata. Missing or null counters read as zero.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    #[serde(default, deserialize_with = "lenient_count")]
    pub total: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub count: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub offset: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub limit: u64,
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Bearer credential issued by the token endpoint.
///
/// Valid for every request issued strictly before `issued_at + validity_window`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub issued_at: DateTime<Utc>,
    pub validity_window: Duration,
}

impl Credential {
    pub fn expires_at(&self) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(self.validity_window)
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.issued_at + window
    }

    pub fn is_valid_at(&self, instant: DateTime<Utc>) -> bool {
        instant < self.expires_at()
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("validity_window", &self.validity_window)
            .finish()
    }
}

/// One CRM opportunity as returned by the API. Every attribute may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawOpportunity {
    pub id: Option<String>,
    pub number: Option<String>,
    pub name: Option<String>,
    /// Creation timestamp, unparsed.
    pub created: Option<String>,
    pub status: Option<String>,
    pub pipeline: Option<String>,
    pub step: Option<String>,
    pub probability: Option<f64>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub source: Option<String>,
}

impl RawOpportunity {
    /// Decodes one opportunity object.
    ///
    /// Fields of an unexpected shape are replaced by `None` and reported through
    /// the returned `MalformedRecord` list; decoding itself never fails.
    pub fn from_value(value: &Value) -> (Self, Vec<AppError>) {
        let mut issues = Vec::new();
        let id = text_at(value, &["id"], None, &mut issues);
        let record_id = id.clone();

        let mut text = |path: &[&str]| text_at(value, path, record_id.as_deref(), &mut issues);
        let mut record = RawOpportunity {
            id,
            number: text(&["number"]),
            name: text(&["name"]),
            created: text(&["created"]),
            status: text(&["status"]),
            pipeline: text(&["pipeline", "name"]),
            step: text(&["step", "name"]),
            probability: None,
            amount: text(&["amount", "value"]),
            currency: text(&["amount", "currency"]),
            source: text(&["source", "name"]),
        };

        record.probability = match lookup(value, &["probability"]) {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(p) => Some(p),
                Err(_) => {
                    issues.push(malformed(record_id.as_deref(), "probability", "not a number"));
                    None
                }
            },
            Some(_) => {
                issues.push(malformed(record_id.as_deref(), "probability", "not a number"));
                None
            }
        };

        (record, issues)
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Reads a scalar at `path` as text. Numbers and booleans are stringified;
/// arrays and objects are malformed.
fn text_at(
    value: &Value,
    path: &[&str],
    record_id: Option<&str>,
    issues: &mut Vec<AppError>,
) -> Option<String> {
    match lookup(value, path) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => {
            let kind = if other.is_array() { "an array" } else { "an object" };
            issues.push(malformed(
                record_id,
                &path.join("."),
                &format!("expected a scalar, found {}", kind),
            ));
            None
        }
    }
}

fn malformed(record_id: Option<&str>, field: &str, reason: &str) -> AppError {
    AppError::MalformedRecord {
        record_id: record_id.map(str::to_string),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ============ Normalized Models ============

/// Analysis-ready lead derived from exactly one `RawOpportunity`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedLead {
    pub id: Option<String>,
    pub number: Option<String>,
    pub name: Option<String>,
    /// Parsed creation instant, `None` when missing or unparseable.
    pub created_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
    /// Pipeline label with boilerplate words stripped.
    pub pipeline: String,
    /// Step label as the CRM spelled it.
    pub raw_step: Option<String>,
    /// Canonical step group.
    pub step_group: String,
    pub workflow_stage: WorkflowStage,
    pub postal_code: Option<String>,
    pub department_code: Option<String>,
    pub department_name: Option<String>,
    pub probability: Option<f64>,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub source: Option<String>,
}

/// Output of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct LeadDataset {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
    /// Number of raw records retrieved before the post-filter.
    pub fetched: usize,
    pub leads: Vec<NormalizedLead>,
}
