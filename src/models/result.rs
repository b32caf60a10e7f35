use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Label recorded for probes that bypass the proxy pool
pub const DIRECT_LABEL: &str = "direct";

/// Placeholder for payload fields missing from a decoded response
pub const MISSING_FIELD: &str = "N/A";

/// How the response body of a successful probe is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Status code plus the body as text
    #[default]
    Raw,
    /// Body decoded as a listing envelope
    Json,
}

impl CaptureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::Raw => "raw",
            CaptureMode::Json => "json",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "raw" | "text" => Some(CaptureMode::Raw),
            "json" => Some(CaptureMode::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Expected shape of a JSON response body
///
/// Every level is optional; missing fields are rendered as [`MISSING_FIELD`]
/// at the output boundary. A `data` member that is not an object (a status
/// string, an empty array) is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingEnvelope {
    #[serde(default, deserialize_with = "object_or_none")]
    pub data: Option<ListingData>,
}

fn object_or_none<'de, D>(deserializer: D) -> Result<Option<ListingData>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(value @ Value::Object(_)) => serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub first_listed_at: Option<Value>,
    #[serde(default)]
    pub category: Option<Value>,
    #[serde(default)]
    pub title: Option<Value>,
}

impl ListingEnvelope {
    pub fn first_listed_at(&self) -> String {
        self.field(|d| d.first_listed_at.as_ref())
    }

    pub fn category(&self) -> String {
        self.field(|d| d.category.as_ref())
    }

    pub fn title(&self) -> String {
        self.field(|d| d.title.as_ref())
    }

    fn field(&self, pick: impl Fn(&ListingData) -> Option<&Value>) -> String {
        match self.data.as_ref().and_then(pick) {
            None | Some(Value::Null) => MISSING_FIELD.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// Captured body of a successful probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResponsePayload {
    Raw { status: u16, body: String },
    Json { status: u16, payload: ListingEnvelope },
}

impl ResponsePayload {
    pub fn status(&self) -> u16 {
        match self {
            ResponsePayload::Raw { status, .. } | ResponsePayload::Json { status, .. } => *status,
        }
    }
}

/// Outcome of one probe: either a payload or an error description, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ProbeOutcome {
    Success { response: ResponsePayload },
    Failure { error: String },
}

/// Record of a single probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Capture time (taken when the request is dispatched)
    pub timestamp: DateTime<Utc>,
    /// `direct` or the proxy's `ip:port`
    pub target: String,
    /// Elapsed time in fractional milliseconds
    pub latency_ms: f64,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

impl ProbeResult {
    pub fn success(
        timestamp: DateTime<Utc>,
        target: impl Into<String>,
        latency_ms: f64,
        response: ResponsePayload,
    ) -> Self {
        Self {
            timestamp,
            target: target.into(),
            latency_ms: latency_ms.max(0.0),
            outcome: ProbeOutcome::Success { response },
        }
    }

    pub fn failure(
        timestamp: DateTime<Utc>,
        target: impl Into<String>,
        latency_ms: f64,
        error: impl Into<String>,
    ) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error.push_str("unknown error");
        }
        Self {
            timestamp,
            target: target.into(),
            latency_ms: latency_ms.max(0.0),
            outcome: ProbeOutcome::Failure { error },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Success { .. })
    }

    pub fn is_direct(&self) -> bool {
        self.target == DIRECT_LABEL
    }

    pub fn response(&self) -> Option<&ResponsePayload> {
        match &self.outcome {
            ProbeOutcome::Success { response } => Some(response),
            ProbeOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ProbeOutcome::Success { .. } => None,
            ProbeOutcome::Failure { error } => Some(error),
        }
    }

    /// ISO-8601 timestamp with millisecond precision
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
