use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ReportError;

/// Opaque identifier attached out-of-band to every request of one session.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the session id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Scenario the backend should route the query to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioHint {
    LearningWorkshop,
    ResearchLab,
    Assistant,
}

impl ScenarioHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LearningWorkshop => "learning_workshop",
            Self::ResearchLab => "research_lab",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for ScenarioHint {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "learning_workshop" => Ok(Self::LearningWorkshop),
            "research_lab" => Ok(Self::ResearchLab),
            "assistant" => Ok(Self::Assistant),
            other => Err(ReportError::Validation(format!(
                "unknown scenario hint: {other}"
            ))),
        }
    }
}

/// Request sent once over the channel, and again verbatim by the fallback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub query: String,
    #[serde(
        rename = "scenario_override",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub scenario_hint: Option<ScenarioHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Map<String, serde_json::Value>>,
    /// Optional LLM provider override understood by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub return_trace: bool,
}

impl ReportRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scenario_hint: None,
            context: None,
            provider: None,
            return_trace: false,
        }
    }

    pub fn scenario_hint(mut self, hint: ScenarioHint) -> Self {
        self.scenario_hint = Some(hint);
        self
    }

    /// Adds one context entry, creating the context object on first use.
    pub fn context_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn return_trace(mut self, enabled: bool) -> Self {
        self.return_trace = enabled;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ReportError> {
        if self.query.trim().is_empty() {
            return Err(ReportError::Validation("query must not be empty".into()));
        }
        if let Some(provider) = &self.provider
            && provider.trim().is_empty()
        {
            return Err(ReportError::Validation(
                "provider override must not be blank".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn to_json(&self) -> Result<String, ReportError> {
        serde_json::to_string(self)
            .map_err(|e| ReportError::Validation(format!("failed to serialize request: {e}")))
    }
}

/// Final report as produced by the backend, either inside a `final` event or
/// as the body of the blocking response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    #[serde(default = "default_scenario_type")]
    pub scenario_type: String,
    #[serde(default)]
    pub plan: Option<serde_json::Value>,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub plan_target_id: Option<String>,
    pub report: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Structured sections keyed by module (`data_analysis`, `strategy`, ...).
    #[serde(default)]
    pub segments: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub trace: Option<Vec<serde_json::Value>>,
}

fn default_scenario_type() -> String {
    ScenarioHint::Assistant.as_str().to_string()
}

impl ReportPayload {
    pub fn new(report: impl Into<String>) -> Self {
        Self {
            scenario_type: default_scenario_type(),
            report: report.into(),
            ..Self::default()
        }
    }

    /// Returns a named segment rendered as text.
    ///
    /// String segments are returned as-is, objects and arrays as pretty JSON.
    pub fn segment_text(&self, key: &str) -> Option<String> {
        match self.segments.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(text) if text.trim().is_empty() => None,
            serde_json::Value::String(text) => Some(text.clone()),
            other => serde_json::to_string_pretty(other).ok(),
        }
    }
}
