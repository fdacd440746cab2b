//! The step schema exchanged with the model.
//!
//! Every model turn is a single JSON object such as
//! `{"step":"action","tool":"getWeatherInfo","input":"Patiala"}`. The loop
//! answers tool calls with `{"step":"observe","content":"..."}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StepwiseError};

/// One structured unit of the think/action/observe/output protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "lowercase")]
pub enum StepRecord {
    Think { content: String },
    Action { tool: String, input: String },
    Observe { content: String },
    Output { content: String },
}

/// Wire shape before validation. All keys are optional on the wire.
#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    step: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl StepRecord {
    /// Parse a model response, rejecting anything outside the step schema.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: String| {
            StepwiseError::Protocol(format!(
                "expected a JSON step object, got `{raw}`: {reason}"
            ))
        };
        let value: Value =
            serde_json::from_str(raw.trim()).map_err(|err| invalid(err.to_string()))?;
        if !value.is_object() {
            return Err(invalid("not an object".into()));
        }
        let parsed: RawStep =
            serde_json::from_value(value).map_err(|err| invalid(err.to_string()))?;

        let tag = parsed
            .step
            .ok_or_else(|| StepwiseError::Protocol(format!("missing `step` in `{raw}`")))?;

        match tag.as_str() {
            "think" => Ok(StepRecord::Think {
                content: require(parsed.content, "content", &tag)?,
            }),
            "output" => Ok(StepRecord::Output {
                content: require(parsed.content, "content", &tag)?,
            }),
            "observe" => Ok(StepRecord::Observe {
                content: parsed.content.unwrap_or_default(),
            }),
            "action" => Ok(StepRecord::Action {
                tool: require(parsed.tool, "tool", &tag)?,
                input: require(parsed.input, "input", &tag)?,
            }),
            other => Err(StepwiseError::Protocol(format!(
                "unrecognized step `{other}`"
            ))),
        }
    }

    pub fn observe(content: impl Into<String>) -> Self {
        StepRecord::Observe {
            content: content.into(),
        }
    }

    /// Serialize to the compact JSON form that is replayed to the model.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StepRecord::Think { .. } => "think",
            StepRecord::Action { .. } => "action",
            StepRecord::Observe { .. } => "observe",
            StepRecord::Output { .. } => "output",
        }
    }
}

fn require(value: Option<String>, field: &str, step: &str) -> Result<String> {
    value.ok_or_else(|| StepwiseError::Protocol(format!("`{step}` step is missing `{field}`")))
}
