//! Result extraction from webhook responses.
//!
//! Automation workflows answer in a handful of shapes depending on how the
//! final node is wired. [`ResponseShape::classify`] recognises them in a fixed
//! priority order; anything else is reported as
//! [`ExtractError::UnrecognizedShape`] with the keys that were present.

use serde_json::Value;
use thiserror::Error;

/// Substring a webhook sends when it answers before the workflow has run.
const WORKFLOW_STARTED_SIGNATURE: &str = "workflow got started";

/// Why no result text could be taken from a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// The webhook acknowledged the start of the workflow instead of
    /// waiting for its last node.
    #[error("webhook answered on workflow start; configure it to respond when the last node finishes")]
    WorkflowStarted,

    /// None of the known shapes matched.
    #[error("no result text found in upstream response (top-level keys: {keys:?})")]
    UnrecognizedShape { keys: Vec<String> },
}

/// Known response shapes, in probing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape<'a> {
    /// `{"output": {"content": "..."}}`, structured output parser.
    OutputContent(&'a str),
    /// `{"output": "..."}`
    OutputText(&'a str),
    /// `{"content": "..."}`
    Content(&'a str),
    /// `{"text": "..."}`
    Text(&'a str),
    /// `"..."`
    Bare(&'a str),
    /// `{"json": {"content" | "output.content" | "output" | "text": "..."}}`
    NestedJson(&'a str),
}

impl<'a> ResponseShape<'a> {
    /// Find the first matching shape. Empty strings never match.
    pub fn classify(body: &'a Value) -> Option<Self> {
        if let Some(output) = body.get("output") {
            if let Some(content) = text_at(output, "content") {
                return Some(ResponseShape::OutputContent(content));
            }
            if let Some(text) = non_empty(output) {
                return Some(ResponseShape::OutputText(text));
            }
        }
        if let Some(content) = text_at(body, "content") {
            return Some(ResponseShape::Content(content));
        }
        if let Some(text) = text_at(body, "text") {
            return Some(ResponseShape::Text(text));
        }
        if let Some(bare) = non_empty(body) {
            return Some(ResponseShape::Bare(bare));
        }

        let nested = body.get("json")?;
        text_at(nested, "content")
            .or_else(|| nested.get("output").and_then(|o| text_at(o, "content")))
            .or_else(|| text_at(nested, "output"))
            .or_else(|| text_at(nested, "text"))
            .map(ResponseShape::NestedJson)
    }

    pub fn text(self) -> &'a str {
        match self {
            ResponseShape::OutputContent(t)
            | ResponseShape::OutputText(t)
            | ResponseShape::Content(t)
            | ResponseShape::Text(t)
            | ResponseShape::Bare(t)
            | ResponseShape::NestedJson(t) => t,
        }
    }
}

/// Whether the body is a workflow-start acknowledgement.
pub fn is_workflow_started(body: &Value) -> bool {
    body.to_string()
        .to_lowercase()
        .contains(WORKFLOW_STARTED_SIGNATURE)
}

/// Extract the human-readable result from an upstream body.
pub fn extract_text(body: &Value) -> Result<String, ExtractError> {
    if is_workflow_started(body) {
        return Err(ExtractError::WorkflowStarted);
    }

    match ResponseShape::classify(body) {
        Some(shape) => Ok(shape.text().to_string()),
        None => {
            let keys = body
                .as_object()
                .map(|map| map.keys().cloned().collect())
                .unwrap_or_default();
            Err(ExtractError::UnrecognizedShape { keys })
        }
    }
}

fn non_empty(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

fn text_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(non_empty)
}
