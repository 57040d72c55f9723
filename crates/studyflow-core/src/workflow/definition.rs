//! Workflow definition parsing and validation.
//!
//! Definition files (JSON or YAML) deserialize into a `WorkflowSpec`, which is
//! validated before it is ever stored. Stored workflows are therefore always
//! structurally valid; the interpreter does not re-check them.

use std::path::Path;

use studyflow_types::workflow::{StepKind, WorkflowSpec};
use thiserror::Error;

use super::scheduler::validate_schedule;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DefinitionError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse and validate a JSON workflow definition.
pub fn parse_workflow_json(json: &str) -> Result<WorkflowSpec, DefinitionError> {
    let spec: WorkflowSpec =
        serde_json::from_str(json).map_err(|e| DefinitionError::ParseError(e.to_string()))?;
    validate_spec(&spec)?;
    Ok(spec)
}

/// Parse and validate a YAML workflow definition.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowSpec, DefinitionError> {
    let spec: WorkflowSpec =
        serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::ParseError(e.to_string()))?;
    validate_spec(&spec)?;
    Ok(spec)
}

/// Load a definition file, choosing the format from the extension
/// (`.json`, otherwise YAML).
pub fn load_workflow_file(path: &Path) -> Result<WorkflowSpec, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        parse_workflow_json(&content)
    } else {
        parse_workflow_yaml(&content)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowSpec`.
///
/// Checks:
/// - Name is non-empty
/// - At least one step exists, and every step has a name
/// - `ai_task` prompts are non-empty
/// - `api_call` URLs are absolute http(s) URLs and methods are plain tokens
/// - The schedule, if any, is understood by the scheduler
/// - Timeouts are > 0 and retry policies allow at least one attempt
pub fn validate_spec(spec: &WorkflowSpec) -> Result<(), DefinitionError> {
    if spec.name.trim().is_empty() {
        return Err(invalid("workflow name must not be empty"));
    }

    if spec.steps.is_empty() {
        return Err(invalid("workflow must have at least one step"));
    }

    for (index, step) in spec.steps.iter().enumerate() {
        let position = index + 1;
        if step.name.trim().is_empty() {
            return Err(invalid(format!("step {position} has no name")));
        }

        match &step.kind {
            StepKind::AiTask { prompt, .. } => {
                if prompt.trim().is_empty() {
                    return Err(invalid(format!("step '{}' has an empty prompt", step.name)));
                }
            }
            StepKind::ApiCall { url, method, .. } => {
                if !is_http_url(url) {
                    return Err(invalid(format!(
                        "step '{}' has invalid URL '{url}' (expected http:// or https://)",
                        step.name
                    )));
                }
                if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(invalid(format!(
                        "step '{}' has invalid HTTP method '{method}'",
                        step.name
                    )));
                }
            }
            StepKind::WebScrape { url } => {
                if url.trim().is_empty() {
                    return Err(invalid(format!("step '{}' has an empty URL", step.name)));
                }
            }
            StepKind::Delay { .. } => {}
        }

        if step.timeout_secs == Some(0) {
            return Err(invalid(format!("step '{}' timeout must be > 0", step.name)));
        }

        if let Some(retry) = &step.retry {
            if retry.max_attempts == 0 {
                return Err(invalid(format!(
                    "step '{}' retry.max_attempts must be >= 1",
                    step.name
                )));
            }
        }
    }

    if let Some(schedule) = &spec.schedule {
        validate_schedule(schedule).map_err(|e| invalid(e.to_string()))?;
    }

    if spec.timeout_secs == Some(0) {
        return Err(invalid("timeout must be > 0"));
    }

    Ok(())
}

fn invalid(msg: impl Into<String>) -> DefinitionError {
    DefinitionError::ValidationError(msg.into())
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or("");
            !host.is_empty() && !host.contains(char::is_whitespace)
        }
        None => false,
    }
}
