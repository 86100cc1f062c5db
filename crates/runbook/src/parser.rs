// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runbook parsing (YAML)

use crate::definition::{BatchTimeMode, RunbookDefinition, StepDef, RECOGNIZED_SOURCE_TYPES};
use crate::offset::{parse_duration_secs, parse_offset};
use std::collections::HashSet;
use thiserror::Error;

/// A single located validation failure
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{location}: {message}")]
pub struct ValidationError {
    pub location: String,
    pub message: String,
}

impl ValidationError {
    fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur during runbook parsing
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid runbook: {}", render_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn render_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse a runbook from YAML content and validate it.
///
/// Unknown keys are ignored; missing required keys surface as located
/// validation errors rather than serde failures.
pub fn parse_runbook(content: &str) -> Result<RunbookDefinition, ParseError> {
    // 1. Serde does the heavy lifting
    let runbook: RunbookDefinition = serde_yaml::from_str(content)?;

    // 2. Validation passes over the deserialized model
    let errors = validate(&runbook);
    if !errors.is_empty() {
        return Err(ParseError::Validation(errors));
    }

    Ok(runbook)
}

/// Validate a deserialized runbook, returning every failure found.
pub fn validate(runbook: &RunbookDefinition) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // 1. Name is required
    if runbook.name.is_empty() {
        errors.push(ValidationError::new("name", "runbook name is required"));
    }

    // 2. Data source type must be recognized
    let ds = &runbook.data_source;
    if ds.source_type.is_empty() {
        errors.push(ValidationError::new(
            "data_source.type",
            "data source type is required",
        ));
    } else if !RECOGNIZED_SOURCE_TYPES.contains(&ds.source_type.as_str()) {
        errors.push(ValidationError::new(
            "data_source.type",
            format!(
                "unknown data source type '{}'; recognized types: {}",
                ds.source_type,
                RECOGNIZED_SOURCE_TYPES.join(", ")
            ),
        ));
    }

    // 3. Primary key is required
    if ds.primary_key.is_empty() {
        errors.push(ValidationError::new(
            "data_source.primary_key",
            "primary key is required",
        ));
    }

    // 4. Column-mode batches need the timestamp column
    if ds.batch_time == BatchTimeMode::Column
        && ds.batch_time_column.as_deref().unwrap_or("").is_empty()
    {
        errors.push(ValidationError::new(
            "data_source.batch_time_column",
            "batch_time_column is required when batch_time = column",
        ));
    }

    // 5. Phase offsets must match the offset grammar; names must be
    //    present and unique
    let mut phase_names = HashSet::new();
    for (i, phase) in runbook.phases.iter().enumerate() {
        let location = format!("phases[{}]({})", i, phase.name);
        if phase.name.is_empty() {
            errors.push(ValidationError::new(
                format!("phases[{}]", i),
                "phase name is required",
            ));
        } else if !phase_names.insert(phase.name.as_str()) {
            errors.push(ValidationError::new(
                location.clone(),
                format!("duplicate phase name '{}'", phase.name),
            ));
        }
        if let Err(e) = parse_offset(&phase.offset) {
            errors.push(ValidationError::new(format!("{}.offset", location), e.to_string()));
        }
        validate_steps(&phase.steps, &location, runbook, &mut errors);
    }

    // 6. Init steps
    validate_steps(&runbook.init, "init", runbook, &mut errors);

    // 7. Rollback sequences
    for (name, steps) in &runbook.rollbacks {
        validate_steps(steps, &format!("rollbacks.{}", name), runbook, &mut errors);
    }

    // 8. rollback_on_removal must reference a defined sequence
    if let Some(name) = runbook.rollback_on_removal.as_deref() {
        if !runbook.rollbacks.contains_key(name) {
            errors.push(ValidationError::new(
                "rollback_on_removal",
                format!(
                    "references unknown rollback '{}'; available rollbacks: {}",
                    name,
                    sorted_keys(runbook.rollbacks.keys()),
                ),
            ));
        }
    }

    errors
}

fn validate_steps(
    steps: &[StepDef],
    location: &str,
    runbook: &RunbookDefinition,
    errors: &mut Vec<ValidationError>,
) {
    let mut step_names = HashSet::new();
    for (i, step) in steps.iter().enumerate() {
        let step_location = format!("{}.steps[{}]({})", location, i, step.name);

        if step.name.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.steps[{}]", location, i),
                "step name is required",
            ));
        } else if !step_names.insert(step.name.as_str()) {
            errors.push(ValidationError::new(
                step_location.clone(),
                format!("duplicate step name '{}'", step.name),
            ));
        }

        if step.worker_id.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.worker_id", step_location),
                "step must name a worker",
            ));
        }
        if step.function.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.function", step_location),
                "step must name a function",
            ));
        }

        if let Some(poll) = &step.poll {
            for (field, value) in [("interval", &poll.interval), ("timeout", &poll.timeout)] {
                if let Err(e) = parse_duration_secs(value) {
                    errors.push(ValidationError::new(
                        format!("{}.poll.{}", step_location, field),
                        e.to_string(),
                    ));
                }
            }
        }

        if let Some(retry) = &step.retry {
            if let Err(e) = parse_duration_secs(&retry.interval) {
                errors.push(ValidationError::new(
                    format!("{}.retry.interval", step_location),
                    e.to_string(),
                ));
            }
        }

        // on_failure rollback targets must exist
        if let Some(rollback) = step.on_failure.as_ref().and_then(|f| f.rollback_name()) {
            if !runbook.rollbacks.contains_key(rollback) {
                errors.push(ValidationError::new(
                    format!("{}.on_failure", step_location),
                    format!(
                        "references unknown rollback '{}'; available rollbacks: {}",
                        rollback,
                        sorted_keys(runbook.rollbacks.keys()),
                    ),
                ));
            }
        }
    }
}

fn sorted_keys<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    let mut names: Vec<&str> = keys.map(String::as_str).collect();
    names.sort_unstable();
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
