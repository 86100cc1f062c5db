// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders for worker results, shared by engine and workspace tests.

use crate::envelope::{CorrelationData, ResultEnvelope, ResultStatus, ResultType, WorkerFault};
use chrono::{DateTime, Utc};

/// A successful result echoing the given job's correlation data.
pub fn success_result(
    job_id: &str,
    correlation: CorrelationData,
    result: Option<serde_json::Value>,
    at: DateTime<Utc>,
) -> ResultEnvelope {
    ResultEnvelope {
        job_id: job_id.to_string(),
        status: ResultStatus::Success,
        result_type: result.as_ref().map(|_| ResultType::Object),
        result,
        error: None,
        duration_ms: 10,
        timestamp: at,
        correlation_data: correlation,
    }
}

/// A failed result with the given message and throttle flag.
pub fn failure_result(
    job_id: &str,
    correlation: CorrelationData,
    message: &str,
    is_throttled: bool,
    at: DateTime<Utc>,
) -> ResultEnvelope {
    ResultEnvelope {
        job_id: job_id.to_string(),
        status: ResultStatus::Failure,
        result_type: None,
        result: None,
        error: Some(WorkerFault {
            message: message.to_string(),
            is_throttled,
            attempts: 1,
            stack_trace: None,
        }),
        duration_ms: 10,
        timestamp: at,
        correlation_data: correlation,
    }
}

/// A polling progress result: `{complete: false}`.
pub fn poll_in_progress(
    job_id: &str,
    correlation: CorrelationData,
    at: DateTime<Utc>,
) -> ResultEnvelope {
    success_result(
        job_id,
        correlation,
        Some(serde_json::json!({ "complete": false })),
        at,
    )
}

/// A polling completion result: `{complete: true, data}`.
pub fn poll_complete(
    job_id: &str,
    correlation: CorrelationData,
    data: serde_json::Value,
    at: DateTime<Utc>,
) -> ResultEnvelope {
    success_result(
        job_id,
        correlation,
        Some(serde_json::json!({ "complete": true, "data": data })),
        at,
    )
}
