// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::envelope::{
    CorrelationData, JobEnvelope, PollOutcome, ResultEnvelope, ResultStatus, WorkerFault,
};
use crate::{BatchId, WorkerId};
use chrono::Utc;
use std::collections::HashMap;

fn job() -> JobEnvelope {
    let mut parameters = HashMap::new();
    parameters.insert("user".to_string(), "u1".to_string());
    JobEnvelope {
        job_id: "step-s1-0".to_string(),
        batch_id: BatchId::new("b1"),
        worker_id: WorkerId::new("exchange"),
        function_name: "move_mailbox".to_string(),
        parameters,
        correlation_data: CorrelationData::for_step("s1", "mv", 1),
    }
}

#[test]
fn job_envelope_uses_camel_case_wire_fields() {
    let value = serde_json::to_value(job()).unwrap();
    assert_eq!(value["jobId"], "step-s1-0");
    assert_eq!(value["workerId"], "exchange");
    assert_eq!(value["functionName"], "move_mailbox");
    assert_eq!(value["parameters"]["user"], "u1");
    assert_eq!(value["correlationData"]["stepExecutionId"], "s1");
    assert_eq!(value["correlationData"]["isInitStep"], false);
}

#[test]
fn correlation_constructors_set_exactly_one_id() {
    let step = CorrelationData::for_step("s1", "mv", 1);
    assert!(step.step_execution_id.is_some());
    assert!(step.init_execution_id.is_none());
    assert!(!step.is_init_step);

    let init = CorrelationData::for_init("i1", "mv", 1);
    assert!(init.step_execution_id.is_none());
    assert!(init.init_execution_id.is_some());
    assert!(init.is_init_step);

    let detached = CorrelationData::detached("mv", 1);
    assert!(detached.step_execution_id.is_none());
    assert!(detached.init_execution_id.is_none());
}

#[test]
fn result_envelope_deserializes_worker_wire_shape() {
    let json = r#"{
        "jobId": "step-s1-0",
        "status": "Failure",
        "resultType": null,
        "result": null,
        "error": { "message": "mailbox locked", "isThrottled": true, "attempts": 3 },
        "durationMs": 812,
        "timestamp": "2030-01-10T00:00:00Z",
        "correlationData": {
            "stepExecutionId": "s1",
            "isInitStep": false,
            "runbookName": "mv",
            "runbookVersion": 1
        }
    }"#;

    let result: ResultEnvelope = serde_json::from_str(json).unwrap();
    assert_eq!(result.status, ResultStatus::Failure);
    assert!(!result.is_success());
    assert!(result.is_throttled());
    assert_eq!(result.error_message(), "mailbox locked");
    assert_eq!(
        result.error,
        Some(WorkerFault {
            message: "mailbox locked".to_string(),
            is_throttled: true,
            attempts: 3,
            stack_trace: None,
        })
    );
}

#[test]
fn poll_outcome_reads_complete_convention() {
    let base = ResultEnvelope {
        job_id: "j".to_string(),
        status: ResultStatus::Success,
        result_type: None,
        result: Some(serde_json::json!({ "complete": false })),
        error: None,
        duration_ms: 0,
        timestamp: Utc::now(),
        correlation_data: CorrelationData::for_step("s1", "mv", 1),
    };
    assert_eq!(base.poll_outcome(), PollOutcome::InProgress);

    let done = ResultEnvelope {
        result: Some(serde_json::json!({ "complete": true, "data": { "moved": 42 } })),
        ..base.clone()
    };
    assert_eq!(
        done.poll_outcome(),
        PollOutcome::Complete(Some(serde_json::json!({ "moved": 42 })))
    );

    // A plain success body is completion with the raw payload
    let plain = ResultEnvelope {
        result: Some(serde_json::json!({ "ok": true })),
        ..base
    };
    assert_eq!(
        plain.poll_outcome(),
        PollOutcome::Complete(Some(serde_json::json!({ "ok": true })))
    );
}
