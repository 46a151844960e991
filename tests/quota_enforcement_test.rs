//! Per-robot quota enforcement across concurrent submissions.

mod common;

use std::time::Duration;

use common::{robot_record, Harness, ScriptedAgents};

use cohort::domain::models::{
    ExecutionStatus, InterventionAction, InterventionRequest, TriggerMessage,
};
use serde_json::json;

const PASS_VERDICT: &str =
    r#"{"passed": true, "score": 0.9, "complete": true, "need_reply": false}"#;

fn slow_agents() -> ScriptedAgents {
    ScriptedAgents::new()
        .reply("__yao.goals", "# Goals")
        .delay("__yao.goals", Duration::from_millis(300))
        .reply(
            "__yao.tasks",
            r#"[{"order": 1, "executor_type": "assistant", "executor_id": "worker",
                 "description": "work"}]"#,
        )
        .reply("worker", "done")
        .reply("__yao.validator", PASS_VERDICT)
        .reply("__yao.delivery", r#"{"summary": "s", "body": "b", "attachments": []}"#)
        .reply("__yao.learning", "[]")
}

fn intervention() -> InterventionRequest {
    InterventionRequest {
        action: InterventionAction::TaskAdd,
        messages: vec![TriggerMessage::user("Analyze sales")],
        plan_at: None,
        insert_at: None,
        at_index: None,
        executor_mode: None,
    }
}

/// Scenario: `quota.max = 2`, three concurrent triggers. Two run, the
/// third reports queued and starts once a slot frees.
#[tokio::test]
async fn third_submission_queues_until_slot_frees() {
    let record = robot_record(
        "r1",
        "t1",
        json!({
            "identity": {"role": "analyst"},
            "quota": {"max": 2, "queue": 10, "priority": 5}
        }),
    );
    let harness = Harness::new(vec![record], slow_agents()).await;
    harness.system.start().await.unwrap();

    let first = harness.system.intervene("r1", intervention()).await.unwrap();
    let second = harness.system.intervene("r1", intervention()).await.unwrap();
    let third = harness.system.intervene("r1", intervention()).await.unwrap();

    assert!(first.accepted && !first.queued);
    assert!(second.accepted && !second.queued);
    assert!(third.accepted && third.queued, "third must wait for a slot");

    // All three eventually complete: the queued one dispatched when a
    // slot freed
    for outcome in [&first, &second, &third] {
        let execution = harness.await_terminal(&outcome.execution_id).await;
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    // Never more than two executions in flight at once; calls within
    // one execution are sequential, so concurrent agent calls bound
    // concurrent executions
    assert!(harness.agents.peak_concurrency().await <= 2);

    harness.system.shutdown().await;
}

/// A robot's queue cap bounds its footprint; the global pool stays
/// available to others.
#[tokio::test]
async fn per_robot_queue_cap_rejects_excess() {
    let crowded = robot_record(
        "crowded",
        "t1",
        json!({
            "identity": {"role": "analyst"},
            "quota": {"max": 1, "queue": 2, "priority": 5}
        }),
    );
    let quiet = robot_record("quiet", "t1", json!({"identity": {"role": "analyst"}}));
    let harness = Harness::new(vec![crowded, quiet], slow_agents()).await;
    // Pool deliberately not started: submissions only queue

    harness.system.cache().load().await.unwrap();

    let mut accepted = 0;
    let mut rejected = 0;
    for _ in 0..4 {
        let outcome = harness.system.intervene("crowded", intervention()).await.unwrap();
        if outcome.accepted {
            accepted += 1;
        } else {
            rejected += 1;
            assert!(outcome.message.as_ref().unwrap().contains("queue is full"));
        }
    }
    assert_eq!(accepted, 2, "queue cap is 2");
    assert_eq!(rejected, 2);

    // Another robot is unaffected
    let other = harness.system.intervene("quiet", intervention()).await.unwrap();
    assert!(other.accepted);
}
