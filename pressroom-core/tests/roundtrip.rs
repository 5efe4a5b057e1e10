//! Serialisation and transition tests for `pressroom-core` types.
//!
//! Each `#[case]` is isolated; no shared state.

use chrono::{Duration, Utc};
use pressroom_core::{CommitSha, DeploymentRecord, DeploymentStatus, Transition};
use rstest::rstest;

fn tracked() -> DeploymentRecord {
    DeploymentRecord::pending(
        CommitSha::from("0a1b2c3d4e"),
        "Update page: about.md",
        Some("content/pages/about.md".to_string()),
        Utc::now() - Duration::seconds(90),
    )
}

#[rstest]
#[case::pending(DeploymentStatus::Pending, false)]
#[case::queued(DeploymentStatus::Queued, false)]
#[case::in_progress(DeploymentStatus::InProgress, false)]
#[case::completed(DeploymentStatus::Completed, true)]
#[case::failed(DeploymentStatus::Failed, true)]
#[case::cancelled(DeploymentStatus::Cancelled, true)]
#[case::skipped(DeploymentStatus::Skipped, true)]
fn terminal_classification(#[case] status: DeploymentStatus, #[case] terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
    assert_eq!(status.as_str().parse::<DeploymentStatus>(), Ok(status));
}

#[rstest]
#[case::completed(DeploymentStatus::Completed)]
#[case::failed(DeploymentStatus::Failed)]
#[case::cancelled(DeploymentStatus::Cancelled)]
#[case::skipped(DeploymentStatus::Skipped)]
fn no_resurrection_from_terminal(#[case] terminal: DeploymentStatus) {
    let now = Utc::now();
    let mut record = tracked();
    assert_eq!(record.apply_status(terminal, None, now), Transition::Settled);
    for next in DeploymentStatus::ALL {
        assert_eq!(record.apply_status(next, None, now), Transition::Ignored);
        assert_eq!(record.status, terminal);
    }
    assert!(record.duration.is_some());
    assert!(record.validate().is_ok());
}

#[test]
fn settled_record_survives_json_roundtrip() {
    let mut record = tracked();
    let now = Utc::now();
    record.workflow_url = Some("https://ci.example/runs/7".to_string());
    record.apply_status(DeploymentStatus::InProgress, Some(now), now);
    record.apply_status(DeploymentStatus::Completed, None, now);

    let json = serde_json::to_string(&record).expect("serialize");
    let back: DeploymentRecord = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, record);
    assert!(back.duration.unwrap_or_default() >= 90);
}

#[test]
fn remote_shaped_record_without_action_deserializes() {
    let json = r#"{
        "commitSha": "feedface",
        "status": "in_progress",
        "startedAt": "2024-05-01T10:00:00Z",
        "workflowUrl": "https://ci.example/runs/9"
    }"#;
    let record: DeploymentRecord = serde_json::from_str(json).expect("deserialize");
    assert_eq!(record.action, "");
    assert_eq!(record.item_id, None);
    assert_eq!(record.status, DeploymentStatus::InProgress);
    assert!(record.validate().is_ok());
}
