//! End-to-end scenarios through the headless runner
//!
//! Each test plays a scenario on paused time and checks the NDJSON the runner
//! writes, the same stream a host would observe.

use background_location::{run_scenario, PermissionAnswer, Scenario, Step, StepAction};
use bgloc_core::{PermissionState, SessionState};
use bgloc_provider::test_utils::test_config;
use bgloc_service::Settings;
use serde_json::Value;

async fn play(scenario: &Scenario) -> (Vec<Value>, bgloc_service::ServiceStatus) {
    let mut out = Vec::new();
    let status = tokio_test::assert_ok!(run_scenario(scenario, Settings::default(), &mut out).await);

    let lines = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).expect("runner wrote invalid JSON"))
        .collect();
    (lines, status)
}

fn labels(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event["event"].as_str().unwrap() {
            "state_changed" => format!("state:{}", event["state"].as_str().unwrap()),
            other => other.to_string(),
        })
        .collect()
}

fn step(after_ms: u64, action: StepAction) -> Step {
    Step { after_ms, action }
}

fn fix(timestamp_millis: u64) -> StepAction {
    StepAction::Fix {
        latitude: 52.52,
        longitude: 13.40,
        timestamp_millis,
        accuracy_meters: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_three_fixes_reach_the_host_in_order() {
    let scenario = Scenario::parse(
        r#"
name = "three fixes"
permission_answer = "granted"
answer_delay_ms = 50

[tracking]
interval_millis = 5000
fastest_interval_millis = 5000

[[steps]]
action = "request_permission"

[[steps]]
action = "start"

[[steps]]
after_ms = 100
action = "fix"
latitude = 52.52
longitude = 13.40
timestamp_millis = 0

[[steps]]
after_ms = 1000
action = "fix"
latitude = 52.5201
longitude = 13.40
timestamp_millis = 1000

[[steps]]
after_ms = 5000
action = "fix"
latitude = 52.5202
longitude = 13.40
timestamp_millis = 6000

[[steps]]
after_ms = 100
action = "stop"
"#,
    )
    .unwrap();

    let (events, status) = play(&scenario).await;

    assert_eq!(
        labels(&events),
        vec![
            "scenario_started",
            "permission_resolved",
            "state:starting",
            "state:running",
            "location_update",
            "location_update",
            "location_update",
            "state:stopped",
            "scenario_completed",
        ]
    );
    assert_eq!(events[1]["state"], "granted");

    let stamps: Vec<u64> = events
        .iter()
        .filter(|event| event["event"] == "location_update")
        .map(|event| event["fix"]["timestampMillis"].as_u64().unwrap())
        .collect();
    assert_eq!(stamps, vec![0, 1000, 6000]);

    assert_eq!(status.session, SessionState::Stopped);
    assert_eq!(status.permission, PermissionState::Granted);
    assert_eq!(status.events_dropped, 0);
    assert!(!status.tracking);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_provider_fails_session_and_later_fixes_are_dropped() {
    let scenario = Scenario::parse(
        r#"
name = "disabled"
initial_permission = "granted"

[[steps]]
action = "start"

[[steps]]
after_ms = 100
action = "fix"
latitude = 1.0
longitude = 2.0
timestamp_millis = 100

[[steps]]
after_ms = 100
action = "provider_error"
kind = "disabled"
message = "location services off"

[[steps]]
after_ms = 100
action = "fix"
latitude = 1.0
longitude = 2.0
timestamp_millis = 200
"#,
    )
    .unwrap();

    let (events, status) = play(&scenario).await;

    assert_eq!(
        labels(&events),
        vec![
            "scenario_started",
            "state:starting",
            "state:running",
            "location_update",
            "error",
            "state:failed",
            "scenario_completed",
        ]
    );
    assert_eq!(events[4]["kind"], "provider_unavailable");
    assert_eq!(events[5]["reason"], "provider_unavailable");
    assert_eq!(status.last_fix.map(|f| f.timestamp_millis), Some(100));
}

#[tokio::test(start_paused = true)]
async fn test_denied_permission_blocks_start() {
    let scenario = Scenario {
        name: "denied".to_string(),
        initial_permission: PermissionState::Unknown,
        permission_answer: PermissionAnswer::Denied,
        answer_delay_ms: 0,
        tracking: Some(test_config()),
        settle_ms: 100,
        steps: vec![
            step(0, StepAction::RequestPermission),
            step(0, StepAction::Start),
            step(100, fix(0)),
        ],
    };

    let (events, status) = play(&scenario).await;

    assert_eq!(
        labels(&events),
        vec![
            "scenario_started",
            "permission_resolved",
            "command_failed",
            "scenario_completed",
        ]
    );
    assert_eq!(events[1]["state"], "denied_once");
    assert_eq!(events[2]["action"], "start");
    assert_eq!(events[2]["kind"], "permission_denied");
    assert_eq!(status.session, SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_signal_loss_recovers_after_backoff() {
    let scenario = Scenario {
        name: "signal loss".to_string(),
        initial_permission: PermissionState::Granted,
        permission_answer: PermissionAnswer::Granted,
        answer_delay_ms: 0,
        tracking: Some(test_config()),
        settle_ms: 100,
        steps: vec![
            step(0, StepAction::Start),
            step(
                100,
                StepAction::ProviderError {
                    kind: bgloc_provider::ProviderErrorKind::SignalLost,
                    message: "tunnel".to_string(),
                },
            ),
            // First retry fires within 1s plus jitter
            step(1500, fix(5000)),
        ],
    };

    let (events, status) = play(&scenario).await;

    // Transient errors never reach the host; shutdown stops the live session
    assert_eq!(
        labels(&events),
        vec![
            "scenario_started",
            "state:starting",
            "state:running",
            "location_update",
            "state:stopped",
            "scenario_completed",
        ]
    );
    assert_eq!(status.session, SessionState::Running);
    assert!(status.tracking);
}
