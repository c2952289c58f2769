//! Session lifecycle through the controller

use std::time::Duration;

use lescan::bluetooth::{ScanState, SessionEvent, StopReason, DEFAULT_SCAN_PERIOD};
use lescan::{ControllerError, IndexError, RadioError, RecoveryAction, ScanConfig, SessionController};
use pretty_assertions::assert_eq;

use super::mocks::{drain, settle, RadioCall, RecordingRadio};

const PERIOD: Duration = Duration::from_secs(10);

fn controller(radio: &std::sync::Arc<RecordingRadio>) -> SessionController {
    SessionController::new(radio.clone(), ScanConfig::default().with_scan_period(PERIOD))
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_expiry_stops_once() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);

    controller.start().unwrap();
    controller.stop();
    assert_eq!(radio.calls(), vec![RadioCall::Start, RadioCall::Stop]);
    assert_eq!(controller.scan_state(), ScanState::Stopped);

    // The original timer must not produce a second stop
    tokio::time::advance(PERIOD * 2).await;
    settle().await;
    assert_eq!(radio.stops(), 1);
    assert_eq!(controller.scan_state(), ScanState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_stops_exactly_once() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);
    let mut events = controller.subscribe_all();

    controller.start().unwrap();
    tokio::time::advance(PERIOD).await;
    settle().await;

    assert_eq!(controller.scan_state(), ScanState::Stopped);
    assert_eq!(radio.calls(), vec![RadioCall::Start, RadioCall::Stop]);

    tokio::time::advance(PERIOD * 3).await;
    settle().await;
    assert_eq!(radio.stops(), 1);

    assert_eq!(
        drain(&mut events),
        vec![
            SessionEvent::RegistryCleared,
            SessionEvent::ScanStarted { session: 1 },
            SessionEvent::ScanStopped {
                session: 1,
                reason: StopReason::Expired
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_still_scanning_just_before_deadline() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);

    controller.start().unwrap();
    tokio::time::advance(PERIOD - Duration::from_millis(1)).await;
    settle().await;

    assert!(controller.is_scanning());
    assert_eq!(radio.stops(), 0);
}

#[tokio::test]
async fn test_default_scan_period() {
    let radio = RecordingRadio::new();
    let controller = SessionController::new(radio.clone(), ScanConfig::default());
    assert_eq!(controller.config().scan_period, DEFAULT_SCAN_PERIOD);
}

#[tokio::test]
async fn test_start_twice_never_overlaps() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);
    let mut events = controller.subscribe_all();

    controller.start().unwrap();
    radio.found("AA", "Foo");
    settle().await;
    assert_eq!(controller.device_count(), 1);
    drain(&mut events);

    controller.start().unwrap();

    assert_eq!(radio.calls(), vec![RadioCall::Start, RadioCall::Stop, RadioCall::Start]);
    assert_eq!(controller.device_count(), 0);
    assert_eq!(
        drain(&mut events),
        vec![
            SessionEvent::ScanStopped {
                session: 1,
                reason: StopReason::Restarted
            },
            SessionEvent::RegistryCleared,
            SessionEvent::ScanStarted { session: 2 },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_restart_ignores_superseded_timer() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);

    controller.start().unwrap();
    tokio::time::advance(PERIOD / 2).await;
    controller.start().unwrap();

    // First session's deadline passes; the second is mid-scan
    tokio::time::advance(PERIOD / 2).await;
    settle().await;
    assert!(controller.is_scanning());
    assert_eq!(radio.stops(), 1);

    tokio::time::advance(PERIOD / 2).await;
    settle().await;
    assert!(!controller.is_scanning());
    assert_eq!(radio.stops(), 2);
}

#[tokio::test]
async fn test_stop_when_idle_or_stopped_does_nothing() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);

    controller.stop();
    assert!(radio.calls().is_empty());
    assert_eq!(controller.scan_state(), ScanState::Idle);

    controller.start().unwrap();
    controller.stop();
    controller.stop();
    assert_eq!(radio.calls(), vec![RadioCall::Start, RadioCall::Stop]);
    assert_eq!(controller.scan_state(), ScanState::Stopped);
}

#[tokio::test]
async fn test_select_while_scanning_stops_first() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);
    let mut events = controller.subscribe_all();

    controller.start().unwrap();
    radio.found("AA", "Foo");
    radio.found("CC", "Bar");
    settle().await;
    drain(&mut events);

    let view = controller.select_device(1).unwrap();

    assert_eq!(view.identifier, "CC");
    assert_eq!(view.label(), "Bar");
    assert_eq!(radio.calls(), vec![RadioCall::Start, RadioCall::Stop]);
    assert!(!controller.is_scanning());
    assert_eq!(
        drain(&mut events),
        vec![
            SessionEvent::ScanStopped {
                session: 1,
                reason: StopReason::DeviceSelected
            },
            SessionEvent::DeviceSelected(view),
        ]
    );
}

#[tokio::test]
async fn test_select_after_stop_does_not_touch_radio() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);

    controller.start().unwrap();
    radio.found("AA", "Foo");
    settle().await;
    controller.stop();

    let view = controller.select_device(0).unwrap();
    assert_eq!(view.identifier, "AA");
    assert_eq!(radio.stops(), 1);
}

#[tokio::test]
async fn test_select_out_of_range_is_not_clamped() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);

    controller.start().unwrap();
    radio.found("AA", "Foo");
    settle().await;

    let err = controller.select_device(5).unwrap_err();
    assert_eq!(err, ControllerError::Index(IndexError::OutOfRange { index: 5, len: 1 }));
    assert_eq!(err.recovery(), RecoveryAction::RefreshList);
    assert!(controller.is_scanning());
    assert_eq!(controller.device_at(5), Err(IndexError::OutOfRange { index: 5, len: 1 }));
}

#[tokio::test]
async fn test_unsupported_hardware_fails_fast() {
    let radio = RecordingRadio::unsupported();
    let controller = controller(&radio);

    let err = controller.start().unwrap_err();
    assert_eq!(err, ControllerError::UnsupportedHardware);
    assert!(!err.is_recoverable());
    assert!(radio.calls().is_empty());
    assert_eq!(controller.scan_state(), ScanState::Idle);
}

#[tokio::test]
async fn test_radio_unavailable_then_retry() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);
    radio.fail_next_start(RadioError::Unavailable("adapter powered off".into()));

    let err = controller.start().unwrap_err();
    assert_eq!(
        err,
        ControllerError::RadioUnavailable(RadioError::Unavailable("adapter powered off".into()))
    );
    assert_eq!(err.recovery(), RecoveryAction::EnableRadio);
    assert_eq!(controller.scan_state(), ScanState::Idle);
    assert!(!controller.affordances().show_stop);

    // After remediation the caller retries
    controller.start().unwrap();
    assert!(controller.is_scanning());
    assert_eq!(radio.starts(), 1);
}

#[tokio::test]
async fn test_callback_from_inside_start_does_not_deadlock() {
    let radio = RecordingRadio::new();
    radio.report_on_start("AA", "Foo");
    let controller = controller(&radio);

    controller.start().unwrap();
    settle().await;

    assert_eq!(controller.device_count(), 1);
    assert_eq!(controller.device_by_id("AA").unwrap().label(), "Foo");
}

#[tokio::test]
async fn test_results_after_stop_are_dropped() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);

    controller.start().unwrap();
    radio.found("AA", "Foo");
    controller.stop();
    radio.found("BB", "Late");
    settle().await;

    // AA was queued before stop, but stop won the lock first
    assert_eq!(controller.device_count(), 0);
}

#[tokio::test]
async fn test_results_from_superseded_session_are_dropped() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);

    controller.start().unwrap();
    let old = radio.callback();
    controller.start().unwrap();

    old.on_device_found(Some("AA".into()), Some("Old".into()));
    radio.found("BB", "New");
    settle().await;

    assert_eq!(controller.devices().len(), 1);
    assert_eq!(controller.device_at(0).unwrap().identifier, "BB");
}

#[tokio::test]
async fn test_lifecycle_hooks() {
    let radio = RecordingRadio::new();
    let controller = controller(&radio);

    controller.on_activate().unwrap();
    radio.found("AA", "Foo");
    settle().await;
    assert_eq!(controller.device_count(), 1);

    controller.on_deactivate();
    assert!(!controller.is_scanning());
    assert_eq!(controller.device_count(), 0);

    controller.on_activate().unwrap();
    assert!(controller.is_scanning());
    assert_eq!(
        radio.calls(),
        vec![RadioCall::Start, RadioCall::Stop, RadioCall::Start]
    );
}

#[tokio::test]
async fn test_drop_stops_running_scan() {
    let radio = RecordingRadio::new();
    {
        let controller = controller(&radio);
        controller.start().unwrap();
    }
    assert_eq!(radio.calls(), vec![RadioCall::Start, RadioCall::Stop]);
}
