use super::*;
use crate::clock::{Clock, ManualClock, TimestampZone};
use crate::detection::{BarcodeFormat, DetectedCode};
use crate::events::{EventBus, ScanEvent};
use crate::export::{ExportEncoder, ExportFormat, FsArtifactStore};
use crate::feeds::{FeedEvent, ManualFeed};
use crate::session::{GeoFix, SessionStore};
use crate::state::{ScanPhase, ScanState, NO_CODE_DETECTED};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

struct Harness {
    coordinator: Arc<CaptureCoordinator>,
    feed: Arc<ManualFeed>,
    clock: Arc<ManualClock>,
    bus: Arc<EventBus>,
    _dir: TempDir,
}

fn create_harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ));
    let store = Arc::new(SessionStore::new(
        ExportEncoder::new(TimestampZone::Named(chrono_tz::UTC)),
        Arc::new(FsArtifactStore::new(dir.path().join("DroneScan"))),
        clock.clone(),
    ));
    let bus = Arc::new(EventBus::new(64));
    let feed = Arc::new(ManualFeed::new());

    let coordinator = CaptureCoordinatorBuilder::new()
        .store(store)
        .event_bus(Arc::clone(&bus))
        .feeds(Arc::clone(&feed))
        .build()
        .unwrap();

    Harness {
        coordinator: Arc::new(coordinator),
        feed,
        clock,
        bus,
        _dir: dir,
    }
}

fn detections(values: &[(&str, BarcodeFormat)]) -> FeedEvent {
    FeedEvent::Detections(
        values
            .iter()
            .map(|(value, format)| DetectedCode::new(*value, *format))
            .collect(),
    )
}

fn code_count(coordinator: &CaptureCoordinator) -> usize {
    coordinator
        .store()
        .current_session()
        .map(|s| s.code_count())
        .unwrap_or(0)
}

#[test]
fn test_builder_requires_feeds() {
    let result = CaptureCoordinatorBuilder::new()
        .event_bus(Arc::new(EventBus::new(4)))
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_capture_scenario_with_position() {
    let h = create_harness();
    h.coordinator.start_session(None).await;
    h.coordinator.start_scanning().await.unwrap();
    assert!(h.feed.is_detecting());
    assert!(h.feed.is_attached());

    let handle = h.coordinator.feed_handle();
    h.coordinator
        .handle_feed_event(detections(&[("ABC123", BarcodeFormat::QrCode)]));
    handle.on_position(Some(GeoFix::new(22.5431, 114.0579)));

    let CaptureOutcome::Captured(codes) = h.coordinator.confirm_capture() else {
        panic!("Expected a capture");
    };

    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].value(), "ABC123");
    assert_eq!(codes[0].format().as_str(), "QR_CODE");
    let fix = codes[0].position().unwrap();
    assert_eq!(fix.latitude, 22.5431);
    assert_eq!(fix.longitude, 114.0579);

    assert_eq!(
        h.coordinator.current_state(),
        ScanState::CodeCaptured("ABC123".to_string())
    );
    assert_eq!(h.coordinator.phase(), ScanPhase::Scanning);
    assert_eq!(h.coordinator.scanned_codes().borrow().len(), 1);
}

#[tokio::test]
async fn test_pulse_without_detection_is_rejected() {
    let h = create_harness();
    h.coordinator.start_session(None).await;
    h.coordinator.start_scanning().await.unwrap();

    assert_eq!(h.coordinator.confirm_capture(), CaptureOutcome::Rejected);
    assert_eq!(code_count(&h.coordinator), 0);
    assert_eq!(
        h.coordinator.current_state(),
        ScanState::Error(NO_CODE_DETECTED.to_string())
    );

    // Rejection does not block the next capture
    h.coordinator
        .handle_feed_event(detections(&[("NEXT", BarcodeFormat::Code128)]));
    assert!(matches!(
        h.coordinator.confirm_capture(),
        CaptureOutcome::Captured(_)
    ));
}

#[tokio::test]
async fn test_one_pulse_captures_every_visible_symbol() {
    let h = create_harness();
    h.coordinator.start_scanning().await.unwrap();
    h.coordinator.feed_handle().on_position(Some(GeoFix::new(1.0, 2.0)));

    h.coordinator.handle_feed_event(detections(&[
        ("A", BarcodeFormat::QrCode),
        ("B", BarcodeFormat::Ean13),
        ("C", BarcodeFormat::DataMatrix),
    ]));
    let CaptureOutcome::Captured(codes) = h.coordinator.confirm_capture() else {
        panic!("Expected a capture");
    };

    assert_eq!(codes.len(), 3);
    assert!(codes
        .iter()
        .all(|c| c.position() == Some(&GeoFix::new(1.0, 2.0))));
    assert_eq!(
        h.coordinator.current_state(),
        ScanState::CodeCaptured("A".to_string())
    );

    // The batch stays current: a second pulse captures it again
    h.coordinator.confirm_capture();
    assert_eq!(code_count(&h.coordinator), 6);
}

#[tokio::test]
async fn test_empty_batch_clears_detection() {
    let h = create_harness();
    h.coordinator.start_scanning().await.unwrap();
    let detecting = h.coordinator.detection_active();

    h.coordinator
        .handle_feed_event(detections(&[("A", BarcodeFormat::QrCode)]));
    assert!(*detecting.borrow());

    h.coordinator.handle_feed_event(FeedEvent::Detections(Vec::new()));
    assert!(!*detecting.borrow());
    assert_eq!(h.coordinator.confirm_capture(), CaptureOutcome::Rejected);
}

#[tokio::test]
async fn test_start_scanning_starts_session_implicitly() {
    let h = create_harness();
    let mut events = h.bus.subscribe();
    assert!(h.coordinator.store().current_session().is_none());

    h.coordinator.start_scanning().await.unwrap();

    assert!(h.coordinator.store().current_session().is_some());
    assert_eq!(h.coordinator.phase(), ScanPhase::Scanning);
    assert_eq!(events.recv().await.unwrap().event_type(), "session_started");
    assert_eq!(events.recv().await.unwrap().event_type(), "scanning_started");

    // Already scanning: no second session
    let id = h.coordinator.store().current_session().unwrap().session_id().to_string();
    h.coordinator.start_scanning().await.unwrap();
    assert_eq!(
        h.coordinator.store().current_session().unwrap().session_id(),
        id
    );
}

#[tokio::test]
async fn test_feed_failure_leaves_phase_unchanged() {
    let h = create_harness();
    h.coordinator.start_session(None).await;
    h.feed.set_unavailable(true);

    assert!(h.coordinator.start_scanning().await.is_err());
    assert_eq!(h.coordinator.phase(), ScanPhase::SessionActive);
    assert!(!h.feed.is_detecting());
}

#[tokio::test]
async fn test_pulses_ignored_when_not_scanning() {
    let h = create_harness();
    h.coordinator.start_session(None).await;

    h.coordinator
        .handle_feed_event(detections(&[("A", BarcodeFormat::QrCode)]));
    assert_eq!(h.coordinator.confirm_capture(), CaptureOutcome::Ignored);
    assert_eq!(h.coordinator.current_state(), ScanState::SessionActive);

    h.coordinator.start_scanning().await.unwrap();
    h.coordinator
        .handle_feed_event(detections(&[("A", BarcodeFormat::QrCode)]));
    h.coordinator.stop_scanning().await.unwrap();

    assert!(!h.feed.is_detecting());
    assert!(!*h.coordinator.detection_active().borrow());
    assert_eq!(h.coordinator.confirm_capture(), CaptureOutcome::Ignored);
    assert_eq!(code_count(&h.coordinator), 0);

    // Stopping twice is harmless
    h.coordinator.stop_scanning().await.unwrap();
    assert_eq!(h.coordinator.phase(), ScanPhase::SessionActive);
}

#[tokio::test]
async fn test_restarting_session_discards_unsaved_codes() {
    let h = create_harness();
    let mut events = h.bus.subscribe();
    h.coordinator.start_scanning().await.unwrap();
    h.coordinator
        .handle_feed_event(detections(&[("LOST", BarcodeFormat::QrCode)]));
    h.coordinator.confirm_capture();

    h.coordinator.start_session(Some("second".to_string())).await;
    assert_eq!(code_count(&h.coordinator), 0);
    assert_eq!(h.coordinator.phase(), ScanPhase::Scanning);

    let mut discarded = None;
    while let Ok(event) = events.try_recv() {
        if let ScanEvent::SessionDiscarded { unsaved_codes, .. } = event {
            discarded = Some(unsaved_codes);
        }
    }
    assert_eq!(discarded, Some(1));
}

#[tokio::test]
async fn test_close_session_exports_and_goes_idle() {
    let h = create_harness();
    h.coordinator.start_scanning().await.unwrap();
    h.coordinator
        .handle_feed_event(detections(&[("A", BarcodeFormat::QrCode)]));
    h.coordinator.confirm_capture();
    h.clock.advance_millis(125_000);

    let artifacts = h.coordinator.close_session().await.unwrap();
    assert!(artifacts.is_complete());
    assert_eq!(h.coordinator.phase(), ScanPhase::Idle);
    assert!(!h.feed.is_detecting());
    assert!(!h.feed.is_attached());
    assert_eq!(*h.coordinator.session_summary().borrow(), NO_ACTIVE_SESSION);

    let saved = h.coordinator.saved_sessions().await.unwrap();
    let loaded = h.coordinator.load_session(&saved[0]).await.unwrap();
    assert_eq!(loaded.duration_seconds(h.clock.now()), 125);
    assert_eq!(loaded.code_count(), 1);

    assert!(h.coordinator.close_session().await.is_none());
}

#[tokio::test]
async fn test_summary_tracks_session() {
    let h = create_harness();
    let session = h.coordinator.start_session(None).await;
    let summary = h.coordinator.session_summary();

    h.clock.advance_millis(7_000);
    h.coordinator.refresh_summary();

    assert_eq!(
        *summary.borrow(),
        format!(
            "Session: {}\nStart: 2024-05-01 12:00:00\nCodes: 0\nDuration: 7s",
            session.session_id()
        )
    );
}

#[tokio::test]
async fn test_clear_all_data_resets_everything() {
    let h = create_harness();
    h.coordinator.start_scanning().await.unwrap();
    h.coordinator
        .handle_feed_event(detections(&[("A", BarcodeFormat::QrCode)]));
    h.coordinator.confirm_capture();
    h.coordinator.export_current_session().await.unwrap();

    let removed = h.coordinator.clear_all_data().await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(h.coordinator.phase(), ScanPhase::Idle);
    assert!(h.coordinator.store().current_session().is_none());
    assert!(h.coordinator.scanned_codes().borrow().is_empty());
}

#[tokio::test]
async fn test_event_loop_processes_every_pulse() {
    let h = create_harness();
    let token = CancellationToken::new();
    let task = h.coordinator.spawn_event_loop(token.clone()).unwrap();
    assert!(h.coordinator.spawn_event_loop(token.clone()).is_err());

    h.coordinator.start_position_feed().await.unwrap();
    h.coordinator.start_scanning().await.unwrap();
    let mut codes = h.coordinator.scanned_codes();

    h.feed.fix(Some(GeoFix::new(5.0, 6.0)));
    h.feed.detect(vec![DetectedCode::new("P", BarcodeFormat::Pdf417)]);
    for _ in 0..3 {
        assert!(h.feed.press());
    }

    timeout(Duration::from_secs(2), async {
        while codes.borrow_and_update().len() < 3 {
            codes.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    let session = h.coordinator.store().current_session().unwrap();
    assert_eq!(session.code_count(), 3);
    assert!(session
        .codes()
        .iter()
        .all(|c| c.position() == Some(&GeoFix::new(5.0, 6.0))));

    h.coordinator.shutdown().await.unwrap();
    assert!(!h.feed.is_positioning());

    token.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_queued_pulse_resolves_before_close() {
    let h = create_harness();
    let token = CancellationToken::new();
    let task = h.coordinator.spawn_event_loop(token.clone()).unwrap();
    h.coordinator.start_scanning().await.unwrap();

    assert!(h.feed.detect(vec![DetectedCode::new("LATE", BarcodeFormat::QrCode)]));
    assert!(h.feed.press());
    let artifacts = h.coordinator.close_session().await.unwrap();

    assert_eq!(artifacts.code_count, 1);
    assert_eq!(h.coordinator.phase(), ScanPhase::Idle);
    let saved = h.coordinator.saved_sessions().await.unwrap();
    let loaded = h.coordinator.load_session(&saved[0]).await.unwrap();
    assert_eq!(loaded.code_count(), 1);
    assert_eq!(loaded.codes()[0].value(), "LATE");

    token.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_batch_queued_before_stop_does_not_survive_restart() {
    let h = create_harness();
    h.coordinator.start_scanning().await.unwrap();
    assert!(h.feed.detect(vec![DetectedCode::new("STALE", BarcodeFormat::QrCode)]));

    h.coordinator.stop_scanning().await.unwrap();
    h.coordinator.start_scanning().await.unwrap();

    assert_eq!(h.coordinator.drain_feed_events(), 0);
    assert!(!*h.coordinator.detection_active().borrow());
    assert_eq!(h.coordinator.confirm_capture(), CaptureOutcome::Rejected);
    assert_eq!(code_count(&h.coordinator), 0);
}

#[tokio::test]
async fn test_checkpoint_export_includes_queued_captures() {
    let h = create_harness();
    let token = CancellationToken::new();
    let task = h.coordinator.spawn_event_loop(token.clone()).unwrap();
    h.coordinator.start_scanning().await.unwrap();

    assert!(h.feed.detect(vec![
        DetectedCode::new("A", BarcodeFormat::QrCode),
        DetectedCode::new("B", BarcodeFormat::Ean13),
        DetectedCode::new("C", BarcodeFormat::Code128),
    ]));
    for _ in 0..20 {
        assert!(h.feed.press());
    }

    let artifacts = h.coordinator.export_current_session().await.unwrap();
    assert!(artifacts.is_complete());
    assert_eq!(artifacts.code_count, 60);
    assert_eq!(h.coordinator.phase(), ScanPhase::Scanning);

    let path = artifacts.result(ExportFormat::Structured).as_ref().unwrap();
    let snapshot = h.coordinator.load_session(path).await.unwrap();
    assert_eq!(snapshot.code_count(), 60);
    let values: Vec<&str> = snapshot.codes().iter().map(|c| c.value()).collect();
    assert!(values.chunks(3).all(|batch| batch == ["A", "B", "C"]));

    token.cancel();
    task.await.unwrap();
}
