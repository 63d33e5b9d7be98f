use click_replay::capture::{MockCaptureBackend, MockCaptureHandle};
use click_replay::engine::{ClickEngine, EngineEventSink, EngineNotification, EngineState};
use click_replay::hotkey::HotkeyAction;
use click_replay::player::{CursorPositionProvider, MockPointer};
use click_replay::sequence::{ClickButton, RecordPatch};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<EngineNotification>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<EngineNotification> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EngineEventSink for RecordingSink {
    fn dispatch(&self, event: EngineNotification) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn started_engine() -> (
    ClickEngine,
    MockCaptureHandle,
    Arc<RecordingSink>,
    Arc<MockPointer>,
) {
    let (backend, handle) = MockCaptureBackend::new();
    let sink = Arc::new(RecordingSink::default());
    let pointer = Arc::new(MockPointer::default());
    let mut engine = ClickEngine::new_with_io(
        Box::new(backend),
        sink.clone(),
        pointer.clone(),
        pointer.clone(),
    );
    engine.start().expect("engine should start");
    (engine, handle, sink, pointer)
}

fn record_clicks(
    engine: &ClickEngine,
    handle: &MockCaptureHandle,
    clicks: &[(ClickButton, (f64, f64))],
) {
    handle.tap_key(HotkeyAction::RecordToggle);
    assert!(wait_until(
        || engine.state() == EngineState::Recording,
        Duration::from_secs(2)
    ));
    for (button, position) in clicks {
        handle.click(*button, *position);
    }
    assert!(wait_until(
        || engine.sequence().len() == clicks.len(),
        Duration::from_secs(2)
    ));
    handle.tap_key(HotkeyAction::RecordToggle);
    assert!(wait_until(
        || engine.state() == EngineState::Idle,
        Duration::from_secs(2)
    ));
}

#[test]
fn replays_recorded_clicks_once_without_loop() {
    let (mut engine, handle, _sink, pointer) = started_engine();
    engine.set_click_delay(0);

    record_clicks(
        &engine,
        &handle,
        &[
            (ClickButton::Left, (10.0, 20.0)),
            (ClickButton::Left, (30.0, 40.0)),
        ],
    );

    handle.tap_key(HotkeyAction::PlayToggle);
    assert!(wait_until(
        || pointer.click_count() == 2 && engine.state() == EngineState::Idle,
        Duration::from_secs(2)
    ));
    std::thread::sleep(Duration::from_millis(50));

    let clicks = pointer.clicks();
    assert_eq!(clicks.len(), 2);
    assert_eq!(clicks[0], (ClickButton::Left, (10.0, 20.0)));
    assert_eq!(clicks[1], (ClickButton::Left, (30.0, 40.0)));
    engine.stop();
}

#[test]
fn delay_is_stamped_at_record_time() {
    let (mut engine, handle, _sink, _pointer) = started_engine();

    engine.set_click_delay(500);
    record_clicks(&engine, &handle, &[(ClickButton::Left, (10.0, 20.0))]);

    engine.set_click_delay(1000);
    handle.tap_key(HotkeyAction::RecordToggle);
    assert!(wait_until(
        || engine.state() == EngineState::Recording,
        Duration::from_secs(2)
    ));
    handle.click(ClickButton::Left, (30.0, 40.0));
    assert!(wait_until(
        || engine.sequence().len() == 2,
        Duration::from_secs(2)
    ));
    handle.tap_key(HotkeyAction::RecordToggle);
    assert!(wait_until(
        || engine.state() == EngineState::Idle,
        Duration::from_secs(2)
    ));

    let sequence = engine.sequence();
    assert_eq!(sequence[0].delay_ms, 500);
    assert_eq!(sequence[1].delay_ms, 1000);

    // Later configuration edits never touch what was already recorded.
    engine.set_click_delay(1);
    let sequence = engine.sequence();
    assert_eq!(sequence[0].delay_ms, 500);
    assert_eq!(sequence[1].delay_ms, 1000);
    engine.stop();
}

#[test]
fn looping_replays_until_toggled_off() {
    let (mut engine, handle, _sink, pointer) = started_engine();
    engine.set_click_delay(0);
    engine.set_loop_enabled(true);

    record_clicks(
        &engine,
        &handle,
        &[
            (ClickButton::Left, (1.0, 1.0)),
            (ClickButton::Left, (2.0, 2.0)),
        ],
    );

    handle.tap_key(HotkeyAction::PlayToggle);
    // At least two full passes.
    assert!(wait_until(
        || pointer.click_count() >= 4,
        Duration::from_secs(2)
    ));
    assert_eq!(engine.state(), EngineState::Playing);

    handle.tap_key(HotkeyAction::PlayToggle);
    assert!(wait_until(
        || engine.state() == EngineState::Idle,
        Duration::from_secs(2)
    ));

    // The player is joined on toggle-off, so the click count settles.
    let settled = pointer.click_count();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(pointer.click_count(), settled);
    engine.stop();
}

#[test]
fn cancelling_mid_animation_emits_no_clicks() {
    let (mut engine, handle, _sink, pointer) = started_engine();
    engine.set_click_delay(1000);
    pointer.set_position((0.0, 0.0));

    record_clicks(&engine, &handle, &[(ClickButton::Left, (100.0, 100.0))]);

    handle.tap_key(HotkeyAction::PlayToggle);
    assert!(wait_until(
        || engine.state() == EngineState::Playing,
        Duration::from_secs(2)
    ));
    std::thread::sleep(Duration::from_millis(50));

    handle.tap_key(HotkeyAction::PlayToggle);
    assert!(wait_until(
        || engine.state() == EngineState::Idle,
        Duration::from_secs(2)
    ));

    // Aborted before the click fired; the cursor stays where the animation
    // stopped.
    assert_eq!(pointer.click_count(), 0);
    assert!(!pointer.moves().is_empty());
    let (x, y) = pointer.cursor_position().unwrap();
    assert!(x < 100.0 && y < 100.0);
    engine.stop();
}

#[test]
fn click_synthesis_failure_skips_the_record_and_keeps_playing() {
    let (mut engine, handle, _sink, pointer) = started_engine();
    engine.set_click_delay(0);
    pointer.set_fail_clicks(true);

    record_clicks(
        &engine,
        &handle,
        &[
            (ClickButton::Left, (10.0, 20.0)),
            (ClickButton::Left, (30.0, 40.0)),
        ],
    );

    handle.tap_key(HotkeyAction::PlayToggle);
    assert!(wait_until(
        || engine.state() == EngineState::Idle,
        Duration::from_secs(2)
    ));

    // The pass completed: both positions were visited even though every
    // click failed.
    assert_eq!(pointer.click_count(), 0);
    let moves = pointer.moves();
    assert!(moves.contains(&(10.0, 20.0)));
    assert!(moves.contains(&(30.0, 40.0)));
    engine.stop();
}

#[test]
fn edits_apply_to_the_next_pass_snapshot() {
    let (mut engine, handle, _sink, pointer) = started_engine();
    engine.set_click_delay(0);

    record_clicks(&engine, &handle, &[(ClickButton::Left, (10.0, 20.0))]);

    engine
        .edit_record(
            0,
            RecordPatch {
                position: Some((70.0, 80.0)),
                ..Default::default()
            },
        )
        .expect("record should be editable");

    handle.tap_key(HotkeyAction::PlayToggle);
    assert!(wait_until(
        || pointer.click_count() == 1 && engine.state() == EngineState::Idle,
        Duration::from_secs(2)
    ));

    assert_eq!(pointer.clicks()[0], (ClickButton::Left, (70.0, 80.0)));
    engine.stop();
}

#[test]
fn playback_finishing_naturally_reports_idle_once() {
    let (mut engine, handle, sink, pointer) = started_engine();
    engine.set_click_delay(0);

    record_clicks(&engine, &handle, &[(ClickButton::Left, (10.0, 20.0))]);

    handle.tap_key(HotkeyAction::PlayToggle);
    assert!(wait_until(
        || pointer.click_count() == 1 && engine.state() == EngineState::Idle,
        Duration::from_secs(2)
    ));
    std::thread::sleep(Duration::from_millis(50));

    let states: Vec<EngineState> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            EngineNotification::StateChanged(state) => Some(state),
            _ => None,
        })
        .collect();
    // Recording on/off, then playing and a single return to idle.
    assert_eq!(
        states,
        vec![
            EngineState::Recording,
            EngineState::Idle,
            EngineState::Playing,
            EngineState::Idle,
        ]
    );
    engine.stop();
}
