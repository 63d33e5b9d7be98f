use crate::capture::{CaptureBackend, CaptureEvent, RdevCaptureBackend};
use crate::hotkey::HotkeyAction;
use crate::player::{ClickSynthesizer, CursorPositionProvider, Player, PlayerHandle, SystemPointer};
use crate::sequence::{shared_sequence, ClickRecord, RecordPatch, SharedClickSequence};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Engine lifecycle state. Exactly one instance, owned by [`ClickEngine`];
/// recording and playing are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Recording,
    Playing,
}

impl EngineState {
    fn as_u8(self) -> u8 {
        match self {
            EngineState::Idle => 0,
            EngineState::Recording => 1,
            EngineState::Playing => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Recording,
            2 => EngineState::Playing,
            _ => EngineState::Idle,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The OS denied the global input hook. Fatal to record/play, not to
    /// the process; the shell shows a disabled-feature status.
    #[error("global input capture unavailable")]
    CaptureUnavailable(#[source] anyhow::Error),
    /// `start()` without an intervening `stop()`.
    #[error("engine already started")]
    AlreadyStarted,
    /// Delay text rejected at the shell boundary; the engine itself only
    /// ever sees non-negative values.
    #[error("invalid delay value: {0:?}")]
    InvalidDelay(String),
    #[error("no record at index {0}")]
    IndexOutOfRange(usize),
}

/// Push notification from the engine to the shell.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotification {
    StateChanged(EngineState),
    /// Emitted after every append, clear, delete and edit, carrying the
    /// full sequence for display.
    SequenceChanged(Vec<ClickRecord>),
    CaptureUnavailable(String),
}

/// Shell-side receiver for engine notifications. Dispatch happens on engine
/// threads and must return quickly.
pub trait EngineEventSink: Send + Sync {
    fn dispatch(&self, event: EngineNotification);
}

/// Sink that drops every notification.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EngineEventSink for NullEventSink {
    fn dispatch(&self, _event: EngineNotification) {}
}

/// State shared between the engine handle, the control worker and the
/// shell-facing command methods.
struct EngineShared {
    state: AtomicU8,
    click_delay_ms: AtomicU64,
    loop_enabled: Arc<AtomicBool>,
    sequence: SharedClickSequence,
    sink: Arc<dyn EngineEventSink>,
}

impl EngineShared {
    fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state.as_u8(), Ordering::Release);
        self.sink.dispatch(EngineNotification::StateChanged(state));
    }

    fn notify_sequence(&self) {
        let snapshot = self
            .sequence
            .lock()
            .map(|sequence| sequence.snapshot())
            .unwrap_or_default();
        self.sink
            .dispatch(EngineNotification::SequenceChanged(snapshot));
    }
}

enum EngineCommand {
    Hotkey(HotkeyAction),
    /// Tagged with the playback session it belongs to; a completion from an
    /// already-stopped session must not tear down its successor.
    PlaybackFinished(u64),
}

struct WorkerHandle {
    stop_tx: Sender<()>,
    join: JoinHandle<()>,
}

/// The record/playback engine.
///
/// Owns the capture backend, the recorded sequence, the configuration and
/// the control worker that serializes every state transition. The shell
/// talks to it through the command methods and receives push notifications
/// through the [`EngineEventSink`] it was built with; the engine holds no
/// reference to any UI type.
pub struct ClickEngine {
    shared: Arc<EngineShared>,
    backend: Box<dyn CaptureBackend>,
    cursor: Arc<dyn CursorPositionProvider>,
    output: Arc<dyn ClickSynthesizer>,
    worker: Option<WorkerHandle>,
    cmd_tx: Option<Sender<EngineCommand>>,
}

impl Default for ClickEngine {
    fn default() -> Self {
        Self::new_with_backend(
            Box::new(RdevCaptureBackend::default()),
            Arc::new(NullEventSink),
        )
    }
}

impl ClickEngine {
    pub fn new_with_backend(
        backend: Box<dyn CaptureBackend>,
        sink: Arc<dyn EngineEventSink>,
    ) -> Self {
        let pointer = Arc::new(SystemPointer);
        let cursor: Arc<dyn CursorPositionProvider> = pointer.clone();
        let output: Arc<dyn ClickSynthesizer> = pointer;
        Self::new_with_io(backend, sink, cursor, output)
    }

    pub fn new_with_io(
        backend: Box<dyn CaptureBackend>,
        sink: Arc<dyn EngineEventSink>,
        cursor: Arc<dyn CursorPositionProvider>,
        output: Arc<dyn ClickSynthesizer>,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                state: AtomicU8::new(EngineState::Idle.as_u8()),
                click_delay_ms: AtomicU64::new(1000),
                loop_enabled: Arc::new(AtomicBool::new(false)),
                sequence: shared_sequence(),
                sink,
            }),
            backend,
            cursor,
            output,
            worker: None,
            cmd_tx: None,
        }
    }

    /// Install the capture hook and spawn the control worker.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.worker.is_some() {
            return Err(EngineError::AlreadyStarted);
        }

        let (event_tx, event_rx) = mpsc::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel();

        if let Err(err) = self.backend.install(event_tx) {
            tracing::error!(error = %err, "failed to install input capture");
            self.shared
                .sink
                .dispatch(EngineNotification::CaptureUnavailable(err.to_string()));
            return Err(EngineError::CaptureUnavailable(err));
        }

        let worker = ControlLoop {
            shared: Arc::clone(&self.shared),
            cursor: Arc::clone(&self.cursor),
            output: Arc::clone(&self.output),
            cmd_tx: cmd_tx.clone(),
            player: None,
            session: 0,
        };
        let join = thread::spawn(move || worker.run(event_rx, cmd_rx, stop_rx));
        self.worker = Some(WorkerHandle { stop_tx, join });
        self.cmd_tx = Some(cmd_tx);
        Ok(())
    }

    /// Tear down capture and the control worker, cancelling any playback.
    /// Stopping an engine that is not running is a no-op.
    pub fn stop(&mut self) {
        if self.worker.is_none() && !self.backend.is_installed() {
            return;
        }

        if let Err(err) = self.backend.uninstall() {
            tracing::error!(?err, "failed to uninstall input capture");
        }

        self.cmd_tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.join.join();
        }

        if self.shared.state() != EngineState::Idle {
            self.shared.set_state(EngineState::Idle);
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    /// Owned copy of the recorded sequence, for display.
    pub fn sequence(&self) -> Vec<ClickRecord> {
        self.shared
            .sequence
            .lock()
            .map(|sequence| sequence.snapshot())
            .unwrap_or_default()
    }

    /// Delay stamped onto records captured from now on. Already-recorded
    /// entries keep the delay they were stamped with.
    pub fn set_click_delay(&self, delay_ms: u64) {
        self.shared.click_delay_ms.store(delay_ms, Ordering::Release);
    }

    pub fn click_delay(&self) -> u64 {
        self.shared.click_delay_ms.load(Ordering::Acquire)
    }

    pub fn set_loop_enabled(&self, enabled: bool) {
        self.shared.loop_enabled.store(enabled, Ordering::Release);
    }

    pub fn loop_enabled(&self) -> bool {
        self.shared.loop_enabled.load(Ordering::Acquire)
    }

    pub fn clear_sequence(&self) {
        if let Ok(mut sequence) = self.shared.sequence.lock() {
            sequence.clear();
        }
        self.shared.notify_sequence();
    }

    pub fn delete_record(&self, index: usize) -> Result<(), EngineError> {
        let removed = self
            .shared
            .sequence
            .lock()
            .ok()
            .and_then(|mut sequence| sequence.remove(index));
        match removed {
            Some(_) => {
                self.shared.notify_sequence();
                Ok(())
            }
            None => Err(EngineError::IndexOutOfRange(index)),
        }
    }

    pub fn edit_record(&self, index: usize, patch: RecordPatch) -> Result<ClickRecord, EngineError> {
        let edited = self
            .shared
            .sequence
            .lock()
            .ok()
            .and_then(|mut sequence| sequence.edit(index, patch));
        match edited {
            Some(record) => {
                self.shared.notify_sequence();
                Ok(record)
            }
            None => Err(EngineError::IndexOutOfRange(index)),
        }
    }

    /// Shell equivalents of the hotkeys, for buttons and menus.
    pub fn request_record_toggle(&self) {
        self.send_command(EngineCommand::Hotkey(HotkeyAction::RecordToggle));
    }

    pub fn request_play_toggle(&self) {
        self.send_command(EngineCommand::Hotkey(HotkeyAction::PlayToggle));
    }

    pub fn request_cancel(&self) {
        self.send_command(EngineCommand::Hotkey(HotkeyAction::Cancel));
    }

    fn send_command(&self, command: EngineCommand) {
        match &self.cmd_tx {
            Some(tx) => {
                let _ = tx.send(command);
            }
            None => tracing::debug!("engine not running, command dropped"),
        }
    }
}

/// Control worker: the single consumer of capture events and shell toggle
/// commands. No two transitions ever execute concurrently.
struct ControlLoop {
    shared: Arc<EngineShared>,
    cursor: Arc<dyn CursorPositionProvider>,
    output: Arc<dyn ClickSynthesizer>,
    cmd_tx: Sender<EngineCommand>,
    player: Option<PlayerHandle>,
    session: u64,
}

const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl ControlLoop {
    fn run(
        mut self,
        event_rx: Receiver<CaptureEvent>,
        cmd_rx: Receiver<EngineCommand>,
        stop_rx: Receiver<()>,
    ) {
        loop {
            if stop_rx.try_recv().is_ok() {
                break;
            }
            while let Ok(command) = cmd_rx.try_recv() {
                self.on_command(command);
            }
            match event_rx.recv_timeout(CONTROL_POLL_INTERVAL) {
                Ok(event) => self.on_capture_event(event),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Some(handle) = self.player.take() {
            handle.cancel();
            handle.join();
        }
    }

    fn on_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Hotkey(action) => self.on_action(action),
            EngineCommand::PlaybackFinished(session) => self.on_playback_finished(session),
        }
    }

    fn on_capture_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Key {
                action,
                pressed: true,
            } => self.on_action(action),
            CaptureEvent::Key { .. } => {}
            CaptureEvent::Mouse {
                button,
                position,
                pressed: true,
            } if self.shared.state() == EngineState::Recording => {
                let delay_ms = self.shared.click_delay_ms.load(Ordering::Acquire);
                tracing::info!(?position, %button, delay_ms, "recorded click");
                if let Ok(mut sequence) = self.shared.sequence.lock() {
                    sequence.push(ClickRecord {
                        button,
                        position,
                        delay_ms,
                    });
                }
                self.shared.notify_sequence();
            }
            // Button releases, and any mouse event outside Recording, are
            // dropped.
            CaptureEvent::Mouse { .. } => {}
        }
    }

    fn on_action(&mut self, action: HotkeyAction) {
        match action {
            HotkeyAction::RecordToggle => self.record_toggle(),
            HotkeyAction::PlayToggle => self.play_toggle(),
            HotkeyAction::Cancel => self.cancel_all(),
        }
    }

    fn record_toggle(&mut self) {
        match self.shared.state() {
            EngineState::Idle => {
                tracing::info!("recording clicks");
                self.shared.set_state(EngineState::Recording);
            }
            EngineState::Recording => {
                tracing::info!("stopped recording");
                self.shared.set_state(EngineState::Idle);
            }
            EngineState::Playing => {
                tracing::debug!("record toggle ignored while playing");
            }
        }
    }

    fn play_toggle(&mut self) {
        match self.shared.state() {
            EngineState::Recording => {
                // One control surface: the play key first ends recording,
                // then follows the idle rule.
                tracing::info!("stopped recording");
                self.shared.set_state(EngineState::Idle);
                self.try_start_playback();
            }
            EngineState::Idle => self.try_start_playback(),
            EngineState::Playing => self.stop_playback(),
        }
    }

    fn try_start_playback(&mut self) {
        let empty = self
            .shared
            .sequence
            .lock()
            .map(|sequence| sequence.is_empty())
            .unwrap_or(true);
        if empty {
            tracing::info!("no clicks recorded, nothing to play");
            return;
        }
        self.session += 1;
        let session = self.session;
        let done_tx = self.cmd_tx.clone();
        let handle = Player::spawn(
            Arc::clone(&self.shared.sequence),
            Arc::clone(&self.shared.loop_enabled),
            Arc::clone(&self.cursor),
            Arc::clone(&self.output),
            move || {
                let _ = done_tx.send(EngineCommand::PlaybackFinished(session));
            },
        );
        self.player = Some(handle);
        tracing::info!("playing clicks");
        self.shared.set_state(EngineState::Playing);
    }

    fn stop_playback(&mut self) {
        if let Some(handle) = self.player.take() {
            handle.cancel();
            // Wait for the player to acknowledge before reporting idle.
            handle.join();
        }
        tracing::info!("stopped playing");
        self.shared.set_state(EngineState::Idle);
    }

    fn cancel_all(&mut self) {
        if let Some(handle) = self.player.take() {
            handle.cancel();
            handle.join();
        }
        tracing::info!("cancelled, back to idle");
        self.shared.set_state(EngineState::Idle);
    }

    fn on_playback_finished(&mut self, session: u64) {
        // Stale completion from a session the user already stopped.
        if session != self.session || self.shared.state() != EngineState::Playing {
            tracing::debug!(session, "ignoring stale playback completion");
            return;
        }
        if let Some(handle) = self.player.take() {
            handle.join();
        }
        tracing::info!("playback finished");
        self.shared.set_state(EngineState::Idle);
    }
}
