use crate::sequence::{ClickButton, ClickRecord, SharedClickSequence};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cursor animation update interval. Cancellation latency is bounded by one
/// tick.
pub const TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Linear interpolation between two desktop positions at `progress` in
/// `[0, 1]`.
pub fn lerp(start: (f64, f64), end: (f64, f64), progress: f64) -> (f64, f64) {
    (
        start.0 + (end.0 - start.0) * progress,
        start.1 + (end.1 - start.1) * progress,
    )
}

/// Read access to the real cursor position. Animation starts from wherever
/// the cursor actually is, not where the previous record left it.
pub trait CursorPositionProvider: Send + Sync {
    fn cursor_position(&self) -> Option<(f64, f64)>;
}

/// Synthetic pointer output: cursor movement and button clicks.
pub trait ClickSynthesizer: Send + Sync {
    fn move_cursor(&self, position: (f64, f64)) -> anyhow::Result<()>;
    fn click(&self, button: ClickButton) -> anyhow::Result<()>;
}

#[cfg(windows)]
mod win32 {
    use super::{ClickButton, ClickSynthesizer, CursorPositionProvider};
    use anyhow::anyhow;
    use windows::Win32::Foundation::POINT;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
        MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP,
        MOUSE_EVENT_FLAGS, MOUSEINPUT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetCursorPos, SetCursorPos};

    // Stamped into dwExtraInfo so the capture hook can tell replayed input
    // from the user's own.
    const INJECT_TAG: usize = 0x4352_494E_4A; // "CRINJ"

    #[derive(Debug, Default)]
    pub struct SystemPointer;

    impl CursorPositionProvider for SystemPointer {
        fn cursor_position(&self) -> Option<(f64, f64)> {
            let mut point = POINT { x: 0, y: 0 };
            if unsafe { GetCursorPos(&mut point).is_ok() } {
                Some((point.x as f64, point.y as f64))
            } else {
                None
            }
        }
    }

    fn button_flags(button: ClickButton) -> (MOUSE_EVENT_FLAGS, MOUSE_EVENT_FLAGS) {
        match button {
            ClickButton::Left => (MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP),
            ClickButton::Right => (MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP),
            ClickButton::Middle => (MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP),
        }
    }

    fn mouse_input(flags: MOUSE_EVENT_FLAGS) -> INPUT {
        INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx: 0,
                    dy: 0,
                    mouseData: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: INJECT_TAG,
                },
            },
        }
    }

    impl ClickSynthesizer for SystemPointer {
        fn move_cursor(&self, position: (f64, f64)) -> anyhow::Result<()> {
            unsafe {
                SetCursorPos(position.0 as i32, position.1 as i32)
                    .map_err(|err| anyhow!("SetCursorPos failed: {err}"))
            }
        }

        fn click(&self, button: ClickButton) -> anyhow::Result<()> {
            let (down_flag, up_flag) = button_flags(button);
            let inputs = [mouse_input(down_flag), mouse_input(up_flag)];
            let sent = unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) };
            if sent as usize != inputs.len() {
                anyhow::bail!("SendInput sent {sent} of {} events", inputs.len());
            }
            Ok(())
        }
    }
}

#[cfg(not(windows))]
mod simulated {
    use super::{ClickButton, ClickSynthesizer, CursorPositionProvider};
    use anyhow::anyhow;
    use rdev::{simulate, Button, EventType};

    #[derive(Debug, Default)]
    pub struct SystemPointer;

    impl CursorPositionProvider for SystemPointer {
        fn cursor_position(&self) -> Option<(f64, f64)> {
            // No portable cursor query; animation falls back to an immediate
            // move.
            None
        }
    }

    fn raw_button(button: ClickButton) -> Button {
        match button {
            ClickButton::Left => Button::Left,
            ClickButton::Right => Button::Right,
            ClickButton::Middle => Button::Middle,
        }
    }

    impl ClickSynthesizer for SystemPointer {
        fn move_cursor(&self, position: (f64, f64)) -> anyhow::Result<()> {
            simulate(&EventType::MouseMove {
                x: position.0,
                y: position.1,
            })
            .map_err(|err| anyhow!("failed to move cursor: {err:?}"))
        }

        fn click(&self, button: ClickButton) -> anyhow::Result<()> {
            let button = raw_button(button);
            simulate(&EventType::ButtonPress(button))
                .map_err(|err| anyhow!("failed to press button: {err:?}"))?;
            simulate(&EventType::ButtonRelease(button))
                .map_err(|err| anyhow!("failed to release button: {err:?}"))
        }
    }
}

#[cfg(windows)]
pub use win32::SystemPointer;

#[cfg(not(windows))]
pub use simulated::SystemPointer;

/// In-process pointer for tests: `move_cursor` updates the position that
/// `cursor_position` reports, and every click is recorded.
#[derive(Default)]
pub struct MockPointer {
    position: Mutex<(f64, f64)>,
    moves: Mutex<Vec<(f64, f64)>>,
    clicks: Mutex<Vec<(ClickButton, (f64, f64))>>,
    fail_clicks: AtomicBool,
}

impl MockPointer {
    pub fn set_position(&self, position: (f64, f64)) {
        if let Ok(mut guard) = self.position.lock() {
            *guard = position;
        }
    }

    /// Make every subsequent click report an error, to exercise the
    /// keep-playing policy.
    pub fn set_fail_clicks(&self, fail: bool) {
        self.fail_clicks.store(fail, Ordering::SeqCst);
    }

    pub fn moves(&self) -> Vec<(f64, f64)> {
        self.moves.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn clicks(&self) -> Vec<(ClickButton, (f64, f64))> {
        self.clicks.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn click_count(&self) -> usize {
        self.clicks.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl CursorPositionProvider for MockPointer {
    fn cursor_position(&self) -> Option<(f64, f64)> {
        self.position.lock().ok().map(|p| *p)
    }
}

impl ClickSynthesizer for MockPointer {
    fn move_cursor(&self, position: (f64, f64)) -> anyhow::Result<()> {
        self.set_position(position);
        if let Ok(mut guard) = self.moves.lock() {
            guard.push(position);
        }
        Ok(())
    }

    fn click(&self, button: ClickButton) -> anyhow::Result<()> {
        if self.fail_clicks.load(Ordering::SeqCst) {
            anyhow::bail!("click synthesis disabled");
        }
        let position = self.cursor_position().unwrap_or((0.0, 0.0));
        if let Ok(mut guard) = self.clicks.lock() {
            guard.push((button, position));
        }
        Ok(())
    }
}

/// Running playback session. Cancellation is cooperative: the flag is
/// polled every tick and around every click.
pub struct PlayerHandle {
    cancel: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl PlayerHandle {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn join(self) {
        let _ = self.join.join();
    }
}

pub struct Player {
    sequence: SharedClickSequence,
    loop_enabled: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    cursor: Arc<dyn CursorPositionProvider>,
    output: Arc<dyn ClickSynthesizer>,
}

impl Player {
    /// Start a playback thread. `on_done` fires only when the sequence
    /// finishes naturally (loop disabled, or nothing left to replay) — a
    /// cancelled session ends silently and its owner already knows.
    pub fn spawn(
        sequence: SharedClickSequence,
        loop_enabled: Arc<AtomicBool>,
        cursor: Arc<dyn CursorPositionProvider>,
        output: Arc<dyn ClickSynthesizer>,
        on_done: impl FnOnce() + Send + 'static,
    ) -> PlayerHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let player = Player {
            sequence,
            loop_enabled,
            cancel: Arc::clone(&cancel),
            cursor,
            output,
        };
        let join = thread::spawn(move || player.run(on_done));
        PlayerHandle { cancel, join }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn run(self, on_done: impl FnOnce()) {
        loop {
            // Fresh snapshot each pass so edits made during a looping replay
            // take effect at the next pass boundary.
            let pass = self
                .sequence
                .lock()
                .map(|sequence| sequence.snapshot())
                .unwrap_or_default();
            if pass.is_empty() {
                break;
            }
            for (step, record) in pass.iter().enumerate() {
                if self.cancelled() {
                    tracing::debug!("playback cancelled");
                    return;
                }
                if !self.animate_to(record) {
                    tracing::debug!("playback cancelled mid-animation");
                    return;
                }
                if let Err(err) = self.output.move_cursor(record.position) {
                    tracing::warn!(?err, step, "failed to position cursor");
                }
                tracing::debug!(step, position = ?record.position, button = %record.button, "replaying click");
                if let Err(err) = self.output.click(record.button) {
                    // Best effort: skip the record and keep the pass going.
                    tracing::warn!(?err, step, "failed to synthesize click");
                }
            }
            if !self.loop_enabled.load(Ordering::Acquire) {
                break;
            }
        }
        tracing::debug!("playback finished");
        on_done();
    }

    /// Animate the cursor toward `record.position` over `record.delay_ms`.
    /// Returns false when cancelled mid-flight; the cursor stays wherever
    /// the last tick put it.
    fn animate_to(&self, record: &ClickRecord) -> bool {
        let duration = Duration::from_millis(record.delay_ms);
        if duration.is_zero() {
            return true;
        }
        let start = match self.cursor.cursor_position() {
            Some(position) => position,
            None => return true,
        };
        let end = record.position;
        let started = Instant::now();
        loop {
            if self.cancelled() {
                return false;
            }
            let elapsed = started.elapsed();
            if elapsed >= duration {
                return true;
            }
            let progress = elapsed.as_secs_f64() / duration.as_secs_f64();
            if let Err(err) = self.output.move_cursor(lerp(start, end, progress)) {
                tracing::debug!(?err, "cursor move failed during animation");
            }
            thread::sleep(TICK_INTERVAL);
        }
    }
}
