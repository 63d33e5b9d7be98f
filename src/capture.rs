use crate::hotkey::{HotkeyAction, HotkeyBindings, ModifierState};
use crate::sequence::ClickButton;
use anyhow::anyhow;
use once_cell::sync::OnceCell;
use rdev::{listen, Button, EventType};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Typed event delivered by the capture layer to the engine.
///
/// Key events are pre-mapped to the logical hotkey actions; keys that match
/// no binding are never forwarded. Mouse events carry the desktop cursor
/// position at the time of the button transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureEvent {
    Key {
        action: HotkeyAction,
        pressed: bool,
    },
    Mouse {
        button: ClickButton,
        position: (f64, f64),
        pressed: bool,
    },
}

/// OS-level global input hook.
///
/// Installing twice without uninstalling is an error; uninstalling when not
/// installed is a no-op. The handler path must never block: implementations
/// forward events over the channel and return.
pub trait CaptureBackend: Send {
    fn install(&mut self, sender: Sender<CaptureEvent>) -> anyhow::Result<()>;
    fn uninstall(&mut self) -> anyhow::Result<()>;
    fn is_installed(&self) -> bool;
}

/// Shared state the rdev callback reads. The listener thread outlives any
/// single install/uninstall cycle (rdev offers no way to stop listening),
/// so enabling and routing are controlled from here instead.
struct CaptureDispatch {
    enabled: AtomicBool,
    listener_alive: AtomicBool,
    sender: Mutex<Option<Sender<CaptureEvent>>>,
    bindings: Mutex<HotkeyBindings>,
    modifiers: Mutex<ModifierState>,
    position: Mutex<(f64, f64)>,
}

static DISPATCH: OnceCell<CaptureDispatch> = OnceCell::new();

fn capture_dispatch() -> &'static CaptureDispatch {
    DISPATCH.get_or_init(|| CaptureDispatch {
        enabled: AtomicBool::new(false),
        listener_alive: AtomicBool::new(false),
        sender: Mutex::new(None),
        bindings: Mutex::new(HotkeyBindings::default()),
        modifiers: Mutex::new(ModifierState::default()),
        position: Mutex::new((0.0, 0.0)),
    })
}

impl CaptureDispatch {
    fn set_sender(&self, sender: Option<Sender<CaptureEvent>>) {
        if let Ok(mut guard) = self.sender.lock() {
            *guard = sender;
        }
    }

    fn send(&self, event: CaptureEvent) {
        if let Ok(guard) = self.sender.lock() {
            if let Some(sender) = guard.as_ref() {
                let _ = sender.send(event);
            }
        }
    }

    fn set_bindings(&self, bindings: HotkeyBindings) {
        if let Ok(mut guard) = self.bindings.lock() {
            *guard = bindings;
        }
    }

    fn position(&self) -> (f64, f64) {
        self.position.lock().map(|p| *p).unwrap_or((0.0, 0.0))
    }
}

fn map_button(button: Button) -> Option<ClickButton> {
    match button {
        Button::Left => Some(ClickButton::Left),
        Button::Right => Some(ClickButton::Right),
        Button::Middle => Some(ClickButton::Middle),
        _ => None,
    }
}

/// rdev callback. Runs on the listener thread for every global input event;
/// does nothing but update dispatch state and forward over the channel.
fn on_raw_event(event: rdev::Event) {
    let dispatch = capture_dispatch();
    match event.event_type {
        EventType::MouseMove { x, y } => {
            if let Ok(mut pos) = dispatch.position.lock() {
                *pos = (x, y);
            }
        }
        EventType::KeyPress(key) | EventType::KeyRelease(key) => {
            let pressed = matches!(event.event_type, EventType::KeyPress(_));
            let mods = {
                let mut guard = match dispatch.modifiers.lock() {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
                if guard.apply(key, pressed) {
                    return;
                }
                *guard
            };
            if !dispatch.enabled.load(Ordering::Acquire) {
                return;
            }
            let action = dispatch
                .bindings
                .lock()
                .ok()
                .and_then(|bindings| bindings.action_for(key, mods));
            if let Some(action) = action {
                dispatch.send(CaptureEvent::Key { action, pressed });
            }
        }
        EventType::ButtonPress(button) | EventType::ButtonRelease(button) => {
            if !dispatch.enabled.load(Ordering::Acquire) {
                return;
            }
            let pressed = matches!(event.event_type, EventType::ButtonPress(_));
            if let Some(button) = map_button(button) {
                dispatch.send(CaptureEvent::Mouse {
                    button,
                    position: dispatch.position(),
                    pressed,
                });
            }
        }
        _ => {}
    }
}

/// Spawn the rdev listener thread if it is not already running.
///
/// `rdev::listen` blocks for the lifetime of the hook and only returns on
/// failure, so readiness is signalled by the absence of an early error: the
/// thread reports a hook failure through a handshake channel and the caller
/// treats a short silence as success.
fn ensure_listener() -> anyhow::Result<()> {
    let dispatch = capture_dispatch();
    if dispatch.listener_alive.load(Ordering::Acquire) {
        return Ok(());
    }

    let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<String>(1);
    dispatch.listener_alive.store(true, Ordering::Release);
    thread::spawn(move || {
        tracing::debug!("starting global input listener");
        if let Err(err) = listen(on_raw_event) {
            let message = format!("{err:?}");
            tracing::error!(error = %message, "global input listener failed");
            capture_dispatch()
                .listener_alive
                .store(false, Ordering::Release);
            let _ = ready_tx.send(message);
        } else {
            // listen() returning Ok means the hook was torn down externally.
            tracing::warn!("global input listener exited");
            capture_dispatch()
                .listener_alive
                .store(false, Ordering::Release);
        }
    });

    match ready_rx.recv_timeout(Duration::from_millis(250)) {
        Ok(message) => Err(anyhow!("global input hook unavailable: {message}")),
        Err(_) => Ok(()),
    }
}

/// Default capture backend built on rdev's global listener.
pub struct RdevCaptureBackend {
    bindings: HotkeyBindings,
    installed: bool,
}

impl RdevCaptureBackend {
    pub fn new(bindings: HotkeyBindings) -> Self {
        Self {
            bindings,
            installed: false,
        }
    }
}

impl Default for RdevCaptureBackend {
    fn default() -> Self {
        Self::new(HotkeyBindings::default())
    }
}

impl CaptureBackend for RdevCaptureBackend {
    fn install(&mut self, sender: Sender<CaptureEvent>) -> anyhow::Result<()> {
        if self.installed {
            return Err(anyhow!("input capture already installed"));
        }
        let dispatch = capture_dispatch();
        dispatch.set_bindings(self.bindings);
        dispatch.set_sender(Some(sender));
        if let Err(err) = ensure_listener() {
            dispatch.set_sender(None);
            return Err(err);
        }
        dispatch.enabled.store(true, Ordering::Release);
        self.installed = true;
        Ok(())
    }

    fn uninstall(&mut self) -> anyhow::Result<()> {
        if !self.installed {
            return Ok(());
        }
        let dispatch = capture_dispatch();
        dispatch.enabled.store(false, Ordering::Release);
        dispatch.set_sender(None);
        self.installed = false;
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.installed
    }
}

/// In-process capture backend for tests. The paired [`MockCaptureHandle`]
/// injects events as if the OS delivered them.
#[derive(Clone)]
pub struct MockCaptureBackend {
    state: Arc<MockCaptureState>,
}

#[derive(Default)]
struct MockCaptureState {
    install_count: AtomicUsize,
    uninstall_count: AtomicUsize,
    sender: Mutex<Option<Sender<CaptureEvent>>>,
}

impl MockCaptureBackend {
    pub fn new() -> (Self, MockCaptureHandle) {
        let state = Arc::new(MockCaptureState::default());
        (
            Self {
                state: Arc::clone(&state),
            },
            MockCaptureHandle { state },
        )
    }
}

impl CaptureBackend for MockCaptureBackend {
    fn install(&mut self, sender: Sender<CaptureEvent>) -> anyhow::Result<()> {
        let mut guard = self.state.sender.lock().map_err(|_| anyhow!("lock"))?;
        if guard.is_some() {
            return Err(anyhow!("input capture already installed"));
        }
        self.state.install_count.fetch_add(1, Ordering::SeqCst);
        *guard = Some(sender);
        Ok(())
    }

    fn uninstall(&mut self) -> anyhow::Result<()> {
        let mut guard = self.state.sender.lock().map_err(|_| anyhow!("lock"))?;
        if guard.is_some() {
            self.state.uninstall_count.fetch_add(1, Ordering::SeqCst);
        }
        *guard = None;
        Ok(())
    }

    fn is_installed(&self) -> bool {
        match self.state.sender.lock() {
            Ok(guard) => guard.is_some(),
            Err(_) => false,
        }
    }
}

pub struct MockCaptureHandle {
    state: Arc<MockCaptureState>,
}

impl MockCaptureHandle {
    pub fn install_count(&self) -> usize {
        self.state.install_count.load(Ordering::SeqCst)
    }

    pub fn uninstall_count(&self) -> usize {
        self.state.uninstall_count.load(Ordering::SeqCst)
    }

    pub fn emit(&self, event: CaptureEvent) -> bool {
        match self.state.sender.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|sender| sender.send(event).is_ok())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Inject a full hotkey press/release.
    pub fn tap_key(&self, action: HotkeyAction) -> bool {
        self.emit(CaptureEvent::Key {
            action,
            pressed: true,
        }) && self.emit(CaptureEvent::Key {
            action,
            pressed: false,
        })
    }

    /// Inject a full button press/release at `position`.
    pub fn click(&self, button: ClickButton, position: (f64, f64)) -> bool {
        self.emit(CaptureEvent::Mouse {
            button,
            position,
            pressed: true,
        }) && self.emit(CaptureEvent::Mouse {
            button,
            position,
            pressed: false,
        })
    }
}
