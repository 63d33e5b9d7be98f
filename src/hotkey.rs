use rdev::Key;

/// Logical keys the engine reacts to. Every other key is ignored by the
/// capture layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    RecordToggle,
    PlayToggle,
    Cancel,
}

/// A single key plus required modifiers, e.g. `Ctrl+Shift+F5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotkey {
    pub key: Key,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Hotkey {
    pub fn bare(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            shift: false,
            alt: false,
        }
    }

    /// True when `key` completes this hotkey given the currently held
    /// modifiers. Modifiers the hotkey does not require may be held anyway,
    /// matching how the original tool treated its F-keys.
    pub fn matches(&self, key: Key, mods: ModifierState) -> bool {
        key == self.key
            && (!self.ctrl || mods.ctrl)
            && (!self.shift || mods.shift)
            && (!self.alt || mods.alt)
    }
}

/// Modifier keys currently held, tracked by the capture listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl ModifierState {
    /// Update from a raw key transition. Returns true when the key was a
    /// modifier (and therefore not a candidate for hotkey matching).
    pub fn apply(&mut self, key: Key, pressed: bool) -> bool {
        match key {
            Key::ControlLeft | Key::ControlRight => {
                self.ctrl = pressed;
                true
            }
            Key::ShiftLeft | Key::ShiftRight => {
                self.shift = pressed;
                true
            }
            Key::Alt | Key::AltGr => {
                self.alt = pressed;
                true
            }
            _ => false,
        }
    }
}

/// The three hotkeys the engine listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBindings {
    pub record: Hotkey,
    pub play: Hotkey,
    pub cancel: Hotkey,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self {
            record: Hotkey::bare(Key::F1),
            play: Hotkey::bare(Key::F2),
            cancel: Hotkey::bare(Key::Escape),
        }
    }
}

impl HotkeyBindings {
    /// Map a raw key press to the logical action it triggers, if any.
    /// Checked in cancel, record, play order so cancel wins if the user
    /// binds overlapping combinations.
    pub fn action_for(&self, key: Key, mods: ModifierState) -> Option<HotkeyAction> {
        if self.cancel.matches(key, mods) {
            Some(HotkeyAction::Cancel)
        } else if self.record.matches(key, mods) {
            Some(HotkeyAction::RecordToggle)
        } else if self.play.matches(key, mods) {
            Some(HotkeyAction::PlayToggle)
        } else {
            None
        }
    }
}

/// Parse a hotkey string like "Ctrl+Shift+Space" into a [`Hotkey`].
pub fn parse_hotkey(s: &str) -> Option<Hotkey> {
    let mut ctrl = false;
    let mut shift = false;
    let mut alt = false;
    let mut key: Option<Key> = None;

    for part in s.split('+') {
        let upper = part.trim().to_ascii_uppercase();
        match upper.as_str() {
            "CTRL" | "CONTROL" => ctrl = true,
            "SHIFT" => shift = true,
            "ALT" => alt = true,
            "" => {}
            _ => {
                if let Some(k) = parse_key(&upper) {
                    key = Some(k);
                } else {
                    return None;
                }
            }
        }
    }

    key.map(|k| Hotkey {
        key: k,
        ctrl,
        shift,
        alt,
    })
}

const LETTER_KEYS: [Key; 26] = [
    Key::KeyA,
    Key::KeyB,
    Key::KeyC,
    Key::KeyD,
    Key::KeyE,
    Key::KeyF,
    Key::KeyG,
    Key::KeyH,
    Key::KeyI,
    Key::KeyJ,
    Key::KeyK,
    Key::KeyL,
    Key::KeyM,
    Key::KeyN,
    Key::KeyO,
    Key::KeyP,
    Key::KeyQ,
    Key::KeyR,
    Key::KeyS,
    Key::KeyT,
    Key::KeyU,
    Key::KeyV,
    Key::KeyW,
    Key::KeyX,
    Key::KeyY,
    Key::KeyZ,
];

const DIGIT_KEYS: [Key; 10] = [
    Key::Num0,
    Key::Num1,
    Key::Num2,
    Key::Num3,
    Key::Num4,
    Key::Num5,
    Key::Num6,
    Key::Num7,
    Key::Num8,
    Key::Num9,
];

const F_KEYS: [Key; 12] = [
    Key::F1,
    Key::F2,
    Key::F3,
    Key::F4,
    Key::F5,
    Key::F6,
    Key::F7,
    Key::F8,
    Key::F9,
    Key::F10,
    Key::F11,
    Key::F12,
];

fn parse_key(upper: &str) -> Option<Key> {
    match upper {
        "SPACE" => Some(Key::Space),
        "TAB" => Some(Key::Tab),
        "ENTER" | "RETURN" => Some(Key::Return),
        "ESC" | "ESCAPE" => Some(Key::Escape),
        "DELETE" => Some(Key::Delete),
        "BACKSPACE" => Some(Key::Backspace),
        "CAPSLOCK" => Some(Key::CapsLock),
        "HOME" => Some(Key::Home),
        "END" => Some(Key::End),
        "PAGEUP" => Some(Key::PageUp),
        "PAGEDOWN" => Some(Key::PageDown),
        "LEFT" | "LEFTARROW" => Some(Key::LeftArrow),
        "RIGHT" | "RIGHTARROW" => Some(Key::RightArrow),
        "UP" | "UPARROW" => Some(Key::UpArrow),
        "DOWN" | "DOWNARROW" => Some(Key::DownArrow),
        _ if upper.len() > 1 && upper.starts_with('F') => upper[1..]
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=12).contains(n))
            .map(|n| F_KEYS[n - 1]),
        _ if upper.len() == 1 => {
            let c = upper.chars().next()?;
            if c.is_ascii_digit() {
                Some(DIGIT_KEYS[c as usize - '0' as usize])
            } else if c.is_ascii_uppercase() {
                Some(LETTER_KEYS[c as usize - 'A' as usize])
            } else {
                None
            }
        }
        _ => None,
    }
}
