use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Mouse button captured in a [`ClickRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickButton {
    Left,
    Right,
    Middle,
}

impl std::fmt::Display for ClickButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClickButton::Left => write!(f, "Left"),
            ClickButton::Right => write!(f, "Right"),
            ClickButton::Middle => write!(f, "Middle"),
        }
    }
}

/// One recorded mouse press.
///
/// `delay_ms` is the time the cursor animates toward `position` before the
/// click fires. It is stamped from the configured delay at record time, so
/// changing the configured delay afterwards never touches existing records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickRecord {
    pub button: ClickButton,
    /// Desktop (virtual-screen) coordinates, not window-relative.
    pub position: (f64, f64),
    #[serde(default)]
    pub delay_ms: u64,
}

/// Partial update applied to an existing record. Fields left `None` keep
/// their current value.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordPatch {
    pub position: Option<(f64, f64)>,
    pub delay_ms: Option<u64>,
}

/// Ordered list of recorded clicks. Insertion order is replay order.
///
/// The engine appends while recording; the shell clears, deletes and edits;
/// the player never reads this directly — it takes a [`snapshot`] at the
/// start of each pass so concurrent edits cannot corrupt a replay.
///
/// [`snapshot`]: ClickSequence::snapshot
#[derive(Debug, Default, Clone)]
pub struct ClickSequence {
    records: Vec<ClickRecord>,
}

impl ClickSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ClickRecord) {
        self.records.push(record);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Remove the record at `index`, returning it, or `None` when the index
    /// is past the end.
    pub fn remove(&mut self, index: usize) -> Option<ClickRecord> {
        if index < self.records.len() {
            Some(self.records.remove(index))
        } else {
            None
        }
    }

    /// Apply `patch` to the record at `index`. Returns the updated record,
    /// or `None` when the index is past the end.
    pub fn edit(&mut self, index: usize, patch: RecordPatch) -> Option<ClickRecord> {
        let record = self.records.get_mut(index)?;
        if let Some(position) = patch.position {
            record.position = position;
        }
        if let Some(delay_ms) = patch.delay_ms {
            record.delay_ms = delay_ms;
        }
        Some(*record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ClickRecord] {
        &self.records
    }

    /// Owned copy for a playback pass or a shell notification.
    pub fn snapshot(&self) -> Vec<ClickRecord> {
        self.records.clone()
    }
}

/// Handle shared between the engine control loop, the player and the shell.
pub type SharedClickSequence = Arc<Mutex<ClickSequence>>;

pub fn shared_sequence() -> SharedClickSequence {
    Arc::new(Mutex::new(ClickSequence::new()))
}
