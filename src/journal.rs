//! C3 — the error journal.
//!
//! An append-only ring of timestamped diagnostic codes. Faults in this crate
//! are values (`SPEC_FULL.md` §7): a latched flag in the owning component
//! plus, for anything observable, an entry here. The journal never causes
//! control flow by itself; it is the field-facing record a host reads out
//! for diagnostics.

/// Diagnostic codes observable in the journal (§6).
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    HvContactorTimeoutClosing = 0,
    HvContactorTimeoutStopConsumers = 1,
    HvContactorTimeoutOpening = 2,
    ReadyNotSetOnIgnition = 3,
    ReadyDroppedDuringDiagnose = 4,
    ReadyStuckOnIgnitionOff = 5,
    VacuumInsufficient = 6,
    BmsTimeout = 7,
    BmsFault = 8,
    BmsContactorFault = 9,
    EpsStartupDcdcFault = 10,
}

impl ErrorCode {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::HvContactorTimeoutClosing),
            1 => Some(Self::HvContactorTimeoutStopConsumers),
            2 => Some(Self::HvContactorTimeoutOpening),
            3 => Some(Self::ReadyNotSetOnIgnition),
            4 => Some(Self::ReadyDroppedDuringDiagnose),
            5 => Some(Self::ReadyStuckOnIgnitionOff),
            6 => Some(Self::VacuumInsufficient),
            7 => Some(Self::BmsTimeout),
            8 => Some(Self::BmsFault),
            9 => Some(Self::BmsContactorFault),
            10 => Some(Self::EpsStartupDcdcFault),
            _ => None,
        }
    }
}

/// One journal entry: a code plus the scheduler tick (1 ms units) it was
/// posted at.
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub code: ErrorCode,
    pub tick_ms: u32,
}

/// Capacity of the in-memory ring. Oldest entries are overwritten once full;
/// the journal is a rolling diagnostic window, not an audit log.
pub const JOURNAL_CAPACITY: usize = 32;

/// Append-only ring buffer of [`Entry`] values.
pub struct Journal {
    entries: heapless::Deque<Entry, JOURNAL_CAPACITY>,
}

impl Journal {
    pub const fn new() -> Self {
        Journal {
            entries: heapless::Deque::new(),
        }
    }

    /// Appends an entry, evicting the oldest one if the ring is full.
    pub fn post(&mut self, code: ErrorCode, tick_ms: u32) {
        if self.entries.is_full() {
            self.entries.pop_front();
        }
        // capacity was just ensured above, so this cannot fail
        let _ = self.entries.push_back(Entry { code, tick_ms });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// True if `code` appears anywhere in the current ring.
    pub fn contains(&self, code: ErrorCode) -> bool {
        self.entries.iter().any(|e| e.code == code)
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_roundtrip() {
        for raw in 0..=10u8 {
            assert_eq!(ErrorCode::from_u8(raw).unwrap() as u8, raw);
        }
        assert!(ErrorCode::from_u8(11).is_none());
    }

    #[test]
    fn post_and_query() {
        let mut j = Journal::new();
        assert!(j.is_empty());
        j.post(ErrorCode::VacuumInsufficient, 100);
        j.post(ErrorCode::BmsTimeout, 200);
        assert_eq!(j.len(), 2);
        assert!(j.contains(ErrorCode::VacuumInsufficient));
        assert!(!j.contains(ErrorCode::BmsFault));
    }

    #[test]
    fn ring_evicts_oldest_when_full() {
        let mut j = Journal::new();
        for i in 0..JOURNAL_CAPACITY {
            j.post(ErrorCode::BmsTimeout, i as u32);
        }
        assert_eq!(j.len(), JOURNAL_CAPACITY);
        j.post(ErrorCode::VacuumInsufficient, 9999);
        assert_eq!(j.len(), JOURNAL_CAPACITY);
        // the very first entry (tick 0) should have been evicted
        assert!(j.iter().all(|e| e.tick_ms != 0));
        assert_eq!(j.iter().last().unwrap().tick_ms, 9999);
    }
}
