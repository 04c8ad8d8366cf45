//! Fallible boundary of the crate.
//!
//! Everything the specification models as a latched flag or journal entry
//! (`SPEC_FULL.md` §7) stays a plain value and is never represented here.
//! `CoreError` exists only for conditions that are not part of the state
//! machines at all: malformed wire input and parameter-store misuse by a
//! caller.

#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// A caller-supplied CAN frame buffer did not have the expected 8-byte
    /// length.
    InvalidFrameLength { got: usize },
    /// A raw parameter key (e.g. decoded from a persisted overrides blob)
    /// does not map to any [`crate::param::ParamId`].
    UnknownParamId { raw: u16 },
}

pub type CoreResult<T> = Result<T, CoreError>;
