/*
Error taxonomy for the engine.

Overlaps are not errors: a Calculation that hits the overlap criterion hands
back an infeasible evaluation and Acceptance rejects it.
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Host or device storage could not be grown. Fatal for the run.
    #[error("failed to allocate {requested} elements for {what}")]
    Allocation { what: &'static str, requested: usize },

    /// A symbolic accessor was given a name outside its fixed set.
    #[error("unknown field name '{0}'")]
    UnknownFieldName(String),

    /// Host and device capacities disagree outside the synchronization path.
    #[error(
        "host/device capacity mismatch in box {box_index}, component {component}: host {host}, device {device}"
    )]
    InconsistentCapacity {
        box_index: usize,
        component: usize,
        host: usize,
        device: usize,
    },

    /// Prepare/Calculation/Acceptance called out of order.
    #[error("move sequencing violation in box {box_index}: {detail}")]
    SequencingViolation { box_index: usize, detail: String },

    /// A device kernel failed; carries the full move context.
    #[error(
        "device kernel '{kernel}' failed in box {box_index} during {move_type} (cycle {cycle}): {detail}"
    )]
    Device {
        kernel: &'static str,
        box_index: usize,
        move_type: String,
        cycle: usize,
        detail: String,
    },

    #[error("{what} index {index} out of range (len {len})")]
    InvalidIndex {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("invalid move on component {component}, molecule {molecule}: {detail}")]
    InvalidMove {
        component: usize,
        molecule: usize,
        detail: String,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Conditions after which the run cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Allocation { .. } | Error::Device { .. } | Error::SequencingViolation { .. }
        )
    }

    pub fn invalid_index(what: &'static str, index: usize, len: usize) -> Self {
        Error::InvalidIndex { what, index, len }
    }

    pub fn sequencing(box_index: usize, detail: impl Into<String>) -> Self {
        Error::SequencingViolation {
            box_index,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
