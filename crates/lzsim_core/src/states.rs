//! Classification of raw interlocking state codes.
//!
//! Every raw code falls into exactly one class. Codes outside the known
//! free/occupied (or plus/minus) tables classify as no-control, so unknown
//! input can never confirm a fault.

use crate::RawState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occupancy {
    Free,
    Occupied,
    NoControl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPosition {
    Plus,
    Minus,
    NoControl,
}

pub fn rc_occupancy(code: RawState) -> Occupancy {
    match code {
        3..=5 => Occupancy::Free,
        6..=8 => Occupancy::Occupied,
        _ => Occupancy::NoControl,
    }
}

pub fn rc_is_free(code: RawState) -> bool {
    rc_occupancy(code) == Occupancy::Free
}

pub fn rc_is_occupied(code: RawState) -> bool {
    rc_occupancy(code) == Occupancy::Occupied
}

/// Route-locking bit, orthogonal to occupancy.
pub fn rc_is_locked(code: RawState) -> bool {
    matches!(code, 4 | 5 | 7 | 8)
}

pub fn switch_position(code: RawState) -> SwitchPosition {
    match code {
        3..=8 => SwitchPosition::Plus,
        9..=14 => SwitchPosition::Minus,
        _ => SwitchPosition::NoControl,
    }
}

pub fn signal_is_open(code: RawState) -> bool {
    matches!(code, 3..=14 | 16 | 17 | 18 | 20 | 22 | 23 | 24)
}

pub fn signal_is_closed(code: RawState) -> bool {
    code == 15
}

pub fn shunting_signal_is_open(code: RawState) -> bool {
    matches!(code, 4 | 5)
}

pub fn shunting_signal_is_closed(code: RawState) -> bool {
    matches!(code, 3 | 7)
}
