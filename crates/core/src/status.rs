//! Queue entry status constants and state machine.
//!
//! IDs match the `notification_statuses` seed data. The lifecycle is
//! pending -> sent | failed; both targets are terminal.

// ---------------------------------------------------------------------------
// Status IDs
// ---------------------------------------------------------------------------

pub const STATUS_PENDING: i16 = 1;
pub const STATUS_SENT: i16 = 2;
pub const STATUS_FAILED: i16 = 3;

/// Note stored on entries that were closed because the owner turned
/// delivery off after they were scheduled.
pub const NOTE_DELIVERY_DISABLED: &str = "delivery disabled by user preferences";

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Duplicated from the `db` crate's `NotificationStatus` enum because `core`
/// has no internal deps.
pub mod state_machine {
    use super::{STATUS_FAILED, STATUS_PENDING, STATUS_SENT};

    /// Status IDs reachable from `from_status`.
    pub fn valid_transitions(from_status: i16) -> &'static [i16] {
        match from_status {
            STATUS_PENDING => &[STATUS_SENT, STATUS_FAILED],
            // Sent and Failed are terminal.
            _ => &[],
        }
    }

    pub fn can_transition(from: i16, to: i16) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning an error message for invalid ones.
    pub fn validate_transition(from: i16, to: i16) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!(
                "Invalid transition: {} ({from}) -> {} ({to})",
                status_name(from),
                status_name(to)
            ))
        }
    }

    /// Human-readable name for a status ID.
    pub fn status_name(id: i16) -> &'static str {
        match id {
            STATUS_PENDING => "Pending",
            STATUS_SENT => "Sent",
            STATUS_FAILED => "Failed",
            _ => "Unknown",
        }
    }
}
