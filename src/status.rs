//! Booking lifecycle.
//!
//! ```text
//! pending ──> confirmed ──┐
//!    │    └─> rescheduled ─┴─> completed
//!    └──────────(any non-terminal)──> canceled
//! ```
//!
//! `canceled` and `completed` are terminal.

use crate::types::{BookingStatus, NotificationKind};

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Canceled | BookingStatus::Completed)
    }

    /// Staff may move a booking between any two statuses as long as it has not
    /// reached a terminal one. Re-setting the current status is always allowed
    /// and changes nothing.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        *self == next || !self.is_terminal()
    }

    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_reschedule(&self) -> bool {
        !self.is_terminal()
    }
}

/// The requester-facing notification owed for a status change, if any.
pub fn transition_notification(
    previous: BookingStatus,
    next: BookingStatus,
) -> Option<NotificationKind> {
    if previous == next {
        return None;
    }
    match next {
        BookingStatus::Confirmed => Some(NotificationKind::Confirmed),
        BookingStatus::Rescheduled => Some(NotificationKind::Rescheduled),
        BookingStatus::Canceled => Some(NotificationKind::Canceled),
        BookingStatus::Pending | BookingStatus::Completed => None,
    }
}
