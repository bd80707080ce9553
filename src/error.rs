use crate::types::BookingStatus;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

/// Which uniqueness rule a conflicting booking violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictRule {
    /// The requester (registered user or guest identity) already holds the slot.
    Requester,
    /// The vehicle is already booked for the slot.
    Vehicle,
    Unknown,
}

impl ConflictRule {
    pub const USER_SLOT_CONSTRAINT: &'static str = "bookings_active_user_slot_key";
    pub const GUEST_SLOT_CONSTRAINT: &'static str = "bookings_active_guest_slot_key";
    pub const VEHICLE_SLOT_CONSTRAINT: &'static str = "bookings_active_vehicle_slot_key";

    pub fn from_constraint(name: Option<&str>) -> Self {
        match name {
            Some(Self::USER_SLOT_CONSTRAINT) | Some(Self::GUEST_SLOT_CONSTRAINT) => {
                ConflictRule::Requester
            }
            Some(Self::VEHICLE_SLOT_CONSTRAINT) => ConflictRule::Vehicle,
            _ => ConflictRule::Unknown,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ConflictRule::Requester => "You already have a booking at this date and time.",
            ConflictRule::Vehicle => "This vehicle is already booked at this date and time.",
            ConflictRule::Unknown => "This slot is unavailable, please choose another time.",
        }
    }
}

/// Whether a conflict was caught by the advisory pre-check or by the storage
/// constraint when the write was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedAt {
    PreCheck,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub rule: ConflictRule,
    pub detected_at: DetectedAt,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detected_at {
            DetectedAt::PreCheck => f.write_str(self.rule.reason()),
            DetectedAt::Commit => f.write_str("This slot was just taken, please choose another time."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Unique constraint violated ({0:?})")]
    UniqueViolation(ConflictRule),
    #[error("Booking {0} does not exist")]
    NotFound(Uuid),
    #[error("Database error: {0}")]
    Database(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("Template rendering failed: {0}")]
    Render(String),
    #[error("Email sending failed: {0}")]
    Transport(String),
    #[error("No recipient address known for this booking")]
    UnknownRecipient,
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Invalid booking request: {0}")]
    Validation(ValidationErrors),
    #[error("{0}")]
    Conflict(Conflict),
    #[error("A {from} booking can't be changed to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },
    #[error("Booking {0} does not exist")]
    NotFound(Uuid),
    #[error("This booking belongs to someone else")]
    Forbidden,
    #[error(transparent)]
    Storage(StorageError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
}

impl BookingError {
    pub fn conflict(rule: ConflictRule, detected_at: DetectedAt) -> Self {
        BookingError::Conflict(Conflict { rule, detected_at })
    }
}

impl From<StorageError> for BookingError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UniqueViolation(rule) => BookingError::conflict(rule, DetectedAt::Commit),
            StorageError::NotFound(id) => BookingError::NotFound(id),
            other => BookingError::Storage(other),
        }
    }
}
