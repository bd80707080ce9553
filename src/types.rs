use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Requested appointment: a date and a start time of fixed length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl Slot {
    pub const DURATION_MINUTES: i64 = 60;

    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self { date, time }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn end(&self) -> NaiveDateTime {
        self.start() + Duration::minutes(Self::DURATION_MINUTES)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date.format("%Y-%m-%d"), self.time.format("%H:%M"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rescheduled,
    Completed,
    Canceled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rescheduled => "rescheduled",
            BookingStatus::Completed => "completed",
            BookingStatus::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "rescheduled" => Some(BookingStatus::Rescheduled),
            "completed" => Some(BookingStatus::Completed),
            "canceled" => Some(BookingStatus::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestIdentity {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: Option<NaiveDate>,
}

/// Who asked for the test drive. Registered users are referenced by id, guests
/// carry their contact details on the booking itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Requester {
    Registered { user_id: Uuid },
    Guest(GuestIdentity),
}

impl Requester {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Requester::Registered { user_id } => Some(*user_id),
            Requester::Guest(_) => None,
        }
    }

    /// Whether both requesters are the same party for conflict purposes.
    pub fn same_party(&self, other: &Requester) -> bool {
        match (self, other) {
            (Requester::Registered { user_id: a }, Requester::Registered { user_id: b }) => a == b,
            (Requester::Guest(a), Requester::Guest(b)) => a.name == b.name && a.email == b.email,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub requester: Requester,
    pub slot: Slot,
    pub status: BookingStatus,
    pub staff_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Canceled
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub vehicle_id: Uuid,
    pub requester: Requester,
    pub slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RequestAck,
    StaffAlert,
    Confirmed,
    Rescheduled,
    Canceled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::RequestAck => "request_ack",
            NotificationKind::StaffAlert => "staff_alert",
            NotificationKind::Confirmed => "confirmed",
            NotificationKind::Rescheduled => "rescheduled",
            NotificationKind::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "request_ack" => Some(NotificationKind::RequestAck),
            "staff_alert" => Some(NotificationKind::StaffAlert),
            "confirmed" => Some(NotificationKind::Confirmed),
            "rescheduled" => Some(NotificationKind::Rescheduled),
            "canceled" => Some(NotificationKind::Canceled),
            _ => None,
        }
    }

    pub fn subject(&self, vehicle: &str) -> String {
        let prefix = match self {
            NotificationKind::RequestAck => "Test Drive Booking Confirmation",
            NotificationKind::StaffAlert => "New Test Drive Booking",
            NotificationKind::Confirmed => "Test Drive Confirmed",
            NotificationKind::Rescheduled => "Test Drive Rescheduled",
            NotificationKind::Canceled => "Test Drive Canceled",
        };
        format!("{prefix} - {vehicle}")
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit row for one send attempt. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub kind: NotificationKind,
    pub recipient: String,
    pub subject: String,
    pub success: bool,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotificationRecord {
    pub booking_id: Uuid,
    pub kind: NotificationKind,
    pub recipient: String,
    pub subject: String,
    pub success: bool,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub year: i32,
    pub make: String,
    pub model: String,
    pub is_active: bool,
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.year, self.make, self.model)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
}

impl RegisteredUser {
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDefaults {
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

/// The acting party of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Registered(RegisteredUser),
    Anonymous,
}
