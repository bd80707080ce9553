use crate::backend::BookingBackend;
use crate::error::{BookingError, ConflictRule, DetectedAt};
use crate::types::{Booking, GuestIdentity, Principal, ProfileDefaults, Requester, Slot};
use chrono::{NaiveDate, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

pub const MINIMUM_DRIVER_AGE: u32 = 25;

lazy_static! {
    static ref PHONE_REGEX: Regex = Regex::new(r"^[0-9+()\- ]*$").unwrap();
}

/// A test-drive request as submitted by the booking form.
///
/// Guest fields are ignored for registered users, whose contact details come
/// from their account.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BookingRequest {
    pub vehicle_id: Uuid,
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub guest_name: Option<String>,
    #[validate(email(message = "Enter a valid email address"))]
    pub guest_email: Option<String>,
    #[validate(
        length(max = 20, message = "Phone number must be at most 20 characters"),
        regex(path = *PHONE_REGEX, message = "Phone number may only contain digits, spaces and + - ( )")
    )]
    pub guest_phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub requested_date: Option<NaiveDate>,
    pub requested_time: Option<NaiveTime>,
}

/// A request that passed field validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRequest {
    pub requester: Requester,
    pub slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleAvailability {
    Available,
    Inactive,
    Missing,
}

fn field_error(errors: &mut ValidationErrors, field: &'static str, code: &'static str, message: &'static str) {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    errors.add(field, error);
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn slot_fields(
    errors: &mut ValidationErrors,
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
) -> Option<Slot> {
    if date.is_none() {
        field_error(errors, "requested_date", "required", "Choose a date");
    }
    if time.is_none() {
        field_error(errors, "requested_time", "required", "Choose a time");
    }
    Some(Slot::new(date?, time?))
}

/// Slot of a reschedule request, with each missing field reported.
pub fn required_slot(
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
) -> Result<Slot, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    match slot_fields(&mut errors, date, time) {
        Some(slot) if errors.is_empty() => Ok(slot),
        _ => Err(errors),
    }
}

/// Full years between `date_of_birth` and `today`; `None` for a birth date in
/// the future.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    today.years_since(date_of_birth)
}

/// Field-level checks of a booking request. On success returns the requester
/// the booking will be filed under and the requested slot.
pub fn validate_request(
    request: &BookingRequest,
    principal: &Principal,
    defaults: &ProfileDefaults,
    vehicle: VehicleAvailability,
    today: NaiveDate,
) -> Result<ValidRequest, ValidationErrors> {
    let mut errors = match principal {
        Principal::Anonymous => request.validate().err().unwrap_or_else(ValidationErrors::new),
        Principal::Registered(_) => ValidationErrors::new(),
    };

    match vehicle {
        VehicleAvailability::Available => {}
        VehicleAvailability::Inactive => field_error(
            &mut errors,
            "vehicle_id",
            "unavailable",
            "This vehicle is no longer available for test drives",
        ),
        VehicleAvailability::Missing => {
            field_error(&mut errors, "vehicle_id", "not_found", "Select a valid vehicle")
        }
    }

    let slot = slot_fields(&mut errors, request.requested_date, request.requested_time);

    if let Principal::Anonymous = principal {
        if non_blank(&request.guest_name).is_none() {
            field_error(&mut errors, "guest_name", "required", "Enter your name");
        }
        if non_blank(&request.guest_email).is_none() {
            field_error(&mut errors, "guest_email", "required", "Enter your email address");
        }
    }

    let date_of_birth = match principal {
        Principal::Registered(_) => request.date_of_birth.or(defaults.date_of_birth),
        Principal::Anonymous => request.date_of_birth,
    };
    match date_of_birth.map(|dob| age_on(dob, today)) {
        None => field_error(&mut errors, "date_of_birth", "required", "Enter your date of birth"),
        Some(age) if age.unwrap_or(0) < MINIMUM_DRIVER_AGE => field_error(
            &mut errors,
            "date_of_birth",
            "minimum_age",
            "You must be at least 25 years old to book a test drive",
        ),
        Some(_) => {}
    }

    let slot = match slot {
        Some(slot) if errors.is_empty() => slot,
        _ => return Err(errors),
    };

    let requester = match principal {
        Principal::Registered(user) => Requester::Registered { user_id: user.id },
        Principal::Anonymous => Requester::Guest(GuestIdentity {
            name: non_blank(&request.guest_name).unwrap_or_default().to_string(),
            email: non_blank(&request.guest_email).unwrap_or_default().to_string(),
            phone: non_blank(&request.guest_phone).unwrap_or_default().to_string(),
            date_of_birth,
        }),
    };
    Ok(ValidRequest { requester, slot })
}

/// First uniqueness rule a candidate would break against `existing`, which
/// must already be limited to active bookings in the candidate's slot.
/// Requester clashes are reported before vehicle clashes.
pub fn find_conflict(
    requester: &Requester,
    vehicle_id: Uuid,
    existing: &[Booking],
) -> Option<ConflictRule> {
    if existing.iter().any(|booking| booking.requester.same_party(requester)) {
        return Some(ConflictRule::Requester);
    }
    if existing.iter().any(|booking| booking.vehicle_id == vehicle_id) {
        return Some(ConflictRule::Vehicle);
    }
    None
}

/// Advisory conflict check run before a write. The storage constraint stays
/// authoritative.
pub fn check_slot<B: BookingBackend>(
    backend: &B,
    requester: &Requester,
    vehicle_id: Uuid,
    slot: Slot,
    exclude: Option<Uuid>,
) -> Result<(), BookingError> {
    let existing = backend.active_bookings_at(slot, exclude)?;
    match find_conflict(requester, vehicle_id, &existing) {
        Some(rule) => Err(BookingError::conflict(rule, DetectedAt::PreCheck)),
        None => Ok(()),
    }
}
