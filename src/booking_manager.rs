use crate::backend::BookingBackend;
use crate::catalog::VehicleCatalog;
use crate::directory::Directory;
use crate::error::BookingError;
use crate::notification::{DispatchMode, NotificationContext, NotificationDispatcher, NotificationGateway};
use crate::status::transition_notification;
use crate::types::{
    Booking, BookingStatus, NewBooking, NotificationKind, NotificationRecord, Principal,
    ProfileDefaults, Requester, Slot,
};
use crate::validation::{
    check_slot, validate_request, BookingRequest, ValidRequest, VehicleAvailability,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Created {
    pub booking: Booking,
    pub requester_notified: bool,
    pub staff_notified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub booking: Booking,
    /// Set when either the status or the slot moved.
    pub changed: bool,
    /// `None` when the change owed no notification.
    pub notified: Option<bool>,
}

#[derive(Debug)]
pub struct TransitionResult {
    pub booking_id: Uuid,
    pub outcome: Result<TransitionOutcome, BookingError>,
}

/// Aggregate of a bulk transition, shown to operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransitionSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub email_failed: usize,
}

impl TransitionSummary {
    pub fn from_results(results: &[TransitionResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match &result.outcome {
                Ok(outcome) if outcome.changed => {
                    summary.updated += 1;
                    if outcome.notified == Some(false) {
                        summary.email_failed += 1;
                    }
                }
                Ok(_) => summary.unchanged += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }
}

impl fmt::Display for TransitionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Updated {}, email failed for {}", self.updated, self.email_failed)?;
        if self.failed > 0 {
            write!(f, ", {} could not be changed", self.failed)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resent {
    pub kind: Option<NotificationKind>,
    pub delivered: bool,
}

/// Booking workflow: request intake, owner changes and staff status changes,
/// each followed by whatever notification the change calls for.
#[derive(Clone)]
pub struct BookingManager<B: BookingBackend> {
    backend: B,
    catalog: Arc<dyn VehicleCatalog>,
    directory: Arc<dyn Directory>,
    dispatcher: NotificationDispatcher<B>,
}

impl<B: BookingBackend> BookingManager<B> {
    pub fn new(
        backend: B,
        catalog: Arc<dyn VehicleCatalog>,
        directory: Arc<dyn Directory>,
        gateway: Arc<dyn NotificationGateway>,
        staff_email: String,
    ) -> Self {
        let dispatcher = NotificationDispatcher::new(backend.clone(), gateway, staff_email);
        Self {
            backend,
            catalog,
            directory,
            dispatcher,
        }
    }

    pub fn catalog(&self) -> &dyn VehicleCatalog {
        self.catalog.as_ref()
    }

    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    pub fn bookings(&self) -> Result<Vec<Booking>, BookingError> {
        Ok(self.backend.bookings()?)
    }

    pub fn bookings_for(&self, principal: &Principal) -> Result<Vec<Booking>, BookingError> {
        match principal {
            Principal::Registered(user) => Ok(self.backend.bookings_for_user(user.id)?),
            Principal::Anonymous => Err(BookingError::Forbidden),
        }
    }

    pub fn notifications(&self, booking_id: Uuid) -> Result<Vec<NotificationRecord>, BookingError> {
        self.existing(booking_id)?;
        Ok(self.backend.notifications(booking_id)?)
    }

    fn existing(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.backend
            .booking(booking_id)?
            .ok_or(BookingError::NotFound(booking_id))
    }

    fn owned(&self, principal: &Principal, booking_id: Uuid) -> Result<Booking, BookingError> {
        let booking = self.existing(booking_id)?;
        match principal {
            Principal::Registered(user) if booking.requester.user_id() == Some(user.id) => {
                Ok(booking)
            }
            _ => Err(BookingError::Forbidden),
        }
    }

    fn context(&self, booking: &Booking) -> NotificationContext {
        let vehicle = self
            .catalog
            .find_vehicle(booking.vehicle_id)
            .map(|vehicle| vehicle.to_string())
            .unwrap_or_default();

        let (requester_name, requester_email, requester_phone) = match &booking.requester {
            Requester::Guest(guest) => (guest.name.clone(), guest.email.clone(), guest.phone.clone()),
            Requester::Registered { user_id } => match self.directory.find_user(*user_id) {
                Some(user) => (
                    user.display_name().to_string(),
                    user.email.clone(),
                    self.directory.profile_defaults(user.id).phone.unwrap_or_default(),
                ),
                None => {
                    warn!(booking_id = %booking.id, %user_id, "Booking refers to an unknown user");
                    Default::default()
                }
            },
        };

        NotificationContext {
            booking_id: booking.id,
            requester_name,
            requester_email,
            requester_phone,
            vehicle,
            slot: booking.slot,
            staff_notes: booking.staff_notes.clone(),
        }
    }

    /// Validates and stores a new pending booking, then acknowledges it to the
    /// requester and alerts staff. Notification failures never undo the booking.
    pub fn create_booking(
        &self,
        principal: &Principal,
        request: BookingRequest,
        today: NaiveDate,
    ) -> Result<Created, BookingError> {
        let availability = match self.catalog.find_vehicle(request.vehicle_id) {
            Some(vehicle) if self.catalog.is_active(&vehicle) => VehicleAvailability::Available,
            Some(_) => VehicleAvailability::Inactive,
            None => VehicleAvailability::Missing,
        };
        let defaults = match principal {
            Principal::Registered(user) => self.directory.profile_defaults(user.id),
            Principal::Anonymous => ProfileDefaults::default(),
        };
        let ValidRequest { requester, slot } =
            validate_request(&request, principal, &defaults, availability, today)
                .map_err(BookingError::Validation)?;

        check_slot(&self.backend, &requester, request.vehicle_id, slot, None)?;

        let booking = self.backend.insert_booking(NewBooking {
            vehicle_id: request.vehicle_id,
            requester,
            slot,
        })?;
        info!(booking_id = %booking.id, vehicle_id = %booking.vehicle_id, %slot, "Booking requested");

        let context = self.context(&booking);
        let requester_notified = self
            .dispatcher
            .dispatch(NotificationKind::RequestAck, &context, DispatchMode::BestEffort)
            .unwrap_or(false);
        let staff_notified = self
            .dispatcher
            .dispatch(NotificationKind::StaffAlert, &context, DispatchMode::BestEffort)
            .unwrap_or(false);

        Ok(Created {
            booking,
            requester_notified,
            staff_notified,
        })
    }

    /// The change is already stored, so delivery is always best effort here.
    fn notify_transition(&self, booking: &Booking, previous: BookingStatus) -> Option<bool> {
        let kind = transition_notification(previous, booking.status)?;
        Some(
            self.dispatcher
                .dispatch(kind, &self.context(booking), DispatchMode::BestEffort)
                .unwrap_or(false),
        )
    }

    fn store_transition(
        &self,
        mut booking: Booking,
        status: BookingStatus,
        slot: Option<Slot>,
    ) -> Result<TransitionOutcome, BookingError> {
        let previous = (booking.status, booking.slot);
        booking.status = status;
        if let Some(slot) = slot {
            booking.slot = slot;
        }
        let booking = self.backend.update_booking(&booking)?;
        info!(booking_id = %booking.id, from = %previous.0, to = %status, slot = %booking.slot, "Booking status changed");

        let notified = self.notify_transition(&booking, previous.0);
        Ok(TransitionOutcome {
            changed: previous != (booking.status, booking.slot),
            booking,
            notified,
        })
    }

    /// Owner cancellation. Frees the slot for new requests.
    pub fn cancel(&self, principal: &Principal, booking_id: Uuid) -> Result<TransitionOutcome, BookingError> {
        let booking = self.owned(principal, booking_id)?;
        if !booking.status.can_cancel() {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Canceled,
            });
        }
        self.store_transition(booking, BookingStatus::Canceled, None)
    }

    /// Owner reschedule: moves the booking to a new slot and marks it
    /// rescheduled. The new slot is checked like a fresh request, ignoring the
    /// booking itself.
    pub fn reschedule(
        &self,
        principal: &Principal,
        booking_id: Uuid,
        slot: Slot,
    ) -> Result<TransitionOutcome, BookingError> {
        let booking = self.owned(principal, booking_id)?;
        if !booking.status.can_reschedule() {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Rescheduled,
            });
        }
        check_slot(
            &self.backend,
            &booking.requester,
            booking.vehicle_id,
            slot,
            Some(booking.id),
        )?;
        self.store_transition(booking, BookingStatus::Rescheduled, Some(slot))
    }

    /// Staff status change. Setting the current status again is a no-op and
    /// sends nothing. A failed notification shows up as `notified: Some(false)`.
    pub fn set_status(
        &self,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> Result<TransitionOutcome, BookingError> {
        let booking = self.existing(booking_id)?;
        if !booking.status.can_transition_to(status) {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: status,
            });
        }
        if booking.status == status {
            return Ok(TransitionOutcome {
                booking,
                changed: false,
                notified: None,
            });
        }
        self.store_transition(booking, status, None)
    }

    /// Bulk staff action. Each booking is handled on its own; one failure
    /// does not stop the rest.
    pub fn transition(&self, booking_ids: &[Uuid], status: BookingStatus) -> Vec<TransitionResult> {
        booking_ids
            .iter()
            .map(|&booking_id| TransitionResult {
                booking_id,
                outcome: self.set_status(booking_id, status),
            })
            .collect()
    }

    pub fn annotate(&self, booking_id: Uuid, staff_notes: String) -> Result<Booking, BookingError> {
        let mut booking = self.existing(booking_id)?;
        booking.staff_notes = staff_notes;
        Ok(self.backend.update_booking(&booking)?)
    }

    /// Sends the notification that matches the booking's current status
    /// again. Meant for diagnosing delivery problems, hence usually strict.
    pub fn resend_notification(&self, booking_id: Uuid, mode: DispatchMode) -> Result<Resent, BookingError> {
        let booking = self.existing(booking_id)?;
        let kind = match booking.status {
            BookingStatus::Pending => Some(NotificationKind::RequestAck),
            BookingStatus::Confirmed => Some(NotificationKind::Confirmed),
            BookingStatus::Rescheduled => Some(NotificationKind::Rescheduled),
            BookingStatus::Canceled => Some(NotificationKind::Canceled),
            BookingStatus::Completed => None,
        };
        let Some(kind) = kind else {
            return Ok(Resent {
                kind: None,
                delivered: false,
            });
        };
        let delivered = self.dispatcher.dispatch(kind, &self.context(&booking), mode)?;
        Ok(Resent {
            kind: Some(kind),
            delivered,
        })
    }
}
