use crate::backend::BookingBackend;
use crate::error::StorageError;
use crate::types::{Booking, BookingStatus, NewBooking, NewNotificationRecord, NotificationRecord, Slot};
use crate::validation::find_conflict;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    bookings: HashMap<Uuid, Booking>,
    notifications: Vec<NotificationRecord>,
}

/// Non-persistent backend. Every write holds the table lock across the
/// uniqueness check, which makes the check behave like a storage constraint.
#[derive(Debug, Clone, Default)]
pub struct LocalBookings {
    tables: Arc<Mutex<Tables>>,
}

impl LocalBookings {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Tables {
    fn active_at(&self, slot: Slot, exclude: Option<Uuid>) -> Vec<Booking> {
        self.bookings
            .values()
            .filter(|booking| booking.is_active() && booking.slot == slot)
            .filter(|booking| Some(booking.id) != exclude)
            .cloned()
            .collect()
    }

    fn enforce_unique(&self, candidate: &Booking) -> Result<(), StorageError> {
        if candidate.status == BookingStatus::Canceled {
            return Ok(());
        }
        let existing = self.active_at(candidate.slot, Some(candidate.id));
        match find_conflict(&candidate.requester, candidate.vehicle_id, &existing) {
            Some(rule) => Err(StorageError::UniqueViolation(rule)),
            None => Ok(()),
        }
    }
}

impl BookingBackend for LocalBookings {
    fn bookings(&self) -> Result<Vec<Booking>, StorageError> {
        let mut bookings: Vec<Booking> = self.tables().bookings.values().cloned().collect();
        bookings.sort_by_key(|booking| (booking.slot.start(), booking.created_at));
        Ok(bookings)
    }

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, StorageError> {
        Ok(self.tables().bookings.get(&id).cloned())
    }

    fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, StorageError> {
        Ok(self
            .bookings()?
            .into_iter()
            .filter(|booking| booking.requester.user_id() == Some(user_id))
            .collect())
    }

    fn active_bookings_at(
        &self,
        slot: Slot,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Booking>, StorageError> {
        Ok(self.tables().active_at(slot, exclude))
    }

    fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StorageError> {
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            vehicle_id: booking.vehicle_id,
            requester: booking.requester,
            slot: booking.slot,
            status: BookingStatus::Pending,
            staff_notes: String::new(),
            created_at: now,
            updated_at: now,
        };

        let mut tables = self.tables();
        tables.enforce_unique(&booking)?;
        tables.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    fn update_booking(&self, booking: &Booking) -> Result<Booking, StorageError> {
        let mut tables = self.tables();
        if !tables.bookings.contains_key(&booking.id) {
            return Err(StorageError::NotFound(booking.id));
        }
        tables.enforce_unique(booking)?;

        let stored = tables
            .bookings
            .get_mut(&booking.id)
            .ok_or(StorageError::NotFound(booking.id))?;
        stored.slot = booking.slot;
        stored.status = booking.status;
        stored.staff_notes = booking.staff_notes.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    fn record_notification(
        &self,
        record: NewNotificationRecord,
    ) -> Result<NotificationRecord, StorageError> {
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            booking_id: record.booking_id,
            kind: record.kind,
            recipient: record.recipient,
            subject: record.subject,
            success: record.success,
            error_message: record.error_message,
            created_at: Utc::now(),
        };
        self.tables().notifications.push(record.clone());
        Ok(record)
    }

    fn notifications(&self, booking_id: Uuid) -> Result<Vec<NotificationRecord>, StorageError> {
        Ok(self
            .tables()
            .notifications
            .iter()
            .filter(|record| record.booking_id == booking_id)
            .cloned()
            .collect())
    }
}
