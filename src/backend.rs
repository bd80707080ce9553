use crate::error::StorageError;
use crate::types::{Booking, NewBooking, NewNotificationRecord, NotificationRecord, Slot};
use uuid::Uuid;

/// Persistence for bookings and their notification audit trail.
///
/// Implementations must reject an insert or update that would leave two
/// non-canceled bookings sharing (user, slot), (guest name, guest email, slot)
/// or (vehicle, slot) with [`StorageError::UniqueViolation`]. That check has to
/// be atomic with the write; callers only pre-check for nicer messages.
pub trait BookingBackend: Clone + Send + Sync + 'static {
    fn bookings(&self) -> Result<Vec<Booking>, StorageError>;
    fn booking(&self, id: Uuid) -> Result<Option<Booking>, StorageError>;
    fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, StorageError>;
    /// Non-canceled bookings at `slot`, leaving out `exclude`.
    fn active_bookings_at(
        &self,
        slot: Slot,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Booking>, StorageError>;
    fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StorageError>;
    /// Writes slot, status and staff notes of `booking` and refreshes `updated_at`.
    fn update_booking(&self, booking: &Booking) -> Result<Booking, StorageError>;
    fn record_notification(
        &self,
        record: NewNotificationRecord,
    ) -> Result<NotificationRecord, StorageError>;
    fn notifications(&self, booking_id: Uuid) -> Result<Vec<NotificationRecord>, StorageError>;
}
