use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

use chrono::{Months, NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::{
    backend::BookingBackend,
    booking_manager::BookingManager,
    catalog::LocalCatalog,
    directory::LocalDirectory,
    error::{NotificationError, StorageError},
    local_bookings::LocalBookings,
    notification::{NotificationContext, NotificationGateway},
    types::{
        Booking, GuestIdentity, NewBooking, NewNotificationRecord, NotificationKind,
        NotificationRecord, ProfileDefaults, RegisteredUser, Slot, Vehicle,
    },
    validation::BookingRequest,
};

pub const STAFF_EMAIL: &str = "bookings@testdrive.example";

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()
}

pub fn years_before(date: NaiveDate, years: u32) -> NaiveDate {
    date - Months::new(12 * years)
}

pub fn slot() -> Slot {
    Slot::new(
        NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(),
        NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
    )
}

pub fn jane(date_of_birth: Option<NaiveDate>) -> GuestIdentity {
    GuestIdentity {
        name: "Jane Smith".into(),
        email: "jane@example.com".into(),
        phone: "0412345678".into(),
        date_of_birth,
    }
}

pub fn guest_request(vehicle_id: Uuid, today: NaiveDate) -> BookingRequest {
    BookingRequest {
        vehicle_id,
        guest_name: Some("Jane Smith".into()),
        guest_email: Some("jane@example.com".into()),
        guest_phone: Some("0412345678".into()),
        date_of_birth: Some(years_before(today, 30)),
        requested_date: Some(slot().date),
        requested_time: Some(slot().time),
    }
}

pub fn registered_user() -> RegisteredUser {
    RegisteredUser {
        id: Uuid::new_v4(),
        username: "jdoe".into(),
        full_name: "John Doe".into(),
        email: "john@example.com".into(),
    }
}

pub fn notification_context() -> NotificationContext {
    NotificationContext {
        booking_id: Uuid::new_v4(),
        requester_name: "Jane Smith".into(),
        requester_email: "jane@example.com".into(),
        requester_phone: "0412345678".into(),
        vehicle: "2023 Tesla Model S".into(),
        slot: slot(),
        staff_notes: String::new(),
    }
}

pub struct RecordingGatewayInner {
    pub success: AtomicBool,
    pub calls_to_send: AtomicU64,
    pub sent: Mutex<Vec<(NotificationKind, String)>>,
}

/// Gateway that remembers every message and fails on demand.
#[derive(Clone)]
pub struct RecordingGateway(pub Arc<RecordingGatewayInner>);

impl RecordingGateway {
    pub fn new() -> Self {
        Self(Arc::new(RecordingGatewayInner {
            success: AtomicBool::new(true),
            calls_to_send: AtomicU64::default(),
            sent: Mutex::default(),
        }))
    }

    pub fn failing() -> Self {
        let gateway = Self::new();
        gateway.0.success.store(false, Ordering::SeqCst);
        gateway
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.0.sent.lock().unwrap().iter().map(|(kind, _)| *kind).collect()
    }

    pub fn calls(&self) -> u64 {
        self.0.calls_to_send.load(Ordering::SeqCst)
    }
}

impl NotificationGateway for RecordingGateway {
    fn send(
        &self,
        kind: NotificationKind,
        recipient: &str,
        _subject: &str,
        _context: &NotificationContext,
    ) -> Result<(), NotificationError> {
        self.0.calls_to_send.fetch_add(1, Ordering::SeqCst);
        if !self.0.success.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("Supposed to fail".into()));
        }
        self.0.sent.lock().unwrap().push((kind, recipient.to_string()));
        Ok(())
    }
}

/// Backend whose pre-check query never sees other bookings, as if every
/// competing request committed right after our read.
#[derive(Clone, Default)]
pub struct StaleReadBackend(pub LocalBookings);

impl BookingBackend for StaleReadBackend {
    fn bookings(&self) -> Result<Vec<Booking>, StorageError> {
        self.0.bookings()
    }

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, StorageError> {
        self.0.booking(id)
    }

    fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, StorageError> {
        self.0.bookings_for_user(user_id)
    }

    fn active_bookings_at(
        &self,
        _slot: Slot,
        _exclude: Option<Uuid>,
    ) -> Result<Vec<Booking>, StorageError> {
        Ok(vec![])
    }

    fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StorageError> {
        self.0.insert_booking(booking)
    }

    fn update_booking(&self, booking: &Booking) -> Result<Booking, StorageError> {
        self.0.update_booking(booking)
    }

    fn record_notification(
        &self,
        record: NewNotificationRecord,
    ) -> Result<NotificationRecord, StorageError> {
        self.0.record_notification(record)
    }

    fn notifications(&self, booking_id: Uuid) -> Result<Vec<NotificationRecord>, StorageError> {
        self.0.notifications(booking_id)
    }
}

pub struct Fixture<B: BookingBackend> {
    pub manager: BookingManager<B>,
    pub backend: B,
    pub catalog: LocalCatalog,
    pub directory: LocalDirectory,
    pub gateway: RecordingGateway,
    pub tesla: Vehicle,
    pub audi: Vehicle,
    pub user: RegisteredUser,
}

pub fn fixture_with<B: BookingBackend>(backend: B, gateway: RecordingGateway) -> Fixture<B> {
    let catalog = LocalCatalog::default();
    let tesla = catalog.add_vehicle(2023, "Tesla", "Model S");
    let audi = catalog.add_vehicle(2012, "Audi", "A4");

    let directory = LocalDirectory::default();
    let user = registered_user();
    directory.add_user(
        user.clone(),
        Some(ProfileDefaults {
            phone: Some("0487 654 321".into()),
            date_of_birth: Some(years_before(today(), 40)),
        }),
    );

    let manager = BookingManager::new(
        backend.clone(),
        Arc::new(catalog.clone()),
        Arc::new(directory.clone()),
        Arc::new(gateway.clone()),
        STAFF_EMAIL.into(),
    );
    Fixture {
        manager,
        backend,
        catalog,
        directory,
        gateway,
        tesla,
        audi,
        user,
    }
}

pub fn fixture() -> Fixture<LocalBookings> {
    fixture_with(LocalBookings::default(), RecordingGateway::new())
}
