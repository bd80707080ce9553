use crate::backend::BookingBackend;
use crate::error::NotificationError;
use crate::types::{NewNotificationRecord, NotificationKind, Slot};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Everything a gateway needs to personalise a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContext {
    pub booking_id: Uuid,
    pub requester_name: String,
    pub requester_email: String,
    pub requester_phone: String,
    pub vehicle: String,
    pub slot: Slot,
    pub staff_notes: String,
}

/// Renders and transmits one message.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationGateway: Send + Sync + 'static {
    fn send(
        &self,
        kind: NotificationKind,
        recipient: &str,
        subject: &str,
        context: &NotificationContext,
    ) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Failures are logged and recorded, and reported as `Ok(false)`.
    #[default]
    BestEffort,
    /// Failures are logged and recorded, then returned to the caller.
    Strict,
}

/// Sends notifications and keeps the audit trail of every attempt.
#[derive(Clone)]
pub struct NotificationDispatcher<B: BookingBackend> {
    backend: B,
    gateway: Arc<dyn NotificationGateway>,
    staff_email: String,
}

impl<B: BookingBackend> NotificationDispatcher<B> {
    pub fn new(backend: B, gateway: Arc<dyn NotificationGateway>, staff_email: String) -> Self {
        Self {
            backend,
            gateway,
            staff_email,
        }
    }

    fn recipient(&self, kind: NotificationKind, context: &NotificationContext) -> String {
        match kind {
            NotificationKind::StaffAlert => self.staff_email.clone(),
            _ => context.requester_email.clone(),
        }
    }

    pub fn dispatch(
        &self,
        kind: NotificationKind,
        context: &NotificationContext,
        mode: DispatchMode,
    ) -> Result<bool, NotificationError> {
        let recipient = self.recipient(kind, context);
        let subject = kind.subject(&context.vehicle);

        let result = if recipient.trim().is_empty() {
            Err(NotificationError::UnknownRecipient)
        } else {
            self.gateway.send(kind, &recipient, &subject, context)
        };

        match &result {
            Ok(()) => info!(booking_id = %context.booking_id, %kind, %recipient, "Notification sent"),
            Err(err) => {
                error!(booking_id = %context.booking_id, %kind, %recipient, %err, "Notification failed")
            }
        }

        let record = NewNotificationRecord {
            booking_id: context.booking_id,
            kind,
            recipient,
            subject,
            success: result.is_ok(),
            error_message: result.as_ref().err().map(ToString::to_string).unwrap_or_default(),
        };
        if let Err(err) = self.backend.record_notification(record) {
            error!(booking_id = %context.booking_id, %kind, %err, "Failed to record notification");
        }

        match (result, mode) {
            (Ok(()), _) => Ok(true),
            (Err(_), DispatchMode::BestEffort) => Ok(false),
            (Err(err), DispatchMode::Strict) => Err(err),
        }
    }
}
