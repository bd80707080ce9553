use crate::error::NotificationError;
use crate::notification::{NotificationContext, NotificationGateway};
use crate::templates::render;
use crate::types::NotificationKind;
use lettre::address::Envelope;
use lettre::message::{Mailbox, MultiPart};
use lettre::{Message, Transport};
use std::fmt::Display;
use tracing::info;

/// Development transport: writes the message to the log instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

impl Transport for LogTransport {
    type Ok = ();
    type Error = std::convert::Infallible;

    fn send_raw(&self, envelope: &Envelope, email: &[u8]) -> Result<Self::Ok, Self::Error> {
        let recipients: Vec<String> = envelope.to().iter().map(ToString::to_string).collect();
        info!(
            to = recipients.join(", "),
            message = %String::from_utf8_lossy(email),
            "Email (not sent, log transport)"
        );
        Ok(())
    }
}

/// Email delivery on top of any lettre transport (SMTP relay, file, stub).
pub struct EmailGateway<T> {
    from: Mailbox,
    transport: T,
}

impl<T> EmailGateway<T>
where
    T: Transport + Send + Sync + 'static,
    T::Error: Display,
{
    pub fn new(from: Mailbox, transport: T) -> Self {
        Self { from, transport }
    }

    fn build_message(
        &self,
        kind: NotificationKind,
        recipient: &str,
        subject: &str,
        context: &NotificationContext,
    ) -> Result<Message, NotificationError> {
        let body = render(kind, context)?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|err| NotificationError::Render(format!("Invalid recipient address: {err}")))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(body.text, body.html))
            .map_err(|err| NotificationError::Render(format!("Failed to build email: {err}")))
    }
}

impl<T> NotificationGateway for EmailGateway<T>
where
    T: Transport + Send + Sync + 'static,
    T::Error: Display,
{
    fn send(
        &self,
        kind: NotificationKind,
        recipient: &str,
        subject: &str,
        context: &NotificationContext,
    ) -> Result<(), NotificationError> {
        let message = self.build_message(kind, recipient, subject, context)?;
        self.transport
            .send(&message)
            .map(|_| ())
            .map_err(|err| NotificationError::Transport(err.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutils::notification_context;
    use lettre::transport::stub::StubTransport;
    use lettre::FileTransport;

    fn from() -> Mailbox {
        "Test Drives <noreply@testdrive.example>".parse().unwrap()
    }

    #[test]
    fn test_message_is_delivered() {
        let transport = StubTransport::new_ok();
        let gateway = EmailGateway::new(from(), transport.clone());

        gateway
            .send(
                NotificationKind::Confirmed,
                "jane@example.com",
                "Test Drive Confirmed - 2023 Tesla Model S",
                &notification_context(),
            )
            .unwrap();

        let messages = transport.messages();
        assert_eq!(messages.len(), 1);
        let (envelope, raw) = &messages[0];
        assert_eq!(envelope.to()[0].to_string(), "jane@example.com");
        assert!(raw.contains("Subject: Test Drive Confirmed - 2023 Tesla Model S"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_transport_failure_is_reported_as_such() {
        let gateway = EmailGateway::new(from(), StubTransport::new_error());
        let err = gateway
            .send(
                NotificationKind::Canceled,
                "jane@example.com",
                "Test Drive Canceled - 2023 Tesla Model S",
                &notification_context(),
            )
            .unwrap_err();
        assert!(matches!(err, NotificationError::Transport(_)));
    }

    #[test]
    fn test_bad_recipient_is_a_render_failure() {
        let transport = StubTransport::new_ok();
        let gateway = EmailGateway::new(from(), transport.clone());
        let err = gateway
            .send(
                NotificationKind::RequestAck,
                "not an address",
                "Test Drive Booking Confirmation - 2023 Tesla Model S",
                &notification_context(),
            )
            .unwrap_err();
        assert!(matches!(err, NotificationError::Render(_)));
        assert!(transport.messages().is_empty());
    }

    #[test]
    fn test_file_transport_writes_eml() {
        let mail_dir = tempfile::tempdir().unwrap();
        let gateway = EmailGateway::new(from(), FileTransport::new(mail_dir.path()));
        gateway
            .send(
                NotificationKind::StaffAlert,
                "bookings@testdrive.example",
                "New Test Drive Booking - 2023 Tesla Model S",
                &notification_context(),
            )
            .unwrap();
        assert_eq!(std::fs::read_dir(mail_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_log_transport_accepts_everything() {
        let gateway = EmailGateway::new(from(), LogTransport);
        gateway
            .send(
                NotificationKind::Rescheduled,
                "jane@example.com",
                "Test Drive Rescheduled - 2023 Tesla Model S",
                &notification_context(),
            )
            .unwrap();
    }
}
