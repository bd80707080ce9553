use crate::error::NotificationError;
use crate::notification::NotificationContext;
use crate::types::NotificationKind;

pub struct RenderedBody {
    pub text: String,
    pub html: String,
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn lines(kind: NotificationKind, context: &NotificationContext) -> (String, Vec<String>) {
    let when = format!(
        "{} at {}",
        context.slot.date.format("%A %-d %B %Y"),
        context.slot.time.format("%-I:%M %p")
    );
    let mut body = Vec::new();
    let greeting = match kind {
        NotificationKind::StaffAlert => "Hello team,".to_string(),
        _ => format!("Hi {},", context.requester_name),
    };

    match kind {
        NotificationKind::RequestAck => {
            body.push(format!(
                "Thanks for requesting a test drive of the {}.",
                context.vehicle
            ));
            body.push(format!("Requested time: {when}."));
            body.push("We will be in touch shortly to confirm your booking.".into());
        }
        NotificationKind::StaffAlert => {
            body.push(format!("A new test drive has been requested for the {}.", context.vehicle));
            body.push(format!(
                "Requested time: {when} (until {}).",
                context.slot.end().format("%-I:%M %p")
            ));
            body.push(format!("Customer: {}", context.requester_name));
            body.push(format!("Email: {}", context.requester_email));
            let phone = if context.requester_phone.is_empty() {
                "Not provided"
            } else {
                context.requester_phone.as_str()
            };
            body.push(format!("Phone: {phone}"));
        }
        NotificationKind::Confirmed => {
            body.push(format!("Your test drive of the {} is confirmed.", context.vehicle));
            body.push(format!("We look forward to seeing you on {when}."));
        }
        NotificationKind::Rescheduled => {
            body.push(format!("Your test drive of the {} has been rescheduled.", context.vehicle));
            body.push(format!("New time: {when}."));
        }
        NotificationKind::Canceled => {
            body.push(format!(
                "Your test drive of the {} on {when} has been canceled.",
                context.vehicle
            ));
            body.push("You are welcome to request another time at any point.".into());
        }
    }

    let staff_note = context.staff_notes.trim();
    if kind != NotificationKind::StaffAlert
        && kind != NotificationKind::RequestAck
        && !staff_note.is_empty()
    {
        body.push(format!("Note from our team: {staff_note}"));
    }
    (greeting, body)
}

/// Plain text and HTML bodies for one notification.
pub fn render(kind: NotificationKind, context: &NotificationContext) -> Result<RenderedBody, NotificationError> {
    if context.requester_name.trim().is_empty() {
        return Err(NotificationError::Render("requester name is missing".into()));
    }
    if context.vehicle.trim().is_empty() {
        return Err(NotificationError::Render("vehicle description is missing".into()));
    }

    let (greeting, body) = lines(kind, context);

    let mut text = format!("{greeting}\n\n");
    for line in &body {
        text.push_str(line);
        text.push('\n');
    }

    let mut html = String::from("<!DOCTYPE html>\n<html>\n<body style=\"font-family: Arial, sans-serif; color: #333;\">\n");
    html.push_str(&format!("<p>{}</p>\n", escape(&greeting)));
    for line in &body {
        html.push_str(&format!("<p>{}</p>\n", escape(line)));
    }
    html.push_str("</body>\n</html>\n");

    Ok(RenderedBody { text, html })
}
