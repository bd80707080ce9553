use crate::configuration::{Configuration, SmtpSettings};
use clap::Parser;
use std::path::PathBuf;

/// Test drive booking service
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct ConfigurationHandler {
    /// Port the HTTP server listens on
    #[arg(long, env = "BOOKINGS_PORT", default_value = "3000")]
    port: String,

    /// PostgreSQL connection URL. Without it bookings are kept in memory only
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Password expected in the x-admin-password header of admin requests
    #[arg(long, env = "BOOKINGS_ADMIN_PASSWORD", default_value = "change-me")]
    admin_password: String,

    /// Sender of all notification emails
    #[arg(long, env = "BOOKINGS_FROM_EMAIL", default_value = "Test Drives <noreply@testdrive.example>")]
    from_email: String,

    /// Where new booking alerts are sent
    #[arg(long, env = "BOOKINGS_STAFF_EMAIL", default_value = "bookings@testdrive.example")]
    staff_email: String,

    /// SMTP relay host; emails are only logged unless this or --mail-dir is set
    #[arg(long, env = "SMTP_RELAY", requires_all = ["smtp_username", "smtp_password"])]
    smtp_relay: Option<String>,

    #[arg(long, env = "SMTP_USERNAME")]
    smtp_username: Option<String>,

    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    smtp_password: Option<String>,

    /// Write emails as .eml files into this directory instead of sending them
    #[arg(long, env = "BOOKINGS_MAIL_DIR")]
    mail_dir: Option<PathBuf>,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }
}

impl Configuration for ConfigurationHandler {
    fn admin_password(&self) -> String {
        self.admin_password.clone()
    }

    fn port(&self) -> String {
        self.port.clone()
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }

    fn from_email(&self) -> String {
        self.from_email.clone()
    }

    fn staff_email(&self) -> String {
        self.staff_email.clone()
    }

    fn smtp(&self) -> Option<SmtpSettings> {
        match (&self.smtp_relay, &self.smtp_username, &self.smtp_password) {
            (Some(relay), Some(username), Some(password)) => Some(SmtpSettings {
                relay: relay.clone(),
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    fn mail_dir(&self) -> Option<PathBuf> {
        self.mail_dir.clone()
    }
}
