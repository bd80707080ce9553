use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub relay: String,
    pub username: String,
    pub password: String,
}

pub trait Configuration: Clone + Send + Sync + 'static {
    fn admin_password(&self) -> String;
    fn port(&self) -> String;
    fn database_url(&self) -> Option<String>;
    fn from_email(&self) -> String;
    fn staff_email(&self) -> String;
    fn smtp(&self) -> Option<SmtpSettings>;
    fn mail_dir(&self) -> Option<PathBuf>;
}
