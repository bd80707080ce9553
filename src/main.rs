use std::{error::Error, sync::Arc, time::Duration};

use crate::{
    backend::BookingBackend,
    booking_manager::BookingManager,
    catalog::LocalCatalog,
    configuration::Configuration,
    configuration_handler::ConfigurationHandler,
    database_interface::DatabaseInterface,
    directory::LocalDirectory,
    email_gateway::{EmailGateway, LogTransport},
    http::{create_app, AppState},
    local_bookings::LocalBookings,
    notification::NotificationGateway,
};
use axum::Router;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, FileTransport, SmtpTransport,
};
use tokio::time::sleep;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod backend;
mod booking_manager;
mod catalog;
mod configuration;
mod configuration_handler;
mod database_interface;
mod directory;
mod email_gateway;
mod error;
mod http;
mod local_bookings;
mod notification;
mod schema;
mod status;
mod templates;
#[cfg(test)]
mod testutils;
mod types;
mod validation;

fn notification_gateway(
    configuration: &impl Configuration,
) -> Result<Arc<dyn NotificationGateway>, Box<dyn Error>> {
    let from: Mailbox = configuration.from_email().parse()?;

    if let Some(smtp) = configuration.smtp() {
        info!(relay = %smtp.relay, "Sending email through SMTP relay");
        let transport = SmtpTransport::relay(&smtp.relay)?
            .credentials(Credentials::new(smtp.username, smtp.password))
            .build();
        return Ok(Arc::new(EmailGateway::new(from, transport)));
    }
    if let Some(mail_dir) = configuration.mail_dir() {
        info!(mail_dir = %mail_dir.display(), "Writing email to directory");
        std::fs::create_dir_all(&mail_dir)?;
        return Ok(Arc::new(EmailGateway::new(from, FileTransport::new(mail_dir))));
    }
    info!("No mail transport configured, email is written to the log");
    Ok(Arc::new(EmailGateway::new(from, LogTransport)))
}

fn build_app<B: BookingBackend>(
    backend: B,
    gateway: Arc<dyn NotificationGateway>,
    configuration: &impl Configuration,
) -> Router {
    let catalog = LocalCatalog::default();
    catalog.insert_example_vehicles();

    let directory = LocalDirectory::default();
    for user in directory.insert_example_users() {
        info!(user_id = %user.id, username = %user.username, "Example account, send its id as x-user-id");
    }

    let booking_manager = BookingManager::new(
        backend,
        Arc::new(catalog),
        Arc::new(directory),
        gateway,
        configuration.staff_email(),
    );
    create_app(AppState {
        booking_manager,
        admin_password: configuration.admin_password(),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("########################");
    println!("# Test Drive Bookings  #");
    println!("########################");

    let configuration = ConfigurationHandler::parse_arguments();
    let gateway = notification_gateway(&configuration)?;

    let address = format!("0.0.0.0:{}", configuration.port());
    println!("Accessable at:\n{}", address.clone());
    let listener = tokio::net::TcpListener::bind(address).await?;

    let app = if let Some(database_url) = configuration.database_url() {
        let backend = loop {
            match DatabaseInterface::new(&database_url) {
                Ok(backend) => {
                    info!("Successfully connected to database");
                    break backend;
                }
                Err(err) => {
                    error!(?err, "Failed to establish database connection: {database_url}. Retry in 1 sec. You may want to restart it with database disabled (impersistent bookings).");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        };
        build_app(backend, gateway, &configuration)
    } else {
        build_app(LocalBookings::default(), gateway, &configuration)
    };

    axum::serve(listener, app).await?;
    Ok(())
}
