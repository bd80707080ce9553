use crate::backend::BookingBackend;
use crate::booking_manager::{BookingManager, TransitionSummary};
use crate::error::BookingError;
use crate::notification::DispatchMode;
use crate::types::{BookingStatus, Principal};
use crate::validation::{required_slot, BookingRequest};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;
use validator::ValidationErrors;

const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";
const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState<B: BookingBackend> {
    pub booking_manager: BookingManager<B>,
    pub admin_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RescheduleRequest {
    requested_date: Option<NaiveDate>,
    requested_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusRequest {
    status: BookingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BulkTransitionRequest {
    booking_ids: Vec<Uuid>,
    status: BookingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NotesRequest {
    staff_notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransitionItem {
    booking_id: Uuid,
    changed: bool,
    notified: Option<bool>,
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BulkTransitionResponse {
    message: String,
    results: Vec<TransitionItem>,
}

fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|err| match &err.message {
                    Some(message) => message.to_string(),
                    None => err.code.to_string(),
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

enum ApiError {
    Booking(BookingError),
    Unauthorized(&'static str),
    /// Body that is not JSON or does not fit the request type.
    Rejected(JsonRejection),
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        Self::Booking(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected(rejection)
    }
}

fn booking_status(err: &BookingError) -> StatusCode {
    match err {
        BookingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BookingError::Conflict(_) => StatusCode::CONFLICT,
        BookingError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::Forbidden => StatusCode::FORBIDDEN,
        BookingError::Storage(_) | BookingError::Notification(_) => {
            error!(%err, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Booking(err) => {
                let fields = match &err {
                    BookingError::Validation(errors) => field_messages(errors),
                    _ => BTreeMap::new(),
                };
                let body = ErrorBody {
                    message: err.to_string(),
                    fields,
                };
                (booking_status(&err), body)
            }
            Self::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    message: message.into(),
                    fields: BTreeMap::new(),
                },
            ),
            Self::Rejected(rejection) => (
                rejection.status(),
                ErrorBody {
                    message: rejection.body_text(),
                    fields: BTreeMap::new(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

pub fn create_app<B: BookingBackend>(state: AppState<B>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/vehicles", get(get_vehicles))
        .route("/bookings", post(create_booking))
        .route("/my/bookings", get(get_my_bookings))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/reschedule", post(reschedule_booking));

    let admin = Router::new()
        .route("/admin/bookings", get(get_bookings))
        .route("/admin/bookings/transition", post(transition_bookings))
        .route("/admin/bookings/:id/status", post(set_status))
        .route("/admin/bookings/:id/notes", post(set_notes))
        .route("/admin/bookings/:id/notifications", get(get_notifications))
        .route("/admin/bookings/:id/resend", post(resend_notification))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth::<B>));

    Router::new()
        .merge(public)
        .merge(admin)
        .with_state(state)
        .layer(cors)
}

async fn admin_auth<B: BookingBackend>(
    State(state): State<AppState<B>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    match request.headers().get(ADMIN_PASSWORD_HEADER) {
        Some(header) if header.to_str().unwrap_or("") == state.admin_password => {
            Ok(next.run(request).await)
        }
        Some(_) => Err(ApiError::Unauthorized("Unauthorized")),
        None => Err(ApiError::Unauthorized("Missing credentials")),
    }
}

fn principal<B: BookingBackend>(
    state: &AppState<B>,
    headers: &HeaderMap,
) -> Result<Principal, ApiError> {
    let Some(header) = headers.get(USER_HEADER) else {
        return Ok(Principal::Anonymous);
    };
    let user = header
        .to_str()
        .ok()
        .and_then(|value| Uuid::parse_str(value).ok())
        .and_then(|id| state.booking_manager.directory().find_user(id));
    match user {
        Some(user) => Ok(Principal::Registered(user)),
        None => Err(ApiError::Unauthorized("Unknown user")),
    }
}

async fn get_vehicles<B: BookingBackend>(State(state): State<AppState<B>>) -> impl IntoResponse {
    Json(state.booking_manager.catalog().vehicles())
}

async fn create_booking<B: BookingBackend>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal(&state, &headers)?;
    let Json(request) = payload?;
    let today = Local::now().date_naive();
    let created = state
        .booking_manager
        .create_booking(&principal, request, today)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_my_bookings<B: BookingBackend>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal(&state, &headers)?;
    Ok(Json(state.booking_manager.bookings_for(&principal)?))
}

async fn cancel_booking<B: BookingBackend>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal(&state, &headers)?;
    Ok(Json(state.booking_manager.cancel(&principal, id)?))
}

async fn reschedule_booking<B: BookingBackend>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<RescheduleRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = principal(&state, &headers)?;
    let Json(request) = payload?;
    let slot = required_slot(request.requested_date, request.requested_time)
        .map_err(BookingError::Validation)?;
    Ok(Json(state.booking_manager.reschedule(&principal, id, slot)?))
}

async fn get_bookings<B: BookingBackend>(
    State(state): State<AppState<B>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.booking_manager.bookings()?))
}

async fn transition_bookings<B: BookingBackend>(
    State(state): State<AppState<B>>,
    payload: Result<Json<BulkTransitionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let results = state
        .booking_manager
        .transition(&request.booking_ids, request.status);
    let summary = TransitionSummary::from_results(&results);
    info!(status = %request.status, %summary, "Bulk status change");

    let results = results
        .into_iter()
        .map(|result| match result.outcome {
            Ok(outcome) => TransitionItem {
                booking_id: result.booking_id,
                changed: outcome.changed,
                notified: outcome.notified,
                error: None,
            },
            Err(err) => TransitionItem {
                booking_id: result.booking_id,
                changed: false,
                notified: None,
                error: Some(err.to_string()),
            },
        })
        .collect();
    Ok(Json(BulkTransitionResponse {
        message: summary.to_string(),
        results,
    }))
}

async fn set_status<B: BookingBackend>(
    State(state): State<AppState<B>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.booking_manager.set_status(id, request.status)?))
}

async fn set_notes<B: BookingBackend>(
    State(state): State<AppState<B>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<NotesRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.booking_manager.annotate(id, request.staff_notes)?))
}

async fn get_notifications<B: BookingBackend>(
    State(state): State<AppState<B>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.booking_manager.notifications(id)?))
}

async fn resend_notification<B: BookingBackend>(
    State(state): State<AppState<B>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .booking_manager
            .resend_notification(id, DispatchMode::Strict)?,
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::booking_manager::Created;
    use crate::local_bookings::LocalBookings;
    use crate::testutils::{fixture, guest_request, years_before, Fixture};
    use crate::types::Booking;
    use reqwest::Client;
    use tokio::task::JoinHandle;

    const PASSWORD: &str = "123";

    async fn init() -> (JoinHandle<()>, String, Fixture<LocalBookings>) {
        let f = fixture();
        let state = AppState {
            booking_manager: f.manager.clone(),
            admin_password: PASSWORD.into(),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            axum::serve(listener, create_app(state)).await.unwrap();
        });
        (server, base_url, f)
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    #[tokio::test]
    async fn test_guest_booking_is_created() {
        let (server, base_url, f) = init().await;

        let response = Client::new()
            .post(format!("{base_url}/bookings"))
            .json(&guest_request(f.tesla.id, today()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED.as_u16());

        let created: Created = response.json().await.unwrap();
        assert_eq!(created.booking.status, BookingStatus::Pending);
        assert!(created.requester_notified);
        assert_eq!(f.backend.bookings().unwrap().len(), 1);

        server.abort();
    }

    #[tokio::test]
    async fn test_booking_errors_are_reported() {
        let (server, base_url, f) = init().await;
        let client = Client::new();

        let mut too_young = guest_request(f.tesla.id, today());
        too_young.date_of_birth = Some(years_before(today(), 20));
        too_young.guest_email = Some("nope".into());
        let response = client
            .post(format!("{base_url}/bookings"))
            .json(&too_young)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY.as_u16());
        let body: ErrorBody = response.json().await.unwrap();
        assert!(body.fields.contains_key("date_of_birth"));
        assert!(body.fields.contains_key("guest_email"));

        for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
            let response = client
                .post(format!("{base_url}/bookings"))
                .json(&guest_request(f.tesla.id, today()))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), expected.as_u16());
        }

        server.abort();
    }

    #[tokio::test]
    async fn test_missing_and_malformed_fields_are_reported_as_json() {
        let (server, base_url, f) = init().await;
        let client = Client::new();

        let mut body = serde_json::to_value(guest_request(f.tesla.id, today())).unwrap();
        body.as_object_mut().unwrap().remove("requested_time");
        let response = client
            .post(format!("{base_url}/bookings"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY.as_u16());
        let error: ErrorBody = response.json().await.unwrap();
        assert_eq!(error.fields.keys().collect::<Vec<_>>(), vec!["requested_time"]);

        body.as_object_mut().unwrap().insert("vehicle_id".into(), "not-a-uuid".into());
        let response = client
            .post(format!("{base_url}/bookings"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY.as_u16());
        let error: ErrorBody = response.json().await.unwrap();
        assert!(error.message.contains("vehicle_id"));

        let booking = f
            .manager
            .create_booking(
                &Principal::Registered(f.user.clone()),
                guest_request(f.tesla.id, today()),
                today(),
            )
            .unwrap()
            .booking;
        let response = client
            .post(format!("{base_url}/bookings/{}/reschedule", booking.id))
            .header(USER_HEADER, f.user.id.to_string())
            .json(&serde_json::json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY.as_u16());
        let error: ErrorBody = response.json().await.unwrap();
        assert_eq!(
            error.fields.keys().collect::<Vec<_>>(),
            vec!["requested_date", "requested_time"]
        );

        server.abort();
    }

    #[test_case::test_case("get", "admin/bookings", false, StatusCode::UNAUTHORIZED)]
    #[test_case::test_case("get", "admin/bookings", true, StatusCode::OK)]
    #[test_case::test_case("post", "admin/bookings/transition", false, StatusCode::UNAUTHORIZED)]
    #[test_case::test_case("post", "admin/bookings/transition", true, StatusCode::OK)]
    #[tokio::test]
    async fn test_authorization(method: &str, path: &str, authorized: bool, status_code: StatusCode) {
        let (server, base_url, _) = init().await;

        let client = Client::new();
        let mut request_builder = match method {
            "get" => client.get(format!("{base_url}/{path}")),
            "post" => client.post(format!("{base_url}/{path}")),
            _ => panic!("Unsupported HTTP method: {}", method),
        };
        if authorized {
            request_builder = request_builder.header(ADMIN_PASSWORD_HEADER, PASSWORD);
        }
        let body = BulkTransitionRequest {
            booking_ids: vec![],
            status: BookingStatus::Confirmed,
        };
        let response = request_builder.json(&body).send().await.unwrap();

        assert_eq!(response.status(), status_code.as_u16());
        server.abort();
    }

    #[tokio::test]
    async fn test_bulk_transition_message() {
        let (server, base_url, f) = init().await;
        let booking = f
            .manager
            .create_booking(&Principal::Anonymous, guest_request(f.tesla.id, today()), today())
            .unwrap()
            .booking;

        let response = Client::new()
            .post(format!("{base_url}/admin/bookings/transition"))
            .header(ADMIN_PASSWORD_HEADER, PASSWORD)
            .json(&BulkTransitionRequest {
                booking_ids: vec![booking.id, Uuid::new_v4()],
                status: BookingStatus::Confirmed,
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK.as_u16());

        let body: BulkTransitionResponse = response.json().await.unwrap();
        assert_eq!(body.message, "Updated 1, email failed for 0, 1 could not be changed");
        assert_eq!(body.results[0].notified, Some(true));
        assert!(body.results[1].error.is_some());

        server.abort();
    }

    #[tokio::test]
    async fn test_owner_reschedules_and_cancels() {
        let (server, base_url, f) = init().await;
        let client = Client::new();
        let user_id = f.user.id.to_string();
        let booking = f
            .manager
            .create_booking(
                &Principal::Registered(f.user.clone()),
                guest_request(f.tesla.id, today()),
                today(),
            )
            .unwrap()
            .booking;

        let response = client
            .post(format!("{base_url}/bookings/{}/cancel", booking.id))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN.as_u16());

        let response = client
            .post(format!("{base_url}/bookings/{}/reschedule", booking.id))
            .header(USER_HEADER, &user_id)
            .json(&RescheduleRequest {
                requested_date: Some(booking.slot.date),
                requested_time: NaiveTime::from_hms_opt(15, 0, 0),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK.as_u16());

        let response = client
            .get(format!("{base_url}/my/bookings"))
            .header(USER_HEADER, &user_id)
            .send()
            .await
            .unwrap();
        let bookings: Vec<Booking> = response.json().await.unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].status, BookingStatus::Rescheduled);

        for expected in [StatusCode::OK, StatusCode::BAD_REQUEST] {
            let response = client
                .post(format!("{base_url}/bookings/{}/cancel", booking.id))
                .header(USER_HEADER, &user_id)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), expected.as_u16());
        }

        let response = client
            .get(format!("{base_url}/my/bookings"))
            .header(USER_HEADER, Uuid::new_v4().to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED.as_u16());

        server.abort();
    }
}
