use std::sync::Arc;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{error, warn};

use super::context::ActingContext;
use super::domain::{AllotmentId, HostelId, Role, RoomId, StudentId, UserId};
use super::filter::{AllotmentFilter, RoomFilter, StudentFilter};
use super::repository::HostelRepository;
use super::service::{
    AllotmentRequest, EnrollmentRequest, HostelService, HostelServiceError, ReassignmentRequest,
    RoomRequest, RoomTypeRequest,
};

/// Headers set by the authentication gateway once it has resolved the caller's session.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const HOSTEL_ID_HEADER: &str = "x-hostel-id";
pub const ROLE_HEADER: &str = "x-user-role";

/// Uniform response body: every reply carries `success` plus data or a message.
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn success<T: Serialize>(status: StatusCode, data: T, message: Option<&str>) -> Response {
    let body = ApiEnvelope {
        success: true,
        data: Some(data),
        message: message.map(str::to_string),
    };
    (status, Json(body)).into_response()
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ApiEnvelope::<()> {
        success: false,
        data: None,
        message: Some(message.into()),
    };
    (status, Json(body)).into_response()
}

fn service_failure(err: HostelServiceError) -> Response {
    match err {
        HostelServiceError::Validation(message) => failure(StatusCode::BAD_REQUEST, message),
        HostelServiceError::NotFound(message) | HostelServiceError::Conflict(message) => {
            failure(StatusCode::BAD_REQUEST, message)
        }
        HostelServiceError::Forbidden(role) => {
            warn!(role = role.label(), "room desk access denied");
            failure(StatusCode::FORBIDDEN, "access denied")
        }
        HostelServiceError::Storage(source) => {
            error!(error = %source, "hostel storage failure");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "server error")
        }
    }
}

fn rejection(message: impl Into<String>) -> Response {
    failure(StatusCode::BAD_REQUEST, message)
}

#[async_trait]
impl<S> FromRequestParts<S> for ActingContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let user_id = header(USER_ID_HEADER).and_then(|raw| raw.parse::<i64>().ok());
        let hostel_id = header(HOSTEL_ID_HEADER).and_then(|raw| raw.parse::<i64>().ok());
        let role = header(ROLE_HEADER).and_then(Role::parse);

        match (user_id, hostel_id, role) {
            (Some(user_id), Some(hostel_id), Some(role)) => Ok(ActingContext::new(
                UserId(user_id),
                HostelId(hostel_id),
                role,
            )),
            _ => Err(failure(
                StatusCode::UNAUTHORIZED,
                "missing or invalid session context",
            )),
        }
    }
}

/// Router builder exposing the room desk endpoints.
pub fn hostel_router<R>(service: Arc<HostelService<R>>) -> Router
where
    R: HostelRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/room-types",
            get(room_types_handler::<R>).post(create_room_type_handler::<R>),
        )
        .route(
            "/api/v1/rooms",
            get(rooms_handler::<R>).post(create_room_handler::<R>),
        )
        .route("/api/v1/rooms/:room_id", delete(deactivate_room_handler::<R>))
        .route(
            "/api/v1/students",
            get(students_handler::<R>).post(enroll_handler::<R>),
        )
        .route(
            "/api/v1/students/:student_id",
            delete(deactivate_student_handler::<R>),
        )
        .route(
            "/api/v1/allotments",
            get(allotments_handler::<R>).post(allot_handler::<R>),
        )
        .route(
            "/api/v1/allotments/:allotment_id/vacate",
            post(vacate_handler::<R>),
        )
        .route(
            "/api/v1/allotments/:allotment_id/reassign",
            post(reassign_handler::<R>),
        )
        .with_state(service)
}

pub(crate) async fn allot_handler<R>(
    State(service): State<Arc<HostelService<R>>>,
    acting: ActingContext,
    payload: Result<Json<AllotmentRequest>, JsonRejection>,
) -> Response
where
    R: HostelRepository + 'static,
{
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return rejection(err.body_text()),
    };

    match service.allot_room(request, &acting) {
        Ok(details) => success(
            StatusCode::CREATED,
            details,
            Some("Room allotted successfully"),
        ),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn vacate_handler<R>(
    State(service): State<Arc<HostelService<R>>>,
    acting: ActingContext,
    allotment_id: Result<Path<i64>, PathRejection>,
) -> Response
where
    R: HostelRepository + 'static,
{
    let Path(allotment_id) = match allotment_id {
        Ok(path) => path,
        Err(err) => return rejection(err.body_text()),
    };

    match service.vacate_room(AllotmentId(allotment_id), &acting) {
        Ok(details) => success(StatusCode::OK, details, Some("Room vacated successfully")),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn reassign_handler<R>(
    State(service): State<Arc<HostelService<R>>>,
    acting: ActingContext,
    allotment_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ReassignmentRequest>, JsonRejection>,
) -> Response
where
    R: HostelRepository + 'static,
{
    let Path(allotment_id) = match allotment_id {
        Ok(path) => path,
        Err(err) => return rejection(err.body_text()),
    };
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return rejection(err.body_text()),
    };

    match service.reassign_room(AllotmentId(allotment_id), request, &acting) {
        Ok(details) => success(
            StatusCode::CREATED,
            details,
            Some("Room reassigned successfully"),
        ),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn allotments_handler<R>(
    State(service): State<Arc<HostelService<R>>>,
    acting: ActingContext,
    filter: Result<Query<AllotmentFilter>, QueryRejection>,
) -> Response
where
    R: HostelRepository + 'static,
{
    let Query(filter) = match filter {
        Ok(query) => query,
        Err(err) => return rejection(err.body_text()),
    };

    match service.list_allotments(filter, &acting) {
        Ok(allotments) => success(StatusCode::OK, allotments, None),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn rooms_handler<R>(
    State(service): State<Arc<HostelService<R>>>,
    acting: ActingContext,
    filter: Result<Query<RoomFilter>, QueryRejection>,
) -> Response
where
    R: HostelRepository + 'static,
{
    let Query(filter) = match filter {
        Ok(query) => query,
        Err(err) => return rejection(err.body_text()),
    };

    match service.list_rooms(filter, &acting) {
        Ok(rooms) => success(StatusCode::OK, rooms, None),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn room_types_handler<R>(
    State(service): State<Arc<HostelService<R>>>,
    acting: ActingContext,
) -> Response
where
    R: HostelRepository + 'static,
{
    match service.list_room_types(&acting) {
        Ok(room_types) => success(StatusCode::OK, room_types, None),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn create_room_type_handler<R>(
    State(service): State<Arc<HostelService<R>>>,
    acting: ActingContext,
    payload: Result<Json<RoomTypeRequest>, JsonRejection>,
) -> Response
where
    R: HostelRepository + 'static,
{
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return rejection(err.body_text()),
    };

    match service.create_room_type(request, &acting) {
        Ok(room_type) => success(
            StatusCode::CREATED,
            room_type,
            Some("Room type created successfully"),
        ),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn create_room_handler<R>(
    State(service): State<Arc<HostelService<R>>>,
    acting: ActingContext,
    payload: Result<Json<RoomRequest>, JsonRejection>,
) -> Response
where
    R: HostelRepository + 'static,
{
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return rejection(err.body_text()),
    };

    match service.create_room(request, &acting) {
        Ok(room) => success(StatusCode::CREATED, room, Some("Room created successfully")),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn deactivate_room_handler<R>(
    State(service): State<Arc<HostelService<R>>>,
    acting: ActingContext,
    room_id: Result<Path<i64>, PathRejection>,
) -> Response
where
    R: HostelRepository + 'static,
{
    let Path(room_id) = match room_id {
        Ok(path) => path,
        Err(err) => return rejection(err.body_text()),
    };

    match service.deactivate_room(RoomId(room_id), &acting) {
        Ok(room) => success(StatusCode::OK, room, Some("Room deactivated successfully")),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn students_handler<R>(
    State(service): State<Arc<HostelService<R>>>,
    acting: ActingContext,
    filter: Result<Query<StudentFilter>, QueryRejection>,
) -> Response
where
    R: HostelRepository + 'static,
{
    let Query(mut filter) = match filter {
        Ok(query) => query,
        Err(err) => return rejection(err.body_text()),
    };
    filter.active.get_or_insert(true);

    match service.list_students(filter, &acting) {
        Ok(students) => success(StatusCode::OK, students, None),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn enroll_handler<R>(
    State(service): State<Arc<HostelService<R>>>,
    acting: ActingContext,
    payload: Result<Json<EnrollmentRequest>, JsonRejection>,
) -> Response
where
    R: HostelRepository + 'static,
{
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return rejection(err.body_text()),
    };

    match service.enroll_student(request, &acting) {
        Ok(student) => success(
            StatusCode::CREATED,
            student,
            Some("Student enrolled successfully"),
        ),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn deactivate_student_handler<R>(
    State(service): State<Arc<HostelService<R>>>,
    acting: ActingContext,
    student_id: Result<Path<i64>, PathRejection>,
) -> Response
where
    R: HostelRepository + 'static,
{
    let Path(student_id) = match student_id {
        Ok(path) => path,
        Err(err) => return rejection(err.body_text()),
    };

    match service.deactivate_student(StudentId(student_id), &acting) {
        Ok(student) => success(
            StatusCode::OK,
            student,
            Some("Student deactivated successfully"),
        ),
        Err(err) => service_failure(err),
    }
}
