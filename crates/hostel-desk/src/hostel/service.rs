use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::audit::{AuditReport, OccupancyAudit};
use super::context::ActingContext;
use super::domain::{
    AllotmentDetails, AllotmentId, AllotmentRecord, HostelId, NewAllotment, NewRoom, NewRoomType,
    NewStudent, Role, RoomId, RoomRecord, RoomTypeId, RoomTypeRecord, RoomView, SessionId,
    StudentId, StudentRecord,
};
use super::filter::{AllotmentFilter, RoomFilter, StudentFilter};
use super::repository::{HostelRepository, HostelTransaction, RepositoryError, UniqueConstraint};

pub const STUDENT_NOT_IN_HOSTEL: &str = "student not in hostel";
pub const STUDENT_ALREADY_ASSIGNED: &str = "student already assigned to a room";
pub const ROOM_NOT_IN_HOSTEL: &str = "room not in hostel";
pub const ROOM_UNAVAILABLE: &str = "room unavailable";
pub const ALLOTMENT_NOT_IN_HOSTEL: &str = "allotment not in hostel";
pub const ALLOTMENT_ALREADY_VACATED: &str = "allotment already vacated";
pub const ALREADY_IN_ROOM: &str = "student already occupies this room";
pub const USERNAME_TAKEN: &str = "username already exists";
pub const ROOM_TYPE_NOT_FOUND: &str = "room type not found";
pub const ROOM_NUMBER_TAKEN: &str = "room number already exists";
pub const ROOM_OCCUPIED: &str = "room has an active allotment";

/// Body of `POST /api/v1/allotments`. Identifiers stay optional so missing fields surface as
/// validation errors rather than decoder rejections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AllotmentRequest {
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub room_id: Option<i64>,
}

/// Body of `POST /api/v1/allotments/:id/reassign`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReassignmentRequest {
    #[serde(default)]
    pub room_id: Option<i64>,
}

/// Body of `POST /api/v1/students`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnrollmentRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

/// Body of `POST /api/v1/room-types`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoomTypeRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub capacity: Option<i64>,
}

/// Body of `POST /api/v1/rooms`. The room joins the caller's hostel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoomRequest {
    #[serde(default)]
    pub room_number: String,
    #[serde(default)]
    pub room_type_id: Option<i64>,
}

/// Room desk operations over the student directory, room directory, and allotment ledger.
pub struct HostelService<R> {
    repository: Arc<R>,
}

impl<R> HostelService<R>
where
    R: HostelRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Assign a room to a student, inserting the allotment and flagging the room occupied in
    /// one transaction.
    pub fn allot_room(
        &self,
        request: AllotmentRequest,
        acting: &ActingContext,
    ) -> Result<AllotmentDetails, HostelServiceError> {
        acting.require_room_manager()?;
        let student_id = StudentId(positive_id(request.student_id, "student_id")?);
        let room_id = RoomId(positive_id(request.room_id, "room_id")?);
        let now = Utc::now();

        let details = self
            .repository
            .transaction(|tx| -> Result<AllotmentDetails, HostelServiceError> {
                let student = student_in_scope(tx, student_id, acting.hostel_id)?;
                if tx.active_allotment_for_student(student.id)?.is_some() {
                    return Err(HostelServiceError::Conflict(STUDENT_ALREADY_ASSIGNED));
                }
                let room = available_room_in_scope(tx, room_id, acting.hostel_id)?;
                let allotment = occupy(tx, &student, room, now)?;
                enrich(tx, &allotment)
            })?;

        info!(
            allotment_id = %details.id,
            student_id = %details.student_id,
            room_id = %details.room_id,
            hostel_id = %acting.hostel_id,
            acting_user = %acting.user_id,
            "room allotted"
        );
        Ok(details)
    }

    /// Deactivate an allotment and release its room in one transaction.
    pub fn vacate_room(
        &self,
        allotment_id: AllotmentId,
        acting: &ActingContext,
    ) -> Result<AllotmentDetails, HostelServiceError> {
        acting.require_room_manager()?;
        let now = Utc::now();

        let details = self
            .repository
            .transaction(|tx| -> Result<AllotmentDetails, HostelServiceError> {
                let allotment = allotment_in_scope(tx, allotment_id, acting.hostel_id)?;
                if !allotment.active {
                    return Err(HostelServiceError::Conflict(ALLOTMENT_ALREADY_VACATED));
                }
                let released = release(tx, allotment, now)?;
                enrich(tx, &released)
            })?;

        info!(
            allotment_id = %details.id,
            room_id = %details.room_id,
            hostel_id = %acting.hostel_id,
            acting_user = %acting.user_id,
            "room vacated"
        );
        Ok(details)
    }

    /// Move the student holding `allotment_id` to another room; the old allotment is closed
    /// and a new one opened in the same transaction.
    pub fn reassign_room(
        &self,
        allotment_id: AllotmentId,
        request: ReassignmentRequest,
        acting: &ActingContext,
    ) -> Result<AllotmentDetails, HostelServiceError> {
        acting.require_room_manager()?;
        let room_id = RoomId(positive_id(request.room_id, "room_id")?);
        let now = Utc::now();

        let details = self
            .repository
            .transaction(|tx| -> Result<AllotmentDetails, HostelServiceError> {
                let current = allotment_in_scope(tx, allotment_id, acting.hostel_id)?;
                if !current.active {
                    return Err(HostelServiceError::Conflict(ALLOTMENT_ALREADY_VACATED));
                }
                if current.room_id == room_id {
                    return Err(HostelServiceError::Conflict(ALREADY_IN_ROOM));
                }
                let student = student_in_scope(tx, current.student_id, acting.hostel_id)?;
                let target = available_room_in_scope(tx, room_id, acting.hostel_id)?;

                release(tx, current, now)?;
                let allotment = occupy(tx, &student, target, now)?;
                enrich(tx, &allotment)
            })?;

        info!(
            previous_allotment = %allotment_id,
            allotment_id = %details.id,
            room_id = %details.room_id,
            hostel_id = %acting.hostel_id,
            "room reassigned"
        );
        Ok(details)
    }

    pub fn list_available_rooms(
        &self,
        acting: &ActingContext,
    ) -> Result<Vec<RoomView>, HostelServiceError> {
        self.list_rooms(RoomFilter::available(), acting)
    }

    /// Active rooms of the caller's hostel, ordered by room number.
    pub fn list_rooms(
        &self,
        filter: RoomFilter,
        acting: &ActingContext,
    ) -> Result<Vec<RoomView>, HostelServiceError> {
        acting.require_room_manager()?;
        self.repository
            .read(|tx| -> Result<Vec<RoomView>, HostelServiceError> {
                let mut rooms: Vec<RoomRecord> = tx
                    .rooms()?
                    .into_iter()
                    .filter(|room| {
                        room.hostel_id == acting.hostel_id && room.active && filter.matches(room)
                    })
                    .collect();
                rooms.sort_by(|left, right| left.room_number.cmp(&right.room_number));
                rooms.iter().map(|room| room_view(tx, room)).collect()
            })
    }

    pub fn create_room_type(
        &self,
        request: RoomTypeRequest,
        acting: &ActingContext,
    ) -> Result<RoomTypeRecord, HostelServiceError> {
        acting.require_room_manager()?;
        let name = required_text(&request.name, "name")?;
        let capacity = capacity(request.capacity)?;

        let room_type = self
            .repository
            .transaction(|tx| -> Result<RoomTypeRecord, HostelServiceError> {
                Ok(tx.insert_room_type(NewRoomType { name, capacity })?)
            })?;

        info!(room_type_id = %room_type.id, capacity, "room type created");
        Ok(room_type)
    }

    /// Room types ordered by name. The catalogue is shared by every hostel.
    pub fn list_room_types(
        &self,
        acting: &ActingContext,
    ) -> Result<Vec<RoomTypeRecord>, HostelServiceError> {
        acting.require_room_manager()?;
        self.repository
            .read(|tx| -> Result<Vec<RoomTypeRecord>, HostelServiceError> {
                let mut room_types = tx.room_types()?;
                room_types.sort_by(|left, right| left.name.cmp(&right.name));
                Ok(room_types)
            })
    }

    /// Add an active, unoccupied room to the caller's hostel.
    pub fn create_room(
        &self,
        request: RoomRequest,
        acting: &ActingContext,
    ) -> Result<RoomView, HostelServiceError> {
        acting.require_room_manager()?;
        let room_number = required_text(&request.room_number, "room_number")?;
        let room_type_id = RoomTypeId(positive_id(request.room_type_id, "room_type_id")?);

        let view = self
            .repository
            .transaction(|tx| -> Result<RoomView, HostelServiceError> {
                if tx.room_type(room_type_id)?.is_none() {
                    return Err(HostelServiceError::NotFound(ROOM_TYPE_NOT_FOUND));
                }
                let room = tx.insert_room(NewRoom {
                    room_number,
                    hostel_id: acting.hostel_id,
                    room_type_id,
                })?;
                room_view(tx, &room)
            })?;

        info!(
            room_id = %view.id,
            room_number = %view.room_number,
            hostel_id = %acting.hostel_id,
            "room created"
        );
        Ok(view)
    }

    /// Take a room out of service. A room still holding an allotment must be vacated first.
    pub fn deactivate_room(
        &self,
        room_id: RoomId,
        acting: &ActingContext,
    ) -> Result<RoomView, HostelServiceError> {
        acting.require_room_manager()?;

        let view = self
            .repository
            .transaction(|tx| -> Result<RoomView, HostelServiceError> {
                let mut room = tx
                    .room(room_id)?
                    .filter(|room| room.hostel_id == acting.hostel_id)
                    .ok_or(HostelServiceError::NotFound(ROOM_NOT_IN_HOSTEL))?;
                if room.occupied || tx.active_allotment_for_room(room.id)?.is_some() {
                    return Err(HostelServiceError::Conflict(ROOM_OCCUPIED));
                }
                room.active = false;
                tx.update_room(room.clone())?;
                room_view(tx, &room)
            })?;

        info!(room_id = %view.id, hostel_id = %acting.hostel_id, "room deactivated");
        Ok(view)
    }

    pub fn enroll_student(
        &self,
        request: EnrollmentRequest,
        acting: &ActingContext,
    ) -> Result<StudentRecord, HostelServiceError> {
        acting.require_room_manager()?;
        let username = required_text(&request.username, "username")?;
        let email = match request.email.map(|email| email.trim().to_string()) {
            Some(email) if !email.is_empty() => email,
            _ => format!("{username}@hostel.com"),
        };

        let student = self
            .repository
            .transaction(|tx| -> Result<StudentRecord, HostelServiceError> {
                if tx.student_by_username(&username)?.is_some() {
                    return Err(HostelServiceError::Conflict(USERNAME_TAKEN));
                }
                Ok(tx.insert_student(NewStudent {
                    username: username.clone(),
                    email,
                    hostel_id: acting.hostel_id,
                    session_id: request.session_id,
                })?)
            })?;

        info!(student_id = %student.id, hostel_id = %acting.hostel_id, "student enrolled");
        Ok(student)
    }

    /// Students of the caller's hostel ordered by username.
    pub fn list_students(
        &self,
        filter: StudentFilter,
        acting: &ActingContext,
    ) -> Result<Vec<StudentRecord>, HostelServiceError> {
        acting.require_room_manager()?;
        self.repository
            .read(|tx| -> Result<Vec<StudentRecord>, HostelServiceError> {
                let mut students: Vec<StudentRecord> = tx
                    .students()?
                    .into_iter()
                    .filter(|student| {
                        student.hostel_id == acting.hostel_id
                            && student.role == Role::Student
                            && filter.matches(student)
                    })
                    .collect();
                students.sort_by(|left, right| left.username.cmp(&right.username));
                Ok(students)
            })
    }

    /// Soft-deactivate a student, vacating any room they hold in the same transaction.
    pub fn deactivate_student(
        &self,
        student_id: StudentId,
        acting: &ActingContext,
    ) -> Result<StudentRecord, HostelServiceError> {
        acting.require_room_manager()?;
        let now = Utc::now();

        let (student, vacated) = self.repository.transaction(
            |tx| -> Result<(StudentRecord, Option<AllotmentId>), HostelServiceError> {
                let mut student = student_in_scope(tx, student_id, acting.hostel_id)?;
                let vacated = match tx.active_allotment_for_student(student.id)? {
                    Some(allotment) => Some(release(tx, allotment, now)?.id),
                    None => None,
                };
                student.active = false;
                tx.update_student(student.clone())?;
                Ok((student, vacated))
            },
        )?;

        info!(
            student_id = %student.id,
            vacated_allotment = ?vacated.map(|id| id.0),
            hostel_id = %acting.hostel_id,
            "student deactivated"
        );
        Ok(student)
    }

    /// Allotments whose room belongs to the caller's hostel, newest first.
    pub fn list_allotments(
        &self,
        filter: AllotmentFilter,
        acting: &ActingContext,
    ) -> Result<Vec<AllotmentDetails>, HostelServiceError> {
        acting.require_room_manager()?;
        self.repository
            .read(|tx| -> Result<Vec<AllotmentDetails>, HostelServiceError> {
                let mut details = Vec::new();
                for allotment in tx.allotments()? {
                    if !filter.matches(&allotment) {
                        continue;
                    }
                    let in_scope = tx
                        .room(allotment.room_id)?
                        .is_some_and(|room| room.hostel_id == acting.hostel_id);
                    if in_scope {
                        details.push(enrich(tx, &allotment)?);
                    }
                }
                details.sort_by(|left, right| {
                    right
                        .allotment_date
                        .cmp(&left.allotment_date)
                        .then(right.id.cmp(&left.id))
                });
                Ok(details)
            })
    }

    /// Cross-check occupancy flags against the ledger across every hostel.
    pub fn audit(&self) -> Result<AuditReport, HostelServiceError> {
        Ok(self.repository.read(|tx| OccupancyAudit::run(tx))?)
    }
}

fn positive_id(raw: Option<i64>, field: &str) -> Result<i64, HostelServiceError> {
    match raw {
        Some(value) if value > 0 => Ok(value),
        Some(_) => Err(HostelServiceError::Validation(format!(
            "{field} must be a positive integer"
        ))),
        None => Err(HostelServiceError::Validation(format!("{field} is required"))),
    }
}

fn required_text(raw: &str, field: &str) -> Result<String, HostelServiceError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(HostelServiceError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn capacity(raw: Option<i64>) -> Result<u16, HostelServiceError> {
    let value = raw
        .ok_or_else(|| HostelServiceError::Validation("capacity is required".to_string()))?;
    match u16::try_from(value) {
        Ok(capacity) if capacity > 0 => Ok(capacity),
        _ => Err(HostelServiceError::Validation(format!(
            "capacity must be between 1 and {}",
            u16::MAX
        ))),
    }
}

fn student_in_scope(
    tx: &dyn HostelTransaction,
    id: StudentId,
    hostel_id: HostelId,
) -> Result<StudentRecord, HostelServiceError> {
    tx.student(id)?
        .filter(|student| {
            student.role == Role::Student && student.hostel_id == hostel_id && student.active
        })
        .ok_or(HostelServiceError::NotFound(STUDENT_NOT_IN_HOSTEL))
}

fn available_room_in_scope(
    tx: &dyn HostelTransaction,
    id: RoomId,
    hostel_id: HostelId,
) -> Result<RoomRecord, HostelServiceError> {
    let room = tx
        .room(id)?
        .filter(|room| room.hostel_id == hostel_id)
        .ok_or(HostelServiceError::NotFound(ROOM_NOT_IN_HOSTEL))?;
    if !room.is_available() || tx.active_allotment_for_room(room.id)?.is_some() {
        return Err(HostelServiceError::Conflict(ROOM_UNAVAILABLE));
    }
    Ok(room)
}

fn allotment_in_scope(
    tx: &dyn HostelTransaction,
    id: AllotmentId,
    hostel_id: HostelId,
) -> Result<AllotmentRecord, HostelServiceError> {
    let allotment = tx
        .allotment(id)?
        .ok_or(HostelServiceError::NotFound(ALLOTMENT_NOT_IN_HOSTEL))?;
    match tx.room(allotment.room_id)? {
        Some(room) if room.hostel_id == hostel_id => Ok(allotment),
        _ => Err(HostelServiceError::NotFound(ALLOTMENT_NOT_IN_HOSTEL)),
    }
}

/// `Available -> Occupied`: open an allotment and raise the room flag.
fn occupy(
    tx: &mut dyn HostelTransaction,
    student: &StudentRecord,
    mut room: RoomRecord,
    now: DateTime<Utc>,
) -> Result<AllotmentRecord, HostelServiceError> {
    let allotment = tx.insert_allotment(NewAllotment {
        student_id: student.id,
        room_id: room.id,
        allotment_date: now,
    })?;
    room.occupied = true;
    tx.update_room(room)?;
    Ok(allotment)
}

/// `Occupied -> Available`: close the allotment and clear the room flag.
fn release(
    tx: &mut dyn HostelTransaction,
    mut allotment: AllotmentRecord,
    now: DateTime<Utc>,
) -> Result<AllotmentRecord, HostelServiceError> {
    let mut room = tx
        .room(allotment.room_id)?
        .ok_or(RepositoryError::DanglingReference("room"))?;
    allotment.active = false;
    allotment.vacated_date = Some(now);
    tx.update_allotment(allotment.clone())?;
    room.occupied = false;
    tx.update_room(room)?;
    Ok(allotment)
}

fn room_view(tx: &dyn HostelTransaction, room: &RoomRecord) -> Result<RoomView, HostelServiceError> {
    let room_type = tx
        .room_type(room.room_type_id)?
        .ok_or(RepositoryError::DanglingReference("room type"))?;
    Ok(RoomView::new(room, &room_type))
}

fn enrich(
    tx: &dyn HostelTransaction,
    allotment: &AllotmentRecord,
) -> Result<AllotmentDetails, HostelServiceError> {
    let student = tx
        .student(allotment.student_id)?
        .ok_or(RepositoryError::DanglingReference("student"))?;
    let room = tx
        .room(allotment.room_id)?
        .ok_or(RepositoryError::DanglingReference("room"))?;
    Ok(AllotmentDetails::new(
        allotment,
        &student,
        room_view(tx, &room)?,
    ))
}

/// Error raised by the hostel service; each variant maps to one response class.
#[derive(Debug, thiserror::Error)]
pub enum HostelServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("role '{}' may not manage rooms", .0.label())]
    Forbidden(Role),
    #[error("storage failure: {0}")]
    Storage(RepositoryError),
}

impl From<RepositoryError> for HostelServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::UniqueViolation(UniqueConstraint::ActiveAllotmentPerStudent) => {
                Self::Conflict(STUDENT_ALREADY_ASSIGNED)
            }
            RepositoryError::UniqueViolation(UniqueConstraint::ActiveAllotmentPerRoom) => {
                Self::Conflict(ROOM_UNAVAILABLE)
            }
            RepositoryError::UniqueViolation(UniqueConstraint::Username) => {
                Self::Conflict(USERNAME_TAKEN)
            }
            RepositoryError::UniqueViolation(UniqueConstraint::RoomNumber) => {
                Self::Conflict(ROOM_NUMBER_TAKEN)
            }
            other => Self::Storage(other),
        }
    }
}
