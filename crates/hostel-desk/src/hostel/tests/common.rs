use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::hostel::context::ActingContext;
use crate::hostel::domain::{
    AllotmentId, AllotmentRecord, HostelId, NewAllotment, NewRoom, NewRoomType, NewStudent, Role,
    RoomId, RoomRecord, RoomTypeId, RoomTypeRecord, StudentId, StudentRecord, UserId,
};
use crate::hostel::memory::InMemoryHostelRepository;
use crate::hostel::repository::{HostelRepository, HostelTransaction, RepositoryError};
use crate::hostel::router::{HOSTEL_ID_HEADER, ROLE_HEADER, USER_ID_HEADER};
use crate::hostel::seed::HostelSnapshot;
use crate::hostel::service::{AllotmentRequest, HostelService};

pub(super) const NORTH: HostelId = HostelId(1);
pub(super) const SOUTH: HostelId = HostelId(2);

pub(super) const ASHA: StudentId = StudentId(1);
pub(super) const BILAL: StudentId = StudentId(2);
pub(super) const CHEN_INACTIVE: StudentId = StudentId(3);
pub(super) const DEVI_HOUSED: StudentId = StudentId(4);
pub(super) const EMEKA_SOUTH: StudentId = StudentId(5);

/// North block, free, numbered after `FREE_TWIN` so ordering is observable.
pub(super) const FREE_SINGLE: RoomId = RoomId(1);
pub(super) const FREE_TWIN: RoomId = RoomId(2);
pub(super) const CLOSED_ROOM: RoomId = RoomId(3);
pub(super) const SOUTH_FREE: RoomId = RoomId(4);
pub(super) const DEVI_ROOM: RoomId = RoomId(5);
pub(super) const SOUTH_OCCUPIED: RoomId = RoomId(6);

pub(super) const DEVI_ALLOTMENT: AllotmentId = AllotmentId(1);

fn room(id: RoomId, number: &str, hostel_id: HostelId, kind: i64, occupied: bool) -> RoomRecord {
    RoomRecord {
        id,
        room_number: number.to_string(),
        hostel_id,
        room_type_id: RoomTypeId(kind),
        occupied,
        active: true,
    }
}

fn student(id: StudentId, username: &str, hostel_id: HostelId, active: bool) -> StudentRecord {
    StudentRecord {
        id,
        username: username.to_string(),
        email: format!("{username}@hostel.com"),
        role: Role::Student,
        hostel_id,
        session_id: None,
        active,
    }
}

fn allotment(id: AllotmentId, student_id: StudentId, room_id: RoomId) -> AllotmentRecord {
    AllotmentRecord {
        id,
        student_id,
        room_id,
        allotment_date: Utc.with_ymd_and_hms(2025, 7, 14, 10, 0, 0).unwrap(),
        active: true,
        vacated_date: None,
    }
}

pub(super) fn snapshot() -> HostelSnapshot {
    let mut closed = room(CLOSED_ROOM, "A-103", NORTH, 1, false);
    closed.active = false;

    HostelSnapshot {
        room_types: vec![
            RoomTypeRecord {
                id: RoomTypeId(1),
                name: "Single".to_string(),
                capacity: 1,
            },
            RoomTypeRecord {
                id: RoomTypeId(2),
                name: "Twin".to_string(),
                capacity: 2,
            },
        ],
        rooms: vec![
            room(FREE_SINGLE, "A-102", NORTH, 1, false),
            room(FREE_TWIN, "A-101", NORTH, 2, false),
            closed,
            room(SOUTH_FREE, "S-201", SOUTH, 1, false),
            room(DEVI_ROOM, "A-104", NORTH, 2, true),
            room(SOUTH_OCCUPIED, "S-202", SOUTH, 1, true),
        ],
        students: vec![
            student(ASHA, "asha", NORTH, true),
            student(BILAL, "bilal", NORTH, true),
            student(CHEN_INACTIVE, "chen", NORTH, false),
            student(DEVI_HOUSED, "devi", NORTH, true),
            student(EMEKA_SOUTH, "emeka", SOUTH, true),
            student(StudentId(6), "farah", SOUTH, true),
        ],
        allotments: vec![
            allotment(DEVI_ALLOTMENT, DEVI_HOUSED, DEVI_ROOM),
            allotment(AllotmentId(2), StudentId(6), SOUTH_OCCUPIED),
        ],
    }
}

pub(super) fn repository() -> InMemoryHostelRepository {
    InMemoryHostelRepository::from_snapshot(snapshot()).expect("fixture is consistent")
}

pub(super) fn build_service() -> (
    HostelService<InMemoryHostelRepository>,
    Arc<InMemoryHostelRepository>,
) {
    let repository = Arc::new(repository());
    let service = HostelService::new(repository.clone());
    (service, repository)
}

pub(super) fn warden() -> ActingContext {
    ActingContext::new(UserId(90), NORTH, Role::Warden)
}

pub(super) fn south_warden() -> ActingContext {
    ActingContext::new(UserId(91), SOUTH, Role::Warden)
}

pub(super) fn mess_manager() -> ActingContext {
    ActingContext::new(UserId(92), NORTH, Role::Mess)
}

pub(super) fn allot(student_id: StudentId, room_id: RoomId) -> AllotmentRequest {
    AllotmentRequest {
        student_id: Some(student_id.0),
        room_id: Some(room_id.0),
    }
}

pub(super) fn room_state(repository: &InMemoryHostelRepository, id: RoomId) -> RoomRecord {
    repository
        .snapshot()
        .expect("snapshot")
        .rooms
        .into_iter()
        .find(|room| room.id == id)
        .expect("room exists")
}

pub(super) fn active_allotments_for_room(
    repository: &InMemoryHostelRepository,
    id: RoomId,
) -> usize {
    repository
        .snapshot()
        .expect("snapshot")
        .allotments
        .iter()
        .filter(|allotment| allotment.active && allotment.room_id == id)
        .count()
}

pub(super) fn assert_consistent(service: &HostelService<impl HostelRepository + 'static>) {
    let report = service.audit().expect("audit runs");
    assert!(
        report.is_consistent(),
        "occupancy invariant broken: {:?}",
        report.violations
    );
}

pub(super) fn json_request(
    method: Method,
    uri: &str,
    acting: Option<ActingContext>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(acting) = acting {
        builder = builder
            .header(USER_ID_HEADER, acting.user_id.0.to_string())
            .header(HOSTEL_ID_HEADER, acting.hostel_id.0.to_string())
            .header(ROLE_HEADER, acting.role.label());
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&value).expect("serialize body"))
        }
        None => Body::empty(),
    };
    builder.body(body).expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Repository whose transactions fail on the room write, after the ledger insert.
pub(super) struct FailingRoomWrites {
    pub(super) inner: InMemoryHostelRepository,
}

impl HostelRepository for FailingRoomWrites {
    fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn HostelTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        self.inner.read(work)
    }

    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn HostelTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        self.inner
            .transaction(|tx| work(&mut FailingRoomWritesTx { inner: tx }))
    }
}

struct FailingRoomWritesTx<'a> {
    inner: &'a mut dyn HostelTransaction,
}

impl HostelTransaction for FailingRoomWritesTx<'_> {
    fn student(&self, id: StudentId) -> Result<Option<StudentRecord>, RepositoryError> {
        self.inner.student(id)
    }

    fn student_by_username(
        &self,
        username: &str,
    ) -> Result<Option<StudentRecord>, RepositoryError> {
        self.inner.student_by_username(username)
    }

    fn students(&self) -> Result<Vec<StudentRecord>, RepositoryError> {
        self.inner.students()
    }

    fn room(&self, id: RoomId) -> Result<Option<RoomRecord>, RepositoryError> {
        self.inner.room(id)
    }

    fn rooms(&self) -> Result<Vec<RoomRecord>, RepositoryError> {
        self.inner.rooms()
    }

    fn room_type(&self, id: RoomTypeId) -> Result<Option<RoomTypeRecord>, RepositoryError> {
        self.inner.room_type(id)
    }

    fn room_types(&self) -> Result<Vec<RoomTypeRecord>, RepositoryError> {
        self.inner.room_types()
    }

    fn allotment(&self, id: AllotmentId) -> Result<Option<AllotmentRecord>, RepositoryError> {
        self.inner.allotment(id)
    }

    fn allotments(&self) -> Result<Vec<AllotmentRecord>, RepositoryError> {
        self.inner.allotments()
    }

    fn active_allotment_for_student(
        &self,
        id: StudentId,
    ) -> Result<Option<AllotmentRecord>, RepositoryError> {
        self.inner.active_allotment_for_student(id)
    }

    fn active_allotment_for_room(
        &self,
        id: RoomId,
    ) -> Result<Option<AllotmentRecord>, RepositoryError> {
        self.inner.active_allotment_for_room(id)
    }

    fn insert_student(&mut self, student: NewStudent) -> Result<StudentRecord, RepositoryError> {
        self.inner.insert_student(student)
    }

    fn update_student(&mut self, student: StudentRecord) -> Result<(), RepositoryError> {
        self.inner.update_student(student)
    }

    fn insert_room_type(
        &mut self,
        room_type: NewRoomType,
    ) -> Result<RoomTypeRecord, RepositoryError> {
        self.inner.insert_room_type(room_type)
    }

    fn insert_room(&mut self, room: NewRoom) -> Result<RoomRecord, RepositoryError> {
        self.inner.insert_room(room)
    }

    fn update_room(&mut self, _room: RoomRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("disk offline".to_string()))
    }

    fn insert_allotment(
        &mut self,
        allotment: NewAllotment,
    ) -> Result<AllotmentRecord, RepositoryError> {
        self.inner.insert_allotment(allotment)
    }

    fn update_allotment(&mut self, allotment: AllotmentRecord) -> Result<(), RepositoryError> {
        self.inner.update_allotment(allotment)
    }
}

pub(super) struct UnavailableRepository;

impl HostelRepository for UnavailableRepository {
    fn read<T, E, F>(&self, _work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn HostelTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }

    fn transaction<T, E, F>(&self, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn HostelTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }
}
