use std::fmt;

use super::domain::{
    AllotmentId, AllotmentRecord, NewAllotment, NewRoom, NewRoomType, NewStudent, RoomId,
    RoomRecord, RoomTypeId, RoomTypeRecord, StudentId, StudentRecord,
};

/// Read/write view over students, rooms, and the allotment ledger inside one transaction.
///
/// Implementations must enforce the ledger's uniqueness rules on every write, independently
/// of the checks the service performs: at most one active allotment per student, at most one
/// active allotment per room, unique usernames, and unique room numbers within a hostel.
pub trait HostelTransaction {
    fn student(&self, id: StudentId) -> Result<Option<StudentRecord>, RepositoryError>;
    fn student_by_username(&self, username: &str)
        -> Result<Option<StudentRecord>, RepositoryError>;
    fn students(&self) -> Result<Vec<StudentRecord>, RepositoryError>;

    fn room(&self, id: RoomId) -> Result<Option<RoomRecord>, RepositoryError>;
    fn rooms(&self) -> Result<Vec<RoomRecord>, RepositoryError>;
    fn room_type(&self, id: RoomTypeId) -> Result<Option<RoomTypeRecord>, RepositoryError>;
    fn room_types(&self) -> Result<Vec<RoomTypeRecord>, RepositoryError>;

    fn allotment(&self, id: AllotmentId) -> Result<Option<AllotmentRecord>, RepositoryError>;
    fn allotments(&self) -> Result<Vec<AllotmentRecord>, RepositoryError>;
    fn active_allotment_for_student(
        &self,
        id: StudentId,
    ) -> Result<Option<AllotmentRecord>, RepositoryError>;
    fn active_allotment_for_room(
        &self,
        id: RoomId,
    ) -> Result<Option<AllotmentRecord>, RepositoryError>;

    fn insert_student(&mut self, student: NewStudent) -> Result<StudentRecord, RepositoryError>;
    fn update_student(&mut self, student: StudentRecord) -> Result<(), RepositoryError>;
    fn insert_room_type(
        &mut self,
        room_type: NewRoomType,
    ) -> Result<RoomTypeRecord, RepositoryError>;
    fn insert_room(&mut self, room: NewRoom) -> Result<RoomRecord, RepositoryError>;
    fn update_room(&mut self, room: RoomRecord) -> Result<(), RepositoryError>;
    fn insert_allotment(
        &mut self,
        allotment: NewAllotment,
    ) -> Result<AllotmentRecord, RepositoryError>;
    fn update_allotment(&mut self, allotment: AllotmentRecord) -> Result<(), RepositoryError>;
}

/// Storage abstraction so the service module can be exercised in isolation.
///
/// `transaction` runs `work` with exclusive access and commits its writes only when it
/// returns `Ok`; an `Err` discards every write made inside the closure.
pub trait HostelRepository: Send + Sync {
    fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn HostelTransaction) -> Result<T, E>,
        E: From<RepositoryError>;

    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn HostelTransaction) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Storage-level uniqueness rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueConstraint {
    ActiveAllotmentPerStudent,
    ActiveAllotmentPerRoom,
    Username,
    RoomNumber,
}

impl fmt::Display for UniqueConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UniqueConstraint::ActiveAllotmentPerStudent => "one active allotment per student",
            UniqueConstraint::ActiveAllotmentPerRoom => "one active allotment per room",
            UniqueConstraint::Username => "unique username",
            UniqueConstraint::RoomNumber => "unique room number per hostel",
        };
        f.write_str(name)
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("constraint violated: {0}")]
    UniqueViolation(UniqueConstraint),
    #[error("record not found")]
    NotFound,
    #[error("dangling reference to {0}")]
    DanglingReference(&'static str),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
