use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::audit::OccupancyAudit;
use super::domain::{
    AllotmentId, AllotmentRecord, NewAllotment, NewRoom, NewRoomType, NewStudent, Role, RoomId,
    RoomRecord, RoomTypeId, RoomTypeRecord, StudentId, StudentRecord,
};
use super::repository::{HostelRepository, HostelTransaction, RepositoryError, UniqueConstraint};
use super::seed::{HostelSnapshot, SeedError};

#[derive(Debug, Clone, Default)]
struct HostelState {
    students: BTreeMap<StudentId, StudentRecord>,
    room_types: BTreeMap<RoomTypeId, RoomTypeRecord>,
    rooms: BTreeMap<RoomId, RoomRecord>,
    allotments: BTreeMap<AllotmentId, AllotmentRecord>,
}

/// Process-local store. Transactions run against a private copy of the state that replaces
/// the shared state only on success, so a failed transaction leaves nothing behind.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHostelRepository {
    state: Arc<Mutex<HostelState>>,
}

impl InMemoryHostelRepository {
    /// Load a snapshot without checking occupancy consistency.
    pub fn import(snapshot: HostelSnapshot) -> Result<Self, SeedError> {
        let mut state = HostelState::default();

        for room_type in snapshot.room_types {
            let id = room_type.id;
            check_seed_id("room type", id.0)?;
            if state.room_types.insert(id, room_type).is_some() {
                return Err(SeedError::DuplicateId { kind: "room type", id: id.0 });
            }
        }
        for room in snapshot.rooms {
            if !state.room_types.contains_key(&room.room_type_id) {
                return Err(SeedError::UnknownReference {
                    kind: "room type",
                    id: room.room_type_id.0,
                });
            }
            let id = room.id;
            check_seed_id("room", id.0)?;
            if state.numbered_room_exists(&room) {
                return Err(SeedError::DuplicateRoomNumber {
                    hostel_id: room.hostel_id.0,
                    room_number: room.room_number,
                });
            }
            if state.rooms.insert(id, room).is_some() {
                return Err(SeedError::DuplicateId { kind: "room", id: id.0 });
            }
        }
        for student in snapshot.students {
            let id = student.id;
            check_seed_id("student", id.0)?;
            if state
                .students
                .values()
                .any(|existing| existing.username == student.username)
            {
                return Err(SeedError::DuplicateUsername(student.username));
            }
            if state.students.insert(id, student).is_some() {
                return Err(SeedError::DuplicateId { kind: "student", id: id.0 });
            }
        }
        for allotment in snapshot.allotments {
            if !state.students.contains_key(&allotment.student_id) {
                return Err(SeedError::UnknownReference {
                    kind: "student",
                    id: allotment.student_id.0,
                });
            }
            if !state.rooms.contains_key(&allotment.room_id) {
                return Err(SeedError::UnknownReference {
                    kind: "room",
                    id: allotment.room_id.0,
                });
            }
            let id = allotment.id;
            check_seed_id("allotment", id.0)?;
            if state.allotments.insert(id, allotment).is_some() {
                return Err(SeedError::DuplicateId { kind: "allotment", id: id.0 });
            }
        }

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Load a snapshot, rejecting it when occupancy flags disagree with the ledger.
    pub fn from_snapshot(snapshot: HostelSnapshot) -> Result<Self, SeedError> {
        let repository = Self::import(snapshot)?;
        let report = repository.read(|tx| OccupancyAudit::run(tx))?;
        if !report.is_consistent() {
            return Err(SeedError::Inconsistent(report));
        }
        Ok(repository)
    }

    pub fn snapshot(&self) -> Result<HostelSnapshot, RepositoryError> {
        let guard = self.lock();
        Ok(HostelSnapshot {
            room_types: guard.room_types.values().cloned().collect(),
            rooms: guard.rooms.values().cloned().collect(),
            students: guard.students.values().cloned().collect(),
            allotments: guard.allotments.values().cloned().collect(),
        })
    }

    /// Shared state is only ever replaced by a fully built copy, so a poisoned lock still
    /// guards a consistent state.
    fn lock(&self) -> MutexGuard<'_, HostelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HostelRepository for InMemoryHostelRepository {
    fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn HostelTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let guard = self.lock();
        work(&*guard)
    }

    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn HostelTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut guard = self.lock();
        let mut working = (*guard).clone();
        let value = work(&mut working)?;
        *guard = working;
        Ok(value)
    }
}

/// Seeded ids must leave room for at least one generated id after them.
fn check_seed_id(kind: &'static str, id: i64) -> Result<(), SeedError> {
    if id < 1 || id == i64::MAX {
        return Err(SeedError::InvalidId { kind, id });
    }
    Ok(())
}

fn next_key<K: Ord, V>(
    table: &BTreeMap<K, V>,
    raw: impl Fn(&K) -> i64,
) -> Result<i64, RepositoryError> {
    match table.keys().next_back() {
        None => Ok(1),
        Some(key) => raw(key)
            .checked_add(1)
            .ok_or_else(|| RepositoryError::Unavailable("identifier space exhausted".to_string())),
    }
}

impl HostelState {
    fn numbered_room_exists(&self, candidate: &RoomRecord) -> bool {
        self.rooms.values().any(|existing| {
            existing.id != candidate.id
                && existing.hostel_id == candidate.hostel_id
                && existing.room_number.eq_ignore_ascii_case(&candidate.room_number)
        })
    }

    fn conflicting_allotment(&self, candidate: &AllotmentRecord) -> Option<UniqueConstraint> {
        if !candidate.active {
            return None;
        }
        self.allotments
            .values()
            .filter(|existing| existing.active && existing.id != candidate.id)
            .find_map(|existing| {
                if existing.student_id == candidate.student_id {
                    Some(UniqueConstraint::ActiveAllotmentPerStudent)
                } else if existing.room_id == candidate.room_id {
                    Some(UniqueConstraint::ActiveAllotmentPerRoom)
                } else {
                    None
                }
            })
    }
}

impl HostelTransaction for HostelState {
    fn student(&self, id: StudentId) -> Result<Option<StudentRecord>, RepositoryError> {
        Ok(self.students.get(&id).cloned())
    }

    fn student_by_username(
        &self,
        username: &str,
    ) -> Result<Option<StudentRecord>, RepositoryError> {
        Ok(self
            .students
            .values()
            .find(|student| student.username == username)
            .cloned())
    }

    fn students(&self) -> Result<Vec<StudentRecord>, RepositoryError> {
        Ok(self.students.values().cloned().collect())
    }

    fn room(&self, id: RoomId) -> Result<Option<RoomRecord>, RepositoryError> {
        Ok(self.rooms.get(&id).cloned())
    }

    fn rooms(&self) -> Result<Vec<RoomRecord>, RepositoryError> {
        Ok(self.rooms.values().cloned().collect())
    }

    fn room_type(&self, id: RoomTypeId) -> Result<Option<RoomTypeRecord>, RepositoryError> {
        Ok(self.room_types.get(&id).cloned())
    }

    fn room_types(&self) -> Result<Vec<RoomTypeRecord>, RepositoryError> {
        Ok(self.room_types.values().cloned().collect())
    }

    fn allotment(&self, id: AllotmentId) -> Result<Option<AllotmentRecord>, RepositoryError> {
        Ok(self.allotments.get(&id).cloned())
    }

    fn allotments(&self) -> Result<Vec<AllotmentRecord>, RepositoryError> {
        Ok(self.allotments.values().cloned().collect())
    }

    fn active_allotment_for_student(
        &self,
        id: StudentId,
    ) -> Result<Option<AllotmentRecord>, RepositoryError> {
        Ok(self
            .allotments
            .values()
            .find(|allotment| allotment.active && allotment.student_id == id)
            .cloned())
    }

    fn active_allotment_for_room(
        &self,
        id: RoomId,
    ) -> Result<Option<AllotmentRecord>, RepositoryError> {
        Ok(self
            .allotments
            .values()
            .find(|allotment| allotment.active && allotment.room_id == id)
            .cloned())
    }

    fn insert_student(&mut self, student: NewStudent) -> Result<StudentRecord, RepositoryError> {
        if self
            .students
            .values()
            .any(|existing| existing.username == student.username)
        {
            return Err(RepositoryError::UniqueViolation(UniqueConstraint::Username));
        }

        let record = StudentRecord {
            id: StudentId(next_key(&self.students, |id| id.0)?),
            username: student.username,
            email: student.email,
            role: Role::Student,
            hostel_id: student.hostel_id,
            session_id: student.session_id,
            active: true,
        };
        self.students.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_student(&mut self, student: StudentRecord) -> Result<(), RepositoryError> {
        if !self.students.contains_key(&student.id) {
            return Err(RepositoryError::NotFound);
        }
        if self
            .students
            .values()
            .any(|existing| existing.id != student.id && existing.username == student.username)
        {
            return Err(RepositoryError::UniqueViolation(UniqueConstraint::Username));
        }
        self.students.insert(student.id, student);
        Ok(())
    }

    fn insert_room_type(
        &mut self,
        room_type: NewRoomType,
    ) -> Result<RoomTypeRecord, RepositoryError> {
        let record = RoomTypeRecord {
            id: RoomTypeId(next_key(&self.room_types, |id| id.0)?),
            name: room_type.name,
            capacity: room_type.capacity,
        };
        self.room_types.insert(record.id, record.clone());
        Ok(record)
    }

    fn insert_room(&mut self, room: NewRoom) -> Result<RoomRecord, RepositoryError> {
        if !self.room_types.contains_key(&room.room_type_id) {
            return Err(RepositoryError::DanglingReference("room type"));
        }

        let record = RoomRecord {
            id: RoomId(next_key(&self.rooms, |id| id.0)?),
            room_number: room.room_number,
            hostel_id: room.hostel_id,
            room_type_id: room.room_type_id,
            occupied: false,
            active: true,
        };
        if self.numbered_room_exists(&record) {
            return Err(RepositoryError::UniqueViolation(UniqueConstraint::RoomNumber));
        }
        self.rooms.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_room(&mut self, room: RoomRecord) -> Result<(), RepositoryError> {
        if self.numbered_room_exists(&room) {
            return Err(RepositoryError::UniqueViolation(UniqueConstraint::RoomNumber));
        }
        match self.rooms.get_mut(&room.id) {
            Some(slot) => {
                *slot = room;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn insert_allotment(
        &mut self,
        allotment: NewAllotment,
    ) -> Result<AllotmentRecord, RepositoryError> {
        if !self.students.contains_key(&allotment.student_id) {
            return Err(RepositoryError::DanglingReference("student"));
        }
        if !self.rooms.contains_key(&allotment.room_id) {
            return Err(RepositoryError::DanglingReference("room"));
        }

        let record = AllotmentRecord {
            id: AllotmentId(next_key(&self.allotments, |id| id.0)?),
            student_id: allotment.student_id,
            room_id: allotment.room_id,
            allotment_date: allotment.allotment_date,
            active: true,
            vacated_date: None,
        };
        if let Some(constraint) = self.conflicting_allotment(&record) {
            return Err(RepositoryError::UniqueViolation(constraint));
        }
        self.allotments.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_allotment(&mut self, allotment: AllotmentRecord) -> Result<(), RepositoryError> {
        if !self.allotments.contains_key(&allotment.id) {
            return Err(RepositoryError::NotFound);
        }
        if let Some(constraint) = self.conflicting_allotment(&allotment) {
            return Err(RepositoryError::UniqueViolation(constraint));
        }
        self.allotments.insert(allotment.id, allotment);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hostel::domain::HostelId;
    use chrono::{TimeZone, Utc};

    fn seeded() -> InMemoryHostelRepository {
        InMemoryHostelRepository::from_snapshot(HostelSnapshot {
            room_types: vec![RoomTypeRecord {
                id: RoomTypeId(1),
                name: "Single".to_string(),
                capacity: 1,
            }],
            rooms: vec![
                RoomRecord {
                    id: RoomId(1),
                    room_number: "A-101".to_string(),
                    hostel_id: HostelId(1),
                    room_type_id: RoomTypeId(1),
                    occupied: false,
                    active: true,
                },
                RoomRecord {
                    id: RoomId(2),
                    room_number: "A-102".to_string(),
                    hostel_id: HostelId(1),
                    room_type_id: RoomTypeId(1),
                    occupied: false,
                    active: true,
                },
            ],
            students: Vec::new(),
            allotments: Vec::new(),
        })
        .expect("seed is consistent")
    }

    fn new_student(username: &str) -> NewStudent {
        NewStudent {
            username: username.to_string(),
            email: format!("{username}@hostel.com"),
            hostel_id: HostelId(1),
            session_id: None,
        }
    }

    fn new_allotment(student_id: StudentId, room_id: RoomId) -> NewAllotment {
        NewAllotment {
            student_id,
            room_id,
            allotment_date: Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn identifiers_are_assigned_sequentially() {
        let repository = seeded();
        let (first, second) = repository
            .transaction(|tx| {
                let first = tx.insert_student(new_student("asha"))?;
                let second = tx.insert_student(new_student("bilal"))?;
                Ok::<_, RepositoryError>((first, second))
            })
            .expect("inserts succeed");

        assert_eq!(first.id, StudentId(1));
        assert_eq!(second.id, StudentId(2));
        assert_eq!(first.role, Role::Student);
        assert!(first.active);
    }

    #[test]
    fn failed_transactions_discard_their_writes() {
        let repository = seeded();
        let before = repository.snapshot().expect("snapshot");

        let result = repository.transaction(|tx| {
            tx.insert_student(new_student("asha"))?;
            Err::<(), _>(RepositoryError::Unavailable("disk full".to_string()))
        });

        assert!(matches!(result, Err(RepositoryError::Unavailable(_))));
        assert_eq!(repository.snapshot().expect("snapshot"), before);
    }

    #[test]
    fn ledger_rejects_a_second_active_allotment_for_a_room() {
        let repository = seeded();
        let result = repository.transaction(|tx| {
            let asha = tx.insert_student(new_student("asha"))?;
            let bilal = tx.insert_student(new_student("bilal"))?;
            tx.insert_allotment(new_allotment(asha.id, RoomId(1)))?;
            tx.insert_allotment(new_allotment(bilal.id, RoomId(1)))
        });

        assert!(matches!(
            result,
            Err(RepositoryError::UniqueViolation(
                UniqueConstraint::ActiveAllotmentPerRoom
            ))
        ));
    }

    #[test]
    fn ledger_rejects_a_second_active_allotment_for_a_student() {
        let repository = seeded();
        let result = repository.transaction(|tx| {
            let asha = tx.insert_student(new_student("asha"))?;
            tx.insert_allotment(new_allotment(asha.id, RoomId(1)))?;
            tx.insert_allotment(new_allotment(asha.id, RoomId(2)))
        });

        assert!(matches!(
            result,
            Err(RepositoryError::UniqueViolation(
                UniqueConstraint::ActiveAllotmentPerStudent
            ))
        ));
    }

    #[test]
    fn deactivated_allotments_free_the_constraint() {
        let repository = seeded();
        repository
            .transaction(|tx| {
                let asha = tx.insert_student(new_student("asha"))?;
                let mut first = tx.insert_allotment(new_allotment(asha.id, RoomId(1)))?;
                first.active = false;
                tx.update_allotment(first)?;
                tx.insert_allotment(new_allotment(asha.id, RoomId(1)))
            })
            .expect("room is free again after deactivation");
    }

    #[test]
    fn usernames_are_unique() {
        let repository = seeded();
        let result = repository.transaction(|tx| {
            tx.insert_student(new_student("asha"))?;
            tx.insert_student(new_student("asha"))
        });
        assert!(matches!(
            result,
            Err(RepositoryError::UniqueViolation(UniqueConstraint::Username))
        ));
    }

    #[test]
    fn import_rejects_duplicate_room_ids() {
        let mut snapshot = seeded().snapshot().expect("snapshot");
        let duplicate = snapshot.rooms[0].clone();
        snapshot.rooms.push(duplicate);

        match InMemoryHostelRepository::import(snapshot) {
            Err(SeedError::DuplicateId { kind, id }) => {
                assert_eq!(kind, "room");
                assert_eq!(id, 1);
            }
            other => panic!("expected duplicate id error, got {other:?}"),
        }
    }

    fn seeded_student(id: i64) -> StudentRecord {
        StudentRecord {
            id: StudentId(id),
            username: format!("seeded{id}"),
            email: format!("seeded{id}@hostel.com"),
            role: Role::Student,
            hostel_id: HostelId(1),
            session_id: None,
            active: true,
        }
    }

    #[test]
    fn import_rejects_ids_without_headroom() {
        let mut snapshot = seeded().snapshot().expect("snapshot");
        snapshot.students.push(seeded_student(i64::MAX));

        match InMemoryHostelRepository::from_snapshot(snapshot) {
            Err(SeedError::InvalidId { kind, id }) => {
                assert_eq!(kind, "student");
                assert_eq!(id, i64::MAX);
            }
            other => panic!("expected invalid id error, got {other:?}"),
        }

        let mut snapshot = seeded().snapshot().expect("snapshot");
        snapshot.rooms[1].id = RoomId(0);
        assert!(matches!(
            InMemoryHostelRepository::import(snapshot),
            Err(SeedError::InvalidId { kind: "room", id: 0 })
        ));
    }

    #[test]
    fn exhausted_identifier_space_is_an_error_not_an_overwrite() {
        let mut snapshot = seeded().snapshot().expect("snapshot");
        snapshot.students.push(seeded_student(i64::MAX - 1));
        let repository = InMemoryHostelRepository::from_snapshot(snapshot).expect("seed loads");

        let last = repository
            .transaction(|tx| tx.insert_student(new_student("asha")))
            .expect("last id is still free");
        assert_eq!(last.id, StudentId(i64::MAX));

        let result = repository.transaction(|tx| tx.insert_student(new_student("bilal")));
        assert!(matches!(result, Err(RepositoryError::Unavailable(_))));

        let students = repository.snapshot().expect("snapshot").students;
        assert_eq!(students.len(), 2);
        assert!(students.iter().any(|student| student.username == "asha"));
    }

    #[test]
    fn panicking_transaction_leaves_store_usable() {
        let repository = seeded();
        let before = repository.snapshot().expect("snapshot");

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = repository.transaction(|tx| {
                tx.insert_student(new_student("asha"))?;
                if tx.students()?.len() == 1 {
                    panic!("writer crashed mid-transaction");
                }
                Ok::<_, RepositoryError>(())
            });
        }));
        assert!(outcome.is_err());

        assert_eq!(repository.snapshot().expect("snapshot"), before);
        repository
            .transaction(|tx| tx.insert_student(new_student("bilal")))
            .expect("store accepts writes after the panic");
    }

    #[test]
    fn room_numbers_are_unique_within_a_hostel() {
        let repository = seeded();
        let duplicate = repository.transaction(|tx| {
            tx.insert_room(NewRoom {
                room_number: "a-101".to_string(),
                hostel_id: HostelId(1),
                room_type_id: RoomTypeId(1),
            })
        });
        assert!(matches!(
            duplicate,
            Err(RepositoryError::UniqueViolation(UniqueConstraint::RoomNumber))
        ));

        let elsewhere = repository
            .transaction(|tx| {
                tx.insert_room(NewRoom {
                    room_number: "A-101".to_string(),
                    hostel_id: HostelId(2),
                    room_type_id: RoomTypeId(1),
                })
            })
            .expect("other hostels may reuse the number");
        assert_eq!(elsewhere.id, RoomId(3));
        assert!(elsewhere.is_available());
    }

    #[test]
    fn rooms_need_a_known_room_type() {
        let repository = seeded();
        let result = repository.transaction(|tx| {
            let single = tx.insert_room_type(NewRoomType {
                name: "Triple".to_string(),
                capacity: 3,
            })?;
            assert_eq!(single.id, RoomTypeId(2));
            tx.insert_room(NewRoom {
                room_number: "A-201".to_string(),
                hostel_id: HostelId(1),
                room_type_id: RoomTypeId(9),
            })
        });
        assert!(matches!(
            result,
            Err(RepositoryError::DanglingReference("room type"))
        ));
        assert_eq!(repository.snapshot().expect("snapshot").room_types.len(), 1);
    }
}
