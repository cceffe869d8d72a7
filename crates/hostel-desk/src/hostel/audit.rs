use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::domain::{AllotmentId, HostelId, RoomId, StudentId};
use super::repository::{HostelTransaction, RepositoryError};

/// A place where room flags and the allotment ledger disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OccupancyViolation {
    OccupiedWithoutAllotment {
        room_id: RoomId,
    },
    AllotmentOnVacantRoom {
        room_id: RoomId,
        allotment_id: AllotmentId,
    },
    RoomOverbooked {
        room_id: RoomId,
        allotments: Vec<AllotmentId>,
    },
    StudentDoubleBooked {
        student_id: StudentId,
        allotments: Vec<AllotmentId>,
    },
    DanglingAllotment {
        allotment_id: AllotmentId,
    },
    CrossHostelAllotment {
        allotment_id: AllotmentId,
        student_hostel: HostelId,
        room_hostel: HostelId,
    },
}

impl fmt::Display for OccupancyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OccupancyViolation::OccupiedWithoutAllotment { room_id } => {
                write!(f, "room {room_id} is flagged occupied but has no active allotment")
            }
            OccupancyViolation::AllotmentOnVacantRoom {
                room_id,
                allotment_id,
            } => write!(
                f,
                "allotment {allotment_id} is active but room {room_id} is flagged vacant"
            ),
            OccupancyViolation::RoomOverbooked {
                room_id,
                allotments,
            } => write!(
                f,
                "room {room_id} holds {} active allotments",
                allotments.len()
            ),
            OccupancyViolation::StudentDoubleBooked {
                student_id,
                allotments,
            } => write!(
                f,
                "student {student_id} holds {} active allotments",
                allotments.len()
            ),
            OccupancyViolation::DanglingAllotment { allotment_id } => write!(
                f,
                "allotment {allotment_id} references a missing student or room"
            ),
            OccupancyViolation::CrossHostelAllotment {
                allotment_id,
                student_hostel,
                room_hostel,
            } => write!(
                f,
                "allotment {allotment_id} places a hostel {student_hostel} student in a hostel {room_hostel} room"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub rooms_checked: usize,
    pub allotments_checked: usize,
    pub violations: Vec<OccupancyViolation>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Cross-checks room occupancy flags against active allotments.
pub struct OccupancyAudit;

impl OccupancyAudit {
    pub fn run(ledger: &dyn HostelTransaction) -> Result<AuditReport, RepositoryError> {
        let rooms = ledger.rooms()?;
        let allotments = ledger.allotments()?;
        let students: BTreeMap<StudentId, HostelId> = ledger
            .students()?
            .into_iter()
            .map(|student| (student.id, student.hostel_id))
            .collect();
        let room_hostels: BTreeMap<RoomId, HostelId> =
            rooms.iter().map(|room| (room.id, room.hostel_id)).collect();

        let mut violations = Vec::new();
        let mut by_room: BTreeMap<RoomId, Vec<AllotmentId>> = BTreeMap::new();
        let mut by_student: BTreeMap<StudentId, Vec<AllotmentId>> = BTreeMap::new();

        for allotment in allotments.iter().filter(|allotment| allotment.active) {
            let (Some(&room_hostel), Some(&student_hostel)) = (
                room_hostels.get(&allotment.room_id),
                students.get(&allotment.student_id),
            ) else {
                violations.push(OccupancyViolation::DanglingAllotment {
                    allotment_id: allotment.id,
                });
                continue;
            };
            if room_hostel != student_hostel {
                violations.push(OccupancyViolation::CrossHostelAllotment {
                    allotment_id: allotment.id,
                    student_hostel,
                    room_hostel,
                });
            }
            by_room
                .entry(allotment.room_id)
                .or_default()
                .push(allotment.id);
            by_student
                .entry(allotment.student_id)
                .or_default()
                .push(allotment.id);
        }

        for room in &rooms {
            let held = by_room.get(&room.id).map(Vec::as_slice).unwrap_or_default();
            match (room.occupied, held) {
                (true, []) => {
                    violations.push(OccupancyViolation::OccupiedWithoutAllotment { room_id: room.id })
                }
                (false, [first, ..]) => violations.push(OccupancyViolation::AllotmentOnVacantRoom {
                    room_id: room.id,
                    allotment_id: *first,
                }),
                _ => {}
            }
            if held.len() > 1 {
                violations.push(OccupancyViolation::RoomOverbooked {
                    room_id: room.id,
                    allotments: held.to_vec(),
                });
            }
        }

        for (student_id, held) in by_student {
            if held.len() > 1 {
                violations.push(OccupancyViolation::StudentDoubleBooked {
                    student_id,
                    allotments: held,
                });
            }
        }

        Ok(AuditReport {
            rooms_checked: rooms.len(),
            allotments_checked: allotments.len(),
            violations,
        })
    }
}
