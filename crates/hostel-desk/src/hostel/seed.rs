//! JSON snapshots used to hydrate the in-memory store, typically exported from the legacy
//! warden database.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::audit::AuditReport;
use super::domain::{AllotmentRecord, RoomRecord, RoomTypeRecord, StudentRecord};
use super::repository::RepositoryError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostelSnapshot {
    #[serde(default)]
    pub room_types: Vec<RoomTypeRecord>,
    #[serde(default)]
    pub rooms: Vec<RoomRecord>,
    #[serde(default)]
    pub students: Vec<StudentRecord>,
    #[serde(default)]
    pub allotments: Vec<AllotmentRecord>,
}

impl HostelSnapshot {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SeedError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SeedError> {
        Ok(serde_json::from_reader(reader)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read hostel seed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hostel seed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("seed contains {kind} {id} more than once")]
    DuplicateId { kind: &'static str, id: i64 },
    #[error("seed {kind} id {id} is outside 1..{max}", max = i64::MAX)]
    InvalidId { kind: &'static str, id: i64 },
    #[error("seed contains room number '{room_number}' more than once in hostel {hostel_id}")]
    DuplicateRoomNumber { hostel_id: i64, room_number: String },
    #[error("seed contains username '{0}' more than once")]
    DuplicateUsername(String),
    #[error("seed references unknown {kind} {id}")]
    UnknownReference { kind: &'static str, id: i64 },
    #[error("seed has {} room occupancy violation(s)", .0.violations.len())]
    Inconsistent(AuditReport),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
