//! Typed list criteria. Every field is optional and an absent field matches everything.

use serde::Deserialize;

use super::domain::{
    AllotmentRecord, RoomId, RoomRecord, RoomTypeId, SessionId, StudentId, StudentRecord,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoomFilter {
    pub available: Option<bool>,
    pub room_type_id: Option<RoomTypeId>,
}

impl RoomFilter {
    pub fn available() -> Self {
        Self {
            available: Some(true),
            ..Self::default()
        }
    }

    pub fn matches(&self, room: &RoomRecord) -> bool {
        if let Some(available) = self.available {
            if room.occupied == available {
                return false;
            }
        }
        if let Some(room_type_id) = self.room_type_id {
            if room.room_type_id != room_type_id {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StudentFilter {
    pub active: Option<bool>,
    pub session_id: Option<SessionId>,
    /// Case-insensitive substring of the username.
    pub username: Option<String>,
}

impl StudentFilter {
    pub fn matches(&self, student: &StudentRecord) -> bool {
        if let Some(active) = self.active {
            if student.active != active {
                return false;
            }
        }
        if let Some(session_id) = self.session_id {
            if student.session_id != Some(session_id) {
                return false;
            }
        }
        if let Some(fragment) = self.username.as_deref() {
            let fragment = fragment.trim().to_lowercase();
            if !fragment.is_empty() && !student.username.to_lowercase().contains(&fragment) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AllotmentFilter {
    pub active: Option<bool>,
    pub student_id: Option<StudentId>,
    pub room_id: Option<RoomId>,
}

impl AllotmentFilter {
    pub fn matches(&self, allotment: &AllotmentRecord) -> bool {
        self.active.map_or(true, |active| allotment.active == active)
            && self
                .student_id
                .map_or(true, |student_id| allotment.student_id == student_id)
            && self.room_id.map_or(true, |room_id| allotment.room_id == room_id)
    }
}
