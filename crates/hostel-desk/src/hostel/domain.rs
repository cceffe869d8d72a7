use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Tenant boundary; every query is scoped to one hostel.
    HostelId
);
record_id!(
    /// Authenticated account acting on a request.
    UserId
);
record_id!(StudentId);
record_id!(RoomId);
record_id!(RoomTypeId);
record_id!(AllotmentId);
record_id!(
    /// Academic session a student was enrolled for.
    SessionId
);

/// Account roles resolved by the authentication gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Warden,
    Mess,
    Student,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "warden" => Some(Self::Warden),
            "mess" => Some(Self::Mess),
            "student" => Some(Self::Student),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Warden => "warden",
            Role::Mess => "mess",
            Role::Student => "student",
        }
    }

    /// Wardens run the room desk; admins may stand in for them.
    pub const fn manages_rooms(self) -> bool {
        matches!(self, Role::Admin | Role::Warden)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: StudentId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub hostel_id: HostelId,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub active: bool,
}

impl StudentRecord {
    pub fn summary(&self) -> StudentSummary {
        StudentSummary {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTypeRecord {
    pub id: RoomTypeId,
    pub name: String,
    pub capacity: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: RoomId,
    pub room_number: String,
    pub hostel_id: HostelId,
    pub room_type_id: RoomTypeId,
    pub occupied: bool,
    pub active: bool,
}

impl RoomRecord {
    pub fn is_available(&self) -> bool {
        self.active && !self.occupied
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllotmentRecord {
    pub id: AllotmentId,
    pub student_id: StudentId,
    pub room_id: RoomId,
    pub allotment_date: DateTime<Utc>,
    pub active: bool,
    #[serde(default)]
    pub vacated_date: Option<DateTime<Utc>>,
}

/// Insert payload for the student directory; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub username: String,
    pub email: String,
    pub hostel_id: HostelId,
    pub session_id: Option<SessionId>,
}

/// Insert payload for the room type catalogue; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoomType {
    pub name: String,
    pub capacity: u16,
}

/// Insert payload for the room directory. New rooms start active and unoccupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub room_number: String,
    pub hostel_id: HostelId,
    pub room_type_id: RoomTypeId,
}

/// Insert payload for the allotment ledger; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAllotment {
    pub student_id: StudentId,
    pub room_id: RoomId,
    pub allotment_date: DateTime<Utc>,
}

/// Student fields exposed alongside an allotment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub id: StudentId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTypeView {
    pub id: RoomTypeId,
    pub name: String,
    pub capacity: u16,
}

impl From<&RoomTypeRecord> for RoomTypeView {
    fn from(record: &RoomTypeRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            capacity: record.capacity,
        }
    }
}

/// Room joined with its type, as listed on the allotment desk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    pub id: RoomId,
    pub room_number: String,
    pub occupied: bool,
    pub active: bool,
    pub room_type: RoomTypeView,
}

impl RoomView {
    pub fn new(room: &RoomRecord, room_type: &RoomTypeRecord) -> Self {
        Self {
            id: room.id,
            room_number: room.room_number.clone(),
            occupied: room.occupied,
            active: room.active,
            room_type: RoomTypeView::from(room_type),
        }
    }
}

/// Allotment enriched with the student and room it binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllotmentDetails {
    pub id: AllotmentId,
    pub student_id: StudentId,
    pub room_id: RoomId,
    pub allotment_date: DateTime<Utc>,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vacated_date: Option<DateTime<Utc>>,
    pub student: StudentSummary,
    pub room: RoomView,
}

impl AllotmentDetails {
    pub fn new(allotment: &AllotmentRecord, student: &StudentRecord, room: RoomView) -> Self {
        Self {
            id: allotment.id,
            student_id: allotment.student_id,
            room_id: allotment.room_id,
            allotment_date: allotment.allotment_date,
            active: allotment.active,
            vacated_date: allotment.vacated_date,
            student: student.summary(),
            room,
        }
    }
}
