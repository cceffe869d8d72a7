//! Room desk for a hostel: student directory, room directory, and the allotment ledger that
//! keeps each room's occupied flag in step with its active allotment.

pub mod audit;
pub mod context;
pub mod domain;
pub mod filter;
pub mod memory;
pub mod repository;
pub mod router;
pub mod seed;
pub mod service;

#[cfg(test)]
mod tests;

pub use audit::{AuditReport, OccupancyAudit, OccupancyViolation};
pub use context::ActingContext;
pub use domain::{
    AllotmentDetails, AllotmentId, AllotmentRecord, HostelId, Role, RoomId, RoomRecord,
    RoomTypeId, RoomTypeRecord, RoomView, SessionId, StudentId, StudentRecord, UserId,
};
pub use filter::{AllotmentFilter, RoomFilter, StudentFilter};
pub use memory::InMemoryHostelRepository;
pub use repository::{HostelRepository, HostelTransaction, RepositoryError, UniqueConstraint};
pub use router::hostel_router;
pub use seed::{HostelSnapshot, SeedError};
pub use service::{
    AllotmentRequest, EnrollmentRequest, HostelService, HostelServiceError, ReassignmentRequest,
    RoomRequest, RoomTypeRequest,
};
