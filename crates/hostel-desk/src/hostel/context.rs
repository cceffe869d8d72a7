use super::domain::{HostelId, Role, UserId};
use super::service::HostelServiceError;

/// Identity of the caller as resolved by the authentication gateway.
///
/// Handlers never read the hostel scope from request bodies; every service call receives
/// this context explicitly instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingContext {
    pub user_id: UserId,
    pub hostel_id: HostelId,
    pub role: Role,
}

impl ActingContext {
    pub fn new(user_id: UserId, hostel_id: HostelId, role: Role) -> Self {
        Self {
            user_id,
            hostel_id,
            role,
        }
    }

    pub fn require_room_manager(&self) -> Result<(), HostelServiceError> {
        if self.role.manages_rooms() {
            Ok(())
        } else {
            Err(HostelServiceError::Forbidden(self.role))
        }
    }
}
