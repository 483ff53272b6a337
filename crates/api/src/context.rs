use jobrelay_auth::{PrincipalId, Role};
use jobrelay_core::OwnerId;

/// Principal context for a request (authenticated identity + roles).
///
/// Inserted by the auth middleware; the principal is the owner of every
/// job it creates or reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    owner_id: OwnerId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, owner_id: OwnerId, roles: Vec<Role>) -> Self {
        Self {
            principal_id,
            owner_id,
            roles,
        }
    }

    pub fn principal_id(&self) -> &PrincipalId {
        &self.principal_id
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}
