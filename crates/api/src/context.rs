use tradelane_auth::Principal;
use tradelane_core::{Actor, Role, UserId};

/// Principal context for a request (authenticated identity + role).
///
/// Inserted by the auth middleware; every protected handler extracts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            principal: Principal::from_role(user_id, role),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn role(&self) -> Role {
        self.principal.role
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// The caller as the domain sees it.
    pub fn actor(&self) -> Actor {
        self.principal.actor()
    }
}
