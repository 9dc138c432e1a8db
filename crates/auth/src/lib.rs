//! Authentication and authorization boundary.
//!
//! Decoupled from HTTP and from the event store: token verification, the
//! role→permission policy, and the user directory capability.

pub mod authorize;
pub mod claims;
pub mod directory;
pub mod jwt;
pub mod permissions;
pub mod policy;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use directory::{
    DirectoryError, InMemoryUserDirectory, LegacyUserRecord, UserDirectory, UserRecord,
};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use policy::permissions_for;
