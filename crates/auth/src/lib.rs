//! `jobrelay-auth` — boundary identity for the job relay.
//!
//! Token signatures are verified here; everything else about identity
//! (issuing, user management) belongs to the external identity provider.
//! This crate is intentionally decoupled from HTTP and storage.

pub mod claims;
pub mod jwt;
pub mod principal;
pub mod roles;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use principal::{EmptyPrincipalId, PrincipalId};
pub use roles::Role;
