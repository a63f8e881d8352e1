//! `brewforce-auth`: identity as handed over by the authentication collaborator.
//!
//! Token validation and login bookkeeping happen elsewhere; this crate only
//! models the already-authenticated `(username, role)` pair and the access
//! rules the order engine applies to it.

pub mod principal;
pub mod roles;

pub use principal::Principal;
pub use roles::Role;
