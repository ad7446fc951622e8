//! Operation layer for Palisade
//!
//! High-level authorization operations over an injected
//! [`palisade_core::PolicyClient`]: record ownership and access grants,
//! permission checks and lookups ([`AccessService`]), and organization
//! provisioning plus schema publishing ([`ManagementService`]).

pub mod management;
pub mod service;

pub use management::ManagementService;
pub use service::AccessService;

#[cfg(test)]
mod tests;
