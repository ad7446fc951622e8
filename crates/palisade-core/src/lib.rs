//! Core domain types for the Palisade authorization layer
//!
//! This crate defines the vocabulary shared by every other Palisade crate:
//! the error taxonomy, object and subject references, the permission map,
//! the schema compiler, and the [`PolicyClient`] trait the operation layer
//! is written against. It is transport-free: the gRPC client lives in
//! `palisade-spicedb` and the operations in `palisade-authz`.

pub mod error;
pub mod ids;
pub mod models;
pub mod schema;
pub mod traits;

pub use error::*;
pub use ids::*;
pub use models::*;
pub use schema::*;
pub use traits::*;
