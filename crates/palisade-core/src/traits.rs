//! Service traits implemented by policy-store backends

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Consistency, ObjectRef, Permissionship, Relationship, RelationshipFilter, RelationshipUpdate,
    SubjectRef,
};

/// Transport-level client for a relationship-based policy store.
///
/// The operation layer is written entirely against this trait; production
/// wires in the gRPC client, tests wire in a mock. Implementations must be
/// shareable across tasks (`Send + Sync`) so services can hold them behind
/// an `Arc`.
#[async_trait]
pub trait PolicyClient: Send + Sync {
    /// Applies a batch of relationship updates atomically.
    async fn write_relationships(&self, updates: Vec<RelationshipUpdate>) -> Result<()>;

    /// Evaluates whether `subject` holds `permission` on `resource`.
    async fn check_permission(
        &self,
        resource: &ObjectRef,
        permission: &str,
        subject: &SubjectRef,
        consistency: Consistency,
    ) -> Result<Permissionship>;

    /// Enumerates ids of subjects of `subject_type` holding `permission`
    /// on `resource`, with indirect memberships expanded.
    async fn lookup_subjects(
        &self,
        resource: &ObjectRef,
        permission: &str,
        subject_type: &str,
        consistency: Consistency,
    ) -> Result<Vec<String>>;

    /// Streams back the stored relationships matching `filter`.
    async fn read_relationships(
        &self,
        filter: &RelationshipFilter,
        consistency: Consistency,
    ) -> Result<Vec<Relationship>>;

    /// Replaces the authorization schema with `schema`.
    async fn write_schema(&self, schema: &str) -> Result<()>;

    /// Returns the schema text currently held by the policy store.
    async fn read_schema(&self) -> Result<String>;
}

/// Application records that can be placed under policy control.
///
/// `type_label` is the caller-facing label (a class path such as
/// `Admin::Invoice` is fine); the normalizer derives the schema object type
/// from it. `record_id` must be stable for the lifetime of the record. The
/// `Send + Sync` bound lets trait objects cross await points in the
/// operation layer.
pub trait PolicyRecord: Send + Sync {
    fn type_label(&self) -> &str;
    fn record_id(&self) -> String;
}
