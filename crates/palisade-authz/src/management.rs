//! Organization provisioning operations
//!
//! Role and group lifecycle, role permission grants, membership edits,
//! and schema publishing. Grants are validated against the configured
//! permission map before anything is sent to the policy service.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use palisade_core::{
    compile_schema, object_types, product_permission, relations, ObjectRef, PalisadeError,
    PermissionMap, PolicyClient, Relationship, RelationshipUpdate, Result, SubjectRef,
};

/// Provisioning operations scoped to the configured permission map.
///
/// Cloning is cheap; all clones share the client handle and the map.
#[derive(Clone)]
pub struct ManagementService {
    client: Arc<dyn PolicyClient>,
    permission_map: Arc<PermissionMap>,
}

impl ManagementService {
    pub fn new(client: Arc<dyn PolicyClient>, permission_map: Arc<PermissionMap>) -> Self {
        Self {
            client,
            permission_map,
        }
    }

    /// The permission map this service validates grants against.
    pub fn permission_map(&self) -> &PermissionMap {
        &self.permission_map
    }

    /// Creates a role owned by an organization.
    #[instrument(skip(self))]
    pub async fn create_role(&self, organization_id: &str, role_id: &str) -> Result<()> {
        self.create(
            ObjectRef::new(object_types::ROLE, role_id),
            relations::ORGANIZATION,
            SubjectRef::direct(ObjectRef::new(object_types::ORGANIZATION, organization_id)),
        )
        .await
    }

    /// Creates a group owned by an organization.
    #[instrument(skip(self))]
    pub async fn create_group(&self, organization_id: &str, group_id: &str) -> Result<()> {
        self.create(
            ObjectRef::new(object_types::GROUP, group_id),
            relations::ORGANIZATION,
            SubjectRef::direct(ObjectRef::new(object_types::ORGANIZATION, organization_id)),
        )
        .await
    }

    /// Grants members of `role_id` the `action` on `product` across the
    /// whole organization.
    ///
    /// The pair must be declared in the permission map; an undeclared pair
    /// is rejected as an error and nothing reaches the policy service.
    #[instrument(skip(self))]
    pub async fn add_permission_to_role(
        &self,
        organization_id: &str,
        product: &str,
        action: &str,
        role_id: &str,
    ) -> Result<()> {
        if !self.permission_map.allows(product, action) {
            warn!("Rejected undeclared permission {}/{}", product, action);
            return Err(PalisadeError::unknown_permission(product, action));
        }
        self.create(
            ObjectRef::new(object_types::ORGANIZATION, organization_id),
            &product_permission(product, action),
            SubjectRef::via_relation(
                ObjectRef::new(object_types::ROLE, role_id),
                relations::MEMBER,
            ),
        )
        .await
    }

    /// Adds a user to a role's membership.
    #[instrument(skip(self))]
    pub async fn add_role_to_user(&self, role_id: &str, user_id: &str) -> Result<()> {
        self.create(
            ObjectRef::new(object_types::ROLE, role_id),
            relations::MEMBER,
            SubjectRef::direct(ObjectRef::new(object_types::USER, user_id)),
        )
        .await
    }

    /// Adds a user to a group's membership.
    #[instrument(skip(self))]
    pub async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> Result<()> {
        self.create(
            ObjectRef::new(object_types::GROUP, group_id),
            relations::MEMBER,
            SubjectRef::direct(ObjectRef::new(object_types::USER, user_id)),
        )
        .await
    }

    /// Compiles the permission map into schema text and publishes it.
    #[instrument(skip(self))]
    pub async fn publish_schema(&self) -> Result<()> {
        info!("Compiling and publishing the authorization schema");
        let schema = compile_schema(&self.permission_map)?.render();
        self.client.write_schema(&schema).await
    }

    /// Reads back the schema currently held by the policy service.
    pub async fn read_schema(&self) -> Result<String> {
        self.client.read_schema().await
    }

    async fn create(&self, resource: ObjectRef, relation: &str, subject: SubjectRef) -> Result<()> {
        debug!("Writing {} {} {}", resource, relation, subject);
        let update = RelationshipUpdate::create(Relationship::new(resource, relation, subject));
        self.client.write_relationships(vec![update]).await
    }
}

impl fmt::Debug for ManagementService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagementService")
            .field("products", &self.permission_map.len())
            .finish()
    }
}
