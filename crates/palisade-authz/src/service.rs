//! Record-level access operations
//!
//! Grants and reads for individual records: ownership links, accessor
//! grants, permission checks, and accessor listings. Every check runs
//! fully consistent so a revocation is honored by the very next call.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use palisade_core::{
    object_type_from_label, object_types, product_permission, relations, Consistency, ObjectRef,
    PolicyClient, PolicyRecord, Principal, Relationship, RelationshipFilter, RelationshipUpdate,
    Result, SubjectRef,
};

/// Record-level grants and permission reads against the policy service.
///
/// Cloning is cheap; all clones share the injected client handle.
#[derive(Clone)]
pub struct AccessService {
    client: Arc<dyn PolicyClient>,
}

impl AccessService {
    pub fn new(client: Arc<dyn PolicyClient>) -> Self {
        Self { client }
    }

    /// The injected policy client, for callers that need the raw boundary.
    pub fn client(&self) -> &Arc<dyn PolicyClient> {
        &self.client
    }

    /// Writes a single relationship tuple.
    ///
    /// `subject_relation` is forwarded only when supplied. Repeating an
    /// existing grant is harmless; deduplication is left to the policy
    /// store.
    #[instrument(skip(self))]
    pub async fn add_relationship(
        &self,
        resource_type: &str,
        resource_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
        subject_relation: Option<&str>,
    ) -> Result<()> {
        let subject = SubjectRef {
            object: ObjectRef::new(subject_type, subject_id),
            relation: subject_relation.map(str::to_string),
        };
        self.create(
            ObjectRef::new(resource_type, resource_id),
            relation,
            subject,
        )
        .await
    }

    /// Links `record` to its owning organization.
    #[instrument(skip(self, record), fields(record = record.type_label()))]
    pub async fn add_record_ownership(
        &self,
        organization_id: &str,
        record: &dyn PolicyRecord,
    ) -> Result<()> {
        let resource = record_object(record)?;
        debug!("Attaching {} to organization:{}", resource, organization_id);
        self.create(
            resource,
            relations::ORGANIZATION,
            SubjectRef::direct(ObjectRef::new(object_types::ORGANIZATION, organization_id)),
        )
        .await
    }

    /// Grants `principal` access to `record`.
    ///
    /// A group principal is granted through its `member` relation, so the
    /// grant tracks membership changes instead of freezing a snapshot of
    /// the current members.
    #[instrument(skip(self, record), fields(record = record.type_label()))]
    pub async fn add_access(&self, record: &dyn PolicyRecord, principal: Principal) -> Result<()> {
        let resource = record_object(record)?;
        debug!("Granting {:?} access to {}", principal, resource);
        self.create(resource, relations::ACCESSORS, principal.subject_ref())
            .await
    }

    /// Variant of [`add_access`] for callers carrying separate optional
    /// ids. Exactly one of `user_id` / `group_id` must be given; anything
    /// else is rejected before any write is attempted.
    ///
    /// [`add_access`]: AccessService::add_access
    pub async fn add_access_by_ids(
        &self,
        record: &dyn PolicyRecord,
        user_id: Option<&str>,
        group_id: Option<&str>,
    ) -> Result<()> {
        let principal = Principal::from_ids(user_id, group_id)?;
        self.add_access(record, principal).await
    }

    /// Evaluates `permission` for the subject on the given resource.
    ///
    /// Only a definitive grant maps to `true`. Transport failures
    /// propagate as errors, so an unreachable policy service never reads
    /// as a denial.
    #[instrument(skip(self))]
    pub async fn check_permission(
        &self,
        resource_type: &str,
        resource_id: &str,
        permission: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<bool> {
        let permissionship = self
            .client
            .check_permission(
                &ObjectRef::new(resource_type, resource_id),
                permission,
                &SubjectRef::direct(ObjectRef::new(subject_type, subject_id)),
                Consistency::FullyConsistent,
            )
            .await?;
        Ok(permissionship.is_granted())
    }

    /// Checks `permission` on `record` for a user.
    #[instrument(skip(self, record), fields(record = record.type_label()))]
    pub async fn has_permission(
        &self,
        record: &dyn PolicyRecord,
        permission: &str,
        user_id: &str,
    ) -> Result<bool> {
        let resource = record_object(record)?;
        self.check_permission(
            &resource.object_type,
            &resource.object_id,
            permission,
            object_types::USER,
            user_id,
        )
        .await
    }

    /// Organization-level gate: may the user perform `action` on `product`
    /// anywhere inside the organization? This is distinct from the
    /// per-record `accessors` gate and does not consult it.
    #[instrument(skip(self))]
    pub async fn can_perform(
        &self,
        action: &str,
        product: &str,
        user_id: &str,
        organization_id: &str,
    ) -> Result<bool> {
        self.check_permission(
            object_types::ORGANIZATION,
            organization_id,
            &product_permission(product, action),
            object_types::USER,
            user_id,
        )
        .await
    }

    /// All user ids holding `accessors` on `record`, with group grants
    /// expanded down to their individual members.
    #[instrument(skip(self, record), fields(record = record.type_label()))]
    pub async fn get_all_users_with_access_to(
        &self,
        record: &dyn PolicyRecord,
    ) -> Result<Vec<String>> {
        let resource = record_object(record)?;
        self.client
            .lookup_subjects(
                &resource,
                relations::ACCESSORS,
                object_types::USER,
                Consistency::FullyConsistent,
            )
            .await
    }

    /// Raw accessor subjects of `record` as `type:id` strings.
    ///
    /// Group grants come back as the group reference itself, not expanded
    /// to members; use [`get_all_users_with_access_to`] for the expansion.
    ///
    /// [`get_all_users_with_access_to`]: AccessService::get_all_users_with_access_to
    #[instrument(skip(self, record), fields(record = record.type_label()))]
    pub async fn get_all_accessors_to(&self, record: &dyn PolicyRecord) -> Result<Vec<String>> {
        let resource = record_object(record)?;
        let filter = RelationshipFilter {
            resource_type: resource.object_type,
            resource_id: Some(resource.object_id),
            relation: Some(relations::ACCESSORS.to_string()),
        };
        let relationships = self
            .client
            .read_relationships(&filter, Consistency::FullyConsistent)
            .await?;
        Ok(relationships
            .into_iter()
            .map(|relationship| relationship.subject.object.to_string())
            .collect())
    }

    async fn create(&self, resource: ObjectRef, relation: &str, subject: SubjectRef) -> Result<()> {
        let update = RelationshipUpdate::create(Relationship::new(resource, relation, subject));
        self.client.write_relationships(vec![update]).await
    }
}

impl fmt::Debug for AccessService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessService").finish()
    }
}

/// Derives the policy object reference for a record, normalizing its
/// type label into an object type.
pub(crate) fn record_object(record: &dyn PolicyRecord) -> Result<ObjectRef> {
    Ok(ObjectRef::new(
        object_type_from_label(record.type_label())?,
        record.record_id(),
    ))
}
