//! Unit tests for palisade-authz

use super::*;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use palisade_core::{
    Consistency, ObjectRef, PalisadeError, PermissionMap, Permissionship, PolicyClient,
    PolicyRecord, Principal, Relationship, RelationshipFilter, RelationshipUpdate, Result,
    SubjectRef, UpdateOperation,
};

// =============================================================================
// Test Doubles
// =============================================================================

struct TestRecord {
    label: &'static str,
    id: &'static str,
}

impl PolicyRecord for TestRecord {
    fn type_label(&self) -> &str {
        self.label
    }

    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

fn invoice() -> TestRecord {
    TestRecord {
        label: "Invoice",
        id: "inv_1",
    }
}

/// Scripted in-memory policy client that records every boundary call.
struct MockPolicyClient {
    check_answer: Mutex<Permissionship>,
    check_failure: Mutex<Option<PalisadeError>>,
    lookup_answer: Mutex<Vec<String>>,
    read_answer: Mutex<Vec<Relationship>>,
    written: Mutex<Vec<RelationshipUpdate>>,
    checked: Mutex<Vec<(ObjectRef, String, SubjectRef)>>,
    lookups: Mutex<Vec<(ObjectRef, String, String)>>,
    filters: Mutex<Vec<RelationshipFilter>>,
    consistencies: Mutex<Vec<Consistency>>,
    published: Mutex<Option<String>>,
}

impl MockPolicyClient {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            check_answer: Mutex::new(Permissionship::NoPermission),
            check_failure: Mutex::new(None),
            lookup_answer: Mutex::new(Vec::new()),
            read_answer: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
            checked: Mutex::new(Vec::new()),
            lookups: Mutex::new(Vec::new()),
            filters: Mutex::new(Vec::new()),
            consistencies: Mutex::new(Vec::new()),
            published: Mutex::new(None),
        })
    }

    fn answer_checks_with(&self, permissionship: Permissionship) {
        *self.check_answer.lock().unwrap() = permissionship;
    }

    fn fail_next_check(&self, error: PalisadeError) {
        *self.check_failure.lock().unwrap() = Some(error);
    }

    fn lookup_returns(&self, ids: &[&str]) {
        *self.lookup_answer.lock().unwrap() = ids.iter().map(|id| id.to_string()).collect();
    }

    fn read_returns(&self, relationships: Vec<Relationship>) {
        *self.read_answer.lock().unwrap() = relationships;
    }

    fn written(&self) -> Vec<RelationshipUpdate> {
        self.written.lock().unwrap().clone()
    }

    fn checked(&self) -> Vec<(ObjectRef, String, SubjectRef)> {
        self.checked.lock().unwrap().clone()
    }

    fn lookups(&self) -> Vec<(ObjectRef, String, String)> {
        self.lookups.lock().unwrap().clone()
    }

    fn filters(&self) -> Vec<RelationshipFilter> {
        self.filters.lock().unwrap().clone()
    }

    fn consistencies(&self) -> Vec<Consistency> {
        self.consistencies.lock().unwrap().clone()
    }

    fn published(&self) -> Option<String> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl PolicyClient for MockPolicyClient {
    async fn write_relationships(&self, updates: Vec<RelationshipUpdate>) -> Result<()> {
        self.written.lock().unwrap().extend(updates);
        Ok(())
    }

    async fn check_permission(
        &self,
        resource: &ObjectRef,
        permission: &str,
        subject: &SubjectRef,
        consistency: Consistency,
    ) -> Result<Permissionship> {
        self.checked.lock().unwrap().push((
            resource.clone(),
            permission.to_string(),
            subject.clone(),
        ));
        self.consistencies.lock().unwrap().push(consistency);
        if let Some(error) = self.check_failure.lock().unwrap().take() {
            return Err(error);
        }
        Ok(*self.check_answer.lock().unwrap())
    }

    async fn lookup_subjects(
        &self,
        resource: &ObjectRef,
        permission: &str,
        subject_type: &str,
        consistency: Consistency,
    ) -> Result<Vec<String>> {
        self.lookups.lock().unwrap().push((
            resource.clone(),
            permission.to_string(),
            subject_type.to_string(),
        ));
        self.consistencies.lock().unwrap().push(consistency);
        Ok(self.lookup_answer.lock().unwrap().clone())
    }

    async fn read_relationships(
        &self,
        filter: &RelationshipFilter,
        consistency: Consistency,
    ) -> Result<Vec<Relationship>> {
        self.filters.lock().unwrap().push(filter.clone());
        self.consistencies.lock().unwrap().push(consistency);
        Ok(self.read_answer.lock().unwrap().clone())
    }

    async fn write_schema(&self, schema: &str) -> Result<()> {
        *self.published.lock().unwrap() = Some(schema.to_string());
        Ok(())
    }

    async fn read_schema(&self) -> Result<String> {
        Ok(self.published.lock().unwrap().clone().unwrap_or_default())
    }
}

fn access(client: &Arc<MockPolicyClient>) -> AccessService {
    AccessService::new(client.clone())
}

fn management(client: &Arc<MockPolicyClient>) -> ManagementService {
    let mut map = PermissionMap::new();
    map.declare("billing", ["create", "view"]);
    ManagementService::new(client.clone(), Arc::new(map))
}

// =============================================================================
// Grant Tests
// =============================================================================

#[cfg(test)]
mod grant_tests {
    use super::*;

    #[tokio::test]
    async fn test_add_access_for_user_writes_direct_accessor() {
        let client = MockPolicyClient::new();
        access(&client)
            .add_access(&invoice(), Principal::user("u1"))
            .await
            .unwrap();

        let written = client.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].operation, UpdateOperation::Create);
        assert_eq!(
            written[0].relationship.resource,
            ObjectRef::new("invoice", "inv_1")
        );
        assert_eq!(written[0].relationship.relation, "accessors");
        assert_eq!(
            written[0].relationship.subject,
            SubjectRef::direct(ObjectRef::new("user", "u1"))
        );
    }

    #[tokio::test]
    async fn test_add_access_for_group_targets_its_members() {
        let client = MockPolicyClient::new();
        access(&client)
            .add_access(&invoice(), Principal::group("engineers"))
            .await
            .unwrap();

        let written = client.written();
        assert_eq!(
            written[0].relationship.subject,
            SubjectRef::via_relation(ObjectRef::new("group", "engineers"), "member")
        );
    }

    #[tokio::test]
    async fn test_add_access_by_ids_rejects_both_principals() {
        let client = MockPolicyClient::new();
        let result = access(&client)
            .add_access_by_ids(&invoice(), Some("u1"), Some("g1"))
            .await;

        assert!(matches!(result, Err(PalisadeError::InvalidArgument { .. })));
        assert!(client.written().is_empty());
    }

    #[tokio::test]
    async fn test_add_access_by_ids_rejects_missing_principal() {
        let client = MockPolicyClient::new();
        let result = access(&client).add_access_by_ids(&invoice(), None, None).await;

        assert!(matches!(result, Err(PalisadeError::InvalidArgument { .. })));
        assert!(client.written().is_empty());
    }

    #[tokio::test]
    async fn test_add_record_ownership_links_the_organization() {
        let client = MockPolicyClient::new();
        access(&client)
            .add_record_ownership("acme", &invoice())
            .await
            .unwrap();

        let written = client.written();
        assert_eq!(
            written[0].relationship.resource,
            ObjectRef::new("invoice", "inv_1")
        );
        assert_eq!(written[0].relationship.relation, "organization");
        assert_eq!(
            written[0].relationship.subject,
            SubjectRef::direct(ObjectRef::new("organization", "acme"))
        );
    }

    #[tokio::test]
    async fn test_record_type_labels_are_normalized() {
        let client = MockPolicyClient::new();
        let record = TestRecord {
            label: "Admin::Invoice",
            id: "inv_9",
        };
        access(&client)
            .add_record_ownership("acme", &record)
            .await
            .unwrap();

        assert_eq!(
            client.written()[0].relationship.resource,
            ObjectRef::new("admin/invoice", "inv_9")
        );
    }

    #[tokio::test]
    async fn test_add_relationship_forwards_the_subject_relation() {
        let client = MockPolicyClient::new();
        let service = access(&client);
        service
            .add_relationship("organization", "acme", "view_billing", "role", "r1", Some("member"))
            .await
            .unwrap();
        service
            .add_relationship("role", "r1", "member", "user", "u1", None)
            .await
            .unwrap();

        let written = client.written();
        assert_eq!(written[0].relationship.subject.relation.as_deref(), Some("member"));
        assert_eq!(written[1].relationship.subject.relation, None);
    }
}

// =============================================================================
// Check Tests
// =============================================================================

#[cfg(test)]
mod check_tests {
    use super::*;

    #[tokio::test]
    async fn test_only_a_definitive_grant_maps_to_true() {
        let client = MockPolicyClient::new();
        let service = access(&client);

        let cases = [
            (Permissionship::HasPermission, true),
            (Permissionship::NoPermission, false),
            (Permissionship::Unspecified, false),
            (Permissionship::Conditional, false),
        ];
        for (answer, expected) in cases {
            client.answer_checks_with(answer);
            let granted = service
                .check_permission("invoice", "inv_1", "view", "user", "u1")
                .await
                .unwrap();
            assert_eq!(granted, expected, "{answer:?} must map to {expected}");
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error_not_a_denial() {
        let client = MockPolicyClient::new();
        client.fail_next_check(PalisadeError::unavailable("connection refused"));

        let result = access(&client)
            .check_permission("invoice", "inv_1", "view", "user", "u1")
            .await;

        assert!(matches!(
            result,
            Err(PalisadeError::ServiceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_checks_run_fully_consistent() {
        let client = MockPolicyClient::new();
        access(&client)
            .check_permission("invoice", "inv_1", "view", "user", "u1")
            .await
            .unwrap();

        assert_eq!(client.consistencies(), vec![Consistency::FullyConsistent]);
    }

    #[tokio::test]
    async fn test_can_perform_checks_the_organization_gate() {
        let client = MockPolicyClient::new();
        client.answer_checks_with(Permissionship::HasPermission);

        let granted = access(&client)
            .can_perform("view", "billing", "u1", "acme")
            .await
            .unwrap();

        assert!(granted);
        let checked = client.checked();
        assert_eq!(checked.len(), 1);
        assert_eq!(checked[0].0, ObjectRef::new("organization", "acme"));
        assert_eq!(checked[0].1, "view_billing");
        assert_eq!(checked[0].2, SubjectRef::direct(ObjectRef::new("user", "u1")));
    }

    #[tokio::test]
    async fn test_has_permission_normalizes_the_record_type() {
        let client = MockPolicyClient::new();
        let record = TestRecord {
            label: "BillingAccount",
            id: "b1",
        };
        access(&client)
            .has_permission(&record, "view", "u1")
            .await
            .unwrap();

        assert_eq!(
            client.checked()[0].0,
            ObjectRef::new("billing_account", "b1")
        );
    }
}

// =============================================================================
// Listing Tests
// =============================================================================

#[cfg(test)]
mod listing_tests {
    use super::*;

    #[tokio::test]
    async fn test_users_with_access_expands_through_the_accessors_gate() {
        let client = MockPolicyClient::new();
        client.lookup_returns(&["u1", "u2"]);

        let users = access(&client)
            .get_all_users_with_access_to(&invoice())
            .await
            .unwrap();

        assert_eq!(users, vec!["u1".to_string(), "u2".to_string()]);
        let lookups = client.lookups();
        assert_eq!(lookups.len(), 1);
        assert_eq!(lookups[0].0, ObjectRef::new("invoice", "inv_1"));
        assert_eq!(lookups[0].1, "accessors");
        assert_eq!(lookups[0].2, "user");
        assert_eq!(client.consistencies(), vec![Consistency::FullyConsistent]);
    }

    #[tokio::test]
    async fn test_accessors_come_back_as_type_and_id() {
        let client = MockPolicyClient::new();
        client.read_returns(vec![
            Relationship::new(
                ObjectRef::new("invoice", "inv_1"),
                "accessors",
                SubjectRef::direct(ObjectRef::new("user", "u1")),
            ),
            Relationship::new(
                ObjectRef::new("invoice", "inv_1"),
                "accessors",
                SubjectRef::via_relation(ObjectRef::new("group", "engineers"), "member"),
            ),
        ]);

        let accessors = access(&client)
            .get_all_accessors_to(&invoice())
            .await
            .unwrap();

        // The group subject stays a group reference; its relation is not
        // part of the rendered accessor.
        assert_eq!(
            accessors,
            vec!["user:u1".to_string(), "group:engineers".to_string()]
        );
        assert_eq!(
            client.filters(),
            vec![RelationshipFilter {
                resource_type: "invoice".to_string(),
                resource_id: Some("inv_1".to_string()),
                relation: Some("accessors".to_string()),
            }]
        );
    }
}

// =============================================================================
// Management Tests
// =============================================================================

#[cfg(test)]
mod management_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_role_attaches_it_to_the_organization() {
        let client = MockPolicyClient::new();
        management(&client).create_role("acme", "analyst").await.unwrap();

        let written = client.written();
        assert_eq!(written[0].operation, UpdateOperation::Create);
        assert_eq!(
            written[0].relationship.resource,
            ObjectRef::new("role", "analyst")
        );
        assert_eq!(written[0].relationship.relation, "organization");
        assert_eq!(
            written[0].relationship.subject,
            SubjectRef::direct(ObjectRef::new("organization", "acme"))
        );
    }

    #[tokio::test]
    async fn test_create_group_attaches_it_to_the_organization() {
        let client = MockPolicyClient::new();
        management(&client).create_group("acme", "engineers").await.unwrap();

        let written = client.written();
        assert_eq!(
            written[0].relationship.resource,
            ObjectRef::new("group", "engineers")
        );
        assert_eq!(written[0].relationship.relation, "organization");
    }

    #[tokio::test]
    async fn test_add_permission_to_role_grants_through_members() {
        let client = MockPolicyClient::new();
        management(&client)
            .add_permission_to_role("acme", "billing", "view", "analyst")
            .await
            .unwrap();

        let written = client.written();
        assert_eq!(
            written[0].relationship.resource,
            ObjectRef::new("organization", "acme")
        );
        assert_eq!(written[0].relationship.relation, "view_billing");
        assert_eq!(
            written[0].relationship.subject,
            SubjectRef::via_relation(ObjectRef::new("role", "analyst"), "member")
        );
    }

    #[tokio::test]
    async fn test_undeclared_action_is_rejected_before_any_write() {
        let client = MockPolicyClient::new();
        let result = management(&client)
            .add_permission_to_role("acme", "billing", "delete", "analyst")
            .await;

        assert!(matches!(
            result,
            Err(PalisadeError::UnknownPermission { .. })
        ));
        assert!(client.written().is_empty());
    }

    #[tokio::test]
    async fn test_undeclared_product_is_rejected_before_any_write() {
        let client = MockPolicyClient::new();
        let result = management(&client)
            .add_permission_to_role("acme", "reporting", "view", "analyst")
            .await;

        assert!(matches!(
            result,
            Err(PalisadeError::UnknownPermission { .. })
        ));
        assert!(client.written().is_empty());
    }

    #[tokio::test]
    async fn test_add_role_to_user_writes_role_membership() {
        let client = MockPolicyClient::new();
        management(&client).add_role_to_user("analyst", "u1").await.unwrap();

        let written = client.written();
        assert_eq!(
            written[0].relationship.resource,
            ObjectRef::new("role", "analyst")
        );
        assert_eq!(written[0].relationship.relation, "member");
        assert_eq!(
            written[0].relationship.subject,
            SubjectRef::direct(ObjectRef::new("user", "u1"))
        );
    }

    #[tokio::test]
    async fn test_add_user_to_group_writes_group_membership() {
        let client = MockPolicyClient::new();
        management(&client).add_user_to_group("u1", "engineers").await.unwrap();

        let written = client.written();
        assert_eq!(
            written[0].relationship.resource,
            ObjectRef::new("group", "engineers")
        );
        assert_eq!(written[0].relationship.relation, "member");
        assert_eq!(
            written[0].relationship.subject,
            SubjectRef::direct(ObjectRef::new("user", "u1"))
        );
    }

    #[tokio::test]
    async fn test_publish_schema_compiles_the_configured_map() {
        let client = MockPolicyClient::new();
        let service = management(&client);
        service.publish_schema().await.unwrap();

        let published = client.published().unwrap();
        assert!(published.contains("definition billing"));
        assert!(published.contains("relation view_billing: role#member"));
        assert_eq!(service.read_schema().await.unwrap(), published);
    }
}
