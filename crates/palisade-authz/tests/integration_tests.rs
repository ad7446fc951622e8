//! End-to-end tests for the Palisade operation layer
//!
//! These tests require a running SpiceDB instance to execute.
//! Set the following environment variables:
//! - SPICEDB_ENDPOINT: The SpiceDB gRPC endpoint (default: http://localhost:50051)
//! - SPICEDB_TOKEN: The SpiceDB preshared key (default: empty)
//!
//! Run with: cargo test -p palisade-authz --test integration_tests -- --ignored

use std::sync::Arc;

use palisade_authz::{AccessService, ManagementService};
use palisade_core::{PermissionMap, PolicyClient, PolicyRecord, Principal};
use palisade_spicedb::{SpiceDbClient, SpiceDbConfig};

// =============================================================================
// Test Fixtures
// =============================================================================

/// Creates a unique test ID to avoid conflicts between test runs
fn test_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis();
    format!("test_{}", timestamp)
}

fn spicedb_endpoint() -> String {
    std::env::var("SPICEDB_ENDPOINT").unwrap_or_else(|_| "http://localhost:50051".to_string())
}

fn spicedb_token() -> String {
    std::env::var("SPICEDB_TOKEN").unwrap_or_default()
}

/// Check if SpiceDB is available
fn spicedb_available() -> bool {
    std::env::var("SPICEDB_ENDPOINT").is_ok()
        || std::net::TcpStream::connect("localhost:50051").is_ok()
}

async fn connect() -> Arc<dyn PolicyClient> {
    let config = SpiceDbConfig {
        endpoint: spicedb_endpoint(),
        token: spicedb_token(),
        ..SpiceDbConfig::default()
    };
    Arc::new(
        SpiceDbClient::new(config)
            .await
            .expect("SpiceDB connection failed"),
    )
}

fn invoice_permissions() -> Arc<PermissionMap> {
    let mut map = PermissionMap::new();
    map.declare("invoice", ["create", "view"]);
    Arc::new(map)
}

struct Invoice {
    id: String,
}

impl PolicyRecord for Invoice {
    fn type_label(&self) -> &str {
        "Invoice"
    }

    fn record_id(&self) -> String {
        self.id.clone()
    }
}

/// Publishes the invoice schema and returns both service layers.
async fn services() -> (AccessService, ManagementService) {
    let client = connect().await;
    let management = ManagementService::new(client.clone(), invoice_permissions());
    management
        .publish_schema()
        .await
        .expect("schema publish failed");
    (AccessService::new(client), management)
}

// =============================================================================
// Authorization Flow Tests
// =============================================================================

#[tokio::test]
#[ignore = "Requires running SpiceDB instance"]
async fn test_role_grant_opens_the_organization_gate() {
    if !spicedb_available() {
        eprintln!("Skipping: SpiceDB not available");
        return;
    }

    let prefix = test_id();
    let org = format!("{}_org", prefix);
    let role = format!("{}_role", prefix);
    let user = format!("{}_user", prefix);

    let (access, management) = services().await;
    management.create_role(&org, &role).await.unwrap();
    management
        .add_permission_to_role(&org, "invoice", "view", &role)
        .await
        .unwrap();
    management.add_role_to_user(&role, &user).await.unwrap();

    assert!(access.can_perform("view", "invoice", &user, &org).await.unwrap());

    let outsider = format!("{}_outsider", prefix);
    assert!(!access.can_perform("view", "invoice", &outsider, &org).await.unwrap());
}

#[tokio::test]
#[ignore = "Requires running SpiceDB instance"]
async fn test_record_access_requires_both_gates() {
    if !spicedb_available() {
        eprintln!("Skipping: SpiceDB not available");
        return;
    }

    let prefix = test_id();
    let org = format!("{}_org", prefix);
    let role = format!("{}_role", prefix);
    let user = format!("{}_user", prefix);
    let record = Invoice {
        id: format!("{}_inv", prefix),
    };

    let (access, management) = services().await;
    management.create_role(&org, &role).await.unwrap();
    management
        .add_permission_to_role(&org, "invoice", "view", &role)
        .await
        .unwrap();
    management.add_role_to_user(&role, &user).await.unwrap();
    access.add_record_ownership(&org, &record).await.unwrap();

    // Organization gate alone is not enough for a record-level view.
    assert!(!access.has_permission(&record, "view", &user).await.unwrap());

    access
        .add_access(&record, Principal::user(&user))
        .await
        .unwrap();
    assert!(access.has_permission(&record, "view", &user).await.unwrap());
}

#[tokio::test]
#[ignore = "Requires running SpiceDB instance"]
async fn test_create_bypasses_the_accessor_gate() {
    if !spicedb_available() {
        eprintln!("Skipping: SpiceDB not available");
        return;
    }

    let prefix = test_id();
    let org = format!("{}_org", prefix);
    let role = format!("{}_role", prefix);
    let user = format!("{}_user", prefix);
    let record = Invoice {
        id: format!("{}_inv", prefix),
    };

    let (access, management) = services().await;
    management.create_role(&org, &role).await.unwrap();
    for action in ["create", "view"] {
        management
            .add_permission_to_role(&org, "invoice", action, &role)
            .await
            .unwrap();
    }
    management.add_role_to_user(&role, &user).await.unwrap();
    access.add_record_ownership(&org, &record).await.unwrap();

    // The user is not an accessor of the record: view stays closed while
    // create, which has no accessor gate, is open.
    assert!(access.has_permission(&record, "create", &user).await.unwrap());
    assert!(!access.has_permission(&record, "view", &user).await.unwrap());
}

#[tokio::test]
#[ignore = "Requires running SpiceDB instance"]
async fn test_group_grants_expand_to_members() {
    if !spicedb_available() {
        eprintln!("Skipping: SpiceDB not available");
        return;
    }

    let prefix = test_id();
    let org = format!("{}_org", prefix);
    let group = format!("{}_group", prefix);
    let user = format!("{}_user", prefix);
    let record = Invoice {
        id: format!("{}_inv", prefix),
    };

    let (access, management) = services().await;
    management.create_group(&org, &group).await.unwrap();
    management.add_user_to_group(&user, &group).await.unwrap();
    access.add_record_ownership(&org, &record).await.unwrap();
    access
        .add_access(&record, Principal::group(&group))
        .await
        .unwrap();

    let users = access.get_all_users_with_access_to(&record).await.unwrap();
    assert!(users.contains(&user), "group member missing from {users:?}");

    let accessors = access.get_all_accessors_to(&record).await.unwrap();
    assert_eq!(accessors, vec![format!("group:{}", group)]);
}
