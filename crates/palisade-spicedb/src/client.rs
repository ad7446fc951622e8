//! SpiceDB gRPC client implementation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tonic::{metadata::MetadataValue, Code, Request, Status};
use tracing::{debug, info, instrument};

use palisade_core::{
    Consistency, ObjectRef, PalisadeError, Permissionship, PolicyClient, Relationship,
    RelationshipFilter, RelationshipUpdate, Result, SubjectRef, UpdateOperation,
};

use crate::proto;

/// Configuration for the policy service connection
#[derive(Debug, Clone)]
pub struct SpiceDbConfig {
    /// Endpoint URL (e.g., "http://localhost:50051")
    pub endpoint: String,
    /// Pre-shared key sent as a bearer credential; empty disables auth
    pub token: String,
    /// Whether the connection must use TLS; requires an https endpoint
    pub use_tls: bool,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for SpiceDbConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:50051".to_string(),
            token: String::new(),
            use_tls: false,
            connect_timeout_ms: 5000,
            request_timeout_ms: 30000,
        }
    }
}

/// Client wrapper providing typed access to the policy service
#[derive(Clone)]
pub struct SpiceDbClient {
    channel: Channel,
    token: Arc<String>,
}

impl SpiceDbClient {
    /// Connects to the policy service.
    #[instrument(skip(config), fields(endpoint = %config.endpoint))]
    pub async fn new(config: SpiceDbConfig) -> Result<Self> {
        if config.use_tls && !config.endpoint.starts_with("https://") {
            return Err(PalisadeError::invalid_configuration(
                "use_tls requires an https endpoint",
            ));
        }

        info!("Connecting to policy service at {}", config.endpoint);

        let endpoint = Endpoint::from_shared(config.endpoint.clone())
            .map_err(|e| PalisadeError::invalid_configuration(format!("invalid endpoint: {e}")))?
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms));

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| PalisadeError::unavailable(format!("failed to connect: {e}")))?;

        info!("Connected to policy service");

        Ok(Self {
            channel,
            token: Arc::new(config.token),
        })
    }

    /// Get the gRPC channel
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// Create an authenticated request
    fn create_request<T>(&self, inner: T) -> Result<Request<T>> {
        let mut request = Request::new(inner);

        if !self.token.is_empty() {
            let bearer = format!("Bearer {}", self.token);
            let value = MetadataValue::try_from(bearer.as_str()).map_err(|e| {
                PalisadeError::invalid_configuration(format!("invalid token: {e}"))
            })?;
            request.metadata_mut().insert("authorization", value);
        }

        Ok(request)
    }

    fn permissions_client(
        &self,
    ) -> proto::permissions_service_client::PermissionsServiceClient<Channel> {
        proto::permissions_service_client::PermissionsServiceClient::new(self.channel.clone())
    }

    fn schema_client(&self) -> proto::schema_service_client::SchemaServiceClient<Channel> {
        proto::schema_service_client::SchemaServiceClient::new(self.channel.clone())
    }

    /// Check whether the policy service answers by reading its schema.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<bool> {
        debug!("Performing policy service health check");
        let mut client = self.schema_client();
        let request = self.create_request(proto::ReadSchemaRequest {})?;

        match client.read_schema(request).await {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!("Health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl PolicyClient for SpiceDbClient {
    #[instrument(skip(self, updates), fields(updates = updates.len()))]
    async fn write_relationships(&self, updates: Vec<RelationshipUpdate>) -> Result<()> {
        let updates = updates
            .iter()
            .map(encode_update)
            .collect::<Result<Vec<_>>>()?;

        let mut client = self.permissions_client();
        let request = self.create_request(proto::WriteRelationshipsRequest { updates })?;

        let response = client
            .write_relationships(request)
            .await
            .map_err(|status| map_status("write relationships", status))?;

        let token = response
            .into_inner()
            .written_at
            .map(|t| t.token)
            .unwrap_or_default();
        debug!(%token, "Relationships written");

        Ok(())
    }

    #[instrument(skip(self, subject), fields(subject = %subject))]
    async fn check_permission(
        &self,
        resource: &ObjectRef,
        permission: &str,
        subject: &SubjectRef,
        consistency: Consistency,
    ) -> Result<Permissionship> {
        debug!("Checking {} on {} for {}", permission, resource, subject);

        let mut client = self.permissions_client();
        let request = self.create_request(proto::CheckPermissionRequest {
            consistency: Some(encode_consistency(consistency)),
            resource: Some(encode_object(resource)),
            permission: permission.to_string(),
            subject: Some(encode_subject(subject)?),
        })?;

        let response = client
            .check_permission(request)
            .await
            .map_err(|status| map_status("check permission", status))?;

        let permissionship = decode_permissionship(response.into_inner().permissionship);
        debug!("Check answered: {:?}", permissionship);

        Ok(permissionship)
    }

    #[instrument(skip(self))]
    async fn lookup_subjects(
        &self,
        resource: &ObjectRef,
        permission: &str,
        subject_type: &str,
        consistency: Consistency,
    ) -> Result<Vec<String>> {
        debug!(
            "Looking up {} subjects holding {} on {}",
            subject_type, permission, resource
        );

        let mut client = self.permissions_client();
        let request = self.create_request(proto::LookupSubjectsRequest {
            consistency: Some(encode_consistency(consistency)),
            resource: Some(encode_object(resource)),
            permission: permission.to_string(),
            subject_object_type: subject_type.to_string(),
            optional_subject_relation: String::new(),
        })?;

        let mut stream = client
            .lookup_subjects(request)
            .await
            .map_err(|status| map_status("lookup subjects", status))?
            .into_inner();

        let mut subjects = Vec::new();
        while let Some(response) = stream
            .message()
            .await
            .map_err(|status| map_status("lookup subjects stream", status))?
        {
            if let Some(subject) = response.subject {
                subjects.push(subject.subject_object_id);
            }
        }

        debug!("Found {} subjects", subjects.len());
        Ok(subjects)
    }

    #[instrument(skip(self))]
    async fn read_relationships(
        &self,
        filter: &RelationshipFilter,
        consistency: Consistency,
    ) -> Result<Vec<Relationship>> {
        debug!(
            "Reading relationships: resource_type={}, resource_id={:?}, relation={:?}",
            filter.resource_type, filter.resource_id, filter.relation
        );

        let mut client = self.permissions_client();
        let request = self.create_request(proto::ReadRelationshipsRequest {
            consistency: Some(encode_consistency(consistency)),
            relationship_filter: Some(proto::RelationshipFilter {
                resource_type: filter.resource_type.clone(),
                optional_resource_id: filter.resource_id.clone().unwrap_or_default(),
                optional_relation: filter.relation.clone().unwrap_or_default(),
            }),
        })?;

        let mut stream = client
            .read_relationships(request)
            .await
            .map_err(|status| map_status("read relationships", status))?
            .into_inner();

        let mut relationships = Vec::new();
        while let Some(response) = stream
            .message()
            .await
            .map_err(|status| map_status("read relationships stream", status))?
        {
            if let Some(relationship) = response.relationship.and_then(decode_relationship) {
                relationships.push(relationship);
            }
        }

        debug!("Found {} relationships", relationships.len());
        Ok(relationships)
    }

    #[instrument(skip(self, schema))]
    async fn write_schema(&self, schema: &str) -> Result<()> {
        info!("Publishing schema to policy service");

        let mut client = self.schema_client();
        let request = self.create_request(proto::WriteSchemaRequest {
            schema: schema.to_string(),
        })?;

        client
            .write_schema(request)
            .await
            .map_err(|status| map_status("write schema", status))?;

        info!("Schema published");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn read_schema(&self) -> Result<String> {
        debug!("Reading schema from policy service");

        let mut client = self.schema_client();
        let request = self.create_request(proto::ReadSchemaRequest {})?;

        let response = client
            .read_schema(request)
            .await
            .map_err(|status| map_status("read schema", status))?;

        Ok(response.into_inner().schema_text)
    }
}

impl std::fmt::Debug for SpiceDbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpiceDbClient")
            .field("has_token", &!self.token.is_empty())
            .finish()
    }
}

// =============================================================================
// Wire Mapping
// =============================================================================

/// Splits gRPC failures into the two halves of the error contract:
/// connectivity trouble versus a request the service looked at and refused.
pub(crate) fn map_status(context: &str, status: Status) -> PalisadeError {
    match status.code() {
        Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled | Code::Unknown => {
            PalisadeError::unavailable(format!("{context}: {status}"))
        }
        _ => PalisadeError::rejected(format!("{context}: {status}")),
    }
}

pub(crate) fn encode_object(object: &ObjectRef) -> proto::ObjectReference {
    proto::ObjectReference {
        object_type: object.object_type.clone(),
        object_id: object.object_id.clone(),
    }
}

/// An empty subject relation cannot be told apart from an absent one on the
/// wire, so it is rejected here instead of being silently collapsed.
pub(crate) fn encode_subject(subject: &SubjectRef) -> Result<proto::SubjectReference> {
    if subject.relation.as_deref() == Some("") {
        return Err(PalisadeError::invalid_argument(
            "subject relation must be omitted entirely, not empty",
        ));
    }
    Ok(proto::SubjectReference {
        object: Some(encode_object(&subject.object)),
        optional_relation: subject.relation.clone().unwrap_or_default(),
    })
}

pub(crate) fn encode_relationship(relationship: &Relationship) -> Result<proto::Relationship> {
    Ok(proto::Relationship {
        resource: Some(encode_object(&relationship.resource)),
        relation: relationship.relation.clone(),
        subject: Some(encode_subject(&relationship.subject)?),
    })
}

pub(crate) fn encode_update(update: &RelationshipUpdate) -> Result<proto::RelationshipUpdate> {
    Ok(proto::RelationshipUpdate {
        operation: encode_operation(update.operation) as i32,
        relationship: Some(encode_relationship(&update.relationship)?),
    })
}

pub(crate) fn encode_operation(operation: UpdateOperation) -> proto::relationship_update::Operation {
    match operation {
        UpdateOperation::Create => proto::relationship_update::Operation::Create,
        UpdateOperation::Touch => proto::relationship_update::Operation::Touch,
        UpdateOperation::Delete => proto::relationship_update::Operation::Delete,
    }
}

pub(crate) fn encode_consistency(consistency: Consistency) -> proto::Consistency {
    let requirement = match consistency {
        Consistency::MinimizeLatency => proto::consistency::Requirement::MinimizeLatency(true),
        Consistency::AtLeastAsFresh(token) => {
            proto::consistency::Requirement::AtLeastAsFresh(proto::ZedToken { token })
        }
        Consistency::FullyConsistent => proto::consistency::Requirement::FullyConsistent(true),
    };
    proto::Consistency {
        requirement: Some(requirement),
    }
}

pub(crate) fn decode_permissionship(code: i32) -> Permissionship {
    use proto::CheckPermissionResponsePermissionship as Wire;
    match Wire::try_from(code) {
        Ok(Wire::NoPermission) => Permissionship::NoPermission,
        Ok(Wire::HasPermission) => Permissionship::HasPermission,
        Ok(Wire::ConditionalPermission) => Permissionship::Conditional,
        Ok(Wire::Unspecified) | Err(_) => Permissionship::Unspecified,
    }
}

pub(crate) fn decode_relationship(relationship: proto::Relationship) -> Option<Relationship> {
    let resource = relationship.resource?;
    let subject = relationship.subject?;
    let object = subject.object?;

    let relation = if subject.optional_relation.is_empty() {
        None
    } else {
        Some(subject.optional_relation)
    };

    Some(Relationship {
        resource: ObjectRef::new(resource.object_type, resource.object_id),
        relation: relationship.relation,
        subject: SubjectRef {
            object: ObjectRef::new(object.object_type, object.object_id),
            relation,
        },
    })
}
