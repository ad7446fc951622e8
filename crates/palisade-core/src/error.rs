//! Error types for the Palisade authorization layer

use thiserror::Error;

/// Error taxonomy shared across the workspace.
///
/// The first four variants are local: they are raised before any request is
/// built and never reach the policy service. `RequestRejected` and
/// `ServiceUnavailable` surface remote outcomes and must stay distinct: a
/// permission check answers with a definitive boolean or fails with one of
/// them, and never reports "unreachable" as "denied".
#[derive(Error, Debug)]
pub enum PalisadeError {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("permission {action:?} is not declared for product {product:?}")]
    UnknownPermission { product: String, action: String },

    #[error("cannot derive an object type from label {label:?}")]
    InvalidIdentifier { label: String },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("policy service rejected the request: {message}")]
    RequestRejected { message: String },

    #[error("policy service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

impl PalisadeError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn unknown_permission(product: impl Into<String>, action: impl Into<String>) -> Self {
        Self::UnknownPermission {
            product: product.into(),
            action: action.into(),
        }
    }

    pub fn invalid_identifier(label: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            label: label.into(),
        }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::RequestRejected {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// True for errors raised before any request was sent.
    pub fn is_local(&self) -> bool {
        !matches!(
            self,
            Self::RequestRejected { .. } | Self::ServiceUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PalisadeError>;
