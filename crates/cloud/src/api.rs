//! Cloud API trait and common types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during cloud API operations.
#[derive(Error, Debug)]
pub enum CloudApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A resource with the same name already exists (naming race).
    #[error("Name conflict: {0}")]
    Conflict(String),

    /// The provider reported a failed action.
    #[error("Action failed: {code} - {message}")]
    ActionFailed { code: String, message: String },

    /// Operation timed out.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

// ============================================================================
// SSH key types
// ============================================================================

/// An SSH key registered with the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKey {
    /// Unique key identifier.
    pub id: i64,
    /// Key name.
    pub name: String,
    /// Key fingerprint.
    pub fingerprint: String,
}

// ============================================================================
// Server types
// ============================================================================

/// Server status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// Server is being created.
    Initializing,
    /// Server is running.
    Running,
    /// Server is powered off.
    Off,
    /// Unknown status.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::Off => write!(f, "off"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A virtual machine on the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    /// Unique server identifier.
    pub id: i64,
    /// Server name.
    pub name: String,
    /// Current status.
    pub status: ServerStatus,
    /// Public IPv4 address.
    pub public_ipv4: Option<String>,
    /// Server type/size.
    pub server_type: String,
    /// Datacenter the server lives in.
    pub datacenter: String,
    /// When the server was created.
    pub created_at: Option<DateTime<Utc>>,
}

/// Request to create a new server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCreateOpts {
    /// Server name (unique per project).
    pub name: String,
    /// Server type/size (e.g. "cx11").
    pub server_type: String,
    /// OS image to install.
    pub image: String,
    /// Location/zone to deploy in (e.g. "fsn1").
    pub location: String,
    /// SSH key names to authorize.
    pub ssh_keys: Vec<String>,
    /// Cloud-init user data (optional).
    pub user_data: Option<String>,
}

/// Result of a server create call.
///
/// `action` is `None` when the server was resolved from an existing
/// resource rather than freshly created.
#[derive(Debug, Clone)]
pub struct ServerCreateResult {
    /// The created (or resolved) server.
    pub server: Server,
    /// The asynchronous creation action, if one was started.
    pub action: Option<Action>,
}

// ============================================================================
// Action types
// ============================================================================

/// Action status reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Action is still in progress.
    Running,
    /// Action finished successfully.
    Success,
    /// Action failed.
    Error,
    /// Unknown status.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Error details attached to a failed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionError {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// An asynchronous, provider-tracked operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Unique action identifier.
    pub id: i64,
    /// Command the action performs (e.g. `create_server`).
    pub command: String,
    /// Current status.
    pub status: ActionState,
    /// Progress percentage in 0..=100.
    pub progress: u8,
    /// Error details when status is `Error`.
    pub error: Option<ActionError>,
}

/// Trait for the cloud provider operations the provisioner consumes.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Look up an SSH key by name.
    async fn ssh_key_by_name(&self, name: &str) -> Result<SshKey, CloudApiError>;

    /// Fetch a server by name, or `None` if no server with that name exists.
    async fn server_by_name(&self, name: &str) -> Result<Option<Server>, CloudApiError>;

    /// Submit a server create request.
    ///
    /// A naming race with a concurrent creator surfaces as
    /// [`CloudApiError::Conflict`].
    async fn create_server(
        &self,
        opts: ServerCreateOpts,
    ) -> Result<ServerCreateResult, CloudApiError>;

    /// Get the current status of an asynchronous action.
    async fn action_status(&self, id: i64) -> Result<Action, CloudApiError>;
}
