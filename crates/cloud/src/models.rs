//! Hetzner Cloud API request and response models.
//!
//! Covers the subset of the v1 API the provisioner consumes:
//! SSH keys, servers, and actions.

use serde::{Deserialize, Serialize};

// ============================================================================
// SSH key types
// ============================================================================

/// SSH key resource.
#[derive(Debug, Deserialize)]
pub struct SshKeyResource {
    /// Key ID.
    pub id: i64,
    /// Key name.
    pub name: String,
    /// Key fingerprint.
    pub fingerprint: String,
    /// Public key data.
    pub public_key: String,
}

/// Response for `GET /ssh_keys`.
#[derive(Debug, Deserialize)]
pub struct SshKeyListResponse {
    /// Matching keys.
    #[serde(default)]
    pub ssh_keys: Vec<SshKeyResource>,
}

// ============================================================================
// Server types
// ============================================================================

/// Server resource.
#[derive(Debug, Deserialize)]
pub struct ServerResource {
    /// Server ID.
    pub id: i64,
    /// Server name.
    pub name: String,
    /// Server status string (e.g. "initializing", "running").
    pub status: String,
    /// Public network configuration.
    #[serde(default)]
    pub public_net: Option<PublicNet>,
    /// Server type reference.
    #[serde(default)]
    pub server_type: Option<ServerTypeRef>,
    /// Datacenter reference.
    #[serde(default)]
    pub datacenter: Option<DatacenterRef>,
    /// Creation timestamp (ISO 8601).
    #[serde(default)]
    pub created: Option<String>,
}

/// Public network block of a server.
#[derive(Debug, Deserialize)]
pub struct PublicNet {
    /// Primary IPv4 assignment.
    #[serde(default)]
    pub ipv4: Option<Ipv4Assignment>,
}

/// IPv4 address assignment.
#[derive(Debug, Deserialize)]
pub struct Ipv4Assignment {
    /// Dotted-quad address.
    pub ip: String,
}

/// Server type reference.
#[derive(Debug, Deserialize)]
pub struct ServerTypeRef {
    /// Type name (e.g. "cx11").
    pub name: String,
}

/// Datacenter reference.
#[derive(Debug, Deserialize)]
pub struct DatacenterRef {
    /// Datacenter name (e.g. "fsn1-dc14").
    pub name: String,
}

/// Response for `GET /servers`.
#[derive(Debug, Deserialize)]
pub struct ServerListResponse {
    /// Matching servers.
    #[serde(default)]
    pub servers: Vec<ServerResource>,
}

/// Request body for `POST /servers`.
#[derive(Debug, Serialize)]
pub struct CreateServerRequest {
    /// Server name.
    pub name: String,
    /// Server type name.
    pub server_type: String,
    /// Image name or slug.
    pub image: String,
    /// Location name.
    pub location: String,
    /// SSH key names to authorize.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    /// Cloud-init user data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

/// Response for `POST /servers`.
#[derive(Debug, Deserialize)]
pub struct CreateServerResponse {
    /// The created server.
    pub server: ServerResource,
    /// The asynchronous creation action.
    pub action: ActionResource,
}

// ============================================================================
// Action types
// ============================================================================

/// Action resource.
#[derive(Debug, Deserialize)]
pub struct ActionResource {
    /// Action ID.
    pub id: i64,
    /// Command name (e.g. `create_server`).
    pub command: String,
    /// Status string: "running", "success", or "error".
    pub status: String,
    /// Progress percentage 0..=100.
    pub progress: u8,
    /// Error details when status is "error".
    #[serde(default)]
    pub error: Option<ActionErrorBody>,
}

/// Error block of a failed action.
#[derive(Debug, Deserialize)]
pub struct ActionErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

/// Response for `GET /actions/{id}`.
#[derive(Debug, Deserialize)]
pub struct ActionResponse {
    /// The action.
    pub action: ActionResource,
}

// ============================================================================
// Error envelope
// ============================================================================

/// Error envelope returned by the API on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// Error details of a failed API call.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable code (e.g. `uniqueness_error`, `not_found`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}
