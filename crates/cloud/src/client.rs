//! Hetzner Cloud API client implementation.
//!
//! API Documentation: <https://docs.hetzner.cloud/>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::api::{
    Action, ActionError, ActionState, CloudApi, CloudApiError, Server, ServerCreateOpts,
    ServerCreateResult, ServerStatus, SshKey,
};
use crate::models::{
    ActionResource, ActionResponse, ApiErrorResponse, CreateServerRequest, CreateServerResponse,
    ServerListResponse, ServerResource, SshKeyListResponse,
};

/// Base URL for the Hetzner Cloud API.
const API_BASE_URL: &str = "https://api.hetzner.cloud/v1";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Hetzner Cloud client.
#[derive(Clone)]
pub struct HcloudClient {
    /// HTTP client.
    client: Client,
    /// API base URL.
    base_url: String,
    /// API token for authentication.
    token: String,
}

impl HcloudClient {
    /// Create a new Hetzner Cloud client.
    ///
    /// # Arguments
    /// * `token` - Hetzner Cloud API token
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(token: impl Into<String>) -> Result<Self, CloudApiError> {
        Self::with_base_url(token, API_BASE_URL)
    }

    /// Create a client against a custom base URL. Used by tests.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn with_base_url(
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, CloudApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    /// Make an authenticated GET request.
    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, CloudApiError> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated POST request.
    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, CloudApiError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Handle API response, parsing JSON or mapping the error envelope.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CloudApiError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                CloudApiError::Serialization(e)
            });
        }

        // Pull code/message out of the error envelope when present.
        let (code, message) = match serde_json::from_str::<ApiErrorResponse>(&text) {
            Ok(envelope) => (envelope.error.code, envelope.error.message),
            Err(_) => (String::new(), text),
        };

        if status == StatusCode::NOT_FOUND || code == "not_found" {
            Err(CloudApiError::NotFound(message))
        } else if status == StatusCode::CONFLICT || code == "uniqueness_error" {
            Err(CloudApiError::Conflict(message))
        } else {
            Err(CloudApiError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Convert a wire server to our Server type.
    fn to_server(server: &ServerResource) -> Server {
        let status = match server.status.as_str() {
            "initializing" | "starting" => ServerStatus::Initializing,
            "running" => ServerStatus::Running,
            "off" | "stopping" => ServerStatus::Off,
            _ => ServerStatus::Unknown,
        };

        let public_ipv4 = server
            .public_net
            .as_ref()
            .and_then(|net| net.ipv4.as_ref())
            .map(|ipv4| ipv4.ip.clone());

        Server {
            id: server.id,
            name: server.name.clone(),
            status,
            public_ipv4,
            server_type: server
                .server_type
                .as_ref()
                .map(|t| t.name.clone())
                .unwrap_or_default(),
            datacenter: server
                .datacenter
                .as_ref()
                .map(|dc| dc.name.clone())
                .unwrap_or_default(),
            created_at: server
                .created
                .as_ref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
        }
    }

    /// Convert a wire action to our Action type.
    fn to_action(action: &ActionResource) -> Action {
        let status = match action.status.as_str() {
            "running" => ActionState::Running,
            "success" => ActionState::Success,
            "error" => ActionState::Error,
            _ => ActionState::Unknown,
        };

        Action {
            id: action.id,
            command: action.command.clone(),
            status,
            progress: action.progress.min(100),
            error: action.error.as_ref().map(|e| ActionError {
                code: e.code.clone(),
                message: e.message.clone(),
            }),
        }
    }
}

#[async_trait]
impl CloudApi for HcloudClient {
    async fn ssh_key_by_name(&self, name: &str) -> Result<SshKey, CloudApiError> {
        let response: SshKeyListResponse = self.get(&format!("/ssh_keys?name={name}")).await?;

        response
            .ssh_keys
            .into_iter()
            .find(|key| key.name == name)
            .map(|key| SshKey {
                id: key.id,
                name: key.name,
                fingerprint: key.fingerprint,
            })
            .ok_or_else(|| CloudApiError::NotFound(format!("SSH key '{name}'")))
    }

    async fn server_by_name(&self, name: &str) -> Result<Option<Server>, CloudApiError> {
        let response: ServerListResponse = self.get(&format!("/servers?name={name}")).await?;

        Ok(response
            .servers
            .iter()
            .find(|server| server.name == name)
            .map(Self::to_server))
    }

    async fn create_server(
        &self,
        opts: ServerCreateOpts,
    ) -> Result<ServerCreateResult, CloudApiError> {
        debug!(
            server = %opts.name,
            server_type = %opts.server_type,
            location = %opts.location,
            "Creating server"
        );

        let body = CreateServerRequest {
            name: opts.name,
            server_type: opts.server_type,
            image: opts.image,
            location: opts.location,
            ssh_keys: opts.ssh_keys,
            user_data: opts.user_data,
        };

        let response: CreateServerResponse = self.post("/servers", &body).await?;

        Ok(ServerCreateResult {
            server: Self::to_server(&response.server),
            action: Some(Self::to_action(&response.action)),
        })
    }

    async fn action_status(&self, id: i64) -> Result<Action, CloudApiError> {
        let response: ActionResponse = self.get(&format!("/actions/{id}")).await?;
        Ok(Self::to_action(&response.action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_status_mapping() {
        let server = ServerResource {
            id: 42,
            name: "demo-master-01".to_string(),
            status: "running".to_string(),
            public_net: Some(crate::models::PublicNet {
                ipv4: Some(crate::models::Ipv4Assignment {
                    ip: "1.2.3.4".to_string(),
                }),
            }),
            server_type: Some(crate::models::ServerTypeRef {
                name: "cx11".to_string(),
            }),
            datacenter: Some(crate::models::DatacenterRef {
                name: "fsn1-dc14".to_string(),
            }),
            created: Some("2024-01-01T00:00:00+00:00".to_string()),
        };

        let converted = HcloudClient::to_server(&server);
        assert_eq!(converted.status, ServerStatus::Running);
        assert_eq!(converted.id, 42);
        assert_eq!(converted.public_ipv4, Some("1.2.3.4".to_string()));
        assert_eq!(converted.server_type, "cx11");
        assert!(converted.created_at.is_some());
    }

    #[test]
    fn test_action_error_mapping() {
        let action = ActionResource {
            id: 7,
            command: "create_server".to_string(),
            status: "error".to_string(),
            progress: 80,
            error: Some(crate::models::ActionErrorBody {
                code: "server_limit_exceeded".to_string(),
                message: "limit reached".to_string(),
            }),
        };

        let converted = HcloudClient::to_action(&action);
        assert_eq!(converted.status, ActionState::Error);
        assert_eq!(converted.progress, 80);
        let error = converted.error.unwrap();
        assert_eq!(error.code, "server_limit_exceeded");
    }

    #[test]
    fn test_create_request_serialization() {
        let req = CreateServerRequest {
            name: "demo-worker-01".to_string(),
            server_type: "cx21".to_string(),
            image: "ubuntu-16.04".to_string(),
            location: "nbg1".to_string(),
            ssh_keys: vec!["key1".to_string()],
            user_data: None,
        };

        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("demo-worker-01"));
        assert!(json.contains("cx21"));
        // user_data is omitted when not set
        assert!(!json.contains("user_data"));
    }

    #[test]
    fn test_create_response_deserialization() {
        let json = r#"{
            "server": {
                "id": 544037,
                "name": "demo-etcd-01",
                "status": "initializing",
                "public_net": {"ipv4": {"ip": "95.216.1.10"}},
                "server_type": {"name": "cx11"},
                "datacenter": {"name": "fsn1-dc14"},
                "created": "2024-03-01T12:00:00+00:00"
            },
            "action": {
                "id": 13,
                "command": "create_server",
                "status": "running",
                "progress": 0,
                "error": null
            }
        }"#;

        let response: CreateServerResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.server.id, 544037);
        assert_eq!(response.action.status, "running");
    }
}
