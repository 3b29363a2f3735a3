//! Node provisioning against the cloud provider.
//!
//! [`HcloudProvider`] owns the session's node registry and turns node
//! templates into concrete, addressed nodes. Creation is idempotent by
//! node name: an existing server is loaded instead of recreated, so the
//! repair path after a partial failure is simply to re-run.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use kubeforge_cloud::{CloudApi, CloudApiError, Server, ServerCreateOpts};

use crate::action::ActionTracker;
use crate::node::{Cluster, Node, NodeCommand, NodeRegistry, NodeTemplate, PrivateAddressScheme};
use crate::progress::ProgressReporter;

/// OS image installed on every node.
const NODE_IMAGE: &str = "ubuntu-16.04";

/// Errors that can occur while provisioning nodes.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Cloud API call failed.
    #[error(transparent)]
    Cloud(#[from] CloudApiError),

    /// The node set contains no master.
    #[error("no master node found")]
    NoMasterNode,

    /// No placement zones were given.
    #[error("no placement zones given")]
    NoPlacementZones,

    /// A node number does not fit its role's address partition.
    #[error("node number {node_number} overflows the {role} address partition (width {width})")]
    AddressPartitionOverflow {
        /// Role whose partition overflowed.
        role: &'static str,
        /// Offending node number.
        node_number: usize,
        /// Configured partition width.
        width: u8,
    },

    /// The action event stream ended without a terminal event.
    #[error("action event stream closed before a terminal event")]
    ActionStreamClosed,
}

/// Provider-facing surface consumed by the cluster installation flow.
///
/// Alternative providers implement this to plug into the same flow; the
/// install-command hook exists so they can inject provider-specific
/// steps without changing the provisioning contract.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Create `count` etcd nodes, numbered from 1.
    async fn create_etcd_nodes(
        &mut self,
        ssh_key_name: &str,
        machine_type: &str,
        zones: &[String],
        count: usize,
    ) -> Result<(), ProvisionError>;

    /// Create `count` master nodes, numbered from 1. `is_etcd` marks
    /// them as combined etcd+master nodes.
    async fn create_master_nodes(
        &mut self,
        ssh_key_name: &str,
        machine_type: &str,
        zones: &[String],
        count: usize,
        is_etcd: bool,
    ) -> Result<(), ProvisionError>;

    /// Create `count` worker nodes numbered from `offset + 1`, so a
    /// worker pool can grow without renumbering existing workers.
    /// Returns the created batch.
    async fn create_worker_nodes(
        &mut self,
        ssh_key_name: &str,
        machine_type: &str,
        zones: &[String],
        count: usize,
        offset: usize,
    ) -> Result<Vec<Node>, ProvisionError>;

    /// Replace the node set, e.g. when resuming from persisted state.
    fn set_nodes(&mut self, nodes: Vec<Node>);

    /// All nodes in creation order.
    fn all_nodes(&self) -> &[Node];

    /// Master nodes only.
    fn master_nodes(&self) -> Vec<Node>;

    /// Etcd nodes only.
    fn etcd_nodes(&self) -> Vec<Node>;

    /// Worker nodes only.
    fn worker_nodes(&self) -> Vec<Node>;

    /// First master in insertion order.
    ///
    /// # Errors
    /// Returns [`ProvisionError::NoMasterNode`] when the set has none.
    fn master_node(&self) -> Result<&Node, ProvisionError>;

    /// Snapshot of the cluster: name plus the full node set.
    fn cluster(&self) -> Cluster;

    /// Extra install commands to run on masters. Empty in the base case.
    fn additional_master_install_commands(&self) -> Vec<NodeCommand>;

    /// Whether any creation was awaited this session. Callers use this
    /// to decide whether to pause for propagation before proceeding.
    fn must_wait(&self) -> bool;
}

/// Hetzner Cloud implementation of [`ClusterProvider`].
pub struct HcloudProvider {
    api: Arc<dyn CloudApi>,
    cluster_name: String,
    registry: NodeRegistry,
    address_scheme: PrivateAddressScheme,
    tracker: ActionTracker,
    reporter: ProgressReporter,
    cloud_init_file: Option<PathBuf>,
    token: String,
    waited: bool,
}

impl HcloudProvider {
    /// Create a provider for one provisioning session.
    pub fn new(
        cluster_name: impl Into<String>,
        api: Arc<dyn CloudApi>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            tracker: ActionTracker::new(Arc::clone(&api)),
            api,
            cluster_name: cluster_name.into(),
            registry: NodeRegistry::new(),
            address_scheme: PrivateAddressScheme::default(),
            reporter: ProgressReporter::new(),
            cloud_init_file: None,
            token: token.into(),
            waited: false,
        }
    }

    /// Override the private address scheme.
    #[must_use]
    pub fn with_address_scheme(mut self, scheme: PrivateAddressScheme) -> Self {
        self.address_scheme = scheme;
        self
    }

    /// Override the action tracker (e.g. with tighter timing).
    #[must_use]
    pub fn with_tracker(mut self, tracker: ActionTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Override the progress reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Set a cloud-init file whose contents become user data for every
    /// created server. An unreadable file is skipped at create time.
    pub fn set_cloud_init_file(&mut self, path: impl Into<PathBuf>) {
        self.cloud_init_file = Some(path.into());
    }

    /// The API token, carried for the installation phase.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Create `count` nodes from `template`, numbered `offset + 1`
    /// onwards, distributed round-robin over `zones`.
    ///
    /// Creation is sequential: each node's creation action is awaited
    /// before the next node starts. On the first failure the whole batch
    /// aborts; nodes already created stay recorded, and re-running with
    /// the same parameters is safe because existing servers are loaded
    /// by name instead of recreated.
    ///
    /// # Errors
    /// Any cloud API failure, a missing SSH key, empty `zones`, or an
    /// address-partition overflow aborts the batch.
    pub async fn create_nodes(
        &mut self,
        suffix: &str,
        template: NodeTemplate,
        zones: &[String],
        count: usize,
        offset: usize,
    ) -> Result<Vec<Node>, ProvisionError> {
        if zones.is_empty() {
            return Err(ProvisionError::NoPlacementZones);
        }

        let ssh_key = self.api.ssh_key_by_name(&template.ssh_key_name).await?;

        let user_data = match &self.cloud_init_file {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(contents) => Some(contents),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Skipping unreadable cloud-init file");
                    None
                }
            },
            None => None,
        };

        let mut created = Vec::with_capacity(count);
        for i in 0..count {
            let node_number = i + 1 + offset;
            let name = format!("{}-{}-{:02}", self.cluster_name, suffix, node_number);
            let zone = &zones[i % zones.len()];
            let private_ip = self.address_scheme.address(&template, node_number)?;

            let server = self
                .ensure_server(ServerCreateOpts {
                    name: name.clone(),
                    server_type: template.machine_type.clone(),
                    image: NODE_IMAGE.to_string(),
                    location: zone.clone(),
                    ssh_keys: vec![ssh_key.name.clone()],
                    user_data: user_data.clone(),
                })
                .await?;

            let public_ip = server.public_ipv4.unwrap_or_default();
            info!(node = %name, public_ip = %public_ip, private_ip = %private_ip, "Created node");

            let node = Node {
                name,
                is_master: template.is_master,
                is_etcd: template.is_etcd,
                machine_type: template.machine_type.clone(),
                public_ip,
                private_ip,
                ssh_key_name: template.ssh_key_name.clone(),
            };
            self.registry.push(node.clone());
            created.push(node);
        }

        Ok(created)
    }

    /// Create-or-fetch reconciliation for a named server.
    ///
    /// Fetches by name first; an existing server is returned unchanged
    /// with no action to await. Otherwise the server is created and its
    /// creation action awaited. A naming conflict (another caller won
    /// the race) falls back to fetch-by-name and counts as success.
    async fn ensure_server(&mut self, opts: ServerCreateOpts) -> Result<Server, ProvisionError> {
        if let Some(server) = self.api.server_by_name(&opts.name).await? {
            info!(server = %opts.name, "Loading existing server");
            return Ok(server);
        }

        info!(server = %opts.name, location = %opts.location, "Creating server");
        let name = opts.name.clone();
        let result = match self.api.create_server(opts).await {
            Ok(result) => result,
            Err(CloudApiError::Conflict(_)) => {
                warn!(server = %name, "Create conflicted, loading existing server");
                return self
                    .api
                    .server_by_name(&name)
                    .await?
                    .ok_or(ProvisionError::Cloud(CloudApiError::NotFound(name)));
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(action) = result.action {
            let events = self.tracker.track(action.id);
            self.reporter.report(events).await?;
            self.waited = true;
        }

        Ok(result.server)
    }
}

#[async_trait]
impl ClusterProvider for HcloudProvider {
    async fn create_etcd_nodes(
        &mut self,
        ssh_key_name: &str,
        machine_type: &str,
        zones: &[String],
        count: usize,
    ) -> Result<(), ProvisionError> {
        let template = NodeTemplate {
            ssh_key_name: ssh_key_name.to_string(),
            machine_type: machine_type.to_string(),
            is_master: false,
            is_etcd: true,
        };
        self.create_nodes("etcd", template, zones, count, 0).await?;
        Ok(())
    }

    async fn create_master_nodes(
        &mut self,
        ssh_key_name: &str,
        machine_type: &str,
        zones: &[String],
        count: usize,
        is_etcd: bool,
    ) -> Result<(), ProvisionError> {
        let template = NodeTemplate {
            ssh_key_name: ssh_key_name.to_string(),
            machine_type: machine_type.to_string(),
            is_master: true,
            is_etcd,
        };
        self.create_nodes("master", template, zones, count, 0)
            .await?;
        Ok(())
    }

    async fn create_worker_nodes(
        &mut self,
        ssh_key_name: &str,
        machine_type: &str,
        zones: &[String],
        count: usize,
        offset: usize,
    ) -> Result<Vec<Node>, ProvisionError> {
        let template = NodeTemplate {
            ssh_key_name: ssh_key_name.to_string(),
            machine_type: machine_type.to_string(),
            is_master: false,
            is_etcd: false,
        };
        self.create_nodes("worker", template, zones, count, offset)
            .await
    }

    fn set_nodes(&mut self, nodes: Vec<Node>) {
        self.registry.set(nodes);
    }

    fn all_nodes(&self) -> &[Node] {
        self.registry.all()
    }

    fn master_nodes(&self) -> Vec<Node> {
        self.registry.masters()
    }

    fn etcd_nodes(&self) -> Vec<Node> {
        self.registry.etcd()
    }

    fn worker_nodes(&self) -> Vec<Node> {
        self.registry.workers()
    }

    fn master_node(&self) -> Result<&Node, ProvisionError> {
        self.registry.first_master().ok_or(ProvisionError::NoMasterNode)
    }

    fn cluster(&self) -> Cluster {
        Cluster {
            name: self.cluster_name.clone(),
            nodes: self.registry.all().to_vec(),
        }
    }

    fn additional_master_install_commands(&self) -> Vec<NodeCommand> {
        Vec::new()
    }

    fn must_wait(&self) -> bool {
        self.waited
    }
}
