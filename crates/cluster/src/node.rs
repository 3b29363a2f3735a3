//! Node data model, node registry, and the private address scheme.

use serde::{Deserialize, Serialize};

use crate::provision::ProvisionError;

/// A provisioned cluster member.
///
/// Nodes are created once and never mutated afterwards; the name is the
/// sole idempotency key against the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Node name, `<cluster>-<role>-<NN>`.
    pub name: String,
    /// Whether this node runs the control plane.
    pub is_master: bool,
    /// Whether this node runs etcd.
    pub is_etcd: bool,
    /// Machine type (e.g. "cx11").
    pub machine_type: String,
    /// Public IPv4 address.
    pub public_ip: String,
    /// Private IPv4 address within the cluster network.
    pub private_ip: String,
    /// SSH key authorized on the node.
    pub ssh_key_name: String,
}

impl Node {
    /// A worker carries neither the master nor the etcd flag.
    #[must_use]
    pub fn is_worker(&self) -> bool {
        !self.is_master && !self.is_etcd
    }
}

/// Desired shape for a batch of nodes. Ephemeral, passed by value.
#[derive(Debug, Clone)]
pub struct NodeTemplate {
    /// SSH key name to authorize on each node.
    pub ssh_key_name: String,
    /// Machine type for each node.
    pub machine_type: String,
    /// Whether the nodes run the control plane.
    pub is_master: bool,
    /// Whether the nodes run etcd.
    pub is_etcd: bool,
}

/// A named cluster snapshot: the cluster name plus its full node set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster name.
    pub name: String,
    /// All nodes, in creation order.
    pub nodes: Vec<Node>,
}

/// A named shell command to run on a node during installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCommand {
    /// Step name shown to the user.
    pub name: String,
    /// Command line to execute.
    pub command: String,
}

/// Ordered, append-only collection of the session's nodes.
///
/// Owned by the provider facade; the provisioning loop appends, the
/// query operations filter. A fresh registry per session keeps state
/// explicit instead of accumulating on a shared instance.
#[derive(Debug, Default, Clone)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
}

impl NodeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node.
    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Replace the node set (e.g. when adopting persisted state).
    pub fn set(&mut self, nodes: Vec<Node>) {
        self.nodes = nodes;
    }

    /// All nodes in insertion order.
    #[must_use]
    pub fn all(&self) -> &[Node] {
        &self.nodes
    }

    /// Master nodes only.
    #[must_use]
    pub fn masters(&self) -> Vec<Node> {
        self.nodes.iter().filter(|n| n.is_master).cloned().collect()
    }

    /// Etcd nodes only.
    #[must_use]
    pub fn etcd(&self) -> Vec<Node> {
        self.nodes.iter().filter(|n| n.is_etcd).cloned().collect()
    }

    /// Worker nodes only.
    #[must_use]
    pub fn workers(&self) -> Vec<Node> {
        self.nodes
            .iter()
            .filter(|n| n.is_worker())
            .cloned()
            .collect()
    }

    /// First master in insertion order, if any.
    #[must_use]
    pub fn first_master(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_master)
    }
}

/// Deterministic mapping from node role and number to a private address.
///
/// Each role owns a partition of the last octet: etcd nodes sit at the
/// prefix base, masters at `master_offset`, workers at `worker_offset`.
/// A node number at or past `partition_width` would bleed into the next
/// role's partition and is rejected instead.
#[derive(Debug, Clone)]
pub struct PrivateAddressScheme {
    /// Network prefix the last octet is appended to.
    pub prefix: String,
    /// Last-octet offset for master (non-etcd) nodes.
    pub master_offset: u8,
    /// Last-octet offset for worker nodes.
    pub worker_offset: u8,
    /// Number of addresses per role partition.
    pub partition_width: u8,
}

impl Default for PrivateAddressScheme {
    fn default() -> Self {
        Self {
            prefix: "10.0.1".to_string(),
            master_offset: 10,
            worker_offset: 20,
            partition_width: 10,
        }
    }
}

impl PrivateAddressScheme {
    /// Compute the private address for a node.
    ///
    /// The etcd flag wins over the master flag, so combined etcd+master
    /// nodes land in the etcd partition.
    ///
    /// # Errors
    /// Returns [`ProvisionError::AddressPartitionOverflow`] when
    /// `node_number` does not fit the role's partition.
    pub fn address(
        &self,
        template: &NodeTemplate,
        node_number: usize,
    ) -> Result<String, ProvisionError> {
        let (role, offset) = if template.is_etcd {
            ("etcd", 0)
        } else if template.is_master {
            ("master", self.master_offset)
        } else {
            ("worker", self.worker_offset)
        };

        if node_number == 0 || node_number >= usize::from(self.partition_width) {
            return Err(ProvisionError::AddressPartitionOverflow {
                role,
                node_number,
                width: self.partition_width,
            });
        }

        Ok(format!(
            "{}.{}",
            self.prefix,
            node_number + usize::from(offset)
        ))
    }
}
