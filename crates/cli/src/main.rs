//! kubeforge CLI - cluster listing surface.
//!
//! The provisioning core persists nothing; this binary owns the state
//! file that records created clusters and renders it as a table.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use kubeforge_cluster::Cluster;

/// kubeforge - provision and inspect Kubernetes clusters on Hetzner Cloud.
#[derive(Parser)]
#[command(name = "kubeforge")]
#[command(about = "Provision and inspect Kubernetes clusters on Hetzner Cloud")]
struct Cli {
    /// Path to the cluster state file.
    #[arg(long, env = "KUBEFORGE_STATE_FILE", default_value = "clusters.json")]
    state_file: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster commands.
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// List all created clusters.
    #[command(alias = "ls")]
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Cluster {
            command: ClusterCommands::List,
        } => {
            let clusters = load_clusters(&cli.state_file)?;
            print!("{}", render_cluster_table(&clusters));
        }
    }

    Ok(())
}

/// Load the cluster state file. A missing file means no clusters yet.
fn load_clusters(path: &Path) -> Result<Vec<Cluster>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading state file {}", path.display()))?;
    debug!(path = %path.display(), "Loaded cluster state file");
    serde_json::from_str(&contents)
        .with_context(|| format!("parsing state file {}", path.display()))
}

/// Render clusters as a NAME / NODES / MASTER IP table.
///
/// The master IP is the first master node's public address; a cluster
/// without a master gets an empty column.
fn render_cluster_table(clusters: &[Cluster]) -> String {
    let mut rows = vec![(
        "NAME".to_string(),
        "NODES".to_string(),
        "MASTER IP".to_string(),
    )];

    for cluster in clusters {
        let master_ip = cluster
            .nodes
            .iter()
            .find(|node| node.is_master)
            .map(|node| node.public_ip.clone())
            .unwrap_or_default();
        rows.push((
            cluster.name.clone(),
            cluster.nodes.len().to_string(),
            master_ip,
        ));
    }

    let name_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0);
    let nodes_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(0);

    let mut out = String::new();
    for (name, nodes, master_ip) in rows {
        out.push_str(&format!(
            "{name:<name_width$}  {nodes:<nodes_width$}  {master_ip}\n"
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use kubeforge_cluster::Node;

    use super::*;

    fn node(name: &str, is_master: bool, public_ip: &str) -> Node {
        Node {
            name: name.to_string(),
            is_master,
            is_etcd: false,
            machine_type: "cx11".to_string(),
            public_ip: public_ip.to_string(),
            private_ip: "10.0.1.11".to_string(),
            ssh_key_name: "key1".to_string(),
        }
    }

    #[test]
    fn test_table_lists_master_ip() {
        let clusters = vec![Cluster {
            name: "demo".to_string(),
            nodes: vec![
                node("demo-master-01", true, "95.216.1.10"),
                node("demo-worker-01", false, "95.216.1.11"),
            ],
        }];

        let table = render_cluster_table(&clusters);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[1].contains("demo"));
        assert!(lines[1].contains('2'));
        assert!(lines[1].contains("95.216.1.10"));
    }

    #[test]
    fn test_masterless_cluster_gets_empty_column() {
        let clusters = vec![Cluster {
            name: "edge".to_string(),
            nodes: vec![node("edge-worker-01", false, "95.216.1.12")],
        }];

        let table = render_cluster_table(&clusters);
        assert!(!table.contains("95.216.1.12"));
    }

    #[test]
    fn test_missing_state_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let clusters = load_clusters(&dir.path().join("nope.json")).unwrap();
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.json");

        let clusters = vec![Cluster {
            name: "demo".to_string(),
            nodes: vec![node("demo-master-01", true, "95.216.1.10")],
        }];
        std::fs::write(&path, serde_json::to_string(&clusters).unwrap()).unwrap();

        let loaded = load_clusters(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "demo");
    }
}
