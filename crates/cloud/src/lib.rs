//! Hetzner Cloud API boundary for kubeforge.
//!
//! This crate owns the [`CloudApi`] trait — the four provider operations
//! the node provisioner consumes — together with the domain types, the
//! error enum, and a `reqwest`-based client for the Hetzner Cloud v1 API.
//!
//! The provisioning core (`kubeforge-cluster`) depends only on the trait,
//! so tests run against an in-memory implementation and production runs
//! against [`HcloudClient`].

pub mod api;
pub mod client;
pub mod models;

pub use api::{
    Action, ActionError, ActionState, CloudApi, CloudApiError, Server, ServerCreateOpts,
    ServerCreateResult, ServerStatus, SshKey,
};
pub use client::HcloudClient;
