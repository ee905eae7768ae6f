//! rolegate-storage: Backends for the collaborator traits
//!
//! This crate provides the concrete implementations of the interfaces
//! defined in `rolegate-domain`:
//! - In-memory policy engine, workspace API and identity directory for
//!   tests and local development
//! - HTTP clients for an OpenFGA-compatible policy engine and a
//!   KCP-style workspace API
//! - The reloadable YAML role catalog
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              rolegate-storage                │
//! ├─────────────────────────────────────────────┤
//! │  memory/     - In-memory implementations    │
//! │  http/       - OpenFGA and workspace clients│
//! │  catalog.rs  - YAML role catalog            │
//! │  notifier.rs - Role change log sink         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod http;
pub mod memory;
pub mod notifier;

// Re-export commonly used types
pub use catalog::YamlRoleCatalog;
pub use http::{scoped_workspace_url, KcpWorkspaceClient, OpenFgaHttpEngine};
pub use memory::{
    EngineOp, MemoryIdentityDirectory, MemoryPolicyEngine, MemoryRoleChangeNotifier,
    MemoryWorkspace, WorkspaceOp,
};
pub use notifier::TracingRoleChangeNotifier;
