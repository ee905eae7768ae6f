//! In-memory implementations for testing and local development.

mod engine;
mod identity;
mod notifier;
mod workspace;

pub use engine::{EngineOp, MemoryPolicyEngine};
pub use identity::MemoryIdentityDirectory;
pub use notifier::MemoryRoleChangeNotifier;
pub use workspace::{MemoryWorkspace, WorkspaceOp};
