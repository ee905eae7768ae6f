//! HTTP clients for the policy engine and the workspace API.

mod openfga;
mod workspace;

pub use openfga::OpenFgaHttpEngine;
pub use workspace::{scoped_workspace_url, KcpWorkspaceClient};
