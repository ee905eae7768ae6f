//! Role-change sink that writes structured log events.

use async_trait::async_trait;
use tracing::info;

use rolegate_domain::error::NotifyError;
use rolegate_domain::traits::{RoleChangeEvent, RoleChangeNotifier};

/// Emits one `info` event per role change.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRoleChangeNotifier;

#[async_trait]
impl RoleChangeNotifier for TracingRoleChangeNotifier {
    async fn roles_changed(&self, event: RoleChangeEvent) -> Result<(), NotifyError> {
        info!(
            entity = %event.entity.object(),
            user_id = %event.user_id,
            added = ?event.added,
            removed = ?event.removed,
            "roles changed"
        );
        Ok(())
    }
}
