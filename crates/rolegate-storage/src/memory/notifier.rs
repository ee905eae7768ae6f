//! Recording role-change notifier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use rolegate_domain::error::NotifyError;
use rolegate_domain::traits::{RoleChangeEvent, RoleChangeNotifier};

/// Keeps every delivered event in memory.
#[derive(Debug, Default)]
pub struct MemoryRoleChangeNotifier {
    events: Mutex<Vec<RoleChangeEvent>>,
    failing: AtomicBool,
}

impl MemoryRoleChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, in delivery order.
    pub fn events(&self) -> Vec<RoleChangeEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Makes deliveries fail. Failed events are not recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

#[async_trait]
impl RoleChangeNotifier for MemoryRoleChangeNotifier {
    async fn roles_changed(&self, event: RoleChangeEvent) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(NotifyError {
                message: "notification sink unavailable".to_string(),
            });
        }
        let mut events = self.events.lock().map_err(|_| NotifyError {
            message: "event log poisoned".to_string(),
        })?;
        events.push(event);
        Ok(())
    }
}
