//! Request-scoped values the gate reads and augments.

use std::time::Duration;

use tokio::time::Instant;

use rolegate_domain::model::{AccountInfo, TenantContext};

/// Identity of the caller, already validated upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityToken {
    pub mail: String,
}

impl IdentityToken {
    pub fn new(mail: impl Into<String>) -> Self {
        Self { mail: mail.into() }
    }
}

/// Values attached to a request before it reaches the gate.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub token: Option<IdentityToken>,
    pub tenant: Option<TenantContext>,
    /// Set by the gate once the resource's account has been resolved.
    pub account_info: Option<AccountInfo>,
    /// Every downstream call must finish before this instant.
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: IdentityToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_tenant(mut self, tenant: TenantContext) -> Self {
        self.tenant = Some(tenant);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the deadline `timeout` from now, keeping an earlier one.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        match self.deadline {
            Some(existing) if existing <= candidate => self,
            _ => self.with_deadline(candidate),
        }
    }
}
