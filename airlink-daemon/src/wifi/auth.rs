use std::sync::Arc;

use super::context::WifiContext;
use super::platform::AuthorizationService;
use super::{AuthorizationState, Permission};

/// Permissions every scan and result read runs under.
pub const REQUIRED_PERMISSIONS: &[Permission] = &[Permission::ScanResults, Permission::NetworkControl];

/// Gatekeeper for the permissions the core depends on.
#[derive(Clone)]
pub struct AuthorizationGate {
    ctx: Arc<WifiContext>,
    service: Arc<dyn AuthorizationService>,
}

impl AuthorizationGate {
    pub fn new(ctx: Arc<WifiContext>, service: Arc<dyn AuthorizationService>) -> Self {
        Self { ctx, service }
    }

    pub fn context(&self) -> &Arc<WifiContext> {
        &self.ctx
    }

    /// Resolves to the authorization outcome, prompting only when the
    /// platform does not currently hold a grant.
    ///
    /// Waits for as long as the authorization service takes to answer.
    /// Denial is a normal outcome and is only logged.
    pub async fn ensure_authorized(&self) -> AuthorizationState {
        if self.service.check(REQUIRED_PERMISSIONS) {
            self.ctx.set_authorization(AuthorizationState::Granted);
            return AuthorizationState::Granted;
        }

        tracing::info!("Requesting network permissions: {:?}", REQUIRED_PERMISSIONS);
        let grants = self.service.request(REQUIRED_PERMISSIONS).await;

        let state = if REQUIRED_PERMISSIONS
            .iter()
            .all(|permission| grants.get(permission).copied().unwrap_or(false))
        {
            tracing::info!("Network permissions granted");
            AuthorizationState::Granted
        } else {
            tracing::warn!("Network permissions denied, scanning disabled: {:?}", grants);
            AuthorizationState::Denied
        };

        self.ctx.set_authorization(state);
        state
    }

    /// Confirms a recorded grant still holds, without prompting.
    ///
    /// A grant the platform no longer reports is recorded as `Denied`.
    pub fn still_authorized(&self) -> bool {
        if !self.ctx.is_authorized() {
            return false;
        }
        if self.service.check(REQUIRED_PERMISSIONS) {
            return true;
        }
        self.revoke();
        false
    }

    /// Records that the platform refused an operation for lack of permission.
    pub fn revoke(&self) {
        if self.ctx.is_authorized() {
            tracing::warn!("Network permissions were revoked");
        }
        self.ctx.set_authorization(AuthorizationState::Denied);
    }
}
