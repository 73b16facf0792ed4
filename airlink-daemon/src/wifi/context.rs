/*!
 * Shared Wireless State
 * Owned context handed to every component instead of process globals
 */

use chrono::Utc;
use tokio::sync::watch;

use super::{
    AttemptRecord, AttemptState, AuthorizationState, Binding, NetworkDescriptor, NetworkHandle,
    ResultSet,
};

/// Process-wide wireless state.
///
/// Each field lives in a watch channel: writers replace the whole value,
/// readers always see one consistent value and can wait for the next one.
/// Concurrent writers follow last-writer-wins.
pub struct WifiContext {
    authorization: watch::Sender<AuthorizationState>,
    results: watch::Sender<ResultSet>,
    binding: watch::Sender<Option<Binding>>,
    last_attempt: watch::Sender<Option<AttemptRecord>>,
}

impl WifiContext {
    pub fn new() -> Self {
        Self {
            authorization: watch::Sender::new(AuthorizationState::Unknown),
            results: watch::Sender::new(ResultSet::default()),
            binding: watch::Sender::new(None),
            last_attempt: watch::Sender::new(None),
        }
    }

    pub fn authorization(&self) -> AuthorizationState {
        *self.authorization.borrow()
    }

    pub fn is_authorized(&self) -> bool {
        self.authorization() == AuthorizationState::Granted
    }

    pub fn current_results(&self) -> Vec<NetworkDescriptor> {
        self.results.borrow().networks.clone()
    }

    pub fn result_set(&self) -> ResultSet {
        self.results.borrow().clone()
    }

    pub fn subscribe_results(&self) -> watch::Receiver<ResultSet> {
        self.results.subscribe()
    }

    pub fn binding(&self) -> Option<NetworkHandle> {
        self.binding.borrow().as_ref().map(|binding| binding.handle.clone())
    }

    pub fn bound_network(&self) -> Option<Binding> {
        self.binding.borrow().clone()
    }

    pub fn last_attempt(&self) -> Option<AttemptRecord> {
        self.last_attempt.borrow().clone()
    }

    pub(super) fn set_authorization(&self, state: AuthorizationState) {
        self.authorization.send_replace(state);
    }

    pub(super) fn replace_results(&self, networks: Vec<NetworkDescriptor>) {
        self.results.send_replace(ResultSet {
            networks,
            updated_at: Some(Utc::now()),
        });
    }

    pub(super) fn set_binding(&self, binding: Binding) {
        self.binding.send_replace(Some(binding));
    }

    /// Clears the binding if it still points at `handle`.
    pub(super) fn clear_binding(&self, handle: &NetworkHandle) -> bool {
        self.binding.send_if_modified(|current| {
            if current.as_ref().is_some_and(|binding| &binding.handle == handle) {
                *current = None;
                true
            } else {
                false
            }
        })
    }

    /// Tracks the most recently started attempt. Updates for an older,
    /// superseded attempt are dropped.
    pub(super) fn record_attempt(&self, record: AttemptRecord) {
        self.last_attempt.send_if_modified(|current| {
            let relevant = match current {
                Some(existing) => {
                    existing.id == record.id || record.state == AttemptState::Requested
                }
                None => true,
            };
            if relevant {
                *current = Some(record);
            }
            relevant
        });
    }
}
