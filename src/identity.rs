// Identity provider port - the engine only consumes "who is signed in"
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{EngineError, EngineResult};
use crate::models::UserId;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, if any.
    fn current_user(&self) -> Option<UserId>;

    /// Irreversibly delete the signed-in account. Signs the session out.
    async fn delete_current_account(&self) -> EngineResult<()>;
}

pub type DynIdentityProvider = Arc<dyn IdentityProvider>;

/// Require an identity before touching the store.
pub fn require_user(identity: &dyn IdentityProvider) -> EngineResult<UserId> {
    identity.current_user().ok_or(EngineError::NotAuthenticated)
}

/// In-process session holder used by the CLI and tests.
#[derive(Default)]
pub struct LocalIdentityProvider {
    current: Mutex<Option<UserId>>,
    deleted: Mutex<Vec<UserId>>,
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<UserId>) -> Self {
        let provider = Self::new();
        provider.sign_in(user_id);
        provider
    }

    pub fn sign_in(&self, user_id: impl Into<UserId>) {
        *lock(&self.current) = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *lock(&self.current) = None;
    }

    /// Accounts removed through this provider, oldest first.
    pub fn deleted_accounts(&self) -> Vec<UserId> {
        lock(&self.deleted).clone()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn current_user(&self) -> Option<UserId> {
        lock(&self.current).clone()
    }

    async fn delete_current_account(&self) -> EngineResult<()> {
        let user = lock(&self.current)
            .take()
            .ok_or(EngineError::NotAuthenticated)?;
        tracing::info!("Identity account {} deleted", user);
        lock(&self.deleted).push(user);
        Ok(())
    }
}

// A poisoned lock only means another thread panicked mid-assignment of an Option
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
