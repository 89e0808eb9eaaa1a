//! Session store: the single source of truth for "who is logged in".
//!
//! ARCHITECTURE
//! ============
//! `Uninitialized -> Restoring -> {Authenticated, Unauthenticated}`.
//! `initialize` hydrates from durable storage and confirms the token with the
//! identity backend. Any parse or lookup failure purges every session key and
//! lands in `Unauthenticated`; no partial session is ever exposed.
//!
//! Dependencies (backend, storage, toaster) are constructor-injected so the
//! route guard and forms can run against substitutes.
//!
//! ERROR HANDLING
//! ==============
//! This is the boundary where `AuthError` stops. Every mutating call logs the
//! error, shows a toast with its code, and returns a plain `bool`. Restore
//! failures are logged only, never toasted.
//!
//! CONCURRENCY
//! ===========
//! Each call takes a request id from a monotonic counter. A response is
//! applied only if no newer call started while it was in flight; stale
//! responses are dropped. Logout takes an id too, so a login resolving after
//! a logout cannot bring the session back. The state mutex is never held
//! across an `.await`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::error::{AuthError, ErrorCode, StorageError};
use crate::models::{AuthSession, Credentials, NewUser, ProfileUpdate, User};
use crate::services::identity::IdentityBackend;
use crate::services::toast::{Toast, Toaster};
use crate::storage::{KeyValueStore, REFRESH_TOKEN_KEY, SESSION_KEYS, TOKEN_KEY, USER_KEY};

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Constructed, `initialize` not called yet.
    Uninitialized,
    /// Hydrating from durable storage.
    Restoring,
    Authenticated,
    Unauthenticated,
}

impl SessionPhase {
    /// True while the session outcome is not yet known.
    #[must_use]
    pub fn is_settling(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Restoring)
    }
}

/// Read-only view of session state consumed by the route guard.
pub trait SessionView {
    fn phase(&self) -> SessionPhase;
    fn current_user(&self) -> Option<User>;
}

#[derive(Debug)]
struct SessionInner {
    phase: SessionPhase,
    user: Option<User>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    /// Calls currently awaiting the backend.
    in_flight: usize,
}

impl SessionInner {
    fn authenticate(&mut self, session: AuthSession) {
        self.phase = SessionPhase::Authenticated;
        self.user = Some(session.user);
        self.access_token = Some(session.access_token);
        self.refresh_token = session.refresh_token;
    }

    fn clear(&mut self) {
        self.phase = SessionPhase::Unauthenticated;
        self.user = None;
        self.access_token = None;
        self.refresh_token = None;
    }

    fn settle_unauthenticated(&mut self) {
        if self.phase != SessionPhase::Authenticated {
            self.clear();
        }
    }
}

pub struct SessionStore {
    backend: Arc<dyn IdentityBackend>,
    storage: Arc<dyn KeyValueStore>,
    toaster: Arc<dyn Toaster>,
    inner: Mutex<SessionInner>,
    request_seq: AtomicU64,
}

impl SessionStore {
    #[must_use]
    pub fn new(backend: Arc<dyn IdentityBackend>, storage: Arc<dyn KeyValueStore>, toaster: Arc<dyn Toaster>) -> Self {
        Self {
            backend,
            storage,
            toaster,
            inner: Mutex::new(SessionInner {
                phase: SessionPhase::Uninitialized,
                user: None,
                access_token: None,
                refresh_token: None,
                in_flight: 0,
            }),
            request_seq: AtomicU64::new(0),
        }
    }

    fn inner(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim a request id and mark a call in flight.
    fn begin(&self) -> u64 {
        let request = self.request_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner().in_flight += 1;
        request
    }

    /// Release the in-flight slot. Returns whether `request` is still the
    /// newest call.
    fn finish(&self, inner: &mut SessionInner, request: u64) -> bool {
        inner.in_flight = inner.in_flight.saturating_sub(1);
        let current = self.request_seq.load(Ordering::SeqCst) == request;
        if !current {
            debug!(request, "discarding stale session response");
        }
        current
    }

    fn fail(&self, err: &AuthError, action: &'static str) {
        warn!(error = %err, code = err.error_code(), action, "session operation failed");
        self.toaster.show(Toast::from_error(err));
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    fn persist(&self, session: &AuthSession) -> Result<(), AuthError> {
        let user_json = serde_json::to_string(&session.user).map_err(StorageError::from)?;
        self.storage.set(TOKEN_KEY, &session.access_token)?;
        match &session.refresh_token {
            Some(token) => self.storage.set(REFRESH_TOKEN_KEY, token)?,
            None => self.storage.remove(REFRESH_TOKEN_KEY)?,
        }
        self.storage.set(USER_KEY, &user_json)?;
        Ok(())
    }

    fn persist_user(&self, user: &User) -> Result<(), AuthError> {
        let user_json = serde_json::to_string(user).map_err(StorageError::from)?;
        self.storage.set(USER_KEY, &user_json)?;
        Ok(())
    }

    /// Remove every session key. If a key cannot be removed (unreadable
    /// medium, say) the whole store is reset instead.
    fn purge(&self) -> Result<(), StorageError> {
        let mut failed = false;
        for key in SESSION_KEYS {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "failed to remove session key");
                failed = true;
            }
        }
        if failed {
            self.storage.clear()?;
            info!("session storage reset");
        }
        Ok(())
    }

    /// Drop the session locally and on disk.
    fn end_session(&self, inner: &mut SessionInner) {
        inner.clear();
        if let Err(e) = self.purge() {
            warn!(error = %e, "session ended with stale keys on disk");
        }
    }

    // =========================================================================
    // RESTORE
    // =========================================================================

    /// Hydrate the session from durable storage. Safe to call again; each call
    /// re-runs the restore.
    pub async fn initialize(&self) -> SessionPhase {
        let request = self.begin();
        self.inner().phase = SessionPhase::Restoring;

        let outcome = self.restore().await;

        let mut inner = self.inner();
        if !self.finish(&mut inner, request) {
            return inner.phase;
        }
        match outcome {
            Ok(Some(session)) => {
                if let Err(e) = self.persist_user(&session.user) {
                    warn!(error = %e, "could not refresh stored user record");
                }
                info!(user_id = %session.user.id, "session restored");
                inner.authenticate(session);
            }
            Ok(None) => {
                debug!("no stored session");
                self.end_session(&mut inner);
            }
            Err(e) => {
                warn!(error = %e, "session restore failed; starting signed out");
                self.end_session(&mut inner);
            }
        }
        inner.phase
    }

    async fn restore(&self) -> Result<Option<AuthSession>, AuthError> {
        let Some(access_token) = self.storage.get(TOKEN_KEY)? else {
            return Ok(None);
        };
        let raw_user = self
            .storage
            .get(USER_KEY)?
            .ok_or_else(|| AuthError::SessionRestoreFailed("missing user record".into()))?;
        let stored: User = serde_json::from_str(&raw_user)
            .map_err(|e| AuthError::SessionRestoreFailed(format!("unreadable user record: {e}")))?;
        let refresh_token = self.storage.get(REFRESH_TOKEN_KEY)?;

        let user = self
            .backend
            .current_user(&access_token)
            .await
            .map_err(|e| AuthError::SessionRestoreFailed(e.to_string()))?;
        if user.id != stored.id {
            return Err(AuthError::SessionRestoreFailed("stored user does not match token".into()));
        }
        Ok(Some(AuthSession { access_token, refresh_token, user }))
    }

    // =========================================================================
    // LOGIN / REGISTER
    // =========================================================================

    pub async fn login(&self, credentials: Credentials) -> bool {
        let request = self.begin();
        let result = self.backend.login(&credentials).await;
        self.complete_sign_in(request, result, "login", "Connexion réussie")
    }

    pub async fn register(&self, new_user: NewUser) -> bool {
        let request = self.begin();
        let result = self.backend.register(&new_user).await;
        self.complete_sign_in(request, result, "register", "Inscription réussie")
    }

    fn complete_sign_in(
        &self,
        request: u64,
        result: Result<AuthSession, AuthError>,
        action: &'static str,
        success_message: &str,
    ) -> bool {
        let outcome = {
            let mut inner = self.inner();
            if !self.finish(&mut inner, request) {
                return false;
            }
            match result {
                Ok(session) => match self.persist(&session) {
                    Ok(()) => {
                        info!(user_id = %session.user.id, action, "signed in");
                        inner.authenticate(session);
                        Ok(())
                    }
                    Err(e) => {
                        self.end_session(&mut inner);
                        Err(e)
                    }
                },
                Err(e) => {
                    inner.settle_unauthenticated();
                    Err(e)
                }
            }
        };

        match outcome {
            Ok(()) => {
                self.toaster.show(Toast::success(success_message));
                true
            }
            Err(e) => {
                self.fail(&e, action);
                false
            }
        }
    }

    // =========================================================================
    // LOGOUT
    // =========================================================================

    /// Clear the local session, then ask the backend to revoke the token
    /// pair. The backend call is best-effort; its failure never blocks logout.
    pub async fn logout(&self) -> bool {
        let request = self.begin();
        let (token, refresh_token, user_id, cleared) = {
            let mut inner = self.inner();
            let token = inner.access_token.take();
            let refresh_token = inner.refresh_token.take();
            let user_id = inner.user.as_ref().map(|u| u.id);
            inner.clear();
            let cleared = self.purge();
            (token, refresh_token, user_id, cleared)
        };

        if let Some(token) = token {
            if let Err(e) = self.backend.logout(&token, refresh_token.as_deref()).await {
                warn!(error = %e, "backend logout failed; local session already cleared");
            }
        }

        {
            let mut inner = self.inner();
            self.finish(&mut inner, request);
        }

        match cleared {
            Ok(()) => {
                info!(user_id = ?user_id, "signed out");
                self.toaster.show(Toast::info("Déconnexion réussie"));
                true
            }
            Err(e) => {
                self.fail(&AuthError::Storage(e), "logout");
                false
            }
        }
    }

    // =========================================================================
    // PROFILE
    // =========================================================================

    /// Merge `update` into the current user. `id` and `created_at` never
    /// change; `email` changes only when supplied.
    pub async fn update_profile(&self, update: ProfileUpdate) -> bool {
        let token = self.inner().access_token.clone();
        let Some(token) = token else {
            self.fail(&AuthError::UpdateFailed, "update_profile");
            return false;
        };

        let request = self.begin();
        let result = self.backend.update_profile(&token, &update).await;

        let outcome = {
            let mut inner = self.inner();
            if !self.finish(&mut inner, request) {
                return false;
            }
            if inner.access_token.as_deref() != Some(token.as_str()) {
                debug!("session changed during profile update; dropping response");
                return false;
            }
            match result.and_then(|user| self.persist_user(&user).map(|()| user)) {
                Ok(user) => {
                    debug!(user_id = %user.id, "profile updated");
                    inner.user = Some(user);
                    Ok(())
                }
                Err(e) => {
                    if matches!(e, AuthError::InvalidToken | AuthError::UserNotFound) {
                        self.end_session(&mut inner);
                    }
                    Err(e)
                }
            }
        };

        match outcome {
            Ok(()) => {
                self.toaster.show(Toast::success("Profil mis à jour"));
                true
            }
            Err(e) => {
                self.fail(&e, "update_profile");
                false
            }
        }
    }

    // =========================================================================
    // REFRESH
    // =========================================================================

    /// Exchange the stored refresh token for a new token pair. A rejected
    /// refresh token ends the session.
    pub async fn refresh_session(&self) -> bool {
        let refresh_token = self.inner().refresh_token.clone();
        let Some(refresh_token) = refresh_token else {
            debug!("no refresh token to exchange");
            return false;
        };

        let request = self.begin();
        let result = self.backend.refresh(&refresh_token).await;

        let outcome = {
            let mut inner = self.inner();
            if !self.finish(&mut inner, request) {
                return false;
            }
            match result.and_then(|session| self.persist(&session).map(|()| session)) {
                Ok(session) => {
                    debug!(user_id = %session.user.id, "session refreshed");
                    inner.authenticate(session);
                    Ok(())
                }
                Err(e) => {
                    self.end_session(&mut inner);
                    Err(e)
                }
            }
        };

        match outcome {
            Ok(()) => true,
            Err(e) => {
                self.fail(&e, "refresh_session");
                false
            }
        }
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Pure lookup in the current user's permissions. `false` without a
    /// session.
    #[must_use]
    pub fn has_permission(&self, name: &str) -> bool {
        self.inner()
            .user
            .as_ref()
            .is_some_and(|u| u.has_permission(name))
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.inner().phase
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.inner().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner().phase == SessionPhase::Authenticated
    }

    /// True while restoring or while any call awaits the backend.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        let inner = self.inner();
        inner.phase == SessionPhase::Restoring || inner.in_flight > 0
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner().access_token.clone()
    }
}

impl SessionView for SessionStore {
    fn phase(&self) -> SessionPhase {
        SessionStore::phase(self)
    }

    fn current_user(&self) -> Option<User> {
        SessionStore::current_user(self)
    }
}
