//! Mock identity backend: in-memory accounts, opaque tokens, fixed latency.
//!
//! ARCHITECTURE
//! ============
//! `IdentityBackend` is the seam the session store talks to. `MockIdentity`
//! stands in for a real identity provider: every call sleeps a fixed delay,
//! then runs plain synchronous logic against a per-instance account table.
//! There is no module-level state, so each test builds a fresh instance.
//!
//! TRADE-OFFS
//! ==========
//! Passwords are kept as salted SHA-256 digests in a credential record that
//! never leaves this module. That is enough to keep secrets off `User`, but
//! it is not a password KDF.
//!
//! Tokens embed the user id (`buedi_<kind>_<user>_<seq>_<hex>`) so a token
//! persisted by one process still resolves for seeded accounts in the next.
//! Revocation is tracked only in memory.

use std::collections::HashSet;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AuthError, StorageError};
use crate::models::{AuthSession, Credentials, NewUser, ProfileUpdate, User, UserType, now_ms};

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;

pub const MIN_PASSWORD_LEN: usize = 6;

const TOKEN_PREFIX: &str = "buedi";
const ACCESS_KIND: &str = "at";
const REFRESH_KIND: &str = "rt";

/// 2024-01-01T00:00:00Z. Seeded accounts keep fixed ids and timestamps so
/// tokens persisted by an earlier process still resolve.
const SEED_CREATED_AT: i64 = 1_704_067_200_000;

#[async_trait::async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError>;

    async fn register(&self, new_user: &NewUser) -> Result<AuthSession, AuthError>;

    /// Invalidate an access token and, when given, the refresh token issued
    /// with it.
    async fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> Result<(), AuthError>;

    /// Resolve an access token to its user.
    async fn current_user(&self, access_token: &str) -> Result<User, AuthError>;

    async fn update_profile(&self, access_token: &str, update: &ProfileUpdate) -> Result<User, AuthError>;

    /// Exchange a refresh token for a new token pair. The old refresh token
    /// is revoked.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError>;
}

// =============================================================================
// HELPERS
// =============================================================================

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Trim and lowercase an email address, rejecting obvious garbage.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    if normalized.is_empty() || !normalized.contains('@') {
        return None;
    }
    let parts = normalized.split('@').collect::<Vec<_>>();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return None;
    }
    Some(normalized)
}

fn name_from_email(email: &str) -> String {
    let local = email
        .split('@')
        .next()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("utilisateur");
    local.to_owned()
}

fn generate_salt() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes_to_hex(&bytes)
}

#[must_use]
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    bytes_to_hex(&hasher.finalize())
}

/// Parsed view of a token issued by [`MockIdentity`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct TokenParts<'a> {
    pub(crate) kind: &'a str,
    pub(crate) user_id: Uuid,
    pub(crate) seq: u64,
}

pub(crate) fn parse_token(token: &str) -> Option<TokenParts<'_>> {
    let mut parts = token.splitn(5, '_');
    if parts.next()? != TOKEN_PREFIX {
        return None;
    }
    let kind = parts.next()?;
    let user_id = parts.next()?.parse::<Uuid>().ok()?;
    let seq = parts.next()?.parse::<u64>().ok()?;
    let nonce = parts.next()?;
    if nonce.is_empty() || !nonce.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(TokenParts { kind, user_id, seq })
}

// =============================================================================
// MOCK BACKEND
// =============================================================================

struct Account {
    user: User,
    salt: String,
    password_hash: String,
}

impl Account {
    fn new(user: User, password: &str) -> Self {
        let salt = generate_salt();
        let password_hash = hash_password(&salt, password);
        Self { user, salt, password_hash }
    }

    fn verify(&self, password: &str) -> bool {
        hash_password(&self.salt, password) == self.password_hash
    }
}

#[derive(Default)]
struct Directory {
    accounts: Vec<Account>,
    revoked: HashSet<String>,
}

impl Directory {
    fn by_email(&self, email: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.user.email == email)
    }

    fn by_id_mut(&mut self, id: Uuid) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.user.id == id)
    }

    /// Resolve a live token of the given kind to its owner's id.
    fn resolve(&self, token: &str, kind: &str) -> Result<Uuid, AuthError> {
        let parts = parse_token(token).ok_or(AuthError::InvalidToken)?;
        if parts.kind != kind || self.revoked.contains(token) {
            return Err(AuthError::InvalidToken);
        }
        if !self.accounts.iter().any(|a| a.user.id == parts.user_id) {
            return Err(AuthError::UserNotFound);
        }
        Ok(parts.user_id)
    }
}

/// In-memory identity provider.
pub struct MockIdentity {
    latency: Duration,
    directory: Mutex<Directory>,
    token_seq: AtomicU64,
}

impl MockIdentity {
    /// Backend with no accounts.
    #[must_use]
    pub fn empty(latency: Duration) -> Self {
        Self { latency, directory: Mutex::new(Directory::default()), token_seq: AtomicU64::new(0) }
    }

    /// Backend seeded with the three demo accounts (admin, individual,
    /// professional).
    #[must_use]
    pub fn seeded(latency: Duration) -> Self {
        let backend = Self::empty(latency);
        for (id, email, password, name, user_type, location) in [
            (1, "admin@buedi.com", "admin123", "Administrateur BUEDI", UserType::Admin, "Libreville"),
            (2, "user@buedi.com", "user123", "Jean Mba", UserType::Individual, "Libreville"),
            (3, "pro@buedi.com", "pro123", "Paul Ndong", UserType::Professional, "Port-Gentil"),
        ] {
            let mut user = User::new(email.to_owned(), name.to_owned(), user_type);
            user.id = Uuid::from_u128(id);
            user.created_at = SEED_CREATED_AT;
            user.location = Some(location.to_owned());
            backend.insert_account(user, password);
        }
        backend
    }

    /// Add an account directly, bypassing validation.
    pub fn insert_account(&self, user: User, password: &str) {
        if let Ok(mut dir) = self.directory.lock() {
            dir.accounts.push(Account::new(user, password));
        }
    }

    #[must_use]
    pub fn account_count(&self) -> usize {
        self.directory.lock().map(|d| d.accounts.len()).unwrap_or(0)
    }

    fn directory(&self) -> Result<MutexGuard<'_, Directory>, AuthError> {
        self.directory
            .lock()
            .map_err(|_| AuthError::Storage(StorageError::Poisoned))
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn issue_token(&self, kind: &str, user_id: Uuid) -> String {
        let seq = self.token_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let nonce: [u8; 8] = rand::rng().random();
        format!("{TOKEN_PREFIX}_{kind}_{user_id}_{seq}_{}", bytes_to_hex(&nonce))
    }

    fn issue_session(&self, user: User) -> AuthSession {
        AuthSession {
            access_token: self.issue_token(ACCESS_KIND, user.id),
            refresh_token: Some(self.issue_token(REFRESH_KIND, user.id)),
            user,
        }
    }
}

#[async_trait::async_trait]
impl IdentityBackend for MockIdentity {
    async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        self.delay().await;
        let email = normalize_email(&credentials.email).ok_or(AuthError::InvalidCredentials)?;

        let user = {
            let mut dir = self.directory()?;
            let id = match dir.by_email(&email) {
                Some(account) if account.verify(&credentials.password) => account.user.id,
                _ => {
                    debug!(%email, "mock login rejected");
                    return Err(AuthError::InvalidCredentials);
                }
            };
            let account = dir.by_id_mut(id).ok_or(AuthError::UserNotFound)?;
            account.user.last_login = Some(now_ms());
            account.user.clone()
        };

        info!(user_id = %user.id, user_type = ?user.user_type, "mock login");
        Ok(self.issue_session(user))
    }

    async fn register(&self, new_user: &NewUser) -> Result<AuthSession, AuthError> {
        self.delay().await;
        let email = normalize_email(&new_user.email).ok_or(AuthError::InvalidEmail)?;
        if new_user.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword { min: MIN_PASSWORD_LEN });
        }

        let user = {
            let mut dir = self.directory()?;
            if dir.by_email(&email).is_some() {
                debug!(%email, "mock register rejected: duplicate email");
                return Err(AuthError::DuplicateEmail);
            }
            let name = match new_user.name.trim() {
                "" => name_from_email(&email),
                name => name.to_owned(),
            };
            let mut user = User::new(email, name, new_user.user_type);
            user.phone.clone_from(&new_user.phone);
            user.location.clone_from(&new_user.location);
            user.last_login = Some(user.created_at);
            dir.accounts.push(Account::new(user.clone(), &new_user.password));
            user
        };

        info!(user_id = %user.id, user_type = ?user.user_type, "mock register");
        Ok(self.issue_session(user))
    }

    async fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> Result<(), AuthError> {
        self.delay().await;
        let mut dir = self.directory()?;
        let parts = parse_token(access_token).ok_or(AuthError::InvalidToken)?;
        dir.revoked.insert(access_token.to_owned());
        if let Some(refresh_token) = refresh_token {
            match parse_token(refresh_token) {
                Some(rt) if rt.kind == REFRESH_KIND && rt.user_id == parts.user_id => {
                    dir.revoked.insert(refresh_token.to_owned());
                }
                _ => debug!(user_id = %parts.user_id, "ignoring foreign refresh token on logout"),
            }
        }
        debug!(user_id = %parts.user_id, seq = parts.seq, "mock logout");
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<User, AuthError> {
        self.delay().await;
        let mut dir = self.directory()?;
        let id = dir.resolve(access_token, ACCESS_KIND)?;
        dir.by_id_mut(id)
            .map(|a| a.user.clone())
            .ok_or(AuthError::UserNotFound)
    }

    async fn update_profile(&self, access_token: &str, update: &ProfileUpdate) -> Result<User, AuthError> {
        self.delay().await;
        let mut dir = self.directory()?;
        let id = dir.resolve(access_token, ACCESS_KIND)?;

        let mut update = update.clone();
        if let Some(raw) = update.email.take() {
            let email = normalize_email(&raw).ok_or(AuthError::InvalidEmail)?;
            if dir.accounts.iter().any(|a| a.user.email == email && a.user.id != id) {
                return Err(AuthError::DuplicateEmail);
            }
            update.email = Some(email);
        }

        let account = dir.by_id_mut(id).ok_or(AuthError::UserNotFound)?;
        account.user.apply(&update);
        debug!(user_id = %id, "mock profile update");
        Ok(account.user.clone())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        self.delay().await;
        let user = {
            let mut dir = self.directory()?;
            let id = dir.resolve(refresh_token, REFRESH_KIND)?;
            dir.revoked.insert(refresh_token.to_owned());
            dir.by_id_mut(id)
                .map(|a| a.user.clone())
                .ok_or(AuthError::UserNotFound)?
        };
        debug!(user_id = %user.id, "mock token refresh");
        Ok(self.issue_session(user))
    }
}
