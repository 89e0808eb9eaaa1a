use std::time::Duration;

use super::*;
use crate::models::UserType;
use crate::services::identity::MockIdentity;
use crate::services::toast::ToastLog;
use crate::storage::MemoryStore;

// =============================================================================
// HARNESS
// =============================================================================

struct Harness {
    store: SessionStore,
    backend: Arc<MockIdentity>,
    storage: Arc<MemoryStore>,
    toasts: Arc<ToastLog>,
}

fn harness_with(backend: Arc<MockIdentity>, storage: Arc<MemoryStore>) -> Harness {
    let toasts = Arc::new(ToastLog::new());
    let store = SessionStore::new(backend.clone(), storage.clone(), toasts.clone());
    Harness { store, backend, storage, toasts }
}

fn harness() -> Harness {
    harness_with(Arc::new(MockIdentity::seeded(Duration::ZERO)), Arc::new(MemoryStore::new()))
}

fn keys_present(storage: &MemoryStore) -> Vec<&'static str> {
    SESSION_KEYS
        .into_iter()
        .filter(|k| storage.get(k).unwrap().is_some())
        .collect()
}

fn all_permissions() -> Vec<String> {
    let mut perms = Vec::new();
    for t in [UserType::Individual, UserType::Professional, UserType::Admin] {
        perms.extend(t.default_permissions());
    }
    perms
}

fn new_user(email: &str, user_type: UserType) -> NewUser {
    NewUser {
        email: email.into(),
        password: "secret1".into(),
        name: "Awa Obame".into(),
        user_type,
        phone: None,
        location: Some("Franceville".into()),
    }
}

/// Identity backend whose logout always fails.
struct BrokenLogout(MockIdentity);

#[async_trait::async_trait]
impl IdentityBackend for BrokenLogout {
    async fn login(&self, c: &Credentials) -> Result<AuthSession, AuthError> {
        self.0.login(c).await
    }
    async fn register(&self, n: &NewUser) -> Result<AuthSession, AuthError> {
        self.0.register(n).await
    }
    async fn logout(&self, _: &str, _: Option<&str>) -> Result<(), AuthError> {
        Err(AuthError::InvalidToken)
    }
    async fn current_user(&self, t: &str) -> Result<User, AuthError> {
        self.0.current_user(t).await
    }
    async fn update_profile(&self, t: &str, u: &ProfileUpdate) -> Result<User, AuthError> {
        self.0.update_profile(t, u).await
    }
    async fn refresh(&self, t: &str) -> Result<AuthSession, AuthError> {
        self.0.refresh(t).await
    }
}

/// Storage that refuses every write.
struct ReadOnlyStore;

impl KeyValueStore for ReadOnlyStore {
    fn get(&self, _: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }
    fn set(&self, _: &str, _: &str) -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::other("read-only")))
    }
    fn remove(&self, _: &str) -> Result<(), StorageError> {
        Ok(())
    }
    fn clear(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

// =============================================================================
// initial state
// =============================================================================

#[test]
fn new_store_is_uninitialized() {
    let h = harness();
    assert_eq!(h.store.phase(), SessionPhase::Uninitialized);
    assert!(h.store.current_user().is_none());
    assert!(!h.store.is_authenticated());
    assert!(!h.store.has_permission("view_projects"));
    assert!(!h.store.is_loading());
}

#[tokio::test]
async fn initialize_with_empty_storage_is_unauthenticated() {
    let h = harness();
    assert_eq!(h.store.initialize().await, SessionPhase::Unauthenticated);
    assert!(h.toasts.is_empty());
    assert!(!h.store.is_loading());
}

// =============================================================================
// login
// =============================================================================

#[tokio::test]
async fn seeded_logins_expose_exact_permissions() {
    for (email, password, user_type) in [
        ("admin@buedi.com", "admin123", UserType::Admin),
        ("user@buedi.com", "user123", UserType::Individual),
        ("pro@buedi.com", "pro123", UserType::Professional),
    ] {
        let h = harness();
        assert!(h.store.login(Credentials::new(email, password)).await);
        let granted = user_type.default_permissions();
        for perm in all_permissions() {
            assert_eq!(h.store.has_permission(&perm), granted.contains(&perm), "{email}: {perm}");
        }
        assert_eq!(h.store.current_user().unwrap().permissions, granted);
    }
}

#[tokio::test]
async fn admin_login_scenario() {
    let h = harness();
    assert!(h.store.login(Credentials::new("admin@buedi.com", "admin123")).await);
    assert_eq!(h.store.phase(), SessionPhase::Authenticated);
    assert_eq!(h.store.current_user().unwrap().user_type, UserType::Admin);
    assert_eq!(h.toasts.last().unwrap().kind, crate::models::NotificationKind::Success);
}

#[tokio::test]
async fn login_persists_all_keys_without_secrets() {
    let h = harness();
    assert!(h.store.login(Credentials::new("user@buedi.com", "user123")).await);
    assert_eq!(keys_present(&h.storage), SESSION_KEYS.to_vec());
    assert_eq!(h.storage.get(TOKEN_KEY).unwrap(), h.store.access_token());

    let raw = h.storage.get(USER_KEY).unwrap().unwrap();
    assert!(!raw.contains("user123"));
    assert!(!raw.to_lowercase().contains("password"));
    let stored: User = serde_json::from_str(&raw).unwrap();
    assert_eq!(Some(stored), h.store.current_user());
}

#[tokio::test]
async fn wrong_password_scenario() {
    let h = harness();
    h.store.initialize().await;
    assert!(!h.store.login(Credentials::new("user@buedi.com", "wrong")).await);
    assert_eq!(h.store.phase(), SessionPhase::Unauthenticated);
    assert!(h.store.current_user().is_none());
    assert_eq!(h.toasts.last().unwrap().code, Some("E_INVALID_CREDENTIALS"));
    assert!(keys_present(&h.storage).is_empty());
}

#[tokio::test]
async fn unknown_email_fails_with_invalid_credentials() {
    let h = harness();
    assert!(!h.store.login(Credentials::new("inconnu@buedi.com", "admin123")).await);
    assert!(!h.store.is_authenticated());
    assert_eq!(h.toasts.last().unwrap().code, Some("E_INVALID_CREDENTIALS"));
}

#[tokio::test]
async fn failed_login_keeps_existing_session() {
    let h = harness();
    assert!(h.store.login(Credentials::new("pro@buedi.com", "pro123")).await);
    assert!(!h.store.login(Credentials::new("pro@buedi.com", "bad")).await);
    assert!(h.store.is_authenticated());
    assert_eq!(h.store.current_user().unwrap().email, "pro@buedi.com");
}

#[tokio::test]
async fn storage_failure_rolls_back_login() {
    let toasts = Arc::new(ToastLog::new());
    let store = SessionStore::new(
        Arc::new(MockIdentity::seeded(Duration::ZERO)),
        Arc::new(ReadOnlyStore),
        toasts.clone(),
    );
    assert!(!store.login(Credentials::new("user@buedi.com", "user123")).await);
    assert_eq!(store.phase(), SessionPhase::Unauthenticated);
    assert_eq!(toasts.last().unwrap().code, Some("E_STORAGE"));
}

// =============================================================================
// register
// =============================================================================

#[tokio::test]
async fn register_new_user_signs_in() {
    let h = harness();
    assert!(h.store.register(new_user("awa@buedi.ga", UserType::Professional)).await);
    let user = h.store.current_user().unwrap();
    assert_eq!(user.user_type, UserType::Professional);
    assert!(h.store.has_permission("bid_projects"));
    assert!(!h.store.has_permission("create_projects"));
    assert_eq!(keys_present(&h.storage).len(), 3);
}

#[tokio::test]
async fn register_duplicate_scenario() {
    let h = harness();
    assert!(!h.store.register(new_user("pro@buedi.com", UserType::Individual)).await);
    assert_eq!(h.toasts.last().unwrap().code, Some("E_DUPLICATE_EMAIL"));
    assert_eq!(h.backend.account_count(), 3);
    assert!(!h.store.is_authenticated());
}

#[tokio::test]
async fn register_duplicate_is_idempotent() {
    let h = harness();
    assert!(h.store.register(new_user("awa@buedi.ga", UserType::Individual)).await);
    assert!(!h.store.register(new_user("awa@buedi.ga", UserType::Individual)).await);
    assert!(!h.store.register(new_user("AWA@buedi.ga", UserType::Individual)).await);
    assert_eq!(h.backend.account_count(), 4);
}

// =============================================================================
// logout
// =============================================================================

#[tokio::test]
async fn logout_clears_keys_and_permissions() {
    let h = harness();
    assert!(h.store.login(Credentials::new("admin@buedi.com", "admin123")).await);
    assert!(h.store.logout().await);
    assert!(keys_present(&h.storage).is_empty());
    assert_eq!(h.store.phase(), SessionPhase::Unauthenticated);
    for perm in all_permissions() {
        assert!(!h.store.has_permission(&perm));
    }
}

#[tokio::test]
async fn logout_revokes_token_at_backend() {
    let h = harness();
    assert!(h.store.login(Credentials::new("user@buedi.com", "user123")).await);
    let token = h.store.access_token().unwrap();
    assert!(h.store.logout().await);
    assert!(h.backend.current_user(&token).await.is_err());
}

#[tokio::test]
async fn logout_invalidates_refresh_token() {
    let h = harness();
    assert!(h.store.login(Credentials::new("user@buedi.com", "user123")).await);
    let refresh = h.storage.get(REFRESH_TOKEN_KEY).unwrap().unwrap();
    assert!(h.store.logout().await);
    assert!(matches!(h.backend.refresh(&refresh).await, Err(AuthError::InvalidToken)));
}

#[tokio::test]
async fn backend_logout_failure_does_not_block_local_logout() {
    let storage = Arc::new(MemoryStore::new());
    let toasts = Arc::new(ToastLog::new());
    let store = SessionStore::new(
        Arc::new(BrokenLogout(MockIdentity::seeded(Duration::ZERO))),
        storage.clone(),
        toasts.clone(),
    );
    assert!(store.login(Credentials::new("user@buedi.com", "user123")).await);
    assert!(store.logout().await);
    assert!(keys_present(&storage).is_empty());
    assert!(store.current_user().is_none());
}

// =============================================================================
// update_profile
// =============================================================================

#[tokio::test]
async fn update_profile_without_session_fails() {
    let h = harness();
    let update = ProfileUpdate { name: Some("x".into()), ..ProfileUpdate::default() };
    assert!(!h.store.update_profile(update).await);
    assert_eq!(h.toasts.last().unwrap().code, Some("E_UPDATE_FAILED"));
}

#[tokio::test]
async fn update_profile_ignores_identity_fields() {
    let h = harness();
    assert!(h.store.login(Credentials::new("user@buedi.com", "user123")).await);
    let before = h.store.current_user().unwrap();

    let update: ProfileUpdate = serde_json::from_str(
        r#"{"name":"Jean Mba Ndong","id":"00000000-0000-0000-0000-000000000099","createdAt":0,"type":"admin"}"#,
    )
    .unwrap();
    assert!(h.store.update_profile(update).await);

    let after = h.store.current_user().unwrap();
    assert_eq!(after.name, "Jean Mba Ndong");
    assert_eq!(after.id, before.id);
    assert_eq!(after.email, before.email);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.user_type, before.user_type);
    assert_eq!(after.permissions, before.permissions);

    let stored: User = serde_json::from_str(&h.storage.get(USER_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(stored, after);
}

#[tokio::test]
async fn update_profile_changes_email_when_supplied() {
    let h = harness();
    assert!(h.store.login(Credentials::new("user@buedi.com", "user123")).await);
    let update = ProfileUpdate { email: Some("jean.mba@buedi.ga".into()), ..ProfileUpdate::default() };
    assert!(h.store.update_profile(update).await);
    assert_eq!(h.store.current_user().unwrap().email, "jean.mba@buedi.ga");
}

#[tokio::test]
async fn update_profile_rejected_by_backend_keeps_session() {
    let h = harness();
    assert!(h.store.login(Credentials::new("user@buedi.com", "user123")).await);
    let update = ProfileUpdate { email: Some("admin@buedi.com".into()), ..ProfileUpdate::default() };
    assert!(!h.store.update_profile(update).await);
    assert!(h.store.is_authenticated());
    assert_eq!(h.store.current_user().unwrap().email, "user@buedi.com");
    assert_eq!(h.toasts.last().unwrap().code, Some("E_DUPLICATE_EMAIL"));
}

#[tokio::test]
async fn update_profile_with_revoked_token_ends_session() {
    let h = harness();
    assert!(h.store.login(Credentials::new("user@buedi.com", "user123")).await);
    h.backend.logout(&h.store.access_token().unwrap(), None).await.unwrap();
    let update = ProfileUpdate { name: Some("x".into()), ..ProfileUpdate::default() };
    assert!(!h.store.update_profile(update).await);
    assert_eq!(h.store.phase(), SessionPhase::Unauthenticated);
    assert!(keys_present(&h.storage).is_empty());
}

// =============================================================================
// restore
// =============================================================================

#[tokio::test]
async fn restore_rehydrates_persisted_session() {
    let backend = Arc::new(MockIdentity::seeded(Duration::ZERO));
    let storage = Arc::new(MemoryStore::new());
    let first = harness_with(backend.clone(), storage.clone());
    assert!(first.store.login(Credentials::new("pro@buedi.com", "pro123")).await);
    let user = first.store.current_user().unwrap();

    let second = harness_with(backend, storage);
    assert_eq!(second.store.initialize().await, SessionPhase::Authenticated);
    assert_eq!(second.store.current_user().unwrap().id, user.id);
    assert!(second.store.has_permission("manage_portfolio"));
    assert!(second.toasts.is_empty());
}

#[tokio::test]
async fn restore_with_corrupt_user_purges_silently() {
    let h = harness();
    assert!(h.store.login(Credentials::new("user@buedi.com", "user123")).await);
    h.storage.set(USER_KEY, "{not json").unwrap();
    h.toasts.drain();

    assert_eq!(h.store.initialize().await, SessionPhase::Unauthenticated);
    assert!(h.store.current_user().is_none());
    assert!(keys_present(&h.storage).is_empty());
    assert!(h.toasts.is_empty());
}

#[tokio::test]
async fn corrupt_session_file_is_reset_so_login_works() {
    use crate::storage::FileStore;

    let path = std::env::temp_dir()
        .join(format!("buedi-session-{}", uuid::Uuid::new_v4()))
        .join("session.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{not json").unwrap();

    let storage = Arc::new(FileStore::new(path.clone()));
    let toasts = Arc::new(ToastLog::new());
    let store = SessionStore::new(Arc::new(MockIdentity::seeded(Duration::ZERO)), storage.clone(), toasts.clone());

    assert_eq!(store.initialize().await, SessionPhase::Unauthenticated);
    assert!(toasts.is_empty());
    assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);

    assert!(store.login(Credentials::new("admin@buedi.com", "admin123")).await);
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("{not json"));
    assert_eq!(storage.get(TOKEN_KEY).unwrap(), store.access_token());
}

#[tokio::test]
async fn restore_with_missing_user_record_purges() {
    let h = harness();
    h.storage.set(TOKEN_KEY, "buedi_at_whatever").unwrap();
    h.storage.set(REFRESH_TOKEN_KEY, "r").unwrap();
    assert_eq!(h.store.initialize().await, SessionPhase::Unauthenticated);
    assert!(keys_present(&h.storage).is_empty());
}

#[tokio::test]
async fn restore_with_revoked_token_purges() {
    let h = harness();
    assert!(h.store.login(Credentials::new("user@buedi.com", "user123")).await);
    h.backend.logout(&h.store.access_token().unwrap(), None).await.unwrap();

    assert_eq!(h.store.initialize().await, SessionPhase::Unauthenticated);
    assert!(keys_present(&h.storage).is_empty());
    assert!(!h.store.has_permission("view_projects"));
}

#[tokio::test]
async fn restore_with_mismatched_user_purges() {
    let backend = Arc::new(MockIdentity::seeded(Duration::ZERO));
    let storage = Arc::new(MemoryStore::new());
    let h = harness_with(backend, storage.clone());
    assert!(h.store.login(Credentials::new("user@buedi.com", "user123")).await);
    let other = User::new("someone@buedi.ga".into(), "X".into(), UserType::Admin);
    storage.set(USER_KEY, &serde_json::to_string(&other).unwrap()).unwrap();

    assert_eq!(h.store.initialize().await, SessionPhase::Unauthenticated);
    assert!(keys_present(&storage).is_empty());
}

// =============================================================================
// refresh
// =============================================================================

#[tokio::test]
async fn refresh_session_rotates_tokens() {
    let h = harness();
    assert!(h.store.login(Credentials::new("pro@buedi.com", "pro123")).await);
    let old = h.store.access_token().unwrap();
    assert!(h.store.refresh_session().await);
    let new = h.store.access_token().unwrap();
    assert_ne!(old, new);
    assert_eq!(h.storage.get(TOKEN_KEY).unwrap(), Some(new));
    assert!(h.store.is_authenticated());
}

#[tokio::test]
async fn refresh_without_session_is_false() {
    let h = harness();
    assert!(!h.store.refresh_session().await);
    assert!(h.toasts.is_empty());
}

#[tokio::test]
async fn rejected_refresh_token_ends_session() {
    let h = harness();
    assert!(h.store.login(Credentials::new("pro@buedi.com", "pro123")).await);
    let refresh = h.storage.get(REFRESH_TOKEN_KEY).unwrap().unwrap();
    h.backend.refresh(&refresh).await.unwrap();

    assert!(!h.store.refresh_session().await);
    assert_eq!(h.store.phase(), SessionPhase::Unauthenticated);
    assert!(keys_present(&h.storage).is_empty());
    assert_eq!(h.toasts.last().unwrap().code, Some("E_INVALID_TOKEN"));
}

// =============================================================================
// request sequencing
// =============================================================================

#[tokio::test]
async fn login_resolving_after_logout_is_discarded() {
    let h = harness_with(
        Arc::new(MockIdentity::seeded(Duration::from_millis(60))),
        Arc::new(MemoryStore::new()),
    );
    let (logged_in, logged_out) = tokio::join!(h.store.login(Credentials::new("user@buedi.com", "user123")), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.store.logout().await
    });
    assert!(!logged_in);
    assert!(logged_out);
    assert_eq!(h.store.phase(), SessionPhase::Unauthenticated);
    assert!(keys_present(&h.storage).is_empty());
    assert!(!h.store.is_loading());
}

#[tokio::test]
async fn newest_login_wins() {
    let h = harness_with(
        Arc::new(MockIdentity::seeded(Duration::from_millis(40))),
        Arc::new(MemoryStore::new()),
    );
    let (first, second) = tokio::join!(h.store.login(Credentials::new("user@buedi.com", "user123")), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.store.login(Credentials::new("pro@buedi.com", "pro123")).await
    });
    assert!(!first);
    assert!(second);
    assert_eq!(h.store.current_user().unwrap().email, "pro@buedi.com");
    let stored: User = serde_json::from_str(&h.storage.get(USER_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(stored.email, "pro@buedi.com");
}

// =============================================================================
// SessionView
// =============================================================================

#[tokio::test]
async fn session_view_mirrors_store() {
    let h = harness();
    assert!(h.store.login(Credentials::new("admin@buedi.com", "admin123")).await);
    let view: &dyn SessionView = &h.store;
    assert_eq!(view.phase(), SessionPhase::Authenticated);
    assert_eq!(view.current_user().unwrap().email, "admin@buedi.com");
}

#[test]
fn settling_phases() {
    assert!(SessionPhase::Uninitialized.is_settling());
    assert!(SessionPhase::Restoring.is_settling());
    assert!(!SessionPhase::Authenticated.is_settling());
    assert!(!SessionPhase::Unauthenticated.is_settling());
}
