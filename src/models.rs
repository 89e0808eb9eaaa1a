//! Domain models shared by the session, identity and notification layers.
//!
//! DESIGN
//! ======
//! `User` is the only user shape that leaves the identity backend. It carries
//! no credential material, so anything that serializes a `User` (durable
//! storage, logs, the CLI) can never leak a password.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(test)]
#[path = "models_test.rs"]
mod tests;

/// Milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

// =============================================================================
// USER
// =============================================================================

/// Account category. Decides the default permission set at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Individual,
    Professional,
    Admin,
    #[default]
    Unknown,
}

impl UserType {
    /// Permissions granted to a freshly created account of this type.
    #[must_use]
    pub fn default_permissions(self) -> Vec<String> {
        let names: &[&str] = match self {
            Self::Individual => &[
                "view_projects",
                "create_projects",
                "view_professionals",
                "buy_products",
                "send_messages",
            ],
            Self::Professional => &[
                "view_projects",
                "bid_projects",
                "view_professionals",
                "manage_portfolio",
                "sell_products",
                "send_messages",
            ],
            Self::Admin => &[
                "manage_users",
                "manage_projects",
                "manage_products",
                "moderate_content",
                "view_analytics",
                "send_messages",
            ],
            Self::Unknown => &[],
        };
        names.iter().map(|&n| n.to_owned()).collect()
    }

    /// Display label shown next to the user's name.
    #[must_use]
    pub fn role_label(self) -> &'static str {
        match self {
            Self::Individual => "Particulier",
            Self::Professional => "Professionnel",
            Self::Admin => "Administrateur",
            Self::Unknown => "Visiteur",
        }
    }

    /// True for professionals and admins.
    #[must_use]
    pub fn is_professional_or_admin(self) -> bool {
        matches!(self, Self::Professional | Self::Admin)
    }
}

impl std::str::FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" => Ok(Self::Individual),
            "professional" => Ok(Self::Professional),
            "admin" => Ok(Self::Admin),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown user type: {other}")),
        }
    }
}

/// Authenticated account profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
    pub permissions: Vec<String>,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Milliseconds since Unix epoch.
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<i64>,
}

impl User {
    /// Build a new account. Permissions and role label come from `user_type`
    /// and are never recomputed afterwards.
    #[must_use]
    pub fn new(email: String, name: String, user_type: UserType) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            user_type,
            permissions: user_type.default_permissions(),
            role: user_type.role_label().to_owned(),
            avatar: None,
            phone: None,
            location: None,
            created_at: now_ms(),
            last_login: None,
        }
    }

    #[must_use]
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p == name)
    }

    /// Merge a profile update. `id` and `created_at` have no counterpart in
    /// `ProfileUpdate`, so they cannot change; `email` changes only when given.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.name {
            self.name.clone_from(name);
        }
        if let Some(email) = &update.email {
            self.email.clone_from(email);
        }
        if let Some(avatar) = &update.avatar {
            self.avatar = Some(avatar.clone());
        }
        if let Some(phone) = &update.phone {
            self.phone = Some(phone.clone());
        }
        if let Some(location) = &update.location {
            self.location = Some(location.clone());
        }
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Email + password pair submitted by the login form.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

/// Registration form payload.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub user_type: UserType,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("user_type", &self.user_type)
            .finish_non_exhaustive()
    }
}

/// Partial profile edit. Unknown keys (`id`, `createdAt`, ...) are ignored
/// on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Token pairing handed out by the identity backend on login or registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: User,
}

// =============================================================================
// NOTIFICATION
// =============================================================================

/// Severity of a notification or toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

/// A single in-app alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

impl Notification {
    /// Build an unread notification stamped with the current time.
    #[must_use]
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            message: message.into(),
            read: false,
            created_at: now_ms(),
            link: None,
            user_id: None,
        }
    }

    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}
