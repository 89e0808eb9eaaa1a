//! Error taxonomy for the identity and session layers.
//!
//! ERROR HANDLING
//! ==============
//! Backend and storage calls return `Result<_, AuthError>`. The session store
//! is the only boundary that consumes these errors: it logs them, turns them
//! into a toast via [`ErrorCode::user_message`], and hands callers a bool.

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

/// Grepable code and user-facing wording for an error.
pub trait ErrorCode {
    fn error_code(&self) -> &'static str;

    /// Text shown in the transient toast.
    fn user_message(&self) -> String;
}

/// Durable key-value storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user not found")]
    UserNotFound,
    #[error("profile update failed")]
    UpdateFailed,
    #[error("session restore failed: {0}")]
    SessionRestoreFailed(String),
    #[error("invalid email")]
    InvalidEmail,
    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },
    #[error("invalid or revoked token")]
    InvalidToken,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "E_INVALID_CREDENTIALS",
            Self::DuplicateEmail => "E_DUPLICATE_EMAIL",
            Self::UserNotFound => "E_USER_NOT_FOUND",
            Self::UpdateFailed => "E_UPDATE_FAILED",
            Self::SessionRestoreFailed(_) => "E_SESSION_RESTORE_FAILED",
            Self::InvalidEmail => "E_INVALID_EMAIL",
            Self::WeakPassword { .. } => "E_WEAK_PASSWORD",
            Self::InvalidToken => "E_INVALID_TOKEN",
            Self::Storage(_) => "E_STORAGE",
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Email ou mot de passe incorrect".into(),
            Self::DuplicateEmail => "Un compte existe déjà avec cet email".into(),
            Self::UserNotFound => "Utilisateur introuvable".into(),
            Self::UpdateFailed => "Échec de la mise à jour du profil".into(),
            Self::SessionRestoreFailed(_) | Self::InvalidToken => "Votre session a expiré, veuillez vous reconnecter".into(),
            Self::InvalidEmail => "Adresse email invalide".into(),
            Self::WeakPassword { min } => format!("Le mot de passe doit contenir au moins {min} caractères"),
            Self::Storage(_) => "Erreur de stockage local".into(),
        }
    }
}
