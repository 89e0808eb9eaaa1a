//! Services the session and notification stores depend on.
//!
//! ARCHITECTURE
//! ============
//! Each service sits behind a trait (`IdentityBackend`, `Toaster`,
//! `NotificationSource`) so stores receive them by injection and tests can
//! substitute their own.

pub mod feed;
pub mod identity;
pub mod toast;
