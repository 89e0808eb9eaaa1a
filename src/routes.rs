//! Route table and route guard.
//!
//! The guard is a pure read of session state: it decides whether a protected
//! page may render, must wait for the session to settle, or must redirect.

use crate::models::UserType;
use crate::state::session::SessionView;

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;

pub const LOGIN_ROUTE: &str = "/login";
pub const HOME_ROUTE: &str = "/";
pub const DASHBOARD_ROUTE: &str = "/dashboard";
pub const ADMIN_DASHBOARD_ROUTE: &str = "/admin";

/// Role flags a protected route may require. The default only requires a
/// signed-in user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteRequirement {
    pub admin: bool,
    /// Professional or admin.
    pub professional: bool,
}

impl RouteRequirement {
    pub const AUTHENTICATED: Self = Self { admin: false, professional: false };
    pub const ADMIN: Self = Self { admin: true, professional: false };
    pub const PROFESSIONAL: Self = Self { admin: false, professional: true };

    #[must_use]
    pub fn allows(self, user_type: UserType) -> bool {
        if self.admin && user_type != UserType::Admin {
            return false;
        }
        if self.professional && !user_type.is_professional_or_admin() {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    /// Session still restoring; show a loading state.
    Pending,
    Redirect(&'static str),
}

/// Where a signed-in user who fails a route's requirement is sent.
#[must_use]
pub fn fallback_route(user_type: UserType) -> &'static str {
    match user_type {
        UserType::Admin => ADMIN_DASHBOARD_ROUTE,
        UserType::Individual | UserType::Professional | UserType::Unknown => HOME_ROUTE,
    }
}

/// Post-login redirect target.
#[must_use]
pub fn landing_route(user_type: UserType) -> &'static str {
    match user_type {
        UserType::Admin => ADMIN_DASHBOARD_ROUTE,
        UserType::Individual | UserType::Professional | UserType::Unknown => DASHBOARD_ROUTE,
    }
}

#[must_use]
pub fn guard(session: &(impl SessionView + ?Sized), requirement: RouteRequirement) -> GuardDecision {
    if session.phase().is_settling() {
        return GuardDecision::Pending;
    }
    let Some(user) = session.current_user() else {
        return GuardDecision::Redirect(LOGIN_ROUTE);
    };
    if requirement.allows(user.user_type) {
        GuardDecision::Render
    } else {
        tracing::debug!(user_id = %user.id, ?requirement, "route requirement not met");
        GuardDecision::Redirect(fallback_route(user.user_type))
    }
}
