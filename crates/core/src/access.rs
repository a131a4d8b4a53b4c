//! Route guard and role dispatcher.
//!
//! Both are pure decisions over an [`AuthPhase`] snapshot; the web tier turns
//! the result into a response. Keeping them here makes every access rule a
//! compile-checked `match` over the closed [`Role`] set.

use serde::Serialize;

use crate::types::{Role, SessionRole};

/// Application routes that access decisions can redirect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Route {
    /// Public landing page.
    Landing,
    /// Public sign-in page.
    SignIn,
    /// Authenticated landing page (role dispatcher).
    Dashboard,
}

impl Route {
    /// URL path for this route.
    #[must_use]
    pub const fn path(&self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::SignIn => "/auth",
            Self::Dashboard => "/dashboard",
        }
    }
}

/// Authentication state of a session, as seen by access checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "role")]
pub enum AuthPhase {
    /// The session store has not started yet.
    #[default]
    Uninitialized,
    /// An auth event is being processed (identity or role pending).
    Loading,
    /// No identity.
    Unauthenticated,
    /// An identity is present; the role may or may not be resolved.
    Authenticated(SessionRole),
}

impl AuthPhase {
    /// Returns `true` for the terminal states of the session state machine.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Authenticated(_))
    }
}

/// Outcome of a guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session still loading: show a neutral waiting indicator.
    Wait,
    /// Do not render; navigate to the route instead.
    Redirect(Route),
    /// Render the protected content.
    Render,
}

/// Role requirement attached to a protected route.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RouteGuard {
    /// Any authenticated identity, with or without a role.
    #[default]
    Authenticated,
    /// Exactly this role.
    Require(Role),
    /// Any role in the list.
    Allow(Vec<Role>),
}

impl RouteGuard {
    /// Guard requiring a single role.
    #[must_use]
    pub const fn require(role: Role) -> Self {
        Self::Require(role)
    }

    /// Guard accepting any of the listed roles.
    #[must_use]
    pub fn allow(roles: impl IntoIterator<Item = Role>) -> Self {
        Self::Allow(roles.into_iter().collect())
    }

    /// Decide what to do for a session in `phase`.
    ///
    /// An unresolved role never satisfies a role requirement.
    #[must_use]
    pub fn check(&self, phase: AuthPhase) -> GuardDecision {
        let role = match phase {
            AuthPhase::Uninitialized | AuthPhase::Loading => return GuardDecision::Wait,
            AuthPhase::Unauthenticated => return GuardDecision::Redirect(Route::SignIn),
            AuthPhase::Authenticated(role) => role,
        };

        let permitted = match self {
            Self::Authenticated => true,
            Self::Require(required) => role.is(*required),
            Self::Allow(allowed) => role.role().is_some_and(|r| allowed.contains(&r)),
        };

        if permitted {
            GuardDecision::Render
        } else {
            GuardDecision::Redirect(Route::Dashboard)
        }
    }
}

/// Dashboard views, one per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dashboard {
    Farmer,
    Buyer,
    Admin,
}

/// Outcome of the role dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Mount(Dashboard),
    Redirect(Route),
}

impl Dashboard {
    /// Select the dashboard for a resolved role.
    #[must_use]
    pub const fn dispatch(role: SessionRole) -> Dispatch {
        match role {
            SessionRole::Resolved(Role::Farmer) => Dispatch::Mount(Self::Farmer),
            SessionRole::Resolved(Role::Seller) => Dispatch::Mount(Self::Buyer),
            SessionRole::Resolved(Role::Admin) => Dispatch::Mount(Self::Admin),
            SessionRole::Unresolved => Dispatch::Redirect(Route::SignIn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FARMER: AuthPhase = AuthPhase::Authenticated(SessionRole::Resolved(Role::Farmer));
    const SELLER: AuthPhase = AuthPhase::Authenticated(SessionRole::Resolved(Role::Seller));
    const NO_ROLE: AuthPhase = AuthPhase::Authenticated(SessionRole::Unresolved);

    #[test]
    fn test_loading_waits_without_redirect() {
        for guard in [
            RouteGuard::Authenticated,
            RouteGuard::require(Role::Admin),
            RouteGuard::allow([Role::Seller]),
        ] {
            assert_eq!(guard.check(AuthPhase::Loading), GuardDecision::Wait);
            assert_eq!(guard.check(AuthPhase::Uninitialized), GuardDecision::Wait);
        }
    }

    #[test]
    fn test_no_identity_goes_to_sign_in() {
        let guard = RouteGuard::require(Role::Farmer);
        assert_eq!(
            guard.check(AuthPhase::Unauthenticated),
            GuardDecision::Redirect(Route::SignIn)
        );
        assert_eq!(
            RouteGuard::Authenticated.check(AuthPhase::Unauthenticated),
            GuardDecision::Redirect(Route::SignIn)
        );
    }

    #[test]
    fn test_required_role() {
        let guard = RouteGuard::require(Role::Farmer);
        assert_eq!(guard.check(FARMER), GuardDecision::Render);
        assert_eq!(
            guard.check(SELLER),
            GuardDecision::Redirect(Route::Dashboard)
        );
    }

    #[test]
    fn test_allow_list() {
        let guard = RouteGuard::allow([Role::Seller, Role::Admin]);
        assert_eq!(guard.check(SELLER), GuardDecision::Render);
        assert_eq!(
            guard.check(FARMER),
            GuardDecision::Redirect(Route::Dashboard)
        );
    }

    #[test]
    fn test_unresolved_role_fails_closed() {
        assert_eq!(
            RouteGuard::require(Role::Farmer).check(NO_ROLE),
            GuardDecision::Redirect(Route::Dashboard)
        );
        assert_eq!(
            RouteGuard::allow(Role::ALL).check(NO_ROLE),
            GuardDecision::Redirect(Route::Dashboard)
        );
        assert_eq!(
            RouteGuard::Authenticated.check(NO_ROLE),
            GuardDecision::Render
        );
    }

    #[test]
    fn test_dispatch_is_total() {
        assert_eq!(
            Dashboard::dispatch(SessionRole::Resolved(Role::Farmer)),
            Dispatch::Mount(Dashboard::Farmer)
        );
        assert_eq!(
            Dashboard::dispatch(SessionRole::Resolved(Role::Seller)),
            Dispatch::Mount(Dashboard::Buyer)
        );
        assert_eq!(
            Dashboard::dispatch(SessionRole::Resolved(Role::Admin)),
            Dispatch::Mount(Dashboard::Admin)
        );
        assert_eq!(
            Dashboard::dispatch(SessionRole::Unresolved),
            Dispatch::Redirect(Route::SignIn)
        );
    }

    #[test]
    fn test_route_paths() {
        assert_eq!(Route::Landing.path(), "/");
        assert_eq!(Route::SignIn.path(), "/auth");
        assert_eq!(Route::Dashboard.path(), "/dashboard");
    }
}
