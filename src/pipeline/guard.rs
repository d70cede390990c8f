// Route-level access control: a fixed two-rule policy over the member area
// and the public entry route.

use crate::config::{ENTRY_PATH, LANDING_PATH, PROTECTED_PREFIX};

/// Outcome of the guard for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// 303 redirect; terminal, downstream handlers never run.
    Redirect(&'static str),
}

/// Anonymous requests under the member area go to the entry route;
/// authenticated requests to the entry route itself go to the landing page.
/// The two predicates are disjoint, so evaluation order does not matter.
pub fn decide(authenticated: bool, path: &str) -> GuardDecision {
    if !authenticated && path.starts_with(PROTECTED_PREFIX) {
        return GuardDecision::Redirect(ENTRY_PATH);
    }
    if authenticated && path == ENTRY_PATH {
        return GuardDecision::Redirect(LANDING_PATH);
    }
    GuardDecision::Allow
}
