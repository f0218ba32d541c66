//! Session gating for the purchase flow.
//!
//! The session is owned by the external auth provider; the flow only reads
//! it. The gate is consulted once, at confirm time — a session that expires
//! after the check surfaces as a 401 from the endpoint, never as a silent
//! success.

/// Read-only view of the authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub is_authenticated: bool,
}

impl Session {
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Session {
            user_id: user_id.into(),
            is_authenticated: true,
        }
    }

    pub fn anonymous() -> Self {
        Session {
            user_id: String::new(),
            is_authenticated: false,
        }
    }
}

/// Whether the session may submit a purchase.
pub fn can_submit(session: &Session) -> bool {
    session.is_authenticated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_session_may_submit() {
        assert!(can_submit(&Session::authenticated("michael")));
    }

    #[test]
    fn anonymous_session_may_not() {
        assert!(!can_submit(&Session::anonymous()));
    }
}
