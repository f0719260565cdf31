use votechain_models::{AuthUser, Role};

/// Where a user is in the sign-in lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Anonymous,
    /// Signed in, role not resolved yet.
    AuthenticatedUnassigned(AuthUser),
    AuthenticatedUser(AuthUser),
    AuthenticatedAdmin(AuthUser),
}

impl AuthState {
    pub fn new(user: Option<AuthUser>) -> Self {
        match user {
            Some(user) => AuthState::AuthenticatedUnassigned(user),
            None => AuthState::Anonymous,
        }
    }

    /// Attach a resolved role. Anonymous stays anonymous.
    pub fn with_role(self, role: Role) -> Self {
        match self {
            AuthState::Anonymous => AuthState::Anonymous,
            AuthState::AuthenticatedUnassigned(user)
            | AuthState::AuthenticatedUser(user)
            | AuthState::AuthenticatedAdmin(user) => match role {
                Role::Admin => AuthState::AuthenticatedAdmin(user),
                Role::User => AuthState::AuthenticatedUser(user),
            },
        }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            AuthState::Anonymous => None,
            AuthState::AuthenticatedUnassigned(user)
            | AuthState::AuthenticatedUser(user)
            | AuthState::AuthenticatedAdmin(user) => Some(user),
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            AuthState::AuthenticatedUser(_) => Some(Role::User),
            AuthState::AuthenticatedAdmin(_) => Some(Role::Admin),
            AuthState::Anonymous | AuthState::AuthenticatedUnassigned(_) => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AuthState::AuthenticatedAdmin(_))
    }
}

/// Emails that are always granted the admin role.
#[derive(Debug, Clone, Default)]
pub struct AdminAllowList {
    emails: Vec<String>,
}

impl AdminAllowList {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let emails = emails
            .into_iter()
            .map(|e| e.as_ref().trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { emails }
    }

    pub fn contains(&self, email: &str) -> bool {
        let email = email.trim();
        self.emails.iter().any(|e| e.eq_ignore_ascii_case(email))
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}
