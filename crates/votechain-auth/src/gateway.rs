use crate::oauth::{GoogleOAuth, PendingLogin};
use crate::session::SessionFile;
use crate::AuthError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use votechain_models::AuthUser;

/// Current sign-in state plus change notification.
///
/// The signed-in user is held in a `watch` channel; `on_auth_change`
/// subscribers each run as a spawned task.
pub struct AuthGateway {
    oauth: GoogleOAuth,
    session: Option<SessionFile>,
    current: watch::Sender<Option<AuthUser>>,
}

/// Handle returned by [`AuthGateway::on_auth_change`]. Delivery stops when it
/// is dropped or [`unsubscribe`](Self::unsubscribe)d.
pub struct AuthSubscription {
    task: JoinHandle<()>,
}

impl AuthSubscription {
    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl AuthGateway {
    pub fn new(oauth: GoogleOAuth, session: Option<SessionFile>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            oauth,
            session,
            current,
        }
    }

    /// Publish the user saved by a previous run, if still valid.
    pub async fn restore(&self) -> Result<Option<AuthUser>, AuthError> {
        let Some(session) = &self.session else {
            return Ok(None);
        };
        let user = session.load().await?;
        if let Some(user) = &user {
            tracing::debug!(uid = %user.uid, "restored saved session");
        }
        self.current.send_replace(user.clone());
        Ok(user)
    }

    /// Start a redirect sign-in. The caller sends the user to `auth_url`.
    pub fn login_with_google(&self) -> Result<PendingLogin, AuthError> {
        self.oauth.begin_login()
    }

    pub async fn complete_login(
        &self,
        pending: &PendingLogin,
        returned_state: &str,
        code: &str,
    ) -> Result<AuthUser, AuthError> {
        let user = self.oauth.complete(pending, returned_state, code).await?;
        if let Some(session) = &self.session {
            session.save(&user).await?;
        }
        self.current.send_replace(Some(user.clone()));
        Ok(user)
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        if let Some(session) = &self.session {
            session.clear().await?;
        }
        let previous = self.current.send_replace(None);
        if let Some(user) = previous {
            tracing::info!(uid = %user.uid, "signed out");
        }
        Ok(())
    }

    pub fn get_current_user(&self) -> Option<AuthUser> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.current.subscribe()
    }

    /// Invoke `callback` with the current user now and after every change.
    pub fn on_auth_change<F>(&self, mut callback: F) -> AuthSubscription
    where
        F: FnMut(Option<AuthUser>) + Send + 'static,
    {
        let mut rx = self.subscribe();
        let task = tokio::spawn(async move {
            let initial = rx.borrow_and_update().clone();
            callback(initial);
            while rx.changed().await.is_ok() {
                let user = rx.borrow_and_update().clone();
                callback(user);
            }
        });
        AuthSubscription { task }
    }
}
