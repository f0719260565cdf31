use votechain_auth::{AdminAllowList, AuthState};
use votechain_models::{AuthUser, Role};
use votechain_store::{DocumentStore, StoreError};

/// Allow-listed emails are promoted to admin (and the promotion stored);
/// everyone else gets their stored role, or `user` when none is stored.
pub async fn resolve_role<S: DocumentStore>(
    store: &S,
    user: &AuthUser,
    allow_list: &AdminAllowList,
) -> Result<Role, StoreError> {
    let allow_listed = user
        .email
        .as_deref()
        .is_some_and(|email| allow_list.contains(email));
    if allow_listed {
        if store.get_user_role(&user.uid).await? != Role::Admin {
            store.set_user_role(&user.uid, Role::Admin).await?;
            tracing::info!(uid = %user.uid, "allow-listed user promoted to admin");
        }
        return Ok(Role::Admin);
    }
    store.get_user_role(&user.uid).await
}

/// Full auth state for the signed-in user, if any.
pub async fn resolve_auth_state<S: DocumentStore>(
    store: &S,
    user: Option<AuthUser>,
    allow_list: &AdminAllowList,
) -> Result<AuthState, StoreError> {
    let state = AuthState::new(user);
    let role = match state.user() {
        Some(user) => resolve_role(store, user, allow_list).await?,
        None => return Ok(state),
    };
    Ok(state.with_role(role))
}
