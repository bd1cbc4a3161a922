//! User capability, user loading and login hooks
//!
//! keyward never sees the application's concrete user type. It only needs a
//! login id, a display name and the role name, plus a serde representation so
//! the user can live in the request session.

use async_trait::async_trait;
use keyward_core::KeywardResult;
use serde::{de::DeserializeOwned, Serialize};

pub trait User: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable identifier, used as the token subject
    fn login_id(&self) -> &str;

    fn name(&self) -> &str;

    /// Name of the role that grants this user's permissions
    fn role_name(&self) -> &str;
}

/// Source of user records
#[async_trait]
pub trait UserLoader<U: User>: Send + Sync {
    /// Fails with `NotFound` when the subject is unknown
    async fn user_by_id(&self, login_id: &str) -> KeywardResult<U>;

    /// Fails with `InvalidCredentials` when the pair does not match
    async fn load_user(&self, login_id: &str, password: &str) -> KeywardResult<U>;
}

/// Callbacks around login and logout. An error aborts the operation.
#[async_trait]
pub trait AuthHook<U: User>: Send + Sync {
    async fn before_login(&self, _login_id: &str, _password: &str) -> KeywardResult<()> {
        Ok(())
    }

    /// May replace the issued token
    async fn after_login(&self, _user: &U, _token: &mut String) -> KeywardResult<()> {
        Ok(())
    }

    async fn before_logout(&self, _user: &U) -> KeywardResult<()> {
        Ok(())
    }

    async fn after_logout(&self, _user: &U) -> KeywardResult<()> {
        Ok(())
    }
}
