use porter_types::User;

use crate::error::StoreResult;

/// Resolves a user identity (an email address) to a known user.
pub trait IdentityProvider {
    /// Returns `Ok(None)` when no such user exists.
    fn resolve(&self, email: &str) -> StoreResult<Option<User>>;
}

/// A fixed list of users, for embedding and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentities {
    users: Vec<User>,
}

impl StaticIdentities {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

impl IdentityProvider for StaticIdentities {
    fn resolve(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.users.iter().find(|u| u.email == email).cloned())
    }
}
