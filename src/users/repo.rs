use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("email already exists")]
    DuplicateEmail,
    #[error("username already exists")]
    DuplicateUsername,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        RepoError::Backend(e.into())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence for user records.
///
/// Lookups take already-normalized values. `create` must enforce uniqueness
/// of both email and username and report violations as
/// [`RepoError::DuplicateEmail`] / [`RepoError::DuplicateUsername`].
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn create(&self, user: NewUser) -> RepoResult<User>;
}
