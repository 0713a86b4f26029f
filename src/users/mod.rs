mod memory;
mod pg;
mod repo;
mod repo_types;

pub use memory::InMemoryUserRepository;
pub use pg::PgUserRepository;
pub use repo::{RepoError, RepoResult, UserRepository};
pub use repo_types::{NewUser, PublicUser, User};
