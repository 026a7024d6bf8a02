use crate::errors::{RepoError, StorageError};
use crate::models::{Meme, Vote};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Trait defining operations for storing and retrieving Meme metadata.
#[async_trait]
pub trait MemeRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Stores a newly submitted meme.
    async fn create(&self, meme: &Meme) -> Result<(), RepoError>;

    /// Retrieves a meme by its unique ID.
    /// Returns Ok(None) if the meme is not found.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError>;

    /// Lists all memes, unordered.
    async fn list_all(&self) -> Result<Vec<Meme>, RepoError>;

    /// Atomically adds one vote and stamps `updated_at`, returning the new state.
    /// Fails with `RepoError::NotFound` if the meme does not exist.
    async fn increment_votes(&self, id: Uuid, at: DateTime<Utc>) -> Result<Meme, RepoError>;
}

/// Ballots, at most one per IP address per UTC day.
#[async_trait]
pub trait VoteRepository: Send + Sync + 'static {
    /// Returns the ballot cast by `ip` on `day`, if any.
    async fn find_for_day(&self, ip: &str, day: NaiveDate) -> Result<Option<Vote>, RepoError>;

    /// Inserts a ballot. Fails with `RepoError::Conflict` when the IP already
    /// holds one for the vote's day.
    async fn record(&self, vote: &Vote) -> Result<(), RepoError>;

    /// Removes the ballot cast by `ip` on `day` if it still points at `meme_id`.
    async fn retract(&self, ip: &str, day: NaiveDate, meme_id: Uuid) -> Result<(), RepoError>;
}

/// Trait defining operations for storing file data (meme images).
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    /// Uploads file data to the storage backend.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Publicly reachable URL of a stored object.
    fn public_url(&self, key: &str) -> String;
}

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
