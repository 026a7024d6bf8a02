//! In-process adapters for the domain traits.
//!
//! Each store guards its data with a mutex so every operation is atomic,
//! which gives the same guarantees as the conditional writes used by the
//! DynamoDB adapters. Failure switches let callers force an operation to
//! fail and observe how the request protocols compensate.

use crate::{
    domain::{Clock, FileStorage, MemeRepository, VoteRepository},
    errors::{RepoError, StorageError},
    models::{Meme, Vote},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard,
    },
};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave these maps half-written.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn injected(switch: &AtomicBool, what: &str) -> Result<(), RepoError> {
    if switch.load(Ordering::SeqCst) {
        return Err(RepoError::BackendError(anyhow::anyhow!("injected failure: {}", what)));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct InMemoryMemeRepository {
    memes: Mutex<HashMap<Uuid, Meme>>,
    fail_creates: AtomicBool,
    fail_reads: AtomicBool,
    fail_increments: AtomicBool,
}

impl InMemoryMemeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a meme as-is, bypassing the failure switches.
    pub fn insert(&self, meme: Meme) {
        lock(&self.memes).insert(meme.id, meme);
    }

    pub fn get(&self, id: Uuid) -> Option<Meme> {
        lock(&self.memes).get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.memes).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_increments(&self, fail: bool) {
        self.fail_increments.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MemeRepository for InMemoryMemeRepository {
    async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
        injected(&self.fail_creates, "create meme")?;
        let mut memes = lock(&self.memes);
        if memes.contains_key(&meme.id) {
            return Err(RepoError::Conflict(format!("meme {} already exists", meme.id)));
        }
        memes.insert(meme.id, meme.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError> {
        injected(&self.fail_reads, "get meme")?;
        Ok(self.get(id))
    }

    async fn list_all(&self) -> Result<Vec<Meme>, RepoError> {
        injected(&self.fail_reads, "list memes")?;
        Ok(lock(&self.memes).values().cloned().collect())
    }

    async fn increment_votes(&self, id: Uuid, at: DateTime<Utc>) -> Result<Meme, RepoError> {
        injected(&self.fail_increments, "increment votes")?;
        let mut memes = lock(&self.memes);
        let meme = memes.get_mut(&id).ok_or(RepoError::NotFound(id))?;
        meme.vote_count += 1;
        meme.updated_at = at;
        Ok(meme.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryVoteRepository {
    votes: Mutex<Vec<Vote>>,
    fail_lookups: AtomicBool,
    fail_records: AtomicBool,
    fail_retractions: AtomicBool,
}

impl InMemoryVoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Vote> {
        lock(&self.votes).clone()
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_records(&self, fail: bool) {
        self.fail_records.store(fail, Ordering::SeqCst);
    }

    pub fn fail_retractions(&self, fail: bool) {
        self.fail_retractions.store(fail, Ordering::SeqCst);
    }
}

/// Half-open `[day 00:00, next day 00:00)` window in UTC.
fn cast_on(vote: &Vote, ip: &str, day: NaiveDate) -> bool {
    let start = day.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    match start {
        Some(start) => {
            vote.ip_address == ip
                && vote.created_at >= start
                && vote.created_at < start + Duration::days(1)
        }
        None => false,
    }
}

#[async_trait]
impl VoteRepository for InMemoryVoteRepository {
    async fn find_for_day(&self, ip: &str, day: NaiveDate) -> Result<Option<Vote>, RepoError> {
        injected(&self.fail_lookups, "find ballot")?;
        Ok(lock(&self.votes).iter().find(|v| cast_on(v, ip, day)).cloned())
    }

    async fn record(&self, vote: &Vote) -> Result<(), RepoError> {
        injected(&self.fail_records, "record ballot")?;
        let mut votes = lock(&self.votes);
        if votes.iter().any(|v| cast_on(v, &vote.ip_address, vote.day())) {
            return Err(RepoError::Conflict(format!("ballot '{}' already cast", vote.ballot_key())));
        }
        votes.push(vote.clone());
        Ok(())
    }

    async fn retract(&self, ip: &str, day: NaiveDate, meme_id: Uuid) -> Result<(), RepoError> {
        injected(&self.fail_retractions, "retract ballot")?;
        lock(&self.votes).retain(|v| !(v.meme_id == meme_id && cast_on(v, ip, day)));
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemoryFileStorage {
    base_url: String,
    objects: Mutex<HashMap<String, (Vec<u8>, Option<String>)>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryFileStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Mutex::new(HashMap::new()),
            fail_uploads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    /// Stored bytes and content type of an object.
    pub fn object(&self, key: &str) -> Option<(Vec<u8>, Option<String>)> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileStorage for InMemoryFileStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::UploadFailed(format!("injected failure uploading '{}'", key)));
        }
        let mut objects = lock(&self.objects);
        if objects.contains_key(key) {
            return Err(StorageError::UploadFailed(format!("object '{}' already exists", key)));
        }
        objects.insert(key.to_string(), (data, content_type));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::BackendError(anyhow::anyhow!("injected failure deleting '{}'", key)));
        }
        lock(&self.objects).remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *lock(&self.now) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}
