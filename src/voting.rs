//! Daily vote limit and vote submission.
//!
//! One ballot per IP address per UTC day, across all memes. The limit is
//! enforced by `VoteRepository::record`, which refuses a second ballot for
//! the same day; the up-front eligibility check only spares the write when
//! the answer is already known. The count is bumped with an atomic
//! increment, so concurrent votes never overwrite each other.

use crate::{
    errors::RepoError,
    outcome::{compensate, Outcome},
    models::Vote,
    AppState,
};
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum VoteError {
    #[error("meme ID is missing")]
    MissingMemeId,
    #[error("meme not found")]
    MemeNotFound,
    #[error("already voted today")]
    AlreadyVoted,
    #[error("failed to look up meme")]
    Lookup(#[source] RepoError),
    #[error("failed to check vote eligibility")]
    EligibilityCheck(#[source] RepoError),
    #[error("failed to record vote")]
    RecordFailed(#[source] RepoError),
    /// Increment failed, ballot was retracted.
    #[error("failed to update vote count")]
    CountUpdateFailed(#[source] RepoError),
    /// Increment failed and the ballot is still stored.
    #[error("failed to update vote count ({update}); ballot rollback failed ({rollback})")]
    Unreconciled { update: RepoError, rollback: RepoError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    pub meme_id: Uuid,
    pub vote_count: u64,
}

async fn has_voted_on(state: &AppState, ip: &str, day: NaiveDate) -> Result<bool, RepoError> {
    Ok(state.vote_repo.find_for_day(ip, day).await?.is_some())
}

/// Whether `ip` has already cast a ballot during the current UTC day.
pub async fn has_voted_today(state: &AppState, ip: &str) -> Result<bool, RepoError> {
    let today = state.clock.now().date_naive();
    has_voted_on(state, ip, today).await
}

/// Records a ballot from `ip` for `meme_id` and bumps the meme's count.
pub async fn cast_vote(
    state: &AppState,
    meme_id: Option<&str>,
    ip: &str,
) -> Result<VoteReceipt, VoteError> {
    let raw_id = meme_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(VoteError::MissingMemeId)?;
    // An unparseable id cannot name a stored meme.
    let meme_id = Uuid::parse_str(raw_id).map_err(|_| VoteError::MemeNotFound)?;

    state
        .meme_repo
        .get_by_id(meme_id)
        .await
        .map_err(VoteError::Lookup)?
        .ok_or(VoteError::MemeNotFound)?;

    let now = state.clock.now();
    let today = now.date_naive();

    if has_voted_on(state, ip, today).await.map_err(VoteError::EligibilityCheck)? {
        tracing::debug!(%ip, "Vote rejected, IP already voted today");
        return Err(VoteError::AlreadyVoted);
    }

    let vote = Vote::new(meme_id, ip, now);
    match state.vote_repo.record(&vote).await {
        Ok(()) => {}
        // Lost a race against another request from the same IP.
        Err(RepoError::Conflict(_)) => return Err(VoteError::AlreadyVoted),
        Err(e) => return Err(VoteError::RecordFailed(e)),
    }

    let increment = state.meme_repo.increment_votes(meme_id, now).await;
    let outcome = compensate(increment, || state.vote_repo.retract(ip, today, meme_id)).await;

    match outcome {
        Outcome::Committed(meme) => {
            tracing::info!(%meme_id, vote_count = meme.vote_count, "Vote recorded");
            Ok(VoteReceipt {
                meme_id,
                vote_count: meme.vote_count,
            })
        }
        Outcome::Compensated(update) => {
            tracing::warn!(%meme_id, error = %update, "Vote count update failed, ballot retracted");
            Err(VoteError::CountUpdateFailed(update))
        }
        Outcome::NeedsReconciliation { failure, compensation } => {
            tracing::error!(%meme_id, %ip, error = %failure, rollback_error = %compensation, "Vote count update failed and ballot could not be retracted");
            Err(VoteError::Unreconciled {
                update: failure,
                rollback: compensation,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::EnvironmentFlags,
        memory::{InMemoryFileStorage, InMemoryMemeRepository, InMemoryVoteRepository, ManualClock},
        models::Meme,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    struct Fixture {
        state: AppState,
        memes: Arc<InMemoryMemeRepository>,
        votes: Arc<InMemoryVoteRepository>,
        clock: Arc<ManualClock>,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let memes = Arc::new(InMemoryMemeRepository::new());
        let votes = Arc::new(InMemoryVoteRepository::new());
        let clock = Arc::new(ManualClock::new(start()));
        let state = AppState {
            meme_repo: memes.clone(),
            vote_repo: votes.clone(),
            file_storage: Arc::new(InMemoryFileStorage::new("http://storage")),
            clock: clock.clone(),
            environment: EnvironmentFlags::default(),
        };
        Fixture { state, memes, votes, clock }
    }

    fn seed(fx: &Fixture, votes: u64) -> Meme {
        let mut meme = Meme::new("http://storage/meme_1.png".into(), start() - Duration::days(2));
        meme.vote_count = votes;
        fx.memes.insert(meme.clone());
        meme
    }

    #[tokio::test]
    async fn vote_increments_and_stamps() {
        let fx = fixture();
        let meme = seed(&fx, 4);
        fx.clock.advance(Duration::minutes(5));

        let receipt = cast_vote(&fx.state, Some(&meme.id.to_string()), "1.2.3.4").await.unwrap();
        assert_eq!(receipt.vote_count, 5);

        let stored = fx.memes.get(meme.id).unwrap();
        assert_eq!(stored.vote_count, 5);
        assert!(stored.updated_at > meme.updated_at);
        assert_eq!(fx.votes.all().len(), 1);
        assert!(has_voted_today(&fx.state, "1.2.3.4").await.unwrap());
    }

    #[tokio::test]
    async fn one_vote_per_ip_per_day_across_memes() {
        let fx = fixture();
        let first = seed(&fx, 0);
        let second = seed(&fx, 0);

        cast_vote(&fx.state, Some(&first.id.to_string()), "1.2.3.4").await.unwrap();

        let again = cast_vote(&fx.state, Some(&second.id.to_string()), "1.2.3.4").await;
        assert!(matches!(again, Err(VoteError::AlreadyVoted)));

        // Another IP is unaffected.
        cast_vote(&fx.state, Some(&second.id.to_string()), "5.6.7.8").await.unwrap();

        // Next UTC day the first IP may vote again.
        fx.clock.set(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
        assert!(!has_voted_today(&fx.state, "1.2.3.4").await.unwrap());
        let receipt = cast_vote(&fx.state, Some(&second.id.to_string()), "1.2.3.4").await.unwrap();
        assert_eq!(receipt.vote_count, 2);
    }

    #[tokio::test]
    async fn rejects_missing_and_unknown_memes() {
        let fx = fixture();
        assert!(matches!(cast_vote(&fx.state, None, "1.1.1.1").await, Err(VoteError::MissingMemeId)));
        assert!(matches!(cast_vote(&fx.state, Some("  "), "1.1.1.1").await, Err(VoteError::MissingMemeId)));
        assert!(matches!(cast_vote(&fx.state, Some("nope"), "1.1.1.1").await, Err(VoteError::MemeNotFound)));
        let unknown = Uuid::new_v4().to_string();
        assert!(matches!(cast_vote(&fx.state, Some(&unknown), "1.1.1.1").await, Err(VoteError::MemeNotFound)));
        assert!(fx.votes.all().is_empty());
    }

    #[tokio::test]
    async fn failed_increment_retracts_ballot() {
        let fx = fixture();
        let meme = seed(&fx, 3);
        fx.memes.fail_increments(true);

        let result = cast_vote(&fx.state, Some(&meme.id.to_string()), "1.2.3.4").await;
        assert!(matches!(result, Err(VoteError::CountUpdateFailed(_))));
        assert!(fx.votes.all().is_empty());
        assert_eq!(fx.memes.get(meme.id).unwrap().vote_count, 3);

        // Retraction restores eligibility.
        fx.memes.fail_increments(false);
        let receipt = cast_vote(&fx.state, Some(&meme.id.to_string()), "1.2.3.4").await.unwrap();
        assert_eq!(receipt.vote_count, 4);
    }

    #[tokio::test]
    async fn failed_rollback_is_reported_separately() {
        let fx = fixture();
        let meme = seed(&fx, 3);
        fx.memes.fail_increments(true);
        fx.votes.fail_retractions(true);

        let result = cast_vote(&fx.state, Some(&meme.id.to_string()), "1.2.3.4").await;
        assert!(matches!(result, Err(VoteError::Unreconciled { .. })));
        assert_eq!(fx.votes.all().len(), 1);
    }

    #[tokio::test]
    async fn failed_record_leaves_count_alone() {
        let fx = fixture();
        let meme = seed(&fx, 3);
        fx.votes.fail_records(true);

        let result = cast_vote(&fx.state, Some(&meme.id.to_string()), "1.2.3.4").await;
        assert!(matches!(result, Err(VoteError::RecordFailed(_))));
        assert_eq!(fx.memes.get(meme.id).unwrap().vote_count, 3);
    }

    #[tokio::test]
    async fn eligibility_failure_propagates() {
        let fx = fixture();
        let meme = seed(&fx, 0);
        fx.votes.fail_lookups(true);

        assert!(has_voted_today(&fx.state, "1.2.3.4").await.is_err());
        let result = cast_vote(&fx.state, Some(&meme.id.to_string()), "1.2.3.4").await;
        assert!(matches!(result, Err(VoteError::EligibilityCheck(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_votes_never_lose_increments() {
        let fx = fixture();
        let meme = seed(&fx, 10);
        let state = Arc::new(fx.state.clone());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let state = state.clone();
                let id = meme.id.to_string();
                tokio::spawn(async move { cast_vote(&state, Some(&id), &format!("10.0.0.{}", i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(fx.memes.get(meme.id).unwrap().vote_count, 26);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_votes_from_one_ip_count_once() {
        let fx = fixture();
        let meme = seed(&fx, 0);
        let state = Arc::new(fx.state.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                let id = meme.id.to_string();
                tokio::spawn(async move { cast_vote(&state, Some(&id), "1.2.3.4").await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(VoteError::AlreadyVoted) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(fx.memes.get(meme.id).unwrap().vote_count, 1);
        assert_eq!(fx.votes.all().len(), 1);
    }
}
