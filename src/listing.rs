use crate::models::{ListStats, Meme};
use chrono::NaiveDate;
use std::cmp::Reverse;

pub const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Votes,
    Recent,
}

impl SortBy {
    /// Anything but `recent` sorts by votes.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("recent") => SortBy::Recent,
            _ => SortBy::Votes,
        }
    }
}

/// Absent → default page size; present but not a number → no limit.
pub fn parse_limit(raw: Option<&str>) -> Option<usize> {
    match raw {
        None => Some(DEFAULT_LIMIT),
        Some(value) => value.trim().parse().ok(),
    }
}

pub fn sort_memes(memes: &mut [Meme], sort_by: SortBy) {
    match sort_by {
        SortBy::Recent => memes.sort_by_key(|m| Reverse(m.created_at)),
        SortBy::Votes => memes.sort_by_key(|m| (Reverse(m.vote_count), Reverse(m.created_at))),
    }
}

pub fn stats(memes: &[Meme], today: NaiveDate) -> ListStats {
    ListStats {
        total_memes: memes.len(),
        total_votes: memes.iter().map(|m| m.vote_count).sum(),
        today_submissions: memes
            .iter()
            .filter(|m| m.created_at.date_naive() == today)
            .count(),
    }
}

/// Highest vote count wins; ties go to the most recently updated meme.
/// Memes without votes are never champion.
pub fn select_champion(memes: Vec<Meme>) -> Option<Meme> {
    memes
        .into_iter()
        .filter(|m| m.vote_count > 0)
        .max_by_key(|m| (m.vote_count, m.updated_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn meme(votes: u64, created_offset_min: i64, updated_offset_min: i64) -> Meme {
        let mut m = Meme::new("http://img".into(), base() + Duration::minutes(created_offset_min));
        m.vote_count = votes;
        m.updated_at = base() + Duration::minutes(updated_offset_min);
        m
    }

    #[test]
    fn champion_breaks_ties_by_latest_update() {
        let t1 = meme(5, 0, 10);
        let t2 = meme(5, 1, 20);
        let memes = vec![meme(0, 2, 30), t1, t2.clone(), meme(3, 3, 40)];
        assert_eq!(select_champion(memes).map(|m| m.id), Some(t2.id));
    }

    #[test]
    fn no_champion_without_votes() {
        assert!(select_champion(vec![meme(0, 0, 0), meme(0, 1, 1)]).is_none());
        assert!(select_champion(Vec::new()).is_none());
    }

    #[test]
    fn recent_ignores_votes() {
        let old_popular = meme(100, 0, 0);
        let newest = meme(0, 10, 10);
        let middle = meme(5, 5, 5);
        let mut memes = vec![old_popular.clone(), newest.clone(), middle.clone()];
        sort_memes(&mut memes, SortBy::Recent);
        let ids: Vec<_> = memes.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![newest.id, middle.id, old_popular.id]);
    }

    #[test]
    fn votes_sort_falls_back_to_recency() {
        let a = meme(5, 0, 0);
        let b = meme(5, 10, 0);
        let c = meme(9, -10, 0);
        let mut memes = vec![a.clone(), b.clone(), c.clone()];
        sort_memes(&mut memes, SortBy::Votes);
        let ids: Vec<_> = memes.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);
    }

    #[test]
    fn query_parsing() {
        assert_eq!(SortBy::parse(None), SortBy::Votes);
        assert_eq!(SortBy::parse(Some("recent")), SortBy::Recent);
        assert_eq!(SortBy::parse(Some("whatever")), SortBy::Votes);

        assert_eq!(parse_limit(None), Some(50));
        assert_eq!(parse_limit(Some("3")), Some(3));
        assert_eq!(parse_limit(Some("lots")), None);
    }

    #[test]
    fn stats_count_today_only() {
        let yesterday = meme(2, -24 * 60, 0);
        let memes = vec![meme(1, 0, 0), meme(4, 30, 0), yesterday];
        let s = stats(&memes, base().date_naive());
        assert_eq!(
            s,
            ListStats {
                total_memes: 3,
                total_votes: 7,
                today_submissions: 2,
            }
        );
    }
}
