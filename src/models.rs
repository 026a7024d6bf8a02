use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Meme {
    pub id: Uuid,
    pub image_url: String,
    pub vote_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Meme {
    /// A freshly submitted meme with no votes.
    pub fn new(image_url: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            image_url,
            vote_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One ballot cast by an IP address on a given UTC day.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Vote {
    pub id: Uuid,
    pub meme_id: Uuid,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(meme_id: Uuid, ip_address: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            meme_id,
            ip_address: ip_address.into(),
            created_at: now,
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    /// Key that makes "one vote per IP per UTC day" a storage-level constraint.
    pub fn ballot_key(&self) -> String {
        ballot_key(&self.ip_address, self.day())
    }
}

pub fn ballot_key(ip_address: &str, day: NaiveDate) -> String {
    format!("{}#{}", ip_address, day.format("%Y-%m-%d"))
}

#[derive(Serialize, Debug, Clone)]
pub struct ListedMeme {
    #[serde(flatten)]
    pub meme: Meme,
    #[serde(rename = "canVote")]
    pub can_vote: bool,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListStats {
    pub total_memes: usize,
    pub total_votes: u64,
    pub today_submissions: usize,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemeListResponse {
    pub memes: Vec<ListedMeme>,
    pub stats: ListStats,
    /// Memes the caller voted for today.
    pub user_votes: BTreeMap<Uuid, bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ballot_key_buckets_by_utc_day() {
        let late = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
        let vote = Vote::new(Uuid::new_v4(), "1.2.3.4", late);
        assert_eq!(vote.ballot_key(), "1.2.3.4#2024-03-09");

        let next = Vote::new(vote.meme_id, "1.2.3.4", late + chrono::Duration::seconds(1));
        assert_eq!(next.ballot_key(), "1.2.3.4#2024-03-10");
    }

    #[test]
    fn listed_meme_flattens_fields() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let listed = ListedMeme {
            meme: Meme::new("http://img/1.png".into(), now),
            can_vote: true,
        };
        let value = serde_json::to_value(&listed).unwrap();
        assert_eq!(value["image_url"], "http://img/1.png");
        assert_eq!(value["vote_count"], 0);
        assert_eq!(value["canVote"], true);
        assert!(value.get("meme").is_none());
    }
}
