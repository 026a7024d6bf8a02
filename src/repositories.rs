use crate::{
    domain::{MemeRepository, VoteRepository},
    errors::RepoError,
    models::{ballot_key, Meme, Vote},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    types::{AttributeValue, ReturnValue},
    Client as DynamoDbClient,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::collections::HashMap;
use tracing::{self, info};
use uuid::Uuid;

type Item = HashMap<String, AttributeValue>;

#[derive(Debug, Clone)]
pub struct DynamoDbMemeRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbMemeRepository {
    /// Creates a new repository instance configured for a specific table.
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbMemeRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl MemeRepository for DynamoDbMemeRepository {
    /// Stores a `Meme` in the DynamoDB table using PutItem.
    async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("meme_id", AttributeValue::S(meme.id.to_string()))
            .item("image_url", AttributeValue::S(meme.image_url.clone()))
            .item("vote_count", AttributeValue::N(meme.vote_count.to_string()))
            .item("created_at", AttributeValue::S(timestamp(meme.created_at)))
            .item("updated_at", AttributeValue::S(timestamp(meme.updated_at)))
            .condition_expression("attribute_not_exists(meme_id)")
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put meme (id: {})", self.table_name, meme.id))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    /// Retrieves a `Meme` from DynamoDB using GetItem.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError> {
        let id_str = id.to_string();
        let resp = self.client
            .get_item()
            .table_name(&self.table_name)
            .key("meme_id", AttributeValue::S(id_str.clone()))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get meme (id: {})", self.table_name, id_str))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => item_to_meme(&item).map(Some).ok_or_else(|| {
                tracing::error!(meme_id = %id_str, table_name = %self.table_name, "DynamoDB: Retrieved item but failed to parse into Meme");
                RepoError::DataCorruption(format!(
                    "Failed to parse meme data retrieved from DynamoDB table '{}' for id {}",
                    self.table_name, id_str
                ))
            }),
            None => Ok(None), // Item not found is not an error
        }
    }

    /// Lists all memes using DynamoDB Scan. Handles pagination.
    async fn list_all(&self) -> Result<Vec<Meme>, RepoError> {
        tracing::debug!("DynamoDB: Scanning table '{}' for all memes", self.table_name);
        let mut memes: Vec<Meme> = Vec::new();
        let mut last_evaluated_key: Option<Item> = None;

        loop {
            let mut request_builder = self.client.scan().table_name(&self.table_name);

            if let Some(lek) = last_evaluated_key {
                request_builder = request_builder.set_exclusive_start_key(Some(lek));
            }

            let resp = request_builder
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}'", self.table_name))
                .map_err(RepoError::BackendError)?;

            for item in resp.items.unwrap_or_default() {
                match item_to_meme(&item) {
                    Some(meme) => memes.push(meme),
                    None => {
                        let item_id = item.get("meme_id").and_then(|v| v.as_s().ok());
                        tracing::error!(item.id = ?item_id, table_name = %self.table_name, "DynamoDB: Failed to parse item from scan into Meme");
                        return Err(RepoError::DataCorruption(format!(
                            "DynamoDB: Failed to parse item {:?} during scan of table '{}'",
                            item_id, self.table_name
                        )));
                    }
                }
            }

            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
            tracing::debug!("DynamoDB Scan (table: {}): Continuing with LastEvaluatedKey...", self.table_name);
        }

        tracing::debug!("DynamoDB (table: {}): Listed {} memes", self.table_name, memes.len());
        Ok(memes)
    }

    /// Single UpdateItem with `ADD`, so concurrent votes never overwrite each other.
    async fn increment_votes(&self, id: Uuid, at: DateTime<Utc>) -> Result<Meme, RepoError> {
        let id_str = id.to_string();
        let result = self.client
            .update_item()
            .table_name(&self.table_name)
            .key("meme_id", AttributeValue::S(id_str.clone()))
            .update_expression("ADD vote_count :one SET updated_at = :now")
            .condition_expression("attribute_exists(meme_id)")
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .expression_attribute_values(":now", AttributeValue::S(timestamp(at)))
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Err(RepoError::NotFound(id));
                    }
                }
                return Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                    "DynamoDB (table: {}): Failed to increment votes (id: {})",
                    self.table_name, id_str
                ))));
            }
        };

        resp.attributes
            .as_ref()
            .and_then(item_to_meme)
            .ok_or_else(|| RepoError::DataCorruption(format!(
                "DynamoDB (table: {}): Increment of meme {} returned an unreadable item",
                self.table_name, id_str
            )))
    }
}

#[derive(Debug, Clone)]
pub struct DynamoDbVoteRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbVoteRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbVoteRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl VoteRepository for DynamoDbVoteRepository {
    async fn find_for_day(&self, ip: &str, day: NaiveDate) -> Result<Option<Vote>, RepoError> {
        let key = ballot_key(ip, day);
        let resp = self.client
            .get_item()
            .table_name(&self.table_name)
            .key("ballot_key", AttributeValue::S(key.clone()))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get ballot '{}'", self.table_name, key))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => item_to_vote(&item).map(Some).ok_or_else(|| {
                RepoError::DataCorruption(format!(
                    "Failed to parse ballot '{}' from DynamoDB table '{}'",
                    key, self.table_name
                ))
            }),
            None => Ok(None),
        }
    }

    /// Conditional PutItem keyed on the ballot, the uniqueness constraint for daily votes.
    async fn record(&self, vote: &Vote) -> Result<(), RepoError> {
        let key = vote.ballot_key();
        tracing::debug!(ballot_key = %key, meme_id = %vote.meme_id, "DynamoDB: Recording vote");

        let result = self.client
            .put_item()
            .table_name(&self.table_name)
            .item("ballot_key", AttributeValue::S(key.clone()))
            .item("vote_id", AttributeValue::S(vote.id.to_string()))
            .item("meme_id", AttributeValue::S(vote.meme_id.to_string()))
            .item("ip_address", AttributeValue::S(vote.ip_address.clone()))
            .item("created_at", AttributeValue::S(timestamp(vote.created_at)))
            .condition_expression("attribute_not_exists(ballot_key)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Err(RepoError::Conflict(format!("ballot '{}' already cast", key)));
                    }
                }
                Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                    "DynamoDB (table: {}): Failed to record ballot '{}'",
                    self.table_name, key
                ))))
            }
        }
    }

    async fn retract(&self, ip: &str, day: NaiveDate, meme_id: Uuid) -> Result<(), RepoError> {
        let key = ballot_key(ip, day);
        let result = self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("ballot_key", AttributeValue::S(key.clone()))
            .condition_expression("meme_id = :meme_id")
            .expression_attribute_values(":meme_id", AttributeValue::S(meme_id.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(ballot_key = %key, "DynamoDB: Ballot retracted");
                Ok(())
            }
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        // Ballot is gone or belongs to another meme; nothing to undo.
                        tracing::debug!(ballot_key = %key, "DynamoDB: No matching ballot to retract");
                        return Ok(());
                    }
                }
                Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                    "DynamoDB (table: {}): Failed to retract ballot '{}'",
                    self.table_name, key
                ))))
            }
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &AttributeValue) -> Option<DateTime<Utc>> {
    let raw = value.as_s().ok()?;
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

fn parse_uuid(value: &AttributeValue) -> Option<Uuid> {
    value.as_s().ok().and_then(|s| Uuid::parse_str(s).ok())
}

// Helper function to convert DynamoDB item map to Meme struct
fn item_to_meme(item: &Item) -> Option<Meme> {
    Some(Meme {
        id: parse_uuid(item.get("meme_id")?)?,
        image_url: item.get("image_url")?.as_s().ok()?.to_string(),
        vote_count: item.get("vote_count")?.as_n().ok()?.parse().ok()?,
        created_at: parse_timestamp(item.get("created_at")?)?,
        updated_at: parse_timestamp(item.get("updated_at")?)?,
    })
}

fn item_to_vote(item: &Item) -> Option<Vote> {
    Some(Vote {
        id: parse_uuid(item.get("vote_id")?)?,
        meme_id: parse_uuid(item.get("meme_id")?)?,
        ip_address: item.get("ip_address")?.as_s().ok()?.to_string(),
        created_at: parse_timestamp(item.get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn s(v: &str) -> AttributeValue {
        AttributeValue::S(v.to_string())
    }

    #[test]
    fn parses_meme_item() {
        let id = Uuid::new_v4();
        let item: Item = HashMap::from([
            ("meme_id".to_string(), s(&id.to_string())),
            ("image_url".to_string(), s("http://img/meme_1.png")),
            ("vote_count".to_string(), AttributeValue::N("7".to_string())),
            ("created_at".to_string(), s("2024-03-09T10:00:00.000Z")),
            ("updated_at".to_string(), s("2024-03-09T11:30:00.250Z")),
        ]);

        let meme = item_to_meme(&item).unwrap();
        assert_eq!(meme.id, id);
        assert_eq!(meme.vote_count, 7);
        assert_eq!(meme.created_at, Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap());
        assert_eq!(timestamp(meme.updated_at), "2024-03-09T11:30:00.250Z");
    }

    #[test]
    fn rejects_meme_item_with_bad_count() {
        let item: Item = HashMap::from([
            ("meme_id".to_string(), s(&Uuid::new_v4().to_string())),
            ("image_url".to_string(), s("x")),
            ("vote_count".to_string(), AttributeValue::N("-1".to_string())),
            ("created_at".to_string(), s("2024-03-09T10:00:00.000Z")),
            ("updated_at".to_string(), s("2024-03-09T10:00:00.000Z")),
        ]);
        assert!(item_to_meme(&item).is_none());
    }

    #[test]
    fn parses_vote_item() {
        let vote = Vote::new(
            Uuid::new_v4(),
            "10.0.0.1",
            Utc.with_ymd_and_hms(2024, 3, 9, 8, 0, 0).unwrap(),
        );
        let item: Item = HashMap::from([
            ("ballot_key".to_string(), s(&vote.ballot_key())),
            ("vote_id".to_string(), s(&vote.id.to_string())),
            ("meme_id".to_string(), s(&vote.meme_id.to_string())),
            ("ip_address".to_string(), s("10.0.0.1")),
            ("created_at".to_string(), s(&timestamp(vote.created_at))),
        ]);
        assert_eq!(item_to_vote(&item), Some(vote));
    }
}
