use crate::{config::Config, errors::AppError};
use aws_sdk_dynamodb::{
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
    Client as DynamoDbClient, error::SdkError as DynamoSdkError,
};
use aws_sdk_s3::{
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client, error::SdkError as S3SdkError,
};
use tracing;

/// Creates a pay-per-request table keyed by a single string hash key, if it doesn't exist.
async fn create_table_if_not_exists(client: &DynamoDbClient, table_name: &str, hash_key: &str) -> Result<(), AppError> {
    let result = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(hash_key)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|e| AppError::InitError(format!("Failed to build attribute definition: {}", e)))?
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(hash_key)
                .key_type(KeyType::Hash)
                .build()
                .map_err(|e| AppError::InitError(format!("Failed to build key schema: {}", e)))?
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;
    match result {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created successfully or setup initiated.", table_name);
            Ok(())
        }
        Err(e) => {
            if let DynamoSdkError::ServiceError(service_err) = &e {
                if service_err.err().is_resource_in_use_exception() {
                    tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
                    return Ok(());
                }
            }
            let context = format!("Startup: Error creating DynamoDB table '{}'", table_name);
            tracing::error!("{}: {}", context, e);
            Err(AppError::InitError(format!("{}: {}", context, e)))
        }
    }
}

/// Ensures the S3 bucket exists, creating it with the correct location constraint if needed.
async fn ensure_s3_bucket_exists(client: &S3Client, bucket_name: &str, region_str: &str) -> Result<(), AppError> {
    let mut create_bucket_req_builder = client.create_bucket().bucket(bucket_name);
    if region_str != "us-east-1" {
        create_bucket_req_builder = create_bucket_req_builder.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        );
    }

    match create_bucket_req_builder.send().await {
        Ok(_) => {
            tracing::info!("Startup: S3 bucket '{}' created.", bucket_name);
            Ok(())
        }
        Err(sdk_err) => {
            if let S3SdkError::ServiceError(service_err) = &sdk_err {
                let code = service_err.err().meta().code();
                if code == Some("BucketAlreadyOwnedByYou") || code == Some("BucketAlreadyExists") {
                    tracing::info!("Startup: S3 bucket '{}' already exists.", bucket_name);
                    return Ok(());
                }
            }
            let context = format!("Startup: Error creating S3 bucket '{}'", bucket_name);
            tracing::error!("{}: {}", context, sdk_err);
            Err(AppError::InitError(format!("{}: {}", context, sdk_err)))
        }
    }
}

/// Initializes the memes table, the votes table and the image bucket.
pub async fn init_resources(
    db_client: &DynamoDbClient,
    s3_client: &S3Client,
    config: &Config,
) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing AWS resources...");
    create_table_if_not_exists(db_client, &config.memes_table, "meme_id").await?;
    // Ballot key doubles as the one-vote-per-IP-per-day constraint.
    create_table_if_not_exists(db_client, &config.votes_table, "ballot_key").await?;
    ensure_s3_bucket_exists(s3_client, &config.meme_bucket_name, &config.aws_region).await?;
    tracing::info!("Startup: AWS resource initialization complete.");
    Ok(())
}
