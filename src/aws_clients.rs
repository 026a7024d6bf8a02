use crate::config::Config;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use tracing;

const CREDENTIALS_PROVIDER: &str = "meme-voting-env";

// Creates the base AWS SDK configuration based on application config.
// Uses the static service credential from `Config`: no profile lookup,
// no session, nothing to refresh.
pub async fn create_sdk_config(config: &Config) -> SdkConfig {
    let region = Region::new(config.aws_region.clone());
    tracing::info!(sdk_region = %config.aws_region, endpoint = %config.service_url, "Setting SDK region and endpoint");

    let credentials = Credentials::new(
        config.access_key_id.clone(),
        config.secret_access_key.clone(),
        None,
        None,
        CREDENTIALS_PROVIDER,
    );

    aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .endpoint_url(&config.service_url)
        .credentials_provider(credentials)
        .load()
        .await
}

// Creates a DynamoDB client from a shared SdkConfig.
pub fn create_dynamodb_client(sdk_config: &SdkConfig) -> DynamoDbClient {
    DynamoDbClient::new(sdk_config)
}

// Creates an S3 client from a shared SdkConfig.
pub fn create_s3_client(sdk_config: &SdkConfig) -> S3Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(true)
        .build();
    S3Client::from_conf(s3_config)
}
