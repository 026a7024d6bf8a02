use meme_voting_api::{
    aws_clients::{create_dynamodb_client, create_s3_client, create_sdk_config},
    config::Config,
    domain::SystemClock,
    errors::AppError,
    repositories::{DynamoDbMemeRepository, DynamoDbVoteRepository},
    routes::create_router,
    startup::init_resources,
    storage::S3FileStorage,
    AppState,
};
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "meme_voting_api=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    // Missing credentials abort here, before any client or listener exists.
    let config = Config::load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        AppError::from(e)
    })?;
    tracing::info!(?config, "Configuration loaded");

    // --- AWS Client Initialization ---
    let sdk_config = create_sdk_config(&config).await;
    let db_client = create_dynamodb_client(&sdk_config);
    let s3_client = create_s3_client(&sdk_config);

    if config.init_resources {
        init_resources(&db_client, &s3_client, &config).await?;
    } else {
        tracing::info!("Skipping resource initialization (MEME_INIT_RESOURCES=false)");
    }

    // --- Application State ---
    let state = Arc::new(AppState {
        meme_repo: Arc::new(DynamoDbMemeRepository::new(db_client.clone(), config.memes_table.clone())),
        vote_repo: Arc::new(DynamoDbVoteRepository::new(db_client, config.votes_table.clone())),
        file_storage: Arc::new(S3FileStorage::new(
            s3_client,
            config.meme_bucket_name.clone(),
            config.public_base_url.clone(),
        )),
        clock: Arc::new(SystemClock),
        environment: config.environment_flags(),
    });

    let app = create_router(state);

    // --- Server Startup ---
    tracing::info!("Server listening on http://{}", config.bind_address);

    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
