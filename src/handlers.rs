use crate::{
    captcha,
    errors::AppError,
    listing::{self, SortBy},
    models::{ListedMeme, MemeListResponse},
    request::ClientIp,
    submission::{self, SubmitMemeRequest},
    voting,
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::json;
use std::{collections::BTreeMap, sync::Arc};
use tracing;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub sort_by: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[serde(default)]
    pub meme_id: Option<String>,
}

/// GET /memes/list
pub async fn list_memes(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Query(params): Query<ListParams>,
) -> Result<Json<MemeListResponse>, AppError> {
    let mut memes = state
        .meme_repo
        .list_all()
        .await
        .map_err(|e| AppError::RepositoryError("Error loading memes", e))?;

    listing::sort_memes(&mut memes, SortBy::parse(params.sort_by.as_deref()));
    if let Some(limit) = listing::parse_limit(params.limit.as_deref()) {
        memes.truncate(limit);
    }

    if memes.is_empty() {
        return Ok(Json(MemeListResponse::default()));
    }

    let today = state.clock.now().date_naive();
    // The caller's ballot only decorates the list; a failed lookup is not fatal.
    let todays_vote = match state.vote_repo.find_for_day(&ip, today).await {
        Ok(vote) => vote,
        Err(e) => {
            tracing::warn!(error = %e, %ip, "Failed to look up today's vote for caller");
            None
        }
    };
    let can_vote = todays_vote.is_none();
    let user_votes: BTreeMap<_, _> = todays_vote.map(|v| (v.meme_id, true)).into_iter().collect();

    let stats = listing::stats(&memes, today);
    let memes = memes
        .into_iter()
        .map(|meme| ListedMeme { meme, can_vote })
        .collect();

    tracing::debug!(total = stats.total_memes, %can_vote, "Listed memes");
    Ok(Json(MemeListResponse { memes, stats, user_votes }))
}

/// POST /memes/post
pub async fn post_meme(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitMemeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let meme = submission::submit_meme(&state, &request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Meme posted successfully!",
            "meme": {
                "id": meme.id,
                "image_url": meme.image_url,
                "vote_count": meme.vote_count,
                "created_at": meme.created_at,
            }
        })),
    ))
}

/// POST /memes/post-simple
///
/// Test-mode intake: runs the cheap checks and answers with a mock meme
/// without touching storage.
pub async fn post_meme_simple(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitMemeRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::error!(error = %rejection, "Error in simple post meme");
            let body = json!({ "error": "Internal server error", "details": rejection.body_text() });
            return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response());
        }
    };
    tracing::info!(
        has_image = !request.image_missing(),
        has_question = request.captcha_question.is_some(),
        has_answer = request.captcha_answer.is_some(),
        "Simple post endpoint called"
    );

    let (question, answer) = request.captcha()?;
    if request.image_missing() {
        return Err(AppError::MissingField("Image data"));
    }
    captcha::verify(question, &answer)?;

    let now = state.clock.now();
    let body = json!({
        "success": true,
        "message": "Meme posted successfully! (Test mode - not actually saved)",
        "meme": {
            "id": format!("test-{}", now.timestamp_millis()),
            "image_url": "test-url",
            "vote_count": 0,
            "created_at": now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// POST /memes/vote
pub async fn vote_meme(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(request) = payload?;
    tracing::debug!(meme_id = ?request.meme_id, %ip, "Vote requested");

    let receipt = voting::cast_vote(&state, request.meme_id.as_deref(), &ip).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Vote recorded successfully!",
        "meme": {
            "id": receipt.meme_id,
            "vote_count": receipt.vote_count,
        },
        "canVote": false,
    })))
}

/// GET /memes/champion
pub async fn get_champion(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let memes = state
        .meme_repo
        .list_all()
        .await
        .map_err(|e| AppError::RepositoryError("Error loading champion", e))?;

    let body = match listing::select_champion(memes) {
        Some(champion) => {
            let message = format!("Current champion with {} votes!", champion.vote_count);
            json!({ "champion": champion, "message": message })
        }
        None => json!({ "champion": null, "message": "No champion yet" }),
    };
    Ok(Json(body))
}

/// GET|POST /test
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    tracing::info!(%method, %uri, "Test endpoint called");
    tracing::debug!(?headers, "Test endpoint headers");

    let flags = state.environment;
    Json(json!({
        "success": true,
        "message": "API is working!",
        "timestamp": state.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "method": method.as_str(),
        "environment": {
            "version": env!("CARGO_PKG_VERSION"),
            "platform": std::env::consts::OS,
            "hasServiceUrl": flags.has_service_url,
            "hasAnonKey": flags.has_anon_key,
            "hasServiceKey": flags.has_service_key,
        }
    }))
}

/// Fallback for methods a route does not serve.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
