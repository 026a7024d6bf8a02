use crate::{handlers, AppState};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post, MethodRouter},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Preflight answers and `Access-Control-*` headers for one endpoint.
fn cors(methods: &[Method]) -> CorsLayer {
    let mut allowed = methods.to_vec();
    allowed.push(Method::OPTIONS);
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(allowed)
        .allow_headers([header::CONTENT_TYPE])
}

/// Serves the given methods; everything else gets a JSON 405, except
/// OPTIONS, which the CORS layer answers.
fn endpoint(router: MethodRouter<Arc<AppState>>, methods: &[Method]) -> MethodRouter<Arc<AppState>> {
    router
        .fallback(handlers::method_not_allowed)
        .layer(cors(methods))
}

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/memes/list", endpoint(get(handlers::list_memes), &[Method::GET]))
        .route("/memes/post", endpoint(post(handlers::post_meme), &[Method::POST]))
        .route(
            "/memes/post-simple",
            endpoint(post(handlers::post_meme_simple), &[Method::POST]),
        )
        .route("/memes/vote", endpoint(post(handlers::vote_meme), &[Method::POST]))
        .route("/memes/champion", endpoint(get(handlers::get_champion), &[Method::GET]))
        .route(
            "/test",
            endpoint(
                get(handlers::diagnostics).post(handlers::diagnostics),
                &[Method::GET, Method::POST],
            ),
        )
        // Middleware Layers
        .layer(TraceLayer::new_for_http())
        // A 5 MiB image is roughly 6.7 MiB once base64 encoded
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(state)
}
