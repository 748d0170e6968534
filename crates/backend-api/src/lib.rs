mod docs;
mod error;
mod extract;
mod state;

pub mod routes;
pub mod services;

pub use docs::ApiDoc;
pub use error::{ApiError, ErrorResponse};
pub use extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
pub use state::{AppState, ClientEvent, ServerEvent};

use axum::{
    extract::DefaultBodyLimit,
    http::header::{AUTHORIZATION, CONTENT_TYPE},
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Multipart framing on top of the per-file limit.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let storage = state.config().storage.clone();
    let upload_limit = storage
        .max_upload_bytes
        .saturating_mul(services::media::MAX_FILES_PER_UPLOAD as u64)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let upload_limit = usize::try_from(upload_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/health", get(routes::health::api_health))
        // Auth routes
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/me", get(routes::auth::me))
        .route(
            "/api/auth/device-token",
            put(routes::auth::update_device_token),
        )
        .route("/api/auth/logout", post(routes::auth::logout))
        // Post routes
        .route("/api/posts", post(routes::posts::create_post))
        .route("/api/posts/feed", get(routes::posts::feed))
        .route("/api/posts/trending", get(routes::posts::trending))
        .route("/api/posts/nearby", get(routes::posts::nearby))
        .route(
            "/api/posts/:post_id",
            get(routes::posts::get_post).delete(routes::posts::delete_post),
        )
        .route(
            "/api/posts/:post_id/comments",
            get(routes::comments::list_comments),
        )
        // Comment, like and reaction routes
        .route("/api/comments", post(routes::comments::add_comment))
        .route(
            "/api/comments/:comment_id",
            delete(routes::comments::delete_comment),
        )
        .route("/api/likes/toggle", post(routes::likes::toggle_like))
        .route(
            "/api/reactions/toggle",
            post(routes::reactions::toggle_reaction),
        )
        // Notification routes
        .route(
            "/api/notifications/unread",
            get(routes::notifications::get_unread),
        )
        .route(
            "/api/notifications/unread/count",
            get(routes::notifications::get_unread_count),
        )
        .route(
            "/api/notifications/read/:notification_id",
            patch(routes::notifications::mark_notification_read),
        )
        .route(
            "/api/notifications/read-all",
            patch(routes::notifications::mark_all_read),
        )
        // User routes
        .route("/api/users/search", get(routes::users::search_users))
        .route("/api/users/:anonymous_id", get(routes::users::get_profile))
        .route(
            "/api/users/:anonymous_id/posts",
            get(routes::posts::user_posts),
        )
        .route(
            "/api/users/:anonymous_id/echo",
            post(routes::users::echo_user).delete(routes::users::unecho_user),
        )
        // Chat routes
        .route(
            "/api/chat/conversations",
            get(routes::chat::list_conversations),
        )
        .route(
            "/api/chat/:peer_id/messages",
            get(routes::chat::get_messages).post(routes::chat::send_message),
        )
        .route("/api/chat/:peer_id/read", patch(routes::chat::mark_read))
        // Media routes
        .route(
            "/api/media",
            post(routes::media::upload_media).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // WebSocket route
        .route("/ws", get(routes::websocket::websocket_handler))
        .nest_service(&storage.public_path, ServeDir::new(&storage.upload_dir))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(trace_layer())
        .layer(cors_layer())
}

fn trace_layer() -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
