use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    extract::{ApiJson, ApiPath, ApiQuery, AuthUser},
    routes::auth::MessageResponse,
    routes::models::{CreatePostRequest, GeoPoint, NearbyQuery, Page, PageQuery, PostView},
    services::post as post_service,
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct PostResponse {
    pub success: bool,
    pub post: PostView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostsResponse {
    pub success: bool,
    pub posts: Vec<PostView>,
    pub pagination: Page,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NearbyPostsResponse {
    pub success: bool,
    pub posts: Vec<PostView>,
    pub pagination: Page,
    pub radius_km: f64,
}

impl PostsResponse {
    fn new(posts: Vec<PostView>, pagination: Page) -> Self {
        Self {
            success: true,
            posts,
            pagination,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/posts",
    tag = "Posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = PostResponse),
        (status = 400, description = "Invalid post", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiJson(request): ApiJson<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let post = post_service::create_post(state.db_pool(), &user, request, Utc::now()).await?;

    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            success: true,
            post,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/posts/{post_id}",
    tag = "Posts",
    params(("post_id" = String, Path, description = "Post public ID")),
    responses(
        (status = 200, description = "Post", body = PostResponse),
        (status = 404, description = "Post not found", body = crate::error::ErrorResponse),
        (status = 410, description = "Post vanished or already viewed", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_post(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiPath(post_id): ApiPath<String>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = post_service::get_post(state.db_pool(), &user, &post_id, Utc::now()).await?;

    Ok(Json(PostResponse {
        success: true,
        post,
    }))
}

#[utoipa::path(
    get,
    path = "/api/posts/feed",
    tag = "Posts",
    params(PageQuery),
    responses(
        (status = 200, description = "Newest visible posts", body = PostsResponse),
        (status = 401, description = "Missing or invalid session", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn feed(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<PostsResponse>, ApiError> {
    let page = query.resolve();
    let posts = post_service::feed(state.db_pool(), user.id, page, Utc::now()).await?;

    Ok(Json(PostsResponse::new(posts, page)))
}

#[utoipa::path(
    get,
    path = "/api/posts/trending",
    tag = "Posts",
    params(PageQuery),
    responses(
        (status = 200, description = "Posts ordered by engagement", body = PostsResponse),
        (status = 401, description = "Missing or invalid session", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn trending(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<PostsResponse>, ApiError> {
    let page = query.resolve();
    let posts = post_service::trending(state.db_pool(), user.id, page, Utc::now()).await?;

    Ok(Json(PostsResponse::new(posts, page)))
}

#[utoipa::path(
    get,
    path = "/api/posts/nearby",
    tag = "Posts",
    params(NearbyQuery),
    responses(
        (status = 200, description = "Posts around a point, nearest first", body = NearbyPostsResponse),
        (status = 400, description = "Invalid coordinates", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn nearby(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiQuery(query): ApiQuery<NearbyQuery>,
) -> Result<Json<NearbyPostsResponse>, ApiError> {
    let feed_config = &state.config().feed;
    let radius_km = query
        .radius_km
        .unwrap_or(feed_config.default_nearby_radius_km)
        .min(feed_config.max_nearby_radius_km);
    let center = GeoPoint {
        latitude: query.lat,
        longitude: query.lng,
    };

    let page = query.page();
    let posts =
        post_service::nearby(state.db_pool(), user.id, center, radius_km, page, Utc::now()).await?;

    Ok(Json(NearbyPostsResponse {
        success: true,
        posts,
        pagination: page,
        radius_km,
    }))
}

#[utoipa::path(
    get,
    path = "/api/users/{anonymous_id}/posts",
    tag = "Posts",
    params(
        ("anonymous_id" = String, Path, description = "Author anonymous ID"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Posts by a user", body = PostsResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn user_posts(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiPath(anonymous_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<PostsResponse>, ApiError> {
    let page = query.resolve();
    let posts =
        post_service::user_posts(state.db_pool(), user.id, &anonymous_id, page, Utc::now()).await?;

    Ok(Json(PostsResponse::new(posts, page)))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{post_id}",
    tag = "Posts",
    params(("post_id" = String, Path, description = "Post public ID")),
    responses(
        (status = 200, description = "Post deleted", body = MessageResponse),
        (status = 403, description = "Not the author", body = crate::error::ErrorResponse),
        (status = 404, description = "Post not found", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    ApiPath(post_id): ApiPath<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    post_service::delete_post(state.db_pool(), &user, &post_id).await?;

    Ok(Json(MessageResponse::new("Post deleted")))
}
