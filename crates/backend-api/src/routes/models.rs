use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 50;

/// `page` is 1-based, `limit` is clamped to 1..=50.
#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl PageQuery {
    pub fn resolve(&self) -> Page {
        Page {
            page: self.page.unwrap_or(1).max(1),
            limit: self
                .limit
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorView {
    pub anonymous_id: String,
    pub display_name: String,
}

// Posts

#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: i64,
    pub public_id: String,
    pub author_id: i64,
    pub author_anonymous_id: String,
    pub author_display_name: String,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
    pub category: Option<String>,
    pub vanish_at: Option<String>,
    pub one_time: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub comments_locked: bool,
    pub reactions_locked: bool,
    pub trending_score: f64,
    pub created_at: String,
    pub likes_count: i64,
    pub liked_by_viewer: bool,
    pub comments_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PostMedia {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl PostMedia {
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.video.is_none() && self.audio.is_none()
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VanishModeView {
    pub enabled: bool,
    pub vanish_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OneTimeView {
    pub enabled: bool,
    /// Content is withheld in listings until the viewer opens the post.
    pub sealed: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InteractionSettings {
    #[serde(default)]
    pub comments_locked: bool,
    #[serde(default)]
    pub reactions_locked: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub author: AuthorView,
    pub content: Option<String>,
    pub media: PostMedia,
    pub category: Option<String>,
    pub vanish_mode: VanishModeView,
    pub one_time: OneTimeView,
    pub location: Option<GeoPoint>,
    pub interactions: InteractionSettings,
    pub likes_count: i64,
    pub is_liked: bool,
    pub comments_count: i64,
    pub reaction_counts: BTreeMap<String, i64>,
    pub my_reactions: Vec<String>,
    pub trending_score: f64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VanishModeRequest {
    #[serde(default)]
    pub enabled: bool,
    /// One of `1hour`, `6hours`, `12hours`, `24hours`, `1day`, `1week`, `custom`.
    pub duration: Option<String>,
    pub custom_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OneTimeRequest {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub content: Option<String>,
    pub media: Option<PostMedia>,
    pub category: Option<String>,
    pub vanish_mode: Option<VanishModeRequest>,
    pub one_time: Option<OneTimeRequest>,
    pub location: Option<GeoPoint>,
    pub interactions: Option<InteractionSettings>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl NearbyQuery {
    pub fn page(&self) -> Page {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
        .resolve()
    }
}

// Comments

#[derive(Debug, Clone, FromRow)]
pub struct CommentRow {
    pub id: i64,
    pub public_id: String,
    pub post_public_id: String,
    pub author_id: i64,
    pub author_anonymous_id: String,
    pub author_display_name: String,
    pub text: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub author: AuthorView,
    pub text: String,
    pub is_mine: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub post_id: String,
    pub text: Option<String>,
}

// Likes and reactions

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleLikeRequest {
    pub post_id: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleReactionRequest {
    pub post_id: String,
    pub reaction_type: String,
}

// Notifications

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub source_user: String,
    pub post_id: Option<String>,
    pub read: bool,
    pub created_at: String,
}

// Users

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub anonymous_id: String,
    pub display_name: String,
    pub created_at: String,
    pub has_device_token: bool,
}

impl From<&whisperwall_auth::User> for UserView {
    fn from(user: &whisperwall_auth::User) -> Self {
        Self {
            anonymous_id: user.anonymous_id.clone(),
            display_name: user.display_name.clone(),
            created_at: user.created_at.clone(),
            has_device_token: user.device_token.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub anonymous_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub anonymous_id: String,
    pub display_name: String,
    pub created_at: String,
    pub posts_count: i64,
    pub echoes_count: i64,
    pub echoing_count: i64,
    pub is_echoing: bool,
    pub is_self: bool,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    pub q: Option<String>,
}

// Chat

#[derive(Debug, Clone, FromRow)]
pub struct ChatMessageRow {
    pub public_id: String,
    pub sender_id: i64,
    pub sender_anonymous_id: String,
    pub recipient_anonymous_id: String,
    pub body: String,
    pub read_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageView {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    pub is_mine: bool,
    pub read_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ConversationRow {
    pub peer_anonymous_id: String,
    pub peer_display_name: String,
    pub last_message_id: String,
    pub last_message_body: String,
    pub last_message_from_me: bool,
    pub last_message_at: String,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub peer: AuthorView,
    pub last_message: LastMessageView,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageView {
    pub id: String,
    pub text: String,
    pub is_mine: bool,
    pub created_at: String,
}

impl From<ConversationRow> for ConversationView {
    fn from(row: ConversationRow) -> Self {
        Self {
            peer: AuthorView {
                anonymous_id: row.peer_anonymous_id,
                display_name: row.peer_display_name,
            },
            last_message: LastMessageView {
                id: row.last_message_id,
                text: row.last_message_body,
                is_mine: row.last_message_from_me,
                created_at: row.last_message_at,
            },
            unread_count: row.unread_count,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub text: Option<String>,
}

// Media

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub url: String,
    pub filename: String,
    pub original_name: String,
    pub mimetype: String,
    pub size: u64,
}
