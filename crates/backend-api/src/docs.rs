use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::api_health,
        crate::routes::auth::register,
        crate::routes::auth::me,
        crate::routes::auth::update_device_token,
        crate::routes::auth::logout,
        crate::routes::posts::create_post,
        crate::routes::posts::get_post,
        crate::routes::posts::feed,
        crate::routes::posts::trending,
        crate::routes::posts::nearby,
        crate::routes::posts::user_posts,
        crate::routes::posts::delete_post,
        crate::routes::comments::add_comment,
        crate::routes::comments::list_comments,
        crate::routes::comments::delete_comment,
        crate::routes::likes::toggle_like,
        crate::routes::reactions::toggle_reaction,
        crate::routes::notifications::get_unread,
        crate::routes::notifications::get_unread_count,
        crate::routes::notifications::mark_notification_read,
        crate::routes::notifications::mark_all_read,
        crate::routes::users::search_users,
        crate::routes::users::get_profile,
        crate::routes::users::echo_user,
        crate::routes::users::unecho_user,
        crate::routes::chat::list_conversations,
        crate::routes::chat::get_messages,
        crate::routes::chat::send_message,
        crate::routes::chat::mark_read,
        crate::routes::media::upload_media,
        crate::routes::websocket::websocket_handler
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::routes::health::HealthResponse,
            crate::routes::health::BackendStatusResponse,
            crate::routes::auth::SessionResponse,
            crate::routes::auth::CurrentUserResponse,
            crate::routes::auth::DeviceTokenRequest,
            crate::routes::auth::MessageResponse,
            crate::routes::models::Page,
            crate::routes::models::AuthorView,
            crate::routes::models::PostView,
            crate::routes::models::PostMedia,
            crate::routes::models::VanishModeView,
            crate::routes::models::OneTimeView,
            crate::routes::models::GeoPoint,
            crate::routes::models::InteractionSettings,
            crate::routes::models::VanishModeRequest,
            crate::routes::models::OneTimeRequest,
            crate::routes::models::CreatePostRequest,
            crate::routes::models::CommentView,
            crate::routes::models::CreateCommentRequest,
            crate::routes::models::ToggleLikeRequest,
            crate::routes::models::ToggleReactionRequest,
            crate::routes::models::Notification,
            crate::routes::models::UserView,
            crate::routes::models::UserSummary,
            crate::routes::models::UserProfile,
            crate::routes::models::ChatMessageView,
            crate::routes::models::ConversationView,
            crate::routes::models::LastMessageView,
            crate::routes::models::SendMessageRequest,
            crate::routes::models::MediaFile,
            crate::routes::posts::PostResponse,
            crate::routes::posts::PostsResponse,
            crate::routes::posts::NearbyPostsResponse,
            crate::routes::comments::CommentResponse,
            crate::routes::comments::CommentsResponse,
            crate::routes::likes::ToggleLikeResponse,
            crate::routes::reactions::ToggleReactionResponse,
            crate::routes::notifications::NotificationsResponse,
            crate::routes::notifications::UnreadCountResponse,
            crate::routes::notifications::NotificationResponse,
            crate::routes::notifications::MarkAllReadResponse,
            crate::routes::users::UserProfileResponse,
            crate::routes::users::UserSearchResponse,
            crate::routes::users::EchoResponse,
            crate::routes::chat::ConversationsResponse,
            crate::routes::chat::ChatMessagesResponse,
            crate::routes::chat::ChatMessageResponse,
            crate::routes::chat::MarkChatReadResponse,
            crate::routes::media::MediaUploadForm,
            crate::routes::media::MediaUploadResponse
        )
    ),
    tags(
        (name = "Health", description = "Service health endpoints"),
        (name = "Auth", description = "Anonymous registration and sessions"),
        (name = "Posts", description = "Posting, feeds and city radar"),
        (name = "Comments", description = "Post comments"),
        (name = "Likes", description = "Post likes"),
        (name = "Reactions", description = "Emoji reactions"),
        (name = "Notifications", description = "Activity notifications"),
        (name = "Users", description = "Profiles, search and echoes"),
        (name = "Chat", description = "Direct messages"),
        (name = "Media", description = "Media uploads"),
        (name = "Realtime", description = "Live event stream")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        let schemes = &mut components.security_schemes;

        let mut scheme = SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer));
        if let SecurityScheme::Http(http) = &mut scheme {
            http.bearer_format = Some("Bearer".to_string());
        }

        schemes.insert("bearerAuth".to_string(), scheme);
    }
}
