use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::info;
use whisperwall_auth::{timestamp, User};

use super::error::{ServiceError, ServiceResult};
use super::reaction::ReactionType;
use super::{new_public_id, normalize_text};
use crate::routes::models::{
    AuthorView, CreatePostRequest, GeoPoint, InteractionSettings, OneTimeView, Page, PostMedia,
    PostRow, PostView, VanishModeRequest, VanishModeView,
};

pub const MAX_CONTENT_LENGTH: usize = 1000;
pub const MAX_CATEGORY_LENGTH: usize = 32;
pub const MAX_MEDIA_URL_LENGTH: usize = 2048;
pub const MAX_CUSTOM_VANISH_MINUTES: i64 = 7 * 24 * 60;
pub const DEFAULT_VANISH_DURATION: &str = "24hours";

const EARTH_RADIUS_KM: f64 = 6371.0;
/// Lower bound on kilometres per degree, so the bounding box always covers the radius.
const KM_PER_DEGREE_FLOOR: f64 = 110.0;

const LIKE_WEIGHT: f64 = 1.0;
const REACTION_WEIGHT: f64 = 1.0;
const COMMENT_WEIGHT: f64 = 2.0;

static PROFANITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)badword|swearword|damn").expect("valid profanity regex"));

/// `?1` is the viewer's user id.
const POST_SELECT: &str = r#"
    SELECT p.id, p.public_id, p.author_id,
           u.anonymous_id AS author_anonymous_id,
           u.display_name AS author_display_name,
           p.content, p.image_url, p.video_url, p.audio_url, p.category,
           p.vanish_at, p.one_time, p.latitude, p.longitude,
           p.comments_locked, p.reactions_locked, p.trending_score, p.created_at,
           (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS likes_count,
           EXISTS (SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.user_id = ?1) AS liked_by_viewer,
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comments_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
"#;

/// `?1` is the viewer, `?2` the current timestamp.
const VISIBLE_TO_VIEWER: &str = r#"
    (p.vanish_at IS NULL OR p.vanish_at > ?2)
    AND (p.one_time = FALSE
         OR p.author_id = ?1
         OR NOT EXISTS (SELECT 1 FROM post_views v WHERE v.post_id = p.id AND v.user_id = ?1))
"#;

/// The columns needed to authorise an interaction with a post.
#[derive(Debug, Clone, FromRow)]
pub struct PostRef {
    pub id: i64,
    pub public_id: String,
    pub author_id: i64,
    pub vanish_at: Option<String>,
    pub comments_locked: bool,
    pub reactions_locked: bool,
}

/// Minutes until a post vanishes, or `None` when vanish mode is off.
pub fn vanish_minutes(request: &VanishModeRequest) -> ServiceResult<Option<i64>> {
    if !request.enabled {
        return Ok(None);
    }

    let minutes = match request.duration.as_deref().unwrap_or(DEFAULT_VANISH_DURATION) {
        "1hour" => 60,
        "6hours" => 6 * 60,
        "12hours" => 12 * 60,
        "24hours" | "1day" => 24 * 60,
        "1week" => MAX_CUSTOM_VANISH_MINUTES,
        "custom" => {
            let minutes = request.custom_minutes.ok_or_else(|| {
                ServiceError::bad_request("customMinutes is required for a custom vanish duration")
            })?;
            if !(1..=MAX_CUSTOM_VANISH_MINUTES).contains(&minutes) {
                return Err(ServiceError::bad_request(format!(
                    "customMinutes must be between 1 and {MAX_CUSTOM_VANISH_MINUTES}"
                )));
            }
            minutes
        }
        other => {
            return Err(ServiceError::bad_request(format!(
                "Invalid vanish duration: {other}"
            )))
        }
    };

    Ok(Some(minutes))
}

pub fn contains_profanity(text: &str) -> bool {
    PROFANITY.is_match(text)
}

fn validate_content(content: Option<&str>) -> ServiceResult<Option<String>> {
    let Some(content) = normalize_text(content) else {
        return Ok(None);
    };

    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(ServiceError::bad_request(format!(
            "Post content cannot exceed {MAX_CONTENT_LENGTH} characters"
        )));
    }

    if contains_profanity(&content) {
        return Err(ServiceError::bad_request(
            "Post content contains inappropriate language",
        ));
    }

    Ok(Some(content))
}

fn validate_media_url(url: Option<&str>, kind: &str) -> ServiceResult<Option<String>> {
    let Some(url) = normalize_text(url) else {
        return Ok(None);
    };

    if url.len() > MAX_MEDIA_URL_LENGTH {
        return Err(ServiceError::bad_request(format!("{kind} URL is too long")));
    }

    let accepted = url.starts_with("http://") || url.starts_with("https://") || url.starts_with('/');
    if !accepted {
        return Err(ServiceError::bad_request(format!("Invalid {kind} URL")));
    }

    Ok(Some(url))
}

pub fn validate_location(point: GeoPoint) -> ServiceResult<()> {
    let latitude_ok = point.latitude.is_finite() && (-90.0..=90.0).contains(&point.latitude);
    let longitude_ok = point.longitude.is_finite() && (-180.0..=180.0).contains(&point.longitude);

    if !latitude_ok || !longitude_ok {
        return Err(ServiceError::bad_request(
            "Latitude must be within -90..90 and longitude within -180..180",
        ));
    }

    Ok(())
}

pub fn is_vanished(vanish_at: Option<&str>, now: DateTime<Utc>) -> bool {
    vanish_at
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|at| at.with_timezone(&Utc) <= now)
        .unwrap_or(false)
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = lat2 - lat1;
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BoundingBox {
    min_lat: f64,
    max_lat: f64,
    min_lng: f64,
    max_lng: f64,
}

impl BoundingBox {
    fn around(center: GeoPoint, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE_FLOOR;
        let min_lat = (center.latitude - lat_delta).max(-90.0);
        let max_lat = (center.latitude + lat_delta).min(90.0);

        let widest = min_lat.abs().max(max_lat.abs()).to_radians().cos();
        let full = Self {
            min_lat,
            max_lat,
            min_lng: -180.0,
            max_lng: 180.0,
        };

        if widest < 0.01 {
            return full;
        }

        let lng_delta = radius_km / (KM_PER_DEGREE_FLOOR * widest);
        let min_lng = center.longitude - lng_delta;
        let max_lng = center.longitude + lng_delta;

        // Boxes that wrap the antimeridian fall back to the full longitude range.
        if min_lng < -180.0 || max_lng > 180.0 {
            return full;
        }

        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }
}

pub async fn create_post(
    pool: &SqlitePool,
    author: &User,
    request: CreatePostRequest,
    now: DateTime<Utc>,
) -> ServiceResult<PostView> {
    let content = validate_content(request.content.as_deref())?;

    let media = request.media.unwrap_or_default();
    let media = PostMedia {
        image: validate_media_url(media.image.as_deref(), "image")?,
        video: validate_media_url(media.video.as_deref(), "video")?,
        audio: validate_media_url(media.audio.as_deref(), "audio")?,
    };

    if content.is_none() && media.is_empty() {
        return Err(ServiceError::bad_request(
            "Post must have text content or media",
        ));
    }

    let category = normalize_text(request.category.as_deref());
    if category
        .as_ref()
        .is_some_and(|value| value.chars().count() > MAX_CATEGORY_LENGTH)
    {
        return Err(ServiceError::bad_request(format!(
            "Category cannot exceed {MAX_CATEGORY_LENGTH} characters"
        )));
    }

    let vanish_at = match request.vanish_mode.as_ref() {
        Some(vanish) => vanish_minutes(vanish)?.map(|minutes| timestamp(now + Duration::minutes(minutes))),
        None => None,
    };

    if let Some(location) = request.location {
        validate_location(location)?;
    }

    let one_time = request.one_time.map(|one_time| one_time.enabled).unwrap_or(false);
    let interactions = request.interactions.unwrap_or_default();
    let public_id = new_public_id();
    let created_at = timestamp(now);

    sqlx::query(
        r#"
        INSERT INTO posts (
            public_id, author_id, content, image_url, video_url, audio_url, category,
            vanish_at, one_time, latitude, longitude, comments_locked, reactions_locked,
            trending_score, trending_calculated_at, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(author.id)
    .bind(&content)
    .bind(&media.image)
    .bind(&media.video)
    .bind(&media.audio)
    .bind(&category)
    .bind(&vanish_at)
    .bind(one_time)
    .bind(request.location.map(|location| location.latitude))
    .bind(request.location.map(|location| location.longitude))
    .bind(interactions.comments_locked)
    .bind(interactions.reactions_locked)
    .bind(&created_at)
    .bind(&created_at)
    .execute(pool)
    .await?;

    info!(post = %public_id, author = %author.anonymous_id, one_time, vanish = vanish_at.is_some(), "post created");

    let row = fetch_row(pool, author.id, &public_id)
        .await?
        .ok_or_else(|| ServiceError::internal("Failed to load created post"))?;

    single_view(pool, author.id, row).await
}

/// Fetch one post for a viewer. Opening someone else's one-time post consumes it.
pub async fn get_post(
    pool: &SqlitePool,
    viewer: &User,
    public_id: &str,
    now: DateTime<Utc>,
) -> ServiceResult<PostView> {
    let row = fetch_row(pool, viewer.id, public_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Post not found"))?;

    if is_vanished(row.vanish_at.as_deref(), now) {
        return Err(ServiceError::gone("This post has vanished"));
    }

    if row.one_time && row.author_id != viewer.id {
        let recorded = sqlx::query(
            "INSERT OR IGNORE INTO post_views (post_id, user_id, viewed_at) VALUES (?, ?, ?)",
        )
        .bind(row.id)
        .bind(viewer.id)
        .bind(timestamp(now))
        .execute(pool)
        .await?
        .rows_affected();

        if recorded == 0 {
            return Err(ServiceError::gone(
                "This one-time post has already been viewed",
            ));
        }
    }

    single_view(pool, viewer.id, row).await
}

pub async fn feed(
    pool: &SqlitePool,
    viewer_id: i64,
    page: Page,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<PostView>> {
    let sql = format!(
        "{POST_SELECT} WHERE {VISIBLE_TO_VIEWER} ORDER BY p.created_at DESC, p.id DESC LIMIT ?3 OFFSET ?4"
    );

    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(viewer_id)
        .bind(timestamp(now))
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    hydrate(pool, viewer_id, rows, false).await
}

pub async fn trending(
    pool: &SqlitePool,
    viewer_id: i64,
    page: Page,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<PostView>> {
    let sql = format!(
        "{POST_SELECT} WHERE {VISIBLE_TO_VIEWER} ORDER BY p.trending_score DESC, p.created_at DESC, p.id DESC LIMIT ?3 OFFSET ?4"
    );

    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(viewer_id)
        .bind(timestamp(now))
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    hydrate(pool, viewer_id, rows, false).await
}

pub async fn user_posts(
    pool: &SqlitePool,
    viewer_id: i64,
    anonymous_id: &str,
    page: Page,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<PostView>> {
    let author = super::user::find_user(pool, anonymous_id).await?;

    let sql = format!(
        "{POST_SELECT} WHERE p.author_id = ?3 AND {VISIBLE_TO_VIEWER} ORDER BY p.created_at DESC, p.id DESC LIMIT ?4 OFFSET ?5"
    );

    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(viewer_id)
        .bind(timestamp(now))
        .bind(author.id)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    hydrate(pool, viewer_id, rows, false).await
}

/// Posts within `radius_km` of `center`, nearest first.
pub async fn nearby(
    pool: &SqlitePool,
    viewer_id: i64,
    center: GeoPoint,
    radius_km: f64,
    page: Page,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<PostView>> {
    validate_location(center)?;
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(ServiceError::bad_request("radiusKm must be a positive number"));
    }

    let bounds = BoundingBox::around(center, radius_km);
    let sql = format!(
        r#"{POST_SELECT}
        WHERE {VISIBLE_TO_VIEWER}
          AND p.latitude IS NOT NULL AND p.longitude IS NOT NULL
          AND p.latitude BETWEEN ?3 AND ?4
          AND p.longitude BETWEEN ?5 AND ?6"#
    );

    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(viewer_id)
        .bind(timestamp(now))
        .bind(bounds.min_lat)
        .bind(bounds.max_lat)
        .bind(bounds.min_lng)
        .bind(bounds.max_lng)
        .fetch_all(pool)
        .await?;

    let mut located: Vec<(PostRow, f64)> = rows
        .into_iter()
        .filter_map(|row| {
            let point = GeoPoint {
                latitude: row.latitude?,
                longitude: row.longitude?,
            };
            let distance = haversine_km(center, point);
            (distance <= radius_km).then_some((row, distance))
        })
        .collect();

    located.sort_by(|(a, a_distance), (b, b_distance)| {
        a_distance
            .total_cmp(b_distance)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });

    let (rows, distances): (Vec<PostRow>, Vec<f64>) = located
        .into_iter()
        .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
        .take(usize::try_from(page.limit).unwrap_or(0))
        .unzip();

    let mut views = hydrate(pool, viewer_id, rows, false).await?;
    for (view, distance) in views.iter_mut().zip(distances) {
        view.distance_km = Some((distance * 100.0).round() / 100.0);
    }

    Ok(views)
}

pub async fn delete_post(pool: &SqlitePool, user: &User, public_id: &str) -> ServiceResult<()> {
    let post = find_post_ref(pool, public_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Post not found"))?;

    if post.author_id != user.id {
        return Err(ServiceError::forbidden("You can only delete your own posts"));
    }

    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(post.id)
        .execute(pool)
        .await?;

    info!(post = %public_id, "post deleted");
    Ok(())
}

pub async fn find_post_ref(pool: &SqlitePool, public_id: &str) -> ServiceResult<Option<PostRef>> {
    let post = sqlx::query_as::<_, PostRef>(
        r#"
        SELECT id, public_id, author_id, vanish_at, comments_locked, reactions_locked
        FROM posts
        WHERE public_id = ?
        "#,
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await?;

    Ok(post)
}

/// A post the viewer can still comment on, like or react to. Vanished posts and
/// one-time posts the viewer already opened are reported as missing.
pub async fn load_active_post(
    pool: &SqlitePool,
    viewer_id: i64,
    public_id: &str,
    now: DateTime<Utc>,
) -> ServiceResult<PostRef> {
    let sql = format!(
        r#"
        SELECT p.id, p.public_id, p.author_id, p.vanish_at, p.comments_locked, p.reactions_locked
        FROM posts p
        WHERE p.public_id = ?3 AND {VISIBLE_TO_VIEWER}
        "#
    );

    sqlx::query_as::<_, PostRef>(&sql)
        .bind(viewer_id)
        .bind(timestamp(now))
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Post not found"))
}

/// Recompute the trending score from the current likes, reactions and comments.
pub async fn refresh_trending_score(
    conn: &mut SqliteConnection,
    post_id: i64,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE posts
        SET trending_score =
                ?2 * (SELECT COUNT(*) FROM post_likes WHERE post_id = ?1)
              + ?3 * (SELECT COUNT(*) FROM post_reactions WHERE post_id = ?1)
              + ?4 * (SELECT COUNT(*) FROM comments WHERE post_id = ?1),
            trending_calculated_at = ?5
        WHERE id = ?1
        "#,
    )
    .bind(post_id)
    .bind(LIKE_WEIGHT)
    .bind(REACTION_WEIGHT)
    .bind(COMMENT_WEIGHT)
    .bind(timestamp(now))
    .execute(conn)
    .await?;

    Ok(())
}

async fn fetch_row(
    pool: &SqlitePool,
    viewer_id: i64,
    public_id: &str,
) -> ServiceResult<Option<PostRow>> {
    let sql = format!("{POST_SELECT} WHERE p.public_id = ?2");

    let row = sqlx::query_as::<_, PostRow>(&sql)
        .bind(viewer_id)
        .bind(public_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

async fn single_view(pool: &SqlitePool, viewer_id: i64, row: PostRow) -> ServiceResult<PostView> {
    hydrate(pool, viewer_id, vec![row], true)
        .await?
        .pop()
        .ok_or_else(|| ServiceError::internal("Failed to build post view"))
}

#[derive(Default)]
struct ReactionTally {
    counts: BTreeMap<String, i64>,
    mine: Vec<String>,
}

/// Attach reaction tallies and turn rows into views. Unless `reveal` is set,
/// other users' one-time posts are sealed.
async fn hydrate(
    pool: &SqlitePool,
    viewer_id: i64,
    rows: Vec<PostRow>,
    reveal: bool,
) -> ServiceResult<Vec<PostView>> {
    let mut tallies: HashMap<i64, ReactionTally> = HashMap::new();

    if !rows.is_empty() {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT post_id, reaction_type, COUNT(*) AS total, MAX(user_id = ",
        );
        builder.push_bind(viewer_id);
        builder.push(") AS mine FROM post_reactions WHERE post_id IN (");
        let mut ids = builder.separated(", ");
        for row in &rows {
            ids.push_bind(row.id);
        }
        ids.push_unseparated(") GROUP BY post_id, reaction_type");

        let grouped: Vec<(i64, String, i64, i64)> =
            builder.build_query_as().fetch_all(pool).await?;

        for (post_id, reaction_type, total, mine) in grouped {
            let tally = tallies.entry(post_id).or_default();
            if mine != 0 {
                tally.mine.push(reaction_type.clone());
            }
            tally.counts.insert(reaction_type, total);
        }
    }

    let views = rows
        .into_iter()
        .map(|row| {
            let tally = tallies.remove(&row.id).unwrap_or_default();
            to_view(row, tally, viewer_id, reveal)
        })
        .collect();

    Ok(views)
}

fn to_view(row: PostRow, tally: ReactionTally, viewer_id: i64, reveal: bool) -> PostView {
    let sealed = row.one_time && row.author_id != viewer_id && !reveal;

    let mut reaction_counts: BTreeMap<String, i64> = ReactionType::ALL
        .iter()
        .map(|kind| (kind.as_str().to_string(), 0))
        .collect();
    reaction_counts.extend(tally.counts);

    let location = match (row.latitude, row.longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint {
            latitude,
            longitude,
        }),
        _ => None,
    };

    let media = if sealed {
        PostMedia::default()
    } else {
        PostMedia {
            image: row.image_url,
            video: row.video_url,
            audio: row.audio_url,
        }
    };

    PostView {
        id: row.public_id,
        author: AuthorView {
            anonymous_id: row.author_anonymous_id,
            display_name: row.author_display_name,
        },
        content: if sealed { None } else { row.content },
        media,
        category: row.category,
        vanish_mode: VanishModeView {
            enabled: row.vanish_at.is_some(),
            vanish_at: row.vanish_at,
        },
        one_time: OneTimeView {
            enabled: row.one_time,
            sealed,
        },
        location,
        interactions: InteractionSettings {
            comments_locked: row.comments_locked,
            reactions_locked: row.reactions_locked,
        },
        likes_count: row.likes_count,
        is_liked: row.liked_by_viewer,
        comments_count: row.comments_count,
        reaction_counts,
        my_reactions: tally.mine,
        trending_score: row.trending_score,
        created_at: row.created_at,
        distance_km: None,
    }
}
