use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;
use whisperwall_auth::timestamp;

use super::error::ServiceResult;

/// Delete every post whose vanish deadline has passed. Likes, reactions,
/// comments and views go with it through the foreign keys.
pub async fn purge_expired(pool: &SqlitePool, now: DateTime<Utc>) -> ServiceResult<u64> {
    let result = sqlx::query("DELETE FROM posts WHERE vanish_at IS NOT NULL AND vanish_at <= ?")
        .bind(timestamp(now))
        .execute(pool)
        .await?;

    let purged = result.rows_affected();
    if purged > 0 {
        info!(purged, "removed vanished posts");
    }

    Ok(purged)
}
