use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;

pub const RATE_LIMIT_MESSAGE: &str = "Too many requests. Please try again later.";

/// Counts a request against the principal's fixed hourly window and
/// rejects once the ceiling is passed. Windows are swept lazily by the
/// callers that write most often.
pub fn check(conn: &Connection, principal: &str, max_per_hour: i64) -> Result<(), AppError> {
    let count = queries::bump_rate_limit(conn, principal)?;
    if count > max_per_hour {
        tracing::warn!(%principal, count, "rate limit exceeded");
        return Err(AppError::RateLimited(RATE_LIMIT_MESSAGE.to_string()));
    }
    Ok(())
}
