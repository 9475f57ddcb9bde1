use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::{self, AppError};
use crate::handlers::auth::CurrentUser;
use crate::models::review::MAX_COMMENT_LEN;
use crate::models::Review;
use crate::services::authz;
use crate::state::AppState;

// POST /api/lawyers/:lawyer_id/reviews
#[derive(Deserialize)]
pub struct ReviewRequest {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(lawyer_id): Path<String>,
    Json(body): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let comment = body.comment.as_deref().map(str::trim).unwrap_or("");
    let rating = match body.rating {
        Some(rating) if !comment.is_empty() => rating,
        _ => {
            return Err(AppError::BadRequest(
                "Rating and comment are required".into(),
            ))
        }
    };

    if user.id == lawyer_id {
        return Err(AppError::BadRequest("You cannot review yourself".into()));
    }
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest(
            "Rating must be between 1 and 5".into(),
        ));
    }
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::BadRequest(format!(
            "Maximum {MAX_COMMENT_LEN} characters are allowed for review!"
        )));
    }

    let review = Review {
        id: Uuid::new_v4().to_string(),
        lawyer_id: lawyer_id.clone(),
        author_id: user.id.clone(),
        rating,
        comment: Some(comment.to_string()),
        created_at: Utc::now().naive_utc(),
    };

    {
        let db = state.db.lock().unwrap();

        let lawyer = queries::get_user(&db, &lawyer_id)?;
        if !lawyer.map(|l| l.is_lawyer()).unwrap_or(false) {
            return Err(AppError::NotFound("Lawyer not found".into()));
        }

        if queries::has_review(&db, &lawyer_id, &user.id)? {
            return Err(AppError::Conflict(
                "You have already reviewed this lawyer".into(),
            ));
        }

        // One review per author per lawyer; the unique index settles races.
        if let Err(e) = queries::create_review(&db, &review) {
            if errors::is_unique_violation(&e) {
                return Err(AppError::Conflict(
                    "You have already reviewed this lawyer".into(),
                ));
            }
            return Err(e.into());
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Review added successfully",
            "review": review,
        })),
    ))
}

// DELETE /api/lawyers/:lawyer_id/reviews/:review_id
pub async fn delete(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((lawyer_id, review_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    {
        let db = state.db.lock().unwrap();

        let review = queries::get_review(&db, &review_id)?
            .ok_or_else(|| AppError::NotFound("Review not found".into()))?;
        if review.lawyer_id != lawyer_id {
            return Err(AppError::NotFound("Review not found".into()));
        }

        if !authz::can_delete_review(&user, &review) {
            return Err(AppError::Forbidden(
                "You are not authorized to delete this review".into(),
            ));
        }

        queries::delete_review(&db, &review_id)?;
    }

    Ok(Json(serde_json::json!({
        "message": "Review deleted successfully"
    })))
}
