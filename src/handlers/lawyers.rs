use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::{self, AppError};
use crate::handlers::auth::CurrentUser;
use crate::models::lawyer::slot_config_string;
use crate::models::{LawyerProfile, Specialization};
use crate::state::AppState;

// GET /api/lawyers
#[derive(Deserialize)]
pub struct DirectoryQuery {
    pub specialization: Option<String>,
    pub city: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DirectoryQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let specialization = query.specialization.as_deref().filter(|s| !s.is_empty());
    let city = query.city.as_deref().filter(|s| !s.is_empty());

    let lawyers = {
        let db = state.db.lock().unwrap();
        queries::list_lawyers(&db, specialization, city)?
    };

    Ok(Json(serde_json::json!({
        "count": lawyers.len(),
        "lawyers": lawyers,
    })))
}

// GET /api/lawyers/:lawyer_id
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(lawyer_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (user, profile, reviews) = {
        let db = state.db.lock().unwrap();
        let (user, profile) = queries::get_lawyer_with_profile(&db, &lawyer_id)?
            .ok_or_else(|| AppError::NotFound("Lawyer not found".into()))?;
        let reviews = queries::list_reviews_for_lawyer(&db, &lawyer_id)?;
        (user, profile, reviews)
    };

    Ok(Json(serde_json::json!({
        "lawyer": {
            "id": user.id,
            "username": user.username,
            "name": user.name,
            "email": user.email,
            "bio": profile.bio,
            "specialization": profile.specialization.as_str(),
            "license_number": profile.license_number,
            "experience": profile.experience,
            "city": profile.city,
            "state": profile.state,
            "fees": profile.fees,
            "is_verified": profile.is_verified,
            "available_slots": profile.slot_labels(),
        },
        "reviews": reviews,
    })))
}

// PUT /api/lawyers/profile
#[derive(Deserialize)]
pub struct ProfileUpdateRequest {
    pub bio: Option<String>,
    pub specialization: Option<String>,
    #[serde(alias = "licenseNumber")]
    pub license_number: Option<String>,
    pub experience: Option<i64>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(alias = "availableSlots")]
    pub available_slots: Option<serde_json::Value>,
    pub fees: Option<i64>,
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ProfileUpdateRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !user.is_lawyer() {
        return Err(AppError::Forbidden(
            "Only lawyers can update lawyer profiles".into(),
        ));
    }

    let specialization_raw = body.specialization.as_deref().map(str::trim).unwrap_or("");
    let license_number = body
        .license_number
        .as_deref()
        .map(str::trim)
        .unwrap_or("");
    if specialization_raw.is_empty() || license_number.is_empty() {
        return Err(AppError::BadRequest(
            "Specialization and license number are required".into(),
        ));
    }
    let specialization = Specialization::parse(specialization_raw)
        .ok_or_else(|| AppError::BadRequest("Invalid specialization".into()))?;

    let profile = {
        let db = state.db.lock().unwrap();
        let existing = queries::get_lawyer_profile(&db, &user.id)?;

        // Fields absent from the request keep their stored value.
        // Verification state is never writable from here.
        let merged = LawyerProfile {
            id: existing
                .as_ref()
                .map(|p| p.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            user_id: user.id.clone(),
            bio: body
                .bio
                .clone()
                .or_else(|| existing.as_ref().and_then(|p| p.bio.clone())),
            specialization,
            license_number: license_number.to_string(),
            experience: body
                .experience
                .or_else(|| existing.as_ref().map(|p| p.experience))
                .unwrap_or(0),
            city: body
                .city
                .clone()
                .or_else(|| existing.as_ref().and_then(|p| p.city.clone())),
            state: body
                .state
                .clone()
                .or_else(|| existing.as_ref().and_then(|p| p.state.clone())),
            available_slots: match body.available_slots.as_ref() {
                Some(value) => slot_config_string(Some(value)),
                None => existing
                    .as_ref()
                    .map(|p| p.available_slots.clone())
                    .unwrap_or_default(),
            },
            fees: body
                .fees
                .or_else(|| existing.as_ref().map(|p| p.fees))
                .unwrap_or(0),
            is_verified: existing.as_ref().map(|p| p.is_verified).unwrap_or(false),
            is_active: existing.as_ref().map(|p| p.is_active).unwrap_or(true),
        };

        if let Err(e) = queries::save_lawyer_profile(&db, &merged) {
            if errors::is_unique_violation(&e) && errors::violation_mentions(&e, "license_number")
            {
                return Err(AppError::Conflict(
                    "License number already registered".into(),
                ));
            }
            return Err(e.into());
        }
        merged
    };

    Ok(Json(serde_json::json!({
        "message": "Lawyer profile updated successfully",
        "profile": profile,
    })))
}

// PUT /api/lawyers/:lawyer_id/verify
#[derive(Deserialize)]
pub struct VerifyRequest {
    pub verified: Option<bool>,
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(lawyer_id): Path<String>,
    body: Option<Json<VerifyRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin access required".into()));
    }

    let verified = body.and_then(|Json(b)| b.verified).unwrap_or(true);
    let updated = {
        let db = state.db.lock().unwrap();
        queries::set_lawyer_verified(&db, &lawyer_id, verified)?
    };
    if !updated {
        return Err(AppError::NotFound("Lawyer not found".into()));
    }

    tracing::info!(
        "lawyer {} verification set to {} by {}",
        lawyer_id,
        verified,
        user.username
    );

    let message = if verified {
        "Lawyer verified"
    } else {
        "Lawyer verification revoked"
    };
    Ok(Json(serde_json::json!({ "message": message })))
}
