use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::auth::CurrentUser;
use crate::models::AppointmentStatus;
use crate::services::{authz, rate_limit, scheduling};
use crate::state::AppState;

// POST /api/appointment
#[derive(Deserialize)]
pub struct BookRequest {
    #[serde(alias = "lawyerId")]
    pub lawyer_id: Option<String>,
    pub date: Option<String>,
    #[serde(alias = "timeSlot")]
    pub time_slot: Option<String>,
    pub notes: Option<String>,
}

pub async fn book(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<BookRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let request = scheduling::BookingRequest {
        lawyer_id: body.lawyer_id,
        date: body.date,
        time_slot: body.time_slot,
        notes: body.notes,
    };

    let appointment = {
        let db = state.db.lock().unwrap();
        rate_limit::check(&db, &user.id, state.config.rate_limit_per_hour)?;
        scheduling::book(&db, &user, &request)?
    };

    tracing::info!("appointment {} booked by {}", appointment.id, user.username);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Appointment booked successfully",
            "appointment": appointment,
        })),
    ))
}

// GET /api/appointment
#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(alias = "clientId")]
    pub client_id: Option<String>,
    #[serde(alias = "lawyerId")]
    pub lawyer_id: Option<String>,
    pub status: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    // Clients and lawyers only ever see their own bookings; the query
    // filters are an admin affordance.
    let filter = match authz::list_scope(&user) {
        authz::ListScope::AsClient => queries::AppointmentFilter {
            client_id: Some(user.id.clone()),
            ..Default::default()
        },
        authz::ListScope::AsLawyer => queries::AppointmentFilter {
            lawyer_id: Some(user.id.clone()),
            ..Default::default()
        },
        authz::ListScope::All => queries::AppointmentFilter {
            client_id: query.client_id,
            lawyer_id: query.lawyer_id,
            status: query.status,
        },
    };

    let appointments = {
        let db = state.db.lock().unwrap();
        queries::list_appointments(&db, &filter)?
    };

    Ok(Json(serde_json::json!({
        "count": appointments.len(),
        "appointments": appointments,
    })))
}

// PUT /api/appointment/status
#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    #[serde(alias = "appointmentId")]
    pub appointment_id: Option<String>,
    pub status: Option<String>,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status = body
        .status
        .as_deref()
        .and_then(AppointmentStatus::parse_update)
        .ok_or_else(|| AppError::BadRequest("Invalid status".into()))?;
    let appointment_id = body.appointment_id.as_deref().unwrap_or("");

    let updated = {
        let db = state.db.lock().unwrap();
        let appointment = queries::get_appointment(&db, appointment_id)?
            .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?;

        if !authz::appointment_actions(&user, &appointment).update_status {
            return Err(AppError::Forbidden(
                "You are not authorized to update this appointment".into(),
            ));
        }

        queries::set_appointment_status(&db, &appointment.id, status)?;
        queries::get_appointment(&db, &appointment.id)?
            .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?
    };

    tracing::info!(
        "appointment {} moved to {} by {}",
        updated.id,
        updated.status.as_str(),
        user.username
    );

    Ok(Json(serde_json::json!({
        "message": "Appointment status updated successfully",
        "appointment": updated,
    })))
}

// DELETE /api/appointment/:appointment_id
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(appointment_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cancelled = {
        let db = state.db.lock().unwrap();
        let appointment = queries::get_appointment(&db, &appointment_id)?
            .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?;

        // Ownership is checked before state, so strangers cannot probe
        // whether a booking is already cancelled.
        if !authz::appointment_actions(&user, &appointment).cancel {
            return Err(AppError::Forbidden(
                "You are not authorized to cancel this appointment".into(),
            ));
        }

        if appointment.status == AppointmentStatus::Cancelled {
            return Err(AppError::NotFound(
                "Appointment is already cancelled".into(),
            ));
        }

        queries::set_appointment_status(&db, &appointment.id, AppointmentStatus::Cancelled)?;
        queries::get_appointment(&db, &appointment.id)?
            .ok_or_else(|| AppError::NotFound("Appointment not found".into()))?
    };

    tracing::info!("appointment {} cancelled by {}", cancelled.id, user.username);

    Ok(Json(serde_json::json!({
        "message": "Appointment cancelled successfully",
        "appointment": cancelled,
    })))
}

// GET /api/appointment/slots
#[derive(Deserialize)]
pub struct SlotsQuery {
    #[serde(alias = "lawyerId")]
    pub lawyer_id: Option<String>,
    pub date: Option<String>,
}

pub async fn slots(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let lawyer_id = query.lawyer_id.as_deref().unwrap_or("");
    let date = query.date.as_deref().unwrap_or("");
    if lawyer_id.is_empty() || date.is_empty() {
        return Err(AppError::BadRequest("Missing parameters".into()));
    }

    let slots = {
        let db = state.db.lock().unwrap();
        scheduling::free_slots(&db, lawyer_id, date)?
    };

    Ok(Json(serde_json::json!({ "slots": slots })))
}
