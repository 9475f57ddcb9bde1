use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::{self, AppError};
use crate::models::appointment::{self, Appointment, AppointmentStatus};
use crate::models::User;

#[derive(Debug)]
pub enum BookingError {
    MissingFields,
    SelfBooking,
    LawyerNotFound,
    InvalidDate,
    PastDate,
    LawyerSlotTaken,
    ClientSlotTaken,
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::MissingFields => {
                write!(f, "Please provide lawyerId, date and timeSlot")
            }
            BookingError::SelfBooking => {
                write!(f, "Cannot book an appointment with yourself")
            }
            BookingError::LawyerNotFound => {
                write!(f, "Lawyer not found or not verified")
            }
            BookingError::InvalidDate => {
                write!(f, "Invalid date format")
            }
            BookingError::PastDate => {
                write!(f, "Date must be today or in the future")
            }
            BookingError::LawyerSlotTaken => {
                write!(
                    f,
                    "Selected time slot is already booked for this lawyer on this date please select another time slot"
                )
            }
            BookingError::ClientSlotTaken => {
                write!(f, "You already have an appointment at this time")
            }
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::LawyerNotFound => AppError::NotFound(message),
            BookingError::LawyerSlotTaken | BookingError::ClientSlotTaken => {
                AppError::Conflict(message)
            }
            _ => AppError::BadRequest(message),
        }
    }
}

#[derive(Debug, Default)]
pub struct BookingRequest {
    pub lawyer_id: Option<String>,
    pub date: Option<String>,
    pub time_slot: Option<String>,
    pub notes: Option<String>,
}

/// Validates and stores a booking for `client`. The pre-checks catch the
/// common conflicts up front; the partial unique indexes on live
/// appointments catch whoever loses a concurrent race, which is reported
/// as the same conflict the pre-check would have raised.
pub fn book(
    conn: &Connection,
    client: &User,
    request: &BookingRequest,
) -> Result<Appointment, AppError> {
    let lawyer_id = request.lawyer_id.as_deref().map(str::trim).unwrap_or_default();
    let date_raw = request.date.as_deref().map(str::trim).unwrap_or_default();
    let time_slot = request.time_slot.as_deref().map(str::trim).unwrap_or_default();

    if lawyer_id.is_empty() || date_raw.is_empty() || time_slot.is_empty() {
        return Err(BookingError::MissingFields.into());
    }

    if client.id == lawyer_id {
        return Err(BookingError::SelfBooking.into());
    }

    if queries::get_bookable_lawyer(conn, lawyer_id)?.is_none() {
        return Err(BookingError::LawyerNotFound.into());
    }

    let date = appointment::parse_day(date_raw).ok_or(BookingError::InvalidDate)?;
    if date < Utc::now().date_naive() {
        return Err(BookingError::PastDate.into());
    }

    if queries::lawyer_slot_taken(conn, lawyer_id, &date, time_slot)? {
        return Err(BookingError::LawyerSlotTaken.into());
    }
    if queries::client_slot_taken(conn, &client.id, &date, time_slot)? {
        return Err(BookingError::ClientSlotTaken.into());
    }

    let now = Utc::now().naive_utc();
    let appointment = Appointment {
        id: Uuid::new_v4().to_string(),
        client_id: client.id.clone(),
        lawyer_id: lawyer_id.to_string(),
        date,
        time_slot: time_slot.to_string(),
        status: AppointmentStatus::Pending,
        notes: request.notes.clone(),
        created_at: now,
        updated_at: now,
    };

    match queries::create_appointment(conn, &appointment) {
        Ok(()) => Ok(appointment),
        Err(e) if errors::is_unique_violation(&e) => {
            if errors::violation_mentions(&e, "appointments.client_id") {
                Err(BookingError::ClientSlotTaken.into())
            } else {
                Err(BookingError::LawyerSlotTaken.into())
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Configured slots for a lawyer on a day, minus the ones already held
/// by a live appointment. Unverified lawyers are visible here; booking
/// them still fails.
pub fn free_slots(
    conn: &Connection,
    lawyer_id: &str,
    date_raw: &str,
) -> Result<Vec<String>, AppError> {
    let (_, profile) = queries::get_lawyer_with_profile(conn, lawyer_id)?
        .ok_or_else(|| AppError::NotFound("Lawyer not found".to_string()))?;

    let date = appointment::parse_day(date_raw).ok_or(BookingError::InvalidDate)?;

    let booked = queries::booked_slots(conn, lawyer_id, &date)?;
    let mut slots = profile.slot_labels();
    slots.retain(|slot| !booked.contains(slot));
    Ok(slots)
}
