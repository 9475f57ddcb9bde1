use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::models::{
    Appointment, AppointmentStatus, ChatMessage, ChatRoom, ChatRoomView, LawyerProfile,
    MessageView, Party, Review, Role, User,
};

// ── Users ──

pub fn create_user(conn: &Connection, user: &User, password_hash: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, username, name, email, password_hash, role, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id,
            user.username,
            user.name,
            user.email,
            password_hash,
            user.role.as_str(),
            user.is_active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &str) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(
        "SELECT id, username, name, email, role, is_active FROM users WHERE id = ?1",
        params![id],
        parse_user_row,
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Looks a user up by username for credential checks. The stored hash is
/// only ever handed to the login path.
pub fn get_user_with_password(
    conn: &Connection,
    username: &str,
) -> anyhow::Result<Option<(User, String)>> {
    let result = conn.query_row(
        "SELECT id, username, name, email, role, is_active, password_hash
         FROM users WHERE username = ?1",
        params![username],
        |row| {
            let user = parse_user_row(row)?;
            let hash: String = row.get(6)?;
            Ok((user, hash))
        },
    );

    match result {
        Ok(pair) => Ok(Some(pair)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn user_exists(conn: &Connection, username: &str, email: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE username = ?1 OR email = ?2",
        params![username, email],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn find_admin(conn: &Connection) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(
        "SELECT id, username, name, email, role, is_active FROM users WHERE role = 'admin' LIMIT 1",
        [],
        parse_user_row,
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_user_row(row: &rusqlite::Row) -> Result<User, rusqlite::Error> {
    let role_str: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        role: Role::from_str(&role_str),
        is_active: row.get::<_, i32>(5)? != 0,
    })
}

// ── Sessions ──

pub fn create_session(
    conn: &Connection,
    token_hash: &str,
    user_id: &str,
    expires_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    let expires = expires_at.format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![token_hash, user_id, expires],
    )?;
    Ok(())
}

/// Resolves a session token hash to its user, ignoring expired sessions
/// and deactivated accounts.
pub fn get_session_user(conn: &Connection, token_hash: &str) -> anyhow::Result<Option<User>> {
    let now = Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S").to_string();
    let result = conn.query_row(
        "SELECT u.id, u.username, u.name, u.email, u.role, u.is_active
         FROM sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token_hash = ?1 AND s.expires_at > ?2 AND u.is_active = 1",
        params![token_hash, now],
        parse_user_row,
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn delete_session(conn: &Connection, token_hash: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        params![token_hash],
    )?;
    Ok(count > 0)
}

pub fn delete_expired_sessions(conn: &Connection) -> anyhow::Result<usize> {
    let now = Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S").to_string();
    let count = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
    Ok(count)
}

// ── Lawyer profiles ──

pub fn save_lawyer_profile(conn: &Connection, profile: &LawyerProfile) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO lawyer_profiles
           (id, user_id, bio, specialization, license_number, experience, city, state,
            available_slots, fees, is_verified, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(user_id) DO UPDATE SET
           bio = excluded.bio,
           specialization = excluded.specialization,
           license_number = excluded.license_number,
           experience = excluded.experience,
           city = excluded.city,
           state = excluded.state,
           available_slots = excluded.available_slots,
           fees = excluded.fees,
           updated_at = datetime('now')",
        params![
            profile.id,
            profile.user_id,
            profile.bio,
            profile.specialization.as_str(),
            profile.license_number,
            profile.experience,
            profile.city,
            profile.state,
            profile.available_slots,
            profile.fees,
            profile.is_verified as i32,
            profile.is_active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_lawyer_profile(conn: &Connection, user_id: &str) -> anyhow::Result<Option<LawyerProfile>> {
    let result = conn.query_row(
        "SELECT id, user_id, bio, specialization, license_number, experience, city, state,
                available_slots, fees, is_verified, is_active
         FROM lawyer_profiles WHERE user_id = ?1",
        params![user_id],
        parse_profile_row,
    );

    match result {
        Ok(profile) => Ok(Some(profile)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Lawyer account with its profile, regardless of verification state.
pub fn get_lawyer_with_profile(
    conn: &Connection,
    user_id: &str,
) -> anyhow::Result<Option<(User, LawyerProfile)>> {
    let result = conn.query_row(
        "SELECT u.id, u.username, u.name, u.email, u.role, u.is_active,
                p.id, p.user_id, p.bio, p.specialization, p.license_number, p.experience,
                p.city, p.state, p.available_slots, p.fees, p.is_verified, p.is_active
         FROM users u
         JOIN lawyer_profiles p ON p.user_id = u.id
         WHERE u.id = ?1 AND u.role = 'lawyer'",
        params![user_id],
        parse_lawyer_join_row,
    );

    match result {
        Ok(pair) => Ok(Some(pair)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Lawyer a client is allowed to book: active account, verified and
/// active profile.
pub fn get_bookable_lawyer(
    conn: &Connection,
    user_id: &str,
) -> anyhow::Result<Option<(User, LawyerProfile)>> {
    let result = conn.query_row(
        "SELECT u.id, u.username, u.name, u.email, u.role, u.is_active,
                p.id, p.user_id, p.bio, p.specialization, p.license_number, p.experience,
                p.city, p.state, p.available_slots, p.fees, p.is_verified, p.is_active
         FROM users u
         JOIN lawyer_profiles p ON p.user_id = u.id
         WHERE u.id = ?1 AND u.role = 'lawyer' AND u.is_active = 1
           AND p.is_verified = 1 AND p.is_active = 1",
        params![user_id],
        parse_lawyer_join_row,
    );

    match result {
        Ok(pair) => Ok(Some(pair)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LawyerSummary {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub specialization: String,
    pub experience: i64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub fees: i64,
}

pub fn list_lawyers(
    conn: &Connection,
    specialization: Option<&str>,
    city: Option<&str>,
) -> anyhow::Result<Vec<LawyerSummary>> {
    let mut conditions = vec![
        "u.role = 'lawyer'".to_string(),
        "u.is_active = 1".to_string(),
        "p.is_verified = 1".to_string(),
        "p.is_active = 1".to_string(),
    ];
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(spec) = specialization {
        params_vec.push(Box::new(spec.to_string()));
        conditions.push(format!("p.specialization = ?{}", params_vec.len()));
    }
    if let Some(city) = city {
        params_vec.push(Box::new(city.to_string()));
        conditions.push(format!("p.city = ?{}", params_vec.len()));
    }

    let sql = format!(
        "SELECT u.id, u.username, u.name, p.specialization, p.experience, p.city, p.state, p.fees
         FROM users u
         JOIN lawyer_profiles p ON p.user_id = u.id
         WHERE {}
         ORDER BY p.experience DESC, u.username ASC",
        conditions.join(" AND ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        Ok(LawyerSummary {
            id: row.get(0)?,
            username: row.get(1)?,
            name: row.get(2)?,
            specialization: row.get(3)?,
            experience: row.get(4)?,
            city: row.get(5)?,
            state: row.get(6)?,
            fees: row.get(7)?,
        })
    })?;

    let mut lawyers = vec![];
    for row in rows {
        lawyers.push(row?);
    }
    Ok(lawyers)
}

pub fn set_lawyer_verified(
    conn: &Connection,
    user_id: &str,
    verified: bool,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE lawyer_profiles SET is_verified = ?1, updated_at = datetime('now')
         WHERE user_id = ?2",
        params![verified as i32, user_id],
    )?;
    Ok(count > 0)
}

fn parse_profile_row(row: &rusqlite::Row) -> Result<LawyerProfile, rusqlite::Error> {
    parse_profile_row_at(row, 0)
}

fn parse_profile_row_at(row: &rusqlite::Row, base: usize) -> Result<LawyerProfile, rusqlite::Error> {
    let spec_str: String = row.get(base + 3)?;
    Ok(LawyerProfile {
        id: row.get(base)?,
        user_id: row.get(base + 1)?,
        bio: row.get(base + 2)?,
        specialization: crate::models::Specialization::parse(&spec_str)
            .unwrap_or(crate::models::Specialization::Other),
        license_number: row.get(base + 4)?,
        experience: row.get(base + 5)?,
        city: row.get(base + 6)?,
        state: row.get(base + 7)?,
        available_slots: row.get(base + 8)?,
        fees: row.get(base + 9)?,
        is_verified: row.get::<_, i32>(base + 10)? != 0,
        is_active: row.get::<_, i32>(base + 11)? != 0,
    })
}

fn parse_lawyer_join_row(row: &rusqlite::Row) -> Result<(User, LawyerProfile), rusqlite::Error> {
    let user = parse_user_row(row)?;
    let profile = parse_profile_row_at(row, 6)?;
    Ok((user, profile))
}

// ── Appointments ──

pub fn create_appointment(conn: &Connection, appointment: &Appointment) -> anyhow::Result<()> {
    let date = appointment.date.format("%Y-%m-%d").to_string();
    let created_at = appointment.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
    let updated_at = appointment.updated_at.format("%Y-%m-%d %H:%M:%S").to_string();

    conn.execute(
        "INSERT INTO appointments (id, client_id, lawyer_id, date, time_slot, status, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            appointment.id,
            appointment.client_id,
            appointment.lawyer_id,
            date,
            appointment.time_slot,
            appointment.status.as_str(),
            appointment.notes,
            created_at,
            updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let result = conn.query_row(
        "SELECT id, client_id, lawyer_id, date, time_slot, status, notes, created_at, updated_at
         FROM appointments WHERE id = ?1",
        params![id],
        |row| Ok(parse_appointment_row(row)),
    );

    match result {
        Ok(appointment) => Ok(Some(appointment?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// True when the lawyer already has a live appointment in the slot.
pub fn lawyer_slot_taken(
    conn: &Connection,
    lawyer_id: &str,
    date: &NaiveDate,
    time_slot: &str,
) -> anyhow::Result<bool> {
    let date = date.format("%Y-%m-%d").to_string();
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM appointments
         WHERE lawyer_id = ?1 AND date = ?2 AND time_slot = ?3
           AND status IN ('pending', 'approved')",
        params![lawyer_id, date, time_slot],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// True when the client already has a live appointment in the slot,
/// with any lawyer.
pub fn client_slot_taken(
    conn: &Connection,
    client_id: &str,
    date: &NaiveDate,
    time_slot: &str,
) -> anyhow::Result<bool> {
    let date = date.format("%Y-%m-%d").to_string();
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM appointments
         WHERE client_id = ?1 AND date = ?2 AND time_slot = ?3
           AND status IN ('pending', 'approved')",
        params![client_id, date, time_slot],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[derive(Debug, Default)]
pub struct AppointmentFilter {
    pub client_id: Option<String>,
    pub lawyer_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileBrief {
    pub specialization: String,
    pub license_number: String,
    pub experience: i64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub is_verified: bool,
    pub fees: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentView {
    pub id: String,
    pub date: String,
    pub time_slot: String,
    pub status: String,
    pub notes: Option<String>,
    pub client: Party,
    pub lawyer: Party,
    pub lawyer_profile: Option<ProfileBrief>,
    pub created_at: NaiveDateTime,
}

pub fn list_appointments(
    conn: &Connection,
    filter: &AppointmentFilter,
) -> anyhow::Result<Vec<AppointmentView>> {
    let mut conditions: Vec<String> = vec![];
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(client_id) = &filter.client_id {
        params_vec.push(Box::new(client_id.clone()));
        conditions.push(format!("a.client_id = ?{}", params_vec.len()));
    }
    if let Some(lawyer_id) = &filter.lawyer_id {
        params_vec.push(Box::new(lawyer_id.clone()));
        conditions.push(format!("a.lawyer_id = ?{}", params_vec.len()));
    }
    if let Some(status) = &filter.status {
        params_vec.push(Box::new(status.clone()));
        conditions.push(format!("a.status = ?{}", params_vec.len()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT a.id, a.date, a.time_slot, a.status, a.notes, a.created_at,
                c.id, c.username, c.name,
                l.id, l.username, l.name,
                p.specialization, p.license_number, p.experience, p.city, p.state,
                p.is_verified, p.fees
         FROM appointments a
         JOIN users c ON c.id = a.client_id
         JOIN users l ON l.id = a.lawyer_id
         LEFT JOIN lawyer_profiles p ON p.user_id = a.lawyer_id
         {where_clause}
         ORDER BY a.date ASC, a.time_slot ASC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        let created_at_str: String = row.get(5)?;
        let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
            .unwrap_or_else(|_| Utc::now().naive_utc());

        let specialization: Option<String> = row.get(12)?;
        let lawyer_profile = specialization.map(|spec| {
            Ok::<_, rusqlite::Error>(ProfileBrief {
                specialization: spec,
                license_number: row.get(13)?,
                experience: row.get(14)?,
                city: row.get(15)?,
                state: row.get(16)?,
                is_verified: row.get::<_, i32>(17)? != 0,
                fees: row.get(18)?,
            })
        });
        let lawyer_profile = match lawyer_profile {
            Some(Ok(p)) => Some(p),
            Some(Err(e)) => return Err(e),
            None => None,
        };

        Ok(AppointmentView {
            id: row.get(0)?,
            date: row.get(1)?,
            time_slot: row.get(2)?,
            status: row.get(3)?,
            notes: row.get(4)?,
            created_at,
            client: Party {
                id: row.get(6)?,
                username: row.get(7)?,
                name: row.get(8)?,
            },
            lawyer: Party {
                id: row.get(9)?,
                username: row.get(10)?,
                name: row.get(11)?,
            },
            lawyer_profile,
        })
    })?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row?);
    }
    Ok(appointments)
}

/// Newest appointment linking a client and a lawyer, in any status.
pub fn find_appointment_between(
    conn: &Connection,
    client_id: &str,
    lawyer_id: &str,
) -> anyhow::Result<Option<Appointment>> {
    let result = conn.query_row(
        "SELECT id, client_id, lawyer_id, date, time_slot, status, notes, created_at, updated_at
         FROM appointments WHERE client_id = ?1 AND lawyer_id = ?2
         ORDER BY created_at DESC, rowid DESC LIMIT 1",
        params![client_id, lawyer_id],
        |row| Ok(parse_appointment_row(row)),
    );

    match result {
        Ok(appointment) => Ok(Some(appointment?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn set_appointment_status(
    conn: &Connection,
    id: &str,
    status: AppointmentStatus,
) -> anyhow::Result<bool> {
    let now = Utc::now()
        .naive_utc()
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    let count = conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(count > 0)
}

/// Slot labels already occupied for a lawyer on a day.
pub fn booked_slots(
    conn: &Connection,
    lawyer_id: &str,
    date: &NaiveDate,
) -> anyhow::Result<Vec<String>> {
    let date = date.format("%Y-%m-%d").to_string();
    let mut stmt = conn.prepare(
        "SELECT time_slot FROM appointments
         WHERE lawyer_id = ?1 AND date = ?2 AND status IN ('pending', 'approved')",
    )?;

    let rows = stmt.query_map(params![lawyer_id, date], |row| row.get(0))?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<Appointment> {
    let id: String = row.get(0)?;
    let client_id: String = row.get(1)?;
    let lawyer_id: String = row.get(2)?;
    let date_str: String = row.get(3)?;
    let time_slot: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let notes: Option<String> = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .unwrap_or_else(|_| Utc::now().date_naive());
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| Utc::now().naive_utc());

    Ok(Appointment {
        id,
        client_id,
        lawyer_id,
        date,
        time_slot,
        status: AppointmentStatus::from_str(&status_str),
        notes,
        created_at,
        updated_at,
    })
}

// ── Chat rooms ──

pub fn create_chat_room(conn: &Connection, room: &ChatRoom) -> anyhow::Result<()> {
    let created_at = room.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
    let updated_at = room.updated_at.format("%Y-%m-%d %H:%M:%S").to_string();

    conn.execute(
        "INSERT INTO chat_rooms (id, appointment_id, client_id, lawyer_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            room.id,
            room.appointment_id,
            room.client_id,
            room.lawyer_id,
            created_at,
            updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_chat_room(conn: &Connection, id: &str) -> anyhow::Result<Option<ChatRoom>> {
    let result = conn.query_row(
        "SELECT id, appointment_id, client_id, lawyer_id, last_message, last_message_at,
                last_message_sender_id, created_at, updated_at
         FROM chat_rooms WHERE id = ?1",
        params![id],
        |row| Ok(parse_chat_room_row(row)),
    );

    match result {
        Ok(room) => Ok(Some(room?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_room_for_appointment(
    conn: &Connection,
    appointment_id: &str,
) -> anyhow::Result<Option<ChatRoom>> {
    let result = conn.query_row(
        "SELECT id, appointment_id, client_id, lawyer_id, last_message, last_message_at,
                last_message_sender_id, created_at, updated_at
         FROM chat_rooms WHERE appointment_id = ?1",
        params![appointment_id],
        |row| Ok(parse_chat_room_row(row)),
    );

    match result {
        Ok(room) => Ok(Some(room?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_rooms_for_user(conn: &Connection, user_id: &str) -> anyhow::Result<Vec<ChatRoomView>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.appointment_id, r.last_message, r.last_message_at,
                r.last_message_sender_id, r.updated_at,
                a.date, a.status,
                c.id, c.username, c.name,
                l.id, l.username, l.name
         FROM chat_rooms r
         JOIN appointments a ON a.id = r.appointment_id
         JOIN users c ON c.id = r.client_id
         JOIN users l ON l.id = r.lawyer_id
         WHERE r.client_id = ?1 OR r.lawyer_id = ?1
         ORDER BY r.updated_at DESC",
    )?;

    let rows = stmt.query_map(params![user_id], |row| {
        let last_message_at_str: Option<String> = row.get(3)?;
        let updated_at_str: String = row.get(5)?;

        Ok(ChatRoomView {
            id: row.get(0)?,
            appointment_id: row.get(1)?,
            last_message: row.get(2)?,
            last_message_at: last_message_at_str
                .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").ok()),
            last_message_sender_id: row.get(4)?,
            updated_at: NaiveDateTime::parse_from_str(&updated_at_str, "%Y-%m-%d %H:%M:%S")
                .unwrap_or_else(|_| Utc::now().naive_utc()),
            appointment_date: row.get(6)?,
            appointment_status: row.get(7)?,
            participants: vec![
                Party {
                    id: row.get(8)?,
                    username: row.get(9)?,
                    name: row.get(10)?,
                },
                Party {
                    id: row.get(11)?,
                    username: row.get(12)?,
                    name: row.get(13)?,
                },
            ],
        })
    })?;

    let mut rooms = vec![];
    for row in rows {
        rooms.push(row?);
    }
    Ok(rooms)
}

pub fn set_room_preview(
    conn: &Connection,
    room_id: &str,
    content: &str,
    at: &NaiveDateTime,
    sender_id: &str,
) -> anyhow::Result<()> {
    let at = at.format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "UPDATE chat_rooms
         SET last_message = ?1, last_message_at = ?2, last_message_sender_id = ?3,
             updated_at = datetime('now')
         WHERE id = ?4",
        params![content, at, sender_id, room_id],
    )?;
    Ok(())
}

pub fn delete_chat_room(conn: &Connection, room_id: &str) -> anyhow::Result<bool> {
    conn.execute(
        "DELETE FROM messages WHERE chat_room_id = ?1",
        params![room_id],
    )?;
    let count = conn.execute("DELETE FROM chat_rooms WHERE id = ?1", params![room_id])?;
    Ok(count > 0)
}

fn parse_chat_room_row(row: &rusqlite::Row) -> anyhow::Result<ChatRoom> {
    let id: String = row.get(0)?;
    let appointment_id: String = row.get(1)?;
    let client_id: String = row.get(2)?;
    let lawyer_id: String = row.get(3)?;
    let last_message: Option<String> = row.get(4)?;
    let last_message_at_str: Option<String> = row.get(5)?;
    let last_message_sender_id: Option<String> = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    let last_message_at = last_message_at_str
        .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").ok());
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| Utc::now().naive_utc());

    Ok(ChatRoom {
        id,
        appointment_id,
        client_id,
        lawyer_id,
        last_message,
        last_message_at,
        last_message_sender_id,
        created_at,
        updated_at,
    })
}

// ── Messages ──

pub fn create_message(conn: &Connection, message: &ChatMessage) -> anyhow::Result<()> {
    let created_at = message.created_at.format("%Y-%m-%d %H:%M:%S").to_string();

    conn.execute(
        "INSERT INTO messages (id, chat_room_id, sender_id, receiver_id, content, seen, deleted, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            message.id,
            message.chat_room_id,
            message.sender_id,
            message.receiver_id,
            message.content,
            message.seen as i32,
            message.deleted as i32,
            created_at,
        ],
    )?;
    Ok(())
}

pub fn get_message(conn: &Connection, id: &str) -> anyhow::Result<Option<ChatMessage>> {
    let result = conn.query_row(
        "SELECT id, chat_room_id, sender_id, receiver_id, content, seen, deleted, deleted_at, created_at
         FROM messages WHERE id = ?1",
        params![id],
        |row| Ok(parse_message_row(row)),
    );

    match result {
        Ok(message) => Ok(Some(message?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_message_view(conn: &Connection, id: &str) -> anyhow::Result<Option<MessageView>> {
    let result = conn.query_row(
        &format!("{MESSAGE_VIEW_SELECT} WHERE m.id = ?1"),
        params![id],
        parse_message_view_row,
    );

    match result {
        Ok(view) => Ok(Some(view)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_messages(conn: &Connection, room_id: &str) -> anyhow::Result<Vec<MessageView>> {
    let mut stmt = conn.prepare(&format!(
        "{MESSAGE_VIEW_SELECT} WHERE m.chat_room_id = ?1 ORDER BY m.created_at ASC, m.rowid ASC"
    ))?;

    let rows = stmt.query_map(params![room_id], parse_message_view_row)?;

    let mut messages = vec![];
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

const MESSAGE_VIEW_SELECT: &str = "SELECT m.id, m.chat_room_id, m.content, m.seen, m.deleted, m.created_at,
            s.id, s.username, s.name,
            r.id, r.username, r.name
     FROM messages m
     JOIN users s ON s.id = m.sender_id
     JOIN users r ON r.id = m.receiver_id";

fn parse_message_view_row(row: &rusqlite::Row) -> Result<MessageView, rusqlite::Error> {
    let created_at_str: String = row.get(5)?;
    Ok(MessageView {
        id: row.get(0)?,
        chat_room_id: row.get(1)?,
        content: row.get(2)?,
        seen: row.get::<_, i32>(3)? != 0,
        deleted: row.get::<_, i32>(4)? != 0,
        created_at: NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
            .unwrap_or_else(|_| Utc::now().naive_utc()),
        sender: Party {
            id: row.get(6)?,
            username: row.get(7)?,
            name: row.get(8)?,
        },
        receiver: Party {
            id: row.get(9)?,
            username: row.get(10)?,
            name: row.get(11)?,
        },
    })
}

pub fn mark_message_deleted(
    conn: &Connection,
    id: &str,
    at: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let at = at.format("%Y-%m-%d %H:%M:%S").to_string();
    let count = conn.execute(
        "UPDATE messages SET deleted = 1, deleted_at = ?1 WHERE id = ?2 AND deleted = 0",
        params![at, id],
    )?;
    Ok(count > 0)
}

/// Newest message in a room regardless of deletion state. Ties on the
/// second-granularity timestamp fall back to insertion order.
pub fn newest_message(conn: &Connection, room_id: &str) -> anyhow::Result<Option<ChatMessage>> {
    let result = conn.query_row(
        "SELECT id, chat_room_id, sender_id, receiver_id, content, seen, deleted, deleted_at, created_at
         FROM messages WHERE chat_room_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT 1",
        params![room_id],
        |row| Ok(parse_message_row(row)),
    );

    match result {
        Ok(message) => Ok(Some(message?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn newest_visible_message(
    conn: &Connection,
    room_id: &str,
) -> anyhow::Result<Option<ChatMessage>> {
    let result = conn.query_row(
        "SELECT id, chat_room_id, sender_id, receiver_id, content, seen, deleted, deleted_at, created_at
         FROM messages WHERE chat_room_id = ?1 AND deleted = 0
         ORDER BY created_at DESC, rowid DESC LIMIT 1",
        params![room_id],
        |row| Ok(parse_message_row(row)),
    );

    match result {
        Ok(message) => Ok(Some(message?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Marks every unseen message sent to the reader as seen. Returns the
/// number of rows flipped.
pub fn mark_messages_seen(
    conn: &Connection,
    room_id: &str,
    reader_id: &str,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE messages SET seen = 1
         WHERE chat_room_id = ?1 AND sender_id != ?2 AND seen = 0",
        params![room_id, reader_id],
    )?;
    Ok(count)
}

fn parse_message_row(row: &rusqlite::Row) -> anyhow::Result<ChatMessage> {
    let id: String = row.get(0)?;
    let chat_room_id: String = row.get(1)?;
    let sender_id: String = row.get(2)?;
    let receiver_id: String = row.get(3)?;
    let content: String = row.get(4)?;
    let seen: bool = row.get::<_, i32>(5)? != 0;
    let deleted: bool = row.get::<_, i32>(6)? != 0;
    let deleted_at_str: Option<String> = row.get(7)?;
    let created_at_str: String = row.get(8)?;

    let deleted_at = deleted_at_str
        .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").ok());
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| Utc::now().naive_utc());

    Ok(ChatMessage {
        id,
        chat_room_id,
        sender_id,
        receiver_id,
        content,
        seen,
        deleted,
        deleted_at,
        created_at,
    })
}

// ── Reviews ──

pub fn create_review(conn: &Connection, review: &Review) -> anyhow::Result<()> {
    let created_at = review.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO reviews (id, lawyer_id, author_id, rating, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            review.id,
            review.lawyer_id,
            review.author_id,
            review.rating,
            review.comment,
            created_at,
        ],
    )?;
    Ok(())
}

pub fn get_review(conn: &Connection, id: &str) -> anyhow::Result<Option<Review>> {
    let result = conn.query_row(
        "SELECT id, lawyer_id, author_id, rating, comment, created_at FROM reviews WHERE id = ?1",
        params![id],
        |row| {
            let created_at_str: String = row.get(5)?;
            Ok(Review {
                id: row.get(0)?,
                lawyer_id: row.get(1)?,
                author_id: row.get(2)?,
                rating: row.get(3)?,
                comment: row.get(4)?,
                created_at: NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
                    .unwrap_or_else(|_| Utc::now().naive_utc()),
            })
        },
    );

    match result {
        Ok(review) => Ok(Some(review)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn delete_review(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM reviews WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewView {
    pub id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub author: Party,
    pub created_at: String,
}

pub fn list_reviews_for_lawyer(
    conn: &Connection,
    lawyer_id: &str,
) -> anyhow::Result<Vec<ReviewView>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.rating, r.comment, r.created_at, u.id, u.username, u.name
         FROM reviews r
         JOIN users u ON u.id = r.author_id
         WHERE r.lawyer_id = ?1
         ORDER BY r.created_at DESC, r.rowid DESC",
    )?;

    let rows = stmt.query_map(params![lawyer_id], |row| {
        Ok(ReviewView {
            id: row.get(0)?,
            rating: row.get(1)?,
            comment: row.get(2)?,
            created_at: row.get(3)?,
            author: Party {
                id: row.get(4)?,
                username: row.get(5)?,
                name: row.get(6)?,
            },
        })
    })?;

    let mut reviews = vec![];
    for row in rows {
        reviews.push(row?);
    }
    Ok(reviews)
}

pub fn has_review(conn: &Connection, lawyer_id: &str, author_id: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM reviews WHERE lawyer_id = ?1 AND author_id = ?2",
        params![lawyer_id, author_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ── Rate limits ──

pub fn bump_rate_limit(conn: &Connection, principal: &str) -> anyhow::Result<i64> {
    let window = current_hour_window();

    conn.execute(
        "INSERT INTO rate_limits (principal, window_start, request_count)
         VALUES (?1, ?2, 1)
         ON CONFLICT(principal, window_start) DO UPDATE SET request_count = request_count + 1",
        params![principal, window],
    )?;

    let count: i64 = conn.query_row(
        "SELECT request_count FROM rate_limits WHERE principal = ?1 AND window_start = ?2",
        params![principal, window],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn cleanup_rate_windows(conn: &Connection) -> anyhow::Result<()> {
    let cutoff = (Utc::now() - chrono::Duration::hours(2))
        .format("%Y-%m-%d %H:00:00")
        .to_string();
    conn.execute(
        "DELETE FROM rate_limits WHERE window_start < ?1",
        params![cutoff],
    )?;
    Ok(())
}

fn current_hour_window() -> String {
    Utc::now().format("%Y-%m-%d %H:00:00").to_string()
}
