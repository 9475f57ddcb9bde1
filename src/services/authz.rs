//! Role and ownership checks, kept in one place so the HTTP handlers
//! and the realtime channel agree on who may do what.

use crate::models::{Appointment, ChatRoom, Review, Role, User};

/// What a user may do to a given appointment.
#[derive(Debug, Clone, Copy)]
pub struct AppointmentActions {
    pub update_status: bool,
    pub cancel: bool,
}

pub fn appointment_actions(user: &User, appointment: &Appointment) -> AppointmentActions {
    let owns_as_lawyer = user.role == Role::Lawyer && appointment.lawyer_id == user.id;
    let owns_as_client = user.role == Role::User && appointment.client_id == user.id;

    AppointmentActions {
        // Status moves (approve, reject, complete, cancel via status) are
        // the lawyer's side of the contract; clients go through cancel.
        update_status: user.is_admin() || owns_as_lawyer,
        cancel: user.is_admin() || owns_as_lawyer || owns_as_client,
    }
}

/// How an appointment listing is scoped for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    AsClient,
    AsLawyer,
    All,
}

pub fn list_scope(user: &User) -> ListScope {
    match user.role {
        Role::User => ListScope::AsClient,
        Role::Lawyer => ListScope::AsLawyer,
        Role::Admin => ListScope::All,
    }
}

/// Chat rooms are strictly between their two participants; admins have
/// no side door.
pub fn can_access_room(user: &User, room: &ChatRoom) -> bool {
    room.is_participant(&user.id)
}

pub fn can_chat_about(user: &User, appointment: &Appointment) -> bool {
    appointment.client_id == user.id || appointment.lawyer_id == user.id
}

pub fn can_delete_review(user: &User, review: &Review) -> bool {
    user.is_admin() || review.author_id == user.id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::NaiveDate;

    fn user(id: &str, role: Role) -> User {
        User {
            id: id.to_string(),
            username: format!("u_{id}"),
            name: None,
            email: format!("{id}@example.test"),
            role,
            is_active: true,
        }
    }

    fn appointment(client_id: &str, lawyer_id: &str) -> Appointment {
        let now = NaiveDate::from_ymd_opt(2031, 1, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Appointment {
            id: "a1".to_string(),
            client_id: client_id.to_string(),
            lawyer_id: lawyer_id.to_string(),
            date: NaiveDate::from_ymd_opt(2031, 1, 10).unwrap(),
            time_slot: "10:00 AM".to_string(),
            status: AppointmentStatus::Pending,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owning_lawyer_updates_and_cancels() {
        let actions = appointment_actions(&user("l1", Role::Lawyer), &appointment("c1", "l1"));
        assert!(actions.update_status);
        assert!(actions.cancel);
    }

    #[test]
    fn other_lawyer_gets_nothing() {
        let actions = appointment_actions(&user("l2", Role::Lawyer), &appointment("c1", "l1"));
        assert!(!actions.update_status);
        assert!(!actions.cancel);
    }

    #[test]
    fn owning_client_cancels_but_cannot_update_status() {
        let actions = appointment_actions(&user("c1", Role::User), &appointment("c1", "l1"));
        assert!(!actions.update_status);
        assert!(actions.cancel);
    }

    #[test]
    fn stranger_client_gets_nothing() {
        let actions = appointment_actions(&user("c2", Role::User), &appointment("c1", "l1"));
        assert!(!actions.update_status);
        assert!(!actions.cancel);
    }

    #[test]
    fn admin_may_do_both() {
        let actions = appointment_actions(&user("adm", Role::Admin), &appointment("c1", "l1"));
        assert!(actions.update_status);
        assert!(actions.cancel);
    }

    #[test]
    fn list_scope_follows_role() {
        assert_eq!(list_scope(&user("c1", Role::User)), ListScope::AsClient);
        assert_eq!(list_scope(&user("l1", Role::Lawyer)), ListScope::AsLawyer);
        assert_eq!(list_scope(&user("adm", Role::Admin)), ListScope::All);
    }

    #[test]
    fn review_deletion_is_author_or_admin() {
        let review = Review {
            id: "r1".to_string(),
            lawyer_id: "l1".to_string(),
            author_id: "c1".to_string(),
            rating: 4,
            comment: None,
            created_at: NaiveDate::from_ymd_opt(2031, 1, 10)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        };
        assert!(can_delete_review(&user("c1", Role::User), &review));
        assert!(can_delete_review(&user("adm", Role::Admin), &review));
        assert!(!can_delete_review(&user("c2", Role::User), &review));
        assert!(!can_delete_review(&user("l1", Role::Lawyer), &review));
    }
}
