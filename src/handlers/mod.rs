pub mod appointments;
pub mod auth;
pub mod chat;
pub mod health;
pub mod lawyers;
pub mod reviews;
pub mod ws;
