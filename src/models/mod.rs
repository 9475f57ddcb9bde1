pub mod appointment;
pub mod chat;
pub mod lawyer;
pub mod review;
pub mod user;

pub use appointment::{Appointment, AppointmentStatus};
pub use chat::{ChatEvent, ChatMessage, ChatRoom, ChatRoomView, ClientEvent, MessageView};
pub use lawyer::{LawyerProfile, Specialization};
pub use review::Review;
pub use user::{Party, Role, User};
