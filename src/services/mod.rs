pub mod authz;
pub mod chat;
pub mod rate_limit;
pub mod scheduling;
