pub mod prelude;

pub mod audit_logs;
pub mod forums;
pub mod moderatorships;
pub mod users;
