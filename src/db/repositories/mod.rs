pub mod audit;
pub mod forum;
pub mod user;
