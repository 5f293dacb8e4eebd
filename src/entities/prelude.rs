pub use super::audit_logs::Entity as AuditLogs;
pub use super::forums::Entity as Forums;
pub use super::moderatorships::Entity as Moderatorships;
pub use super::users::Entity as Users;
