pub mod account_service;
pub mod account_service_impl;
pub use account_service::{
    AccountError, AccountService, ErrorKind, LoginOutcome, PasswordChange, Registration,
};
pub use account_service_impl::SeaOrmAccountService;

pub mod forum_service;
pub mod forum_service_impl;
pub use forum_service::{ForumService, NewForum};
pub use forum_service_impl::SeaOrmForumService;

pub mod audit;
pub use audit::AuditService;

pub mod mailer;
pub use mailer::{Envelope, MailError, MailQueue, Mailer, MemoryMailer};
