mod init;
mod users;

pub use init::cmd_init;
pub use users::{UserAction, cmd_grant_admin, cmd_users_action, cmd_users_list};
