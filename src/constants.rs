pub mod session {

    /// Session key holding the signed-in account id.
    pub const ACCOUNT_KEY: &str = "account_id";
}

pub mod limits {

    pub const DEFAULT_AUDIT_LIMIT: u64 = 100;

    pub const MAX_AUDIT_LIMIT: u64 = 1000;

    pub const MAX_LATEST_MEMBERS: u64 = 50;
}
