use super::ApiError;
use crate::constants::limits::{MAX_AUDIT_LIMIT, MAX_LATEST_MEMBERS};

fn validate_range(name: &str, value: u64, max: u64) -> Result<u64, ApiError> {
    const MIN_LIMIT: u64 = 1;

    if !(MIN_LIMIT..=max).contains(&value) {
        return Err(ApiError::validation(format!(
            "Invalid {name}: {value}. Must be between {MIN_LIMIT} and {max}"
        )));
    }
    Ok(value)
}

pub fn validate_limit(limit: u64) -> Result<u64, ApiError> {
    validate_range("limit", limit, MAX_LATEST_MEMBERS)
}

pub fn validate_audit_limit(limit: u64) -> Result<u64, ApiError> {
    validate_range("limit", limit, MAX_AUDIT_LIMIT)
}
