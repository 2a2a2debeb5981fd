//! Cache key builders
//!
//! Keys are grouped per tenant so that a single glob pattern covers every
//! cached page of one tenant:
//!
//! ```text
//! activity_log:{id}
//! tenant_activity_logs:{tenant}:page:{page}:limit:{limit}
//! activity_log_count:{tenant}
//! ```

use crate::record::RecordId;

const ITEM_PREFIX: &str = "activity_log:";
const LIST_PREFIX: &str = "tenant_activity_logs:";
const COUNT_PREFIX: &str = "activity_log_count:";

pub fn item_key(id: &RecordId) -> String {
    format!("{ITEM_PREFIX}{id}")
}

pub fn list_key(tenant_id: &str, page: u32, limit: u32) -> String {
    format!("{LIST_PREFIX}{tenant_id}:page:{page}:limit:{limit}")
}

pub fn count_key(tenant_id: &str) -> String {
    format!("{COUNT_PREFIX}{tenant_id}")
}

/// Pattern matching every cached page of one tenant
pub fn list_pattern(tenant_id: &str) -> String {
    format!("{LIST_PREFIX}{}:*", escape_glob(tenant_id))
}

/// Backslash-escape glob metacharacters so a tenant id only matches itself
pub fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
