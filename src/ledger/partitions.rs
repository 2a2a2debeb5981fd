/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `records`: rec:{id} -> ActivityRecord (JSON)
/// - `by_tenant`: ten:{len}:{tenant}:{inverted_micros:020}:{id} -> id
///
/// The tenant is length-prefixed so that one tenant's prefix can never match
/// another tenant whose id merely starts with it. The timestamp is inverted so
/// a forward prefix scan yields newest records first.
use chrono::{DateTime, Utc};

use crate::record::RecordId;

/// Encode a record key: rec:{id}
pub fn encode_record_key(id: &RecordId) -> Vec<u8> {
    format!("rec:{}", id).into_bytes()
}

/// Decode a record key: rec:{id} -> id
pub fn decode_record_key(key: &[u8]) -> Option<RecordId> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("rec:").map(RecordId::from)
}

/// Encode the scan prefix for one tenant: ten:{len}:{tenant}:
pub fn encode_tenant_prefix(tenant_id: &str) -> Vec<u8> {
    format!("ten:{}:{}:", tenant_id.len(), tenant_id).into_bytes()
}

/// Encode a tenant index key
pub fn encode_tenant_key(tenant_id: &str, created_at: DateTime<Utc>, id: &RecordId) -> Vec<u8> {
    let micros = created_at.timestamp_micros().max(0) as u64;
    let inverted = u64::MAX - micros;
    let mut key = encode_tenant_prefix(tenant_id);
    key.extend_from_slice(format!("{:020}:{}", inverted, id).as_bytes());
    key
}

/// Decode a tenant index key -> (tenant_id, record id)
pub fn decode_tenant_key(key: &[u8]) -> Option<(String, RecordId)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let rest = key_str.strip_prefix("ten:")?;
    let (len, rest) = rest.split_once(':')?;
    let len: usize = len.parse().ok()?;
    let tenant_id = rest.get(..len)?;
    let rest = rest.get(len..)?.strip_prefix(':')?;
    let (_inverted, id) = rest.split_once(':')?;
    if id.is_empty() {
        return None;
    }
    Some((tenant_id.to_string(), RecordId::from(id)))
}
