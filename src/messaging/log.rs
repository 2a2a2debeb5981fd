use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::{Result, StreamError};

const NEXT_SEQ_KEY: &[u8] = b"next_seq";

/// Message as stored in the `messages` partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub seq: u64,
    pub subject: String,
    pub payload: Vec<u8>,
}

/// Message a durable consumer gave up on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub seq: u64,
    pub durable: String,
    pub subject: String,
    pub reason: String,
    pub attempts: u32,
    pub payload: Vec<u8>,
    pub failed_at: DateTime<Utc>,
}

/// Append-only message log with per-durable acknowledgements and dead letters
///
/// Architecture:
/// - `messages` partition: u64 seq (big-endian) → subject + payload
/// - `acks` partition: "{durable}:{seq:020}" → empty
/// - `dlq` partition: "{durable}:{seq:020}" → DeadLetter (JSON)
/// - `metadata` partition: "next_seq" → u64
///
/// Sequence numbers start at 1 and never repeat.
#[derive(Clone)]
pub struct StreamLog {
    keyspace: Keyspace,
    messages: PartitionHandle,
    acks: PartitionHandle,
    dlq: PartitionHandle,
    metadata: PartitionHandle,
    seq_counter: std::sync::Arc<AtomicU64>,
}

impl StreamLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening stream log at: {}", path.display());
        std::fs::create_dir_all(path)?;

        let keyspace = Config::new(path).open()?;
        let messages = keyspace.open_partition("messages", PartitionCreateOptions::default())?;
        let acks = keyspace.open_partition("acks", PartitionCreateOptions::default())?;
        let dlq = keyspace.open_partition("dlq", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let recorded = metadata
            .get(NEXT_SEQ_KEY)?
            .map(|bytes| decode_seq(&bytes))
            .transpose()?
            .unwrap_or(1);
        let after_last = match messages.last_key_value()? {
            Some((key, _)) => decode_seq(&key)? + 1,
            None => 1,
        };
        let next_seq = recorded.max(after_last);

        info!(next_seq, "Stream log opened");

        Ok(Self {
            keyspace,
            messages,
            acks,
            dlq,
            metadata,
            seq_counter: std::sync::Arc::new(AtomicU64::new(next_seq)),
        })
    }

    /// Append a message and return its sequence number
    pub fn append(&self, subject: &str, payload: &[u8]) -> Result<u64> {
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);

        let mut batch = self.keyspace.batch();
        batch.insert(&self.messages, seq.to_be_bytes(), encode_message(subject, payload));
        batch.insert(&self.metadata, NEXT_SEQ_KEY, (seq + 1).to_be_bytes());
        batch.commit()?;

        debug!(seq, subject, size = payload.len(), "Message appended");
        Ok(seq)
    }

    pub fn get(&self, seq: u64) -> Result<Option<StoredMessage>> {
        match self.messages.get(seq.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode_message(seq, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Messages with `seq >= from`, oldest first
    pub fn read_from(&self, from: u64) -> impl Iterator<Item = Result<StoredMessage>> + '_ {
        self.messages.range(from.to_be_bytes()..).map(|item| {
            let (key, value) = item?;
            decode_message(decode_seq(&key)?, &value)
        })
    }

    pub fn is_acked(&self, durable: &str, seq: u64) -> Result<bool> {
        Ok(self.acks.contains_key(consumer_key(durable, seq))?)
    }

    pub fn ack(&self, durable: &str, seq: u64) -> Result<()> {
        self.acks.insert(consumer_key(durable, seq), Vec::<u8>::new())?;
        debug!(durable, seq, "Message acknowledged");
        Ok(())
    }

    /// Record a dead letter and acknowledge the message for this durable, atomically
    pub fn dead_letter(&self, durable: &str, seq: u64, reason: &str, attempts: u32) -> Result<()> {
        let message = self
            .get(seq)?
            .ok_or_else(|| StreamError::Corrupt(format!("dead-lettering unknown seq {seq}")))?;

        let entry = DeadLetter {
            seq,
            durable: durable.to_string(),
            subject: message.subject,
            reason: reason.to_string(),
            attempts,
            payload: message.payload,
            failed_at: Utc::now(),
        };

        let key = consumer_key(durable, seq);
        let mut batch = self.keyspace.batch();
        batch.insert(&self.dlq, key.as_bytes(), serde_json::to_vec(&entry)?);
        batch.insert(&self.acks, key.as_bytes(), Vec::<u8>::new());
        batch.commit()?;

        info!(durable, seq, attempts, reason, "Message moved to DLQ");
        Ok(())
    }

    /// Dead letters of one durable, oldest first
    pub fn dead_letters(&self, durable: &str, limit: usize) -> Result<Vec<DeadLetter>> {
        self.dlq
            .prefix(format!("{durable}:"))
            .take(limit)
            .map(|item| {
                let (_, value) = item?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    pub fn current_seq(&self) -> u64 {
        self.seq_counter.load(Ordering::SeqCst)
    }

    /// Flush all writes to disk
    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Health check - verify database is accessible
    pub fn health_check(&self) -> Result<()> {
        let _ = self.metadata.get(NEXT_SEQ_KEY)?;
        Ok(())
    }
}

fn consumer_key(durable: &str, seq: u64) -> String {
    format!("{durable}:{seq:020}")
}

fn decode_seq(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StreamError::Corrupt(format!("sequence key of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

/// `[subject_len: u32 BE][subject][payload]`
fn encode_message(subject: &str, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + subject.len() + payload.len());
    buf.extend_from_slice(&(subject.len() as u32).to_be_bytes());
    buf.extend_from_slice(subject.as_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn decode_message(seq: u64, bytes: &[u8]) -> Result<StoredMessage> {
    let corrupt = || StreamError::Corrupt(format!("message {seq} is truncated"));

    let len_bytes: [u8; 4] = bytes.get(..4).and_then(|b| b.try_into().ok()).ok_or_else(corrupt)?;
    let subject_len = u32::from_be_bytes(len_bytes) as usize;
    let subject = bytes.get(4..4 + subject_len).ok_or_else(corrupt)?;
    let subject = String::from_utf8(subject.to_vec())
        .map_err(|_| StreamError::Corrupt(format!("message {seq} subject is not UTF-8")))?;

    Ok(StoredMessage {
        seq,
        subject,
        payload: bytes[4 + subject_len..].to_vec(),
    })
}
