//! Serde for commit log storage.
//!
//! # Key Format
//!
//! All keys start with a version byte and record type discriminator:
//!
//! ```text
//! | version (u8) | type (u8) | terminated log name | ... record-specific fields ... |
//! ```
//!
//! | Record | Key fields after the name                                  |
//! |--------|------------------------------------------------------------|
//! | Log    | none                                                       |
//! | Commit | revision (u64 BE), created (u64 BE, sign bit flipped), id  |
//! | Shard  | revision (u64 BE)                                          |
//!
//! The log name uses the terminated encoding from
//! [`common::serde::terminated_bytes`], so every record of one log shares a
//! byte prefix and a prefix scan returns commits ordered by revision, then
//! creation time, then id. Flipping the sign bit of the creation timestamp
//! makes signed values sort correctly as unsigned bytes.
//!
//! # Value Formats
//!
//! ```text
//! Log:    | created (i64) | updated (i64) | latest (u64) | applied set (u8) | applied (u64) |
//! Commit: | placement (u8) | applied (u8) | updated (i64) | data ... |
//! Shard:  | created (i64) | updated (i64) | count (u64) | (len (u32) | commit key)* |
//! ```

use std::ops::{Bound, Range};

use bytes::{BufMut, Bytes, BytesMut};
use common::serde::{read_i64, read_slice, read_u8, read_u32, read_u64, terminated_bytes};
use common::{BytesRange, Record};

use crate::error::{Error, Result};
use crate::model::{
    Commit, CommitId, CommitKey, LogName, LogState, Placement, Revision, RevisionShard, ShardTag,
};

/// Key format version (currently 0x01)
pub const KEY_VERSION: u8 = 0x01;

const SIGN_BIT: u64 = 1 << 63;

const PLACEMENT_DIRECT: u8 = 0x00;
const PLACEMENT_SHARDED: u8 = 0x01;

/// Record type discriminators for commit log storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// Log aggregate holding the revision counter
    Log = 0x01,
    /// Immutable commit record
    Commit = 0x02,
    /// Fallback shard for one (log, revision) pair
    Shard = 0x03,
}

impl RecordType {
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0x01 => Ok(RecordType::Log),
            0x02 => Ok(RecordType::Commit),
            0x03 => Ok(RecordType::Shard),
            _ => Err(Error::Encoding(format!(
                "invalid record type: 0x{:02x}",
                id
            ))),
        }
    }

    /// Key prefix shared by every record of this type for one log.
    pub fn log_prefix(&self, log: &LogName) -> Bytes {
        let mut buf = BytesMut::new();
        self.write_log_prefix(log, &mut buf);
        buf.freeze()
    }

    fn write_log_prefix(&self, log: &LogName, buf: &mut BytesMut) {
        buf.put_u8(KEY_VERSION);
        buf.put_u8(self.id());
        terminated_bytes::serialize(log.as_str().as_bytes(), buf);
    }
}

/// Validates the version and record type, then decodes the log name.
fn read_log_prefix(data: &mut &[u8], expected: RecordType) -> Result<LogName> {
    let version = read_u8(data)?;
    if version != KEY_VERSION {
        return Err(Error::Encoding(format!(
            "invalid key version: expected 0x{:02x}, got 0x{:02x}",
            KEY_VERSION, version
        )));
    }
    let record_type = RecordType::from_id(read_u8(data)?)?;
    if record_type != expected {
        return Err(Error::Encoding(format!(
            "invalid record type: expected {:?}, got {:?}",
            expected, record_type
        )));
    }
    let name = terminated_bytes::deserialize(data)?;
    let name = String::from_utf8(name.to_vec())
        .map_err(|e| Error::Encoding(format!("log name is not valid UTF-8: {}", e)))?;
    Ok(LogName::new(name))
}

fn ensure_consumed(rest: &[u8], what: &str) -> Result<()> {
    if !rest.is_empty() {
        return Err(Error::Encoding(format!(
            "{} trailing bytes after {}",
            rest.len(),
            what
        )));
    }
    Ok(())
}

fn read_bool(buf: &mut &[u8]) -> Result<bool> {
    match read_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::Encoding(format!("invalid flag byte: 0x{:02x}", other))),
    }
}

/// Builds a scan range over `prefix | revision (u64 BE) | ...` keys.
///
/// `revisions.end == Revision::MAX` extends to the end of the prefix.
fn revision_scan_range(prefix: Bytes, revisions: &Range<Revision>) -> BytesRange {
    let mut start = BytesMut::from(prefix.as_ref());
    start.put_u64(revisions.start);
    let end = if revisions.end == Revision::MAX {
        BytesRange::prefix(prefix).into_bounds().1
    } else {
        let mut end = BytesMut::from(prefix.as_ref());
        end.put_u64(revisions.end);
        Bound::Excluded(end.freeze())
    };
    BytesRange::new(Bound::Included(start.freeze()), end)
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

/// Storage key of a log aggregate.
pub fn log_key(log: &LogName) -> Bytes {
    RecordType::Log.log_prefix(log)
}

/// Serializes the value of a log aggregate. The name lives in the key.
pub fn serialize_log_state(state: &LogState) -> Bytes {
    let mut buf = BytesMut::with_capacity(33);
    buf.put_i64(state.created_ms);
    buf.put_i64(state.updated_ms);
    buf.put_u64(state.latest_revision);
    match state.applied_revision {
        Some(revision) => {
            buf.put_u8(1);
            buf.put_u64(revision);
        }
        None => {
            buf.put_u8(0);
            buf.put_u64(0);
        }
    }
    buf.freeze()
}

pub fn deserialize_log_state(name: LogName, data: &[u8]) -> Result<LogState> {
    let mut buf = data;
    let created_ms = read_i64(&mut buf)?;
    let updated_ms = read_i64(&mut buf)?;
    let latest_revision = read_u64(&mut buf)?;
    let applied_set = read_bool(&mut buf)?;
    let applied = read_u64(&mut buf)?;
    ensure_consumed(buf, "log value")?;
    Ok(LogState {
        name,
        created_ms,
        updated_ms,
        latest_revision,
        applied_revision: applied_set.then_some(applied),
    })
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

impl CommitKey {
    /// Serializes the key to bytes for storage.
    ///
    /// ```text
    /// | version | type | terminated log name | revision | created ^ sign | id (16 bytes) |
    /// ```
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        RecordType::Commit.write_log_prefix(&self.log, &mut buf);
        buf.put_u64(self.revision);
        buf.put_u64((self.created_ms as u64) ^ SIGN_BIT);
        buf.put_slice(self.id.as_bytes());
        buf.freeze()
    }

    /// Deserializes a commit key from bytes.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        let log = read_log_prefix(&mut buf, RecordType::Commit)?;
        let revision = read_u64(&mut buf)?;
        let created_ms = (read_u64(&mut buf)? ^ SIGN_BIT) as i64;
        let id: [u8; 16] = read_slice(&mut buf, 16)?
            .try_into()
            .map_err(|_| Error::Encoding("commit id must be 16 bytes".to_string()))?;
        ensure_consumed(buf, "commit key")?;
        Ok(CommitKey {
            log,
            revision,
            created_ms,
            id: CommitId::from_bytes(id),
        })
    }

    /// Creates a storage key range covering commits of `log` whose revision
    /// falls in `revisions` (inclusive start, exclusive end).
    pub fn scan_range(log: &LogName, revisions: &Range<Revision>) -> BytesRange {
        revision_scan_range(RecordType::Commit.log_prefix(log), revisions)
    }
}

/// Encodes a commit into a storage record.
pub fn serialize_commit(commit: &Commit) -> Record {
    let mut value = BytesMut::with_capacity(10 + commit.data.len());
    value.put_u8(match commit.placement {
        Placement::Direct { .. } => PLACEMENT_DIRECT,
        Placement::Sharded { .. } => PLACEMENT_SHARDED,
    });
    value.put_u8(commit.applied as u8);
    value.put_i64(commit.updated_ms);
    value.put_slice(&commit.data);
    Record::new(commit.key.serialize(), value.freeze())
}

/// Decodes a commit from a storage record.
pub fn deserialize_commit(record: &Record) -> Result<Commit> {
    let key = CommitKey::deserialize(&record.key)?;
    let mut buf = record.value.as_ref();
    let placement = match read_u8(&mut buf)? {
        PLACEMENT_DIRECT => Placement::Direct {
            revision: key.revision,
        },
        PLACEMENT_SHARDED => Placement::Sharded {
            tag: ShardTag::new(key.log.clone(), key.revision),
            revision: key.revision,
        },
        other => {
            return Err(Error::Encoding(format!(
                "invalid placement: 0x{:02x}",
                other
            )));
        }
    };
    let applied = read_bool(&mut buf)?;
    let updated_ms = read_i64(&mut buf)?;
    let data = record.value.slice(record.value.len() - buf.len()..);
    Ok(Commit {
        key,
        placement,
        data,
        applied,
        updated_ms,
    })
}

// ---------------------------------------------------------------------------
// Shard
// ---------------------------------------------------------------------------

impl ShardTag {
    /// Serializes the tag as the shard's storage key.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        RecordType::Shard.write_log_prefix(&self.log, &mut buf);
        buf.put_u64(self.revision);
        buf.freeze()
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        let log = read_log_prefix(&mut buf, RecordType::Shard)?;
        let revision = read_u64(&mut buf)?;
        ensure_consumed(buf, "shard key")?;
        Ok(ShardTag { log, revision })
    }

    /// Creates a storage key range covering shards of `log` whose revision
    /// falls in `revisions`.
    pub fn scan_range(log: &LogName, revisions: &Range<Revision>) -> BytesRange {
        revision_scan_range(RecordType::Shard.log_prefix(log), revisions)
    }
}

/// Serializes the value of a shard. The tag lives in the key.
pub fn serialize_shard(shard: &RevisionShard) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_i64(shard.created_ms);
    buf.put_i64(shard.updated_ms);
    buf.put_u64(shard.count);
    for key in &shard.commit_keys {
        let key = key.serialize();
        buf.put_u32(key.len() as u32);
        buf.put_slice(&key);
    }
    buf.freeze()
}

pub fn deserialize_shard(tag: ShardTag, data: &[u8]) -> Result<RevisionShard> {
    let mut buf = data;
    let created_ms = read_i64(&mut buf)?;
    let updated_ms = read_i64(&mut buf)?;
    let count = read_u64(&mut buf)?;
    let mut commit_keys = Vec::new();
    while !buf.is_empty() {
        let len = read_u32(&mut buf)? as usize;
        commit_keys.push(CommitKey::deserialize(read_slice(&mut buf, len)?)?);
    }
    if commit_keys.len() as u64 != count {
        return Err(Error::Encoding(format!(
            "shard {} has count {} but {} commit keys",
            tag,
            count,
            commit_keys.len()
        )));
    }
    Ok(RevisionShard {
        tag,
        count,
        commit_keys,
        created_ms,
        updated_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deserialize_log_key(data: &[u8]) -> Result<LogName> {
        let mut buf = data;
        let name = read_log_prefix(&mut buf, RecordType::Log)?;
        ensure_consumed(buf, "log key")?;
        Ok(name)
    }

    fn commit(log: &str, revision: Revision, created_ms: i64, data: &'static str) -> Commit {
        Commit {
            key: CommitKey::new(LogName::from(log), revision, created_ms, CommitId::generate()),
            placement: Placement::Direct { revision },
            data: Bytes::from(data),
            applied: false,
            updated_ms: created_ms,
        }
    }

    #[test]
    fn should_serialize_commit_key_with_expected_layout() {
        // given
        let key = CommitKey::new(LogName::from("a"), 2, 0, CommitId::from_bytes([7; 16]));

        // when
        let bytes = key.serialize();

        // then
        let mut expected = vec![KEY_VERSION, RecordType::Commit.id(), b'a', 0x00];
        expected.extend_from_slice(&2u64.to_be_bytes());
        expected.extend_from_slice(&SIGN_BIT.to_be_bytes());
        expected.extend_from_slice(&[7; 16]);
        assert_eq!(bytes.as_ref(), expected.as_slice());
        assert_eq!(CommitKey::deserialize(&bytes).unwrap(), key);
    }

    #[test]
    fn should_order_serialized_commit_keys_like_commit_keys() {
        // given
        let log = LogName::from("log");
        let mut keys = vec![
            CommitKey::new(log.clone(), 2, 5, CommitId::from_bytes([0; 16])),
            CommitKey::new(log.clone(), 1, 100, CommitId::from_bytes([0; 16])),
            CommitKey::new(log.clone(), 2, -5, CommitId::from_bytes([0; 16])),
            CommitKey::new(log.clone(), 2, 5, CommitId::from_bytes([1; 16])),
            CommitKey::new(log, 10, 0, CommitId::from_bytes([0; 16])),
        ];

        // when
        let mut by_bytes = keys.clone();
        by_bytes.sort_by_key(|k| k.serialize());
        keys.sort();

        // then
        assert_eq!(by_bytes, keys);
    }

    #[test]
    fn should_keep_logs_with_shared_name_prefix_apart() {
        // given
        let short = CommitKey::scan_range(&LogName::from("log"), &(0..Revision::MAX));
        let other = CommitKey::new(LogName::from("log-2"), 1, 0, CommitId::generate());

        // then
        assert!(!short.contains_key(&other.serialize()));
    }

    #[test]
    fn should_scan_revision_window() {
        // given
        let log = LogName::from("log");
        let range = CommitKey::scan_range(&log, &(2..4));

        // then
        let at = |rev| CommitKey::new(log.clone(), rev, 1, CommitId::generate()).serialize();
        assert!(!range.contains_key(&at(1)));
        assert!(range.contains_key(&at(2)));
        assert!(range.contains_key(&at(3)));
        assert!(!range.contains_key(&at(4)));
    }

    #[test]
    fn should_round_trip_commit_record() {
        // given
        let mut original = commit("log", 3, 1_000, "payload\x00with\x01bytes");
        original.placement = Placement::Sharded {
            tag: ShardTag::new(LogName::from("log"), 3),
            revision: 3,
        };
        original.applied = true;

        // when
        let decoded = deserialize_commit(&serialize_commit(&original)).unwrap();

        // then
        assert_eq!(decoded, original);
    }

    #[test]
    fn should_round_trip_log_state() {
        // given
        let mut state = LogState::new(LogName::from("log"), 42);
        state.latest_revision = 9;
        state.applied_revision = Some(4);

        // when
        let decoded =
            deserialize_log_state(LogName::from("log"), &serialize_log_state(&state)).unwrap();

        // then
        assert_eq!(decoded, state);
        assert_eq!(deserialize_log_key(&log_key(&state.name)).unwrap(), state.name);
    }

    #[test]
    fn should_round_trip_shard_with_members() {
        // given
        let tag = ShardTag::new(LogName::from("log"), 2);
        let mut shard = RevisionShard::new(tag.clone(), 10);
        shard.push(commit("log", 2, 11, "x").key, 11);
        shard.push(commit("log", 2, 12, "y").key, 12);

        // when
        let decoded = deserialize_shard(
            ShardTag::deserialize(&tag.serialize()).unwrap(),
            &serialize_shard(&shard),
        )
        .unwrap();

        // then
        assert_eq!(decoded, shard);
    }

    #[test]
    fn should_reject_wrong_record_type() {
        let key = ShardTag::new(LogName::from("log"), 1).serialize();
        assert!(matches!(
            CommitKey::deserialize(&key),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn should_reject_shard_with_mismatched_count() {
        // given
        let tag = ShardTag::new(LogName::from("log"), 2);
        let mut shard = RevisionShard::new(tag.clone(), 10);
        shard.push(commit("log", 2, 11, "x").key, 11);
        shard.count = 2;

        // then
        assert!(deserialize_shard(tag, &serialize_shard(&shard)).is_err());
    }
}
