//! Persistent-cache seam.
//!
//! The blob cache stores serialized shader variants keyed by the 20-byte
//! variant hash. Deimos treats it as best-effort: unavailability and races
//! are misses, never failures, and a version mismatch is a miss too.

use std::collections::HashMap;
use std::sync::RwLock;

/// `get`/`put` interface of the persistent cache. Implementations are
/// externally synchronized; put-after-get races are benign (last put wins).
pub trait BlobCache: Send + Sync {
    fn get(&self, key: &[u8; 20]) -> Option<Vec<u8>>;
    fn put(&self, key: &[u8; 20], value: &[u8]);
}

const BLOB_MAGIC: u32 = 0x444d_5348; // "HSMD"
const BLOB_VERSION: u32 = 3;

/// Frame a (reflection, code) pair as a versioned cache entry:
/// `[magic][version][reflection len][code len][reflection][code]`.
pub fn encode_entry(reflection: &[u8], code: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + reflection.len() + code.len());
    out.extend_from_slice(&BLOB_MAGIC.to_le_bytes());
    out.extend_from_slice(&BLOB_VERSION.to_le_bytes());
    out.extend_from_slice(&(reflection.len() as u32).to_le_bytes());
    out.extend_from_slice(&(code.len() as u32).to_le_bytes());
    out.extend_from_slice(reflection);
    out.extend_from_slice(code);
    out
}

/// Parse a cache entry. Returns `None` (a miss) on any mismatch: wrong
/// magic, other version, or truncated payload.
pub fn decode_entry(bytes: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    if bytes.len() < 16 {
        return None;
    }
    let word = |i: usize| u32::from_le_bytes(bytes[i..i + 4].try_into().unwrap());
    if word(0) != BLOB_MAGIC {
        return None;
    }
    if word(4) != BLOB_VERSION {
        trace!("blob cache entry has version {}, want {}", word(4), BLOB_VERSION);
        return None;
    }
    let reflection_len = word(8) as usize;
    let code_len = word(12) as usize;
    if bytes.len() != 16 + reflection_len + code_len {
        return None;
    }
    let reflection = bytes[16..16 + reflection_len].to_vec();
    let code = bytes[16 + reflection_len..].to_vec();
    Some((reflection, code))
}

/// Process-local blob cache, for tests and as a warm cache in front of a
/// real on-disk implementation.
#[derive(Default)]
pub struct MemoryBlobCache {
    entries: RwLock<HashMap<[u8; 20], Vec<u8>>>,
}

impl MemoryBlobCache {
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobCache for MemoryBlobCache {
    fn get(&self, key: &[u8; 20]) -> Option<Vec<u8>> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn put(&self, key: &[u8; 20], value: &[u8]) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(*key, value.to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_roundtrip() {
        let entry = encode_entry(&[1, 2, 3], &[4, 5, 6, 7]);
        let (reflection, code) = decode_entry(&entry).unwrap();
        assert_eq!(reflection, vec![1, 2, 3]);
        assert_eq!(code, vec![4, 5, 6, 7]);
    }

    #[test]
    fn version_mismatch_is_a_miss() {
        let mut entry = encode_entry(&[], &[1]);
        entry[4] ^= 0xff;
        assert!(decode_entry(&entry).is_none());
    }

    #[test]
    fn truncated_entry_is_a_miss() {
        let entry = encode_entry(&[1, 2, 3], &[4]);
        assert!(decode_entry(&entry[..entry.len() - 1]).is_none());
    }

    #[test]
    fn memory_cache_last_put_wins() {
        let cache = MemoryBlobCache::default();
        let key = [9u8; 20];
        cache.put(&key, &[1]);
        cache.put(&key, &[2]);
        assert_eq!(cache.get(&key), Some(vec![2]));
    }
}
