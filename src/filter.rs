//! Approximate membership filters for visited/sent tracking.
//!
//! [`KeyFilter`] is a compact, internally synchronized membership set over
//! canonical dedup keys. Keys are hashed with SHA-256 and stored as short
//! fingerprints in one of two candidate buckets (cuckoo-style); a bucket
//! overflow falls back to an exact set so a key marked present is never
//! forgotten — the at-most-once guarantee tolerates false positives
//! (extra suppression) but never false negatives (re-emission).
//!
//! Optional TTL bucketing folds a coarse time bucket into the hash so keys
//! expire on long-running scans.
//!
//! The Visit filter (guards navigation) and the Sent filter (guards output
//! emission) are independent instances of this type.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use sha2::{Digest, Sha256};

// ============================================================================
// Constants
// ============================================================================

/// Number of buckets (power of two).
const BUCKET_COUNT: usize = 1 << 16;

/// Fingerprint slots per bucket.
const BUCKET_SLOTS: usize = 4;

// ============================================================================
// KeyFilter
// ============================================================================

/// Thread-safe approximate membership set keyed by SHA-256 of a dedup key.
pub struct KeyFilter {
    core: Mutex<FilterCore>,
    ttl: Option<Duration>,
    inserted: AtomicU64,
}

struct FilterCore {
    buckets: Vec<[u16; BUCKET_SLOTS]>,
    /// Exact fallback for keys whose buckets are both full.
    overflow: FxHashSet<[u8; 16]>,
}

impl Default for KeyFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyFilter {
    /// Creates an empty filter without expiry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Mutex::new(FilterCore {
                buckets: vec![[0u16; BUCKET_SLOTS]; BUCKET_COUNT],
                overflow: FxHashSet::default(),
            }),
            ttl: None,
            inserted: AtomicU64::new(0),
        }
    }

    /// Creates a filter whose entries expire after roughly `ttl`.
    ///
    /// Expiry is bucketed: all keys inserted within the same TTL window
    /// expire together when the window rolls over.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::new()
        }
    }

    /// Inserts `key`, returning `true` if it was not already present.
    ///
    /// This is the single check-and-mark primitive: callers must treat a
    /// `false` return as "already seen" and skip the guarded action.
    pub fn insert(&self, key: &str) -> bool {
        let digest = self.digest(key);
        let (fp, i1, i2) = slots_of(&digest);

        let mut core = self.core.lock();
        if core.contains_digest(&digest, fp, i1, i2) {
            return false;
        }
        if !core.try_place(fp, i1) && !core.try_place(fp, i2) {
            // Both buckets full: keep the exact digest so the key can
            // never be forgotten.
            core.overflow.insert(truncate(&digest));
        }
        drop(core);

        self.inserted.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Returns `true` if `key` is (probably) present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let digest = self.digest(key);
        let (fp, i1, i2) = slots_of(&digest);
        self.core.lock().contains_digest(&digest, fp, i1, i2)
    }

    /// Number of successful inserts since creation.
    ///
    /// Used for the max-result cutover; TTL expiry does not decrement it.
    #[inline]
    #[must_use]
    pub fn count(&self) -> u64 {
        self.inserted.load(Ordering::Relaxed)
    }

    /// SHA-256 of the key, salted with the current TTL window if any.
    fn digest(&self, key: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        if let Some(ttl) = self.ttl {
            let bucket = ttl_bucket(ttl);
            hasher.update(bucket.to_le_bytes());
        }
        hasher.finalize().into()
    }
}

impl FilterCore {
    fn contains_digest(&self, digest: &[u8; 32], fp: u16, i1: usize, i2: usize) -> bool {
        self.buckets[i1].contains(&fp)
            || self.buckets[i2].contains(&fp)
            || self.overflow.contains(&truncate(digest))
    }

    fn try_place(&mut self, fp: u16, index: usize) -> bool {
        for slot in &mut self.buckets[index] {
            if *slot == 0 {
                *slot = fp;
                return true;
            }
        }
        false
    }
}

/// Derives (fingerprint, primary index, alternate index) from a digest.
///
/// The fingerprint is never zero (zero marks an empty slot); the alternate
/// index is the primary xor-folded with the fingerprint, as in a cuckoo
/// filter.
fn slots_of(digest: &[u8; 32]) -> (u16, usize, usize) {
    let fp = u16::from_le_bytes([digest[0], digest[1]]).max(1);
    let i1 = usize::from(u16::from_le_bytes([digest[2], digest[3]])) & (BUCKET_COUNT - 1);
    let i2 = (i1 ^ usize::from(fp)) & (BUCKET_COUNT - 1);
    (fp, i1, i2)
}

fn truncate(digest: &[u8; 32]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// Index of the TTL window containing the current instant.
fn ttl_bucket(ttl: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    now.as_secs() / ttl.as_secs().max(1)
}

// ============================================================================
// Tests
// ============================================================================
