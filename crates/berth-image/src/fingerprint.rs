//! Order-independent fingerprints over trigger sets and maps.
//!
//! Elements are deduplicated and sorted before hashing, and every string is
//! length-prefixed so that `{"ab"}` and `{"a", "b"}` cannot collide. The
//! encoding only depends on the input bytes, so fingerprints are stable across
//! processes and releases.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A stable hash over a set or map, rendered as `sha256:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The fingerprint string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn finish(hasher: Sha256) -> Self {
        Self(format!("sha256:{}", hex::encode(hasher.finalize())))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Fingerprint a set of strings. Order and duplicates do not matter.
pub fn fingerprint_set<I, S>(items: I) -> Fingerprint
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let items: Vec<S> = items.into_iter().collect();
    let sorted: BTreeSet<&str> = items.iter().map(|item| item.as_ref()).collect();

    let mut hasher = Sha256::new();
    hasher.update(b"set\0");
    for item in sorted {
        update_str(&mut hasher, item);
    }
    Fingerprint::finish(hasher)
}

/// Fingerprint a string map. Entry order does not matter; for repeated keys
/// the last value wins.
pub fn fingerprint_map<I, K, V>(entries: I) -> Fingerprint
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let entries: Vec<(K, V)> = entries.into_iter().collect();
    let sorted: BTreeMap<&str, &str> = entries
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(b"map\0");
    for (key, value) in sorted {
        update_str(&mut hasher, key);
        update_str(&mut hasher, value);
    }
    Fingerprint::finish(hasher)
}
