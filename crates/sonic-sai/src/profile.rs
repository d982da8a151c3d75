//! Switch profile (`sai.profile`) access.
//!
//! The SDK reads its start-up knobs through a [`ProfileService`]: point
//! lookups with `get_value`, and full enumeration with an explicit
//! `reset`/`next` cursor.

use crate::error::{SaiError, SaiResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::Path;

/// Boot type knob: `0` cold, `1` warm.
pub const KEY_BOOT_TYPE: &str = "SAI_BOOT_TYPE";
/// File the SDK restores its state from on warm boot.
pub const KEY_WARM_BOOT_READ_FILE: &str = "SAI_WARM_BOOT_READ_FILE";
/// File the SDK saves its state to on warm shutdown.
pub const KEY_WARM_BOOT_WRITE_FILE: &str = "SAI_WARM_BOOT_WRITE_FILE";

/// Key/value configuration handed to the SDK at initialization.
pub trait ProfileService: Send + Sync {
    /// Looks up a single value.
    fn get_value(&self, key: &str) -> Option<String>;

    /// Rewinds the enumeration cursor to the first entry.
    fn reset(&self);

    /// Returns the next entry, or `None` once every entry has been returned.
    fn next(&self) -> Option<(String, String)>;
}

/// In-memory profile map, optionally loaded from a `key=value` file.
#[derive(Debug, Default)]
pub struct ProfileMap {
    entries: BTreeMap<String, String>,
    /// Last key handed out by `next`; `None` before the first entry.
    cursor: Mutex<Option<String>>,
}

impl ProfileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a profile from key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            cursor: Mutex::new(None),
        }
    }

    /// Parses profile text: one `key=value` per line, `#` starts a comment.
    pub fn parse(text: &str) -> SaiResult<Self> {
        let mut entries = BTreeMap::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                SaiError::invalid_parameter(format!(
                    "profile line {}: expected key=value, got '{}'",
                    lineno + 1,
                    line
                ))
            })?;
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self {
            entries,
            cursor: Mutex::new(None),
        })
    }

    /// Loads a profile file from disk.
    pub fn load(path: &Path) -> SaiResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SaiError::internal(format!("failed to read profile {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Enumerates every entry of a profile, starting from the beginning.
pub fn collect_entries(profile: &dyn ProfileService) -> BTreeMap<String, String> {
    profile.reset();
    std::iter::from_fn(|| profile.next()).collect()
}

impl ProfileService for ProfileMap {
    fn get_value(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn reset(&self) {
        *self.cursor.lock() = None;
    }

    fn next(&self) -> Option<(String, String)> {
        let mut cursor = self.cursor.lock();
        let (key, value) = match cursor.as_deref() {
            None => self.entries.iter().next(),
            Some(last) => self
                .entries
                .range::<str, _>((Bound::Excluded(last), Bound::Unbounded))
                .next(),
        }?;
        *cursor = Some(key.clone());
        Some((key.clone(), value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_skips_comments() {
        let profile = ProfileMap::parse("# comment\n\nSAI_BOOT_TYPE=0\n  KEY = value \n").unwrap();
        assert_eq!(profile.len(), 2);
        assert_eq!(profile.get_value(KEY_BOOT_TYPE).as_deref(), Some("0"));
        assert_eq!(profile.get_value("KEY").as_deref(), Some("value"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ProfileMap::parse("no separator here").is_err());
    }

    #[test]
    fn test_enumeration_and_reset() {
        let profile = ProfileMap::from_pairs([("a", "1"), ("b", "2")]);

        assert_eq!(profile.next(), Some(("a".to_string(), "1".to_string())));
        assert_eq!(profile.next(), Some(("b".to_string(), "2".to_string())));
        assert_eq!(profile.next(), None);
        assert_eq!(profile.next(), None);

        profile.reset();
        assert_eq!(profile.next(), Some(("a".to_string(), "1".to_string())));
    }

    #[test]
    fn test_enumeration_resumes_after_last_key() {
        let mut profile = ProfileMap::from_pairs([("a", "1"), ("c", "3")]);
        assert_eq!(profile.next(), Some(("a".to_string(), "1".to_string())));

        profile.insert("b", "2");
        assert_eq!(profile.next(), Some(("b".to_string(), "2".to_string())));
        assert_eq!(profile.next(), Some(("c".to_string(), "3".to_string())));
        assert_eq!(profile.next(), None);
    }

    #[test]
    fn test_collect_entries_rewinds() {
        let profile = ProfileMap::from_pairs([("a", "1"), ("b", "2")]);
        profile.next();
        let entries = collect_entries(&profile);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_empty_profile() {
        let profile = ProfileMap::new();
        assert!(profile.is_empty());
        assert_eq!(profile.next(), None);
        assert!(profile.get_value(KEY_BOOT_TYPE).is_none());
    }
}
