//! Header-prefix dispatch and stream resynchronization (§4.2).
//!
//! [`TemplateLoader`] answers "which registered type does this buffer
//! start with", preferring the longest matching header key so a more
//! specific prefix always wins over a shorter generic one, and can locate
//! the next candidate message start inside a longer buffer via
//! Knuth-Morris-Pratt, caching each pattern's failure table.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::binding::TypeTag;
use crate::error::TemplateError;

/// Sorts longest-key-first, then lexicographically, so `BTreeMap`
/// iteration order is exactly the dispatch priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DispatchKey(Vec<u8>);

impl Ord for DispatchKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.len().cmp(&self.0.len()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for DispatchKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct TemplateLoader {
    keys: BTreeMap<DispatchKey, TypeTag>,
    kmp_cache: RwLock<HashMap<Vec<u8>, Vec<usize>>>,
}

impl TemplateLoader {
    pub fn new() -> Self {
        TemplateLoader {
            keys: BTreeMap::new(),
            kmp_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Registers one acceptable header start sequence for `tag`. A template
    /// with several `header.start` candidates calls this once per
    /// candidate.
    pub fn register(&mut self, start: Vec<u8>, tag: TypeTag) -> Result<(), TemplateError> {
        let key = DispatchKey(start.clone());
        if self.keys.contains_key(&key) {
            return Err(TemplateError::DuplicateStartKey { key: start });
        }
        self.keys.insert(key, tag);
        Ok(())
    }

    /// Returns the tag of the longest registered start sequence the buffer
    /// begins with.
    pub fn get_by_prefix(&self, buffer: &[u8]) -> Option<TypeTag> {
        self.keys
            .iter()
            .find(|(key, _)| buffer.len() >= key.0.len() && buffer[..key.0.len()] == key.0[..])
            .map(|(_, tag)| tag.clone())
    }

    pub fn get_by_tag(&self, tag: &TypeTag) -> Option<TypeTag> {
        self.keys.values().find(|t| *t == tag).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Searches `buf[from..]` for the start sequence of every registered
    /// template, returning the smallest absolute offset among the matches
    /// (§4.2). Used to resynchronize after a corrupt or unrecognized
    /// message. Caches each start sequence's KMP failure table across calls.
    pub fn find_next_message_index(&self, buf: &[u8], from: usize) -> Option<usize> {
        if from >= buf.len() {
            return None;
        }
        let haystack = &buf[from..];
        self.keys
            .keys()
            .map(|key| key.0.as_slice())
            .filter(|pattern| !pattern.is_empty())
            .filter_map(|pattern| {
                let table = self.failure_table(pattern);
                kmp_search(haystack, pattern, &table)
            })
            .min()
            .map(|offset| offset + from)
    }

    fn failure_table(&self, pattern: &[u8]) -> Vec<usize> {
        if let Some(cached) = self.kmp_cache.read().expect("kmp cache poisoned").get(pattern) {
            return cached.clone();
        }
        let table = build_failure_table(pattern);
        self.kmp_cache
            .write()
            .expect("kmp cache poisoned")
            .insert(pattern.to_vec(), table.clone());
        table
    }
}

impl Default for TemplateLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn build_failure_table(pattern: &[u8]) -> Vec<usize> {
    let mut table = vec![0usize; pattern.len()];
    let mut k = 0;
    for i in 1..pattern.len() {
        while k > 0 && pattern[k] != pattern[i] {
            k = table[k - 1];
        }
        if pattern[k] == pattern[i] {
            k += 1;
        }
        table[i] = k;
    }
    table
}

fn kmp_search(text: &[u8], pattern: &[u8], table: &[usize]) -> Option<usize> {
    let mut k = 0;
    for (i, &b) in text.iter().enumerate() {
        while k > 0 && pattern[k] != b {
            k = table[k - 1];
        }
        if pattern[k] == b {
            k += 1;
        }
        if k == pattern.len() {
            return Some(i + 1 - k);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let mut loader = TemplateLoader::new();
        loader.register(vec![0xAA], TypeTag::new("generic")).unwrap();
        loader.register(vec![0xAA, 0xBB], TypeTag::new("specific")).unwrap();
        let tag = loader.get_by_prefix(&[0xAA, 0xBB, 0xCC]).unwrap();
        assert_eq!(tag, TypeTag::new("specific"));
    }

    #[test]
    fn duplicate_start_is_rejected() {
        let mut loader = TemplateLoader::new();
        loader.register(vec![0x01], TypeTag::new("a")).unwrap();
        let err = loader.register(vec![0x01], TypeTag::new("b")).unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateStartKey { .. }));
    }

    #[test]
    fn finds_resync_point() {
        let mut loader = TemplateLoader::new();
        loader.register(vec![0xDE, 0xAD, 0xBE, 0xEF], TypeTag::new("framed")).unwrap();
        let buffer = [0x00u8, 0x11, 0x22, 0xDE, 0xAD, 0xBE, 0xEF, 0x00];
        let index = loader.find_next_message_index(&buffer, 0).unwrap();
        assert_eq!(index, 3);
    }

    #[test]
    fn resync_search_starts_from_given_offset() {
        let mut loader = TemplateLoader::new();
        loader.register(vec![0xDE, 0xAD], TypeTag::new("framed")).unwrap();
        let buffer = [0xDE, 0xAD, 0x00, 0xDE, 0xAD];
        assert_eq!(loader.find_next_message_index(&buffer, 0), Some(0));
        assert_eq!(loader.find_next_message_index(&buffer, 1), Some(3));
    }

    #[test]
    fn resync_returns_earliest_match_across_registered_templates() {
        let mut loader = TemplateLoader::new();
        loader.register(vec![0xBE, 0xEF], TypeTag::new("b")).unwrap();
        loader.register(vec![0xDE, 0xAD], TypeTag::new("a")).unwrap();
        let buffer = [0x00, 0xBE, 0xEF, 0x00, 0xDE, 0xAD];
        assert_eq!(loader.find_next_message_index(&buffer, 0), Some(1));
    }

    #[test]
    fn kmp_cache_is_reused_across_calls() {
        let mut loader = TemplateLoader::new();
        loader.register(vec![0x01, 0x02, 0x01, 0x03], TypeTag::new("p")).unwrap();
        let a = loader.find_next_message_index(&[0x01, 0x02, 0x01, 0x03], 0);
        let b = loader.find_next_message_index(&[0xff, 0x01, 0x02, 0x01, 0x03], 0);
        assert_eq!(a, Some(0));
        assert_eq!(b, Some(1));
        assert!(loader.kmp_cache.read().unwrap().contains_key(&[0x01u8, 0x02, 0x01, 0x03][..]));
    }
}
