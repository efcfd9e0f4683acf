//! Parsers for the host's identity databases (`/etc/passwd`, `/etc/subuid`,
//! `/etc/subgid`) and for generic `KEY=VALUE` text such as a decrypted secret
//! bundle.
//!
//! All three parsers are total: malformed lines are dropped rather than
//! surfaced as errors, because real-world identity databases on a
//! multi-tenant host routinely carry heterogeneous, hand-edited content and
//! a parse failure here must never block allocation. Each parser is exposed
//! both as a lazy iterator adapter (so a caller can `.filter`/`.take` without
//! materializing an intermediate `Vec`) and as an eager convenience wrapper.

use std::collections::HashMap;

/// A contiguous, inclusive sub-identifier range owned by a host user.
///
/// Invariant: `start <= end`. Always true by construction: [`SubidRange`]
/// can only be built via [`SubidRange::from_count`], which derives `end`
/// from a `count >= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubidRange {
    pub owner: String,
    pub start: u64,
    pub end: u64,
}

impl SubidRange {
    /// Build a range from `owner:start:count`, returning `None` if `count`
    /// is zero (an empty range has no valid inclusive representation).
    fn from_count(owner: String, start: u64, count: u64) -> Option<Self> {
        if count == 0 {
            return None;
        }
        Some(Self {
            owner,
            start,
            end: start + count - 1,
        })
    }
}

/// Parse the third colon-delimited field of each line as a UID.
///
/// Lines with the wrong arity, a non-numeric field 3, blank lines, and
/// lines beginning with `#` after left-trimming are silently skipped.
pub fn parse_passwd_uids(text: &str) -> impl Iterator<Item = u32> + '_ {
    text.lines().filter_map(|line| {
        if line.trim_start().starts_with('#') || line.trim().is_empty() {
            return None;
        }
        line.split(':').nth(2)?.parse::<u32>().ok()
    })
}

/// Eager convenience wrapper over [`parse_passwd_uids`].
pub fn parse_passwd_uids_vec(text: &str) -> Vec<u32> {
    parse_passwd_uids(text).collect()
}

/// Parse `owner:start:count` lines (the `/etc/subuid` / `/etc/subgid`
/// format) into inclusive [`SubidRange`]s.
///
/// Malformed arity, non-numeric `start`/`count`, and a zero `count` are all
/// silently skipped.
pub fn parse_subid_ranges(text: &str) -> impl Iterator<Item = SubidRange> + '_ {
    text.lines().filter_map(|line| {
        if line.trim_start().starts_with('#') || line.trim().is_empty() {
            return None;
        }
        let mut fields = line.splitn(3, ':');
        let owner = fields.next()?;
        let start: u64 = fields.next()?.parse().ok()?;
        let count: u64 = fields.next()?.parse().ok()?;
        SubidRange::from_count(owner.to_string(), start, count)
    })
}

/// Eager convenience wrapper over [`parse_subid_ranges`].
pub fn parse_subid_ranges_vec(text: &str) -> Vec<SubidRange> {
    parse_subid_ranges(text).collect()
}

/// Parse `KEY=VALUE` text, one assignment per line.
///
/// Splits each non-comment line at the first `=`; the left side is the key
/// (dropped if empty), the right side is the value verbatim (it may itself
/// contain `=`). A later key overrides an earlier one. Comment lines (`#`
/// after left-trim) and blank lines are skipped.
pub fn parse_key_value(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') || trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), value.to_string());
    }
    map
}

/// Serialize a bundle back to `KEY=VALUE\n`-joined text, in a stable
/// (sorted-by-key) order so repeated encryption of an unchanged bundle is
/// byte-for-byte identical.
pub fn to_key_value_text(bundle: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = bundle.keys().collect();
    keys.sort();
    let mut out = String::new();
    for key in keys {
        out.push_str(key);
        out.push('=');
        out.push_str(&bundle[key]);
        out.push('\n');
    }
    out
}
