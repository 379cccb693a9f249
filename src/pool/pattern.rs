use std::collections::HashSet;

use tracing::warn;

/// Largest pool a single pattern may expand to.
pub const MAX_PATTERN_IDENTIFIERS: u64 = 1_000_000;

/// Expand identifier patterns into a deduplicated pool.
///
/// A pattern may contain inclusive numeric ranges such as `vm-[1-3]`. Ranges
/// nest left to right, so `r[1-2]-s[1-2]` yields `r1-s1, r1-s2, r2-s1, r2-s2`.
/// The result keeps first-seen order across all patterns.
pub fn expand_patterns<S: AsRef<str>>(patterns: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut identifiers = Vec::new();

    for pattern in patterns {
        for identifier in expand_pattern(pattern.as_ref().trim()) {
            if !identifier.is_empty() && seen.insert(identifier.clone()) {
                identifiers.push(identifier);
            }
        }
    }

    identifiers
}

fn expand_pattern(pattern: &str) -> Vec<String> {
    let (Some(start), Some(end)) = (pattern.find('['), pattern.find(']')) else {
        return vec![pattern.to_string()];
    };
    if start > end {
        return vec![pattern.to_string()];
    }

    let prefix = &pattern[..start];
    let range = &pattern[start + 1..end];
    let suffix = &pattern[end + 1..];

    let Some((first, last)) = parse_range(range) else {
        warn!(pattern = %pattern, range = %range, "Invalid range in identifier pattern, keeping it literally");
        return vec![pattern.to_string()];
    };

    let suffixes = expand_pattern(suffix);
    let size = (last - first)
        .checked_add(1)
        .and_then(|n| n.checked_mul(suffixes.len() as u64));
    if size.map_or(true, |n| n > MAX_PATTERN_IDENTIFIERS) {
        warn!(
            pattern = %pattern,
            max = MAX_PATTERN_IDENTIFIERS,
            "Identifier pattern expands to too many identifiers, keeping it literally"
        );
        return vec![pattern.to_string()];
    }

    (first..=last)
        .flat_map(|n| suffixes.iter().map(move |s| format!("{prefix}{n}{s}")))
        .collect()
}

fn parse_range(range: &str) -> Option<(u64, u64)> {
    let (first, last) = range.split_once('-')?;
    let first: u64 = first.trim().parse().ok()?;
    let last: u64 = last.trim().parse().ok()?;
    (first <= last).then_some((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_pattern() {
        assert_eq!(expand_patterns(&["vm-static"]), vec!["vm-static"]);
    }

    #[test]
    fn test_single_range() {
        assert_eq!(expand_patterns(&["vm-[1-3]"]), vec!["vm-1", "vm-2", "vm-3"]);
    }

    #[test]
    fn test_nested_ranges() {
        assert_eq!(
            expand_patterns(&["r[1-2]-s[1-2]"]),
            vec!["r1-s1", "r1-s2", "r2-s1", "r2-s2"]
        );
    }

    #[test]
    fn test_duplicates_collapse_in_first_seen_order() {
        assert_eq!(
            expand_patterns(&["id-[2-3]", "id-[1-2]"]),
            vec!["id-2", "id-3", "id-1"]
        );
    }

    #[test]
    fn test_invalid_ranges_are_literal() {
        assert_eq!(expand_patterns(&["a[3-1]"]), vec!["a[3-1]"]);
        assert_eq!(expand_patterns(&["a[x-2]"]), vec!["a[x-2]"]);
        assert_eq!(expand_patterns(&["a[7]"]), vec!["a[7]"]);
        assert_eq!(expand_patterns(&["a]b[1-2]"]), vec!["a]b[1-2]"]);
    }

    #[test]
    fn test_oversized_ranges_are_literal() {
        assert_eq!(
            expand_patterns(&["vm-[0-99999999999]"]),
            vec!["vm-[0-99999999999]"]
        );
        assert_eq!(
            expand_patterns(&["vm-[0-18446744073709551615]"]),
            vec!["vm-[0-18446744073709551615]"]
        );
        // each range fits, their product does not
        assert_eq!(
            expand_patterns(&["r[1-1001]-s[1-1000]"]),
            vec!["r[1-1001]-s[1-1000]"]
        );
    }

    #[test]
    fn test_empty_patterns_dropped() {
        assert!(expand_patterns(&["", "  "]).is_empty());
    }
}
