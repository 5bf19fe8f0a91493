// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

/// Builds the map key for a suspect key range. The two keys are hex
/// encoded so the delimiter can never collide with key bytes.
pub fn build_key_range_key(start_key: &[u8], end_key: &[u8]) -> String {
    format!("{}-{}", hex(start_key), hex(end_key))
}

fn hex(key: &[u8]) -> String {
    let mut s = String::with_capacity(key.len() * 2);
    for b in key {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Compares two region end keys, where an empty key means unbounded and
/// sorts after everything else.
pub fn cmp_end_key(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => a.cmp(b),
    }
}

/// Whether `key` falls inside `[start_key, end_key)`, empty end meaning
/// unbounded.
pub fn key_in_range(key: &[u8], start_key: &[u8], end_key: &[u8]) -> bool {
    key >= start_key && (end_key.is_empty() || key < end_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_build_key_range_key() {
        assert_eq!(build_key_range_key(b"a", b"b"), "61-62");
        assert_eq!(build_key_range_key(b"", b""), "-");
        // Distinct ranges yield distinct keys.
        assert_ne!(build_key_range_key(b"ab", b"c"), build_key_range_key(b"a", b"bc"));
    }

    #[test]
    fn test_cmp_end_key() {
        assert_eq!(cmp_end_key(b"", b""), Ordering::Equal);
        assert_eq!(cmp_end_key(b"", b"z"), Ordering::Greater);
        assert_eq!(cmp_end_key(b"a", b""), Ordering::Less);
        assert_eq!(cmp_end_key(b"a", b"b"), Ordering::Less);
    }

    #[test]
    fn test_key_in_range() {
        assert!(key_in_range(b"b", b"a", b"c"));
        assert!(key_in_range(b"b", b"b", b""));
        assert!(!key_in_range(b"c", b"a", b"c"));
        assert!(!key_in_range(b"a", b"b", b""));
    }
}
