//! Path-segment helpers used by dependency auto-detection (§4.2.1, §4.2.3)

/// Split a path-like attribute into segments for "child-of" prefix
/// comparison (§4.2.1).
///
/// - if the string is a *bare* two-part CIDR (`address/prefix`, the prefix
///   being all-digit) the whole string is treated as one atomic segment;
///   this only fires on exactly two `/`-parts, so a nested path like
///   `Default/10.0.0.0/8` still splits on `/` below;
/// - else split on `/`, dropping empty segments;
/// - else split on `.` if present;
/// - else the whole string is one segment.
pub fn split_segments(s: &str) -> Vec<String> {
    if s.contains('/') {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() == 2 && !parts[1].is_empty() && parts[1].chars().all(|c| c.is_ascii_digit()) {
            return vec![s.to_string()];
        }
        return s.split('/').filter(|seg| !seg.is_empty()).map(str::to_string).collect();
    }
    if s.contains('.') {
        return s.split('.').map(str::to_string).collect();
    }
    vec![s.to_string()]
}

/// `true` iff `parent_path`'s segments are a strict prefix of `child_path`'s
/// segments (§4.2.1 "Child-of predicate").
pub fn is_child_of(parent_path: &str, child_path: &str) -> bool {
    let parent_segs = split_segments(parent_path);
    let child_segs = split_segments(child_path);
    parent_segs.len() < child_segs.len() && child_segs[..parent_segs.len()] == parent_segs[..]
}

/// `true` iff `cidr` (an `address/prefix` pair) appears as two consecutive
/// `/`-delimited segments within `path` (§4.2.3, §8 invariant 8).
///
/// This deliberately does *not* apply the CIDR-preserving collapse from
/// [`split_segments`]: a real IPAM path nests multiple CIDRs
/// (`Default/10.0.0.0/8/10.1.0.0/24`), so the search must look at every
/// raw `/`-delimited token, not treat the whole path as one atomic unit.
/// Comparison is whole-segment, never substring, which is what rejects
/// `10.0.0.0/80` matching inside a path built from `10.0.0.0/8`.
pub fn cidr_in_path(cidr: &str, path: &str) -> bool {
    let mut parts = cidr.splitn(2, '/');
    let (Some(address), Some(prefix)) = (parts.next(), parts.next()) else {
        return false;
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    segments.windows(2).any(|w| w[0] == address && w[1] == prefix)
}
