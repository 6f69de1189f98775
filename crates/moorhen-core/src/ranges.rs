//! npm-flavored version range matching on top of the `semver` crate.
//!
//! Peer dependency ranges come straight out of third-party manifests, so
//! this accepts the npm syntax the `semver` crate doesn't: hyphen ranges,
//! x-ranges, `||` alternatives, and space-separated AND comparators. The
//! loose mode additionally tolerates common malformed version strings.

use semver::{Version, VersionReq};

/// Check whether `version` satisfies `range`.
///
/// A range of `"*"` always matches. Unparseable versions or ranges never
/// match; peer validation treats that as a mismatch rather than an error.
#[must_use]
pub fn version_satisfies(version: &str, range: &str, loose: bool) -> bool {
    if range.trim() == "*" {
        return true;
    }

    let Some(parsed) = parse_version(version, loose) else {
        return false;
    };

    // OR ranges: satisfied when any alternative matches
    if range.contains("||") {
        return range
            .split("||")
            .map(str::trim)
            .filter(|alt| !alt.is_empty())
            .any(|alt| matches_single(&parsed, alt));
    }

    matches_single(&parsed, range)
}

/// Parse a version string, optionally sanitizing npm-tolerated forms.
///
/// Loose parsing strips `v`/`=` prefixes and pads missing minor/patch
/// components (`"1"` and `"1.2"` parse as `1.0.0` and `1.2.0`).
#[must_use]
pub fn parse_version(version: &str, loose: bool) -> Option<Version> {
    let version = version.trim();
    if let Ok(v) = Version::parse(version) {
        return Some(v);
    }
    if !loose {
        return None;
    }

    let stripped = version.trim_start_matches(['v', '=']).trim();
    if let Ok(v) = Version::parse(stripped) {
        return Some(v);
    }

    // Pad "1" or "1.2" out to a full triple
    let numeric: Vec<&str> = stripped.split('.').collect();
    let padded = match numeric.as_slice() {
        [major] => format!("{major}.0.0"),
        [major, minor] => format!("{major}.{minor}.0"),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

fn matches_single(version: &Version, range: &str) -> bool {
    parse_range(range).is_some_and(|req| req.matches(version))
}

/// Parse a single (non-OR) range, handling npm-specific syntax.
///
/// Handles:
/// - Standard semver ranges: ^1.0.0, ~1.0.0, >=1.0.0, etc.
/// - Hyphen ranges: 1.0.0 - 2.0.0
/// - X-ranges: 1.x, 1.0.x, *
/// - Space-separated comparators: >= 2.1.2 < 3.0.0
fn parse_range(range: &str) -> Option<VersionReq> {
    let range = range.trim();

    // Hyphen ranges: "1.0.0 - 2.0.0" -> ">=1.0.0, <=2.0.0"
    if let Some((start, end)) = parse_hyphen_range(range) {
        return VersionReq::parse(&format!(">={start}, <={end}")).ok();
    }

    // X-ranges: "1.x" -> ">=1.0.0, <2.0.0"
    if range.contains('x') || range.contains('X') || range == "*" {
        return VersionReq::parse(&convert_x_range(range)).ok();
    }

    // npm allows spaces between comparators to mean AND
    VersionReq::parse(&convert_space_separated_comparators(range)).ok()
}

/// Parse a hyphen range like "1.0.0 - 2.0.0".
fn parse_hyphen_range(range: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = range.split(" - ").collect();
    if parts.len() == 2 {
        let start = parts[0].trim();
        let end = parts[1].trim();
        if !start.is_empty() && !end.is_empty() {
            return Some((start.to_string(), end.to_string()));
        }
    }
    None
}

/// Convert space-separated comparators to comma-separated.
///
/// npm allows: ">= 2.1.2 < 3.0.0" which means ">=2.1.2 AND <3.0.0".
/// Rust semver requires: ">=2.1.2, <3.0.0".
fn convert_space_separated_comparators(range: &str) -> String {
    let mut result = String::new();
    let mut need_comma = false;

    for token in range.split_whitespace() {
        if token_has_version(token) {
            if need_comma {
                result.push_str(", ");
            }
            result.push_str(token);
            need_comma = true;
        } else {
            // Operator without version, keep accumulating
            if need_comma {
                result.push_str(", ");
                need_comma = false;
            }
            result.push_str(token);
        }
    }

    if result.is_empty() {
        return range.trim().to_string();
    }
    result
}

/// Check if a token contains a version number (has digits).
fn token_has_version(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

/// Convert x-range to semver range.
fn convert_x_range(range: &str) -> String {
    let range = range.trim();

    if range == "*" || range == "x" || range == "X" {
        return ">=0.0.0".to_string();
    }

    let parts: Vec<&str> = range.split('.').collect();

    match parts.as_slice() {
        [major, "x" | "X" | "*"] => {
            // "1.x" -> ">=1.0.0, <2.0.0"
            if let Ok(m) = major.parse::<u64>() {
                return format!(">={m}.0.0, <{}.0.0", m + 1);
            }
        }
        [major, minor, "x" | "X" | "*"] => {
            // "1.2.x" -> ">=1.2.0, <1.3.0"
            if let (Ok(m), Ok(n)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return format!(">={m}.{n}.0, <{m}.{}.0", n + 1);
            }
        }
        _ => {}
    }

    // Fallback: just replace x with 0
    range.replace(['x', 'X'], "0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_always_satisfies() {
        assert!(version_satisfies("1.2.3", "*", false));
        assert!(version_satisfies("0.0.1-alpha", "*", false));
        assert!(version_satisfies("garbage", "*", false));
    }

    #[test]
    fn test_caret_range() {
        assert!(version_satisfies("1.2.0", "^1.0.0", false));
        assert!(!version_satisfies("2.0.0", "^1.0.0", false));
    }

    #[test]
    fn test_tilde_range() {
        assert!(version_satisfies("1.2.5", "~1.2.0", false));
        assert!(!version_satisfies("1.3.0", "~1.2.0", false));
    }

    #[test]
    fn test_or_range() {
        assert!(version_satisfies("2.1.0", "^1.0.0 || ^2.0.0", false));
        assert!(version_satisfies("1.5.0", "^1.0.0 || ^2.0.0", false));
        assert!(!version_satisfies("3.0.0", "^1.0.0 || ^2.0.0", false));
    }

    #[test]
    fn test_hyphen_range() {
        assert!(version_satisfies("1.5.0", "1.0.0 - 2.0.0", false));
        assert!(version_satisfies("2.0.0", "1.0.0 - 2.0.0", false));
        assert!(!version_satisfies("2.0.1", "1.0.0 - 2.0.0", false));
    }

    #[test]
    fn test_x_range() {
        assert!(version_satisfies("1.9.9", "1.x", false));
        assert!(!version_satisfies("2.0.0", "1.x", false));
        assert!(version_satisfies("1.2.7", "1.2.x", false));
        assert!(!version_satisfies("1.3.0", "1.2.x", false));
    }

    #[test]
    fn test_space_separated_comparators() {
        assert!(version_satisfies("2.5.0", ">= 2.1.2 < 3.0.0", false));
        assert!(!version_satisfies("3.0.0", ">= 2.1.2 < 3.0.0", false));
    }

    #[test]
    fn test_loose_version_parsing() {
        assert!(version_satisfies("v1.2.3", "^1.0.0", true));
        assert!(!version_satisfies("v1.2.3", "^1.0.0", false));
        assert!(version_satisfies("1.2", "^1.0.0", true));
        assert!(version_satisfies("1", ">=1.0.0", true));
    }

    #[test]
    fn test_unparseable_never_matches() {
        assert!(!version_satisfies("not-a-version", "^1.0.0", true));
        assert!(!version_satisfies("1.0.0", "not-a-range", false));
    }

    #[test]
    fn test_ge_range() {
        assert!(version_satisfies("16.8.0", ">=16", false));
        assert!(!version_satisfies("15.0.0", ">=16", false));
    }
}
