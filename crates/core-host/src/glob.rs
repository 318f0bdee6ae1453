//! Trailing-`*` glob matching for the filesystem policy.
//!
//! Deliberately minimal: a pattern either names a path exactly or ends in
//! `*` and matches by prefix. This covers directory subtree rules
//! (`/home/user/notes/*`) without pulling pattern syntax into the sandbox
//! surface.

pub fn matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => pattern == path,
    }
}

pub fn matches_any<'a>(patterns: impl IntoIterator<Item = &'a String>, path: &str) -> bool {
    patterns.into_iter().any(|p| matches(p, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_prefix() {
        assert!(matches("/etc/hosts", "/etc/hosts"));
        assert!(!matches("/etc/hosts", "/etc/hosts.bak"));
        assert!(matches("/tmp/*", "/tmp/scratch/file.txt"));
        assert!(!matches("/tmp/*", "/var/tmp/file.txt"));
    }

    #[test]
    fn bare_star_matches_everything() {
        assert!(matches("*", "/anything/at/all"));
    }

    #[test]
    fn any_over_list() {
        let patterns = vec!["/a/*".to_string(), "/b/file".to_string()];
        assert!(matches_any(&patterns, "/a/x"));
        assert!(matches_any(&patterns, "/b/file"));
        assert!(!matches_any(&patterns, "/c/x"));
    }
}
