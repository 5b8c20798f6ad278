/// Maps canonical paths to backend keys under a work dir and back.
///
/// The work dir is kept without a leading separator and, unless it is the
/// bucket root, with exactly one trailing separator. Canonical paths never
/// start with a separator either, so `rel(abs(p)) == p` for every `p`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkDir {
    prefix: String,
}

impl WorkDir {
    pub fn new(work_dir: &str) -> Self {
        let trimmed = work_dir.trim_matches('/');
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}/")
        };
        Self { prefix }
    }

    /// The work dir as reported in `StorageMeta`.
    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    pub fn abs(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path.trim_start_matches('/'))
    }

    /// Backend key back to a canonical path. Keys outside the work dir are
    /// returned unchanged.
    pub fn rel<'a>(&self, key: &'a str) -> &'a str {
        let key = key.trim_start_matches('/');
        key.strip_prefix(self.prefix.as_str()).unwrap_or(key)
    }
}

impl std::fmt::Display for WorkDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_work_dir() {
        let wd = WorkDir::new("/");
        assert_eq!(wd.abs("a/b"), "a/b");
        assert_eq!(wd.abs("/a/b"), "a/b");
        assert_eq!(wd.rel("a/b"), "a/b");
        assert_eq!(wd.to_string(), "/");
    }

    #[test]
    fn nested_work_dir_is_inverse() {
        let wd = WorkDir::new("/data/backups");
        assert_eq!(wd.as_str(), "data/backups/");
        for p in ["x", "dir/", "a/b/c.txt", ""] {
            let abs = wd.abs(p);
            assert!(abs.starts_with("data/backups/"));
            assert_eq!(wd.rel(&abs), p);
        }
    }

    #[test]
    fn leading_separator_is_ambiguity_free() {
        let a = WorkDir::new("data");
        let b = WorkDir::new("/data/");
        assert_eq!(a, b);
        assert_eq!(a.abs("/x"), b.abs("x"));
    }

    #[test]
    fn foreign_key_is_left_alone() {
        let wd = WorkDir::new("data");
        assert_eq!(wd.rel("other/x"), "other/x");
    }
}
