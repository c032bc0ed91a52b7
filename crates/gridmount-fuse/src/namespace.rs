//! Virtual directory tree over flat store names.
//!
//! A directory exists exactly when some stored or staged name continues
//! below it: `a/b/c.txt` implies directories `a` and `a/b`. Nothing is
//! materialized; each query projects the current set of names.

/// Immediate child of a directory, as seen from one flat name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child<'a> {
    File(&'a str),
    Directory(&'a str),
}

/// Project `name` onto `dir` (`""` is the root).
pub fn child_of<'a>(dir: &str, name: &'a str) -> Option<Child<'a>> {
    let rest = if dir.is_empty() {
        name
    } else {
        name.strip_prefix(dir)?.strip_prefix('/')?
    };
    match rest.split_once('/') {
        Some(("", _)) => None,
        Some((first, _)) => Some(Child::Directory(first)),
        None if rest.is_empty() => None,
        None => Some(Child::File(rest)),
    }
}

/// True if any of `names` lies strictly below `dir`.
pub fn is_directory<'a>(dir: &str, names: impl IntoIterator<Item = &'a str>) -> bool {
    if dir.is_empty() {
        return true;
    }
    names.into_iter().any(|name| {
        name.len() > dir.len() + 1
            && name.starts_with(dir)
            && name.as_bytes()[dir.len()] == b'/'
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_children() {
        assert_eq!(child_of("", "a.txt"), Some(Child::File("a.txt")));
        assert_eq!(child_of("", "docs/a.txt"), Some(Child::Directory("docs")));
        assert_eq!(child_of("", "/odd"), None);
    }

    #[test]
    fn nested_children() {
        assert_eq!(child_of("docs", "docs/a.txt"), Some(Child::File("a.txt")));
        assert_eq!(
            child_of("docs", "docs/2024/a.txt"),
            Some(Child::Directory("2024"))
        );
        assert_eq!(child_of("docs", "docsx/a.txt"), None);
        assert_eq!(child_of("docs", "docs"), None);
        assert_eq!(child_of("docs", "other/a.txt"), None);
    }

    #[test]
    fn directory_detection() {
        let names = ["docs/a.txt", "photos/2024/cat.jpg", "top.txt"];
        assert!(is_directory("", names));
        assert!(is_directory("docs", names));
        assert!(is_directory("photos", names));
        assert!(is_directory("photos/2024", names));
        assert!(!is_directory("top.txt", names));
        assert!(!is_directory("doc", names));
        assert!(!is_directory("photos/2024/cat.jpg", names));
    }
}
