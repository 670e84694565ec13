//! Path strings. Nothing here touches the disk: "." and ".." are resolved by
//! the directory entries that carry those names.

/// `path` made absolute against `cwd`
pub fn full_path(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else if cwd.ends_with('/') {
        format!("{cwd}{path}")
    } else {
        format!("{cwd}/{path}")
    }
}

/// non-empty `/`-separated components
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// (parent components, last name), `None` for the root itself
pub fn split_parent(path: &str) -> Option<(Vec<&str>, &str)> {
    let mut parts = components(path);
    let name = parts.pop()?;
    Some((parts, name))
}

/// `dir` + `name`, with exactly one slash between them
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Lexically clean an absolute path: drop ".", fold "..", collapse slashes.
pub fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for c in components(path) {
        match c {
            "." => {}
            ".." => {
                out.pop();
            }
            _ => out.push(c),
        }
    }
    format!("/{}", out.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_hang_off_cwd() {
        assert_eq!(full_path("/", "a"), "/a");
        assert_eq!(full_path("/home", "a/b"), "/home/a/b");
        assert_eq!(full_path("/home", "/etc"), "/etc");
    }

    #[test]
    fn empty_components_are_dropped() {
        assert_eq!(components("//a///b/"), vec!["a", "b"]);
        assert!(components("/").is_empty());
        assert!(components("").is_empty());
    }

    #[test]
    fn parent_and_name() {
        assert_eq!(split_parent("/a/b/c"), Some((vec!["a", "b"], "c")));
        assert_eq!(split_parent("/a"), Some((vec![], "a")));
        assert_eq!(split_parent("///"), None);
    }

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize("/a/./b/../c"), "/a/c");
        assert_eq!(normalize("/.."), "/");
        assert_eq!(normalize("//x//"), "/x");
    }
}
