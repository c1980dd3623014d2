//! Per-call options and the path rewriting they drive.

use std::path::{Path, PathBuf};

use super::selector::Selection;

/// Options for `create` and `add`.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Store payloads as-is instead of deflating them.
    pub no_compression: bool,
    /// Prefix prepended to every stored name.
    pub add_path: Option<String>,
    /// Leading directory stripped from every stored name.
    pub remove_path: Option<String>,
    /// Keep only the last path component.
    pub remove_all_path: bool,
    /// Archive comment. `add` keeps the existing one when unset.
    pub comment: Option<String>,
}

/// Options for `extract`.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Destination directory. Defaults to the current directory.
    pub add_path: Option<PathBuf>,
    /// Leading directory stripped from stored names before writing.
    pub remove_path: Option<String>,
    /// Write every file directly under the destination.
    pub remove_all_path: bool,
    pub selection: Selection,
    /// Return payloads in [`EntryHeader::content`](super::EntryHeader)
    /// instead of writing files.
    pub extract_as_string: bool,
    /// Permission bits applied to every extracted file.
    pub set_chmod: Option<u32>,
    /// Overwrite files on disk even when they are newer than the entry.
    pub replace_newer: bool,
}

/// Turn a filesystem path into `/`-separated text.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Collapse `.`, `..` and empty segments of a `/`-separated path.
///
/// The result is always relative: a leading `/`, a drive letter and any
/// `..` that would climb above the start are dropped. A trailing `/` is
/// kept.
pub fn reduce_path(path: &str) -> String {
    let path = strip_drive(path);
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    let mut reduced = parts.join("/");
    if path.ends_with('/') && !reduced.is_empty() {
        reduced.push('/');
    }
    reduced
}

fn strip_drive(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        &path[2..]
    } else {
        path
    }
}

fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Strip `prefix` (a directory) from `name`. `None` when it does not apply.
fn strip_dir_prefix<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return None;
    }
    if name.trim_end_matches('/') == prefix {
        return Some("");
    }
    name.strip_prefix(prefix)?.strip_prefix('/')
}

impl AddOptions {
    /// Name to record in the archive for `source`, without the folder
    /// suffix. An empty result means nothing is left to store.
    pub fn stored_name(&self, source: &Path) -> String {
        let full = reduce_path(&to_slash(source));
        let mut name = if self.remove_all_path {
            last_segment(&full).to_string()
        } else if let Some(remove) = self.remove_path.as_deref() {
            let remove = reduce_path(&remove.replace('\\', "/"));
            match strip_dir_prefix(&full, &remove) {
                Some(rest) => rest.to_string(),
                None => full.clone(),
            }
        } else {
            full
        };

        if let Some(add) = self.add_path.as_deref().filter(|a| !a.is_empty()) {
            name = reduce_path(&format!("{}/{}", add.replace('\\', "/"), name));
        }
        name.trim_end_matches('/').to_string()
    }
}

/// Why an entry cannot be mapped to a location on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetError {
    /// The rewrite left nothing to write (folder stripped away).
    Empty,
    /// The name is absolute or climbs above the destination.
    Escapes,
}

impl ExtractOptions {
    /// Destination path for an entry, after `remove_path`/`remove_all_path`
    /// rewriting and joining onto `add_path`.
    pub fn target_path(&self, stored: &str, is_folder: bool) -> Result<PathBuf, TargetError> {
        let stored = stored.replace('\\', "/");
        let relative = if self.remove_all_path {
            if is_folder {
                return Err(TargetError::Empty);
            }
            last_segment(&stored).to_string()
        } else if let Some(remove) = self.remove_path.as_deref() {
            match strip_dir_prefix(&stored, &remove.replace('\\', "/")) {
                Some(rest) => rest.to_string(),
                None => stored,
            }
        } else {
            stored
        };

        if relative.trim_end_matches('/').is_empty() {
            return Err(TargetError::Empty);
        }
        if escapes(&relative) {
            return Err(TargetError::Escapes);
        }

        let base = self.add_path.clone().unwrap_or_default();
        Ok(relative
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .fold(base, |acc, s| acc.join(s)))
    }
}

/// True when a relative `/`-separated path is absolute or leaves its root.
fn escapes(path: &str) -> bool {
    if path.starts_with('/') || strip_drive(path).len() != path.len() {
        return true;
    }
    let mut depth = 0i64;
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            _ => depth += 1,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_dot_segments() {
        assert_eq!(reduce_path("./a/./b/../c.txt"), "a/c.txt");
        assert_eq!(reduce_path("/abs/path/"), "abs/path/");
        assert_eq!(reduce_path("../../up.txt"), "up.txt");
        assert_eq!(reduce_path("C:/data/x"), "data/x");
        assert_eq!(reduce_path("a//b"), "a/b");
        assert_eq!(reduce_path("./"), "");
    }

    #[test]
    fn stored_name_defaults_to_reduced_path() {
        let opts = AddOptions::default();
        assert_eq!(opts.stored_name(Path::new("./src/../lib/a.rs")), "lib/a.rs");
    }

    #[test]
    fn remove_then_add_path() {
        let opts = AddOptions {
            remove_path: Some("/tmp/work".into()),
            add_path: Some("backup/".into()),
            ..Default::default()
        };
        assert_eq!(opts.stored_name(Path::new("/tmp/work/x/y.txt")), "backup/x/y.txt");
        // Not under remove_path: only add_path applies.
        assert_eq!(opts.stored_name(Path::new("/tmp/other/z.txt")), "backup/tmp/other/z.txt");
        // The removed directory itself collapses to add_path.
        assert_eq!(opts.stored_name(Path::new("/tmp/work")), "backup");
    }

    #[test]
    fn remove_path_matches_whole_segments() {
        let opts = AddOptions {
            remove_path: Some("dir".into()),
            ..Default::default()
        };
        assert_eq!(opts.stored_name(Path::new("dir/a")), "a");
        assert_eq!(opts.stored_name(Path::new("directory/a")), "directory/a");
        assert_eq!(opts.stored_name(Path::new("dir")), "");
    }

    #[test]
    fn remove_all_path_keeps_basename() {
        let opts = AddOptions {
            remove_all_path: true,
            add_path: Some("flat".into()),
            ..Default::default()
        };
        assert_eq!(opts.stored_name(Path::new("deep/er/file.bin")), "flat/file.bin");
    }

    #[test]
    fn target_path_joins_destination() {
        let opts = ExtractOptions {
            add_path: Some(PathBuf::from("/out")),
            remove_path: Some("root/".into()),
            ..Default::default()
        };
        assert_eq!(
            opts.target_path("root/sub/f.txt", false).unwrap(),
            PathBuf::from("/out/sub/f.txt")
        );
        assert_eq!(opts.target_path("root/", true), Err(TargetError::Empty));
        assert_eq!(
            opts.target_path("other/f.txt", false).unwrap(),
            PathBuf::from("/out/other/f.txt")
        );
    }

    #[test]
    fn target_path_rejects_traversal() {
        let opts = ExtractOptions::default();
        assert_eq!(opts.target_path("../evil.txt", false), Err(TargetError::Escapes));
        assert_eq!(opts.target_path("a/../../evil.txt", false), Err(TargetError::Escapes));
        assert_eq!(opts.target_path("/etc/passwd", false), Err(TargetError::Escapes));
        assert!(opts.target_path("a/../b.txt", false).is_ok());
    }

    #[test]
    fn remove_all_path_filters_folders() {
        let opts = ExtractOptions {
            remove_all_path: true,
            ..Default::default()
        };
        assert_eq!(opts.target_path("a/b/", true), Err(TargetError::Empty));
        assert_eq!(opts.target_path("a/b/c.txt", false).unwrap(), PathBuf::from("c.txt"));
    }
}
