use crate::core::models::files::{FileContent, Files};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::trace;
use walkdir::WalkDir;

/// Writes every file of `files` under `dir`, creating intermediate directories.
///
/// Paths must be relative and stay inside `dir`.
pub fn stage_files(dir: &Path, files: &Files) -> io::Result<()> {
    for (relative, content) in files {
        let target = dir.join(checked_relative(relative)?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content.as_bytes())?;
        trace!(path = %relative, bytes = content.len(), "Staged input file");
    }
    Ok(())
}

/// Reads every regular file below `dir`, skipping paths present in `exclude`.
///
/// Keys are relative to `dir` and use `/` as separator regardless of platform.
/// Exclusions match by canonical key, so `./a.txt` and `sub//b.txt` exclude
/// `a.txt` and `sub/b.txt`.
pub fn collect_files(dir: &Path, exclude: &Files) -> io::Result<Files> {
    let excluded: HashSet<String> = exclude.paths().map(canonical_key).collect();
    let mut collected = Files::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let key = path_key(relative);
        if excluded.contains(&key) {
            continue;
        }
        let bytes = fs::read(entry.path())?;
        collected.insert(key, FileContent::from_bytes(bytes));
    }
    Ok(collected)
}

fn checked_relative(path: &str) -> io::Result<PathBuf> {
    let candidate = Path::new(path);
    let escapes = candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || canonical_key(path).is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("input file path '{path}' must be relative and stay inside the working directory"),
        ));
    }
    Ok(candidate.to_path_buf())
}

/// The `/`-joined normal components of a relative path.
fn canonical_key(path: &str) -> String {
    path_key(Path::new(path))
}

fn path_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let files: Files = [("a.txt", "alpha"), ("sub/dir/b.txt", "beta")]
            .into_iter()
            .collect();
        stage_files(dir.path(), &files).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "alpha");
        assert_eq!(
            fs::read_to_string(dir.path().join("sub/dir/b.txt")).unwrap(),
            "beta"
        );
    }

    #[test]
    fn staging_rejects_paths_that_escape() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["../evil.txt", "/etc/passwd", "a/../../b", "", ".", "./"] {
            let files: Files = [(bad, "x")].into_iter().collect();
            let err = stage_files(dir.path(), &files).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{bad}");
        }
    }

    #[test]
    fn collection_excludes_input_files() {
        let dir = tempfile::tempdir().unwrap();
        let inputs: Files = [("a.txt", "input")].into_iter().collect();
        stage_files(dir.path(), &inputs).unwrap();
        fs::write(dir.path().join("b.out"), "output").unwrap();

        let collected = collect_files(dir.path(), &inputs).unwrap();
        assert!(collected.contains("b.out"));
        assert!(!collected.contains("a.txt"));
    }

    #[test]
    fn dotted_input_keys_are_still_excluded_from_collection() {
        let dir = tempfile::tempdir().unwrap();
        let inputs: Files = [("./a.txt", "input"), ("sub/./b.txt", "nested input")]
            .into_iter()
            .collect();
        stage_files(dir.path(), &inputs).unwrap();
        fs::write(dir.path().join("out.txt"), "output").unwrap();

        let collected = collect_files(dir.path(), &inputs).unwrap();
        assert_eq!(collected.paths().collect::<Vec<_>>(), ["out.txt"]);
    }

    #[test]
    fn collected_keys_include_subdirectory_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("scr.geom")).unwrap();
        fs::write(dir.path().join("scr.geom/c0"), [0u8, 159, 146, 150]).unwrap();

        let collected = collect_files(dir.path(), &Files::new()).unwrap();
        let content = collected.get("scr.geom/c0").unwrap();
        assert_eq!(content.as_bytes(), &[0u8, 159, 146, 150]);
        assert!(content.as_text().is_none());
    }
}
