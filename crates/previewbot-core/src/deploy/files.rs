//! Upload manifest: file collection, encoding and digest.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use remote_state::DeployFile;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::Result;

/// Directories never uploaded.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".vercel",
    ".next",
    ".turbo",
    ".cache",
    ".svelte-kit",
    ".nuxt",
    "target",
];

/// Lockfiles in precedence order; only the first one present is uploaded.
pub const LOCKFILE_PRECEDENCE: &[&str] = &[
    "pnpm-lock.yaml",
    "yarn.lock",
    "package-lock.json",
    "bun.lockb",
    "bun.lock",
];

/// Lockfiles in `root` that must be dropped from the upload.
pub fn dropped_lockfiles(root: &Path) -> Vec<&'static str> {
    let present: Vec<&'static str> = LOCKFILE_PRECEDENCE
        .iter()
        .copied()
        .filter(|name| root.join(name).is_file())
        .collect();
    present.into_iter().skip(1).collect()
}

/// Collect every uploadable file under `root`, sorted by relative path.
pub fn collect_files(root: &Path) -> Result<Vec<DeployFile>> {
    let dropped = dropped_lockfiles(root);
    if !dropped.is_empty() {
        debug!(dropped = ?dropped, "Dropping lower-precedence lockfiles");
    }

    let mut files = Vec::new();
    collect_recursive(root, "", &dropped, &mut files)?;
    files.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(files)
}

fn collect_recursive(
    dir: &Path,
    prefix: &str,
    dropped: &[&str],
    files: &mut Vec<DeployFile>,
) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let relative = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if EXCLUDED_DIRS.contains(&name.as_str()) {
                continue;
            }
            collect_recursive(&path, &relative, dropped, files)?;
        } else if file_type.is_file() {
            if prefix.is_empty() && dropped.contains(&name.as_str()) {
                continue;
            }
            let content = std::fs::read(&path)?;
            files.push(DeployFile {
                file: relative,
                data: STANDARD.encode(content),
                encoding: "base64".to_string(),
            });
        }
    }

    Ok(())
}

/// SHA-256 over the sorted manifest (path and content of every file).
pub fn manifest_digest(files: &[DeployFile]) -> String {
    let mut sorted: Vec<&DeployFile> = files.iter().collect();
    sorted.sort_by(|a, b| a.file.cmp(&b.file));

    let mut hasher = Sha256::new();
    for file in sorted {
        hasher.update(file.file.as_bytes());
        hasher.update(b"\0");
        hasher.update(file.data.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn names(files: &[DeployFile]) -> Vec<&str> {
        files.iter().map(|f| f.file.as_str()).collect()
    }

    #[test]
    fn test_excludes_dependency_and_vcs_dirs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.html", "<h1>hi</h1>");
        write(dir.path(), "src/app.js", "x");
        write(dir.path(), "node_modules/pkg/index.js", "x");
        write(dir.path(), ".git/HEAD", "ref");
        write(dir.path(), ".next/cache/a", "x");
        write(dir.path(), "packages/ui/node_modules/y.js", "x");

        let files = collect_files(dir.path()).unwrap();
        assert_eq!(names(&files), vec!["index.html", "src/app.js"]);
    }

    #[test]
    fn test_keeps_only_highest_precedence_lockfile() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "package.json", "{}");
        write(dir.path(), "package-lock.json", "{}");
        write(dir.path(), "yarn.lock", "");
        write(dir.path(), "bun.lockb", "");

        let files = collect_files(dir.path()).unwrap();
        assert_eq!(names(&files), vec!["package.json", "yarn.lock"]);
        assert_eq!(
            dropped_lockfiles(dir.path()),
            vec!["package-lock.json", "bun.lockb"]
        );
    }

    #[test]
    fn test_single_lockfile_is_kept() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "package-lock.json", "{}");
        let files = collect_files(dir.path()).unwrap();
        assert_eq!(names(&files), vec!["package-lock.json"]);
    }

    #[test]
    fn test_content_is_base64() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hello");
        let files = collect_files(dir.path()).unwrap();
        assert_eq!(files[0].data, "aGVsbG8=");
        assert_eq!(files[0].encoding, "base64");
    }

    #[test]
    fn test_manifest_digest_is_order_independent() {
        let a = DeployFile {
            file: "a".to_string(),
            data: "YQ==".to_string(),
            encoding: "base64".to_string(),
        };
        let b = DeployFile {
            file: "b".to_string(),
            data: "Yg==".to_string(),
            encoding: "base64".to_string(),
        };
        let d1 = manifest_digest(&[a.clone(), b.clone()]);
        let d2 = manifest_digest(&[b, a.clone()]);
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
        assert_ne!(d1, manifest_digest(&[a]));
    }
}
