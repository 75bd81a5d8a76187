//! # Workspace Store
//!
//! A sandboxed view of the filesystem rooted at one directory. Every operation resolves
//! its path through [`Workspace::resolve`] before touching the disk; paths that escape the
//! root are rejected with `OutOfBounds`.

use crate::error::ToolError;
use crate::fuzzy_edit::short_hash;
use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Per-workspace ignore file, gitignore syntax.
pub const AGENT_IGNORE_FILE: &str = ".agentignore";

const BINARY_SNIFF_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    ignored_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReceipt {
    pub path: String,
    pub bytes: usize,
    pub content_hash: String,
}

/// Result of scanning the workspace for `/load`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TextFileScan {
    pub text_files: Vec<String>,
    pub skipped_binaries: Vec<String>,
    pub total_bytes: u64,
}

impl Workspace {
    /// Opens a workspace rooted at `root`, which must be an existing directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, ToolError> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|e| {
            ToolError::NotFound(format!(
                "Workspace directory '{}' cannot be resolved: {e}",
                root.display()
            ))
        })?;
        if !canonical.is_dir() {
            return Err(ToolError::invalid_request(format!(
                "Workspace path '{}' is not a directory.",
                root.display()
            )));
        }
        Ok(Self {
            root: canonical,
            ignored_paths: Vec::new(),
        })
    }

    /// Adds gitignore-style globs that listing and loading skip.
    pub fn with_ignored_paths(mut self, ignored_paths: Vec<String>) -> Self {
        self.ignored_paths = ignored_paths;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `path` (relative to the root, or absolute inside it) to an absolute path.
    ///
    /// Lexical escapes (`..` past the root, foreign absolute paths) are rejected before any
    /// filesystem access. Symlink escapes are caught by canonicalizing the deepest existing
    /// ancestor of the target.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let requested = Path::new(path.trim());
        let relative = if requested.is_absolute() {
            requested
                .strip_prefix(&self.root)
                .map_err(|_| ToolError::out_of_bounds(path))?
                .to_path_buf()
        } else {
            requested.to_path_buf()
        };

        let mut normalized = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => normalized.push(part),
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(ToolError::out_of_bounds(path));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolError::out_of_bounds(path));
                }
            }
        }

        let full = self.root.join(&normalized);
        let mut probe = Some(full.as_path());
        while let Some(candidate) = probe {
            if fs::symlink_metadata(candidate).is_ok() {
                match candidate.canonicalize() {
                    Ok(canonical) if canonical.starts_with(&self.root) => break,
                    _ => return Err(ToolError::out_of_bounds(path)),
                }
            }
            probe = candidate.parent();
        }
        Ok(full)
    }

    /// Lists files below `dir`, lazily, as paths relative to the root.
    pub fn list_files(&self, dir: &str, max_depth: Option<usize>) -> Result<FileList, ToolError> {
        let dir_path = self.resolve(dir)?;
        if !dir_path.exists() {
            return Err(ToolError::NotFound(format!("Directory not found: '{dir}'")));
        }
        if !dir_path.is_dir() {
            return Err(ToolError::invalid_request(format!(
                "The provided path '{dir}' is not a directory."
            )));
        }
        let walker = self.walk_builder(&dir_path, max_depth)?.build();
        Ok(FileList {
            walker,
            root: self.root.clone(),
        })
    }

    pub fn read_file(&self, path: &str) -> Result<String, ToolError> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(ToolError::invalid_request(format!(
                "'{path}' is a directory, not a file."
            )));
        }
        let bytes = fs::read(&full).map_err(|e| ToolError::io(path, e))?;
        if looks_binary(&bytes) {
            return Err(ToolError::invalid_request(format!(
                "File '{path}' appears to be binary and cannot be read as text."
            )));
        }
        String::from_utf8(bytes).map_err(|_| {
            ToolError::invalid_request(format!("File '{path}' is not valid UTF-8 text."))
        })
    }

    /// Writes `content` to `path`, creating parent directories as needed.
    pub fn write_file(&self, path: &str, content: &str) -> Result<WriteReceipt, ToolError> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(ToolError::invalid_request(format!(
                "'{path}' is a directory and cannot be written as a file."
            )));
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| ToolError::io(path, e))?;
        }
        fs::write(&full, content).map_err(|e| ToolError::io(path, e))?;
        tracing::debug!(path, bytes = content.len(), "wrote file");
        Ok(WriteReceipt {
            path: self.relative(&full),
            bytes: content.len(),
            content_hash: short_hash(content),
        })
    }

    pub fn create_directory(&self, path: &str) -> Result<(), ToolError> {
        let full = self.resolve(path)?;
        if full.is_file() {
            return Err(ToolError::invalid_request(format!(
                "'{path}' already exists as a file."
            )));
        }
        fs::create_dir_all(&full).map_err(|e| ToolError::io(path, e))
    }

    pub fn delete_file(&self, path: &str) -> Result<(), ToolError> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Err(ToolError::NotFound(format!("File not found: '{path}'")));
        }
        fs::remove_file(&full).map_err(|e| ToolError::io(path, e))
    }

    /// Scans the whole workspace for text files, sorting binaries out by NUL sniffing.
    pub fn text_files(&self) -> Result<TextFileScan, ToolError> {
        let mut scan = TextFileScan::default();
        for entry in self.walk_builder(&self.root, None)?.build().flatten() {
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let relative = self.relative(entry.path());
            if sniff_binary(entry.path()) {
                scan.skipped_binaries.push(relative);
            } else {
                scan.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
                scan.text_files.push(relative);
            }
        }
        scan.text_files.sort();
        scan.skipped_binaries.sort();
        Ok(scan)
    }

    fn relative(&self, path: &Path) -> String {
        relative_to(&self.root, path)
    }

    fn walk_builder(&self, dir: &Path, max_depth: Option<usize>) -> Result<WalkBuilder, ToolError> {
        let mut builder = WalkBuilder::new(dir);
        builder
            .hidden(true)
            .follow_links(false)
            .require_git(false)
            .max_depth(max_depth)
            .add_custom_ignore_filename(AGENT_IGNORE_FILE)
            .overrides(self.overrides()?)
            .sort_by_file_name(|a, b| a.cmp(b));
        Ok(builder)
    }

    fn overrides(&self) -> Result<Override, ToolError> {
        let mut builder = OverrideBuilder::new(&self.root);
        for glob in &self.ignored_paths {
            let glob = glob.trim_end_matches('/');
            builder.add(&format!("!{glob}")).map_err(|e| {
                ToolError::invalid_request(format!("Invalid ignore pattern '{glob}': {e}"))
            })?;
        }
        builder
            .build()
            .map_err(|e| ToolError::invalid_request(format!("Invalid ignore patterns: {e}")))
    }
}

/// A lazy, finite sequence of workspace-relative file paths.
pub struct FileList {
    walker: ignore::Walk,
    root: PathBuf,
}

impl Iterator for FileList {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            if entry.file_type().is_some_and(|t| t.is_file()) {
                return Some(relative_to(&self.root, entry.path()));
            }
        }
    }
}

fn relative_to(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

fn sniff_binary(path: &Path) -> bool {
    let mut buffer = [0u8; BINARY_SNIFF_LEN];
    match fs::File::open(path).and_then(|mut f| f.read(&mut buffer)) {
        Ok(n) => looks_binary(&buffer[..n]),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::Builder;

    fn setup_workspace() -> (tempfile::TempDir, Workspace) {
        let tmp_dir = Builder::new().prefix("test-workspace").tempdir().unwrap();
        let root = tmp_dir.path();
        fs::write(root.join("file1.txt"), "content1").unwrap();
        fs::create_dir(root.join("sub_dir")).unwrap();
        fs::write(root.join("sub_dir/file2.rs"), "fn main() {}\n").unwrap();
        fs::write(root.join("sub_dir/ignored.log"), "log").unwrap();
        fs::create_dir(root.join("node_modules")).unwrap();
        fs::write(root.join("node_modules/dep.js"), "x").unwrap();
        fs::write(root.join("image.bin"), [0u8, 159, 146, 150]).unwrap();

        let workspace = Workspace::open(root)
            .unwrap()
            .with_ignored_paths(vec!["*.log".to_string(), "node_modules/".to_string()]);
        (tmp_dir, workspace)
    }

    #[test]
    fn test_list_files_respects_ignore_rules() {
        let (_tmp_dir, workspace) = setup_workspace();
        let files: Vec<String> = workspace.list_files(".", None).unwrap().collect();

        assert!(files.contains(&"file1.txt".to_string()));
        assert!(files.contains(&"sub_dir/file2.rs".to_string()));
        assert!(!files.iter().any(|f| f.ends_with("ignored.log")));
        assert!(!files.iter().any(|f| f.starts_with("node_modules")));
    }

    #[test]
    fn test_list_files_honours_agentignore_and_depth() {
        let (tmp_dir, workspace) = setup_workspace();
        fs::write(tmp_dir.path().join(AGENT_IGNORE_FILE), "file1.txt\n").unwrap();

        let all: Vec<String> = workspace.list_files(".", None).unwrap().collect();
        assert!(!all.contains(&"file1.txt".to_string()));

        let shallow: Vec<String> = workspace.list_files(".", Some(1)).unwrap().collect();
        assert!(!shallow.iter().any(|f| f.starts_with("sub_dir/")));
    }

    #[test]
    fn test_list_missing_directory_is_not_found() {
        let (_tmp_dir, workspace) = setup_workspace();
        let err = workspace.list_files("nope", None).err().unwrap();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_escaping_paths_are_out_of_bounds() {
        let (_tmp_dir, workspace) = setup_workspace();
        for path in ["../secret.txt", "sub_dir/../../x", "/etc/passwd"] {
            let err = workspace.read_file(path).unwrap_err();
            assert_eq!(err.code(), ErrorCode::OutOfBounds, "path {path}");
            let err = workspace.write_file(path, "x").unwrap_err();
            assert_eq!(err.code(), ErrorCode::OutOfBounds, "path {path}");
        }
        assert!(!_tmp_dir.path().parent().unwrap().join("secret.txt").exists());
    }

    #[test]
    fn test_inner_parent_components_stay_inside() {
        let (_tmp_dir, workspace) = setup_workspace();
        let content = workspace.read_file("sub_dir/../file1.txt").unwrap();
        assert_eq!(content, "content1");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_out_of_bounds() {
        let (tmp_dir, workspace) = setup_workspace();
        let outside = Builder::new().prefix("outside").tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp_dir.path().join("link")).unwrap();

        let err = workspace.read_file("link/secret.txt").unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfBounds);
    }

    #[test]
    fn test_read_missing_and_binary_files() {
        let (_tmp_dir, workspace) = setup_workspace();
        assert_eq!(
            workspace.read_file("missing.txt").unwrap_err().code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            workspace.read_file("image.bin").unwrap_err().code(),
            ErrorCode::InvalidRequest
        );
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let (tmp_dir, workspace) = setup_workspace();
        let receipt = workspace.write_file("a/b/c.txt", "hello").unwrap();
        assert_eq!(receipt.path, "a/b/c.txt");
        assert_eq!(receipt.bytes, 5);
        assert_eq!(
            fs::read_to_string(tmp_dir.path().join("a/b/c.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_delete_and_create_directory() {
        let (tmp_dir, workspace) = setup_workspace();
        workspace.create_directory("new/dir").unwrap();
        assert!(tmp_dir.path().join("new/dir").is_dir());

        workspace.delete_file("file1.txt").unwrap();
        assert!(!tmp_dir.path().join("file1.txt").exists());
        assert_eq!(
            workspace.delete_file("file1.txt").unwrap_err().code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn test_text_files_skips_binaries() {
        let (_tmp_dir, workspace) = setup_workspace();
        let scan = workspace.text_files().unwrap();
        assert_eq!(scan.text_files, vec!["file1.txt", "sub_dir/file2.rs"]);
        assert_eq!(scan.skipped_binaries, vec!["image.bin"]);
        assert_eq!(scan.total_bytes, 8 + 13);
    }
}
