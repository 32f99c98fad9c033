//! Execution client: immutable directory and file values plus a host view.
//!
//! Every `Directory` operation returns a new value; the receiver is never
//! mutated. Paths inside a directory are relative and `/`-separated.

use crate::errors::{SpoolError, SpoolResult};
use base64::Engine as _;
use globset::Glob;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Entry point handed to handlers through the invocation context
#[derive(Debug, Clone)]
pub struct Client {
    host: Host,
}

impl Client {
    /// Create a client whose host view is rooted at `workdir`
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            host: Host {
                root: workdir.into(),
            },
        }
    }

    /// An empty directory
    #[must_use]
    pub fn directory(&self) -> Directory {
        Directory::default()
    }

    #[must_use]
    pub fn host(&self) -> &Host {
        &self.host
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir,
    File(Arc<[u8]>),
}

/// Immutable tree of files and directories
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Directory {
    nodes: Arc<BTreeMap<String, Node>>,
}

impl Directory {
    /// Add a file, creating any missing parent directories.
    ///
    /// An existing file at `path` is replaced.
    pub fn with_new_file(&self, path: &str, contents: impl AsRef<[u8]>) -> SpoolResult<Directory> {
        let key = normalize_path(path)?;
        if key.is_empty() {
            return Err(SpoolError::client_invalid_path(path, "a file needs a name"));
        }

        let mut nodes = (*self.nodes).clone();
        ensure_parents(&mut nodes, &key)?;
        if nodes.get(&key) == Some(&Node::Dir) {
            return Err(SpoolError::client_path_conflict(&key, "a directory already exists here"));
        }
        nodes.insert(key, Node::File(Arc::from(contents.as_ref())));

        Ok(Directory {
            nodes: Arc::new(nodes),
        })
    }

    /// Add an empty directory, creating any missing parents
    pub fn with_new_directory(&self, path: &str) -> SpoolResult<Directory> {
        let key = normalize_path(path)?;
        if key.is_empty() {
            return Ok(self.clone());
        }

        let mut nodes = (*self.nodes).clone();
        ensure_parents(&mut nodes, &key)?;
        if let Some(Node::File(_)) = nodes.get(&key) {
            return Err(SpoolError::client_path_conflict(&key, "a file already exists here"));
        }
        nodes.insert(key, Node::Dir);

        Ok(Directory {
            nodes: Arc::new(nodes),
        })
    }

    /// Copy `other` into this directory below `path`
    pub fn with_directory(&self, path: &str, other: &Directory) -> SpoolResult<Directory> {
        let mut merged = self.with_new_directory(path)?;
        let base = normalize_path(path)?;
        for (key, node) in other.nodes.iter() {
            let target = if base.is_empty() {
                key.clone()
            } else {
                format!("{base}/{key}")
            };
            merged = match node {
                Node::Dir => merged.with_new_directory(&target)?,
                Node::File(contents) => merged.with_new_file(&target, contents)?,
            };
        }
        Ok(merged)
    }

    /// Extract a single file
    pub fn file(&self, path: &str) -> SpoolResult<File> {
        let key = normalize_path(path)?;
        match self.nodes.get(&key) {
            Some(Node::File(contents)) => Ok(File {
                name: basename(&key).to_string(),
                contents: Arc::clone(contents),
            }),
            Some(Node::Dir) => Err(SpoolError::client_path_conflict(&key, "is a directory")),
            None => Err(SpoolError::client_not_found(&key)),
        }
    }

    /// Sub-directory rooted at `path`
    pub fn directory(&self, path: &str) -> SpoolResult<Directory> {
        let key = normalize_path(path)?;
        if key.is_empty() {
            return Ok(self.clone());
        }
        match self.nodes.get(&key) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => {
                return Err(SpoolError::client_path_conflict(&key, "is a file"));
            }
            None => return Err(SpoolError::client_not_found(&key)),
        }

        let prefix = format!("{key}/");
        let nodes = self
            .nodes
            .iter()
            .filter_map(|(path, node)| {
                path.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), node.clone()))
            })
            .collect();

        Ok(Directory {
            nodes: Arc::new(nodes),
        })
    }

    /// Names of the immediate children, sorted
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|path| !path.contains('/'))
            .cloned()
            .collect()
    }

    /// Every path in the tree (files and directories), sorted
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Paths of files only, sorted
    #[must_use]
    pub fn file_paths(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| matches!(node, Node::File(_)))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Paths matching a glob pattern, sorted
    pub fn glob(&self, pattern: &str) -> SpoolResult<Vec<String>> {
        let matcher = Glob::new(pattern)
            .map_err(|err| SpoolError::client_invalid_path(pattern, &err.to_string()))?
            .compile_matcher();
        Ok(self
            .nodes
            .keys()
            .filter(|path| matcher.is_match(path.as_str()))
            .cloned()
            .collect())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Content digest over paths, kinds and file bytes (sha256, hex)
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, node) in self.nodes.iter() {
            match node {
                Node::Dir => {
                    hasher.update(b"d\0");
                    hasher.update(path.as_bytes());
                    hasher.update(b"\0");
                }
                Node::File(contents) => {
                    hasher.update(b"f\0");
                    hasher.update(path.as_bytes());
                    hasher.update(b"\0");
                    hasher.update((contents.len() as u64).to_le_bytes());
                    hasher.update(contents);
                }
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Write the tree below `dest` on the host. Returns the number of files written.
    pub fn export(&self, dest: &Path) -> SpoolResult<usize> {
        create_dir_all(dest)?;

        let mut written = 0;
        for (path, node) in self.nodes.iter() {
            let target = host_path(dest, path);
            match node {
                Node::Dir => create_dir_all(&target)?,
                Node::File(contents) => {
                    if let Some(parent) = target.parent() {
                        create_dir_all(parent)?;
                    }
                    fs::write(&target, contents).map_err(|e| io_error(&target, &e))?;
                    written += 1;
                }
            }
        }

        log::debug!("Exported {written} files to {}", dest.display());
        Ok(written)
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "directory",
            "digest": self.digest(),
            "entries": self.paths(),
        })
    }
}

/// A single file value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    name: String,
    contents: Arc<[u8]>,
}

impl File {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// Contents as UTF-8, if they are valid UTF-8
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.contents.len()
    }

    #[must_use]
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.contents))
    }

    /// Write the file to `dest` on the host, creating parent directories
    pub fn export(&self, dest: &Path) -> SpoolResult<()> {
        if let Some(parent) = dest.parent() {
            create_dir_all(parent)?;
        }
        fs::write(dest, &self.contents).map_err(|e| io_error(dest, &e))
    }

    /// Text contents are inlined; anything else is base64-encoded
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let (encoding, contents) = match self.text() {
            Some(text) => ("utf-8", text.to_string()),
            None => (
                "base64",
                base64::engine::general_purpose::STANDARD.encode(&self.contents),
            ),
        };
        serde_json::json!({
            "type": "file",
            "name": self.name,
            "size": self.size(),
            "digest": self.digest(),
            "encoding": encoding,
            "contents": contents,
        })
    }
}

/// Read-only view of the real filesystem, rooted at the working directory
#[derive(Debug, Clone)]
pub struct Host {
    root: PathBuf,
}

impl Host {
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }

    /// Load a host directory recursively. Symlinks are not followed.
    pub fn directory(&self, path: &str) -> SpoolResult<Directory> {
        let base = self.resolve(path);
        let metadata = fs::metadata(&base).map_err(|e| io_error(&base, &e))?;
        if !metadata.is_dir() {
            return Err(SpoolError::client_path_conflict(
                &base.display().to_string(),
                "not a directory",
            ));
        }

        let mut nodes = BTreeMap::new();
        for entry in WalkDir::new(&base)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                SpoolError::client_io(&base.display().to_string(), &e.to_string())
            })?;
            let relative = entry.path().strip_prefix(&base).unwrap_or(entry.path());
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let file_type = entry.file_type();
            if file_type.is_dir() {
                nodes.insert(key, Node::Dir);
            } else if file_type.is_file() {
                let contents = fs::read(entry.path()).map_err(|e| io_error(entry.path(), &e))?;
                nodes.insert(key, Node::File(Arc::from(contents)));
            }
        }

        log::debug!("Loaded {} host entries from {}", nodes.len(), base.display());
        Ok(Directory {
            nodes: Arc::new(nodes),
        })
    }

    /// Load a single host file
    pub fn file(&self, path: &str) -> SpoolResult<File> {
        let full = self.resolve(path);
        let contents = fs::read(&full).map_err(|e| io_error(&full, &e))?;
        let name = full
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(File {
            name,
            contents: Arc::from(contents),
        })
    }
}

/// Normalize a directory-relative path: drop empty and `.` segments, refuse
/// absolute paths and `..`.
pub(crate) fn normalize_path(path: &str) -> SpoolResult<String> {
    if path.starts_with('/') {
        return Err(SpoolError::client_invalid_path(path, "absolute paths are not allowed"));
    }

    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                return Err(SpoolError::client_invalid_path(path, "'..' segments are not allowed"));
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

fn ensure_parents(nodes: &mut BTreeMap<String, Node>, key: &str) -> SpoolResult<()> {
    for (idx, _) in key.match_indices('/') {
        let parent = &key[..idx];
        match nodes.get(parent) {
            Some(Node::File(_)) => {
                return Err(SpoolError::client_path_conflict(parent, "is a file, not a directory"));
            }
            Some(Node::Dir) => {}
            None => {
                nodes.insert(parent.to_string(), Node::Dir);
            }
        }
    }
    Ok(())
}

fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn host_path(dest: &Path, key: &str) -> PathBuf {
    key.split('/').fold(dest.to_path_buf(), |acc, part| acc.join(part))
}

fn create_dir_all(path: &Path) -> SpoolResult<()> {
    fs::create_dir_all(path).map_err(|e| io_error(path, &e))
}

fn io_error(path: &Path, err: &io::Error) -> SpoolError {
    let display = path.display().to_string();
    if err.kind() == io::ErrorKind::NotFound {
        SpoolError::client_not_found(&display)
    } else {
        SpoolError::client_io(&display, &err.to_string())
    }
}
