//! Build artifact store.
//!
//! # Responsibilities
//! - Read the bundler's output directory
//! - Keep an in-memory snapshot, swapped atomically after each rebuild
//! - Fingerprint the output so clients can tell builds apart
//!
//! # Design Decisions
//! - Readers never lock: the snapshot sits behind `ArcSwap`
//! - A missing output directory is an empty build, not an error
//! - Keys are `/`-separated paths relative to the root

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use arc_swap::ArcSwap;
use axum::body::Bytes;

/// A single file produced by the bundler.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub body: Bytes,
    pub content_type: String,
    pub etag: String,
}

impl Artifact {
    fn new(key: &str, body: Vec<u8>) -> Self {
        let mut hasher = DefaultHasher::new();
        body.hash(&mut hasher);
        Self {
            content_type: mime_guess::from_path(key)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
            etag: format!("\"{:016x}\"", hasher.finish()),
            body: Bytes::from(body),
        }
    }
}

/// Every artifact of one build.
#[derive(Debug, Default)]
pub struct Snapshot {
    files: HashMap<String, Artifact>,
    hash: String,
}

impl Snapshot {
    /// Read every file under `root`.
    pub fn scan(root: &Path) -> io::Result<Self> {
        let mut files = HashMap::new();
        for (key, path) in list_files(root)? {
            let body = match fs::read(&path) {
                Ok(body) => body,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            files.insert(key.clone(), Artifact::new(&key, body));
        }

        let mut keys: Vec<&String> = files.keys().collect();
        keys.sort();
        let mut hasher = DefaultHasher::new();
        for key in keys {
            key.hash(&mut hasher);
            files[key].etag.hash(&mut hasher);
        }
        let hash = if files.is_empty() {
            String::new()
        } else {
            format!("{:016x}", hasher.finish())
        };

        Ok(Self { files, hash })
    }

    pub fn get(&self, key: &str) -> Option<&Artifact> {
        self.files.get(key)
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Where artifacts are served from.
pub enum ArtifactStore {
    /// Read from disk on each request.
    Disk { root: PathBuf },
    /// Served from the latest snapshot.
    Memory {
        root: PathBuf,
        snapshot: ArcSwap<Snapshot>,
    },
}

impl ArtifactStore {
    pub fn disk(root: impl Into<PathBuf>) -> Self {
        ArtifactStore::Disk { root: root.into() }
    }

    pub fn memory(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        let snapshot = Snapshot::scan(&root)?;
        Ok(ArtifactStore::Memory {
            root,
            snapshot: ArcSwap::from_pointee(snapshot),
        })
    }

    pub fn root(&self) -> &Path {
        match self {
            ArtifactStore::Disk { root } | ArtifactStore::Memory { root, .. } => root,
        }
    }

    /// Current snapshot (memory stores only).
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        match self {
            ArtifactStore::Disk { .. } => None,
            ArtifactStore::Memory { snapshot, .. } => Some(snapshot.load_full()),
        }
    }

    /// Re-read the output directory and return the new build hash.
    pub fn refresh(&self) -> io::Result<String> {
        match self {
            ArtifactStore::Disk { root } => disk_hash(root),
            ArtifactStore::Memory { root, snapshot } => {
                let fresh = Snapshot::scan(root)?;
                let hash = fresh.hash().to_string();
                tracing::debug!(files = fresh.len(), hash = %hash, "Artifact snapshot refreshed");
                snapshot.store(Arc::new(fresh));
                Ok(hash)
            }
        }
    }
}

/// Fingerprint of the output directory from names, sizes and mtimes.
pub fn disk_hash(root: &Path) -> io::Result<String> {
    let files = list_files(root)?;
    if files.is_empty() {
        return Ok(String::new());
    }

    let mut hasher = DefaultHasher::new();
    for (key, path) in files {
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        key.hash(&mut hasher);
        meta.len().hash(&mut hasher);
        if let Ok(modified) = meta.modified() {
            if let Ok(since) = modified.duration_since(UNIX_EPOCH) {
                since.as_nanos().hash(&mut hasher);
            }
        }
    }
    Ok(format!("{:016x}", hasher.finish()))
}

/// All regular files under `root`, sorted by key.
fn list_files(root: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    if !root.is_dir() {
        return Ok(out);
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            // the bundler may delete directories while we walk
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                if let Ok(rel) = path.strip_prefix(root) {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    out.push((key, path));
                }
            }
        }
    }

    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}
