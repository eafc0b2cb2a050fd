use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Trait for the read-only filesystem access the template source needs
pub trait FileSystem: Send + Sync {
    /// Read file contents as string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Check if path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Check if path is a file
    fn is_file(&self, path: &Path) -> bool;
}

/// Real filesystem implementation using std::fs
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// In-memory filesystem for tests. Seeding a file registers every ancestor
/// as a directory, so a template folder "exists" once any file lands in it.
#[allow(dead_code)]
pub struct MockFileSystem {
    files: RwLock<HashMap<PathBuf, String>>,
    directories: RwLock<HashSet<PathBuf>>,
}

#[allow(dead_code)]
impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            directories: RwLock::new(HashSet::new()),
        }
    }

    /// Builder-style helper for seeding a file
    pub fn with_file(self, path: impl AsRef<Path>, contents: &str) -> Self {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dirs(parent);
        }
        self.files
            .write()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_string());
        self
    }

    /// Builder-style helper for seeding an empty directory
    pub fn with_dir(self, path: impl AsRef<Path>) -> Self {
        self.add_dirs(path.as_ref());
        self
    }

    fn add_dirs(&self, path: &Path) {
        let mut directories = self.directories.write().unwrap();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            directories.insert(ancestor.to_path_buf());
        }
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.files
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .with_context(|| format!("File not found in mock filesystem: {:?}", path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.directories.read().unwrap().contains(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.read().unwrap().contains_key(path)
    }
}
