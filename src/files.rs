//! File access roots
//!
//! Sessions register their working directory here so the file services of
//! the host may serve paths underneath it.

use std::path::{Path, PathBuf};

use dashmap::DashSet;

/// File access collaborator used by the session orchestrator
pub trait FileAccess: Send + Sync + std::fmt::Debug {
    /// Allow access to `path` and everything below it
    fn add_allowed_root(&self, path: &Path);

    /// Check whether `path` lies under an allowed root
    fn is_allowed(&self, path: &Path) -> bool;
}

/// In-memory set of allowed roots
#[derive(Debug, Default)]
pub struct AllowedRoots {
    roots: DashSet<PathBuf>,
}

impl AllowedRoots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots.iter().map(|r| r.key().clone()).collect()
    }
}

impl FileAccess for AllowedRoots {
    fn add_allowed_root(&self, path: &Path) {
        if self.roots.insert(path.to_path_buf()) {
            tracing::debug!(root = %path.display(), "Allowed file access root added");
        }
    }

    fn is_allowed(&self, path: &Path) -> bool {
        // Lexical check, so `..` components are rejected outright
        if path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return false;
        }
        self.roots.iter().any(|root| path.starts_with(root.key()))
    }
}
