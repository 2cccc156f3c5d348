//! A small in-memory key/value tree with atomic disk flush, namespaced so
//! that unrelated components can share one file without colliding.

mod error;
mod nav;
mod value;

pub use error::{PersistError, Result};
pub use value::PersistValue;

use std::{
    cell::RefCell,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

struct Inner {
    path: Option<PathBuf>,
    root: PersistValue,
}

/// The root of a persisted tree.
///
/// Cloning a `Persist` is cheap and shares the same underlying tree (it is
/// an `Rc<RefCell<_>>` handle) -- this lets `root_at` hand out namespaced
/// views that still flush through the same `save()`.
#[derive(Clone)]
pub struct Persist {
    inner: Rc<RefCell<Inner>>,
}

impl Persist {
    pub fn new() -> Self {
        Persist {
            inner: Rc::new(RefCell::new(Inner {
                path: None,
                root: nav::empty_root(),
            })),
        }
    }

    /// Load a persisted tree from `path`. A missing file yields an empty,
    /// unsaved tree. A corrupted file also yields an empty tree: the error
    /// is logged and the next `save()` silently overwrites the garbage.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let root = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "persist file is corrupted, starting from an empty tree");
                    nav::empty_root()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => nav::empty_root(),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "could not read persist file, starting from an empty tree");
                nav::empty_root()
            }
        };
        Persist {
            inner: Rc::new(RefCell::new(Inner {
                path: Some(path),
                root,
            })),
        }
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.inner.borrow_mut().path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Atomically flush the tree to its configured file (write to a
    /// temporary file in the same directory, then rename over the target so
    /// a crash mid-write never leaves a half-written file visible).
    pub fn save(&self) -> Result<()> {
        let inner = self.inner.borrow();
        let path = match &inner.path {
            Some(path) => path.clone(),
            None => return Ok(()),
        };
        let bytes = serde_json::to_vec_pretty(&inner.root).map_err(PersistError::Serialize)?;
        let tmp_path = path.with_extension(format!("tmp-{}", std::process::id()));
        fs::write(&tmp_path, &bytes).map_err(|source| PersistError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &path).map_err(|source| PersistError::Rename {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<PersistValue> {
        nav::get(&self.inner.borrow().root, path).cloned()
    }

    pub fn set(&self, path: &str, value: impl Into<PersistValue>) {
        nav::set(&mut self.inner.borrow_mut().root, path, value.into());
    }

    pub fn add(&self, path: &str, value: impl Into<PersistValue>) {
        nav::add(&mut self.inner.borrow_mut().root, path, value.into());
    }

    pub fn remove(&self, path: &str) -> Option<PersistValue> {
        nav::remove(&mut self.inner.borrow_mut().root, path)
    }

    /// Return a view rooted at `prefix`: `view.get("x")` is equivalent to
    /// `self.get("<prefix>.x")`. The view shares this tree's storage and
    /// flushes through the same `save()`.
    pub fn root_at(&self, prefix: &str) -> PersistView {
        PersistView {
            persist: self.clone(),
            prefix: prefix.to_string(),
        }
    }
}

impl Default for Persist {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct PersistView {
    persist: Persist,
    prefix: String,
}

impl PersistView {
    fn full_path(&self, path: &str) -> String {
        if path.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}.{}", self.prefix, path)
        }
    }

    pub fn get(&self, path: &str) -> Option<PersistValue> {
        self.persist.get(&self.full_path(path))
    }

    pub fn set(&self, path: &str, value: impl Into<PersistValue>) {
        self.persist.set(&self.full_path(path), value)
    }

    pub fn add(&self, path: &str, value: impl Into<PersistValue>) {
        self.persist.add(&self.full_path(path), value)
    }

    pub fn remove(&self, path: &str) -> Option<PersistValue> {
        self.persist.remove(&self.full_path(path))
    }

    pub fn root_at(&self, prefix: &str) -> PersistView {
        PersistView {
            persist: self.persist.clone(),
            prefix: self.full_path(prefix),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.persist.save()
    }
}
