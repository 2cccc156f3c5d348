//! Bucketed on-disk message layout: `<root>/<id / capacity>/<id>`, so a
//! store with millions of messages never puts more than `capacity` files
//! in one directory. Each write is atomic (temp file, then rename); each
//! read treats a corrupt file as absent rather than failing the caller.

use std::fs;
use std::path::{Path, PathBuf};

use landscape_schema::Value;

use crate::error::{Result, StoreError};
use crate::json;

pub fn bucket_of(id: u64, capacity: u64) -> u64 {
    id / capacity.max(1)
}

pub fn bucket_dir(root: &Path, bucket: u64) -> PathBuf {
    root.join(bucket.to_string())
}

pub fn message_path(root: &Path, id: u64, capacity: u64) -> PathBuf {
    bucket_dir(root, bucket_of(id, capacity)).join(id.to_string())
}

pub fn write_message(root: &Path, id: u64, capacity: u64, value: &Value) -> Result<()> {
    let dir = bucket_dir(root, bucket_of(id, capacity));
    fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    let path = dir.join(id.to_string());
    let bytes = serde_json::to_vec(&json::to_json(value)).map_err(StoreError::Serialize)?;

    let tmp_path = dir.join(format!("{id}.tmp-{}", std::process::id()));
    fs::write(&tmp_path, &bytes).map_err(|source| StoreError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, &path).map_err(|source| StoreError::Rename {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Read and decode a message file. A missing, unreadable, or malformed
/// file is logged and treated as absent -- corruption never propagates
/// to the caller.
pub fn read_message(path: &Path) -> Option<Value> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "could not read message file, treating as absent");
            return None;
        }
    };

    let json = match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(json) => json,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "message file is invalid JSON, skipping");
            return None;
        }
    };

    match json::from_json(&json) {
        Some(value) => Some(value),
        None => {
            tracing::warn!(path = %path.display(), "message file has an unrecognized shape, skipping");
            None
        }
    }
}

pub fn remove_message(root: &Path, id: u64, capacity: u64) {
    let dir = bucket_dir(root, bucket_of(id, capacity));
    let path = dir.join(id.to_string());
    if let Err(error) = fs::remove_file(&path) {
        if error.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), %error, "failed to remove message file");
        }
    }

    if let Ok(mut entries) = fs::read_dir(&dir) {
        if entries.next().is_none() {
            let _ = fs::remove_dir(&dir);
        }
    }
}

pub fn remove_all(root: &Path) {
    let _ = fs::remove_dir_all(root);
    let _ = fs::create_dir_all(root);
}

/// All message ids currently on disk, ascending.
pub fn list_message_ids(root: &Path) -> Vec<u64> {
    let mut ids = Vec::new();
    let Ok(buckets) = fs::read_dir(root) else {
        return ids;
    };

    for bucket in buckets.flatten() {
        if !bucket.path().is_dir() {
            continue;
        }
        let Ok(files) = fs::read_dir(bucket.path()) else {
            continue;
        };
        for file in files.flatten() {
            if let Some(name) = file.file_name().to_str() {
                if let Ok(id) = name.parse::<u64>() {
                    ids.push(id);
                }
            }
        }
    }

    ids.sort_unstable();
    ids
}
