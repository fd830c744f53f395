use crate::error::Result;
use bincode::Options;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Largest cache file we will read back. Anything bigger is treated as corrupt.
pub const MAX_CACHE_FILE_BYTES: usize = 32 * 1024 * 1024;

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

fn bincode_options() -> impl bincode::Options + Copy {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode_options().serialize(value)?)
}

pub(crate) fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    Ok(bincode_options()
        .with_limit(MAX_CACHE_FILE_BYTES as u64)
        .deserialize(bytes)?)
}

/// Lowercase hex MD5 of `text`.
pub fn md5_hex(text: &str) -> String {
    hex::encode(Md5::digest(text.as_bytes()))
}

/// First `max_chars` characters of `name`.
pub fn truncate_name(name: &str, max_chars: usize) -> &str {
    match name.char_indices().nth(max_chars) {
        Some((end, _)) => &name[..end],
        None => name,
    }
}

/// Reads a cache file, returning `None` for missing, oversized or non-regular files.
pub(crate) fn read_cache_file(path: &Path) -> Option<Vec<u8>> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target: "nbgradle.cache",
                    path = %path.display(),
                    error = %err,
                    "failed to stat model cache file"
                );
            }
            return None;
        }
    };
    if !meta.is_file() || meta.len() > MAX_CACHE_FILE_BYTES as u64 {
        remove_best_effort(path, "unreadable");
        return None;
    }

    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            tracing::debug!(
                target: "nbgradle.cache",
                path = %path.display(),
                error = %err,
                "failed to read model cache file"
            );
            None
        }
    }
}

pub(crate) fn remove_best_effort(path: &Path, reason: &'static str) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::debug!(
                target: "nbgradle.cache",
                path = %path.display(),
                reason,
                error = %err,
                "failed to remove model cache file"
            );
            false
        }
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().contains(".tmp."))
}

/// Writes `bytes` to a sibling temporary file and renames it over `path`.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let (tmp_path, mut file) = create_temp_file(path, parent)?;
    let written = file.write_all(bytes).and_then(|()| file.sync_all());
    drop(file);
    if let Err(err) = written {
        remove_best_effort(&tmp_path, "write failed");
        return Err(err.into());
    }

    if let Err(err) = rename_replacing(&tmp_path, path) {
        remove_best_effort(&tmp_path, "rename failed");
        return Err(err.into());
    }

    #[cfg(unix)]
    if let Err(err) = fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        tracing::trace!(
            target: "nbgradle.cache",
            dir = %parent.display(),
            error = %err,
            "failed to sync model cache directory"
        );
    }
    Ok(())
}

fn rename_replacing(from: &Path, to: &Path) -> io::Result<()> {
    const MAX_ATTEMPTS: usize = 64;
    let mut attempts = 0;
    loop {
        match fs::rename(from, to) {
            Ok(()) => return Ok(()),
            // `rename` does not replace an existing file on Windows.
            Err(err) if cfg!(windows) && to.exists() && attempts < MAX_ATTEMPTS => {
                attempts += 1;
                match fs::remove_file(to) {
                    Ok(()) => {}
                    Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                    Err(_) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn create_temp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("cache destination has no file name"))?;
    let pid = std::process::id();
    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}
