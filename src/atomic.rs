//! Atomic file replacement for archives and sidecars.

use std::fs::{DirBuilder, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for unique temp file names within a process
static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Create `dir` and all of its parents with mode 0755, tolerating existing ones.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir)
}

fn temp_path_for(dest: &Path, unique_id: &str) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.tmp.{}", name, unique_id))
}

/// Atomically replace `dest` with whatever `fill` writes.
///
/// `fill` writes into a fresh temp file next to `dest`; only when it returns
/// `Ok` is the temp file renamed over `dest`. On error the temp file is
/// removed and `dest` is left exactly as it was.
pub fn atomic_write<T, E, F>(dest: &Path, fill: F) -> Result<T, E>
where
    F: FnOnce(&mut File) -> Result<T, E>,
    E: From<io::Error>,
{
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }

    let (temp_path, mut file) = loop {
        // {dest dir}/.{name}.tmp.{pid}.{counter}; retry if left over from a crash
        let counter = WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let unique_id = format!("{}.{}", std::process::id(), counter);
        let temp_path = temp_path_for(dest, &unique_id);

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
        {
            Ok(file) => break (temp_path, file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    };

    let value = match fill(&mut file) {
        Ok(value) => value,
        Err(e) => {
            drop(file);
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }
    };

    let synced = file.sync_all();
    drop(file);
    if let Err(e) = synced.and_then(|()| std::fs::rename(&temp_path, dest)) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(value)
}
