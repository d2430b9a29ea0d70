use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use chrono::Utc;

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(1);

// ============== File Names ==============

/// Replace anything outside `[A-Za-z0-9._-]` so names are safe on disk.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    let trimmed = out.trim_start_matches('.');
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `stem_<ts>_<n>.ext` so concurrent downloads of equally named files never collide.
pub fn uniquify_filename(name: &str, ts: i64, n: usize) -> String {
    let base = sanitize_filename(name);
    if let Some((stem, ext)) = base.rsplit_once('.') {
        if !stem.is_empty() && !ext.is_empty() {
            return format!("{stem}_{ts}_{n}.{ext}");
        }
    }
    format!("{base}_{ts}_{n}")
}

/// Whether `name` carries the accepted plain-text suffix.
pub fn has_text_suffix(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".txt")
}

/// Human-readable byte count (`50 MiB`, `1.5 KiB`, `12 B`).
pub fn format_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if n < 1024 {
        return format!("{n} B");
    }
    let mut value = n as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value.fract() == 0.0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

// ============== Scratch Files ==============

/// A transient file under the bot's temp dir, removed when dropped.
///
/// Ingestion and full-content search buffer downloads here; the guard makes
/// deletion happen on every exit path, including early returns on error.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(dir: &Path, name: &str) -> Self {
        let ts = Utc::now().timestamp_millis();
        let n = SCRATCH_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self {
            path: dir.join(uniquify_filename(name, ts, n)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), "failed to remove scratch file: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_filename("my list (1).txt"), "my_list__1_.txt");
        assert_eq!(sanitize_filename("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_filename("..."), "document");
        assert_eq!(sanitize_filename(""), "document");
    }

    #[test]
    fn uniquifies_keeping_extension() {
        assert_eq!(uniquify_filename("list.txt", 42, 7), "list_42_7.txt");
        assert_eq!(uniquify_filename("README", 42, 7), "README_42_7");
    }

    #[test]
    fn text_suffix_is_case_insensitive() {
        assert!(has_text_suffix("domains.TXT"));
        assert!(has_text_suffix("a.b.txt"));
        assert!(!has_text_suffix("domains.csv"));
        assert!(!has_text_suffix("txt"));
    }

    #[test]
    fn formats_byte_counts() {
        assert_eq!(format_bytes(12), "12 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(50 * 1024 * 1024), "50 MiB");
    }

    #[test]
    fn scratch_file_is_removed_on_drop() {
        let dir = std::env::temp_dir();
        let path = {
            let scratch = ScratchFile::new(&dir, "drop-test.txt");
            std::fs::write(scratch.path(), b"x").unwrap();
            assert!(scratch.path().exists());
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
