//! Admission control (§4.9): `check_status()` evaluates worker health
//! against configured resource limits before the ingress endpoint accepts a
//! new task.

use std::path::Path;
use std::sync::atomic::Ordering;

use crate::config::WorkerLimits;
use crate::worker::WorkerScheduler;

impl WorkerScheduler {
    /// Returns `false` if either background loop has died or any configured
    /// limit is exceeded. Pure with respect to scheduler state: it only
    /// reads.
    pub async fn check_status(&self) -> bool {
        if !self.dispatch_alive.load(Ordering::SeqCst) || !self.cleanup_alive.load(Ordering::SeqCst)
        {
            return false;
        }

        let limits = &self.config.backend.limits;
        let counts = self.state.lock().await.counts();

        if exceeds(counts.groups as u64, limits.max_groups) {
            return false;
        }
        if exceeds(counts.active_groups as u64, limits.max_active_groups) {
            return false;
        }
        if exceeds(counts.tasks as u64, limits.max_tasks) {
            return false;
        }
        if exceeds(counts.active_tasks as u64, limits.max_active_tasks) {
            return false;
        }

        self.check_disk_limits(limits).await
    }

    async fn check_disk_limits(&self, limits: &WorkerLimits) -> bool {
        let needs_worker_space =
            limits.max_worker_space_mb.is_some() || limits.max_worker_space_pct.is_some();
        let needs_disk_totals = needs_worker_space
            || limits.max_used_space_mb.is_some()
            || limits.max_used_space_pct.is_some()
            || limits.min_free_space_mb.is_some()
            || limits.min_free_space_pct.is_some();

        if !needs_disk_totals {
            return true;
        }

        let temp_dir = self.config.temp_dir().clone();
        let worker_bytes = if needs_worker_space {
            tokio::task::spawn_blocking({
                let temp_dir = temp_dir.clone();
                move || directory_size(&temp_dir)
            })
            .await
            .unwrap_or(0)
        } else {
            0
        };

        let disk = tokio::task::spawn_blocking(move || disk_usage(&temp_dir))
            .await
            .ok()
            .flatten();

        if let Some(max_mb) = limits.max_worker_space_mb {
            if worker_bytes >= max_mb.saturating_mul(1024 * 1024) {
                return false;
            }
        }

        let Some((total, free)) = disk else {
            return true;
        };
        if total == 0 {
            return true;
        }
        let used = total.saturating_sub(free);

        if let Some(max_pct) = limits.max_worker_space_pct {
            if (worker_bytes as f64 / total as f64) * 100.0 >= max_pct {
                return false;
            }
        }
        if let Some(max_mb) = limits.max_used_space_mb {
            if used >= max_mb.saturating_mul(1024 * 1024) {
                return false;
            }
        }
        if let Some(max_pct) = limits.max_used_space_pct {
            if (used as f64 / total as f64) * 100.0 >= max_pct {
                return false;
            }
        }
        if let Some(min_mb) = limits.min_free_space_mb {
            if free <= min_mb.saturating_mul(1024 * 1024) {
                return false;
            }
        }
        if let Some(min_pct) = limits.min_free_space_pct {
            if (free as f64 / total as f64) * 100.0 <= min_pct {
                return false;
            }
        }

        true
    }
}

fn exceeds(actual: u64, limit: Option<u64>) -> bool {
    matches!(limit, Some(max) if actual >= max)
}

/// Recursively sum file sizes under `path`.
fn directory_size(path: &Path) -> u64 {
    let mut total = 0u64;
    for entry in walkdir::WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            if let Ok(meta) = entry.metadata() {
                total += meta.len();
            }
        }
    }
    total
}

/// (total bytes, available bytes) for the filesystem backing `path`.
#[cfg(unix)]
fn disk_usage(path: &Path) -> Option<(u64, u64)> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;

    // SAFETY: c_path is a valid, null-terminated C string; stat is zeroed
    // before the call and only read after a successful return.
    unsafe {
        let mut stat: libc::statvfs = std::mem::zeroed();
        if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
            return None;
        }
        let total = stat.f_blocks.saturating_mul(stat.f_frsize);
        let free = stat.f_bavail.saturating_mul(stat.f_frsize);
        Some((total, free))
    }
}

#[cfg(windows)]
fn disk_usage(path: &Path) -> Option<(u64, u64)> {
    use std::os::windows::ffi::OsStrExt;
    use winapi::um::fileapi::GetDiskFreeSpaceExW;

    let wide_path: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    // SAFETY: wide_path is a valid, null-terminated wide string; all output
    // pointers point to valid, properly aligned u64 locals, read only after
    // a successful call.
    unsafe {
        let mut free_bytes_available: u64 = 0;
        let mut total_bytes: u64 = 0;
        let mut total_free_bytes: u64 = 0;

        if GetDiskFreeSpaceExW(
            wide_path.as_ptr(),
            &mut free_bytes_available as *mut u64 as *mut _,
            &mut total_bytes as *mut u64 as *mut _,
            &mut total_free_bytes as *mut u64 as *mut _,
        ) == 0
        {
            return None;
        }

        Some((total_bytes, free_bytes_available))
    }
}

#[cfg(not(any(unix, windows)))]
fn disk_usage(_path: &Path) -> Option<(u64, u64)> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exceeds_is_false_for_unset_limit() {
        assert!(!exceeds(1_000_000, None));
    }

    #[test]
    fn exceeds_triggers_at_or_above_limit() {
        assert!(!exceeds(4, Some(5)));
        assert!(exceeds(5, Some(5)));
        assert!(exceeds(6, Some(5)));
    }

    #[test]
    fn directory_size_sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), [0u8; 10]).unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("b"), [0u8; 20]).unwrap();
        assert_eq!(directory_size(dir.path()), 30);
    }
}
