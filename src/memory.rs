//! Process memory sampling
//!
//! The pipeline samples resident memory before and after each run. Samples
//! are process-wide, so deltas from concurrent runs overlap.

/// Current resident set size of this process in bytes (0 if unavailable)
pub fn resident_bytes() -> u64 {
    imp::resident_bytes().unwrap_or(0)
}

#[cfg(target_os = "linux")]
mod imp {
    /// Second field of `/proc/self/statm` is resident pages
    pub(super) fn resident_bytes() -> Option<u64> {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(pages.saturating_mul(page_size()))
    }

    fn page_size() -> u64 {
        // SAFETY: sysconf has no preconditions and only reads system configuration
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 { size as u64 } else { 4096 }
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
mod imp {
    /// Falls back to the peak resident size reported by getrusage
    pub(super) fn resident_bytes() -> Option<u64> {
        // SAFETY: usage is zero-initialized and only read after a successful call
        unsafe {
            let mut usage: libc::rusage = std::mem::zeroed();
            if libc::getrusage(libc::RUSAGE_SELF, &mut usage) != 0 {
                return None;
            }
            let max_rss = u64::try_from(usage.ru_maxrss).ok()?;
            // macOS reports bytes, the BSDs kilobytes
            if cfg!(target_os = "macos") {
                Some(max_rss)
            } else {
                Some(max_rss.saturating_mul(1024))
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub(super) fn resident_bytes() -> Option<u64> {
        None
    }
}

/// Signed difference `after - before`
pub fn delta(before: u64, after: u64) -> i64 {
    if after >= before {
        i64::try_from(after - before).unwrap_or(i64::MAX)
    } else {
        i64::try_from(before - after).map(|d| -d).unwrap_or(i64::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_signed() {
        assert_eq!(delta(100, 250), 150);
        assert_eq!(delta(250, 100), -150);
        assert_eq!(delta(7, 7), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn resident_bytes_is_nonzero_on_linux() {
        assert!(resident_bytes() > 0);
    }
}
