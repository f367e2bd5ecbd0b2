//! Free disk space checks.

#[cfg(target_os = "windows")]
use std::path::Path;
use std::path::PathBuf;

/// Minimum free space required to start recording (50 MB).
pub const MIN_DISK_SPACE_BYTES: u64 = 50 * 1024 * 1024;

/// Warning threshold for low disk space (500 MB).
pub const LOW_DISK_SPACE_WARNING_BYTES: u64 = 500 * 1024 * 1024;

/// Storage status derived from free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    /// Plenty of storage available
    Ok,
    /// Storage is running low (warning threshold)
    Low,
    /// Storage is critically low (recording must not start)
    Critical,
    /// Unable to determine storage status
    Unknown,
}

impl StorageStatus {
    /// Classify a free-space reading against `minimum` bytes.
    pub fn classify(free_bytes: Option<u64>, minimum: u64) -> Self {
        match free_bytes {
            None => StorageStatus::Unknown,
            Some(free) if free < minimum => StorageStatus::Critical,
            Some(free) if free < LOW_DISK_SPACE_WARNING_BYTES.max(minimum) => StorageStatus::Low,
            Some(_) => StorageStatus::Ok,
        }
    }
}

/// Reports free space on the volume that holds the session data.
pub trait StorageProbe: Send + Sync {
    /// Free bytes available, `None` when it cannot be determined.
    fn free_bytes(&self) -> Option<u64>;
}

/// Probe backed by the operating system.
#[derive(Debug, Clone)]
pub struct DiskSpaceProbe {
    path: PathBuf,
}

impl DiskSpaceProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StorageProbe for DiskSpaceProbe {
    fn free_bytes(&self) -> Option<u64> {
        check_disk_space(&self.path.to_string_lossy())
    }
}

/// Probe that always reports a fixed amount.
#[derive(Debug, Clone, Copy)]
pub struct FixedSpaceProbe(pub Option<u64>);

impl StorageProbe for FixedSpaceProbe {
    fn free_bytes(&self) -> Option<u64> {
        self.0
    }
}

/// Check available disk space for a path.
fn check_disk_space(path: &str) -> Option<u64> {
    #[cfg(target_os = "windows")]
    {
        check_disk_space_windows(path)
    }
    #[cfg(not(target_os = "windows"))]
    {
        check_disk_space_unix(path)
    }
}

#[cfg(target_os = "windows")]
fn check_disk_space_windows(path: &str) -> Option<u64> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    // Get the drive letter from the path
    let path = Path::new(path);
    let root = path
        .components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .unwrap_or_else(|| "C:\\".to_string());

    let root = if root.ends_with('\\') || root.ends_with('/') {
        root
    } else {
        format!("{}\\", root)
    };

    let root_wide: Vec<u16> = OsStr::new(&root)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    let mut free_bytes_available: u64 = 0;
    let mut total_bytes: u64 = 0;
    let mut total_free_bytes: u64 = 0;

    // SAFETY: `root_wide` is NUL-terminated and the out-pointers are valid for the call.
    let result = unsafe {
        windows_sys::Win32::Storage::FileSystem::GetDiskFreeSpaceExW(
            root_wide.as_ptr(),
            &mut free_bytes_available,
            &mut total_bytes,
            &mut total_free_bytes,
        )
    };

    if result == 0 {
        tracing::warn!("Failed to get disk space for {}", root);
        return None;
    }

    Some(free_bytes_available)
}

#[cfg(not(target_os = "windows"))]
fn check_disk_space_unix(path: &str) -> Option<u64> {
    use std::mem::MaybeUninit;

    let path = std::ffi::CString::new(path).ok()?;
    let mut stat: MaybeUninit<libc::statvfs> = MaybeUninit::uninit();

    // SAFETY: `path` is NUL-terminated and `stat` is only read after success.
    let result = unsafe { libc::statvfs(path.as_ptr(), stat.as_mut_ptr()) };
    if result != 0 {
        tracing::warn!("Failed to get disk space");
        return None;
    }

    let stat = unsafe { stat.assume_init() };
    #[allow(clippy::unnecessary_cast)]
    let free_bytes = stat.f_bavail as u64 * stat.f_frsize as u64;
    Some(free_bytes)
}
