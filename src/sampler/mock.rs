//! In-memory mock filesystem for testing the sampler without a real `/proc`.

use super::fs::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Stores files and directories in memory, allowing tests to simulate
/// `/proc/[pid]/status` contents, including unreadable or missing files.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, String>,
    directories: HashSet<PathBuf>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();

        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }

        self.files.insert(path, content.into());
    }

    /// Adds a process entry under `/proc/<pid>/status` with the given
    /// resident and virtual sizes in kB.
    pub fn add_process_status(&mut self, pid: &str, rss_kb: u64, vsize_kb: u64) {
        let status = format!(
            "\
Name:\tleakfinder
State:\tS (sleeping)
Pid:\t4242
PPid:\t1
VmPeak:\t{peak:>8} kB
VmSize:\t{vsize_kb:>8} kB
VmRSS:\t{rss_kb:>8} kB
VmData:\t    2000 kB
Threads:\t1
voluntary_ctxt_switches:\t10
nonvoluntary_ctxt_switches:\t2
",
            peak = vsize_kb
        );
        self.add_file(format!("/proc/{}/status", pid), status);
    }

    /// A process whose `/proc/self/status` reports 8000 kB RSS and 25000 kB VSZ.
    pub fn typical_process() -> Self {
        let mut fs = Self::new();
        fs.add_process_status("self", 8000, 25000);
        fs
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("mock file not found: {}", path.display()),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }
}
