use std::path::{Path, PathBuf};

/// A directory that is removed, with everything in it, when dropped.
pub struct TestDir {
    path: PathBuf,
}

impl TestDir {
    pub fn new<P>(path: P) -> Self
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir(&path).unwrap();
        Self { path }
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.path).unwrap();
    }
}

impl AsRef<Path> for TestDir {
    fn as_ref(&self) -> &Path {
        self.path.as_ref()
    }
}

/// A `TestDir` under /tmp whose name is unique per test invocation, so tests
/// can run in parallel without colliding.
pub fn unique_test_dir(prefix: &str) -> TestDir {
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let thread_id = std::thread::current().id();
    TestDir::new(format!("/tmp/heapstore_{prefix}_{timestamp}_{thread_id:?}"))
}
