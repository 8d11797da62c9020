use std::time::Duration;

/// Options controlling how a file-backed store is opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenOptions {
    /// How long to keep retrying while another handle holds the file lock.
    pub timeout: Duration,
    /// Delay between lock attempts.
    pub poll_interval: Duration,
    /// Create the file when it does not exist. When `false`, opening a
    /// missing file is an error.
    pub create: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            create: false,
        }
    }
}

impl OpenOptions {
    /// Default options: one second lock timeout, open existing files only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lock acquisition timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the delay between lock attempts.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Allow or forbid creating a missing file.
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }
}
