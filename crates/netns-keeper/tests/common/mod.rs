//! Common test utilities for integration tests.
//!
//! Provides `TestNamespace` for isolated network namespace testing
//! and helper macros for conditional test execution.

use netns_keeper::Result;
use netns_keeper::netlink::namespace;
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

/// Global counter for unique names.
static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate a unique namespace name for this test.
pub fn unique_ns_name(prefix: &str) -> String {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("nk-test-{}-{}-{}", prefix, std::process::id(), id)
}

/// Generate an interface name unique on this host (fits in IFNAMSIZ).
pub fn unique_ifname() -> String {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("nk{}x{}", std::process::id() % 100_000, id % 1000)
}

/// A test network namespace with automatic cleanup.
///
/// The namespace is created through the library itself and deleted when
/// the struct is dropped.
pub struct TestNamespace {
    name: String,
}

impl TestNamespace {
    /// Create a new test namespace with a unique name.
    pub fn new(prefix: &str) -> Result<Self> {
        let name = unique_ns_name(prefix);
        namespace::create(&name)?;
        Ok(Self { name })
    }

    /// Claim a name that does not exist yet; it is deleted on drop if a
    /// test created it.
    pub fn reserve(prefix: &str) -> Self {
        Self {
            name: unique_ns_name(prefix),
        }
    }

    /// Get the namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `ip -n <ns> ...` and fail the test on error.
    pub fn ip(&self, args: &[&str]) {
        let status = Command::new("ip")
            .args(["-n", &self.name])
            .args(args)
            .status()
            .expect("failed to run ip");
        assert!(status.success(), "ip {:?} failed in {}", args, self.name);
    }

    /// Add a veth pair in this namespace: `name` and its peer `<name>p`.
    pub fn add_veth(&self, name: &str) {
        let peer = format!("{}p", name);
        self.ip(&["link", "add", name, "type", "veth", "peer", "name", &peer]);
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        if namespace::exists(&self.name) {
            let _ = namespace::delete(&self.name);
        }
    }
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test if not running as root.
///
/// Use this at the beginning of integration tests that require root privileges.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names() {
        assert_ne!(unique_ns_name("a"), unique_ns_name("a"));
        assert!(unique_ifname().len() < 16);
    }
}
