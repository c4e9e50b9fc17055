//! Named network namespaces.
//!
//! Named namespaces live as bind mounts under [`NETNS_RUN_DIR`], which keeps
//! them alive with no process inside and makes them interchangeable with the
//! ones `ip netns add` creates.
//!
//! ```ignore
//! use netns_keeper::netlink::namespace;
//!
//! if !namespace::exists("ha-test") {
//!     namespace::create("ha-test")?;
//! }
//! let conn = namespace::connection_for("ha-test")?;
//! let links = conn.get_links().await?;
//! ```

use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use super::connection::Connection;
use super::error::{Error, Result};
use crate::util::ifname;

/// The runtime directory where named network namespaces are stored.
pub const NETNS_RUN_DIR: &str = "/var/run/netns";

/// Path of the mount point backing a named namespace.
pub fn path_for(name: &str) -> PathBuf {
    PathBuf::from(NETNS_RUN_DIR).join(name)
}

/// Validate a namespace name before it is used as a path component.
pub fn validate_name(name: &str) -> Result<()> {
    ifname::validate_namespace(name).map_err(|e| Error::InvalidName {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Check whether a named namespace exists.
pub fn exists(name: &str) -> bool {
    validate_name(name).is_ok() && path_for(name).exists()
}

/// List named namespaces, sorted. A missing run directory means none.
pub fn list() -> Result<Vec<String>> {
    let entries = match fs::read_dir(NETNS_RUN_DIR) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::Io(e)),
    };

    let mut names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "." && name != "..")
        .collect();
    names.sort();
    Ok(names)
}

/// A handle to an open namespace file.
#[derive(Debug)]
pub struct NamespaceFd {
    file: File,
}

impl AsRawFd for NamespaceFd {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// Open a named namespace.
pub fn open(name: &str) -> Result<NamespaceFd> {
    validate_name(name)?;
    match File::open(path_for(name)) {
        Ok(file) => Ok(NamespaceFd { file }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NamespaceNotFound {
            name: name.to_string(),
        }),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Get a connection for a named network namespace.
pub fn connection_for(name: &str) -> Result<Connection> {
    let ns = open(name)?;
    Connection::new_in_namespace(ns.as_raw_fd())
}

/// Create a named network namespace.
///
/// Fails with [`Error::NamespaceExists`] if the name is taken by a live
/// namespace. A plain file left behind by an interrupted create is reused.
/// On any other failure the half-made mount point is removed again.
pub fn create(name: &str) -> Result<()> {
    validate_name(name)?;
    prepare_run_dir()?;

    let path = path_for(name);
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(&path)
    {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if is_mounted(&path) {
                return Err(Error::NamespaceExists {
                    name: name.to_string(),
                });
            }
            tracing::warn!(namespace = name, "reusing leftover namespace file");
        }
        Err(e) => return Err(Error::Io(e)),
    }

    // unshare() moves the calling thread into the new namespace, so do it on
    // a throwaway thread rather than on a runtime worker.
    let target = path.clone();
    let result = match std::thread::Builder::new()
        .name("netns-create".into())
        .spawn(move || bind_new_namespace(&target))
    {
        Ok(handle) => handle.join().unwrap_or_else(|_| {
            Err(Error::InvalidMessage(
                "namespace creation thread panicked".into(),
            ))
        }),
        Err(e) => Err(Error::Io(e)),
    };

    if let Err(e) = result {
        let _ = fs::remove_file(&path);
        return Err(e);
    }

    tracing::info!(namespace = name, "created network namespace");
    Ok(())
}

/// Delete a named network namespace.
///
/// Interfaces that were moved in are handed back to the host namespace by
/// the kernel once the last reference goes away; virtual ones are destroyed.
pub fn delete(name: &str) -> Result<()> {
    validate_name(name)?;
    let path = path_for(name);

    if !path.exists() {
        return Err(Error::NamespaceNotFound {
            name: name.to_string(),
        });
    }

    let c_path = c_path(&path)?;
    // SAFETY: c_path is a valid NUL-terminated path.
    if unsafe { libc::umount2(c_path.as_ptr(), libc::MNT_DETACH) } < 0 {
        tracing::debug!(
            namespace = name,
            error = %io::Error::last_os_error(),
            "umount of namespace file failed"
        );
    }

    fs::remove_file(&path)?;
    tracing::info!(namespace = name, "deleted network namespace");
    Ok(())
}

/// Whether `path` is a mounted namespace rather than a plain file.
pub fn is_mounted(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut stat = std::mem::MaybeUninit::<libc::statfs>::uninit();
    // SAFETY: the fd is open and stat points to writable memory of the right size.
    if unsafe { libc::fstatfs(file.as_raw_fd(), stat.as_mut_ptr()) } < 0 {
        return false;
    }
    // SAFETY: fstatfs succeeded, so the struct is initialised.
    let stat = unsafe { stat.assume_init() };
    stat.f_type as i64 == NSFS_MAGIC
}

const NSFS_MAGIC: i64 = 0x6e73_6673;

/// Make sure the run directory exists and is a shared mount point, so the
/// namespace mounts made here propagate into other mount namespaces.
fn prepare_run_dir() -> Result<()> {
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(NETNS_RUN_DIR)?;

    let dir = c_path(Path::new(NETNS_RUN_DIR))?;
    let none = c"none";

    loop {
        // SAFETY: all pointers are valid NUL-terminated strings or null.
        let ret = unsafe {
            libc::mount(
                c"".as_ptr(),
                dir.as_ptr(),
                none.as_ptr(),
                libc::MS_SHARED | libc::MS_REC,
                std::ptr::null(),
            )
        };
        if ret == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINVAL) {
            return Err(Error::Io(err));
        }

        // Not a mount point yet: bind it onto itself and try again.
        // SAFETY: as above.
        let ret = unsafe {
            libc::mount(
                dir.as_ptr(),
                dir.as_ptr(),
                none.as_ptr(),
                libc::MS_BIND | libc::MS_REC,
                std::ptr::null(),
            )
        };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
    }
}

fn bind_new_namespace(target: &Path) -> Result<()> {
    // SAFETY: unshare(CLONE_NEWNET) only changes the calling thread.
    if unsafe { libc::unshare(libc::CLONE_NEWNET) } < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }

    let source = c"/proc/thread-self/ns/net";
    let target = c_path(target)?;
    // SAFETY: source and target are valid NUL-terminated paths.
    let ret = unsafe {
        libc::mount(
            source.as_ptr(),
            target.as_ptr(),
            std::ptr::null(),
            libc::MS_BIND,
            std::ptr::null(),
        )
    };
    if ret < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| Error::InvalidName {
        name: path.display().to_string(),
        reason: "path contains NUL byte".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for() {
        assert_eq!(path_for("ha-test"), PathBuf::from("/var/run/netns/ha-test"));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("ns1").is_ok());
        assert!(matches!(
            validate_name("../etc"),
            Err(Error::InvalidName { .. })
        ));
        assert!(validate_name("").is_err());
    }

    #[test]
    fn test_exists_rejects_bad_names() {
        assert!(!exists(".."));
        assert!(!exists("definitely-not-a-namespace-7f3a"));
    }

    #[test]
    fn test_open_missing() {
        let err = open("definitely-not-a-namespace-7f3a").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_plain_file_is_not_mounted() {
        let dir = std::env::temp_dir().join(format!("nk-plain-{}", std::process::id()));
        fs::write(&dir, b"").unwrap();
        assert!(!is_mounted(&dir));
        fs::remove_file(&dir).unwrap();
        assert!(!is_mounted(&dir));
    }

    #[test]
    fn test_list_does_not_fail() {
        // Works whether or not the run directory exists on the test host.
        let names = list().unwrap();
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }
}
