//! Interface and namespace name validation.

/// Maximum interface name length (including null terminator).
pub const IFNAMSIZ: usize = 16;

/// Maximum namespace name length (a file name under the netns run dir).
pub const NAME_MAX: usize = 255;

/// Error type for name validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("invalid interface name '{name}': {reason}")]
    Interface { name: String, reason: String },

    #[error("invalid namespace name '{name}': {reason}")]
    Namespace { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, NameError>;

fn interface_error(name: &str, reason: impl Into<String>) -> NameError {
    NameError::Interface {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn namespace_error(name: &str, reason: impl Into<String>) -> NameError {
    NameError::Namespace {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate an interface name the way the kernel's `dev_valid_name` does.
pub fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(interface_error(name, "empty name"));
    }

    if name.len() >= IFNAMSIZ {
        return Err(interface_error(
            name,
            format!("name too long (max {} chars)", IFNAMSIZ - 1),
        ));
    }

    if name == "." || name == ".." {
        return Err(interface_error(name, "reserved name"));
    }

    if name.contains('/') || name.contains(':') || name.contains('\0') {
        return Err(interface_error(name, "name contains invalid characters"));
    }

    if name.chars().any(|c| c.is_whitespace()) {
        return Err(interface_error(name, "name contains whitespace"));
    }

    Ok(())
}

/// Validate a named network namespace.
///
/// The name becomes a file under `/var/run/netns`, so it must be a single
/// path component.
pub fn validate_namespace(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(namespace_error(name, "empty name"));
    }

    if name.len() > NAME_MAX {
        return Err(namespace_error(
            name,
            format!("name too long (max {} bytes)", NAME_MAX),
        ));
    }

    if name == "." || name == ".." {
        return Err(namespace_error(name, "reserved name"));
    }

    if name.contains('/') || name.contains('\0') {
        return Err(namespace_error(name, "name contains invalid characters"));
    }

    if name.chars().any(|c| c.is_whitespace()) {
        return Err(namespace_error(name, "name contains whitespace"));
    }

    Ok(())
}
