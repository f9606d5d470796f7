//! Input validation for issue ids and declared file paths.
//!
//! Issue ids become directory names under the worktree root and branch names
//! under `weave/`, so they are validated before any path is built from them.

use anyhow::{bail, Result};
use std::path::{Component, Path};

/// Maximum allowed length for issue ids.
pub const MAX_ID_LENGTH: usize = 128;

/// Reserved names that cannot be used as IDs (case-insensitive).
const RESERVED_NAMES: &[&str] = &[
    ".", "..", "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
    "com8", "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Validates that an ID is safe for use in file paths and branch names.
///
/// An ID is valid if:
/// - It is not empty
/// - It is no longer than MAX_ID_LENGTH characters
/// - It contains only alphanumeric characters, dashes, and underscores
/// - It does not use reserved system names
///
/// # Examples
///
/// ```
/// use weave::validation::validate_id;
///
/// assert!(validate_id("ISSUE-042").is_ok());
/// assert!(validate_id("").is_err());
/// assert!(validate_id("../etc/passwd").is_err());
/// ```
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("ID cannot be empty");
    }

    if id.len() > MAX_ID_LENGTH {
        bail!(
            "ID too long: {} characters (max {})",
            id.len(),
            MAX_ID_LENGTH
        );
    }

    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid_chars {
        bail!("ID '{id}' contains invalid characters. Use only alphanumeric characters, dashes (-), and underscores (_)");
    }

    let id_lower = id.to_lowercase();
    if RESERVED_NAMES.contains(&id_lower.as_str()) {
        bail!("ID '{id}' uses a reserved name");
    }

    Ok(())
}

/// Normalize a declared repository-relative path.
///
/// Strips `./` and duplicate separators so that `./src//a.rs` and `src/a.rs`
/// compare equal. Absolute paths and `..` components are rejected because
/// they cannot name a file inside the repository.
pub fn normalize_repo_path(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("File path cannot be empty");
    }

    let mut parts = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => {}
            Component::ParentDir => bail!("File path '{raw}' escapes the repository"),
            Component::RootDir | Component::Prefix(_) => {
                bail!("File path '{raw}' must be relative to the repository root")
            }
        }
    }

    if parts.is_empty() {
        bail!("File path '{raw}' does not name a file");
    }

    Ok(parts.join("/"))
}

/// Clap value parser for validating ID arguments.
pub fn clap_id_validator(s: &str) -> Result<String, String> {
    validate_id(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}
