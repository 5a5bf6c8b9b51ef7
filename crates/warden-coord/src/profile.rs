use std::fmt;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::CoordError;

/// Stable identifier for a `(user_data_dir, profile_name)` pair.
///
/// Used as the filename stem of every coordination file, so all processes
/// driving the same profile converge on the same lock, registry and
/// rendezvous files while distinct profiles never collide.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ProfileKey(String);

impl ProfileKey {
    /// Derive the key from the configured profile location.
    ///
    /// The directory path is canonicalized for stability across processes
    /// that spell it differently; if canonicalization fails (the directory
    /// may not exist yet, the browser will create it) the absolutized
    /// lexical form is used instead. With `strict` set, a missing directory
    /// is an error.
    pub fn derive(
        user_data_dir: &Path,
        profile_name: &str,
        strict: bool,
    ) -> Result<Self, CoordError> {
        if user_data_dir.as_os_str().is_empty() {
            return Err(CoordError::EmptyUserDataDir);
        }
        if strict && !user_data_dir.exists() {
            return Err(CoordError::MissingProfile {
                path: user_data_dir.display().to_string(),
            });
        }

        let normalized = match std::fs::canonicalize(user_data_dir) {
            Ok(path) => path,
            Err(_) => {
                if user_data_dir.is_absolute() {
                    user_data_dir.to_path_buf()
                } else {
                    std::env::current_dir()
                        .map(|cwd| cwd.join(user_data_dir))
                        .unwrap_or_else(|_| user_data_dir.to_path_buf())
                }
            }
        };

        let profile = if profile_name.trim().is_empty() {
            "Default"
        } else {
            profile_name.trim()
        };

        let mut hasher = Sha256::new();
        hasher.update(normalized.display().to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(profile.as_bytes());
        let digest = hasher.finalize();
        Ok(Self(hex_string(&digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stable_across_calls() {
        let dir = tempdir().unwrap();
        let a = ProfileKey::derive(dir.path(), "Default", false).unwrap();
        let b = ProfileKey::derive(dir.path(), "Default", false).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn profiles_do_not_collide() {
        let dir = tempdir().unwrap();
        let a = ProfileKey::derive(dir.path(), "Default", false).unwrap();
        let b = ProfileKey::derive(dir.path(), "Profile 1", false).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_dir_is_rejected() {
        let err = ProfileKey::derive(Path::new(""), "Default", false).unwrap_err();
        assert!(matches!(err, CoordError::EmptyUserDataDir));
    }

    #[test]
    fn strict_mode_requires_existing_dir() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = ProfileKey::derive(&missing, "Default", true).unwrap_err();
        assert!(matches!(err, CoordError::MissingProfile { .. }));
        assert!(ProfileKey::derive(&missing, "Default", false).is_ok());
    }

    #[test]
    fn blank_profile_name_defaults() {
        let dir = tempdir().unwrap();
        let a = ProfileKey::derive(dir.path(), "  ", false).unwrap();
        let b = ProfileKey::derive(dir.path(), "Default", false).unwrap();
        assert_eq!(a, b);
    }
}
