use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::CoordError;
use crate::profile::ProfileKey;

/// Locations of every coordination file for one profile key.
#[derive(Clone, Debug)]
pub struct CoordPaths {
    dir: PathBuf,
    key: ProfileKey,
}

impl CoordPaths {
    /// Bind a coordination directory to a profile key, creating the
    /// directory if needed.
    pub fn new(dir: &Path, key: ProfileKey) -> Result<Self, CoordError> {
        fs::create_dir_all(dir).map_err(|source| CoordError::io(dir, source))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            key,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key(&self) -> &ProfileKey {
        &self.key
    }

    pub fn softlock(&self) -> PathBuf {
        self.stem("softlock.json")
    }

    pub fn softlock_mutex(&self) -> PathBuf {
        self.stem("softlock.mutex")
    }

    pub fn startup_mutex(&self) -> PathBuf {
        self.stem("startup.mutex")
    }

    pub fn window_registry(&self) -> PathBuf {
        self.stem("window_registry.json")
    }

    pub fn window_registry_mutex(&self) -> PathBuf {
        self.stem("window_registry.mutex")
    }

    pub fn rendezvous(&self) -> PathBuf {
        self.stem("rendezvous.json")
    }

    /// Every path that may exist on disk for this key. Used by the
    /// force-close path to wipe coordination state.
    pub fn all_files(&self) -> Vec<PathBuf> {
        vec![
            self.softlock(),
            self.softlock_mutex(),
            self.startup_mutex(),
            self.window_registry(),
            self.window_registry_mutex(),
            self.rendezvous(),
        ]
    }

    fn stem(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{suffix}", self.key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn files_are_namespaced_by_key() {
        let dir = tempdir().unwrap();
        let profile_a = dir.path().join("a");
        let profile_b = dir.path().join("b");
        let key_a = ProfileKey::derive(&profile_a, "Default", false).unwrap();
        let key_b = ProfileKey::derive(&profile_b, "Default", false).unwrap();
        let paths_a = CoordPaths::new(dir.path(), key_a).unwrap();
        let paths_b = CoordPaths::new(dir.path(), key_b).unwrap();

        for (a, b) in paths_a.all_files().iter().zip(paths_b.all_files()) {
            assert_ne!(*a, b);
        }
    }
}
