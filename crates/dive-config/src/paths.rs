//! Configuration file discovery.
//!
//! Files are listed lowest precedence first: the user's defaults, the
//! instance's `dive.toml`, then the untracked `dive.local.toml`.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::ConfigError;

pub const INSTANCE_FILE: &str = "dive.toml";
pub const LOCAL_FILE: &str = "dive.local.toml";
const USER_FILE: &str = "config.toml";

/// The configuration files of one instance directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFiles {
    /// `~/.config/dive/config.toml`, when the platform has a config home.
    pub user: Option<PathBuf>,
    pub instance: PathBuf,
    pub local: PathBuf,
}

impl ConfigFiles {
    pub fn discover(instance_dir: impl AsRef<Path>) -> Self {
        let user = user_config_dir().ok().map(|dir| dir.join(USER_FILE));
        Self::with_user_file(instance_dir, user)
    }

    /// Like [`discover`](Self::discover) with an explicit user file.
    pub fn with_user_file(instance_dir: impl AsRef<Path>, user: Option<PathBuf>) -> Self {
        let dir = instance_dir.as_ref();
        Self {
            user,
            instance: dir.join(INSTANCE_FILE),
            local: dir.join(LOCAL_FILE),
        }
    }

    /// Files that exist, in merge order.
    pub fn existing(&self) -> Vec<&Path> {
        self.user
            .iter()
            .map(PathBuf::as_path)
            .chain([self.instance.as_path(), self.local.as_path()])
            .filter(|path| path.is_file())
            .collect()
    }
}

/// `~/.config/dive` (or the platform equivalent).
pub fn user_config_dir() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from("org", "DIVE", "dive")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| ConfigError::XdgError("no home directory for user configuration".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_user_dir_is_namespaced() {
        // Platform dependent; must not panic
        if let Ok(dir) = user_config_dir() {
            assert!(dir.to_string_lossy().contains("dive"));
        }
    }

    #[test]
    fn test_existing_files_in_merge_order() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path();
        let user = dir.join("user.toml");
        let files = ConfigFiles::with_user_file(dir, Some(user.clone()));

        assert!(files.existing().is_empty());

        fs::write(dir.join(LOCAL_FILE), "").unwrap();
        fs::write(&user, "").unwrap();
        fs::write(dir.join(INSTANCE_FILE), "").unwrap();

        assert_eq!(
            files.existing(),
            vec![user.as_path(), files.instance.as_path(), files.local.as_path()]
        );
    }

    #[test]
    fn test_directory_named_like_config_is_skipped() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::create_dir(temp_dir.path().join(INSTANCE_FILE)).unwrap();

        let files = ConfigFiles::with_user_file(temp_dir.path(), None);
        assert!(files.existing().is_empty());
    }
}
