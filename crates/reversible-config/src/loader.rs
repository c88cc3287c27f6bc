//! Layered configuration loading

use crate::RollbackConfig;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

const PROJECT_FILE: &str = "reversible.toml";
const LOCAL_FILE: &str = "reversible.local.toml";

/// Where a configuration file sits in the precedence chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerKind {
    /// `~/.config/reversible/config.toml` or the platform equivalent
    User,
    /// `reversible.toml`, tracked alongside the project
    Project,
    /// `reversible.local.toml`, untracked per-machine overrides
    Local,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::User => "user",
            Self::Project => "project",
            Self::Local => "local",
        })
    }
}

/// One candidate configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayer {
    pub kind: LayerKind,
    pub path: PathBuf,
}

impl ConfigLayer {
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// Merges built-in defaults, the file layers and `RVB_*` environment variables
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Loader rooted at the current directory
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "RVB".to_string(),
            include_user_config: true,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "RVB")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip the per-user file
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Candidate files, lowest precedence first. Missing files are listed too.
    pub fn layers(&self) -> Vec<ConfigLayer> {
        let user = self
            .include_user_config
            .then(user_config_file)
            .flatten()
            .map(|path| ConfigLayer {
                kind: LayerKind::User,
                path,
            });

        user.into_iter()
            .chain([
                ConfigLayer {
                    kind: LayerKind::Project,
                    path: self.project_dir.join(PROJECT_FILE),
                },
                ConfigLayer {
                    kind: LayerKind::Local,
                    path: self.project_dir.join(LOCAL_FILE),
                },
            ])
            .collect()
    }

    /// Merge every source and validate the result
    pub fn load(self) -> Result<RollbackConfig> {
        let defaults = config::Config::try_from(&RollbackConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        for layer in self.layers().into_iter().filter(ConfigLayer::exists) {
            builder =
                builder.add_source(config::File::from(layer.path).format(config::FileFormat::Toml));
        }

        // RVB_TOKENS__TTL_SECS=300
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let rollback_config: RollbackConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        rollback_config
            .validate()
            .context("Configuration failed validation")?;

        Ok(rollback_config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn user_config_file() -> Option<PathBuf> {
    ProjectDirs::from("rs", "Reversible", "reversible")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn hermetic(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("RVB_LOADER_TEST")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = hermetic(temp_dir.path())
            .load()
            .expect("Failed to load config");

        assert_eq!(config, RollbackConfig::default());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[tokens]
ttl_secs = 300

[windows]
default_max_age_hours = 24

[reasons]
min_len = 20
"#;
        fs::write(project_dir.join("reversible.toml"), config_content)
            .expect("Failed to write config");

        let config = hermetic(project_dir).load().expect("Failed to load config");

        assert_eq!(config.tokens.ttl_secs, 300);
        assert_eq!(config.windows.default_max_age_hours, 24);
        assert_eq!(config.reasons.min_len, 20);
        // Untouched keys keep their defaults
        assert_eq!(config.reasons.max_len, 500);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("reversible.toml"),
            "[tokens]\nttl_secs = 300\n",
        )
        .expect("Failed to write project config");
        fs::write(
            project_dir.join("reversible.local.toml"),
            "[tokens]\nttl_secs = 30\n",
        )
        .expect("Failed to write local config");

        let config = hermetic(project_dir).load().expect("Failed to load config");
        assert_eq!(config.tokens.ttl_secs, 30);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        fs::write(
            project_dir.join("reversible.toml"),
            "[reasons]\nmin_len = 900\nmax_len = 10\n",
        )
        .expect("Failed to write config");

        let err = hermetic(project_dir).load().unwrap_err();
        assert!(format!("{err:#}").contains("reasons.min_len"));
    }

    #[test]
    fn test_layers_in_precedence_order() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        fs::write(project_dir.join("reversible.local.toml"), "").expect("Failed to write");

        let layers = hermetic(project_dir).layers();
        let kinds: Vec<_> = layers.iter().map(|l| l.kind).collect();
        assert_eq!(kinds, vec![LayerKind::Project, LayerKind::Local]);
        assert_eq!(layers[0].path, project_dir.join("reversible.toml"));
        assert!(!layers[0].exists());
        assert!(layers[1].exists());
    }

    #[test]
    fn test_user_layer_comes_first_when_enabled() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let layers = ConfigLoader::new().with_project_dir(temp_dir.path()).layers();

        // Platform-dependent; only check the shape when discovery succeeds
        if layers.len() == 3 {
            assert_eq!(layers[0].kind, LayerKind::User);
            assert!(layers[0].path.ends_with("config.toml"));
        } else {
            assert_eq!(layers[0].kind, LayerKind::Project);
        }
    }

    // Environment overrides use a double underscore between section and key:
    //
    // RVB_TOKENS__TTL_SECS=120
    // RVB_WINDOWS__DEFAULT_MAX_AGE_HOURS=48
    //
    // They are not exercised here because the process environment is shared
    // across concurrently running tests.
}
