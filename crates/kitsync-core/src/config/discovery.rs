//! Configuration file discovery from multiple locations

use std::path::{Path, PathBuf};

/// Project-local override file name
pub const LOCAL_CONFIG_NAME: &str = ".kitsync.local.toml";

/// Project config file name
pub const PROJECT_CONFIG_NAME: &str = ".kitsync.toml";

/// Configuration file locations in order of precedence
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigFiles {
    /// Config from CLI flag (highest precedence)
    pub cli: Option<PathBuf>,
    /// Project-local config (.kitsync.local.toml)
    pub local: Option<PathBuf>,
    /// Project config (.kitsync.toml)
    pub project: Option<PathBuf>,
    /// Global XDG config
    pub global: Option<PathBuf>,
}

/// Config file discovery
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover configuration files, searching upward from the current directory
    #[must_use]
    pub fn discover(cli_path: Option<&Path>) -> ConfigFiles {
        let start = std::env::current_dir().ok();
        Self::discover_from(cli_path, start.as_deref(), dirs::config_dir().as_deref())
    }

    /// Discover configuration files from explicit starting points
    ///
    /// `start` is where the upward search begins and `config_dir` is the
    /// user configuration directory. Either may be absent.
    #[must_use]
    pub fn discover_from(
        cli_path: Option<&Path>,
        start: Option<&Path>,
        config_dir: Option<&Path>,
    ) -> ConfigFiles {
        let cli = cli_path.map(Path::to_path_buf);
        let local = start.and_then(|dir| Self::find_file(dir, LOCAL_CONFIG_NAME));
        let project = start.and_then(|dir| Self::find_file(dir, PROJECT_CONFIG_NAME));
        let global = config_dir.and_then(Self::find_global_config);

        ConfigFiles {
            cli,
            local,
            project,
            global,
        }
    }

    /// Find a config file in `start` or its ancestors
    fn find_file(start: &Path, name: &str) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    fn find_global_config(config_dir: &Path) -> Option<PathBuf> {
        let global_config = config_dir.join("kitsync").join("config.toml");
        global_config.is_file().then_some(global_config)
    }
}
