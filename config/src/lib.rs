//! Environment configuration for the topology agent.
//!
//! Two file sources feed the process environment: the `[env]` table of
//! `$XDG_CONFIG_HOME/topology-agent/config.toml`, and a project-local `.env`.
//! Priority is **existing env > .env > XDG**: file values only fill keys the
//! process does not already carry, so an operator export always wins.
//! [`Settings::from_env`] then parses the `TOPOLOGY_AGENT_*` keys into a typed
//! struct.

mod dotenv;
mod settings;
mod xdg_toml;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use settings::{BackendKind, DeployEnv, Settings, SettingsError, ENV_PREFIX};

#[derive(Error, Debug)]
pub enum LoadError {
    /// No XDG config directory could be determined on this platform.
    #[error("cannot locate a config directory")]
    NoConfigDir,
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Fills the process environment from `config.toml` and `.env`.
///
/// The two sources are merged lowest-priority first (XDG values, then `.env`
/// shadowing them), and the merged keys are applied one by one, skipping any
/// key the environment already has.
///
/// * `app_name`: XDG directory name, e.g. `"topology-agent"`.
/// * `override_dir`: look for `.env` here instead of the current directory.
pub fn load_env(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let mut merged = xdg_toml::load_env_map(app_name)?;
    merged.extend(dotenv::read_env_file(override_dir)?);

    for (key, value) in merged {
        // Never clobber what the operator exported.
        if std::env::var_os(&key).is_none() {
            std::env::set_var(key, value);
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Mutex, MutexGuard};

    /// Tests that mutate process env must hold this; cargo runs tests on
    /// parallel threads and the environment is process-global.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    pub fn env_guard() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::env_guard;
    use std::env;

    fn with_xdg_home(dir: &Path, body: impl FnOnce()) {
        let previous = env::var_os("XDG_CONFIG_HOME");
        env::set_var("XDG_CONFIG_HOME", dir);
        body();
        match previous {
            Some(v) => env::set_var("XDG_CONFIG_HOME", v),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
    }

    fn write_xdg_config(root: &Path, app: &str, body: &str) {
        let app_dir = root.join(app);
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), body).unwrap();
    }

    #[test]
    fn existing_env_is_never_overwritten() {
        let _env = env_guard();
        let dotenv_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dotenv_dir.path().join(".env"),
            "TOPO_CFG_TEST_KEEP=from_file\n",
        )
        .unwrap();

        env::set_var("TOPO_CFG_TEST_KEEP", "from_operator");
        load_env("topology-agent", Some(dotenv_dir.path())).unwrap();
        let value = env::var("TOPO_CFG_TEST_KEEP");
        env::remove_var("TOPO_CFG_TEST_KEEP");

        assert_eq!(value.as_deref(), Ok("from_operator"));
    }

    #[test]
    fn no_config_anywhere_is_fine() {
        let _env = env_guard();
        let empty = tempfile::tempdir().unwrap();
        assert!(load_env("topology-agent-no-such-app-xyz", Some(empty.path())).is_ok());
    }

    #[test]
    fn dotenv_shadows_xdg_value() {
        let _env = env_guard();
        let xdg_root = tempfile::tempdir().unwrap();
        write_xdg_config(
            xdg_root.path(),
            "topology-agent",
            "[env]\nTOPO_CFG_TEST_SHADOW = \"from_xdg\"\n",
        );
        let dotenv_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dotenv_dir.path().join(".env"),
            "TOPO_CFG_TEST_SHADOW=from_dotenv\n",
        )
        .unwrap();

        env::remove_var("TOPO_CFG_TEST_SHADOW");
        with_xdg_home(xdg_root.path(), || {
            load_env("topology-agent", Some(dotenv_dir.path())).unwrap();
        });
        let value = env::var("TOPO_CFG_TEST_SHADOW");
        env::remove_var("TOPO_CFG_TEST_SHADOW");

        assert_eq!(value.as_deref(), Ok("from_dotenv"));
    }

    #[test]
    fn xdg_value_applies_without_dotenv() {
        let _env = env_guard();
        let xdg_root = tempfile::tempdir().unwrap();
        write_xdg_config(
            xdg_root.path(),
            "topology-agent",
            "[env]\nTOPO_CFG_TEST_XDG = \"from_xdg\"\n",
        );
        let empty = tempfile::tempdir().unwrap();

        env::remove_var("TOPO_CFG_TEST_XDG");
        with_xdg_home(xdg_root.path(), || {
            load_env("topology-agent", Some(empty.path())).unwrap();
        });
        let value = env::var("TOPO_CFG_TEST_XDG");
        env::remove_var("TOPO_CFG_TEST_XDG");

        assert_eq!(value.as_deref(), Ok("from_xdg"));
    }
}
