//! Process-wide configuration, read once from the environment at
//! `Tracer::init` the same way the original reads `OMNISCIO_DISABLE` and
//! `OMNISCIO_DIRECTORY`.

use std::path::PathBuf;

/// Configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Set when `OMNISCIO_DISABLE` is present, regardless of its value.
    pub disabled: bool,
    /// Directory output files are written to; defaults to the current
    /// working directory when `OMNISCIO_DIRECTORY` is unset.
    pub directory: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            disabled: std::env::var_os("OMNISCIO_DISABLE").is_some(),
            directory: std::env::var_os("OMNISCIO_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disabled: false,
            directory: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `from_env` reads process-wide state; serialize the tests that touch
    // it so they don't observe each other's env var mutations.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        std::env::remove_var("OMNISCIO_DISABLE");
        std::env::remove_var("OMNISCIO_DIRECTORY");
    }

    #[test]
    fn defaults_to_enabled_and_current_directory() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let config = Config::from_env();
        assert!(!config.disabled);
        assert_eq!(config.directory, PathBuf::from("."));
        clear_env();
    }

    #[test]
    fn disable_var_presence_disables_regardless_of_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("OMNISCIO_DISABLE", "0");
        let config = Config::from_env();
        assert!(config.disabled);
        clear_env();
    }

    #[test]
    fn directory_var_overrides_the_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("OMNISCIO_DIRECTORY", "/tmp/omniscio-trace");
        let config = Config::from_env();
        assert_eq!(config.directory, PathBuf::from("/tmp/omniscio-trace"));
        clear_env();
    }
}
