use crate::debugger::error::Error;
use crate::{muted_error, weak_error};
use log::error;
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::PathBuf;
use std::time::Duration;
use strum_macros::{Display, EnumString};

/// Way to stop a running debuggee.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InterruptStrategy {
    /// SIGINT to every debuggee process, gdb reports a `signal-received` stop.
    #[default]
    Signal,
    /// `exec-interrupt --all`, requires gdb in async mode.
    Mi,
}

/// Debugger core configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// gdb binary, a bare name is resolved through `PATH`.
    pub gdb_path: String,
    pub gdb_args: Vec<String>,
    /// Console commands executed once in every new gdb.
    pub init_commands: Vec<String>,
    pub interrupt: InterruptStrategy,
    /// Run several debuggees in one gdb instead of one gdb per debuggee.
    pub multi_inferior: bool,
    /// Do not shut down the last gdb when its debuggee is gone.
    pub keep_warm_backend: bool,
    /// Symbol where a launched debuggee is stopped first.
    pub entry_symbol: String,
    /// Symbol that marks a process waiting in the bootstrap launcher.
    pub launcher_sentinel: String,
    pub poll_interval_ms: u64,
    pub reader_shutdown_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gdb_path: "gdb".to_string(),
            gdb_args: vec!["-n".into(), "--interpreter".into(), "mi3".into()],
            init_commands: [
                "set width 0",
                "set height 0",
                "set breakpoint pending off",
                "set confirm off",
                "set interactive-mode off",
                "set inferior-events on",
            ]
            .into_iter()
            .map(ToString::to_string)
            .collect(),
            interrupt: InterruptStrategy::Signal,
            multi_inferior: false,
            keep_warm_backend: true,
            entry_symbol: "main".to_string(),
            launcher_sentinel: "__gdbmux_launcher_waiting".to_string(),
            poll_interval_ms: 10,
            reader_shutdown_timeout_ms: 1000,
        }
    }
}

impl Config {
    const DEFAULT_PATH: &'static str = ".config/gdbmux/config.toml";

    /// Load configuration from file. Return [`None`] on errors.
    ///
    /// # Arguments
    ///
    /// * `path`: path to a toml file, `~/.config/gdbmux/config.toml` if `None`
    pub fn from_file(path: Option<&str>) -> Option<Self> {
        let data = match path {
            None => {
                let path = home::home_dir()?;
                let path = path.join(Self::DEFAULT_PATH);
                muted_error!(read_to_string(path))?
            }
            Some(path) => match read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    error!("Error while load config file: {err}");
                    return None;
                }
            },
        };

        weak_error!(toml::de::from_str(&data))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn reader_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_shutdown_timeout_ms)
    }

    /// Resolve the gdb binary.
    pub fn locate_gdb(&self) -> Result<PathBuf, Error> {
        which::which(&self.gdb_path).map_err(|e| Error::NotFound(format!("gdb `{}` ({e})", self.gdb_path)))
    }
}
