//! Device configuration: embedded defaults merged with an optional user file
//! at `<config dir>/fgen/config.toml`. A malformed user file is logged and
//! ignored.

use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    connection: ConnectionConfig,
    #[serde(default)]
    dispatch: DispatchConfig,
    #[serde(default)]
    lfo: LfoTimerConfig,
    #[serde(default)]
    arb: ArbConfig,
}

#[derive(Deserialize, Default)]
struct ConnectionConfig {
    resource: Option<String>,
    io_timeout_ms: Option<u32>,
    upload_timeout_ms: Option<u32>,
    settle_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct DispatchConfig {
    error_poll_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct LfoTimerConfig {
    tick_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct ArbConfig {
    copy_retries: Option<u32>,
    volatile_lost_code: Option<i32>,
}

pub struct Config {
    connection: ConnectionConfig,
    dispatch: DispatchConfig,
    lfo: LfoTimerConfig,
    arb: ArbConfig,
}

impl Default for Config {
    /// Embedded defaults only, no user overrides. What tests run against.
    fn default() -> Self {
        let base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("failed to parse embedded config.toml");
        Config {
            connection: base.connection,
            dispatch: base.dispatch,
            lfo: base.lfo,
            arb: base.arb,
        }
    }
}

impl Config {
    /// Embedded defaults merged with the user config file, if present.
    pub fn load() -> Self {
        let mut config = Config::default();
        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut config, user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }
        config
    }

    /// Default VISA resource string for connect.
    pub fn resource(&self) -> String {
        self.connection
            .resource
            .clone()
            .unwrap_or_else(|| "GPIB0::10::INSTR".to_string())
    }

    /// Short I/O timeout for normal commands, in milliseconds.
    pub fn io_timeout_ms(&self) -> u32 {
        self.connection.io_timeout_ms.unwrap_or(500)
    }

    /// Extended I/O timeout applied around bulk arb transfers.
    pub fn upload_timeout_ms(&self) -> u32 {
        self.connection.upload_timeout_ms.unwrap_or(10_000)
    }

    /// Pause after putting the instrument into remote mode.
    pub fn settle_ms(&self) -> u64 {
        self.connection.settle_ms.unwrap_or(50)
    }

    /// Period of the out-of-band error poll run by the dispatch worker.
    pub fn error_poll_ms(&self) -> u64 {
        self.dispatch.error_poll_ms.unwrap_or(500).max(10)
    }

    /// Software LFO tick interval.
    pub fn lfo_tick_ms(&self) -> u64 {
        self.lfo.tick_ms.unwrap_or(50).max(1)
    }

    /// Copy attempts (including retries after recovery) per upload.
    pub fn copy_retries(&self) -> u32 {
        self.arb.copy_retries.unwrap_or(3).clamp(1, 10)
    }

    /// Error code meaning the volatile staging area was lost before copy.
    pub fn volatile_lost_code(&self) -> i32 {
        self.arb.volatile_lost_code.unwrap_or(787)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fgen").join("config.toml"))
}

fn merge(base: &mut Config, user: ConfigFile) {
    if user.connection.resource.is_some() {
        base.connection.resource = user.connection.resource;
    }
    if user.connection.io_timeout_ms.is_some() {
        base.connection.io_timeout_ms = user.connection.io_timeout_ms;
    }
    if user.connection.upload_timeout_ms.is_some() {
        base.connection.upload_timeout_ms = user.connection.upload_timeout_ms;
    }
    if user.connection.settle_ms.is_some() {
        base.connection.settle_ms = user.connection.settle_ms;
    }
    if user.dispatch.error_poll_ms.is_some() {
        base.dispatch.error_poll_ms = user.dispatch.error_poll_ms;
    }
    if user.lfo.tick_ms.is_some() {
        base.lfo.tick_ms = user.lfo.tick_ms;
    }
    if user.arb.copy_retries.is_some() {
        base.arb.copy_retries = user.arb.copy_retries;
    }
    if user.arb.volatile_lost_code.is_some() {
        base.arb.volatile_lost_code = user.arb.volatile_lost_code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults() {
        let config = Config::default();
        assert_eq!(config.resource(), "GPIB0::10::INSTR");
        assert_eq!(config.io_timeout_ms(), 500);
        assert_eq!(config.upload_timeout_ms(), 10_000);
        assert_eq!(config.settle_ms(), 50);
        assert_eq!(config.error_poll_ms(), 500);
        assert_eq!(config.lfo_tick_ms(), 50);
        assert_eq!(config.copy_retries(), 3);
        assert_eq!(config.volatile_lost_code(), 787);
    }

    #[test]
    fn user_values_override_defaults() {
        let mut config = Config::default();
        let user: ConfigFile = toml::from_str(
            "[connection]\nresource = \"GPIB0::22::INSTR\"\n[lfo]\ntick_ms = 25\n",
        )
        .unwrap();
        merge(&mut config, user);
        assert_eq!(config.resource(), "GPIB0::22::INSTR");
        assert_eq!(config.lfo_tick_ms(), 25);
        // untouched sections keep their defaults
        assert_eq!(config.error_poll_ms(), 500);
    }

    #[test]
    fn silly_values_are_clamped() {
        let mut config = Config::default();
        let user: ConfigFile =
            toml::from_str("[arb]\ncopy_retries = 99\n[dispatch]\nerror_poll_ms = 0\n").unwrap();
        merge(&mut config, user);
        assert_eq!(config.copy_retries(), 10);
        assert_eq!(config.error_poll_ms(), 10);
    }
}
