use crate::error::PrismError;

#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: &'static str,
    pub app_version: &'static str,

    // ALSA devices
    pub capture_device: &'static str,
    pub playback_device: &'static str,

    /// File whose existence signals the emergency condition.
    pub panic_marker_path: &'static str,

    // Stem separation bridge
    pub stems_enabled: bool,
    pub stems_model_path: &'static str,
    pub stems_local_port: u16,
    pub stems_remote_port: u16,
    pub stems_handshake_timeout_ms: u64,
    pub stems_block_timeout_ms: u64,
}

impl Config {
    /// Build the configuration from the env vars exported by `build.rs`.
    /// Every value originates from `config.toml` at compile time.
    pub fn new() -> Result<Self, PrismError> {
        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            capture_device: env!("CAPTURE_DEVICE"),
            playback_device: env!("PLAYBACK_DEVICE"),

            panic_marker_path: env!("PANIC_MARKER_PATH"),

            stems_enabled: env!("STEMS_ENABLED").parse()
                .map_err(|_| PrismError::Config("Failed to parse STEMS_ENABLED"))?,
            stems_model_path: env!("STEMS_MODEL_PATH"),
            stems_local_port: env!("STEMS_LOCAL_PORT").parse()
                .map_err(|_| PrismError::Config("Failed to parse STEMS_LOCAL_PORT"))?,
            stems_remote_port: env!("STEMS_REMOTE_PORT").parse()
                .map_err(|_| PrismError::Config("Failed to parse STEMS_REMOTE_PORT"))?,
            stems_handshake_timeout_ms: env!("STEMS_HANDSHAKE_TIMEOUT_MS").parse()
                .map_err(|_| PrismError::Config("Failed to parse STEMS_HANDSHAKE_TIMEOUT_MS"))?,
            stems_block_timeout_ms: env!("STEMS_BLOCK_TIMEOUT_MS").parse()
                .map_err(|_| PrismError::Config("Failed to parse STEMS_BLOCK_TIMEOUT_MS"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_time_config_parses() {
        let config = Config::new().expect("config");
        assert!(!config.panic_marker_path.is_empty());
        assert!(config.stems_block_timeout_ms > 0);
    }
}
