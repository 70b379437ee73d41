use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    audio: Audio,
    panic: Panic,
    stems: Stems,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
}

#[derive(Deserialize)]
struct Panic {
    marker_path: String,
}

#[derive(Deserialize)]
struct Stems {
    enabled: bool,
    model_path: String,
    bridge_local_port: u16,
    bridge_remote_port: u16,
    handshake_timeout_ms: u64,
    block_timeout_ms: u64,
}

// Read config.toml at build time and export it as rustc env vars
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // ALSA devices
    println!("cargo:rustc-env=CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=PLAYBACK_DEVICE={}", config.audio.playback_device);

    println!("cargo:rustc-env=PANIC_MARKER_PATH={}", config.panic.marker_path);

    // Stem separation bridge
    println!("cargo:rustc-env=STEMS_ENABLED={}", config.stems.enabled);
    println!("cargo:rustc-env=STEMS_MODEL_PATH={}", config.stems.model_path);
    println!("cargo:rustc-env=STEMS_LOCAL_PORT={}", config.stems.bridge_local_port);
    println!("cargo:rustc-env=STEMS_REMOTE_PORT={}", config.stems.bridge_remote_port);
    println!(
        "cargo:rustc-env=STEMS_HANDSHAKE_TIMEOUT_MS={}",
        config.stems.handshake_timeout_ms
    );
    println!(
        "cargo:rustc-env=STEMS_BLOCK_TIMEOUT_MS={}",
        config.stems.block_timeout_ms
    );
}
