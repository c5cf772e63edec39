mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    prepare_tiers(&mut config.streaming);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./reelcast.toml",
        "~/.config/reelcast/config.toml",
        "/etc/reelcast/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Tier lookup takes the first match, so thresholds must be descending.
fn prepare_tiers(streaming: &mut StreamingConfig) {
    streaming
        .tiers
        .sort_by(|a, b| b.above_bytes.cmp(&a.above_bytes));
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if !config.media.root.exists() {
        tracing::warn!("Media root does not exist: {:?}", config.media.root);
    }

    if config.conversion.video_crf > 51 {
        anyhow::bail!(
            "Video CRF must be between 0 and 51, got {}",
            config.conversion.video_crf
        );
    }

    if config.conversion.video_preset.trim().is_empty() {
        anyhow::bail!("Video preset cannot be empty");
    }

    if config.conversion.audio_bitrate_kbps == 0 {
        anyhow::bail!("Audio bitrate cannot be 0");
    }

    if config.streaming.base_chunk_bytes == 0
        || config.streaming.tiers.iter().any(|t| t.chunk_bytes == 0)
    {
        anyhow::bail!("Streaming chunk sizes must be greater than 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cache.max_age_hours, 24);
        assert_eq!(config.conversion.video_preset, "fast");
        assert_eq!(config.conversion.video_crf, 23);
        assert_eq!(config.conversion.audio_bitrate_kbps, 128);
        assert!(!config.conversion.allow_hevc_copy);
    }

    #[test]
    fn test_chunk_size_tiers() {
        let streaming = StreamingConfig::default();
        assert_eq!(streaming.chunk_size(0), MIB);
        assert_eq!(streaming.chunk_size(500 * MIB), MIB);
        assert_eq!(streaming.chunk_size(500 * MIB + 1), 2 * MIB);
        assert_eq!(streaming.chunk_size(2 * GIB), 2 * MIB);
        assert_eq!(streaming.chunk_size(2 * GIB + 1), 3 * MIB);
        assert_eq!(streaming.chunk_size(5 * GIB + 1), 5 * MIB);
        assert_eq!(streaming.chunk_size(40 * GIB), 5 * MIB);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9000

[conversion]
video_crf = 20

[[streaming.tiers]]
above_bytes = 100
chunk_bytes = 10

[[streaming.tiers]]
above_bytes = 1000
chunk_bytes = 50
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.conversion.video_crf, 20);
        assert_eq!(config.conversion.video_preset, "fast");
        // Sorted descending on load.
        assert_eq!(config.streaming.tiers[0].above_bytes, 1000);
        assert_eq!(config.streaming.chunk_size(5000), 50);
        assert_eq!(config.streaming.chunk_size(500), 10);
        assert_eq!(config.streaming.chunk_size(50), MIB);
    }

    #[test]
    fn test_rejects_invalid_crf() {
        let mut config = Config::default();
        config.conversion.video_crf = 60;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }
}
