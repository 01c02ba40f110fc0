use std::path::PathBuf;

/// The configuration file used when SITEMAP_CONFIG is unset.
pub const DEFAULT_CONFIG_PATH: &str = "sitemap.json";

/// Path of the JSON sitemap configuration, from the env var SITEMAP_CONFIG.
pub fn config_path() -> PathBuf {
    config_path_from(std::env::var("SITEMAP_CONFIG").ok())
}

fn config_path_from(value: Option<String>) -> PathBuf {
    match value {
        Some(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}
