use std::path::{Path, PathBuf};

use compass_core::config::{self, CompassConfig};
use miette::{IntoDiagnostic, Result};
use owo_colors::OwoColorize;

use crate::output::Output;

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfigSource {
    Explicit(PathBuf),
    Found(PathBuf),
    Defaults,
}

impl ConfigSource {
    fn resolve(explicit: Option<&Path>, candidates: &[PathBuf], exists: impl Fn(&Path) -> bool) -> Self {
        if let Some(path) = explicit {
            return Self::Explicit(path.to_path_buf());
        }
        candidates
            .iter()
            .find(|p| exists(p))
            .map(|p| Self::Found(p.clone()))
            .unwrap_or(Self::Defaults)
    }

    fn describe(&self) -> String {
        match self {
            Self::Explicit(path) => format!("{} (--config)", path.display()),
            Self::Found(path) => path.display().to_string(),
            Self::Defaults => "built-in defaults".to_string(),
        }
    }
}

/// The settings people most often need to check, in display order
fn key_settings(config: &CompassConfig) -> Vec<(&'static str, String)> {
    vec![
        ("Server", config.server.base_url.clone()),
        (
            "Request timeout",
            config
                .server
                .request_timeout_secs
                .map(|s| format!("{s}s"))
                .unwrap_or_else(|| "none".to_string()),
        ),
        ("Status poll", format!("every {}s", config.server.status_poll_interval_secs)),
        ("Data directory", config.storage.path.display().to_string()),
        ("Emergency number", config.fallback.emergency_number.clone()),
        ("Opener", config.fallback.opener.clone()),
        ("SOS countdown", format!("{}s", config.sos.countdown_secs)),
    ]
}

/// Show where the configuration came from, the settings in effect, and the
/// full TOML
pub async fn show(config: &CompassConfig, explicit: Option<&Path>) -> Result<()> {
    let output = Output::new();
    let candidates = config::config_paths();
    let source = ConfigSource::resolve(explicit, &candidates, Path::exists);

    output.section("Configuration");
    output.kv("Loaded from", &source.describe());
    for (key, value) in key_settings(config) {
        output.kv(key, &value);
    }

    output.section("Search Order");
    for path in &candidates {
        if source == ConfigSource::Found(path.clone()) {
            output.list_item(&format!("{} {}", path.display(), "(in use)".bright_green()));
        } else {
            output.list_item(&path.display().to_string());
        }
    }

    output.section("Effective TOML");
    let toml_str = toml::to_string_pretty(config).into_diagnostic()?;
    println!("{}", toml_str);

    Ok(())
}

/// Write the effective configuration, CLI overrides included
pub async fn save(config: &CompassConfig, path: &Path) -> Result<()> {
    let output = Output::new();

    if path.exists() {
        output.warning(&format!("Replacing existing {}", path.display()));
    }
    config::save_config(config, path).await?;
    output.success(&format!(
        "Saved settings for {} to {}",
        config.server.base_url,
        path.display()
    ));

    let searched = config::config_paths();
    if !searched.iter().any(|p| p == path) {
        println!();
        println!(
            "  Not a standard location; pass {} {}",
            "--config".bright_green(),
            path.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn candidates() -> Vec<PathBuf> {
        vec![
            PathBuf::from("compass.toml"),
            PathBuf::from("/home/me/.config/compass/config.toml"),
            PathBuf::from("/home/me/.compass/config.toml"),
        ]
    }

    #[test]
    fn test_explicit_path_wins() {
        let source = ConfigSource::resolve(Some(Path::new("alt.toml")), &candidates(), |_| true);
        assert_eq!(source, ConfigSource::Explicit(PathBuf::from("alt.toml")));
        assert_eq!(source.describe(), "alt.toml (--config)");
    }

    #[test]
    fn test_first_existing_candidate_is_used() {
        let source = ConfigSource::resolve(None, &candidates(), |p| p.starts_with("/home/me"));
        assert_eq!(
            source,
            ConfigSource::Found(PathBuf::from("/home/me/.config/compass/config.toml"))
        );

        let none = ConfigSource::resolve(None, &candidates(), |_| false);
        assert_eq!(none.describe(), "built-in defaults");
    }

    #[test]
    fn test_key_settings_reflect_config() {
        let mut config = CompassConfig::default();
        config.server.base_url = "http://coach.local:5002".to_string();
        config.server.request_timeout_secs = Some(12);
        config.sos.countdown_secs = 5;

        let settings = key_settings(&config);
        assert_eq!(settings[0], ("Server", "http://coach.local:5002".to_string()));
        assert_eq!(settings[1], ("Request timeout", "12s".to_string()));
        assert_eq!(settings.last().unwrap(), &("SOS countdown", "5s".to_string()));
    }
}
