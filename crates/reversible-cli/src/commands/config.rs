//! Configuration management commands.

use anyhow::Result;
use reversible_config::{ConfigLayer, RollbackConfig};

use crate::ConfigFormat;

/// Show the effective configuration and the files it was merged from.
pub fn show(layers: &[ConfigLayer], config: &RollbackConfig, format: ConfigFormat) -> Result<()> {
    match format {
        ConfigFormat::Json => {
            let json = serde_json::to_string_pretty(config)?;
            println!("{json}");
        }
        ConfigFormat::Toml => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{toml_str}");
        }
        ConfigFormat::Text => {
            println!("Reversible Configuration");
            println!("========================\n");

            println!("Sources (lowest precedence first):");
            for layer in layers {
                let state = if layer.exists() { "loaded" } else { "not found" };
                println!("  {:<8} {} ({state})", layer.kind, layer.path.display());
            }
            if !layers.iter().any(ConfigLayer::exists) {
                println!("  No configuration files found, using defaults");
            }
            println!();

            println!("Tokens:");
            println!("  TTL: {}s", config.tokens.ttl_secs);
            println!();

            println!("Windows:");
            println!(
                "  Default max age: {} hours",
                config.windows.default_max_age_hours
            );
            println!();

            println!("Reasons:");
            println!("  Min length: {}", config.reasons.min_len);
            println!("  Max length: {}", config.reasons.max_len);
            println!();

            println!("Logging:");
            println!("  Filter: {}", config.logging.filter);
        }
    }

    Ok(())
}
