// Configuration management module
// TOML settings in the base directory plus secrets read from the environment

pub mod secrets;
pub mod settings;

#[cfg(test)]
mod tests;

pub use secrets::{BotSecrets, IngestSecrets, github_token};
pub use settings::{
    BotConfig, Config, ConfigError, DistributorConfig, IndexingConfig, LlmConfig, OllamaConfig,
    api_base_url,
};

/// Print the effective configuration for a base directory
#[inline]
pub fn show_config(config: &Config) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config)?;
    println!("# Base directory: {}", config.get_base_dir().display());
    println!("# Config file: {}", config.config_file_path().display());
    if !config.config_file_path().exists() {
        println!("# (file not present, showing defaults)");
    }
    println!();
    println!("{}", rendered);
    Ok(())
}
