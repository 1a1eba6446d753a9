use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::Path;

/// Reads and parses a configuration file without validating it
///
/// The seed URL is usually supplied on the command line, so callers apply
/// their overrides first and run [`validate`] afterwards.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Parsed configuration with defaults for missing keys
/// * `Err(ConfigError)` - Failed to read or parse the file
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    Ok(config)
}

/// Loads, parses and validates a configuration file
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_mirror::config::load_config;
///
/// let config = load_config(Path::new("mirror.toml")).unwrap();
/// println!("Max pages: {}", config.crawler.max_pages);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = read_config(path)?;
    validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
seed = "https://example.com/"

[crawler]
max-pages = 10
workers = 4

[fetch]
max-retries = 5
base-delay-ms = 250

[user-agent]
crawler-name = "TestMirror"
crawler-version = "1.0"
contact-url = "https://example.com/about"

[output]
destination = "./out"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.seed, "https://example.com/");
        assert_eq!(config.crawler.max_pages, 10);
        assert_eq!(config.crawler.workers, 4);
        assert_eq!(config.fetch.max_retries, 5);
        assert_eq!(config.fetch.base_delay_ms, 250);
        assert_eq!(config.user_agent.crawler_name, "TestMirror");
        assert_eq!(config.output.destination.as_deref(), Some("./out"));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = parse_config("seed = \"https://example.com/\"").unwrap();

        assert_eq!(config.crawler.max_pages, 50);
        assert_eq!(config.crawler.workers, 6);
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.fetch.base_delay_ms, 500);
        assert_eq!(config.fetch.attempt_budget_ms, 10_000);
        assert!(config.output.destination.is_none());
    }

    #[test]
    fn test_read_config_without_seed_is_not_validated() {
        let file = create_temp_config("[crawler]\nmax-pages = 3\n");
        let config = read_config(file.path()).unwrap();
        assert!(config.seed.is_empty());
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/mirror.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::Io(_)));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
seed = "https://example.com/"

[crawler]
workers = 0
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }
}
