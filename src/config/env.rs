use super::ServerConfig;
use super::merge::merge_config;
use super::validation::validate_pipeline;

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables, with defaults for everything
    /// unset. Also loads from .env file if present using dotenvy.
    ///
    /// # Errors
    /// Returns an error if:
    /// - An environment variable is malformed
    /// - The resulting pipeline settings fail validation
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = merge_config(None)?;
        validate_pipeline(&config.pipeline)?;

        Ok(config)
    }
}
