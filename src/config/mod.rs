//! Configuration module for the vocalis server
//!
//! Server configuration comes from YAML files and environment variables. Environment
//! variables always override YAML values, and YAML values override the built-in
//! defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use vocalis::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use crate::core::session::PipelineSettings;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

/// Server configuration
///
/// Holds the listen address and the [`PipelineSettings`] every voice session on this
/// server is created with.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub pipeline: PipelineSettings,
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables
    /// 2. YAML file values
    /// 3. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // No .env loading here: the YAML file is the source of truth and only real
        // environment variables override it.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;

        validation::validate_pipeline(&config.pipeline)?;

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings handed to each new voice session
    pub fn pipeline_settings(&self) -> PipelineSettings {
        self.pipeline.clone()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            pipeline: PipelineSettings::default(),
        }
    }
}
