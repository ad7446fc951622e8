//! Admin configuration

use anyhow::Result;
use serde::Deserialize;

use palisade_core::PermissionMap;
use palisade_spicedb::SpiceDbConfig;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub spicedb: SpiceDbSettings,
    /// Product actions to compile into the schema, in declaration order.
    #[serde(default)]
    pub permissions: PermissionMap,
}

#[derive(Debug, Deserialize)]
pub struct SpiceDbSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_endpoint() -> String {
    "http://localhost:50051".to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    30000
}

impl Settings {
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("spicedb.endpoint", "http://localhost:50051")?
            .set_default("spicedb.token", "")?
            .set_default("spicedb.use_tls", false)?
            .set_default("spicedb.connect_timeout_ms", 5000)?
            .set_default("spicedb.request_timeout_ms", 30000)?
            // Load from config file if present
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // Load from environment variables with PALISADE_ prefix
            .add_source(
                config::Environment::with_prefix("PALISADE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Client configuration for the policy service connection.
    pub fn spicedb_config(&self) -> SpiceDbConfig {
        SpiceDbConfig {
            endpoint: self.spicedb.endpoint.clone(),
            token: self.spicedb.token.clone(),
            use_tls: self.spicedb.use_tls,
            connect_timeout_ms: self.spicedb.connect_timeout_ms,
            request_timeout_ms: self.spicedb.request_timeout_ms,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spicedb: SpiceDbSettings {
                endpoint: "http://localhost:50051".to_string(),
                token: String::new(),
                use_tls: false,
                connect_timeout_ms: 5000,
                request_timeout_ms: 30000,
            },
            permissions: PermissionMap::new(),
        }
    }
}
