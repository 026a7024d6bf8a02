use std::{env, net::SocketAddr, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
}

#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Endpoint shared by the table and object storage APIs.
    pub service_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Public credential; only its presence is ever reported.
    pub anon_key: Option<String>,
    pub aws_region: String,
    pub meme_bucket_name: String,
    pub memes_table: String,
    pub votes_table: String,
    pub public_base_url: String,
    pub init_resources: bool,
}

// Keep secrets out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("service_url", &self.service_url)
            .field("aws_region", &self.aws_region)
            .field("meme_bucket_name", &self.meme_bucket_name)
            .field("memes_table", &self.memes_table)
            .field("votes_table", &self.votes_table)
            .field("public_base_url", &self.public_base_url)
            .field("init_resources", &self.init_resources)
            .finish_non_exhaustive()
    }
}

/// Which credentials were supplied, as reported by the diagnostic endpoint.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvironmentFlags {
    pub has_service_url: bool,
    pub has_service_key: bool,
    pub has_anon_key: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| ConfigError::MissingVar(key.into()));

        let service_url = required("AWS_ENDPOINT_URL")?;
        let access_key_id = required("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = required("AWS_SECRET_ACCESS_KEY")?;

        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let aws_region = var("AWS_DEFAULT_REGION").unwrap_or_else(|| "ca-central-1".to_string());
        let meme_bucket_name = var("MEME_BUCKET_NAME").unwrap_or_else(|| "memes".to_string());
        let memes_table = var("MEMES_TABLE").unwrap_or_else(|| "memes".to_string());
        let votes_table = var("VOTES_TABLE").unwrap_or_else(|| "votes".to_string());

        let public_base_url = var("MEME_PUBLIC_BASE_URL").unwrap_or_else(|| {
            format!("{}/{}", service_url.trim_end_matches('/'), meme_bucket_name)
        });

        let init_resources = match var("MEME_INIT_RESOURCES") {
            None => true,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(ConfigError::InvalidVar(
                        "MEME_INIT_RESOURCES".into(),
                        format!("expected a boolean, got '{}'", other),
                    ))
                }
            },
        };

        Ok(Config {
            bind_address,
            service_url,
            access_key_id,
            secret_access_key,
            anon_key: var("MEME_ANON_KEY"),
            aws_region,
            meme_bucket_name,
            memes_table,
            votes_table,
            public_base_url,
            init_resources,
        })
    }

    pub fn environment_flags(&self) -> EnvironmentFlags {
        EnvironmentFlags {
            has_service_url: !self.service_url.is_empty(),
            has_service_key: !self.access_key_id.is_empty() && !self.secret_access_key.is_empty(),
            has_anon_key: self.anon_key.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("AWS_ENDPOINT_URL", "http://localhost:4566/"),
        ("AWS_ACCESS_KEY_ID", "test"),
        ("AWS_SECRET_ACCESS_KEY", "secret"),
    ];

    #[test]
    fn defaults_fill_optional_values() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.aws_region, "ca-central-1");
        assert_eq!(config.memes_table, "memes");
        assert_eq!(config.votes_table, "votes");
        assert_eq!(config.public_base_url, "http://localhost:4566/memes");
        assert!(config.init_resources);
        assert!(config.anon_key.is_none());

        let flags = config.environment_flags();
        assert!(flags.has_service_url && flags.has_service_key);
        assert!(!flags.has_anon_key);
    }

    #[test]
    fn missing_endpoint_fails_fast() {
        let err = Config::from_lookup(lookup(&REQUIRED[1..])).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("AWS_ENDPOINT_URL".into()));
    }

    #[test]
    fn blank_secret_counts_as_missing() {
        let mut vars = REQUIRED.to_vec();
        vars[2] = ("AWS_SECRET_ACCESS_KEY", "  ");
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("AWS_SECRET_ACCESS_KEY".into()));
    }

    #[test]
    fn rejects_bad_bind_address_and_flag() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("BIND_ADDRESS", "not-an-address"));
        assert!(matches!(
            Config::from_lookup(lookup(&vars)),
            Err(ConfigError::InvalidVar(name, _)) if name == "BIND_ADDRESS"
        ));

        let mut vars = REQUIRED.to_vec();
        vars.push(("MEME_INIT_RESOURCES", "maybe"));
        assert!(matches!(
            Config::from_lookup(lookup(&vars)),
            Err(ConfigError::InvalidVar(name, _)) if name == "MEME_INIT_RESOURCES"
        ));
    }

    #[test]
    fn anon_key_is_reported_when_present() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("MEME_ANON_KEY", "anon"));
        vars.push(("MEME_INIT_RESOURCES", "false"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert!(config.environment_flags().has_anon_key);
        assert!(!config.init_resources);
    }
}
