use std::fmt;

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

const ENV_CONNECTION_STRING: &str = "AZURE_STORAGE_CONNECTION_STRING";
const ENV_ACCOUNT_NAME: &str = "AZURE_STORAGE_ACCOUNT_NAME";
const ENV_ACCOUNT_KEY: &str = "AZURE_STORAGE_ACCOUNT_KEY";
const ENV_SAS_TOKEN: &str = "AZURE_STORAGE_SAS_TOKEN";
const ENV_ENDPOINT: &str = "AZURE_STORAGE_ENDPOINT";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("max_concurrency must be greater than zero")]
    ZeroConcurrency,

    #[error("configuration parameter {0} is null")]
    NullParameter(usize),

    #[error("configuration is not valid utf-8")]
    InvalidUtf8,

    #[error("no transfer available for endpoint: {0:?}")]
    UnsupportedEndpoint(Option<String>),
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub connection_string: Option<String>,
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub sas_token: Option<String>,
    pub endpoint: Option<String>,
}

impl Credentials {
    /// Whether the credentials are complete without a default credential chain.
    pub fn is_explicit(&self) -> bool {
        self.connection_string.is_some()
            || (self.account_name.is_some()
                && (self.account_key.is_some() || self.sas_token.is_some()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redacted(v: &Option<String>) -> Option<&'static str> {
            v.as_ref().map(|_| "<redacted>")
        }

        f.debug_struct("Credentials")
            .field("connection_string", &redacted(&self.connection_string))
            .field("account_name", &self.account_name)
            .field("account_key", &redacted(&self.account_key))
            .field("sas_token", &redacted(&self.sas_token))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfiguration {
    pub credentials: Credentials,

    /// Size of one chunk in bytes
    pub chunk_size: usize,

    /// Upper bound of chunk transfers running at once per client
    pub max_concurrency: usize,
}

impl ClientConfiguration {
    pub fn new(chunk_size: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }

        Ok(Self {
            credentials: Credentials::default(),
            chunk_size,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        })
    }

    ///
    /// Resolves a configuration from the host's key/value parameters, falling
    /// back to `AZURE_STORAGE_*` environment variables for anything not given.
    /// An explicit `endpoint_url` overrides both.
    pub fn from_params<K, V>(
        params: impl IntoIterator<Item = (K, V)>,
        endpoint_url: Option<&str>,
        chunk_size: usize,
    ) -> Result<Self, ConfigError>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        Self::from_params_with_env(params, endpoint_url, chunk_size, |name| {
            std::env::var(name).ok()
        })
    }

    pub fn from_params_with_env<K, V>(
        params: impl IntoIterator<Item = (K, V)>,
        endpoint_url: Option<&str>,
        chunk_size: usize,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::new(chunk_size)?;
        let creds = &mut config.credentials;

        for (key, value) in params {
            let key = key.as_ref();
            let value = value.into();

            match key {
                "connection_string" => creds.connection_string = Some(value),
                "account_name" => creds.account_name = Some(value),
                "account_key" => creds.account_key = Some(value),
                "sas_token" => creds.sas_token = Some(value),
                "endpoint" => creds.endpoint = Some(value),
                "max_concurrency" => {
                    config.max_concurrency = value.trim().parse().map_err(|_| {
                        ConfigError::InvalidValue {
                            key: key.to_string(),
                            value,
                        }
                    })?;
                }
                _ => tracing::warn!(key, "unknown client parameter"),
            }
        }

        let fallbacks = [
            (&mut creds.connection_string, ENV_CONNECTION_STRING),
            (&mut creds.account_name, ENV_ACCOUNT_NAME),
            (&mut creds.account_key, ENV_ACCOUNT_KEY),
            (&mut creds.sas_token, ENV_SAS_TOKEN),
            (&mut creds.endpoint, ENV_ENDPOINT),
        ];

        for (slot, name) in fallbacks {
            if slot.is_none() {
                if let Some(value) = env(name) {
                    tracing::debug!("using {} from environment", name);
                    *slot = Some(value);
                }
            }
        }

        if let Some(endpoint) = endpoint_url {
            creds.endpoint = Some(endpoint.to_string());
        }

        if !creds.is_explicit() {
            tracing::warn!("no credentials provided, relying on the default credential chain");
        }

        if config.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        Ok(config)
    }

    /// Whether `other` resolves to the same credentials as this configuration.
    pub fn same_credentials(&self, other: &ClientConfiguration) -> bool {
        self.credentials == other.credentials
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{ClientConfiguration, ConfigError, DEFAULT_MAX_CONCURRENCY};

    fn resolve(
        params: &[(&str, &str)],
        endpoint: Option<&str>,
        env: &[(&str, &str)],
    ) -> Result<ClientConfiguration, ConfigError> {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        ClientConfiguration::from_params_with_env(
            params.iter().copied(),
            endpoint,
            4096,
            |name| env.get(name).cloned(),
        )
    }

    #[test]
    fn params_take_precedence_over_environment() {
        let config = resolve(
            &[("account_name", "param-account"), ("sas_token", "sv=1")],
            None,
            &[
                ("AZURE_STORAGE_ACCOUNT_NAME", "env-account"),
                ("AZURE_STORAGE_ENDPOINT", "https://env.example"),
            ],
        )
        .unwrap();

        let creds = &config.credentials;
        assert_eq!(creds.account_name.as_deref(), Some("param-account"));
        assert_eq!(creds.sas_token.as_deref(), Some("sv=1"));
        assert_eq!(creds.endpoint.as_deref(), Some("https://env.example"));
        assert!(creds.is_explicit());
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
    }

    #[test]
    fn endpoint_url_overrides_everything() {
        let config = resolve(
            &[("endpoint", "https://param.example")],
            Some("file:///srv/blobs"),
            &[("AZURE_STORAGE_ENDPOINT", "https://env.example")],
        )
        .unwrap();

        assert_eq!(
            config.credentials.endpoint.as_deref(),
            Some("file:///srv/blobs")
        );
        assert!(!config.credentials.is_explicit());
    }

    #[test]
    fn numeric_parameters_are_validated() {
        let config = resolve(&[("max_concurrency", " 32 ")], None, &[]).unwrap();
        assert_eq!(config.max_concurrency, 32);

        assert_eq!(
            resolve(&[("max_concurrency", "lots")], None, &[]),
            Err(ConfigError::InvalidValue {
                key: "max_concurrency".to_string(),
                value: "lots".to_string()
            })
        );
        assert_eq!(
            resolve(&[("max_concurrency", "0")], None, &[]),
            Err(ConfigError::ZeroConcurrency)
        );
        assert_eq!(ClientConfiguration::new(0), Err(ConfigError::ZeroChunkSize));
    }

    #[test]
    fn unknown_parameters_are_ignored() {
        let config = resolve(&[("api_version", "2023-11-03")], None, &[]).unwrap();
        assert_eq!(config, ClientConfiguration::new(4096).unwrap());
    }

    #[test]
    fn credentials_are_compared_and_redacted() {
        let a = resolve(&[("connection_string", "AccountKey=secret")], None, &[]).unwrap();
        let b = resolve(&[("connection_string", "AccountKey=secret")], None, &[]).unwrap();
        let c = resolve(&[("connection_string", "AccountKey=other")], None, &[]).unwrap();

        assert!(a.same_credentials(&b));
        assert!(!a.same_credentials(&c));
        assert!(!format!("{:?}", a).contains("secret"));
    }
}
