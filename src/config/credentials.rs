use crate::config::types::CredentialsConfig;
use crate::ConfigError;

/// Forum login supplied from outside the configuration file
#[derive(Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// Reads the login and password from the configured environment variables
    ///
    /// A missing or blank variable is a configuration error; the crawl must
    /// not touch the network without credentials.
    pub fn from_env(config: &CredentialsConfig) -> Result<Self, ConfigError> {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    /// Resolves credentials through an arbitrary variable lookup
    pub fn from_lookup<F>(config: &CredentialsConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let login = lookup(&config.login_env).filter(|v| !v.trim().is_empty());
        let password = lookup(&config.password_env).filter(|v| !v.is_empty());

        match (login, password) {
            (Some(login), Some(password)) => Ok(Self { login, password }),
            _ => Err(ConfigError::MissingCredentials(format!(
                "set {} and {}",
                config.login_env, config.password_env
            ))),
        }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}
