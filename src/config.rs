//! Configuration of the Docker daemon connection and registry credentials

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{DockerError, Result};

pub const DOCKER_HOST: &str = "DOCKER_HOST";
pub const DOCKER_TLS_VERIFY: &str = "DOCKER_TLS_VERIFY";
pub const DOCKER_CERT_PATH: &str = "DOCKER_CERT_PATH";

pub const DEFAULT_ADDRESS: &str = "tcp://localhost:2375";

/// Where the daemon listens and how to secure the connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerHostConfig {
    address: String,
    secure: bool,
    certificate_path: Option<PathBuf>,
}

impl Default for DockerHostConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}

impl DockerHostConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            secure: false,
            certificate_path: None,
        }
    }

    /// Configuration from `DOCKER_HOST`, `DOCKER_TLS_VERIFY` and `DOCKER_CERT_PATH`
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Configuration from the variables returned by `lookup`
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let address = lookup(DOCKER_HOST)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        let secure = lookup(DOCKER_TLS_VERIFY).is_some_and(|value| is_enabled(&value));
        let certificate_path = lookup(DOCKER_CERT_PATH)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        Self {
            address,
            secure,
            certificate_path,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_certificate_path(mut self, path: impl AsRef<Path>) -> Self {
        self.certificate_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn certificate_path(&self) -> Option<&Path> {
        self.certificate_path.as_deref()
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(DockerError::Configuration("Docker host address cannot be empty".to_string()));
        }
        if self.secure && self.certificate_path.is_none() {
            return Err(DockerError::Configuration(
                "A certificate path is required when connecting securely".to_string(),
            ));
        }
        self.base_url().map(|_| ())
    }

    /// HTTP URL of the daemon, e.g. `tcp://host:2376` becomes `https://host:2376/`
    pub fn base_url(&self) -> Result<Url> {
        let (scheme, rest) = self
            .address
            .split_once("://")
            .ok_or_else(|| DockerError::Configuration(format!("Invalid Docker host '{}'", self.address)))?;
        let scheme = match scheme {
            "tcp" if self.secure => "https",
            "tcp" => "http",
            "http" | "https" => scheme,
            "unix" | "npipe" => {
                return Err(DockerError::Configuration(format!(
                    "Unsupported Docker host '{}': only TCP connections are supported",
                    self.address
                )));
            }
            other => {
                return Err(DockerError::Configuration(format!(
                    "Unknown scheme '{}' in Docker host '{}'",
                    other, self.address
                )));
            }
        };
        let url = Url::parse(&format!("{}://{}", scheme, rest))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(DockerError::Configuration(format!("Docker host '{}' has no host name", self.address)));
        }
        Ok(url)
    }
}

fn is_enabled(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "no")
}

/// Credentials sent to the daemon for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryAuth {
    User {
        username: String,
        password: String,
        server_address: Option<String>,
        email: Option<String>,
    },
    Token {
        identity_token: String,
    },
}

#[derive(Serialize)]
#[serde(untagged)]
enum AuthPayload<'a> {
    User {
        username: &'a str,
        password: &'a str,
        #[serde(rename = "serveraddress", skip_serializing_if = "Option::is_none")]
        server_address: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<&'a str>,
    },
    Token {
        #[serde(rename = "identitytoken")]
        identity_token: &'a str,
    },
}

impl RegistryAuth {
    pub fn user(username: impl Into<String>, password: impl Into<String>) -> Self {
        RegistryAuth::User {
            username: username.into(),
            password: password.into(),
            server_address: None,
            email: None,
        }
    }

    pub fn token(identity_token: impl Into<String>) -> Self {
        RegistryAuth::Token {
            identity_token: identity_token.into(),
        }
    }

    /// Registry the credentials apply to; ignored for tokens
    pub fn with_server_address(self, address: impl Into<String>) -> Self {
        match self {
            RegistryAuth::User {
                username,
                password,
                email,
                ..
            } => RegistryAuth::User {
                username,
                password,
                server_address: Some(address.into()),
                email,
            },
            token => token,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            RegistryAuth::User { username, .. } if username.trim().is_empty() => {
                Err(DockerError::Configuration("Registry username cannot be empty".to_string()))
            }
            RegistryAuth::Token { identity_token } if identity_token.trim().is_empty() => {
                Err(DockerError::Configuration("Registry identity token cannot be empty".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Value of the `X-Registry-Auth` header
    pub fn to_header(&self) -> Result<String> {
        self.validate()?;
        let payload = match self {
            RegistryAuth::User {
                username,
                password,
                server_address,
                email,
            } => AuthPayload::User {
                username,
                password,
                server_address: server_address.as_deref(),
                email: email.as_deref(),
            },
            RegistryAuth::Token { identity_token } => AuthPayload::Token { identity_token },
        };
        Ok(URL_SAFE.encode(serde_json::to_vec(&payload)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = DockerHostConfig::from_env_with(lookup(&[]));
        assert_eq!(config, DockerHostConfig::default());
        assert_eq!(config.base_url().unwrap().as_str(), "http://localhost:2375/");
    }

    #[test]
    fn test_secure_host_from_environment() {
        let config = DockerHostConfig::from_env_with(lookup(&[
            (DOCKER_HOST, "tcp://192.168.99.100:2376"),
            (DOCKER_TLS_VERIFY, "1"),
            (DOCKER_CERT_PATH, "/home/user/.docker/machine/certs"),
        ]));
        assert!(config.is_secure());
        assert_eq!(config.certificate_path(), Some(Path::new("/home/user/.docker/machine/certs")));
        assert_eq!(config.base_url().unwrap().as_str(), "https://192.168.99.100:2376/");
        config.validate().unwrap();
    }

    #[test]
    fn test_tls_verify_values() {
        for (value, expected) in [("1", true), ("true", true), ("0", false), ("", false), ("false", false)] {
            let config = DockerHostConfig::from_env_with(lookup(&[(DOCKER_TLS_VERIFY, value)]));
            assert_eq!(config.is_secure(), expected, "DOCKER_TLS_VERIFY={}", value);
        }
    }

    #[test]
    fn test_local_sockets_are_rejected() {
        for address in ["unix:///var/run/docker.sock", "npipe:////./pipe/docker_engine"] {
            let config = DockerHostConfig::new(address);
            assert!(matches!(config.validate(), Err(DockerError::Configuration(_))));
        }
    }

    #[test]
    fn test_invalid_hosts_are_rejected() {
        assert!(DockerHostConfig::new("").validate().is_err());
        assert!(DockerHostConfig::new("localhost:2375").validate().is_err());
        assert!(DockerHostConfig::new("ftp://localhost").validate().is_err());
        assert!(DockerHostConfig::new("tcp://localhost").with_secure(true).validate().is_err());
    }

    #[test]
    fn test_user_auth_header() {
        let auth = RegistryAuth::user("ci", "s3cret").with_server_address("registry.example.com");
        let decoded = URL_SAFE.decode(auth.to_header().unwrap()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"username": "ci", "password": "s3cret", "serveraddress": "registry.example.com"})
        );
    }

    #[test]
    fn test_token_auth_header() {
        let decoded = URL_SAFE.decode(RegistryAuth::token("abc.def").to_header().unwrap()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(json, serde_json::json!({"identitytoken": "abc.def"}));
    }

    #[test]
    fn test_empty_credentials_are_rejected() {
        assert!(RegistryAuth::user(" ", "pw").to_header().is_err());
        assert!(RegistryAuth::token("").validate().is_err());
    }
}
