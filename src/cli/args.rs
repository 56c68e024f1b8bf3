//! Command-line argument parsing

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{DockerHostConfig, RegistryAuth};
use crate::error::{DockerError, Result};

#[derive(Parser, Debug)]
#[command(name = "docker-engine-client")]
#[command(about = "Drive a Docker daemon through its Engine API: pull, push, load, export and run images")]
#[command(version, author)]
pub struct Args {
    /// Docker daemon address
    #[arg(
        long = "host",
        short = 'H',
        env = "DOCKER_HOST",
        help = "Daemon address, e.g. tcp://localhost:2375"
    )]
    pub host: Option<String>,

    /// Use TLS with client certificates
    #[arg(long = "tls-verify", help = "Connect with TLS using the certificates in --cert-path")]
    pub tls_verify: bool,

    /// Directory holding ca.pem, cert.pem and key.pem
    #[arg(long = "cert-path", env = "DOCKER_CERT_PATH")]
    pub cert_path: Option<PathBuf>,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', help = "Enable verbose output")]
    pub verbose: bool,

    /// Quiet mode
    #[arg(long = "quiet", short = 'q', help = "Only print errors", conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pull an image from a registry
    Pull {
        image: String,
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Push an image to a registry
    Push {
        image: String,
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Load an image tar produced by `docker save`
    Load {
        file: PathBuf,
        /// Tag the archive is expected to contain, used in messages
        #[arg(long)]
        tag: Option<String>,
    },
    /// Write the layers of an image to a directory
    Export {
        image: String,
        #[arg(long, short = 'o', default_value = ".")]
        output: PathBuf,
    },
    /// Show image metadata
    Inspect { image: String },
    /// Tag an image
    Tag { source: String, target: String },
    /// Remove an image
    Rmi {
        image: String,
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Create, start and follow a container, then remove it
    Run(RunArgs),
    /// Remove a volume
    VolumeRm {
        name: String,
        #[arg(long, short = 'f')]
        force: bool,
    },
}

#[derive(ClapArgs, Debug, Default)]
pub struct AuthArgs {
    #[arg(long, short = 'u', env = "REGISTRY_USERNAME")]
    pub username: Option<String>,

    #[arg(long, short = 'p', env = "REGISTRY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Registry the credentials belong to
    #[arg(long = "server-address")]
    pub server_address: Option<String>,

    #[arg(long = "identity-token", env = "REGISTRY_IDENTITY_TOKEN", hide_env_values = true)]
    pub identity_token: Option<String>,
}

#[derive(ClapArgs, Debug, Default)]
pub struct RunArgs {
    pub image: String,

    /// Environment variable as KEY=VALUE
    #[arg(long = "env", short = 'e')]
    pub env: Vec<String>,

    /// Label as KEY=VALUE
    #[arg(long = "label", short = 'l')]
    pub labels: Vec<String>,

    #[arg(long)]
    pub user: Option<String>,

    /// Bind mount as SOURCE:TARGET
    #[arg(long = "bind")]
    pub bindings: Vec<String>,

    #[arg(long)]
    pub network: Option<String>,

    /// Copy a local file into the container as LOCAL:CONTAINER_DIR
    #[arg(long = "copy")]
    pub copies: Vec<String>,

    /// Keep the container after it exits
    #[arg(long)]
    pub keep: bool,

    /// Command to run
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl Args {
    /// Daemon connection, with flags taking precedence over the environment
    pub fn host_config(&self) -> DockerHostConfig {
        let mut config = DockerHostConfig::from_env();
        if let Some(host) = &self.host {
            config = config.with_address(host.clone());
        }
        if self.tls_verify {
            config = config.with_secure(true);
        }
        if let Some(path) = &self.cert_path {
            config = config.with_certificate_path(path);
        }
        config
    }
}

impl AuthArgs {
    pub fn registry_auth(&self) -> Result<Option<RegistryAuth>> {
        let auth = match (&self.identity_token, &self.username, &self.password) {
            (Some(token), _, _) => RegistryAuth::token(token.clone()),
            (None, Some(username), Some(password)) => {
                let auth = RegistryAuth::user(username.clone(), password.clone());
                match &self.server_address {
                    Some(address) => auth.with_server_address(address.clone()),
                    None => auth,
                }
            }
            (None, Some(_), None) => {
                return Err(DockerError::Configuration("A password is required with --username".to_string()));
            }
            (None, None, _) => return Ok(None),
        };
        auth.validate()?;
        Ok(Some(auth))
    }
}

/// Split `KEY=VALUE`
pub fn parse_key_value(value: &str) -> Result<(&str, &str)> {
    value
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| DockerError::invalid_argument(format!("Expected KEY=VALUE, got '{}'", value)))
}

/// Split `LOCAL:CONTAINER_DIR` at the last colon
pub fn parse_copy(value: &str) -> Result<(PathBuf, &str)> {
    match value.rsplit_once(':') {
        Some((local, dest)) if !local.is_empty() && dest.starts_with('/') => Ok((PathBuf::from(local), dest)),
        _ => Err(DockerError::invalid_argument(format!(
            "Expected LOCAL:CONTAINER_DIR with an absolute container directory, got '{}'",
            value
        ))),
    }
}
