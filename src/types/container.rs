//! Container identifiers, create configuration, content uploads and exit status

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};

use crate::error::{DockerError, Result};
use crate::tar_archive::TarArchive;
use crate::types::ImageReference;

/// Identifier of a container as returned by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerReference(String);

impl ContainerReference {
    pub fn of(value: &str) -> Result<Self> {
        if value.is_empty() {
            return Err(DockerError::invalid_argument("Container reference must not be empty"));
        }
        Ok(Self(value.to_string()))
    }
}

impl fmt::Display for ContainerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration used to create a container
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerConfig {
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "Cmd")]
    command: Vec<String>,
    #[serde(rename = "Env")]
    env: Vec<String>,
    #[serde(rename = "Labels")]
    labels: BTreeMap<String, String>,
    #[serde(rename = "User", skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(rename = "HostConfig")]
    host_config: HostConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
struct HostConfig {
    #[serde(rename = "Binds", skip_serializing_if = "Vec::is_empty")]
    binds: Vec<String>,
    #[serde(rename = "NetworkMode", skip_serializing_if = "Option::is_none")]
    network_mode: Option<String>,
    #[serde(rename = "SecurityOpt", skip_serializing_if = "Vec::is_empty")]
    security_options: Vec<String>,
}

impl ContainerConfig {
    pub fn builder(image: &ImageReference) -> ContainerConfigBuilder {
        ContainerConfigBuilder {
            config: ContainerConfig {
                image: image.to_string(),
                command: Vec::new(),
                env: Vec::new(),
                labels: BTreeMap::new(),
                user: None,
                host_config: HostConfig::default(),
            },
            env: BTreeMap::new(),
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Write the create request JSON body
    pub fn write_to(&self, output: &mut dyn Write) -> std::io::Result<()> {
        serde_json::to_writer(output, self).map_err(std::io::Error::from)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Builder for [`ContainerConfig`]
#[derive(Debug, Clone)]
pub struct ContainerConfigBuilder {
    config: ContainerConfig,
    env: BTreeMap<String, String>,
}

impl ContainerConfigBuilder {
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, name: &str, value: &str) -> Self {
        self.env.insert(name.to_string(), value.to_string());
        self
    }

    pub fn label(mut self, name: &str, value: &str) -> Self {
        self.config.labels.insert(name.to_string(), value.to_string());
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.config.user = Some(user.to_string());
        self
    }

    /// Bind mount in `source:destination[:options]` form
    pub fn binding(mut self, binding: &str) -> Self {
        self.config.host_config.binds.push(binding.to_string());
        self
    }

    pub fn network_mode(mut self, network_mode: &str) -> Self {
        self.config.host_config.network_mode = Some(network_mode.to_string());
        self
    }

    pub fn security_option(mut self, option: &str) -> Self {
        self.config.host_config.security_options.push(option.to_string());
        self
    }

    pub fn build(mut self) -> ContainerConfig {
        self.config.env = self
            .env
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        self.config
    }
}

/// Tar content to upload into a container before it starts
pub struct ContainerContent {
    archive: Box<dyn TarArchive>,
    destination_path: String,
}

impl ContainerContent {
    pub fn of(archive: impl TarArchive + 'static, destination_path: &str) -> Result<Self> {
        if destination_path.is_empty() {
            return Err(DockerError::invalid_argument("Destination path must not be empty"));
        }
        Ok(Self {
            archive: Box::new(archive),
            destination_path: destination_path.to_string(),
        })
    }

    pub fn archive(&self) -> &dyn TarArchive {
        self.archive.as_ref()
    }

    pub fn destination_path(&self) -> &str {
        &self.destination_path
    }
}

impl fmt::Debug for ContainerContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerContent")
            .field("destination_path", &self.destination_path)
            .finish_non_exhaustive()
    }
}

/// Exit status returned once a container stops
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerStatus {
    #[serde(rename = "StatusCode")]
    status_code: i64,
    #[serde(rename = "Error", default)]
    error: Option<ContainerError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct ContainerError {
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

impl ContainerStatus {
    pub fn of(content: impl Read) -> Result<Self> {
        Ok(serde_json::from_reader(content)?)
    }

    pub fn status_code(&self) -> i64 {
        self.status_code
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_ref()
            .and_then(|error| error.message.as_deref())
            .filter(|message| !message.is_empty())
    }
}
