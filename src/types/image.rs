//! Image metadata as returned by the inspect endpoint

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

use crate::error::Result;

/// Runtime configuration stored in an image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(rename = "Env", default, skip_serializing_if = "Vec::is_empty", deserialize_with = "nullable")]
    pub env: Vec<String>,
    #[serde(rename = "Labels", default, skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "nullable")]
    pub labels: BTreeMap<String, String>,
    #[serde(rename = "Entrypoint", default, skip_serializing_if = "Vec::is_empty", deserialize_with = "nullable")]
    pub entrypoint: Vec<String>,
    #[serde(rename = "Cmd", default, skip_serializing_if = "Vec::is_empty", deserialize_with = "nullable")]
    pub command: Vec<String>,
    #[serde(rename = "WorkingDir", default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(rename = "User", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ImageConfig {
    /// Environment as a map, splitting each `NAME=value` entry
    pub fn env_map(&self) -> BTreeMap<String, String> {
        self.env
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((name, value)) => (name.to_string(), value.to_string()),
                None => (entry.clone(), String::new()),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct RootFs {
    #[serde(rename = "Layers", default, deserialize_with = "nullable")]
    layers: Vec<String>,
}

/// Result of inspecting an image
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Image {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "RepoDigests", default, deserialize_with = "nullable")]
    digests: Vec<String>,
    #[serde(rename = "Config", default, deserialize_with = "nullable")]
    config: ImageConfig,
    #[serde(rename = "RootFS", default, deserialize_with = "nullable")]
    root_fs: RootFs,
    #[serde(rename = "Os", default)]
    os: Option<String>,
    #[serde(rename = "Architecture", default)]
    architecture: Option<String>,
    #[serde(rename = "Variant", default)]
    variant: Option<String>,
    #[serde(rename = "Created", default)]
    created: Option<String>,
}

impl Image {
    /// Parse the JSON body of an inspect response
    pub fn of(content: impl Read) -> Result<Self> {
        Ok(serde_json::from_reader(content)?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn digests(&self) -> &[String] {
        &self.digests
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Diff ids of the image layers, base layer first
    pub fn layers(&self) -> &[String] {
        &self.root_fs.layers
    }

    /// Operating system, `linux` when the daemon does not report one
    pub fn os(&self) -> &str {
        self.os.as_deref().filter(|os| !os.is_empty()).unwrap_or("linux")
    }

    pub fn architecture(&self) -> Option<&str> {
        self.architecture.as_deref()
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn created(&self) -> Option<&str> {
        self.created.as_deref()
    }
}

/// The engine sends `null` for empty collections
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
