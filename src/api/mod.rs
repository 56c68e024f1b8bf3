//! Facade over the Docker Engine API
//!
//! [`DockerApi`] groups the supported calls into image, container and volume
//! operations. Each call builds a versioned request path, sends it through the
//! configured [`HttpTransport`] and interprets the response body.

pub mod container;
pub mod image;
pub mod volume;

use url::form_urlencoded;

use crate::config::DockerHostConfig;
use crate::error::Result;
use crate::transport::{HttpTransport, RemoteHttpClientTransport};

pub use container::ContainerApi;
pub use image::ImageApi;
pub use volume::VolumeApi;

/// Engine API version all request paths are prefixed with
pub const API_VERSION: &str = "v1.24";

pub(crate) const TAR_CONTENT_TYPE: &str = "application/x-tar";
pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";

const FORCE_PARAMS: &[(&str, &str)] = &[("force", "1")];

/// Client for the Docker Engine API
pub struct DockerApi {
    http: Box<dyn HttpTransport>,
}

impl DockerApi {
    /// API client sending its requests through `http`
    pub fn new(http: impl HttpTransport + 'static) -> Self {
        Self { http: Box::new(http) }
    }

    /// API client for the daemon described by `config`
    pub fn from_config(config: &DockerHostConfig) -> Result<Self> {
        Ok(Self::new(RemoteHttpClientTransport::new(config)?))
    }

    /// API client for the daemon described by the `DOCKER_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(&DockerHostConfig::from_env())
    }

    pub fn image(&self) -> ImageApi<'_> {
        ImageApi::new(self.http.as_ref())
    }

    pub fn container(&self) -> ContainerApi<'_> {
        ContainerApi::new(self.http.as_ref())
    }

    pub fn volume(&self) -> VolumeApi<'_> {
        VolumeApi::new(self.http.as_ref())
    }
}

/// Versioned request URI for `path` with the given query parameters
pub fn build_uri(path: &str, params: &[(&str, &str)]) -> String {
    let mut uri = format!("/{}{}", API_VERSION, path);
    if !params.is_empty() {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        uri.push('?');
        uri.push_str(&query);
    }
    uri
}

pub(crate) fn force_params(force: bool) -> &'static [(&'static str, &'static str)] {
    if force { FORCE_PARAMS } else { &[] }
}
