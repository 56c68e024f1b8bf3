//! [`HttpTransport`] for daemons reachable over TCP, plain or with TLS

use reqwest::blocking::{Body, Client, RequestBuilder};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Certificate, Identity};
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use url::Url;

use crate::config::DockerHostConfig;
use crate::error::handlers::EngineErrorHandler;
use crate::error::{DockerError, Result};
use crate::transport::{BodyWriter, HttpTransport, Response};

const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

/// Error bodies larger than this are cut before being reported
const MAX_ERROR_BODY: u64 = 64 * 1024;

pub struct RemoteHttpClientTransport {
    client: Client,
    base_url: Url,
}

impl RemoteHttpClientTransport {
    /// Transport for the daemon described by `config`
    pub fn new(config: &DockerHostConfig) -> Result<Self> {
        config.validate()?;
        let base_url = config.base_url()?;

        // `wait` and followed `logs` block for as long as the container runs
        let mut builder = Client::builder().timeout(None).use_rustls_tls();

        if config.is_secure() {
            let cert_path = config
                .certificate_path()
                .ok_or_else(|| DockerError::Configuration("Docker host is secure but no certificate path is set".to_string()))?;
            builder = builder
                .add_root_certificate(load_certificate(&cert_path.join("ca.pem"))?)
                .identity(load_identity(&cert_path.join("cert.pem"), &cert_path.join("key.pem"))?);
        }

        let client = builder.build()?;
        tracing::debug!(url = %base_url, secure = config.is_secure(), "Created Docker transport");
        Ok(Self { client, base_url })
    }

    fn url(&self, uri: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, uri.trim_start_matches('/')))?)
    }

    fn execute(&self, uri: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send()?;
        let status = response.status();
        tracing::debug!(uri, status = status.as_u16(), "Docker API response");

        if status.is_success() {
            return Ok(Response::new(status.as_u16(), Box::new(response)));
        }

        let mut body = Vec::new();
        // A body that cannot be read still yields an error for the status
        let _ = response.take(MAX_ERROR_BODY).read_to_end(&mut body);
        Err(EngineErrorHandler::handle_status(
            uri,
            status.as_u16(),
            status.canonical_reason(),
            &body,
        ))
    }

    fn with_body(&self, request: RequestBuilder, content_type: &str, writer: BodyWriter<'_>) -> Result<RequestBuilder> {
        // Spool to disk so large archives are sent with a known length
        let mut spool = tempfile::tempfile()?;
        writer(&mut spool)?;
        let length = spool.seek(SeekFrom::End(0))?;
        spool.seek(SeekFrom::Start(0))?;

        let content_type = HeaderValue::from_str(content_type)
            .map_err(|e| DockerError::invalid_argument(format!("Invalid content type: {}", e)))?;
        Ok(request
            .header(CONTENT_TYPE, content_type)
            .body(Body::sized(spool, length)))
    }
}

impl HttpTransport for RemoteHttpClientTransport {
    fn get(&self, uri: &str) -> Result<Response> {
        tracing::debug!(method = "GET", uri, "Docker API request");
        self.execute(uri, self.client.get(self.url(uri)?))
    }

    fn post(&self, uri: &str, registry_auth: Option<&str>) -> Result<Response> {
        tracing::debug!(method = "POST", uri, "Docker API request");
        let mut request = self.client.post(self.url(uri)?);
        if let Some(auth) = registry_auth {
            request = request.header(REGISTRY_AUTH_HEADER, auth);
        }
        self.execute(uri, request)
    }

    fn post_body(&self, uri: &str, content_type: &str, writer: BodyWriter<'_>) -> Result<Response> {
        tracing::debug!(method = "POST", uri, content_type, "Docker API request");
        let request = self.with_body(self.client.post(self.url(uri)?), content_type, writer)?;
        self.execute(uri, request)
    }

    fn put(&self, uri: &str, content_type: &str, writer: BodyWriter<'_>) -> Result<Response> {
        tracing::debug!(method = "PUT", uri, content_type, "Docker API request");
        let request = self.with_body(self.client.put(self.url(uri)?), content_type, writer)?;
        self.execute(uri, request)
    }

    fn delete(&self, uri: &str) -> Result<Response> {
        tracing::debug!(method = "DELETE", uri, "Docker API request");
        self.execute(uri, self.client.delete(self.url(uri)?))
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| DockerError::Configuration(format!("Unable to read '{}': {}", path.display(), e)))
}

fn load_certificate(path: &Path) -> Result<Certificate> {
    Certificate::from_pem(&read_pem(path)?)
        .map_err(|e| DockerError::Configuration(format!("Invalid CA certificate '{}': {}", path.display(), e)))
}

fn load_identity(cert: &Path, key: &Path) -> Result<Identity> {
    let mut pem = read_pem(cert)?;
    pem.push(b'\n');
    pem.extend(read_pem(key)?);
    Identity::from_pem(&pem)
        .map_err(|e| DockerError::Configuration(format!("Invalid client certificate '{}': {}", cert.display(), e)))
}
