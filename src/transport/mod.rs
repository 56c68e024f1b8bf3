//! HTTP transport used to talk to the Docker daemon
//!
//! The API layer only builds request paths and interprets bodies; sending the
//! requests is delegated to an [`HttpTransport`]. A transport returns a
//! [`Response`] only for successful status codes, everything else is turned
//! into a [`DockerError::Engine`](crate::error::DockerError::Engine).

pub mod remote;

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::error::Result;

pub use remote::RemoteHttpClientTransport;

/// Writes a request body to the given sink
pub type BodyWriter<'a> = &'a dyn Fn(&mut dyn Write) -> io::Result<()>;

/// Connection to a Docker daemon
pub trait HttpTransport: Send + Sync {
    fn get(&self, uri: &str) -> Result<Response>;

    /// POST without a body, optionally carrying an `X-Registry-Auth` header
    fn post(&self, uri: &str, registry_auth: Option<&str>) -> Result<Response>;

    /// POST a body of the given content type
    fn post_body(&self, uri: &str, content_type: &str, writer: BodyWriter<'_>) -> Result<Response>;

    fn put(&self, uri: &str, content_type: &str, writer: BodyWriter<'_>) -> Result<Response>;

    fn delete(&self, uri: &str) -> Result<Response>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn get(&self, uri: &str) -> Result<Response> {
        (**self).get(uri)
    }

    fn post(&self, uri: &str, registry_auth: Option<&str>) -> Result<Response> {
        (**self).post(uri, registry_auth)
    }

    fn post_body(&self, uri: &str, content_type: &str, writer: BodyWriter<'_>) -> Result<Response> {
        (**self).post_body(uri, content_type, writer)
    }

    fn put(&self, uri: &str, content_type: &str, writer: BodyWriter<'_>) -> Result<Response> {
        (**self).put(uri, content_type, writer)
    }

    fn delete(&self, uri: &str) -> Result<Response> {
        (**self).delete(uri)
    }
}

/// Successful daemon response; the body is released when dropped
pub struct Response {
    status: u16,
    content: Box<dyn Read + Send>,
}

impl Response {
    pub fn new(status: u16, content: Box<dyn Read + Send>) -> Self {
        Self { status, content }
    }

    /// Response with a fully buffered body
    pub fn from_bytes(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status, Box::new(io::Cursor::new(body.into())))
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn into_content(self) -> Box<dyn Read + Send> {
        self.content
    }
}

impl Read for Response {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.content.read(buf)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response").field("status", &self.status).finish_non_exhaustive()
    }
}
