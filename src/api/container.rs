//! Container operations: create, start, logs, wait and remove

use serde::Deserialize;
use std::io::Write;

use crate::api::{JSON_CONTENT_TYPE, TAR_CONTENT_TYPE, build_uri, force_params};
use crate::error::Result;
use crate::transport::HttpTransport;
use crate::types::{ContainerConfig, ContainerContent, ContainerReference, ContainerStatus};
use crate::update::log;
use crate::update::{LogUpdateEvent, UpdateListener, scoped};

#[derive(Debug, Deserialize)]
struct CreatedContainer {
    #[serde(rename = "Id")]
    id: String,
}

/// Docker API for container operations
pub struct ContainerApi<'a> {
    http: &'a dyn HttpTransport,
}

impl<'a> ContainerApi<'a> {
    pub(crate) fn new(http: &'a dyn HttpTransport) -> Self {
        Self { http }
    }

    /// Create a container and upload `contents` into it.
    ///
    /// A container whose upload fails is left in place; removing it is up
    /// to the caller.
    pub fn create(&self, config: &ContainerConfig, contents: &[ContainerContent]) -> Result<ContainerReference> {
        let reference = self.create_container(config)?;
        for content in contents {
            self.upload_container_content(&reference, content)?;
        }
        Ok(reference)
    }

    fn create_container(&self, config: &ContainerConfig) -> Result<ContainerReference> {
        let uri = build_uri("/containers/create", &[]);
        let response = self
            .http
            .post_body(&uri, JSON_CONTENT_TYPE, &|output: &mut dyn Write| config.write_to(output))?;
        let created: CreatedContainer = serde_json::from_reader(response)?;
        let reference = ContainerReference::of(&created.id)?;
        tracing::debug!(container = %reference, image = config.image(), "Created container");
        Ok(reference)
    }

    fn upload_container_content(&self, reference: &ContainerReference, content: &ContainerContent) -> Result<()> {
        let uri = build_uri(
            &format!("/containers/{}/archive", reference),
            &[("path", content.destination_path())],
        );
        self.http
            .put(&uri, TAR_CONTENT_TYPE, &|output: &mut dyn Write| content.archive().write_to(output))?;
        Ok(())
    }

    pub fn start(&self, reference: &ContainerReference) -> Result<()> {
        let uri = build_uri(&format!("/containers/{}/start", reference), &[]);
        self.http.post(&uri, None)?;
        Ok(())
    }

    /// Follow the output of a container until its log stream closes
    pub fn logs<L>(&self, reference: &ContainerReference, listener: &mut L) -> Result<()>
    where
        L: UpdateListener<LogUpdateEvent> + ?Sized,
    {
        let uri = build_uri(
            &format!("/containers/{}/logs", reference),
            &[("stdout", "1"), ("stderr", "1"), ("follow", "1")],
        );
        scoped::<LogUpdateEvent, _, _, _>(listener, |listener| {
            let response = self.http.get(&uri)?;
            log::read_all(response, |event| listener.on_update(&event))
        })
    }

    /// Block until the container exits and return its status
    pub fn wait(&self, reference: &ContainerReference) -> Result<ContainerStatus> {
        let uri = build_uri(&format!("/containers/{}/wait", reference), &[]);
        ContainerStatus::of(self.http.post(&uri, None)?)
    }

    pub fn remove(&self, reference: &ContainerReference, force: bool) -> Result<()> {
        let uri = build_uri(&format!("/containers/{}", reference), force_params(force));
        self.http.delete(&uri)?;
        Ok(())
    }
}
