//! Image operations: pull, push, load, export, inspect, tag and remove

use std::io::{self, Read, Write};
use std::path::Path;

use crate::api::{TAR_CONTENT_TYPE, build_uri, force_params};
use crate::error::{DockerError, Result};
use crate::export::ExportedImageTar;
use crate::json_stream;
use crate::transport::HttpTransport;
use crate::types::{Image, ImageArchive, ImageReference};
use crate::update::{
    Chain, LoadImageUpdateEvent, ProgressUpdateEvent, PullImageUpdateEvent, PushImageUpdateEvent, UpdateListener,
    scoped,
};

/// Docker API for image operations
pub struct ImageApi<'a> {
    http: &'a dyn HttpTransport,
}

impl<'a> ImageApi<'a> {
    pub(crate) fn new(http: &'a dyn HttpTransport) -> Self {
        Self { http }
    }

    /// Pull an image from a registry and return its inspected metadata.
    ///
    /// Fails with [`DockerError::InvalidResponse`] when the daemon reports two
    /// different digests for the same pull.
    pub fn pull<L>(&self, reference: &ImageReference, listener: &mut L, registry_auth: Option<&str>) -> Result<Image>
    where
        L: UpdateListener<PullImageUpdateEvent> + ?Sized,
    {
        let from_image = reference.to_string();
        let uri = build_uri("/images/create", &[("fromImage", from_image.as_str())]);
        let mut digest_capture = DigestCaptureUpdateListener::default();
        let image = {
            let mut listener = Chain::new(&mut digest_capture, listener);
            scoped::<PullImageUpdateEvent, _, _, _>(&mut listener, |listener| {
                let response = self.http.post(&uri, registry_auth)?;
                json_stream::read_all(response, |event: PullImageUpdateEvent| listener.on_update(&event))?;
                self.inspect(reference)
            })?
        };
        tracing::debug!(reference = %reference, digest = ?digest_capture.digest(), "Pulled image");
        Ok(image)
    }

    /// Push an image to a registry, failing on the first error the daemon reports
    pub fn push<L>(&self, reference: &ImageReference, listener: &mut L, registry_auth: Option<&str>) -> Result<()>
    where
        L: UpdateListener<PushImageUpdateEvent> + ?Sized,
    {
        let uri = build_uri(&format!("/images/{}/push", reference), &[]);
        let mut error_capture = ErrorCaptureUpdateListener;
        let mut listener = Chain::new(&mut error_capture, listener);
        scoped::<PushImageUpdateEvent, _, _, _>(&mut listener, |listener| {
            let response = self.http.post(&uri, registry_auth)?;
            json_stream::read_all(response, |event: PushImageUpdateEvent| listener.on_update(&event))
        })?;
        tracing::debug!(reference = %reference, "Pushed image");
        Ok(())
    }

    /// Load an image archive into the daemon
    pub fn load<L>(&self, archive: &ImageArchive, listener: &mut L) -> Result<()>
    where
        L: UpdateListener<LoadImageUpdateEvent> + ?Sized,
    {
        let uri = build_uri("/images/load", &[]);
        let mut load_listener = LoadImageUpdateListener::new(archive.tag());
        let mut listener = Chain::new(&mut load_listener, listener);
        scoped::<LoadImageUpdateEvent, _, _, _>(&mut listener, |listener| {
            let response = self
                .http
                .post_body(&uri, TAR_CONTENT_TYPE, &|output: &mut dyn Write| archive.write_to(output))?;
            json_stream::read_all(response, |event: LoadImageUpdateEvent| listener.on_update(&event))?;
            listener.first().assert_valid_response_received()
        })
    }

    /// Export the layers of an image.
    ///
    /// `consumer` is called once per layer, in manifest order, with the layer
    /// name and its uncompressed tar content. The reader is only valid for
    /// the duration of the call.
    pub fn export_layers<F>(&self, reference: &ImageReference, consumer: F) -> Result<()>
    where
        F: FnMut(&str, &mut dyn Read) -> Result<()>,
    {
        let uri = build_uri(&format!("/images/{}/get", reference), &[]);
        let response = self.http.get(&uri)?;
        ExportedImageTar::new(reference, response)?.export_layers(consumer)
    }

    /// Export the layers of an image as temporary files.
    ///
    /// Each file is deleted once `consumer` returns.
    pub fn export_layer_files<F>(&self, reference: &ImageReference, mut consumer: F) -> Result<()>
    where
        F: FnMut(&str, &Path) -> Result<()>,
    {
        self.export_layers(reference, |name, archive| {
            let mut file = tempfile::Builder::new()
                .prefix("docker-export-layer-files-")
                .tempfile()?;
            io::copy(archive, file.as_file_mut())?;
            file.as_file_mut().flush()?;
            consumer(name, file.path())
        })
    }

    pub fn remove(&self, reference: &ImageReference, force: bool) -> Result<()> {
        let uri = build_uri(&format!("/images/{}", reference), force_params(force));
        self.http.delete(&uri)?;
        Ok(())
    }

    pub fn inspect(&self, reference: &ImageReference) -> Result<Image> {
        let uri = build_uri(&format!("/images/{}/json", reference), &[]);
        Image::of(self.http.get(&uri)?)
    }

    /// Tag `source` as `target`; without a tag on `target` the daemon uses `latest`
    pub fn tag(&self, source: &ImageReference, target: &ImageReference) -> Result<()> {
        let path = format!("/images/{}/tag", source);
        let uri = match target.tag() {
            Some(tag) => {
                let repo = target.in_tagless_form().to_string();
                build_uri(&path, &[("repo", repo.as_str()), ("tag", tag)])
            }
            None => build_uri(&path, &[("repo", target.to_string().as_str())]),
        };
        self.http.post(&uri, None)?;
        Ok(())
    }
}

/// Records the `Digest:` status of a pull
#[derive(Debug, Default)]
struct DigestCaptureUpdateListener {
    digest: Option<String>,
}

impl DigestCaptureUpdateListener {
    const PREFIX: &'static str = "Digest:";

    fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl<E: ProgressUpdateEvent> UpdateListener<E> for DigestCaptureUpdateListener {
    fn on_update(&mut self, event: &E) -> Result<()> {
        let Some(digest) = event.status().and_then(|status| status.strip_prefix(Self::PREFIX)) else {
            return Ok(());
        };
        let digest = digest.trim();
        match &self.digest {
            Some(existing) if existing != digest => {
                Err(DockerError::InvalidResponse("Different digests IDs provided".to_string()))
            }
            _ => {
                self.digest = Some(digest.to_string());
                Ok(())
            }
        }
    }
}

/// Fails on the first push event carrying an error
struct ErrorCaptureUpdateListener;

impl UpdateListener<PushImageUpdateEvent> for ErrorCaptureUpdateListener {
    fn on_update(&mut self, event: &PushImageUpdateEvent) -> Result<()> {
        match event.error_detail() {
            Some(error) => Err(DockerError::Daemon(format!(
                "Error response received when pushing image: {}",
                error.message()
            ))),
            None => Ok(()),
        }
    }
}

/// Rejects load errors and remembers the last message of the load
struct LoadImageUpdateListener {
    image: String,
    stream: Option<String>,
}

impl LoadImageUpdateListener {
    fn new(tag: Option<&ImageReference>) -> Self {
        Self {
            image: tag.map(|tag| format!(" \"{}\"", tag)).unwrap_or_default(),
            stream: None,
        }
    }

    fn assert_valid_response_received(&self) -> Result<()> {
        match &self.stream {
            Some(_) => Ok(()),
            None => Err(DockerError::InvalidResponse(format!(
                "Invalid response received when loading image{}",
                self.image
            ))),
        }
    }
}

impl UpdateListener<LoadImageUpdateEvent> for LoadImageUpdateListener {
    fn on_update(&mut self, event: &LoadImageUpdateEvent) -> Result<()> {
        if let Some(error) = event.error_detail() {
            return Err(DockerError::Daemon(format!(
                "Error response received when loading image{}: {}",
                self.image, error
            )));
        }
        if let Some(stream) = event.stream().filter(|stream| !stream.trim().is_empty()) {
            self.stream = Some(stream.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::ErrorDetail;

    fn pull_status(status: &str) -> PullImageUpdateEvent {
        PullImageUpdateEvent::new(None, status, None)
    }

    #[test]
    fn test_digest_capture_accepts_repeated_digest() {
        let mut capture = DigestCaptureUpdateListener::default();
        capture.on_update(&pull_status("Pulling from library/ubuntu")).unwrap();
        capture.on_update(&pull_status("Digest: sha256:abc123")).unwrap();
        capture.on_update(&pull_status("Digest: sha256:abc123")).unwrap();
        assert_eq!(capture.digest(), Some("sha256:abc123"));
    }

    #[test]
    fn test_digest_capture_rejects_conflicting_digests() {
        let mut capture = DigestCaptureUpdateListener::default();
        capture.on_update(&pull_status("Digest: abc123")).unwrap();
        let error = capture.on_update(&pull_status("Digest: def456")).unwrap_err();
        assert!(matches!(error, DockerError::InvalidResponse(_)));
        assert_eq!(error.to_string(), "Different digests IDs provided");
    }

    #[test]
    fn test_error_capture_message() {
        let mut capture = ErrorCaptureUpdateListener;
        capture
            .on_update(&PushImageUpdateEvent::new(Some("l1"), "Pushing", None))
            .unwrap();
        let error = capture
            .on_update(&PushImageUpdateEvent::new(None, "", Some(ErrorDetail::new("denied"))))
            .unwrap_err();
        assert_eq!(error.to_string(), "Error response received when pushing image: denied");
    }

    #[test]
    fn test_load_listener_with_tag() {
        let tag = ImageReference::of("my-app:1.0").unwrap();
        let mut listener = LoadImageUpdateListener::new(Some(&tag));
        assert_eq!(
            listener.assert_valid_response_received().unwrap_err().to_string(),
            "Invalid response received when loading image \"my-app:1.0\""
        );
        listener.on_update(&LoadImageUpdateEvent::new("", None)).unwrap();
        assert!(listener.assert_valid_response_received().is_err());
        listener
            .on_update(&LoadImageUpdateEvent::new("Loaded image: my-app:1.0\n", None))
            .unwrap();
        listener.assert_valid_response_received().unwrap();

        let error = listener
            .on_update(&LoadImageUpdateEvent::new("", Some(ErrorDetail::new("bad archive"))))
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Error response received when loading image \"my-app:1.0\": bad archive"
        );
    }

    #[test]
    fn test_load_listener_without_tag() {
        let listener = LoadImageUpdateListener::new(None);
        assert_eq!(
            listener.assert_valid_response_received().unwrap_err().to_string(),
            "Invalid response received when loading image"
        );
    }
}
