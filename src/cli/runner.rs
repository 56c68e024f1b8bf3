//! Runner executing the parsed command against the daemon

use std::fs;
use std::path::Path;

use crate::api::DockerApi;
use crate::cli::args::{Args, AuthArgs, Command, RunArgs, parse_copy, parse_key_value};
use crate::error::{DockerError, Result};
use crate::logging::Logger;
use crate::tar_archive::{LayoutArchive, Owner};
use crate::types::{ContainerConfig, ContainerContent, ContainerReference, ImageArchive, ImageReference, VolumeName};
use crate::update::{
    Chain, LoadImageUpdateEvent, LogUpdateEvent, ProgressUpdateEvent, PullImageUpdateEvent, PushImageUpdateEvent,
    TotalProgressListener, from_fn,
};

pub struct Runner {
    args: Args,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        let output = if args.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(args.verbose)
        };
        Self { args, output }
    }

    pub fn output(&self) -> &Logger {
        &self.output
    }

    /// Run the command and return the process exit code
    pub fn run(&self) -> Result<i32> {
        let host = self.args.host_config();
        self.output.detail(&format!("Docker host: {}", host.address()));
        let api = DockerApi::from_config(&host)?;

        let code = match &self.args.command {
            Command::Pull { image, auth } => self.pull(&api, image, auth).map(|_| 0)?,
            Command::Push { image, auth } => self.push(&api, image, auth).map(|_| 0)?,
            Command::Load { file, tag } => self.load(&api, file, tag.as_deref()).map(|_| 0)?,
            Command::Export { image, output } => self.export(&api, image, output).map(|_| 0)?,
            Command::Inspect { image } => self.inspect(&api, image).map(|_| 0)?,
            Command::Tag { source, target } => {
                api.image().tag(&ImageReference::of(source)?, &ImageReference::of(target)?)?;
                self.output.success(&format!("Tagged {} as {}", source, target));
                0
            }
            Command::Rmi { image, force } => {
                api.image().remove(&ImageReference::of(image)?, *force)?;
                self.output.success(&format!("Removed image {}", image));
                0
            }
            Command::Run(run) => self.run_container(&api, run)?,
            Command::VolumeRm { name, force } => {
                api.volume().delete(&VolumeName::of(name)?, *force)?;
                self.output.success(&format!("Removed volume {}", name));
                0
            }
        };

        self.output
            .detail(&format!("Finished in {}", self.output.format_duration(self.output.elapsed())));
        Ok(code)
    }

    fn pull(&self, api: &DockerApi, image: &str, auth: &AuthArgs) -> Result<()> {
        let reference = ImageReference::of(image)?;
        let auth = auth.registry_auth()?.map(|auth| auth.to_header()).transpose()?;
        self.output.section(&format!("Pulling {}", reference));

        let mut progress = TotalProgressListener::pull(|event| self.output.total_progress("Pulling", event));
        let mut details = from_fn(|event: &PullImageUpdateEvent| {
            self.log_status(event);
            Ok(())
        });
        let image = api
            .image()
            .pull(&reference, &mut Chain::new(&mut progress, &mut details), auth.as_deref())?;

        self.output.success(&format!("Pulled {} ({})", reference, image.id()));
        Ok(())
    }

    fn push(&self, api: &DockerApi, image: &str, auth: &AuthArgs) -> Result<()> {
        let reference = ImageReference::of(image)?;
        let auth = auth.registry_auth()?.map(|auth| auth.to_header()).transpose()?;
        self.output.section(&format!("Pushing {}", reference));

        let mut progress = TotalProgressListener::push(|event| self.output.total_progress("Pushing", event));
        let mut details = from_fn(|event: &PushImageUpdateEvent| {
            self.log_status(event);
            Ok(())
        });
        api.image()
            .push(&reference, &mut Chain::new(&mut progress, &mut details), auth.as_deref())?;

        self.output.success(&format!("Pushed {}", reference));
        Ok(())
    }

    fn load(&self, api: &DockerApi, file: &Path, tag: Option<&str>) -> Result<()> {
        let tag = tag.map(ImageReference::of).transpose()?;
        let size = fs::metadata(file)?.len();
        self.output.section("Loading image");
        self.output
            .info(&format!("Archive: {} ({})", file.display(), self.output.format_size(size)));

        let archive = ImageArchive::from_file(file, tag)?;
        api.image().load(
            &archive,
            &mut from_fn(|event: &LoadImageUpdateEvent| {
                if let Some(stream) = event.stream().map(str::trim).filter(|stream| !stream.is_empty()) {
                    self.output.info(stream);
                }
                Ok(())
            }),
        )?;
        self.output.success("Image loaded");
        Ok(())
    }

    fn export(&self, api: &DockerApi, image: &str, output: &Path) -> Result<()> {
        let reference = ImageReference::of(image)?;
        fs::create_dir_all(output)?;
        self.output.section(&format!("Exporting layers of {}", reference));

        let mut count = 0usize;
        api.image().export_layers(&reference, |name, archive| {
            count += 1;
            let path = output.join(layer_file_name(count, name));
            let mut file = fs::File::create(&path)?;
            let size = std::io::copy(archive, &mut file)?;
            self.output.step(&format!(
                "{} -> {} ({})",
                name,
                path.display(),
                self.output.format_size(size)
            ));
            Ok(())
        })?;

        self.output.success(&format!("Exported {} layers to {}", count, output.display()));
        Ok(())
    }

    fn inspect(&self, api: &DockerApi, image: &str) -> Result<()> {
        let reference = ImageReference::of(image)?;
        let image = api.image().inspect(&reference)?;
        let mut items = vec![
            ("Id", image.id().to_string()),
            ("Os", image.os().to_string()),
            ("Architecture", image.architecture().unwrap_or("-").to_string()),
            ("Created", image.created().unwrap_or("-").to_string()),
            ("Layers", image.layers().len().to_string()),
        ];
        if let Some(digest) = image.digests().first() {
            items.push(("Digest", digest.clone()));
        }
        self.output.summary_kv(&reference.to_string(), &items);
        for layer in image.layers() {
            self.output.detail(layer);
        }
        Ok(())
    }

    fn run_container(&self, api: &DockerApi, run: &RunArgs) -> Result<i32> {
        let reference = ImageReference::of(&run.image)?;
        let config = container_config(&reference, run)?;
        let contents = run
            .copies
            .iter()
            .map(|copy| copy_content(copy))
            .collect::<Result<Vec<_>>>()?;

        self.output.section(&format!("Running {}", reference));
        let container = api.container().create(&config, &contents)?;
        self.output.step(&format!("Created container {}", container));

        let result = self.start_and_follow(api, &container);

        if !run.keep {
            match api.container().remove(&container, true) {
                Ok(()) => self.output.detail(&format!("Removed container {}", container)),
                Err(e) => self
                    .output
                    .warning(&format!("Unable to remove container {}: {}", container, e)),
            }
        }

        let status = result?;
        if let Some(message) = status.error_message() {
            self.output.error(message);
        }
        let code = i32::try_from(status.status_code()).unwrap_or(1);
        if code == 0 {
            self.output.success("Container exited successfully");
        } else {
            self.output.warning(&format!("Container exited with status {}", code));
        }
        Ok(code)
    }

    fn start_and_follow(
        &self,
        api: &DockerApi,
        container: &ContainerReference,
    ) -> Result<crate::types::ContainerStatus> {
        api.container().start(container)?;
        api.container().logs(
            container,
            &mut from_fn(|event: &LogUpdateEvent| {
                self.output.container_output(event);
                Ok(())
            }),
        )?;
        api.container().wait(container)
    }

    fn log_status<E: ProgressUpdateEvent>(&self, event: &E) {
        if let Some(status) = event.status() {
            self.output.detail(status);
        }
    }
}

fn container_config(reference: &ImageReference, run: &RunArgs) -> Result<ContainerConfig> {
    let mut builder = ContainerConfig::builder(reference).command(run.command.iter());
    for env in &run.env {
        let (name, value) = parse_key_value(env)?;
        builder = builder.env(name, value);
    }
    for label in &run.labels {
        let (name, value) = parse_key_value(label)?;
        builder = builder.label(name, value);
    }
    for binding in &run.bindings {
        builder = builder.binding(binding);
    }
    if let Some(user) = &run.user {
        builder = builder.user(user);
    }
    if let Some(network) = &run.network {
        builder = builder.network_mode(network);
    }
    Ok(builder.build())
}

/// Archive holding one local file, uploaded into a container directory
fn copy_content(copy: &str) -> Result<ContainerContent> {
    let (local, destination) = parse_copy(copy)?;
    let name = local
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| DockerError::invalid_argument(format!("'{}' is not a file", local.display())))?;
    let content = fs::read(&local)?;
    let archive = LayoutArchive::new(move |layout| layout.file(&name, Owner::ROOT, &content));
    ContainerContent::of(archive, destination)
}

/// File name for the `index`th exported layer, unique within the output directory
fn layer_file_name(index: usize, name: &str) -> String {
    let flat = name.replace(['/', '\\', ':'], "_");
    if flat.ends_with(".tar") {
        format!("{:03}-{}", index, flat)
    } else {
        format!("{:03}-{}.tar", index, flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_file_names() {
        assert_eq!(layer_file_name(1, "abc/layer.tar"), "001-abc_layer.tar");
        assert_eq!(layer_file_name(12, "blobs/sha256/0123"), "012-blobs_sha256_0123.tar");
    }

    #[test]
    fn test_container_config_from_arguments() {
        let run = RunArgs {
            image: "builder:base".to_string(),
            env: vec!["A=1".to_string()],
            labels: vec!["author=ci".to_string()],
            user: Some("1000:1000".to_string()),
            command: vec!["/bin/true".to_string()],
            ..RunArgs::default()
        };
        let config = container_config(&ImageReference::of(&run.image).unwrap(), &run).unwrap();
        let json: serde_json::Value = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(json["Cmd"], serde_json::json!(["/bin/true"]));
        assert_eq!(json["Env"], serde_json::json!(["A=1"]));
        assert_eq!(json["Labels"]["author"], "ci");
        assert_eq!(json["User"], "1000:1000");
    }

    #[test]
    fn test_copy_content_archives_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.jar");
        fs::write(&path, b"jar bytes").unwrap();

        let content = copy_content(&format!("{}:/workspace", path.display())).unwrap();
        assert_eq!(content.destination_path(), "/workspace");

        let mut bytes = Vec::new();
        content.archive().write_to(&mut bytes).unwrap();
        let mut archive = tar::Archive::new(bytes.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["app.jar"]);
    }
}
