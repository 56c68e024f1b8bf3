//! Images assembled in memory and written in `docker load` format

use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use crate::digest::{DigestUtils, DigestWriter};
use crate::error::{DockerError, Result};
use crate::tar_archive::{NORMALIZED_MOD_TIME, TarArchive, TarFile};
use crate::types::{ImageConfig, ImageReference};

/// Creation date written for images that do not set one
pub const DEFAULT_CREATED: &str = "1980-01-01T00:00:01Z";

/// A single image layer: the uncompressed tar and its `sha256:` diff id
#[derive(Clone)]
pub struct Layer {
    id: String,
    content: Vec<u8>,
}

impl Layer {
    /// Materialize `archive` and compute its diff id
    pub fn of(archive: &dyn TarArchive) -> Result<Self> {
        let mut writer = DigestWriter::new(Vec::new());
        archive.write_to(&mut writer)?;
        let (content, id) = writer.finish();
        Ok(Self { id, content })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    fn file_name(&self) -> String {
        format!("{}.tar", self.id.trim_start_matches("sha256:"))
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("size", &self.content.len())
            .finish()
    }
}

impl TarArchive for Layer {
    fn write_to(&self, output: &mut dyn Write) -> io::Result<()> {
        output.write_all(&self.content)
    }
}

#[derive(Debug)]
enum Contents {
    Assembled {
        config: ImageConfig,
        os: String,
        architecture: String,
        created: String,
        layers: Vec<Layer>,
    },
    File(TarFile),
}

/// A full image that can be posted to the load endpoint
#[derive(Debug)]
pub struct ImageArchive {
    tag: Option<ImageReference>,
    contents: Contents,
}

#[derive(Serialize)]
struct ArchiveConfig<'a> {
    architecture: &'a str,
    os: &'a str,
    created: &'a str,
    config: &'a ImageConfig,
    rootfs: RootFs<'a>,
}

#[derive(Serialize)]
struct RootFs<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    diff_ids: Vec<&'a str>,
}

#[derive(Serialize)]
struct ManifestEntry {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "RepoTags")]
    repo_tags: Vec<String>,
    #[serde(rename = "Layers")]
    layers: Vec<String>,
}

impl ImageArchive {
    pub fn builder(config: ImageConfig) -> ImageArchiveBuilder {
        ImageArchiveBuilder {
            config,
            os: "linux".to_string(),
            architecture: "amd64".to_string(),
            created: DEFAULT_CREATED.to_string(),
            tag: None,
            layers: Vec::new(),
        }
    }

    /// Wrap an image tar already on disk, such as the output of `docker save`
    pub fn from_file(path: impl AsRef<Path>, tag: Option<ImageReference>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DockerError::invalid_argument(format!(
                "Image archive '{}' does not exist",
                path.display()
            )));
        }
        Ok(Self {
            tag,
            contents: Contents::File(TarFile::new(path)),
        })
    }

    pub fn tag(&self) -> Option<&ImageReference> {
        self.tag.as_ref()
    }

    /// Write the archive, the request body of an image load
    pub fn write_to(&self, output: &mut dyn Write) -> io::Result<()> {
        match &self.contents {
            Contents::File(file) => file.write_to(output),
            Contents::Assembled {
                config,
                os,
                architecture,
                created,
                layers,
            } => {
                let archive_config = ArchiveConfig {
                    architecture,
                    os,
                    created,
                    config,
                    rootfs: RootFs {
                        kind: "layers",
                        diff_ids: layers.iter().map(Layer::id).collect(),
                    },
                };
                let config_json = serde_json::to_vec(&archive_config).map_err(io::Error::from)?;
                let config_name = format!("{}.json", DigestUtils::compute_sha256(&config_json));

                let manifest = vec![ManifestEntry {
                    config: config_name.clone(),
                    repo_tags: self.tag.iter().map(ToString::to_string).collect(),
                    layers: layers.iter().map(Layer::file_name).collect(),
                }];
                let manifest_json = serde_json::to_vec(&manifest).map_err(io::Error::from)?;

                let mut builder = tar::Builder::new(output);
                for layer in layers {
                    append(&mut builder, &layer.file_name(), &layer.content)?;
                }
                append(&mut builder, &config_name, &config_json)?;
                append(&mut builder, "manifest.json", &manifest_json)?;
                builder.finish()
            }
        }
    }
}

fn append(builder: &mut tar::Builder<&mut dyn Write>, name: &str, content: &[u8]) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(0o644);
    header.set_mtime(NORMALIZED_MOD_TIME);
    header.set_size(content.len() as u64);
    builder.append_data(&mut header, name, content)
}

/// Builder for an assembled [`ImageArchive`]
#[derive(Debug)]
pub struct ImageArchiveBuilder {
    config: ImageConfig,
    os: String,
    architecture: String,
    created: String,
    tag: Option<ImageReference>,
    layers: Vec<Layer>,
}

impl ImageArchiveBuilder {
    pub fn tag(mut self, tag: ImageReference) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn os(mut self, os: &str) -> Self {
        self.os = os.to_string();
        self
    }

    pub fn architecture(mut self, architecture: &str) -> Self {
        self.architecture = architecture.to_string();
        self
    }

    /// RFC 3339 creation timestamp
    pub fn created(mut self, created: &str) -> Self {
        self.created = created.to_string();
        self
    }

    pub fn layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn build(self) -> Result<ImageArchive> {
        if self.layers.is_empty() {
            return Err(DockerError::invalid_argument("Image archive must contain at least one layer"));
        }
        Ok(ImageArchive {
            tag: self.tag,
            contents: Contents::Assembled {
                config: self.config,
                os: self.os,
                architecture: self.architecture,
                created: self.created,
                layers: self.layers,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tar_archive::{Layout, LayoutArchive, Owner};
    use std::collections::BTreeMap;
    use std::io::Read;

    fn layer(content: &'static [u8]) -> Layer {
        let archive = LayoutArchive::new(move |layout: &mut Layout<'_>| {
            layout.file("app/data.txt", Owner::ROOT, content)
        });
        Layer::of(&archive).unwrap()
    }

    fn entries(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
        let mut archive = tar::Archive::new(bytes);
        let mut entries = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            entries.insert(name, content);
        }
        entries
    }

    #[test]
    fn test_layer_id_is_content_digest() {
        let layer = layer(b"one");
        let mut content = Vec::new();
        layer.write_to(&mut content).unwrap();
        assert_eq!(layer.id(), DigestUtils::compute_docker_digest(&content));
    }

    #[test]
    fn test_assembled_archive_layout() {
        let first = layer(b"one");
        let second = layer(b"two");
        let config = ImageConfig {
            env: vec!["PATH=/bin".to_string()],
            ..ImageConfig::default()
        };
        let archive = ImageArchive::builder(config)
            .tag(ImageReference::of("my-app:1.0").unwrap())
            .layer(first.clone())
            .layer(second.clone())
            .build()
            .unwrap();

        let mut bytes = Vec::new();
        archive.write_to(&mut bytes).unwrap();
        let entries = entries(&bytes);

        let manifest: serde_json::Value = serde_json::from_slice(&entries["manifest.json"]).unwrap();
        assert_eq!(manifest[0]["RepoTags"][0], "my-app:1.0");
        let layers = manifest[0]["Layers"].as_array().unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0], first.file_name());
        assert_eq!(layers[1], second.file_name());

        let config_name = manifest[0]["Config"].as_str().unwrap();
        let config_bytes = &entries[config_name];
        assert_eq!(
            config_name,
            format!("{}.json", DigestUtils::compute_sha256(config_bytes))
        );
        let config: serde_json::Value = serde_json::from_slice(config_bytes).unwrap();
        assert_eq!(config["os"], "linux");
        assert_eq!(config["created"], DEFAULT_CREATED);
        assert_eq!(config["config"]["Env"][0], "PATH=/bin");
        assert_eq!(config["rootfs"]["diff_ids"][0], first.id());
        assert_eq!(config["rootfs"]["diff_ids"][1], second.id());
    }

    #[test]
    fn test_archive_without_layers_is_rejected() {
        let result = ImageArchive::builder(ImageConfig::default()).build();
        assert!(matches!(result, Err(DockerError::InvalidArgument(_))));
    }

    #[test]
    fn test_file_archive_streams_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"raw tar bytes").unwrap();
        let archive = ImageArchive::from_file(file.path(), None).unwrap();
        let mut bytes = Vec::new();
        archive.write_to(&mut bytes).unwrap();
        assert_eq!(bytes, b"raw tar bytes");
        assert!(ImageArchive::from_file("/does/not/exist.tar", None).is_err());
    }
}
