//! Reader for the tar produced by the image export endpoint
//!
//! Depending on the daemon version an export is either a `docker save`
//! archive listing its layers in `manifest.json`, or an OCI image layout
//! where layers are found by walking `index.json` down to the image
//! manifests. In both cases `manifest.json` and `index.json` may come after
//! the layers, so the export is spooled once to an anonymous temporary file
//! and layers are then read back by offset in manifest order.

use flate2::read::GzDecoder;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{DockerError, Result};
use crate::types::ImageReference;

const MANIFEST_JSON: &str = "manifest.json";
const INDEX_JSON: &str = "index.json";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Nested OCI indexes deeper than this are not followed
const MAX_INDEX_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy)]
struct EntryLocation {
    offset: u64,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct DockerManifest {
    #[serde(rename = "Layers", default)]
    layers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    digest: String,
}

/// Either an OCI index or an OCI image manifest
#[derive(Debug, Deserialize)]
struct OciDocument {
    #[serde(default)]
    manifests: Option<Vec<Descriptor>>,
    #[serde(default)]
    layers: Option<Vec<Descriptor>>,
}

/// A spooled image export with its layer entries located
pub struct ExportedImageTar {
    reference: String,
    file: File,
    entries: HashMap<String, EntryLocation>,
    layers: Vec<String>,
}

impl ExportedImageTar {
    /// Spool `content` and locate the layers of the exported image
    pub fn new(reference: &ImageReference, mut content: impl Read) -> Result<Self> {
        let mut file = tempfile::tempfile()?;
        let spooled = io::copy(&mut content, &mut file)?;
        file.seek(SeekFrom::Start(0))?;
        tracing::debug!(reference = %reference, bytes = spooled, "Spooled image export");

        let mut export = Self {
            reference: reference.to_string(),
            file,
            entries: HashMap::new(),
            layers: Vec::new(),
        };
        let (manifest, index) = export.scan()?;
        export.layers = match (manifest, index) {
            (Some(manifests), _) => manifests.into_iter().flat_map(|manifest| manifest.layers).collect(),
            (None, Some(index)) => export.oci_layers(index)?,
            (None, None) => {
                return Err(DockerError::protocol(format!(
                    "Exported image '{}' does not contain '{}' or '{}'",
                    export.reference, INDEX_JSON, MANIFEST_JSON
                )));
            }
        };
        dedup_in_order(&mut export.layers);
        Ok(export)
    }

    /// Layer entry names in manifest order
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    /// Record where every entry lives and decode the manifests on the way
    fn scan(&mut self) -> Result<(Option<Vec<DockerManifest>>, Option<OciDocument>)> {
        let mut manifest = None;
        let mut index = None;
        let mut archive = tar::Archive::new(&mut self.file);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = normalize(&entry.path()?.to_string_lossy());
            let location = EntryLocation {
                offset: entry.raw_file_position(),
                size: entry.size(),
            };
            match name.as_str() {
                MANIFEST_JSON => manifest = Some(serde_json::from_reader(&mut entry)?),
                INDEX_JSON => index = Some(serde_json::from_reader(&mut entry)?),
                _ => {}
            }
            self.entries.insert(name, location);
        }
        tracing::trace!(entries = self.entries.len(), "Scanned image export");
        Ok((manifest, index))
    }

    /// Layers of every image manifest reachable from `index` whose blob was exported
    fn oci_layers(&mut self, index: OciDocument) -> Result<Vec<String>> {
        let mut layers = Vec::new();
        let mut pending: Vec<(Descriptor, usize)> =
            index.manifests.unwrap_or_default().into_iter().rev().map(|d| (d, 0)).collect();
        while let Some((descriptor, depth)) = pending.pop() {
            let name = blob_path(&descriptor.digest);
            if !self.entries.contains_key(&name) || depth > MAX_INDEX_DEPTH {
                continue;
            }
            let document: OciDocument = serde_json::from_reader(self.open(&name)?)?;
            if let Some(manifests) = document.manifests {
                pending.extend(manifests.into_iter().rev().map(|d| (d, depth + 1)));
            }
            if let Some(manifest_layers) = document.layers {
                layers.extend(manifest_layers.iter().map(|layer| blob_path(&layer.digest)));
            }
        }
        Ok(layers)
    }

    /// Bounded reader over the raw bytes of entry `name`
    fn open(&mut self, name: &str) -> Result<io::Take<&mut File>> {
        let location = *self.entries.get(name).ok_or_else(|| {
            DockerError::protocol(format!(
                "Exported image '{}' does not contain layer '{}'",
                self.reference, name
            ))
        })?;
        self.file.seek(SeekFrom::Start(location.offset))?;
        Ok((&mut self.file).take(location.size))
    }

    fn is_gzip(&mut self, name: &str) -> Result<bool> {
        let mut magic = [0u8; 2];
        let mut reader = self.open(name)?;
        let mut read = 0;
        while read < magic.len() {
            match reader.read(&mut magic[read..])? {
                0 => return Ok(false),
                n => read += n,
            }
        }
        Ok(magic == GZIP_MAGIC)
    }

    /// Pass every layer, in manifest order, to `consumer` as an uncompressed tar stream
    pub fn export_layers<F>(mut self, mut consumer: F) -> Result<()>
    where
        F: FnMut(&str, &mut dyn Read) -> Result<()>,
    {
        let layers = std::mem::take(&mut self.layers);
        for name in &layers {
            let gzip = self.is_gzip(name)?;
            let reader = self.open(name)?;
            tracing::debug!(layer = %name, gzip, "Exporting layer");
            if gzip {
                consumer(name, &mut GzDecoder::new(reader))?;
            } else {
                let mut reader = reader;
                consumer(name, &mut reader)?;
            }
        }
        Ok(())
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./").to_string()
}

/// Entry name of the blob with `digest`, e.g. `blobs/sha256/<hex>`
fn blob_path(digest: &str) -> String {
    match digest.split_once(':') {
        Some((algorithm, hex)) => format!("blobs/{}/{}", algorithm, hex),
        None => format!("blobs/{}", digest),
    }
}

fn dedup_in_order(names: &mut Vec<String>) {
    let mut seen = HashSet::new();
    names.retain(|name| seen.insert(name.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn append(builder: &mut tar::Builder<Vec<u8>>, name: &str, content: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, content).unwrap();
    }

    fn reference() -> ImageReference {
        ImageReference::of("my-app:latest").unwrap()
    }

    fn collect(export: ExportedImageTar) -> Result<Vec<(String, Vec<u8>)>> {
        let mut layers = Vec::new();
        export.export_layers(|name, archive| {
            let mut content = Vec::new();
            archive.read_to_end(&mut content)?;
            layers.push((name.to_string(), content));
            Ok(())
        })?;
        Ok(layers)
    }

    #[test]
    fn test_docker_export_in_manifest_order() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "layer2.tar", b"second layer");
        append(&mut builder, "layer1.tar", b"first layer");
        append(&mut builder, "config.json", b"{}");
        append(
            &mut builder,
            "manifest.json",
            br#"[{"Config":"config.json","RepoTags":["my-app:latest"],"Layers":["layer1.tar","layer2.tar"]}]"#,
        );
        let bytes = builder.into_inner().unwrap();

        let export = ExportedImageTar::new(&reference(), bytes.as_slice()).unwrap();
        assert_eq!(export.layers(), ["layer1.tar", "layer2.tar"]);
        assert_eq!(
            collect(export).unwrap(),
            vec![
                ("layer1.tar".to_string(), b"first layer".to_vec()),
                ("layer2.tar".to_string(), b"second layer".to_vec()),
            ]
        );
    }

    #[test]
    fn test_oci_export_with_nested_index_and_gzip_layer() {
        let layer_digest = format!("sha256:{}", "a".repeat(64));
        let manifest_digest = format!("sha256:{}", "b".repeat(64));
        let nested_digest = format!("sha256:{}", "c".repeat(64));
        let missing_digest = format!("sha256:{}", "d".repeat(64));

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"uncompressed layer tar").unwrap();
        let gzipped = encoder.finish().unwrap();

        let index = format!(
            r#"{{"schemaVersion":2,"manifests":[{{"digest":"{}"}},{{"digest":"{}"}}]}}"#,
            missing_digest, nested_digest
        );
        let nested = format!(r#"{{"schemaVersion":2,"manifests":[{{"digest":"{}"}}]}}"#, manifest_digest);
        let manifest = format!(r#"{{"schemaVersion":2,"layers":[{{"digest":"{}"}}]}}"#, layer_digest);

        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, &blob_path(&layer_digest), &gzipped);
        append(&mut builder, &blob_path(&manifest_digest), manifest.as_bytes());
        append(&mut builder, &blob_path(&nested_digest), nested.as_bytes());
        append(&mut builder, "index.json", index.as_bytes());
        let bytes = builder.into_inner().unwrap();

        let export = ExportedImageTar::new(&reference(), bytes.as_slice()).unwrap();
        let layers = collect(export).unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].0, format!("blobs/sha256/{}", "a".repeat(64)));
        assert_eq!(layers[0].1, b"uncompressed layer tar");
    }

    #[test]
    fn test_export_without_manifest_is_a_protocol_error() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "layer1.tar", b"data");
        let bytes = builder.into_inner().unwrap();

        let error = ExportedImageTar::new(&reference(), bytes.as_slice()).err().unwrap();
        assert!(matches!(error, DockerError::Protocol(_)));
        assert!(error.to_string().contains("does not contain 'index.json' or 'manifest.json'"));
    }

    #[test]
    fn test_manifest_naming_a_missing_layer_is_a_protocol_error() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "manifest.json", br#"[{"Layers":["missing.tar"]}]"#);
        let bytes = builder.into_inner().unwrap();

        let export = ExportedImageTar::new(&reference(), bytes.as_slice()).unwrap();
        assert!(matches!(collect(export), Err(DockerError::Protocol(_))));
    }

    #[test]
    fn test_consumer_error_stops_the_export() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "a.tar", b"a");
        append(&mut builder, "b.tar", b"b");
        append(&mut builder, "manifest.json", br#"[{"Layers":["a.tar","b.tar"]}]"#);
        let bytes = builder.into_inner().unwrap();

        let mut calls = 0;
        let result = ExportedImageTar::new(&reference(), bytes.as_slice())
            .unwrap()
            .export_layers(|_, _| {
                calls += 1;
                Err(DockerError::Aborted("stop".to_string()))
            });
        assert!(matches!(result, Err(DockerError::Aborted(_))));
        assert_eq!(calls, 1);
    }
}
