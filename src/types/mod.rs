//! Value types exchanged with the Docker Engine API

pub mod container;
pub mod image;
pub mod image_archive;
pub mod image_reference;
pub mod volume;

pub use container::{ContainerConfig, ContainerConfigBuilder, ContainerContent, ContainerReference, ContainerStatus};
pub use image::{Image, ImageConfig};
pub use image_archive::{ImageArchive, ImageArchiveBuilder, Layer};
pub use image_reference::ImageReference;
pub use volume::VolumeName;
