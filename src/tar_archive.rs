//! Tar archive producers used as upload payloads and image layers
//!
//! A [`TarArchive`] is anything able to write a tar byte stream. Archives
//! assembled with [`LayoutArchive`] go through a [`Layout`], which fixes
//! ownership and uses a normalized modification time so identical content
//! always produces identical bytes.

use std::io::{self, Write};
use std::path::Path;

/// `1980-01-01T00:00:01Z`, the modification time of every generated entry
pub const NORMALIZED_MOD_TIME: u64 = 315_532_801;

const DIRECTORY_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Something that can write itself as a tar stream
pub trait TarArchive: Send + Sync {
    fn write_to(&self, output: &mut dyn Write) -> io::Result<()>;
}

/// Already encoded tar bytes
impl TarArchive for Vec<u8> {
    fn write_to(&self, output: &mut dyn Write) -> io::Result<()> {
        output.write_all(self)
    }
}

/// An existing tar file on disk, streamed when written
#[derive(Debug, Clone)]
pub struct TarFile {
    path: std::path::PathBuf,
}

impl TarFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TarArchive for TarFile {
    fn write_to(&self, output: &mut dyn Write) -> io::Result<()> {
        let mut file = std::fs::File::open(&self.path)?;
        io::copy(&mut file, output)?;
        Ok(())
    }
}

/// Tar archive produced by a layout callback
pub struct LayoutArchive<F> {
    layout: F,
}

impl<F> LayoutArchive<F>
where
    F: Fn(&mut Layout<'_>) -> io::Result<()> + Send + Sync,
{
    /// Archive whose entries are added by `layout` each time it is written
    pub fn new(layout: F) -> Self {
        Self { layout }
    }
}

impl<F> TarArchive for LayoutArchive<F>
where
    F: Fn(&mut Layout<'_>) -> io::Result<()> + Send + Sync,
{
    fn write_to(&self, output: &mut dyn Write) -> io::Result<()> {
        let mut layout = Layout {
            builder: tar::Builder::new(output),
        };
        (self.layout)(&mut layout)?;
        layout.builder.finish()
    }
}

/// User and group owning an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u64,
    pub gid: u64,
}

impl Owner {
    pub const ROOT: Owner = Owner { uid: 0, gid: 0 };

    pub fn of(uid: u64, gid: u64) -> Self {
        Self { uid, gid }
    }
}

/// Adds entries to a tar archive being written
pub struct Layout<'a> {
    builder: tar::Builder<&'a mut dyn Write>,
}

impl Layout<'_> {
    /// Add a directory entry; the name gets a trailing `/`
    pub fn directory(&mut self, name: &str, owner: Owner) -> io::Result<()> {
        let mut header = Self::header(owner, DIRECTORY_MODE, tar::EntryType::Directory, 0);
        let name = format!("{}/", name.trim_end_matches('/'));
        self.builder.append_data(&mut header, name, io::empty())
    }

    /// Add a regular file with mode `0644`
    pub fn file(&mut self, name: &str, owner: Owner, content: &[u8]) -> io::Result<()> {
        self.file_with_mode(name, owner, FILE_MODE, content)
    }

    pub fn file_with_mode(&mut self, name: &str, owner: Owner, mode: u32, content: &[u8]) -> io::Result<()> {
        let mut header = Self::header(owner, mode, tar::EntryType::Regular, content.len() as u64);
        self.builder.append_data(&mut header, name, content)
    }

    fn header(owner: Owner, mode: u32, entry_type: tar::EntryType, size: u64) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_mode(mode);
        header.set_uid(owner.uid);
        header.set_gid(owner.gid);
        header.set_mtime(NORMALIZED_MOD_TIME);
        header.set_size(size);
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn layout_archive() -> LayoutArchive<impl Fn(&mut Layout<'_>) -> io::Result<()> + Send + Sync> {
        LayoutArchive::new(|layout| {
            layout.directory("workspace", Owner::of(1000, 1000))?;
            layout.file("workspace/app.txt", Owner::of(1000, 1000), b"hello")
        })
    }

    #[test]
    fn test_layout_entries() {
        let mut bytes = Vec::new();
        layout_archive().write_to(&mut bytes).unwrap();

        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut seen = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let header = entry.header();
            assert_eq!(header.uid().unwrap(), 1000);
            assert_eq!(header.mtime().unwrap(), NORMALIZED_MOD_TIME);
            let path = entry.path().unwrap().to_string_lossy().to_string();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            seen.push((path, content));
        }
        assert_eq!(
            seen,
            vec![
                ("workspace/".to_string(), String::new()),
                ("workspace/app.txt".to_string(), "hello".to_string()),
            ]
        );
    }

    #[test]
    fn test_layout_output_is_reproducible() {
        let mut first = Vec::new();
        let mut second = Vec::new();
        layout_archive().write_to(&mut first).unwrap();
        layout_archive().write_to(&mut second).unwrap();
        assert_eq!(first, second);
    }
}
