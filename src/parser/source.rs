//! Content source abstraction for reading forms from the filesystem or from
//! `.ccz` application archives.

use super::XForm;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::Read;

/// Separator between an archive path and a member path: `app.ccz!m0/f0.xml`.
pub const ARCHIVE_SEPARATOR: char = '!';

/// Trait for abstracting file I/O (filesystem vs. ZIP source).
pub trait ContentSource {
    /// Read a file at the given logical path and return its raw content.
    fn read_bytes(&mut self, path: &Utf8Path) -> Result<Vec<u8>>;
    /// List files in a directory path (logical path for the source), returning full paths.
    fn list_dir(&mut self, path: &Utf8Path) -> Result<Vec<Utf8PathBuf>>;
}

/// Reads files directly from the local filesystem.
pub struct FsSource;

impl ContentSource for FsSource {
    fn read_bytes(&mut self, path: &Utf8Path) -> Result<Vec<u8>> {
        std::fs::read(path.as_std_path()).with_context(|| format!("Failed to read {}", path))
    }

    fn list_dir(&mut self, path: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        let mut files = Vec::new();
        for entry in
            std::fs::read_dir(path.as_std_path()).with_context(|| format!("Read dir {}", path))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let p = Utf8PathBuf::from_path_buf(entry.path())
                    .map_err(|_| anyhow::anyhow!("Non-UTF8 path in {}", path))?;
                files.push(p);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Reads files from a ZIP archive (used for `.ccz` files).
pub struct ZipSource<R: Read + std::io::Seek> {
    zip: zip::ZipArchive<R>,
}

impl<R: Read + std::io::Seek> ZipSource<R> {
    pub fn new(reader: R) -> Result<Self> {
        let zip = zip::ZipArchive::new(reader).context("Failed to open zip archive")?;
        Ok(Self { zip })
    }
}

fn member_name(path: &Utf8Path) -> String {
    path.as_str()
        .trim_start_matches("./")
        .trim_start_matches('/')
        .to_string()
}

impl<R: Read + std::io::Seek> ContentSource for ZipSource<R> {
    fn read_bytes(&mut self, path: &Utf8Path) -> Result<Vec<u8>> {
        let p = member_name(path);
        let mut f = self
            .zip
            .by_name(&p)
            .with_context(|| format!("File {} not found in zip", p))?;
        let mut bytes = Vec::new();
        f.read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read {} from zip", p))?;
        Ok(bytes)
    }

    fn list_dir(&mut self, path: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        let mut files = Vec::new();
        let mut prefix = member_name(path);
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        for i in 0..self.zip.len() {
            let name = self.zip.by_index(i)?.name().to_string();
            if name.starts_with(&prefix) && !name.ends_with('/') {
                files.push(Utf8PathBuf::from(name));
            }
        }
        Ok(files)
    }
}

/// Parse a form from any source.
pub fn read_form(source: &mut dyn ContentSource, path: &Utf8Path) -> Result<XForm> {
    let bytes = source.read_bytes(path)?;
    XForm::parse_bytes(&bytes).with_context(|| format!("Failed to parse {}", path))
}

/// `*.xml` files directly under `dir` of a source.
pub fn list_forms(source: &mut dyn ContentSource, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    Ok(source
        .list_dir(dir)?
        .into_iter()
        .filter(|p| p.extension() == Some("xml"))
        .collect())
}

/// Every `*.xml` member of a `.ccz` archive as an `archive!member` location.
pub fn archive_forms(archive: &Utf8Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(archive).with_context(|| format!("Open {}", archive))?;
    let mut source = ZipSource::new(std::io::BufReader::new(file))?;
    Ok(list_forms(&mut source, Utf8Path::new(""))?
        .into_iter()
        .map(|member| format!("{}{}{}", archive, ARCHIVE_SEPARATOR, member))
        .collect())
}

/// Load `form.xml` or `app.ccz!path/inside.xml`.
pub fn load_form(location: &str) -> Result<XForm> {
    match location.split_once(ARCHIVE_SEPARATOR) {
        Some((archive, member)) => {
            let file = std::fs::File::open(archive).with_context(|| format!("Open {}", archive))?;
            let mut source = ZipSource::new(std::io::BufReader::new(file))?;
            read_form(&mut source, Utf8Path::new(member))
        }
        None => read_form(&mut FsSource, Utf8Path::new(location)),
    }
}
