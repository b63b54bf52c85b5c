//! Raw input locators: a directory of named files, a zip archive, one file,
//! or uploaded buffers

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::result::ZipError;
use zip::ZipArchive;

const GZIP_SUFFIX: &str = ".gz";
const ZIP_EXTENSION: &str = "zip";

/// Where a data source's raw bytes come from.
///
/// Inputs are addressed by name. A directory resolves `name` to
/// `dir/name`, falling back to `dir/name.gz`; names ending in `.gz` are
/// decompressed when opened for extraction but digested as stored. A zip
/// archive resolves `name` to the entry of that name; its stored bytes are
/// the inflated entry, so an archive digests like the directory it packs.
#[derive(Debug, Clone)]
pub enum InputSet {
    Directory(PathBuf),
    Zip(PathBuf),
    File(PathBuf),
    Memory(Vec<(String, Arc<[u8]>)>),
}

/// A resolved input: the stored name plus where its bytes live
#[derive(Debug, Clone)]
enum Located {
    Path(String, PathBuf),
    Entry(String, PathBuf),
    Bytes(String, Arc<[u8]>),
}

impl Located {
    fn stored_name(&self) -> &str {
        match self {
            Located::Path(name, _) | Located::Entry(name, _) | Located::Bytes(name, _) => name,
        }
    }
}

impl InputSet {
    /// Pick `Directory`, `Zip` or `File` from what exists at `path`
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            InputSet::Directory(path)
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(ZIP_EXTENSION))
        {
            InputSet::Zip(path)
        } else {
            InputSet::File(path)
        }
    }

    pub fn memory<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        InputSet::Memory(
            entries
                .into_iter()
                .map(|(name, bytes)| (name.into(), Arc::from(bytes)))
                .collect(),
        )
    }

    /// File path or description recorded as the data source origin
    pub fn origin(&self) -> String {
        match self {
            InputSet::Directory(path) | InputSet::Zip(path) | InputSet::File(path) => {
                path.display().to_string()
            }
            InputSet::Memory(entries) => {
                let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
                format!("upload:{}", names.join(","))
            }
        }
    }

    /// Every input name available, sorted
    pub fn names(&self) -> io::Result<Vec<String>> {
        let mut names = match self {
            InputSet::Directory(dir) => {
                let mut names = Vec::new();
                for entry in std::fs::read_dir(dir)? {
                    let entry = entry?;
                    if entry.file_type()?.is_file() {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                names
            }
            InputSet::Zip(path) => entry_names(path)?,
            InputSet::File(path) => vec![file_name(path)],
            InputSet::Memory(entries) => entries.iter().map(|(n, _)| n.clone()).collect(),
        };
        names.sort();
        Ok(names)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.locate(name).is_some()
    }

    fn locate(&self, name: &str) -> Option<Located> {
        match self {
            InputSet::Directory(dir) => {
                let plain = dir.join(name);
                if plain.is_file() {
                    return Some(Located::Path(name.to_string(), plain));
                }
                let gz_name = format!("{}{}", name, GZIP_SUFFIX);
                let gz = dir.join(&gz_name);
                gz.is_file().then(|| Located::Path(gz_name, gz))
            }
            InputSet::Zip(path) => {
                let entries = entry_names(path).ok()?;
                let gz_name = format!("{}{}", name, GZIP_SUFFIX);
                entries
                    .into_iter()
                    .find(|e| e == name || *e == gz_name)
                    .map(|e| Located::Entry(e, path.clone()))
            }
            InputSet::File(path) => {
                let stored = file_name(path);
                let matches = stored == name
                    || stored.strip_suffix(GZIP_SUFFIX) == Some(name);
                (matches && path.is_file()).then(|| Located::Path(stored, path.clone()))
            }
            InputSet::Memory(entries) => entries
                .iter()
                .find(|(n, _)| n == name || n.strip_suffix(GZIP_SUFFIX) == Some(name))
                .map(|(n, bytes)| Located::Bytes(n.clone(), bytes.clone())),
        }
    }

    /// Open the stored bytes of an input, exactly as they will be digested
    pub fn open_raw(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let located = self.locate(name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no input named {}", name))
        })?;
        Ok(match located {
            Located::Path(_, path) => Box::new(File::open(path)?),
            Located::Entry(entry, path) => Box::new(Cursor::new(read_entry(&path, &entry)?)),
            Located::Bytes(_, bytes) => Box::new(Cursor::new(bytes)),
        })
    }

    /// Open an input for extraction, decompressing gzip transparently
    pub fn open(&self, name: &str) -> io::Result<Box<dyn BufRead + Send>> {
        let gzipped = self
            .locate(name)
            .map(|l| l.stored_name().ends_with(GZIP_SUFFIX))
            .unwrap_or(false);
        let raw = self.open_raw(name)?;
        Ok(if gzipped {
            Box::new(BufReader::new(GzDecoder::new(raw)))
        } else {
            Box::new(BufReader::new(raw))
        })
    }
}

/// File entries of an archive; directory entries are skipped
fn entry_names(path: &Path) -> io::Result<Vec<String>> {
    let archive = ZipArchive::new(File::open(path)?).map_err(zip_error)?;
    Ok(archive
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(str::to_string)
        .collect())
}

/// Inflate one archive entry into memory
fn read_entry(path: &Path, name: &str) -> io::Result<Vec<u8>> {
    let mut archive = ZipArchive::new(File::open(path)?).map_err(zip_error)?;
    let mut entry = archive.by_name(name).map_err(zip_error)?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn zip_error(e: ZipError) -> io::Error {
    match e {
        ZipError::Io(e) => e,
        ZipError::FileNotFound => io::Error::new(io::ErrorKind::NotFound, "no such archive entry"),
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
