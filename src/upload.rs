//! Upload boundary: turns a file payload or a URI plus form parameters into
//! an ingestion request

use crate::adapter::json::JSON;
use crate::adapter::sdf::SDF;
use crate::adapter::InputSet;
use crate::graph::CurationError;
use crate::pipeline::{CurationPipeline, IngestReport, IngestRequest};
use crate::stitch::{KeyPolicy, PolicyError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FILE_SCHEME: &str = "file://";

/// Form parameters with a meaning of their own; the rest become metadata
const FORMAT_PARAM: &str = "format";
const NAME_PARAM: &str = "name";
const DIGEST_PARAM: &str = "sha1";
const KEY_PARAM: &str = "key";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Either File and/or URI must be specified!")]
    NothingToUpload,

    #[error("Unsupported URI scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Input not found: {0}")]
    InputNotFound(String),

    #[error("Cannot infer format of {0}; pass a 'format' parameter")]
    UnknownFormat(String),

    #[error("Invalid key mapping: {0}")]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Curation(#[from] CurationError),
}

/// A multipart upload as the web layer hands it over.
///
/// When both are present the uploaded files win and the URI is kept as
/// metadata.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub files: Vec<(String, Vec<u8>)>,
    pub uri: Option<String>,
    /// Multi-valued form fields
    pub params: BTreeMap<String, Vec<String>>,
}

impl UploadRequest {
    pub fn file(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            files: vec![(name.into(), bytes)],
            ..Self::default()
        }
    }

    pub fn uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.entry(name.into()).or_default().push(value.into());
        self
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Validate the payload and build the request the pipeline runs
    pub fn into_ingest(self) -> Result<IngestRequest, UploadError> {
        let uri = self.uri.as_deref().map(str::trim).filter(|u| !u.is_empty());
        let (input, origin_name) = if !self.files.is_empty() {
            let first = self.files[0].0.clone();
            (InputSet::memory(self.files.iter().cloned()), first)
        } else if let Some(uri) = uri {
            let path = resolve_uri(uri)?;
            if !path.exists() {
                return Err(UploadError::InputNotFound(uri.to_string()));
            }
            let name = file_name(&path);
            (InputSet::from_path(path), name)
        } else {
            return Err(UploadError::NothingToUpload);
        };

        let format = match self.param(FORMAT_PARAM) {
            Some(format) => format.to_string(),
            None => infer_format(&origin_name).ok_or_else(|| UploadError::UnknownFormat(origin_name.clone()))?,
        };
        let name = self.param(NAME_PARAM).map_or(origin_name, str::to_string);

        let mut request = IngestRequest::new(name, format, input);
        if let Some(digest) = self.param(DIGEST_PARAM) {
            request = request.with_expected_digest(digest);
        }
        if let Some(mappings) = self.params.get(KEY_PARAM) {
            let policy = KeyPolicy::parse_mappings(
                mappings.iter().flat_map(|m| m.split(',')).map(str::trim).filter(|m| !m.is_empty()),
            )?;
            if !policy.is_empty() {
                request = request.with_policy(policy);
            }
        }
        if !self.files.is_empty() {
            if let Some(uri) = uri {
                request = request.with_metadata("uri", uri);
            }
        }
        for (key, values) in &self.params {
            if [FORMAT_PARAM, NAME_PARAM, DIGEST_PARAM, KEY_PARAM].contains(&key.as_str()) {
                continue;
            }
            request = request.with_metadata(key.clone(), values.join(","));
        }
        Ok(request)
    }
}

/// Validate and ingest an upload synchronously
pub fn upload(pipeline: &CurationPipeline, request: UploadRequest) -> Result<IngestReport, UploadError> {
    Ok(pipeline.ingest(request.into_ingest()?)?)
}

fn resolve_uri(uri: &str) -> Result<PathBuf, UploadError> {
    if let Some(path) = uri.strip_prefix(FILE_SCHEME) {
        return Ok(PathBuf::from(path));
    }
    match uri.split_once("://") {
        Some((scheme, _)) => Err(UploadError::UnsupportedScheme(scheme.to_string())),
        None => Ok(PathBuf::from(uri)),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Format from a file name, ignoring a trailing `.gz`
fn infer_format(name: &str) -> Option<String> {
    let lower = name.to_ascii_lowercase();
    let stem = lower.strip_suffix(".gz").unwrap_or(&lower);
    let ext = stem.rsplit_once('.')?.1;
    match ext {
        "sdf" | "sd" | "mol" => Some(SDF.to_string()),
        "json" | "gsrs" => Some(JSON.to_string()),
        _ => None,
    }
}
