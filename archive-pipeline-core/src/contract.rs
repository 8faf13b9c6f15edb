//! # contract: data model and collaborator interfaces
//!
//! This module defines the values that flow through a pipeline run and the
//! four traits the orchestrator drives:
//!
//! - [`DocumentParser`]: document + metadata sheet → structured text and layer reference
//! - [`Publisher`]: attaches source assets to a structured text
//! - [`PairSerializer`]: root artifact × derived artifact → JSON document
//! - [`Uploader`]: pushes a JSON document to an archive destination
//!
//! ## Mocking & Testing
//! - The traits are annotated for `mockall`, so tests (in this crate and in
//!   dependents, through the default `test-export-mocks` feature) get
//!   `MockDocumentParser`, `MockPublisher`, `MockPairSerializer` and `MockUploader`.
//!
//! ## Derived-text inputs
//! [`DerivedTextInput`] deserializes by shape: null/missing, a single mapping,
//! or a sequence of mappings. Anything else is rejected when the input is
//! read, so the orchestrator never sees an unsupported shape.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use mockall::automock;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

pub use crate::error::{CollaboratorError, UnknownDestination, UploadError};

/// Document and metadata-sheet paths for one text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInput {
    #[serde(alias = "docx")]
    pub document: PathBuf,
    pub sheet: PathBuf,
}

impl DocumentInput {
    pub fn new(document: impl Into<PathBuf>, sheet: impl Into<PathBuf>) -> Self {
        Self {
            document: document.into(),
            sheet: sheet.into(),
        }
    }

    /// Directory whose files travel with the parsed text: the document's parent.
    pub fn asset_dir(&self) -> &Path {
        match self.document.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

/// Translations or commentaries attached to one root text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DerivedTextInput {
    #[default]
    Absent,
    Single(DocumentInput),
    Many(Vec<DocumentInput>),
}

impl DerivedTextInput {
    /// Number of aligned pairs this input produces.
    pub fn len(&self) -> usize {
        match self {
            DerivedTextInput::Absent => 0,
            DerivedTextInput::Single(_) => 1,
            DerivedTextInput::Many(inputs) => inputs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements in input order, whatever the variant.
    pub fn iter(&self) -> std::slice::Iter<'_, DocumentInput> {
        match self {
            DerivedTextInput::Absent => {
                let empty: &[DocumentInput] = &[];
                empty.iter()
            }
            DerivedTextInput::Single(input) => std::slice::from_ref(input).iter(),
            DerivedTextInput::Many(inputs) => inputs.iter(),
        }
    }
}

impl From<DocumentInput> for DerivedTextInput {
    fn from(input: DocumentInput) -> Self {
        DerivedTextInput::Single(input)
    }
}

impl From<Vec<DocumentInput>> for DerivedTextInput {
    fn from(inputs: Vec<DocumentInput>) -> Self {
        DerivedTextInput::Many(inputs)
    }
}

const DERIVED_SHAPES: &str = "null, a {document, sheet} mapping, or a sequence of such mappings";

fn unsupported_shape<E: de::Error>(found: impl fmt::Display) -> E {
    E::custom(format!(
        "unsupported derived-text input shape: {found}; expected {DERIVED_SHAPES}"
    ))
}

struct DerivedTextInputVisitor;

impl<'de> Visitor<'de> for DerivedTextInputVisitor {
    type Value = DerivedTextInput;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(DERIVED_SHAPES)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(DerivedTextInput::Absent)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(DerivedTextInput::Absent)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(DerivedTextInputVisitor)
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        DocumentInput::deserialize(de::value::MapAccessDeserializer::new(map))
            .map(DerivedTextInput::Single)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Self::Value, A::Error> {
        Vec::<DocumentInput>::deserialize(de::value::SeqAccessDeserializer::new(seq))
            .map(DerivedTextInput::Many)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Err(unsupported_shape(format_args!("string {v:?}")))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Err(unsupported_shape(format_args!("boolean {v}")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Err(unsupported_shape(format_args!("integer {v}")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Err(unsupported_shape(format_args!("integer {v}")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Err(unsupported_shape(format_args!("number {v}")))
    }
}

impl<'de> Deserialize<'de> for DerivedTextInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DerivedTextInputVisitor)
    }
}

/// What the derived texts of a run are; selects the parser flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedKind {
    Translation,
    Commentary,
}

impl DerivedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedKind::Translation => "translation",
            DerivedKind::Commentary => "commentary",
        }
    }
}

impl fmt::Display for DerivedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Archive environment an upload is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Staging,
    Production,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Staging => "staging",
            Destination::Production => "production",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Destination {
    type Err = UnknownDestination;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staging" => Ok(Destination::Staging),
            "production" | "prod" => Ok(Destination::Production),
            _ => Err(UnknownDestination(s.to_string())),
        }
    }
}

/// Opaque handle to the structural layer of a parsed text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerRef(PathBuf);

impl LayerRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for LayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A file attached to a structured text by the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedAsset {
    pub label: String,
    pub path: PathBuf,
}

/// Parsed, normalized representation of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredText {
    pub storage_path: PathBuf,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub assets: Vec<AttachedAsset>,
}

impl StructuredText {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            title: None,
            language: None,
            assets: Vec::new(),
        }
    }

    /// Records an asset; attaching the same label and path twice is a no-op.
    pub fn attach_asset(&mut self, label: &str, path: impl Into<PathBuf>) {
        let path = path.into();
        if self
            .assets
            .iter()
            .any(|asset| asset.label == label && asset.path == path)
        {
            return;
        }
        self.assets.push(AttachedAsset {
            label: label.to_string(),
            path,
        });
    }
}

/// Output of a parse: the text and the layer reference produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedText {
    pub text: StructuredText,
    pub layer: LayerRef,
}

/// Where the root text of a run comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RootSource {
    /// A document still to be parsed and published.
    Document(DocumentInput),
    /// A text parsed by an earlier run; only its storage path and layer are needed.
    Parsed {
        storage_path: PathBuf,
        layer: LayerRef,
    },
}

/// Returned by the archive for an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub destination: Destination,
    pub record_id: Option<String>,
    pub content_hash: Option<String>,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse a document and its metadata sheet into `output_dir`.
    ///
    /// Without `layer` the text is parsed as an independent root; with it, the
    /// text is aligned to the root that produced that layer.
    async fn parse(
        &self,
        kind: DerivedKind,
        input: &DocumentInput,
        layer: Option<LayerRef>,
        output_dir: &Path,
    ) -> Result<ParsedText, CollaboratorError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Attach the files found under `asset_dir` to `text`, labelled `asset_label`.
    async fn publish(
        &self,
        text: &mut StructuredText,
        asset_dir: &Path,
        asset_label: &str,
    ) -> Result<(), CollaboratorError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PairSerializer: Send + Sync {
    /// Serialize a root/derived pair into a JSON document under `output_dir`,
    /// returning its path.
    async fn serialize(
        &self,
        root: &Path,
        derived: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, CollaboratorError>;
}

/// Trait for pushing serialized documents to the archive.
/// The implementor owns transport and authentication; the pipeline owns retries.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        json_path: &Path,
        destination: Destination,
        overwrite: bool,
    ) -> Result<UploadReceipt, UploadError>;
}
