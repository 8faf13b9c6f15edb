//! High-level pipeline: orchestrates parse → publish → serialize → upload for a root text
//! and its translations or commentaries.
//!
//! A run takes one [`PipelineRequest`]:
//!   - The root text is parsed in independent mode and published (or taken as
//!     already parsed, see [`RootSource::Parsed`]); its layer reference is captured once.
//!   - Every derived text is parsed aligned to that same layer, published,
//!     serialized together with the root into one JSON document, and uploaded.
//!   - A [`PipelineReport`] records one outcome per derived text.
//!
//! # Failure boundaries
//! - A root failure (parse, publish, output directories) aborts the run with `Err`.
//! - Each aligned pair has its own boundary: a failed translation is recorded in
//!   the report and the next one still runs. Uploads already made are kept.
//!
//! # Ordering
//! Derived texts are processed one at a time, strictly in input order.
//! No collaborator call overlaps another.
//!
//! # Navigation
//! - Main entrypoint: [`Pipeline::run`]
//! - Direct upload of existing JSON documents: [`upload_documents`]

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::contract::{
    DerivedKind, DerivedTextInput, Destination, DocumentInput, DocumentParser, LayerRef,
    PairSerializer, ParsedText, Publisher, RootSource, Uploader,
};
use crate::error::PipelineError;
use crate::retry::{upload_with_retry, RetryPolicy, Uploaded};

/// Label under which source documents are attached to parsed texts.
pub const DEFAULT_ASSET_LABEL: &str = "google_docx";

/// Everything one orchestration run needs.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub kind: DerivedKind,
    pub root: RootSource,
    pub derived: DerivedTextInput,
    /// Where the parser writes artifacts.
    pub output_dir: PathBuf,
    /// Where the serializer writes JSON documents.
    pub json_output_dir: PathBuf,
    pub destination: Destination,
    pub overwrite: bool,
    pub asset_label: String,
}

impl PipelineRequest {
    pub fn new(
        kind: DerivedKind,
        root: RootSource,
        derived: DerivedTextInput,
        output_dir: impl Into<PathBuf>,
        destination: Destination,
    ) -> Self {
        let output_dir = output_dir.into();
        Self {
            kind,
            root,
            derived,
            json_output_dir: output_dir.join("json"),
            output_dir,
            destination,
            overwrite: true,
            asset_label: DEFAULT_ASSET_LABEL.to_string(),
        }
    }

    /// A root document and its translations.
    pub fn translation(
        root: DocumentInput,
        translations: DerivedTextInput,
        output_dir: impl Into<PathBuf>,
        destination: Destination,
    ) -> Self {
        Self::new(
            DerivedKind::Translation,
            RootSource::Document(root),
            translations,
            output_dir,
            destination,
        )
    }

    /// A root (document or previously parsed text) and its commentaries.
    pub fn commentary(
        root: RootSource,
        commentaries: DerivedTextInput,
        output_dir: impl Into<PathBuf>,
        destination: Destination,
    ) -> Self {
        Self::new(
            DerivedKind::Commentary,
            root,
            commentaries,
            output_dir,
            destination,
        )
    }

    pub fn with_json_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.json_output_dir = dir.into();
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_asset_label(mut self, label: impl Into<String>) -> Self {
        self.asset_label = label.into();
        self
    }
}

/// Result of a run whose root stage succeeded.
#[derive(Debug)]
pub struct PipelineReport {
    pub kind: DerivedKind,
    pub destination: Destination,
    pub root_storage_path: PathBuf,
    pub root_layer: LayerRef,
    pub pairs: Vec<PairReport>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.pairs.iter().all(|pair| pair.outcome.is_ok())
    }

    pub fn uploaded(&self) -> impl Iterator<Item = &UploadedPair> {
        self.pairs.iter().filter_map(|pair| pair.outcome.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs.iter().filter(|pair| pair.outcome.is_err())
    }
}

/// Outcome for one derived text, at its position in the input.
#[derive(Debug)]
pub struct PairReport {
    pub index: usize,
    pub document: PathBuf,
    pub outcome: Result<UploadedPair, PipelineError>,
}

#[derive(Debug)]
pub struct UploadedPair {
    pub derived_storage_path: PathBuf,
    pub json_path: PathBuf,
    pub upload: Uploaded,
}

/// The orchestrator, generic over its four collaborators.
pub struct Pipeline<P, B, S, U> {
    parser: P,
    publisher: B,
    serializer: S,
    uploader: U,
    retry: RetryPolicy,
}

impl<P, B, S, U> Pipeline<P, B, S, U>
where
    P: DocumentParser,
    B: Publisher,
    S: PairSerializer,
    U: Uploader,
{
    pub fn new(parser: P, publisher: B, serializer: S, uploader: U) -> Self {
        Self {
            parser,
            publisher,
            serializer,
            uploader,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineReport, PipelineError> {
        info!(
            kind = %request.kind,
            destination = %request.destination,
            derived = request.derived.len(),
            "[PIPELINE] Starting run"
        );

        ensure_dir(&request.output_dir)?;
        ensure_dir(&request.json_output_dir)?;

        let (root_storage_path, root_layer) = match &request.root {
            RootSource::Document(input) => {
                let parsed = self
                    .prepare_text(
                        request.kind,
                        input,
                        None,
                        &request.output_dir,
                        &request.asset_label,
                    )
                    .await?;
                info!(
                    storage_path = %parsed.text.storage_path.display(),
                    layer = %parsed.layer,
                    "[PIPELINE][ROOT] Root text ready"
                );
                (parsed.text.storage_path, parsed.layer)
            }
            RootSource::Parsed {
                storage_path,
                layer,
            } => {
                info!(
                    storage_path = %storage_path.display(),
                    layer = %layer,
                    "[PIPELINE][ROOT] Using previously parsed root text"
                );
                (storage_path.clone(), layer.clone())
            }
        };

        if request.derived.is_empty() {
            // Root-only archive records are not produced.
            warn!(
                kind = %request.kind,
                root = %root_storage_path.display(),
                "[PIPELINE] No derived texts supplied; nothing to serialize or upload"
            );
        }

        let mut pairs = Vec::with_capacity(request.derived.len());
        for (index, input) in request.derived.iter().enumerate() {
            info!(index, document = %input.document.display(), "[PIPELINE][PAIR] Processing derived text");
            let outcome = self
                .process_pair(request, &root_storage_path, &root_layer, input)
                .await;
            match &outcome {
                Ok(pair) => info!(
                    index,
                    json_path = %pair.json_path.display(),
                    attempts = pair.upload.attempts,
                    "[PIPELINE][PAIR] Aligned pair uploaded"
                ),
                Err(e) => error!(
                    index,
                    document = %input.document.display(),
                    error = %e,
                    "[PIPELINE][PAIR][ERROR] Aligned pair failed; continuing with the next"
                ),
            }
            pairs.push(PairReport {
                index,
                document: input.document.clone(),
                outcome,
            });
        }

        let report = PipelineReport {
            kind: request.kind,
            destination: request.destination,
            root_storage_path,
            root_layer,
            pairs,
        };
        info!(
            uploaded = report.uploaded().count(),
            failed = report.failures().count(),
            "[PIPELINE] Run complete"
        );
        Ok(report)
    }

    /// Root document plus translations, with default output layout and overwrite.
    pub async fn translation_pipeline(
        &self,
        root: DocumentInput,
        translations: DerivedTextInput,
        output_dir: impl Into<PathBuf>,
        destination: Destination,
    ) -> Result<PipelineReport, PipelineError> {
        let request = PipelineRequest::translation(root, translations, output_dir, destination);
        self.run(&request).await
    }

    /// Root (document or already parsed) plus commentaries.
    pub async fn commentary_pipeline(
        &self,
        root: RootSource,
        commentaries: DerivedTextInput,
        output_dir: impl Into<PathBuf>,
        destination: Destination,
    ) -> Result<PipelineReport, PipelineError> {
        let request = PipelineRequest::commentary(root, commentaries, output_dir, destination);
        self.run(&request).await
    }

    /// Parse one document (independent when `layer` is `None`, aligned otherwise)
    /// and publish the files beside it onto the result.
    pub async fn prepare_text(
        &self,
        kind: DerivedKind,
        input: &DocumentInput,
        layer: Option<&LayerRef>,
        output_dir: &Path,
        asset_label: &str,
    ) -> Result<ParsedText, PipelineError> {
        let mode = if layer.is_some() { "aligned" } else { "independent" };
        info!(
            %kind,
            mode,
            document = %input.document.display(),
            sheet = %input.sheet.display(),
            "[PIPELINE][PARSE] Parsing document"
        );

        let mut parsed = self
            .parser
            .parse(kind, input, layer.cloned(), output_dir)
            .await
            .map_err(|source| {
                error!(document = %input.document.display(), error = %source, "[PIPELINE][ERROR] Parse failed");
                PipelineError::Parse {
                    document: input.document.clone(),
                    source,
                }
            })?;

        let published = self
            .publisher
            .publish(&mut parsed.text, input.asset_dir(), asset_label)
            .await;
        if let Err(source) = published {
            error!(storage_path = %parsed.text.storage_path.display(), error = %source, "[PIPELINE][ERROR] Publish failed");
            return Err(PipelineError::Publish {
                storage_path: parsed.text.storage_path.clone(),
                source,
            });
        }

        Ok(parsed)
    }

    async fn process_pair(
        &self,
        request: &PipelineRequest,
        root_storage_path: &Path,
        root_layer: &LayerRef,
        input: &DocumentInput,
    ) -> Result<UploadedPair, PipelineError> {
        let derived = self
            .prepare_text(
                request.kind,
                input,
                Some(root_layer),
                &request.output_dir,
                &request.asset_label,
            )
            .await?;
        let derived_storage_path = derived.text.storage_path;

        let json_path = self
            .serializer
            .serialize(
                root_storage_path,
                &derived_storage_path,
                &request.json_output_dir,
            )
            .await
            .map_err(|source| PipelineError::Serialize {
                root: root_storage_path.to_path_buf(),
                derived: derived_storage_path.clone(),
                source,
            })?;

        let upload = upload_with_retry(
            &self.uploader,
            &json_path,
            request.destination,
            request.overwrite,
            &self.retry,
        )
        .await?;

        Ok(UploadedPair {
            derived_storage_path,
            json_path,
            upload,
        })
    }
}

fn ensure_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path).map_err(|source| {
        error!(path = %path.display(), error = %source, "[PIPELINE][ERROR] Cannot create output directory");
        PipelineError::OutputDir {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Outcome of uploading one pre-built JSON document.
#[derive(Debug)]
pub struct DocumentUploadReport {
    pub json_path: PathBuf,
    pub outcome: Result<Uploaded, PipelineError>,
}

/// Uploads existing JSON documents one after another. A failure is recorded and
/// the remaining documents are still attempted.
pub async fn upload_documents<U>(
    uploader: &U,
    json_paths: &[PathBuf],
    destination: Destination,
    overwrite: bool,
    retry: &RetryPolicy,
) -> Vec<DocumentUploadReport>
where
    U: Uploader + ?Sized,
{
    let mut reports = Vec::with_capacity(json_paths.len());
    for json_path in json_paths {
        info!(json_path = %json_path.display(), %destination, "[UPLOAD] Uploading document");
        let outcome = upload_with_retry(uploader, json_path, destination, overwrite, retry).await;
        reports.push(DocumentUploadReport {
            json_path: json_path.clone(),
            outcome,
        });
    }
    reports
}
