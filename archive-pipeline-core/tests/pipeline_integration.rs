use archive_pipeline_core::contract::{
    DerivedKind, DerivedTextInput, Destination, DocumentInput, LayerRef, MockDocumentParser,
    MockPairSerializer, MockPublisher, MockUploader, ParsedText, RootSource, StructuredText,
    UploadError, UploadReceipt,
};
use archive_pipeline_core::error::PipelineError;
use archive_pipeline_core::pipeline::{Pipeline, PipelineRequest};
use archive_pipeline_core::retry::RetryPolicy;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

type Calls<T> = Arc<Mutex<Vec<T>>>;

fn calls<T>() -> Calls<T> {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug, Clone, PartialEq)]
struct ParseCall {
    kind: DerivedKind,
    document: PathBuf,
    layer: Option<LayerRef>,
}

fn stem(path: &Path) -> String {
    path.file_stem().unwrap().to_string_lossy().into_owned()
}

/// Parser whose artifact for `x.docx` lives at `<output_dir>/x` with layer `x.layer`.
fn recording_parser(log: Calls<ParseCall>) -> MockDocumentParser {
    let mut parser = MockDocumentParser::new();
    parser
        .expect_parse()
        .returning(move |kind, input, layer, output_dir| {
            log.lock().unwrap().push(ParseCall {
                kind,
                document: input.document.clone(),
                layer: layer.clone(),
            });
            let name = stem(&input.document);
            Ok(ParsedText {
                text: StructuredText::new(output_dir.join(&name)),
                layer: LayerRef::new(format!("{name}.layer")),
            })
        });
    parser
}

fn recording_publisher(log: Calls<(PathBuf, PathBuf, String)>) -> MockPublisher {
    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .returning(move |text, asset_dir, label| {
            log.lock().unwrap().push((
                text.storage_path.clone(),
                asset_dir.to_path_buf(),
                label.to_string(),
            ));
            text.attach_asset(label, asset_dir.join("source.docx"));
            Ok(())
        });
    publisher
}

fn recording_serializer(log: Calls<(PathBuf, PathBuf)>) -> MockPairSerializer {
    let mut serializer = MockPairSerializer::new();
    serializer
        .expect_serialize()
        .returning(move |root, derived, output_dir| {
            log.lock()
                .unwrap()
                .push((root.to_path_buf(), derived.to_path_buf()));
            Ok(output_dir.join(format!("{}__{}.json", stem(root), stem(derived))))
        });
    serializer
}

fn recording_uploader(log: Calls<(PathBuf, Destination, bool)>) -> MockUploader {
    let mut uploader = MockUploader::new();
    uploader
        .expect_upload()
        .returning(move |json_path, destination, overwrite| {
            log.lock()
                .unwrap()
                .push((json_path.to_path_buf(), destination, overwrite));
            Ok(UploadReceipt {
                destination,
                record_id: Some(stem(json_path)),
                content_hash: None,
            })
        });
    uploader
}

fn no_wait_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
        multiplier: 2,
        attempt_timeout: None,
    }
}

fn root_input() -> DocumentInput {
    DocumentInput::new("resources/bo/r.docx", "resources/bo/r.xlsx")
}

fn derived(name: &str) -> DocumentInput {
    DocumentInput::new(format!("resources/zh/{name}.docx"), format!("resources/zh/{name}.xlsx"))
}

#[tokio::test]
async fn absent_derived_input_parses_root_only() {
    let out = tempdir().unwrap();
    let parses = calls();
    let publishes = calls();

    let mut serializer = MockPairSerializer::new();
    serializer.expect_serialize().never();
    let mut uploader = MockUploader::new();
    uploader.expect_upload().never();

    let pipeline = Pipeline::new(
        recording_parser(parses.clone()),
        recording_publisher(publishes.clone()),
        serializer,
        uploader,
    );
    let request = PipelineRequest::translation(
        root_input(),
        DerivedTextInput::Absent,
        out.path(),
        Destination::Staging,
    );

    let report = pipeline.run(&request).await.expect("root stage should succeed");

    assert!(report.pairs.is_empty());
    assert!(report.is_success());
    assert_eq!(report.root_storage_path, out.path().join("r"));
    assert_eq!(report.root_layer, LayerRef::new("r.layer"));

    let parses = parses.lock().unwrap();
    assert_eq!(parses.len(), 1);
    assert_eq!(parses[0].layer, None, "root must be parsed independently");
    assert_eq!(publishes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn single_derived_input_forms_one_pair() {
    let out = tempdir().unwrap();
    let parses = calls();
    let publishes = calls();
    let serialized = calls();
    let uploads = calls();

    let pipeline = Pipeline::new(
        recording_parser(parses.clone()),
        recording_publisher(publishes.clone()),
        recording_serializer(serialized.clone()),
        recording_uploader(uploads.clone()),
    );
    let request = PipelineRequest::translation(
        root_input(),
        DerivedTextInput::Single(derived("t1")),
        out.path(),
        Destination::Production,
    );

    let report = pipeline.run(&request).await.unwrap();

    let parses = parses.lock().unwrap();
    assert_eq!(parses.len(), 2);
    assert_eq!(parses[0].document, PathBuf::from("resources/bo/r.docx"));
    assert_eq!(parses[1].document, PathBuf::from("resources/zh/t1.docx"));
    assert_eq!(parses[1].layer, Some(LayerRef::new("r.layer")));
    assert!(parses.iter().all(|call| call.kind == DerivedKind::Translation));

    let publishes = publishes.lock().unwrap();
    assert_eq!(publishes.len(), 2);
    assert_eq!(publishes[0].1, PathBuf::from("resources/bo"));
    assert_eq!(publishes[1].1, PathBuf::from("resources/zh"));
    assert!(publishes.iter().all(|(_, _, label)| label == "google_docx"));

    assert_eq!(
        *serialized.lock().unwrap(),
        vec![(out.path().join("r"), out.path().join("t1"))]
    );

    let uploads = uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, out.path().join("json").join("r__t1.json"));
    assert_eq!(uploads[0].1, Destination::Production);
    assert!(uploads[0].2, "overwrite defaults to true");

    assert_eq!(report.uploaded().count(), 1);
    let pair = report.uploaded().next().unwrap();
    assert_eq!(pair.derived_storage_path, out.path().join("t1"));
    assert_eq!(pair.upload.attempts, 1);
}

#[tokio::test]
async fn many_derived_inputs_share_root_layer_and_keep_order() {
    let out = tempdir().unwrap();
    let parses = calls();
    let serialized = calls();
    let uploads = calls();

    let pipeline = Pipeline::new(
        recording_parser(parses.clone()),
        recording_publisher(calls()),
        recording_serializer(serialized.clone()),
        recording_uploader(uploads.clone()),
    );
    let request = PipelineRequest::translation(
        DocumentInput::new("r.docx", "r.xlsx"),
        DerivedTextInput::Many(vec![
            DocumentInput::new("t1.docx", "t1.xlsx"),
            DocumentInput::new("t2.docx", "t2.xlsx"),
        ]),
        out.path(),
        Destination::Staging,
    );

    let report = pipeline.run(&request).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.pairs.len(), 2);

    let parses = parses.lock().unwrap();
    assert_eq!(parses.len(), 3);
    let root_layer = Some(LayerRef::new("r.layer"));
    assert_eq!(parses[1].layer, root_layer);
    assert_eq!(
        parses[2].layer, root_layer,
        "each derived text aligns to the root, never to a sibling"
    );

    let derived_order: Vec<PathBuf> = serialized
        .lock()
        .unwrap()
        .iter()
        .map(|(root, derived)| {
            assert_eq!(root, &out.path().join("r"));
            derived.clone()
        })
        .collect();
    assert_eq!(derived_order, vec![out.path().join("t1"), out.path().join("t2")]);

    let uploads = uploads.lock().unwrap();
    let uploaded: Vec<PathBuf> = uploads.iter().map(|(path, _, _)| path.clone()).collect();
    assert_eq!(
        uploaded,
        vec![
            out.path().join("json").join("r__t1.json"),
            out.path().join("json").join("r__t2.json"),
        ]
    );
    assert!(uploads.iter().all(|(_, dest, _)| *dest == Destination::Staging));
}

#[tokio::test]
async fn failing_derived_text_does_not_block_siblings() {
    let out = tempdir().unwrap();
    let uploads = calls();

    let mut parser = MockDocumentParser::new();
    parser
        .expect_parse()
        .returning(|_, input, _, output_dir| {
            let name = stem(&input.document);
            if name == "t2" {
                return Err("malformed sheet".into());
            }
            Ok(ParsedText {
                text: StructuredText::new(output_dir.join(&name)),
                layer: LayerRef::new(format!("{name}.layer")),
            })
        });

    let pipeline = Pipeline::new(
        parser,
        recording_publisher(calls()),
        recording_serializer(calls()),
        recording_uploader(uploads.clone()),
    );
    let request = PipelineRequest::translation(
        root_input(),
        DerivedTextInput::Many(vec![derived("t1"), derived("t2"), derived("t3")]),
        out.path(),
        Destination::Staging,
    );

    let report = pipeline.run(&request).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.uploaded().count(), 2);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 1);
    assert_eq!(failures[0].document, PathBuf::from("resources/zh/t2.docx"));
    assert!(matches!(
        failures[0].outcome,
        Err(PipelineError::Parse { .. })
    ));

    let uploaded: Vec<PathBuf> = uploads
        .lock()
        .unwrap()
        .iter()
        .map(|(path, _, _)| path.clone())
        .collect();
    assert_eq!(
        uploaded,
        vec![
            out.path().join("json").join("r__t1.json"),
            out.path().join("json").join("r__t3.json"),
        ]
    );
}

#[tokio::test]
async fn serialize_failure_is_isolated_to_its_pair() {
    let out = tempdir().unwrap();
    let uploads = calls();

    let mut serializer = MockPairSerializer::new();
    serializer
        .expect_serialize()
        .returning(|root, derived, output_dir| {
            if stem(derived) == "t1" {
                return Err("incompatible artifact".into());
            }
            Ok(output_dir.join(format!("{}__{}.json", stem(root), stem(derived))))
        });

    let pipeline = Pipeline::new(
        recording_parser(calls()),
        recording_publisher(calls()),
        serializer,
        recording_uploader(uploads.clone()),
    );
    let request = PipelineRequest::translation(
        root_input(),
        DerivedTextInput::Many(vec![derived("t1"), derived("t2")]),
        out.path(),
        Destination::Staging,
    );

    let report = pipeline.run(&request).await.unwrap();
    assert!(matches!(
        report.pairs[0].outcome,
        Err(PipelineError::Serialize { .. })
    ));
    assert!(report.pairs[1].outcome.is_ok());
    assert_eq!(uploads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn root_parse_failure_aborts_run() {
    let out = tempdir().unwrap();

    let mut parser = MockDocumentParser::new();
    parser
        .expect_parse()
        .times(1)
        .returning(|_, _, _, _| Err("document unreadable".into()));
    let mut publisher = MockPublisher::new();
    publisher.expect_publish().never();
    let mut serializer = MockPairSerializer::new();
    serializer.expect_serialize().never();
    let mut uploader = MockUploader::new();
    uploader.expect_upload().never();

    let pipeline = Pipeline::new(parser, publisher, serializer, uploader);
    let request = PipelineRequest::translation(
        root_input(),
        DerivedTextInput::Many(vec![derived("t1"), derived("t2")]),
        out.path(),
        Destination::Staging,
    );

    let err = pipeline.run(&request).await.unwrap_err();
    match err {
        PipelineError::Parse { document, .. } => {
            assert_eq!(document, PathBuf::from("resources/bo/r.docx"))
        }
        other => panic!("expected root parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn root_publish_failure_aborts_run() {
    let out = tempdir().unwrap();

    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .times(1)
        .returning(|_, _, _| Err("asset directory missing".into()));
    let mut serializer = MockPairSerializer::new();
    serializer.expect_serialize().never();

    let pipeline = Pipeline::new(
        recording_parser(calls()),
        publisher,
        serializer,
        MockUploader::new(),
    );
    let request = PipelineRequest::translation(
        root_input(),
        DerivedTextInput::Single(derived("t1")),
        out.path(),
        Destination::Staging,
    );

    assert!(matches!(
        pipeline.run(&request).await,
        Err(PipelineError::Publish { .. })
    ));
}

#[tokio::test]
async fn commentary_on_parsed_root_skips_root_parse() {
    let out = tempdir().unwrap();
    let parses = calls();
    let serialized = calls();

    let pipeline = Pipeline::new(
        recording_parser(parses.clone()),
        recording_publisher(calls()),
        recording_serializer(serialized.clone()),
        recording_uploader(calls()),
    );
    let root_path = out.path().join("P0001");
    let report = pipeline
        .commentary_pipeline(
            RootSource::Parsed {
                storage_path: root_path.clone(),
                layer: LayerRef::new("P0001/layers/base.json"),
            },
            DerivedTextInput::Single(DocumentInput::new("c1.docx", "c1.xlsx")),
            out.path(),
            Destination::Staging,
        )
        .await
        .unwrap();
    assert_eq!(report.kind, DerivedKind::Commentary);
    assert_eq!(report.root_storage_path, root_path);

    let parses = parses.lock().unwrap();
    assert_eq!(parses.len(), 1, "only the commentary is parsed");
    assert_eq!(parses[0].kind, DerivedKind::Commentary);
    assert_eq!(parses[0].layer, Some(LayerRef::new("P0001/layers/base.json")));
    assert_eq!(
        *serialized.lock().unwrap(),
        vec![(root_path, out.path().join("c1"))]
    );
}

#[tokio::test]
async fn transient_upload_failures_are_retried() {
    let out = tempdir().unwrap();

    let attempts = Arc::new(Mutex::new(0u32));
    let counter = attempts.clone();
    let mut uploader = MockUploader::new();
    uploader
        .expect_upload()
        .times(3)
        .returning(move |_, destination, _| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n < 3 {
                Err(UploadError::Transient("connection reset".into()))
            } else {
                Ok(UploadReceipt {
                    destination,
                    record_id: Some("rec-1".into()),
                    content_hash: None,
                })
            }
        });

    let pipeline = Pipeline::new(
        recording_parser(calls()),
        recording_publisher(calls()),
        recording_serializer(calls()),
        uploader,
    )
    .with_retry(no_wait_retry(3));
    let request = PipelineRequest::translation(
        root_input(),
        DerivedTextInput::Single(derived("t1")),
        out.path(),
        Destination::Staging,
    );

    let report = pipeline.run(&request).await.unwrap();
    let pair = report.uploaded().next().expect("pair should upload on third attempt");
    assert_eq!(pair.upload.attempts, 3);
    assert_eq!(pair.upload.receipt.record_id.as_deref(), Some("rec-1"));
}

#[tokio::test]
async fn exhausted_retries_mark_pair_failed() {
    let out = tempdir().unwrap();

    let mut uploader = MockUploader::new();
    uploader
        .expect_upload()
        .times(2)
        .returning(|_, _, _| Err(UploadError::Transient("503".into())));

    let pipeline = Pipeline::new(
        recording_parser(calls()),
        recording_publisher(calls()),
        recording_serializer(calls()),
        uploader,
    )
    .with_retry(no_wait_retry(2));
    let request = PipelineRequest::translation(
        root_input(),
        DerivedTextInput::Single(derived("t1")),
        out.path(),
        Destination::Staging,
    );

    let report = pipeline.run(&request).await.unwrap();
    match &report.pairs[0].outcome {
        Err(PipelineError::Upload { attempts, .. }) => assert_eq!(*attempts, 2),
        other => panic!("expected upload failure, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_upload_is_not_retried() {
    let out = tempdir().unwrap();

    let mut uploader = MockUploader::new();
    uploader.expect_upload().times(1).returning(|_, _, _| {
        Err(UploadError::Rejected {
            status: 422,
            message: "schema mismatch".into(),
        })
    });

    let pipeline = Pipeline::new(
        recording_parser(calls()),
        recording_publisher(calls()),
        recording_serializer(calls()),
        uploader,
    )
    .with_retry(no_wait_retry(5));
    let request = PipelineRequest::translation(
        root_input(),
        DerivedTextInput::Single(derived("t1")),
        out.path(),
        Destination::Production,
    );

    let report = pipeline.run(&request).await.unwrap();
    assert!(matches!(
        report.pairs[0].outcome,
        Err(PipelineError::Upload { attempts: 1, .. })
    ));
}

#[tokio::test]
async fn rerun_with_overwrite_produces_identical_json() {
    let out = tempdir().unwrap();

    // Serializer that writes a document derived only from the two artifact paths.
    let mut serializer = MockPairSerializer::new();
    serializer
        .expect_serialize()
        .returning(|root, derived, output_dir| {
            let path = output_dir.join(format!("{}__{}.json", stem(root), stem(derived)));
            let body = serde_json::json!({
                "root": root.to_string_lossy(),
                "derived": derived.to_string_lossy(),
            });
            std::fs::write(&path, body.to_string())?;
            Ok(path)
        });

    let mut uploader = MockUploader::new();
    uploader
        .expect_upload()
        .withf(|_, _, overwrite| *overwrite)
        .times(2)
        .returning(|_, destination, _| {
            Ok(UploadReceipt {
                destination,
                record_id: None,
                content_hash: None,
            })
        });

    let pipeline = Pipeline::new(
        recording_parser(calls()),
        recording_publisher(calls()),
        serializer,
        uploader,
    );
    let request = PipelineRequest::translation(
        root_input(),
        DerivedTextInput::Single(derived("t1")),
        out.path(),
        Destination::Staging,
    )
    .with_overwrite(true);

    let first = pipeline.run(&request).await.unwrap();
    let first_json = first.uploaded().next().unwrap().json_path.clone();
    let first_body = std::fs::read_to_string(&first_json).unwrap();

    let second = pipeline.run(&request).await.unwrap();
    let second_json = second.uploaded().next().unwrap().json_path.clone();
    let second_body = std::fs::read_to_string(&second_json).unwrap();

    assert_eq!(first_json, second_json);
    assert_eq!(first_body, second_body);
}

#[tokio::test]
async fn translation_pipeline_uses_default_json_dir_and_overwrite() {
    let out = tempdir().unwrap();
    let uploads = calls();

    let pipeline = Pipeline::new(
        recording_parser(calls()),
        recording_publisher(calls()),
        recording_serializer(calls()),
        recording_uploader(uploads.clone()),
    );
    let report = pipeline
        .translation_pipeline(
            root_input(),
            DerivedTextInput::Single(derived("t1")),
            out.path(),
            Destination::Production,
        )
        .await
        .unwrap();

    assert_eq!(report.kind, DerivedKind::Translation);
    assert!(out.path().join("json").is_dir());
    assert_eq!(
        *uploads.lock().unwrap(),
        vec![(out.path().join("json").join("r__t1.json"), Destination::Production, true)]
    );
}
