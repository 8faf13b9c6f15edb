//! Document parser backed by an external toolkit command.
//!
//! The tool is invoked as
//! `<program> <args..> --kind K --document D --sheet S --output-dir O [--layer L]`
//! and must print `{"storage_path": .., "layer": .., "title"?: .., "language"?: ..}`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use crate::contract::{
    CollaboratorError, DerivedKind, DocumentInput, DocumentParser, LayerRef, ParsedText,
    StructuredText,
};
use crate::tool::ToolCommand;

#[derive(Debug, Deserialize)]
struct ParserOutput {
    storage_path: PathBuf,
    layer: PathBuf,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

pub struct CommandParser {
    tool: ToolCommand,
}

impl CommandParser {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }
}

fn require_file(path: &Path, what: &str) -> Result<(), CollaboratorError> {
    if path.is_file() {
        Ok(())
    } else {
        error!(path = %path.display(), what, "Input file missing or unreadable");
        Err(format!("{what} not found: {}", path.display()).into())
    }
}

#[async_trait]
impl DocumentParser for CommandParser {
    async fn parse(
        &self,
        kind: DerivedKind,
        input: &DocumentInput,
        layer: Option<LayerRef>,
        output_dir: &Path,
    ) -> Result<ParsedText, CollaboratorError> {
        require_file(&input.document, "document")?;
        require_file(&input.sheet, "metadata sheet")?;

        let mut args: Vec<OsString> = vec![
            "--kind".into(),
            kind.as_str().into(),
            "--document".into(),
            input.document.clone().into_os_string(),
            "--sheet".into(),
            input.sheet.clone().into_os_string(),
            "--output-dir".into(),
            output_dir.as_os_str().to_owned(),
        ];
        if let Some(layer) = &layer {
            args.push("--layer".into());
            args.push(layer.as_path().as_os_str().to_owned());
        }

        let out: ParserOutput = self.tool.run_json(&args)?;
        info!(
            document = %input.document.display(),
            storage_path = %out.storage_path.display(),
            layer = %out.layer.display(),
            "Parsed document"
        );

        Ok(ParsedText {
            text: StructuredText {
                storage_path: out.storage_path,
                title: out.title,
                language: out.language,
                assets: Vec::new(),
            },
            layer: LayerRef::new(out.layer),
        })
    }
}
