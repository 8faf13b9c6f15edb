//! Pair serializer backed by an external toolkit command.
//!
//! Invoked as `<program> <args..> --root R --derived D --output-dir O`; the tool
//! prints `{"json_path": ..}` naming the document it wrote.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use crate::contract::{CollaboratorError, PairSerializer};
use crate::tool::ToolCommand;

#[derive(Debug, Deserialize)]
struct SerializerOutput {
    json_path: PathBuf,
}

pub struct CommandSerializer {
    tool: ToolCommand,
}

impl CommandSerializer {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl PairSerializer for CommandSerializer {
    async fn serialize(
        &self,
        root: &Path,
        derived: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, CollaboratorError> {
        for (what, path) in [("root artifact", root), ("derived artifact", derived)] {
            if !path.exists() {
                error!(path = %path.display(), what, "Artifact path does not resolve");
                return Err(format!("{what} does not exist: {}", path.display()).into());
            }
        }

        let args: Vec<OsString> = vec![
            "--root".into(),
            root.as_os_str().to_owned(),
            "--derived".into(),
            derived.as_os_str().to_owned(),
            "--output-dir".into(),
            output_dir.as_os_str().to_owned(),
        ];
        let out: SerializerOutput = self.tool.run_json(&args)?;

        if !out.json_path.is_file() {
            error!(json_path = %out.json_path.display(), "Serializer reported a JSON path that was not written");
            return Err(format!("serializer output missing: {}", out.json_path.display()).into());
        }
        info!(json_path = %out.json_path.display(), "Serialized aligned pair");
        Ok(out.json_path)
    }
}
