//! External toolkit invocation shared by the command-backed parser and serializer.

use std::ffi::OsString;
use std::process::Command;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::contract::CollaboratorError;

/// A program plus fixed leading arguments, e.g. `text-toolkit parse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run the tool with `extra` arguments appended and decode its stdout as JSON.
    pub fn run_json<T: DeserializeOwned>(&self, extra: &[OsString]) -> Result<T, CollaboratorError> {
        debug!(program = %self.program, args = ?self.args, extra = ?extra, "Launching tool");

        let output = Command::new(&self.program)
            .args(&self.args)
            .args(extra)
            .output()
            .map_err(|e| -> CollaboratorError {
                error!(error = ?e, program = %self.program, "Failed to launch tool process");
                format!("failed to launch {}: {e}", self.program).into()
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                program = %self.program,
                status = %output.status,
                stderr = %stderr.trim(),
                "Tool exited with non-zero code"
            );
            return Err(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )
            .into());
        }

        serde_json::from_slice(&output.stdout).map_err(|e| -> CollaboratorError {
            error!(error = ?e, program = %self.program, "Tool produced malformed JSON output");
            format!("{} produced malformed output: {e}", self.program).into()
        })
    }
}
