//! Publisher that copies the files next to a source document into its artifact.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::contract::{CollaboratorError, Publisher, StructuredText};

/// Copies every regular file of the asset directory to
/// `<storage_path>/assets/<label>/` and records it on the text.
#[derive(Debug, Default, Clone)]
pub struct AssetPublisher;

impl AssetPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Publisher for AssetPublisher {
    async fn publish(
        &self,
        text: &mut StructuredText,
        asset_dir: &Path,
        asset_label: &str,
    ) -> Result<(), CollaboratorError> {
        let target = text.storage_path.join("assets").join(asset_label);
        fs::create_dir_all(&target)?;

        let mut sources: Vec<PathBuf> = fs::read_dir(asset_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        // stable asset order across runs
        sources.sort();

        for source in &sources {
            let Some(name) = source.file_name() else {
                continue;
            };
            let dest = target.join(name);
            fs::copy(source, &dest)?;
            debug!(from = %source.display(), to = %dest.display(), "Copied asset");
            text.attach_asset(asset_label, dest);
        }

        info!(
            storage_path = %text.storage_path.display(),
            asset_dir = %asset_dir.display(),
            label = asset_label,
            count = sources.len(),
            "Published source assets"
        );
        Ok(())
    }
}
