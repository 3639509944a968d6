use std::path::Path;

use crate::error::HandlerError;
use crate::handler::{Analysis, ImportContext, ImportHandler};
use crate::record::{DraftRecord, FileReference, MediaKind, Purpose, RecordState};
use crate::storage::TransferRequest;

/// Copies or links imported files into the library endpoint for their media kind and
/// drafts a record with a single primary file.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibraryImportHandler;

impl LibraryImportHandler {
    pub const MIME_TYPES: &'static [&'static str] = &[
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/tiff",
        "image/webp",
        "image/bmp",
        "video/mp4",
        "video/quicktime",
        "video/x-msvideo",
        "video/x-matroska",
        "audio/mpeg",
        "audio/flac",
        "audio/x-flac",
        "audio/ogg",
        "audio/x-wav",
    ];

    pub fn new() -> Self {
        Self
    }
}

impl ImportHandler for LibraryImportHandler {
    fn analyze(&self, ctx: &ImportContext<'_>) -> Result<Analysis, HandlerError> {
        let metadata = std::fs::metadata(&ctx.source_path).map_err(|e| HandlerError::Read {
            path: ctx.source_path.clone(),
            source: e,
        })?;

        let (width, height) = if ctx.kind == MediaKind::Image {
            match image::image_dimensions(&ctx.source_path) {
                Ok((w, h)) => (Some(w), Some(h)),
                Err(e) => {
                    log::debug!(
                        "Could not read dimensions of {}: {}",
                        ctx.source_path.display(),
                        e
                    );
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        Ok(Analysis {
            size: metadata.len(),
            width,
            height,
        })
    }

    fn run(
        &self,
        ctx: &ImportContext<'_>,
        analysis: &Analysis,
    ) -> Result<DraftRecord, HandlerError> {
        let library = ctx
            .transfer
            .registry()
            .library_for(ctx.kind)
            .ok_or_else(|| {
                HandlerError::Failed(format!("No library endpoint for {} files", ctx.kind.as_str()))
            })?;

        let filename = Path::new(&ctx.job.payload.path)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| HandlerError::Failed(format!("Bad path '{}'", ctx.job.payload.path)))?
            .to_string();

        let defaults = &ctx.endpoint.defaults;
        let mut request = TransferRequest::new(&library.id, &filename)
            .from_endpoint(&ctx.endpoint.id, &ctx.job.payload.path)
            .link(defaults.link)
            .keep_original(true)
            .kind(ctx.kind.as_str());
        if let Some(source) = ctx.job.metadata.source.as_ref().or(defaults.source.as_ref()) {
            request = request.tag_source(source);
        }

        let outcome = ctx.transfer.transfer(&request)?;
        log::info!(
            "Imported {}:{} -> {}:{}",
            ctx.endpoint.id,
            ctx.job.payload.path,
            library.id,
            outcome.relative_path
        );

        Ok(DraftRecord {
            original_filename: Some(filename),
            kind: ctx.kind,
            state: RecordState::Online,
            files: vec![FileReference {
                path: outcome.relative_path,
                endpoint_id: library.id.clone(),
                size: analysis.size,
                purpose: Purpose::Primary,
                mime: Some(ctx.mime.to_string()),
                width: analysis.width,
                height: analysis.height,
            }],
            ..Default::default()
        })
    }
}
