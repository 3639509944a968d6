use std::path::Path;

use crate::error::HandlerError;
use crate::handler::{
    extension_for_mime, Delivery, ExportContext, ExportHandler, ExportPlan,
};
use crate::record::Purpose;
use crate::storage::TransferRequest;

/// Delivers a record's file to an endpoint on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExportHandler;

impl LocalExportHandler {
    pub fn new() -> Self {
        Self
    }
}

/// Purposes to look for, in order: the job's override, the endpoint's
/// preference list, then the primary file.
pub fn wanted_purposes(ctx: &ExportContext<'_>) -> Vec<Purpose> {
    if let Some(wants) = ctx.job.metadata.wants {
        return vec![wants];
    }
    if !ctx.endpoint.defaults.wants.is_empty() {
        return ctx.endpoint.defaults.wants.clone();
    }
    vec![Purpose::Primary]
}

impl ExportHandler for LocalExportHandler {
    fn analyze(&self, ctx: &ExportContext<'_>) -> Result<ExportPlan, HandlerError> {
        let wanted = wanted_purposes(ctx);
        let file = wanted
            .iter()
            .find_map(|&purpose| ctx.record.file(purpose))
            .cloned()
            .ok_or(HandlerError::NoCandidate(wanted[0]))?;

        let (dest_folder, filename) = match ctx.job.payload.path.as_deref() {
            Some(path) => {
                let path = Path::new(path);
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| {
                        HandlerError::Failed(format!("Bad export path '{}'", path.display()))
                    })?
                    .to_string();
                let folder = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(|p| p.to_path_buf());
                (folder, name)
            }
            None => {
                let base = ctx
                    .record
                    .export_filename
                    .clone()
                    .or_else(|| ctx.record.original_filename.clone())
                    .unwrap_or_else(|| format!("record_{}", ctx.record.id));
                (None, base)
            }
        };

        let filename = if Path::new(&filename).extension().is_none() {
            match file.mime.as_deref().and_then(extension_for_mime) {
                Some(ext) => format!("{}.{}", filename, ext),
                None => filename,
            }
        } else {
            filename
        };

        Ok(ExportPlan {
            file,
            dest_folder,
            filename,
        })
    }

    fn run(&self, ctx: &ExportContext<'_>, plan: &ExportPlan) -> Result<Delivery, HandlerError> {
        log::info!("Exporting {}:{}", plan.file.endpoint_id, plan.file.path);

        let mut request = TransferRequest::new(&ctx.endpoint.id, &plan.filename)
            .from_endpoint(&plan.file.endpoint_id, &plan.file.path)
            .link(ctx.endpoint.defaults.link)
            .keep_original(true)
            .kind(ctx.record.kind.as_str());
        if let Some(folder) = &plan.dest_folder {
            request = request.dest_folder(folder);
        }

        let outcome = ctx.transfer.transfer(&request)?;

        Ok(Delivery {
            relative_path: outcome.relative_path,
            absolute_path: outcome.absolute_path,
            draft: None,
        })
    }
}
