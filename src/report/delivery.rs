//! Publishing of a merged document pair.

use chrono::Utc;
use uuid::Uuid;

use super::MergeOutput;
use crate::storage::{ObjectStorage, StorageError};

pub use crate::inspection::model::DownloadLinks;

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A fresh folder name per generation, e.g. `1710460800000-3f2a9c1d`.
pub fn output_folder() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &id[..8])
}

/// Upload both documents under `folder`.
///
/// Either both links are returned or neither: when the spreadsheet upload
/// fails the already uploaded report is removed again.
pub async fn publish(
    storage: &dyn ObjectStorage,
    output: &MergeOutput,
    folder: &str,
) -> Result<DownloadLinks, StorageError> {
    let word_key = format!("{}/{}", folder, output.word_name);
    let excel_key = format!("{}/{}", folder, output.excel_name);

    let word_url = storage
        .upload_file(&word_key, &output.word, DOCX_CONTENT_TYPE)
        .await?;

    let excel_url = match storage
        .upload_file(&excel_key, &output.excel, XLSX_CONTENT_TYPE)
        .await
    {
        Ok(url) => url,
        Err(e) => {
            log::error!("Failed to upload {}: {}", excel_key, e);
            if let Err(cleanup) = storage.delete_file(&word_key).await {
                log::warn!("Could not remove orphaned {}: {}", word_key, cleanup);
            }
            return Err(e);
        }
    };

    log::info!("Published {} and {}", word_key, excel_key);
    Ok(DownloadLinks {
        word_url,
        excel_url,
    })
}
