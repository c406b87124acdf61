//! Report generation: template loading, both merges, publishing.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use super::common::sanitize_filename;
use super::delivery::{output_folder, publish, DownloadLinks};
use super::image::ImageEncoder;
use super::layout::SheetLayout;
use super::mapper::FieldMapper;
use super::{docx, xlsx, MergeOutput, ReportError};
use crate::inspection::model::InspectionRecord;
use crate::storage::ObjectStorage;

/// Where the two templates live.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub dir: PathBuf,
    pub word: String,
    pub excel: String,
}

impl TemplateSet {
    pub fn new(dir: impl Into<PathBuf>, word: impl Into<String>, excel: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            word: word.into(),
            excel: excel.into(),
        }
    }

    /// Templates are read on every call so they can be replaced on disk
    /// without a restart.
    async fn load(&self, kind: &'static str, name: &str) -> Result<Vec<u8>, ReportError> {
        match tokio::fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ReportError::TemplateNotFound {
                    kind,
                    name: name.to_string(),
                    dir: self.dir.display().to_string(),
                })
            }
            Err(e) => Err(ReportError::TemplateIo {
                name: name.to_string(),
                source: e,
            }),
        }
    }
}

/// Outcome of one submission as returned to the form.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_links: Option<DownloadLinks>,
}

impl GenerateReportResponse {
    pub fn success(links: DownloadLinks) -> Self {
        Self {
            success: true,
            message: "Reports generated successfully.".to_string(),
            download_links: Some(links),
        }
    }

    pub fn failure(err: &ReportError) -> Self {
        Self {
            success: false,
            message: format!("Report generation failed: {}", err),
            download_links: None,
        }
    }
}

impl From<&Result<DownloadLinks, ReportError>> for GenerateReportResponse {
    fn from(result: &Result<DownloadLinks, ReportError>) -> Self {
        match result {
            Ok(links) => Self::success(links.clone()),
            Err(e) => Self::failure(e),
        }
    }
}

pub struct ReportGenerator {
    templates: TemplateSet,
    layout: Arc<SheetLayout>,
    encoder: Arc<dyn ImageEncoder>,
    default_value: String,
}

impl ReportGenerator {
    pub fn new(
        templates: TemplateSet,
        layout: SheetLayout,
        encoder: Arc<dyn ImageEncoder>,
        default_value: impl Into<String>,
    ) -> Self {
        Self {
            templates,
            layout: Arc::new(layout),
            encoder,
            default_value: default_value.into(),
        }
    }

    /// Merge `record` into both templates.
    ///
    /// The Word and Excel merges run as two blocking tasks sharing the
    /// record; the first failure aborts the whole generation.
    pub async fn generate(&self, record: Arc<InspectionRecord>) -> Result<MergeOutput, ReportError> {
        let word_template = self.templates.load("Word", &self.templates.word).await?;
        let excel_template = self.templates.load("Excel", &self.templates.excel).await?;

        let word_task = {
            let record = Arc::clone(&record);
            let layout = Arc::clone(&self.layout);
            let encoder = Arc::clone(&self.encoder);
            let default_value = self.default_value.clone();
            tokio::task::spawn_blocking(move || {
                let fields = FieldMapper::new(&layout, &default_value).word_fields(&record)?;
                docx::merge(&word_template, &fields, encoder.as_ref(), &default_value)
            })
        };

        let excel_task = {
            let record = Arc::clone(&record);
            let layout = Arc::clone(&self.layout);
            let default_value = self.default_value.clone();
            tokio::task::spawn_blocking(move || {
                let fields = FieldMapper::new(&layout, &default_value).excel_fields(&record)?;
                xlsx::merge(&excel_template, &fields)
            })
        };

        let (word, excel) = tokio::try_join!(joined(word_task), joined(excel_task))?;

        Ok(MergeOutput {
            word,
            excel,
            word_name: format!(
                "{}.docx",
                sanitize_filename(&record.report_name, "inspection-report")
            ),
            excel_name: format!(
                "{}.xlsx",
                sanitize_filename(&record.service_sheet_name, "service-sheet")
            ),
        })
    }

    /// Generate both documents and publish them to `storage`.
    pub async fn generate_report(
        &self,
        record: Arc<InspectionRecord>,
        storage: &dyn ObjectStorage,
    ) -> Result<DownloadLinks, ReportError> {
        log::info!("Generating reports for drone {}", record.drone_name);
        let output = self.generate(record).await?;
        log::debug!(
            "Merged {} ({} bytes) and {} ({} bytes)",
            output.word_name,
            output.word.len(),
            output.excel_name,
            output.excel.len()
        );

        let links = publish(storage, &output, &output_folder()).await?;
        Ok(links)
    }
}

async fn joined<T>(handle: JoinHandle<Result<T, ReportError>>) -> Result<T, ReportError> {
    handle
        .await
        .map_err(|e| ReportError::Task(e.to_string()))?
}
