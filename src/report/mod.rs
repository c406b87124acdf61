//! Report module - merges an inspection record into the Word and Excel templates.
//!
//! - `mapper` - turns an `InspectionRecord` into per-format field maps
//! - `layout` - fixed cell-address tables for the service sheet
//! - `docx` - Word placeholder substitution and image embedding
//! - `xlsx` - fixed-cell writes into the service sheet
//! - `generator` - loads templates, runs both merges, publishes the results

pub mod archive;
pub mod common;
pub mod delivery;
pub mod docx;
pub mod generator;
pub mod image;
pub mod layout;
pub mod mapper;
pub mod xlsx;

pub use self::delivery::{publish, DownloadLinks};
pub use self::generator::{GenerateReportResponse, ReportGenerator, TemplateSet};
pub use self::image::{DefaultImageEncoder, EmbeddedImage, ImageEncoder};
pub use self::layout::SheetLayout;
pub use self::mapper::{ExcelFields, FieldMapper, WordFields, WordValue};

use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur while generating the report pair.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{kind} template file '{name}' not found in '{dir}'")]
    TemplateNotFound {
        kind: &'static str,
        name: String,
        dir: String,
    },
    #[error("failed to read template '{name}': {source}")]
    TemplateIo {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed placeholder '{tag}' near \"{context}\"")]
    TemplateSyntaxError { tag: String, context: String },
    #[error("worksheet '{0}' not found in the Excel template")]
    SheetNotFound(String),
    #[error("required field '{field}' is missing")]
    ValidationGap { field: &'static str },
    #[error("image for '{key}' could not be embedded: {reason}")]
    InvalidImage { key: String, reason: String },
    #[error("template is not a valid office document: {0}")]
    MalformedTemplate(String),
    #[error("template archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("template XML error: {0}")]
    Xml(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("document generation task failed: {0}")]
    Task(String),
}

impl From<quick_xml::Error> for ReportError {
    fn from(err: quick_xml::Error) -> Self {
        ReportError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ReportError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ReportError::Xml(err.to_string())
    }
}

/// The two freshly merged documents of one submission.
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub word: Vec<u8>,
    pub excel: Vec<u8>,
    pub word_name: String,
    pub excel_name: String,
}
