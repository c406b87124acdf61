//! Inspection module - the submitted form, its validation and the report endpoint.
//!
//! - `model` - the `InspectionRecord` payload and its wire formats
//! - `validation` - form schema checks collecting every violation
//! - `handlers` - `POST /api/reports`

pub mod handlers;
pub mod model;
pub mod validation;

pub use model::{BatteryRecord, DownloadLinks, ImagePayload, InspectionNotes, InspectionRecord};
pub use validation::{validate_record, ValidationError, ValidationErrors};
