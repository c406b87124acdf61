//! Input validation for submitted inspection forms.
//!
//! Every rule runs so the form can show all problems at once.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::model::InspectionRecord;
use crate::report::layout::{BATTERY_ROWS, CELLS_PER_BATTERY, IMAGE_SLOTS};

/// Validation error with a user-facing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ValidationError {
    /// The field that failed validation, in request (camelCase) naming
    pub field: String,
    pub message: String,
    /// Suggestion for how to fix the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Create error for empty required field
    pub fn empty_field(field: &str, label: &str) -> Self {
        Self::new(field, format!("{} is required", label))
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Collection of validation errors.
#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }

    /// One-line summary, e.g. "2 invalid fields: droneName, date".
    pub fn summary(&self) -> String {
        let fields: Vec<&str> = self.errors.iter().map(|e| e.field.as_str()).collect();
        format!(
            "{} invalid field{}: {}",
            self.errors.len(),
            if self.errors.len() == 1 { "" } else { "s" },
            fields.join(", ")
        )
    }

    /// Ok if no errors, Err with every collected error otherwise
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}. {}", i + 1, error)?;
        }
        Ok(())
    }
}

/// Validate that a string is not empty after trimming
pub fn validate_required(value: &str, field: &str, label: &str, errors: &mut ValidationErrors) {
    if value.trim().is_empty() {
        errors.add(ValidationError::empty_field(field, label));
    }
}

/// Check a submitted record against the form schema.
pub fn validate_record(record: &InspectionRecord) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let required = [
        (&record.report_name, "reportName", "Report name"),
        (&record.service_sheet_name, "serviceSheetName", "Service sheet name"),
        (&record.drone_name, "droneName", "Drone name"),
        (&record.technician, "technician", "Technician"),
        (&record.supervisor, "supervisor", "Supervisor"),
        (&record.company, "company", "Company"),
        (&record.aircraft_model, "aircraftModel", "Aircraft model"),
        (&record.manufacturer, "manufacturer", "Manufacturer"),
        (&record.aircraft_type, "aircraftType", "Aircraft type"),
        (&record.serial_no, "serialNo", "Serial number"),
    ];
    for (value, field, label) in required {
        validate_required(value, field, label, &mut errors);
    }

    if record.date.is_none() {
        errors.add(
            ValidationError::empty_field("date", "Inspection date")
                .with_suggestion("Use the format YYYY-MM-DD, e.g. 2024-03-15"),
        );
    }

    if record.images.len() > IMAGE_SLOTS {
        errors.add(
            ValidationError::new(
                "images",
                format!("At most {} images are allowed, got {}", IMAGE_SLOTS, record.images.len()),
            )
            .with_suggestion("Remove some photos before submitting"),
        );
    }
    for (i, image) in record.images.iter().enumerate() {
        if let Some(media_type) = image.media_type.as_deref() {
            if !media_type.starts_with("image/") {
                errors.add(
                    ValidationError::new(
                        format!("images[{}]", i),
                        format!("'{}' is not an image", media_type),
                    )
                    .with_suggestion("Attach a PNG, JPEG or WebP photo"),
                );
            }
        }
    }

    if record.investigate_battery_health {
        validate_batteries(record, &mut errors);
    }

    errors.into_result()
}

fn validate_batteries(record: &InspectionRecord, errors: &mut ValidationErrors) {
    let count = record.batteries.len();
    if count == 0 {
        errors.add(
            ValidationError::new("batteries", "At least one battery is required")
                .with_suggestion("Add a battery or untick the battery health investigation"),
        );
        return;
    }
    if count > BATTERY_ROWS {
        errors.add(ValidationError::new(
            "batteries",
            format!("At most {} batteries are allowed, got {}", BATTERY_ROWS, count),
        ));
    }

    for (i, battery) in record.batteries.iter().enumerate() {
        validate_required(
            &battery.name,
            &format!("batteries[{}].name", i),
            "Battery name",
            errors,
        );
        validate_required(
            &battery.serial_number,
            &format!("batteries[{}].serialNumber", i),
            "Battery serial number",
            errors,
        );
        if battery.cells.len() != CELLS_PER_BATTERY {
            errors.add(ValidationError::new(
                format!("batteries[{}].cells", i),
                format!(
                    "Exactly {} cell readings are required, got {}",
                    CELLS_PER_BATTERY,
                    battery.cells.len()
                ),
            ));
        }
    }
}
