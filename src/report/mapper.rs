//! Field mapping from an inspection record to the two template data maps.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::common::{format_report_date, format_sheet_date};
use super::layout::{
    battery_cell_placeholder, battery_cycle_placeholder, battery_name_placeholder,
    battery_serial_placeholder, image_placeholder, CellRef, SheetField, SheetLayout,
    BATTERY_ROWS, CELLS_PER_BATTERY, IMAGE_SLOTS,
};
use super::ReportError;
use crate::inspection::model::{BatteryRecord, InspectionRecord};

/// Value bound to a Word placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum WordValue {
    Text(String),
    Image(Vec<u8>),
    /// Empty photo slot, rendered as the transparent placeholder image.
    BlankImage,
}

pub type WordFields = BTreeMap<String, WordValue>;

/// Contiguous battery rows of the service sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBlock {
    pub start_row: u32,
    pub max_rows: usize,
    /// Column index per value position of a row.
    pub columns: Vec<u32>,
    pub rows: Vec<Vec<String>>,
}

/// Everything the spreadsheet merge writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcelFields {
    pub sheet: String,
    pub cells: BTreeMap<CellRef, String>,
    pub battery_block: Option<RowBlock>,
}

/// Maps an [`InspectionRecord`] onto the Word placeholders and the
/// service-sheet cells, substituting `default_value` for absent optional
/// fields.
pub struct FieldMapper<'a> {
    layout: &'a SheetLayout,
    default_value: &'a str,
}

impl<'a> FieldMapper<'a> {
    pub fn new(layout: &'a SheetLayout, default_value: &'a str) -> Self {
        Self {
            layout,
            default_value,
        }
    }

    pub fn word_fields(&self, record: &InspectionRecord) -> Result<WordFields, ReportError> {
        let mut fields = WordFields::new();
        let date = check_required(record)?;

        let texts = [
            ("drone_name", record.drone_name.clone()),
            ("title", record.drone_name.clone()),
            ("date", format_report_date(date)),
            ("technician", record.technician.clone()),
            ("supervisor", record.supervisor.clone()),
            ("company", record.company.clone()),
            ("owner", record.company.clone()),
            ("aircraft_model", record.aircraft_model.clone()),
            ("manufacturer", record.manufacturer.clone()),
            ("aircraft_type", record.aircraft_type.clone()),
            ("serial_no", record.serial_no.clone()),
            ("report_name", self.or_default(&record.report_name)),
            ("service_sheet_name", self.or_default(&record.service_sheet_name)),
        ];
        for (key, value) in texts {
            fields.insert(key.to_string(), WordValue::Text(value));
        }

        for (key, field) in NOTE_FIELDS {
            let value = self.sheet_value(record, date, field);
            fields.insert(key.to_string(), WordValue::Text(value));
        }

        for slot in 1..=IMAGE_SLOTS {
            let value = match record.images.get(slot - 1) {
                Some(image) if !image.bytes.is_empty() => WordValue::Image(image.bytes.clone()),
                _ => WordValue::BlankImage,
            };
            fields.insert(image_placeholder(slot), value);
        }

        // Without a battery investigation every row of the table is blank.
        let batteries = record.reported_batteries();
        for row in 1..=BATTERY_ROWS {
            self.insert_battery_row(&mut fields, row, batteries.get(row - 1));
        }

        Ok(fields)
    }

    pub fn excel_fields(&self, record: &InspectionRecord) -> Result<ExcelFields, ReportError> {
        let date = check_required(record)?;
        let mut cells = BTreeMap::new();
        for mapping in &self.layout.cells {
            cells.insert(mapping.cell, self.sheet_value(record, date, mapping.field));
        }

        let batteries = record.reported_batteries();
        let battery_block = if batteries.is_empty() {
            None
        } else {
            let block = &self.layout.battery_block;
            let rows = batteries
                .iter()
                .take(block.max_rows)
                .map(|battery| self.battery_row(battery))
                .collect();
            Some(RowBlock {
                start_row: block.start_row,
                max_rows: block.max_rows,
                columns: self.layout.battery_columns(),
                rows,
            })
        };

        Ok(ExcelFields {
            sheet: self.layout.sheet.clone(),
            cells,
            battery_block,
        })
    }

    fn insert_battery_row(
        &self,
        fields: &mut WordFields,
        row: usize,
        battery: Option<&BatteryRecord>,
    ) {
        let mut put = |key: String, value: String| {
            fields.insert(key, WordValue::Text(value));
        };

        match battery {
            Some(battery) => {
                put(battery_name_placeholder(row), self.or_default(&battery.name));
                put(battery_serial_placeholder(row), self.or_default(&battery.serial_number));
                put(battery_cycle_placeholder(row), self.or_default(&battery.cycle_count));
                for cell in 1..=CELLS_PER_BATTERY {
                    let reading = battery.cells.get(cell - 1).cloned().flatten();
                    put(
                        battery_cell_placeholder(row, cell),
                        self.or_default(reading.as_deref().unwrap_or_default()),
                    );
                }
            }
            // Unused rows of the table stay blank.
            None => {
                put(battery_name_placeholder(row), String::new());
                put(battery_serial_placeholder(row), String::new());
                put(battery_cycle_placeholder(row), String::new());
                for cell in 1..=CELLS_PER_BATTERY {
                    put(battery_cell_placeholder(row, cell), String::new());
                }
            }
        }
    }

    /// One battery row in block column order: name, serial, cells, cycle count.
    fn battery_row(&self, battery: &BatteryRecord) -> Vec<String> {
        let mut row = Vec::with_capacity(CELLS_PER_BATTERY + 3);
        row.push(self.or_default(&battery.name));
        row.push(self.or_default(&battery.serial_number));
        for cell in 0..CELLS_PER_BATTERY {
            let reading = battery.cells.get(cell).cloned().flatten();
            row.push(self.or_default(reading.as_deref().unwrap_or_default()));
        }
        row.push(self.or_default(&battery.cycle_count));
        row
    }

    fn sheet_value(&self, record: &InspectionRecord, date: NaiveDate, field: SheetField) -> String {
        let notes = &record.notes;
        match field {
            SheetField::DroneName => self.or_default(&record.drone_name),
            SheetField::Date => format_sheet_date(date),
            SheetField::Technician => self.or_default(&record.technician),
            SheetField::Supervisor => self.or_default(&record.supervisor),
            SheetField::Company => self.or_default(&record.company),
            SheetField::AircraftModel => self.or_default(&record.aircraft_model),
            SheetField::Manufacturer => self.or_default(&record.manufacturer),
            SheetField::AircraftType => self.or_default(&record.aircraft_type),
            SheetField::SerialNo => self.or_default(&record.serial_no),
            SheetField::VisualInspectionNotes => self.note(&notes.visual_inspection_notes),
            SheetField::FunctionInspectionNotes => self.note(&notes.function_inspection_notes),
            SheetField::DeepCleanNotes => self.note(&notes.deep_clean_notes),
            SheetField::FirmwareUpdate => self.note(&notes.firmware_update),
            SheetField::CalibrationNotes => self.note(&notes.calibration_notes),
            SheetField::AdditionalRepairsNotes => self.note(&notes.additional_repairs_notes),
        }
    }

    fn note(&self, value: &Option<String>) -> String {
        self.or_default(value.as_deref().unwrap_or_default())
    }

    fn or_default(&self, value: &str) -> String {
        if value.trim().is_empty() {
            self.default_value.to_string()
        } else {
            value.to_string()
        }
    }
}

const NOTE_FIELDS: [(&str, SheetField); 6] = [
    ("visual_inspection_notes", SheetField::VisualInspectionNotes),
    ("function_inspection_notes", SheetField::FunctionInspectionNotes),
    ("deep_clean_notes", SheetField::DeepCleanNotes),
    ("firmware_update", SheetField::FirmwareUpdate),
    ("calibration_notes", SheetField::CalibrationNotes),
    ("additional_repairs_notes", SheetField::AdditionalRepairsNotes),
];

/// Defensive re-check of the fields the form schema already requires.
fn check_required(record: &InspectionRecord) -> Result<NaiveDate, ReportError> {
    let required = [
        ("droneName", &record.drone_name),
        ("technician", &record.technician),
        ("supervisor", &record.supervisor),
        ("company", &record.company),
        ("aircraftModel", &record.aircraft_model),
        ("manufacturer", &record.manufacturer),
        ("aircraftType", &record.aircraft_type),
        ("serialNo", &record.serial_no),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(ReportError::ValidationGap { field: *field });
    }

    record
        .date
        .ok_or(ReportError::ValidationGap { field: "date" })
}
