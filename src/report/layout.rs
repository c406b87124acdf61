//! Fixed template layout tables.
//!
//! The service sheet is a pre-formatted single-page form: every value lands
//! in a specific pre-styled cell. The mapping lives here as data so a new
//! template layout only needs a new table (or a `layout.json` next to the
//! templates), not new merge logic.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ReportError;

/// Number of photo slots in the Word template (`image_1`..`image_6`).
pub const IMAGE_SLOTS: usize = 6;
/// Number of battery rows in both templates.
pub const BATTERY_ROWS: usize = 10;
/// Number of per-cell voltage readings per battery.
pub const CELLS_PER_BATTERY: usize = 13;
/// Last row number a worksheet can address.
pub const MAX_ROW: u32 = 1_048_576;

/// Pixel size images are embedded at in the Word report.
pub const IMAGE_WIDTH_PX: u32 = 212;
pub const IMAGE_HEIGHT_PX: u32 = 283;

/// Word placeholder for photo slot `slot` (1-based).
pub fn image_placeholder(slot: usize) -> String {
    format!("image_{}", slot)
}

/// Word placeholders for battery row `row` (1-based).
pub fn battery_name_placeholder(row: usize) -> String {
    format!("n{}", row)
}

pub fn battery_serial_placeholder(row: usize) -> String {
    format!("sn{}", row)
}

pub fn battery_cycle_placeholder(row: usize) -> String {
    format!("c{}", row)
}

/// Word placeholder for cell `cell` (1-based) of battery row `row`.
pub fn battery_cell_placeholder(row: usize, cell: usize) -> String {
    format!("v{}_{}", row, cell)
}

/// A spreadsheet coordinate such as `D4`. Ordered row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(col: u32, row: u32) -> Self {
        Self { row, col }
    }

    pub fn address(&self) -> String {
        format!("{}{}", column_name(self.col), self.row)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

impl FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('$');
        let split = trimmed
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| format!("cell address '{}' has no row", s))?;
        let (letters, digits) = trimmed.split_at(split);
        let col = column_index(letters.trim_end_matches('$'))
            .ok_or_else(|| format!("cell address '{}' has an invalid column", s))?;
        let row: u32 = digits
            .parse()
            .map_err(|_| format!("cell address '{}' has an invalid row", s))?;
        if row == 0 || row > MAX_ROW {
            return Err(format!("cell address '{}' is out of range", s));
        }
        Ok(Self { row, col })
    }
}

impl Serialize for CellRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.address())
    }
}

impl<'de> Deserialize<'de> for CellRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// 1-based column index for letters like `A`, `P`, `AA`.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut index: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        index = index * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    (index <= 16_384).then_some(index)
}

/// Column letters for a 1-based column index.
pub fn column_name(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Record field a fixed service-sheet cell is filled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetField {
    DroneName,
    Date,
    Technician,
    Supervisor,
    Company,
    AircraftModel,
    Manufacturer,
    AircraftType,
    SerialNo,
    VisualInspectionNotes,
    FunctionInspectionNotes,
    DeepCleanNotes,
    FirmwareUpdate,
    CalibrationNotes,
    AdditionalRepairsNotes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellMapping {
    pub cell: CellRef,
    pub field: SheetField,
}

/// Columns of the battery row block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryBlockLayout {
    pub start_row: u32,
    pub max_rows: usize,
    pub name_column: String,
    pub serial_column: String,
    /// One column per cell reading, in cell order.
    pub cell_columns: Vec<String>,
    pub cycle_column: String,
}

impl Default for BatteryBlockLayout {
    fn default() -> Self {
        Self {
            start_row: 28,
            max_rows: BATTERY_ROWS,
            name_column: "A".to_string(),
            serial_column: "B".to_string(),
            cell_columns: (3..3 + CELLS_PER_BATTERY as u32).map(column_name).collect(),
            cycle_column: "P".to_string(),
        }
    }
}

/// Complete service-sheet layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetLayout {
    pub sheet: String,
    pub cells: Vec<CellMapping>,
    #[serde(default)]
    pub battery_block: BatteryBlockLayout,
}

impl Default for SheetLayout {
    fn default() -> Self {
        use SheetField::*;

        let cells = [
            ("N2", DroneName),
            ("K2", Date),
            ("B2", Company),
            ("F2", AircraftModel),
            ("D2", Manufacturer),
            ("H2", AircraftType),
            ("C2", SerialNo),
            ("D4", VisualInspectionNotes),
            ("D9", FunctionInspectionNotes),
            ("D12", FirmwareUpdate),
            ("D16", CalibrationNotes),
            ("D19", DeepCleanNotes),
            ("D24", AdditionalRepairsNotes),
        ]
        .into_iter()
        .filter_map(|(cell, field)| {
            cell.parse::<CellRef>()
                .ok()
                .map(|cell| CellMapping { cell, field })
        })
        .collect();

        Self {
            sheet: "Sheet2".to_string(),
            cells,
            battery_block: BatteryBlockLayout::default(),
        }
    }
}

impl SheetLayout {
    /// Load `layout.json` from the template directory, or fall back to the
    /// built-in layout when there is none.
    pub fn load_or_default(template_dir: &Path) -> Result<Self, ReportError> {
        let path = template_dir.join("layout.json");
        match std::fs::read(&path) {
            Ok(bytes) => {
                let layout: SheetLayout = serde_json::from_slice(&bytes).map_err(|e| {
                    ReportError::MalformedTemplate(format!("{}: {}", path.display(), e))
                })?;
                layout.validate()?;
                log::info!("Loaded service sheet layout from {}", path.display());
                Ok(layout)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ReportError::TemplateIo {
                name: "layout.json".to_string(),
                source: e,
            }),
        }
    }

    fn validate(&self) -> Result<(), ReportError> {
        let block = &self.battery_block;
        if block.start_row == 0 {
            return Err(ReportError::MalformedTemplate(
                "battery block start row must be 1 or more".to_string(),
            ));
        }
        if block.max_rows == 0 || block.max_rows > BATTERY_ROWS {
            return Err(ReportError::MalformedTemplate(format!(
                "battery block needs 1 to {} rows, got {}",
                BATTERY_ROWS, block.max_rows
            )));
        }
        let last_row = u64::from(block.start_row) + block.max_rows as u64 - 1;
        if last_row > u64::from(MAX_ROW) {
            return Err(ReportError::MalformedTemplate(format!(
                "battery block ends at row {}, past the last sheet row {}",
                last_row, MAX_ROW
            )));
        }
        if block.cell_columns.len() != CELLS_PER_BATTERY {
            return Err(ReportError::MalformedTemplate(format!(
                "battery block needs {} cell columns, got {}",
                CELLS_PER_BATTERY,
                block.cell_columns.len()
            )));
        }
        let columns = [&block.name_column, &block.serial_column, &block.cycle_column];
        for column in columns.into_iter().chain(block.cell_columns.iter()) {
            if column_index(column).is_none() {
                return Err(ReportError::MalformedTemplate(format!(
                    "invalid battery column '{}'",
                    column
                )));
            }
        }
        Ok(())
    }

    /// Column indexes of one battery row: name, serial, 13 cells, cycle count.
    pub fn battery_columns(&self) -> Vec<u32> {
        let block = &self.battery_block;
        std::iter::once(&block.name_column)
            .chain(std::iter::once(&block.serial_column))
            .chain(block.cell_columns.iter())
            .chain(std::iter::once(&block.cycle_column))
            .filter_map(|letters| column_index(letters))
            .collect()
    }
}
