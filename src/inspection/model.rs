use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate};
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use utoipa::ToSchema;

/// A submitted drone inspection form.
///
/// Required text fields default to empty so the validator can report every
/// missing field at once instead of failing on the first one.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InspectionRecord {
    #[serde(default)]
    pub report_name: String,
    #[serde(default)]
    pub service_sheet_name: String,
    #[serde(default)]
    pub drone_name: String,
    #[serde(default, deserialize_with = "deserialize_form_date")]
    #[schema(value_type = Option<String>, format = Date, example = "2024-03-15")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub technician: String,
    #[serde(default)]
    pub supervisor: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub aircraft_model: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub aircraft_type: String,
    #[serde(default)]
    pub serial_no: String,
    #[serde(flatten)]
    pub notes: InspectionNotes,
    /// Base64 data URLs, one per photo slot. An empty string or `null`
    /// leaves its slot blank.
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub images: Vec<ImagePayload>,
    #[serde(default)]
    pub investigate_battery_health: bool,
    #[serde(default)]
    pub batteries: Vec<BatteryRecord>,
}

impl InspectionRecord {
    /// Batteries that should reach the documents: none unless the
    /// battery-health investigation was ticked.
    pub fn reported_batteries(&self) -> &[BatteryRecord] {
        if self.investigate_battery_health {
            &self.batteries
        } else {
            &[]
        }
    }
}

/// The six free-text inspection sections.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InspectionNotes {
    #[serde(default)]
    pub visual_inspection_notes: Option<String>,
    #[serde(default)]
    pub function_inspection_notes: Option<String>,
    #[serde(default)]
    pub deep_clean_notes: Option<String>,
    #[serde(default)]
    pub firmware_update: Option<String>,
    #[serde(default)]
    pub calibration_notes: Option<String>,
    #[serde(default)]
    pub additional_repairs_notes: Option<String>,
}

/// One battery of the battery-health table.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatteryRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    #[schema(value_type = String)]
    pub cycle_count: String,
    /// Per-cell voltage readings, 13 per battery.
    #[serde(default, deserialize_with = "deserialize_cell_readings")]
    #[schema(value_type = Vec<Option<String>>)]
    pub cells: Vec<Option<String>>,
}

/// A decoded photo payload.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            media_type: None,
            bytes,
        }
    }

    /// Decode a `data:image/...;base64,` URL, or bare base64 text.
    pub fn from_data_url(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("image payload is empty".to_string());
        }

        let (header, body) = match raw.split_once(',') {
            Some((header, body)) => (Some(header), body),
            None => (None, raw),
        };

        let media_type = header
            .and_then(|h| h.strip_prefix("data:"))
            .map(|h| h.split(';').next().unwrap_or_default().to_string())
            .filter(|m| !m.is_empty());

        let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| format!("image payload is not valid base64: {}", e))?;
        if bytes.is_empty() {
            return Err("image payload is empty".to_string());
        }

        Ok(Self { media_type, bytes })
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// An empty string or `null` keeps its slot and renders the blank image.
impl<'de> Deserialize<'de> for ImagePayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) if !raw.trim().is_empty() => {
                ImagePayload::from_data_url(&raw).map_err(de::Error::custom)
            }
            _ => Ok(ImagePayload::new(Vec::new())),
        }
    }
}

/// Parse a form date: either `YYYY-MM-DD` or an RFC 3339 timestamp, whose
/// calendar date is taken in its own offset.
pub fn parse_form_date(value: &str) -> Result<NaiveDate, String> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.date_naive())
        .map_err(|_| format!("'{}' is not a valid date", value))
}

fn deserialize_form_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_form_date(value).map(Some).map_err(de::Error::custom),
    }
}

fn lenient_string<E: de::Error>(value: Value) -> Result<Option<String>, E> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(E::custom(format!("expected a string or number, got {}", other))),
    }
}

fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string::<D::Error>(Value::deserialize(deserializer)?)?.unwrap_or_default())
}

fn deserialize_cell_readings<'de, D>(deserializer: D) -> Result<Vec<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    values
        .unwrap_or_default()
        .into_iter()
        .map(|value| -> Result<Option<String>, D::Error> {
            Ok(lenient_string::<D::Error>(value)?
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()))
        })
        .collect()
}

/// Download links of one successful generation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLinks {
    pub word_url: String,
    pub excel_url: String,
}
