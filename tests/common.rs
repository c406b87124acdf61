#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use drone_inspection_server::auth::{AuthService, SessionSigner};
use drone_inspection_server::config::AppConfig;
use drone_inspection_server::report::archive::Package;
use drone_inspection_server::report::{DefaultImageEncoder, ImageEncoder};
use drone_inspection_server::storage::{ObjectStorage, StorageError};
use drone_inspection_server::AppState;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Mutex;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const TEST_PASSWORD: &str = "hangar-door";
pub const TEST_SECRET: &str = "integration-test-secret";

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Mock implementation of ObjectStorage for testing
pub struct MockObjectStorage {
    // In-memory storage for testing
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockObjectStorage {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn has_file(&self, key: &str) -> bool {
        self.files.lock().await.contains_key(key)
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.files.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Key of a download URL handed out by this storage.
    pub fn key_of(url: &str) -> &str {
        url.trim_start_matches("https://storage.test/")
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MockObjectStorage {
    async fn upload_file(
        &self,
        key: &str,
        data: &[u8],
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.files.lock().await.insert(key.to_string(), data.to_vec());
        Ok(format!("https://storage.test/{}", key))
    }

    async fn delete_file(&self, key: &str) -> Result<(), StorageError> {
        self.files.lock().await.remove(key);
        Ok(())
    }
}

fn zip_files(files: &[(&str, String)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn paragraph(runs: &[&str]) -> String {
    let runs: String = runs
        .iter()
        .map(|text| format!("<w:r><w:t>{}</w:t></w:r>", text))
        .collect();
    format!("<w:p>{}</w:p>", runs)
}

/// A small inspection report template. Some tags are split across runs the
/// way Word saves them after editing.
pub fn word_template() -> Vec<u8> {
    let mut body = vec![
        paragraph(&["Drone: {drone", "_name}"]),
        paragraph(&["Date: {date}"]),
        paragraph(&["Owner: {owner} / {technician}"]),
        paragraph(&["Visual: {visual_inspection_notes}"]),
        paragraph(&["Deep clean: {deep_", "clean_notes}"]),
        paragraph(&["Battery: {n1} {sn1} {c1} {v1_1}"]),
    ];
    for slot in 1..=6 {
        body.push(paragraph(&[&format!("{{%image_{}}}", slot)]));
    }

    zip_files(&[
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#.to_string(),
        ),
        (
            "word/document.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{}"><w:body>{}</w:body></w:document>"#,
                W_NS,
                body.concat()
            ),
        ),
        (
            "word/_rels/document.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#.to_string(),
        ),
    ])
}

/// Pre-filled battery row 28 of the service sheet template.
pub const BATTERY_ROW_TEMPLATE: &str = r#"<row r="28"><c r="A28" s="5" t="s"><v>2</v></c><c r="P28" s="5"/></row>"#;

/// A service sheet template with a cover sheet and the form on `Sheet2`.
pub fn excel_template() -> Vec<u8> {
    let sheet2 = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:P30"/><sheetData><row r="2" spans="1:14"><c r="B2" s="3"/><c r="C2" s="3"/><c r="K2" s="9"/></row><row r="4"><c r="A4" s="2" t="s"><v>1</v></c></row>{}</sheetData></worksheet>"#,
        BATTERY_ROW_TEMPLATE
    );

    zip_files(&[
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/></Types>"#.to_string(),
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/><sheet name="Sheet2" sheetId="2" r:id="rId2"/></sheets></workbook>"#.to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/></Relationships>"#.to_string(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#.to_string(),
        ),
        ("xl/worksheets/sheet2.xml", sheet2),
    ])
}

/// Write both templates into `dir` under their default names.
pub fn write_templates(dir: &Path) {
    std::fs::write(dir.join("template.docx"), word_template()).unwrap();
    std::fs::write(dir.join("template.xlsx"), excel_template()).unwrap();
}

pub fn word_document(docx: &[u8]) -> String {
    Package::open(docx)
        .unwrap()
        .read_text("word/document.xml")
        .unwrap()
}

pub fn form_sheet(xlsx: &[u8]) -> String {
    Package::open(xlsx)
        .unwrap()
        .read_text("xl/worksheets/sheet2.xml")
        .unwrap()
}

pub fn media_count(docx: &[u8]) -> usize {
    Package::open(docx)
        .unwrap()
        .names()
        .filter(|name| name.starts_with("word/media/"))
        .count()
}

/// Inline-string cell as written by the sheet merge.
pub fn inline_cell(cell: &str, style: Option<&str>, value: &str) -> String {
    let style = style.map(|s| format!(r#" s="{}""#, s)).unwrap_or_default();
    format!(
        r#"<c r="{}"{} t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
        cell, style, value
    )
}

/// A tiny PNG as a `data:` URL.
pub fn png_data_url() -> String {
    let png = DefaultImageEncoder.blank(3, 3).unwrap().data;
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// The S2500-07 inspection form with `images` photos attached.
pub fn inspection_json(images: usize) -> Value {
    let images: Vec<String> = (0..images).map(|_| png_data_url()).collect();
    json!({
        "reportName": "S2500-07 Inspection",
        "serviceSheetName": "S2500-07 Service Sheet",
        "droneName": "S2500-07",
        "date": "2024-03-15",
        "technician": "Sam Reyes",
        "supervisor": "Jo Park",
        "company": "Skyline Surveys",
        "aircraftModel": "M300 RTK",
        "manufacturer": "DJI",
        "aircraftType": "Multirotor",
        "serialNo": "1ZNBJ7",
        "images": images,
        "investigateBatteryHealth": false,
        "batteries": []
    })
}

pub fn battery_json(name: &str) -> Value {
    json!({
        "name": name,
        "serialNumber": format!("{}-SN", name),
        "cycleCount": 42,
        "cells": vec![3.9; 13]
    })
}

/// Everything an integration test needs: templates on disk, the state and
/// the storage it publishes to.
pub struct TestContext {
    pub dir: TempDir,
    pub state: AppState,
    pub storage: Arc<MockObjectStorage>,
}

/// Build an [`AppState`] around a temp template directory.
pub fn test_context(with_templates: bool) -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    if with_templates {
        write_templates(dir.path());
    }

    let template_dir = dir.path().to_string_lossy().to_string();
    let config = AppConfig::from_lookup(|name| match name {
        "TEMPLATE_DIR" => Some(template_dir.clone()),
        "STORAGE_BACKEND" => Some("inline".to_string()),
        "APP_PASSWORD" => Some(TEST_PASSWORD.to_string()),
        "SESSION_SECRET" => Some(TEST_SECRET.to_string()),
        _ => None,
    })
    .unwrap();

    // Low bcrypt cost keeps the suite fast.
    let password_hash = bcrypt::hash(TEST_PASSWORD, 4).unwrap();
    let auth = AuthService::new(password_hash, SessionSigner::new(TEST_SECRET));
    let storage = Arc::new(MockObjectStorage::new());
    let state = AppState::new_with_storage(config, storage.clone(), auth).unwrap();

    TestContext {
        dir,
        state,
        storage,
    }
}

/// A valid bearer token for `state`.
pub fn session_token(state: &AppState) -> String {
    state.auth.signer().generate_session_token().unwrap()
}
