//! In-memory access to OOXML packages (zip archives of XML parts).

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::ReportError;

struct PackageEntry {
    name: String,
    data: Vec<u8>,
}

/// An opened `.docx` / `.xlsx` package.
///
/// Entries keep the order of the source archive; new entries are appended.
pub struct Package {
    entries: Vec<PackageEntry>,
}

impl Package {
    /// Read every file entry of the archive into memory.
    pub fn open(bytes: &[u8]) -> Result<Self, ReportError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(archive.len());

        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|e| ReportError::MalformedTemplate(format!("{}: {}", file.name(), e)))?;
            entries.push(PackageEntry {
                name: file.name().to_string(),
                data,
            });
        }

        Ok(Self { entries })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.data.as_slice())
    }

    /// Read a part as UTF-8 text, failing if it is absent.
    pub fn read_text(&self, name: &str) -> Result<String, ReportError> {
        let data = self
            .get(name)
            .ok_or_else(|| ReportError::MalformedTemplate(format!("missing part '{}'", name)))?;
        String::from_utf8(data.to_vec())
            .map_err(|_| ReportError::MalformedTemplate(format!("part '{}' is not UTF-8", name)))
    }

    /// Replace an entry's content, or append it when it does not exist yet.
    pub fn put(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.data = data,
            None => self.entries.push(PackageEntry {
                name: name.to_string(),
                data,
            }),
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.name != name);
        self.entries.len() != before
    }

    /// Serialize to a new deflate-compressed archive.
    ///
    /// Every entry carries the same fixed timestamp so identical input
    /// produces identical bytes.
    pub fn finish(self) -> Result<Vec<u8>, ReportError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());

        for entry in &self.entries {
            writer.start_file(entry.name.as_str(), options)?;
            writer
                .write_all(&entry.data)
                .map_err(|e| ReportError::Archive(zip::result::ZipError::Io(e)))?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

/// Resolve a relationship target against the folder of its source part.
///
/// `resolve_target("word/document.xml", "media/a.png")` gives `word/media/a.png`;
/// absolute targets (`/xl/worksheets/sheet1.xml`) lose their leading slash.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = source_part.split('/').collect();
    segments.pop();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// The `.rels` part that holds relationships for `part`.
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Insert `content` just before the closing tag of the last `element`,
/// expanding a self-closing `<element .../>` when needed.
pub fn insert_before_close(xml: &str, element: &str, content: &str) -> String {
    if content.is_empty() {
        return xml.to_string();
    }

    let closing = format!("</{}>", element);
    if let Some(pos) = xml.rfind(&closing) {
        return format!("{}{}{}", &xml[..pos], content, &xml[pos..]);
    }

    let opening = format!("<{}", element);
    let self_closing = xml.rfind(&opening).and_then(|start| {
        let end = start + xml[start..].find('>')?;
        (xml.as_bytes()[end - 1] == b'/').then_some(end - 1)
    });
    match self_closing {
        Some(slash) => format!("{}>{}{}{}", &xml[..slash], content, closing, &xml[slash + 2..]),
        None => xml.to_string(),
    }
}
