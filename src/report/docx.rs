//! Word merge engine.
//!
//! Placeholders are `{name}` for text and `{%name}` for pictures. Word splits
//! typed text into runs freely, so a placeholder may be spread over several
//! `<w:t>` nodes of the same paragraph; the tag is rebuilt from the
//! concatenated paragraph text and the replacement is written into the node
//! where the tag starts.

use std::collections::BTreeSet;
use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;

use super::archive::{insert_before_close, rels_path_for, Package};
use super::common::{escape_xml_text, excerpt};
use super::image::{EmbeddedImage, ImageEncoder};
use super::layout::{IMAGE_HEIGHT_PX, IMAGE_WIDTH_PX};
use super::mapper::{WordFields, WordValue};
use super::ReportError;

const DOCUMENT_PART: &str = "word/document.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const WP_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

const EMPTY_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#;

/// Characters of paragraph text quoted around a malformed tag.
const CONTEXT_RADIUS: usize = 20;

lazy_static! {
    static ref TEXT_NODE: Regex = Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").unwrap();
    static ref TEXT_PART: Regex =
        Regex::new(r"^word/(?:document|header\d*|footer\d*|footnotes|endnotes)\.xml$").unwrap();
    static ref TAG_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref REL_ID: Regex = Regex::new(r#"\bId="rId(\d+)""#).unwrap();
    static ref DOC_PR_ID: Regex = Regex::new(r#"<wp:docPr\b[^>]*?\bid="(\d+)""#).unwrap();
}

/// Merge `fields` into a `.docx` template and return the new document.
///
/// Placeholders without a mapped key render `default_value` (pictures render
/// the blank image), so no placeholder syntax survives into the output.
pub fn merge(
    template: &[u8],
    fields: &WordFields,
    encoder: &dyn ImageEncoder,
    default_value: &str,
) -> Result<Vec<u8>, ReportError> {
    let package = Package::open(template)?;
    if !package.contains(DOCUMENT_PART) {
        return Err(ReportError::MalformedTemplate(format!(
            "missing part '{}'",
            DOCUMENT_PART
        )));
    }

    let parts: Vec<String> = package
        .names()
        .filter(|name| TEXT_PART.is_match(name))
        .map(String::from)
        .collect();

    let mut merger = WordMerger::new(package, fields, encoder, default_value);
    merger.next_doc_pr = merger.max_doc_pr_id(&parts)? + 1;
    for part in &parts {
        merger.merge_part(part)?;
    }
    merger.finish()
}

/// A `<w:t>` element located in a part.
#[derive(Debug)]
struct TextNode {
    /// Byte range of the whole element.
    span: Range<usize>,
    /// Byte range of its character data.
    content: Range<usize>,
    paragraph: usize,
}

#[derive(Debug, PartialEq)]
struct Tag {
    /// Byte range in the joined paragraph text, braces included.
    start: usize,
    end: usize,
    name: String,
    image: bool,
}

/// Relationships of one part, plus the ones added while merging it.
struct Relationships {
    path: String,
    xml: String,
    next_id: u32,
    pending: String,
}

impl Relationships {
    fn load(package: &Package, part: &str) -> Result<Self, ReportError> {
        let path = rels_path_for(part);
        let xml = if package.contains(&path) {
            package.read_text(&path)?
        } else {
            EMPTY_RELS.to_string()
        };
        let next_id = REL_ID
            .captures_iter(&xml)
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;

        Ok(Self {
            path,
            xml,
            next_id,
            pending: String::new(),
        })
    }

    fn add_image(&mut self, target: &str) -> String {
        let id = format!("rId{}", self.next_id);
        self.next_id += 1;
        self.pending.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            id, IMAGE_REL_TYPE, target
        ));
        id
    }

    fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    fn into_xml(self) -> String {
        insert_before_close(&self.xml, "Relationships", &self.pending)
    }
}

struct WordMerger<'a> {
    package: Package,
    fields: &'a WordFields,
    encoder: &'a dyn ImageEncoder,
    default_value: &'a str,
    next_doc_pr: u32,
    next_media: usize,
    /// (extension, content type) of every embedded picture.
    extensions: BTreeSet<(&'static str, &'static str)>,
    blank: Option<EmbeddedImage>,
}

impl<'a> WordMerger<'a> {
    fn new(
        package: Package,
        fields: &'a WordFields,
        encoder: &'a dyn ImageEncoder,
        default_value: &'a str,
    ) -> Self {
        Self {
            package,
            fields,
            encoder,
            default_value,
            next_doc_pr: 1,
            next_media: 1,
            extensions: BTreeSet::new(),
            blank: None,
        }
    }

    fn max_doc_pr_id(&self, parts: &[String]) -> Result<u32, ReportError> {
        let mut max = 0;
        for part in parts {
            let xml = self.package.read_text(part)?;
            for caps in DOC_PR_ID.captures_iter(&xml) {
                if let Ok(id) = caps[1].parse::<u32>() {
                    max = max.max(id);
                }
            }
        }
        Ok(max)
    }

    fn merge_part(&mut self, part: &str) -> Result<(), ReportError> {
        let xml = self.package.read_text(part)?;
        let mut rels = Relationships::load(&self.package, part)?;

        let Some(mut merged) = self.merge_xml(&xml, &mut rels)? else {
            return Ok(());
        };
        log::debug!("Merged placeholders in {}", part);

        if rels.is_dirty() {
            merged = ensure_drawing_namespaces(&merged);
            let path = rels.path.clone();
            self.package.put(&path, rels.into_xml().into_bytes());
        }
        self.package.put(part, merged.into_bytes());
        Ok(())
    }

    /// Substitute every tag of one XML part. `None` when the part has no tags.
    fn merge_xml(
        &mut self,
        xml: &str,
        rels: &mut Relationships,
    ) -> Result<Option<String>, ReportError> {
        let nodes = text_nodes(xml);
        let mut replacements: Vec<Option<String>> = vec![None; nodes.len()];
        let mut changed = false;

        for group in paragraph_groups(&nodes) {
            let slice = &nodes[group.clone()];
            let mut joined = String::new();
            let mut offsets = Vec::with_capacity(slice.len());
            for node in slice {
                offsets.push(joined.len());
                joined.push_str(&xml[node.content.clone()]);
            }

            let tags = scan_tags(&joined)?;
            if tags.is_empty() {
                continue;
            }
            changed = true;

            let rendered = tags
                .iter()
                .map(|tag| self.render_tag(tag, rels))
                .collect::<Result<Vec<_>, _>>()?;

            for (k, node) in slice.iter().enumerate() {
                let from = offsets[k];
                let to = from + node.content.len();
                if tags.iter().any(|tag| tag.start < to && tag.end > from) {
                    replacements[group.start + k] = Some(splice(&joined, from, to, &tags, &rendered));
                }
            }
        }

        if !changed {
            return Ok(None);
        }

        let mut out = String::with_capacity(xml.len() + 256);
        let mut cursor = 0;
        for (node, replacement) in nodes.iter().zip(&replacements) {
            if let Some(content) = replacement {
                out.push_str(&xml[cursor..node.span.start]);
                out.push_str(r#"<w:t xml:space="preserve">"#);
                out.push_str(content);
                out.push_str("</w:t>");
                cursor = node.span.end;
            }
        }
        out.push_str(&xml[cursor..]);
        Ok(Some(out))
    }

    fn render_tag(&mut self, tag: &Tag, rels: &mut Relationships) -> Result<String, ReportError> {
        match self.fields.get(&tag.name) {
            Some(WordValue::Text(value)) => Ok(text_markup(value)),
            Some(WordValue::Image(bytes)) => {
                let image = self
                    .encoder
                    .encode(bytes, IMAGE_WIDTH_PX, IMAGE_HEIGHT_PX)
                    .map_err(|reason| ReportError::InvalidImage {
                        key: tag.name.clone(),
                        reason,
                    })?;
                Ok(self.image_markup(&tag.name, &image, rels))
            }
            Some(WordValue::BlankImage) => self.blank_markup(&tag.name, rels),
            None if tag.image => self.blank_markup(&tag.name, rels),
            None => {
                log::debug!("No value for placeholder '{}', using default", tag.name);
                Ok(text_markup(self.default_value))
            }
        }
    }

    fn blank_markup(&mut self, name: &str, rels: &mut Relationships) -> Result<String, ReportError> {
        let blank = match &self.blank {
            Some(blank) => blank.clone(),
            None => {
                let blank = self
                    .encoder
                    .blank(IMAGE_WIDTH_PX, IMAGE_HEIGHT_PX)
                    .map_err(|reason| ReportError::InvalidImage {
                        key: name.to_string(),
                        reason,
                    })?;
                self.blank = Some(blank.clone());
                blank
            }
        };
        Ok(self.image_markup(name, &blank, rels))
    }

    /// Store the picture under `word/media` and return the run markup that
    /// shows it in place of the tag.
    fn image_markup(&mut self, name: &str, image: &EmbeddedImage, rels: &mut Relationships) -> String {
        let (media_path, target) = loop {
            let file = format!("merged_image{}.{}", self.next_media, image.extension);
            self.next_media += 1;
            let path = format!("word/media/{}", file);
            if !self.package.contains(&path) {
                break (path, format!("media/{}", file));
            }
        };
        self.package.put(&media_path, image.data.clone());
        self.extensions.insert((image.extension, image.content_type));

        let rel_id = rels.add_image(&target);
        let doc_pr = self.next_doc_pr;
        self.next_doc_pr += 1;

        format!(
            "</w:t>{}<w:t xml:space=\"preserve\">",
            drawing_xml(&rel_id, doc_pr, name, image)
        )
    }

    fn finish(mut self) -> Result<Vec<u8>, ReportError> {
        if !self.extensions.is_empty() {
            let types = self.package.read_text(CONTENT_TYPES_PART)?;
            let lowered = types.to_ascii_lowercase();
            let pending: String = self
                .extensions
                .iter()
                .filter(|(ext, _)| !lowered.contains(&format!("extension=\"{}\"", ext)))
                .map(|(ext, content_type)| {
                    format!(r#"<Default Extension="{}" ContentType="{}"/>"#, ext, content_type)
                })
                .collect();
            if !pending.is_empty() {
                let types = insert_before_close(&types, "Types", &pending);
                self.package.put(CONTENT_TYPES_PART, types.into_bytes());
            }
        }
        self.package.finish()
    }
}

fn text_nodes(xml: &str) -> Vec<TextNode> {
    let mut nodes = Vec::new();
    let mut paragraph = 0;
    let mut last = 0;

    for caps in TEXT_NODE.captures_iter(xml) {
        let (Some(whole), Some(content)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if xml[last..whole.start()].contains("</w:p>") {
            paragraph += 1;
        }
        nodes.push(TextNode {
            span: whole.range(),
            content: content.range(),
            paragraph,
        });
        last = whole.end();
    }
    nodes
}

/// Consecutive node index ranges sharing one paragraph.
fn paragraph_groups(nodes: &[TextNode]) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=nodes.len() {
        if i == nodes.len() || nodes[i].paragraph != nodes[start].paragraph {
            if start < i {
                groups.push(start..i);
            }
            start = i;
        }
    }
    groups
}

fn syntax_error(text: &str, start: usize, end: usize) -> ReportError {
    ReportError::TemplateSyntaxError {
        tag: text[start..end].to_string(),
        context: excerpt(text, start, end, CONTEXT_RADIUS),
    }
}

/// Find the `{...}` tags of one paragraph's text.
fn scan_tags(text: &str) -> Result<Vec<Tag>, ReportError> {
    let mut tags = Vec::new();
    let mut open: Option<usize> = None;

    for (i, ch) in text.char_indices() {
        match ch {
            '{' => {
                if let Some(start) = open {
                    return Err(syntax_error(text, start, i));
                }
                open = Some(i);
            }
            '}' => {
                let start = open.take().ok_or_else(|| syntax_error(text, i, i + 1))?;
                let inner = text[start + 1..i].trim();
                let (image, name) = match inner.strip_prefix('%') {
                    Some(rest) => (true, rest.trim()),
                    None => (false, inner),
                };
                if !TAG_NAME.is_match(name) {
                    return Err(syntax_error(text, start, i + 1));
                }
                tags.push(Tag {
                    start,
                    end: i + 1,
                    name: name.to_string(),
                    image,
                });
            }
            _ => {}
        }
    }

    match open {
        Some(start) => Err(syntax_error(text, start, text.len())),
        None => Ok(tags),
    }
}

/// Rebuild the character data of the node covering `from..to` of the
/// joined text. A tag's replacement goes where the tag starts; the rest of a
/// tag spread over later nodes is dropped.
fn splice(joined: &str, from: usize, to: usize, tags: &[Tag], rendered: &[String]) -> String {
    let mut out = String::new();
    let mut pos = from;

    while pos < to {
        match tags.iter().position(|tag| tag.start <= pos && pos < tag.end) {
            Some(i) => {
                if tags[i].start == pos {
                    out.push_str(&rendered[i]);
                }
                pos = tags[i].end.min(to);
            }
            None => {
                let next = tags
                    .iter()
                    .map(|tag| tag.start)
                    .filter(|&start| start > pos && start < to)
                    .min()
                    .unwrap_or(to);
                out.push_str(&joined[pos..next]);
                pos = next;
            }
        }
    }
    out
}

/// Character data for a text value; line breaks become `<w:br/>`.
fn text_markup(value: &str) -> String {
    let normalized = value.replace("\r\n", "\n").replace('\r', "\n");
    normalized
        .split('\n')
        .map(escape_xml_text)
        .collect::<Vec<_>>()
        .join("</w:t><w:br/><w:t xml:space=\"preserve\">")
}

fn drawing_xml(rel_id: &str, doc_pr: u32, name: &str, image: &EmbeddedImage) -> String {
    format!(
        concat!(
            r#"<w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:effectExtent l="0" t="0" r="0" b="0"/>"#,
            r#"<wp:docPr id="{id}" name="{name} {id}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="{a}" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="{a}"><a:graphicData uri="{pic}"><pic:pic xmlns:pic="{pic}">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="0" name="{name}"/><pic:cNvPicPr><a:picLocks noChangeAspect="1" noChangeArrowheads="1"/></pic:cNvPicPr></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rel}"/><a:srcRect/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr bwMode="auto"><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic>"#,
            r#"</wp:inline></w:drawing>"#
        ),
        cx = image.width_emu,
        cy = image.height_emu,
        id = doc_pr,
        name = name,
        a = A_NS,
        pic = PIC_NS,
        rel = rel_id,
    )
}

/// Declare the `wp` and `r` prefixes used by drawings on the part's root
/// element when the template does not already.
fn ensure_drawing_namespaces(xml: &str) -> String {
    let Some(root_start) = root_element_start(xml) else {
        return xml.to_string();
    };
    let Some(tag_len) = xml[root_start..].find('>') else {
        return xml.to_string();
    };
    let tag_end = root_start + tag_len;
    let root_tag = &xml[root_start..tag_end];

    let additions: String = [("wp", WP_NS), ("r", R_NS)]
        .iter()
        .filter(|(prefix, _)| !root_tag.contains(&format!("xmlns:{}=", prefix)))
        .map(|(prefix, uri)| format!(r#" xmlns:{}="{}""#, prefix, uri))
        .collect();
    if additions.is_empty() {
        return xml.to_string();
    }

    let insert_at = if root_tag.ends_with('/') {
        tag_end - 1
    } else {
        tag_end
    };
    format!("{}{}{}", &xml[..insert_at], additions, &xml[insert_at..])
}

fn root_element_start(xml: &str) -> Option<usize> {
    let mut pos = 0;
    loop {
        let idx = pos + xml[pos..].find('<')?;
        match xml.as_bytes().get(idx + 1) {
            Some(b'?') | Some(b'!') => pos = idx + xml[idx..].find('>')? + 1,
            _ => return Some(idx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::image::DefaultImageEncoder;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    fn docx(body: &str) -> Vec<u8> {
        docx_with_parts(body, &[])
    }

    /// A document package plus extra parts such as headers and footers.
    fn docx_with_parts(body: &str, extra: &[(&str, String)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        let files = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#.to_string(),
            ),
            (
                "word/document.xml",
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{}"><w:body>{}</w:body></w:document>"#,
                    W_NS, body
                ),
            ),
            (
                "word/_rels/document.xml.rels",
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#.to_string(),
            ),
        ];
        for (name, content) in files.iter().chain(extra) {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn paragraph(runs: &[&str]) -> String {
        let runs: String = runs
            .iter()
            .map(|text| format!("<w:r><w:rPr><w:b/></w:rPr><w:t>{}</w:t></w:r>", text))
            .collect();
        format!("<w:p>{}</w:p>", runs)
    }

    fn text_fields(pairs: &[(&str, &str)]) -> WordFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), WordValue::Text(v.to_string())))
            .collect()
    }

    fn document_xml(docx: &[u8]) -> String {
        Package::open(docx).unwrap().read_text(DOCUMENT_PART).unwrap()
    }

    fn png() -> Vec<u8> {
        DefaultImageEncoder.blank(2, 2).unwrap().data
    }

    #[test]
    fn test_substitutes_tag_split_across_runs() {
        let template = docx(&paragraph(&["Drone: {dro", "ne_na", "me} checked"]));
        let fields = text_fields(&[("drone_name", "S2500-07")]);

        let out = merge(&template, &fields, &DefaultImageEncoder, "N/A").unwrap();
        let xml = document_xml(&out);

        assert!(xml.contains("Drone: S2500-07"));
        assert!(xml.contains(" checked"));
        assert!(!xml.contains("{dro"));
        assert!(!xml.contains("me}"));
        // run formatting is untouched
        assert_eq!(xml.matches("<w:b/>").count(), 3);
    }

    #[test]
    fn test_multiple_tags_in_one_node() {
        let template = docx(&paragraph(&["{technician} / {supervisor}"]));
        let fields = text_fields(&[("technician", "Sam"), ("supervisor", "Jo")]);

        let xml = document_xml(&merge(&template, &fields, &DefaultImageEncoder, "N/A").unwrap());
        assert!(xml.contains(r#"<w:t xml:space="preserve">Sam / Jo</w:t>"#));
    }

    #[test]
    fn test_unknown_tag_gets_default() {
        let template = docx(&paragraph(&["Owner: { owner }"]));
        let xml = document_xml(
            &merge(&template, &WordFields::new(), &DefaultImageEncoder, "N/A").unwrap(),
        );
        assert!(xml.contains("Owner: N/A"));
        assert!(!xml.contains('{'));
    }

    #[test]
    fn test_values_are_escaped_and_line_breaks_kept() {
        let template = docx(&paragraph(&["{notes}"]));
        let fields = text_fields(&[("notes", "Props & arms <ok>\nMotor 3 noisy")]);

        let xml = document_xml(&merge(&template, &fields, &DefaultImageEncoder, "N/A").unwrap());
        assert!(xml.contains("Props &amp; arms &lt;ok&gt;</w:t><w:br/><w:t xml:space=\"preserve\">Motor 3 noisy"));
    }

    #[test]
    fn test_tags_do_not_cross_paragraphs() {
        let body = format!("{}{}", paragraph(&["{drone"]), paragraph(&["_name}"]));
        let err = merge(&docx(&body), &WordFields::new(), &DefaultImageEncoder, "N/A").unwrap_err();
        match err {
            ReportError::TemplateSyntaxError { tag, .. } => assert_eq!(tag, "{drone"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_tags_are_syntax_errors() {
        for text in ["{#batteries}", "{}", "{drone name}", "closing } only", "{a{b}"] {
            let template = docx(&paragraph(&[text]));
            let result = merge(&template, &WordFields::new(), &DefaultImageEncoder, "N/A");
            assert!(
                matches!(result, Err(ReportError::TemplateSyntaxError { .. })),
                "{} should be rejected",
                text
            );
        }
    }

    #[test]
    fn test_syntax_error_carries_context() {
        let template = docx(&paragraph(&["Visual inspection: {#loop} and more"]));
        let err = merge(&template, &WordFields::new(), &DefaultImageEncoder, "N/A").unwrap_err();
        match err {
            ReportError::TemplateSyntaxError { tag, context } => {
                assert_eq!(tag, "{#loop}");
                assert!(context.contains("inspection: {#loop} and"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_embeds_images_and_blank_slots() {
        let template = docx(&format!(
            "{}{}",
            paragraph(&["{%image_1}"]),
            paragraph(&["{%image_2}"])
        ));
        let mut fields = WordFields::new();
        fields.insert("image_1".to_string(), WordValue::Image(png()));

        let out = merge(&template, &fields, &DefaultImageEncoder, "N/A").unwrap();
        let package = Package::open(&out).unwrap();
        let xml = package.read_text(DOCUMENT_PART).unwrap();

        assert_eq!(xml.matches("<w:drawing>").count(), 2);
        assert!(xml.contains(r#"cx="2019300" cy="2695575""#));
        assert!(xml.contains(r#"r:embed="rId2""#));
        assert!(xml.contains(r#"r:embed="rId3""#));
        assert!(xml.contains(&format!(r#"xmlns:wp="{}""#, WP_NS)));
        assert!(xml.contains(&format!(r#"xmlns:r="{}""#, R_NS)));
        assert!(!xml.contains("{%"));

        assert!(package.contains("word/media/merged_image1.png"));
        assert!(package.contains("word/media/merged_image2.png"));
        let rels = package.read_text("word/_rels/document.xml.rels").unwrap();
        assert!(rels.contains(r#"Id="rId2""#));
        assert!(rels.contains(r#"Target="media/merged_image2.png""#));
        let types = package.read_text(CONTENT_TYPES_PART).unwrap();
        assert!(types.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));
    }

    #[test]
    fn test_merges_headers_and_footers() {
        let header = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:hdr xmlns:w="{}">{}</w:hdr>"#,
            W_NS,
            paragraph(&["{comp", "any} ", "{%image_1}"])
        );
        let footer = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:ftr xmlns:w="{}">{}</w:ftr>"#,
            W_NS,
            paragraph(&["Drone {drone_name}"])
        );
        let template = docx_with_parts(
            &paragraph(&["Body text"]),
            &[("word/header1.xml", header), ("word/footer1.xml", footer)],
        );
        let mut fields = text_fields(&[("company", "Skyline"), ("drone_name", "S2500-07")]);
        fields.insert("image_1".to_string(), WordValue::Image(png()));

        let out = merge(&template, &fields, &DefaultImageEncoder, "N/A").unwrap();
        let package = Package::open(&out).unwrap();

        let header = package.read_text("word/header1.xml").unwrap();
        assert!(header.contains("Skyline"));
        assert!(!header.contains('{'));
        assert_eq!(header.matches("<w:drawing>").count(), 1);
        assert!(header.contains(r#"r:embed="rId1""#));
        let root = &header[header.find("<w:hdr").unwrap()..];
        let root = &root[..root.find('>').unwrap()];
        assert!(root.contains(&format!(r#"xmlns:wp="{}""#, WP_NS)));
        assert!(root.contains(&format!(r#"xmlns:r="{}""#, R_NS)));

        // the header had no relationships part, so one is created for it
        let rels = package.read_text("word/_rels/header1.xml.rels").unwrap();
        assert!(rels.contains(r#"Id="rId1""#));
        assert!(rels.contains(r#"Target="media/merged_image1.png""#));
        assert!(package.contains("word/media/merged_image1.png"));

        assert!(package
            .read_text("word/footer1.xml")
            .unwrap()
            .contains("Drone S2500-07"));
        assert!(document_xml(&out).contains("Body text"));
    }

    #[test]
    fn test_invalid_image_payload_fails() {
        let template = docx(&paragraph(&["{%image_1}"]));
        let mut fields = WordFields::new();
        fields.insert("image_1".to_string(), WordValue::Image(b"nope".to_vec()));

        let err = merge(&template, &fields, &DefaultImageEncoder, "N/A").unwrap_err();
        assert!(matches!(err, ReportError::InvalidImage { ref key, .. } if key == "image_1"));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let template = docx(&format!(
            "{}{}",
            paragraph(&["{drone_name} {date}"]),
            paragraph(&["{%image_1}"])
        ));
        let mut fields = text_fields(&[("drone_name", "S2500-07"), ("date", "15/03/24")]);
        fields.insert("image_1".to_string(), WordValue::Image(png()));

        let first = merge(&template, &fields, &DefaultImageEncoder, "N/A").unwrap();
        let second = merge(&template, &fields, &DefaultImageEncoder, "N/A").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_template_without_tags_is_unchanged_in_content() {
        let body = paragraph(&["Nothing to merge here"]);
        let out = merge(&docx(&body), &WordFields::new(), &DefaultImageEncoder, "N/A").unwrap();
        assert!(document_xml(&out).contains("<w:t>Nothing to merge here</w:t>"));
    }

    #[test]
    fn test_missing_document_part_is_malformed() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("word/styles.xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"<w:styles/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert!(matches!(
            merge(&bytes, &WordFields::new(), &DefaultImageEncoder, "N/A"),
            Err(ReportError::MalformedTemplate(_))
        ));
    }

    #[test]
    fn test_scan_tags_positions() {
        let tags = scan_tags("a {x} b {% image_1 }").unwrap();
        assert_eq!(
            tags,
            vec![
                Tag { start: 2, end: 5, name: "x".to_string(), image: false },
                Tag { start: 8, end: 20, name: "image_1".to_string(), image: true },
            ]
        );
    }

    #[test]
    fn test_ensure_drawing_namespaces_is_idempotent() {
        let xml = r#"<?xml version="1.0"?><w:document xmlns:w="x"><w:body/></w:document>"#;
        let once = ensure_drawing_namespaces(xml);
        assert!(once.starts_with(r#"<?xml version="1.0"?><w:document xmlns:w="x" xmlns:wp="#));
        assert_eq!(ensure_drawing_namespaces(&once), once);
    }
}
