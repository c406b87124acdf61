//! Spreadsheet merge engine.
//!
//! Values are written as inline strings into fixed cells of one worksheet.
//! The sheet XML is streamed through quick-xml: untouched rows and cells are
//! copied as-is, targeted cells are replaced in place (keeping their style)
//! and missing rows or cells are inserted in document order.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::mem;

use lazy_static::lazy_static;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;

use super::archive::{rels_path_for, resolve_target, Package};
use super::common::escape_xml_text;
use super::layout::CellRef;
use super::mapper::ExcelFields;
use super::ReportError;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

lazy_static! {
    static ref CALC_CHAIN_OVERRIDE: Regex =
        Regex::new(r#"<Override\b[^>]*PartName="/xl/calcChain\.xml"[^>]*/>"#).unwrap();
    static ref CALC_CHAIN_REL: Regex =
        Regex::new(r#"<Relationship\b[^>]*Target="[^"]*calcChain\.xml"[^>]*/>"#).unwrap();
}

/// Pending writes keyed by row, then column.
type RowWrites = BTreeMap<u32, BTreeMap<u32, String>>;

/// Write `fields` into a `.xlsx` template and return the new workbook.
pub fn merge(template: &[u8], fields: &ExcelFields) -> Result<Vec<u8>, ReportError> {
    let mut package = Package::open(template)?;
    let part = sheet_part(&package, &fields.sheet)?;
    let xml = package.read_text(&part)?;

    let writes = planned_writes(fields);
    let edited = SheetEditor::new(&xml, &writes).run()?;
    log::debug!(
        "Wrote {} cells into '{}' ({})",
        writes.values().map(BTreeMap::len).sum::<usize>(),
        fields.sheet,
        part
    );
    package.put(&part, edited.xml.into_bytes());

    // Excel rebuilds the chain on open; a stale one pointing at a replaced
    // formula makes it report the file as corrupt.
    if edited.formulas_overwritten {
        drop_calc_chain(&mut package)?;
    }
    package.finish()
}

fn planned_writes(fields: &ExcelFields) -> RowWrites {
    let mut rows = RowWrites::new();
    for (cell, value) in &fields.cells {
        rows.entry(cell.row)
            .or_default()
            .insert(cell.col, value.clone());
    }

    if let Some(block) = &fields.battery_block {
        for (offset, values) in block.rows.iter().take(block.max_rows).enumerate() {
            let Some(row) = u32::try_from(offset)
                .ok()
                .and_then(|offset| block.start_row.checked_add(offset))
            else {
                break;
            };
            for (col, value) in block.columns.iter().zip(values) {
                rows.entry(row).or_default().insert(*col, value.clone());
            }
        }
    }
    rows
}

/// Locate the worksheet part named `sheet` through the workbook and its
/// relationships.
fn sheet_part(package: &Package, sheet: &str) -> Result<String, ReportError> {
    let workbook = package.read_text(WORKBOOK_PART)?;
    let rel_id = sheet_relationship(&workbook, sheet)?
        .ok_or_else(|| ReportError::SheetNotFound(sheet.to_string()))?;

    let rels_path = rels_path_for(WORKBOOK_PART);
    let rels = package.read_text(&rels_path)?;
    let target = relationship_target(&rels, &rel_id)?.ok_or_else(|| {
        ReportError::MalformedTemplate(format!(
            "relationship '{}' of sheet '{}' missing from {}",
            rel_id, sheet, rels_path
        ))
    })?;

    let part = resolve_target(WORKBOOK_PART, &target);
    if !package.contains(&part) {
        return Err(ReportError::MalformedTemplate(format!(
            "worksheet part '{}' is missing",
            part
        )));
    }
    Ok(part)
}

fn sheet_relationship(workbook: &str, sheet: &str) -> Result<Option<String>, ReportError> {
    let mut reader = Reader::from_str(workbook);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let matches = attribute(&e, b"name")?
                    .map(|name| name.eq_ignore_ascii_case(sheet))
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.local_name().as_ref() == b"id" && attr.key.prefix().is_some() {
                        return Ok(Some(attr.unescape_value()?.into_owned()));
                    }
                }
                return Err(ReportError::MalformedTemplate(format!(
                    "sheet '{}' has no relationship id",
                    sheet
                )));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn relationship_target(rels: &str, id: &str) -> Result<Option<String>, ReportError> {
    let mut reader = Reader::from_str(rels);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if attribute(&e, b"Id")?.as_deref() == Some(id) {
                    return attribute(&e, b"Target");
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn attribute(e: &BytesStart, name: &[u8]) -> Result<Option<String>, ReportError> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn drop_calc_chain(package: &mut Package) -> Result<(), ReportError> {
    if !package.remove(CALC_CHAIN_PART) {
        return Ok(());
    }
    log::debug!("Removed {} after overwriting formula cells", CALC_CHAIN_PART);

    let types = package.read_text(CONTENT_TYPES_PART)?;
    let types = CALC_CHAIN_OVERRIDE.replace_all(&types, "").into_owned();
    package.put(CONTENT_TYPES_PART, types.into_bytes());

    let rels_path = rels_path_for(WORKBOOK_PART);
    if package.contains(&rels_path) {
        let rels = package.read_text(&rels_path)?;
        let rels = CALC_CHAIN_REL.replace_all(&rels, "").into_owned();
        package.put(&rels_path, rels.into_bytes());
    }
    Ok(())
}

struct SheetRewrite {
    xml: String,
    formulas_overwritten: bool,
}

/// Streaming rewrite of one worksheet part.
struct SheetEditor<'x> {
    reader: Reader<&'x [u8]>,
    writer: Writer<Cursor<Vec<u8>>>,
    all_writes: &'x RowWrites,
    pending: RowWrites,
    /// Namespace prefix of the sheet elements, including the colon.
    prefix: String,
    in_sheet_data: bool,
    /// Cells still to write in the row being copied.
    row_cells: Option<BTreeMap<u32, String>>,
    row: u32,
    col: u32,
    formulas_overwritten: bool,
    /// `si` groups of shared formulas whose master cell was overwritten.
    orphaned_shared: BTreeSet<String>,
}

impl<'x> SheetEditor<'x> {
    fn new(xml: &'x str, writes: &'x RowWrites) -> Self {
        Self {
            reader: Reader::from_str(xml),
            writer: Writer::new(Cursor::new(Vec::new())),
            all_writes: writes,
            pending: writes.clone(),
            prefix: String::new(),
            in_sheet_data: false,
            row_cells: None,
            row: 0,
            col: 0,
            formulas_overwritten: false,
            orphaned_shared: BTreeSet::new(),
        }
    }

    fn run(mut self) -> Result<SheetRewrite, ReportError> {
        loop {
            match self.reader.read_event()? {
                Event::Eof => break,
                Event::Empty(e) if !self.in_sheet_data && e.local_name().as_ref() == b"dimension" => {
                    let widened = widened_dimension(&e, self.all_writes)?;
                    self.write(Event::Empty(widened))?;
                }
                Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                    self.prefix = prefix_of(&e);
                    self.in_sheet_data = true;
                    self.write(Event::Start(e))?;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                    self.prefix = prefix_of(&e);
                    self.write(Event::Start(e))?;
                    self.flush_rows_before(None)?;
                    self.write(Event::End(BytesEnd::new(self.name("sheetData"))))?;
                }
                Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                    self.flush_rows_before(None)?;
                    self.in_sheet_data = false;
                    self.write(Event::End(e))?;
                }
                Event::Start(e) if self.in_sheet_data && e.local_name().as_ref() == b"row" => {
                    self.enter_row(&e)?;
                    match self.pending.remove(&self.row) {
                        Some(cells) => {
                            self.row_cells = Some(cells);
                            self.write(Event::Start(without_spans(&e)?))?;
                        }
                        None => {
                            self.row_cells = None;
                            self.write(Event::Start(e))?;
                        }
                    }
                }
                Event::Empty(e) if self.in_sheet_data && e.local_name().as_ref() == b"row" => {
                    self.enter_row(&e)?;
                    match self.pending.remove(&self.row) {
                        Some(cells) => {
                            self.write(Event::Start(without_spans(&e)?))?;
                            self.write_cells(self.row, cells)?;
                            self.write(Event::End(BytesEnd::new(self.name("row"))))?;
                        }
                        None => self.write(Event::Empty(e))?,
                    }
                }
                Event::End(e) if self.in_sheet_data && e.local_name().as_ref() == b"row" => {
                    self.flush_cells_before(None)?;
                    self.row_cells = None;
                    self.write(Event::End(e))?;
                }
                Event::Start(e) if self.row_cells.is_some() && e.local_name().as_ref() == b"c" => {
                    if let Some((col, value, style)) = self.claim_cell(&e)? {
                        self.skip_cell()?;
                        self.write_cell(self.row, col, style.as_deref(), &value)?;
                    } else {
                        self.write(Event::Start(e))?;
                    }
                }
                Event::Empty(e) if self.row_cells.is_some() && e.local_name().as_ref() == b"c" => {
                    if let Some((col, value, style)) = self.claim_cell(&e)? {
                        self.write_cell(self.row, col, style.as_deref(), &value)?;
                    } else {
                        self.write(Event::Empty(e))?;
                    }
                }
                // Dependents of a replaced shared formula keep their cached value only.
                Event::Empty(e) if self.in_sheet_data && e.local_name().as_ref() == b"f" => {
                    if !self.orphaned_formula(&e)? {
                        self.write(Event::Empty(e))?;
                    }
                }
                Event::Start(e) if self.in_sheet_data && e.local_name().as_ref() == b"f" => {
                    if self.orphaned_formula(&e)? {
                        self.skip_formula()?;
                    } else {
                        self.write(Event::Start(e))?;
                    }
                }
                event => self.write(event)?,
            }
        }

        let xml = String::from_utf8(self.writer.into_inner().into_inner())
            .map_err(|e| ReportError::Xml(e.to_string()))?;
        Ok(SheetRewrite {
            xml,
            formulas_overwritten: self.formulas_overwritten,
        })
    }

    fn name(&self, local: &str) -> String {
        format!("{}{}", self.prefix, local)
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), ReportError> {
        self.writer
            .write_event(event)
            .map_err(|e| ReportError::Xml(e.to_string()))
    }

    /// Track the row number (explicit or implied) and emit any new rows
    /// that belong before it.
    fn enter_row(&mut self, e: &BytesStart) -> Result<(), ReportError> {
        let row = match attribute(e, b"r")? {
            Some(r) => r
                .trim()
                .parse()
                .map_err(|_| ReportError::MalformedTemplate(format!("invalid row number '{}'", r)))?,
            None => self.row + 1,
        };
        self.flush_rows_before(Some(row))?;
        self.row = row;
        self.col = 0;
        Ok(())
    }

    /// Decide whether the cell at `e` is overwritten. Cells that belong
    /// before it are written first. Returns the column, new value and the
    /// cell's style index.
    fn claim_cell(
        &mut self,
        e: &BytesStart,
    ) -> Result<Option<(u32, String, Option<String>)>, ReportError> {
        let col = match attribute(e, b"r")? {
            Some(r) => r
                .parse::<CellRef>()
                .map_err(ReportError::MalformedTemplate)?
                .col,
            None => self.col + 1,
        };
        self.col = col;
        self.flush_cells_before(Some(col))?;

        let value = self.row_cells.as_mut().and_then(|cells| cells.remove(&col));
        match value {
            Some(value) => Ok(Some((col, value, attribute(e, b"s")?))),
            None => Ok(None),
        }
    }

    /// Consume the content of a replaced `<c>` element.
    fn skip_cell(&mut self) -> Result<(), ReportError> {
        loop {
            match self.reader.read_event()? {
                Event::End(e) if e.local_name().as_ref() == b"c" => return Ok(()),
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                    self.formulas_overwritten = true;
                    let shared = attribute(&e, b"t")?.as_deref() == Some("shared");
                    if shared && attribute(&e, b"ref")?.is_some() {
                        if let Some(si) = attribute(&e, b"si")? {
                            self.orphaned_shared.insert(si);
                        }
                    }
                }
                Event::Eof => {
                    return Err(ReportError::Xml("unexpected end of worksheet".to_string()))
                }
                _ => {}
            }
        }
    }

    /// Whether `e` is a dependent `<f>` whose shared master was replaced.
    fn orphaned_formula(&self, e: &BytesStart) -> Result<bool, ReportError> {
        if self.orphaned_shared.is_empty()
            || attribute(e, b"t")?.as_deref() != Some("shared")
            || attribute(e, b"ref")?.is_some()
        {
            return Ok(false);
        }
        Ok(attribute(e, b"si")?
            .map(|si| self.orphaned_shared.contains(&si))
            .unwrap_or(false))
    }

    /// Consume the rest of a dropped `<f>` element.
    fn skip_formula(&mut self) -> Result<(), ReportError> {
        loop {
            match self.reader.read_event()? {
                Event::End(e) if e.local_name().as_ref() == b"f" => return Ok(()),
                Event::Eof => {
                    return Err(ReportError::Xml("unexpected end of worksheet".to_string()))
                }
                _ => {}
            }
        }
    }

    /// Write the pending rows numbered below `limit` (all when `None`).
    fn flush_rows_before(&mut self, limit: Option<u32>) -> Result<(), ReportError> {
        let ready = match limit {
            Some(limit) => {
                let rest = self.pending.split_off(&limit);
                mem::replace(&mut self.pending, rest)
            }
            None => mem::take(&mut self.pending),
        };

        for (row, cells) in ready {
            let mut start = BytesStart::new(self.name("row"));
            start.push_attribute(("r", row.to_string().as_str()));
            self.write(Event::Start(start))?;
            self.write_cells(row, cells)?;
            self.write(Event::End(BytesEnd::new(self.name("row"))))?;
        }
        Ok(())
    }

    /// Write the current row's pending cells left of `limit` (all when `None`).
    fn flush_cells_before(&mut self, limit: Option<u32>) -> Result<(), ReportError> {
        let Some(cells) = self.row_cells.as_mut() else {
            return Ok(());
        };
        let ready = match limit {
            Some(limit) => {
                let rest = cells.split_off(&limit);
                mem::replace(cells, rest)
            }
            None => mem::take(cells),
        };
        self.write_cells(self.row, ready)
    }

    fn write_cells(&mut self, row: u32, cells: BTreeMap<u32, String>) -> Result<(), ReportError> {
        for (col, value) in cells {
            self.write_cell(row, col, None, &value)?;
        }
        Ok(())
    }

    fn write_cell(
        &mut self,
        row: u32,
        col: u32,
        style: Option<&str>,
        value: &str,
    ) -> Result<(), ReportError> {
        let address = CellRef::new(col, row).address();
        let mut cell = BytesStart::new(self.name("c"));
        cell.push_attribute(("r", address.as_str()));
        if let Some(style) = style {
            cell.push_attribute(("s", style));
        }
        cell.push_attribute(("t", "inlineStr"));

        let mut text = BytesStart::new(self.name("t"));
        text.push_attribute(("xml:space", "preserve"));

        self.write(Event::Start(cell))?;
        self.write(Event::Start(BytesStart::new(self.name("is"))))?;
        self.write(Event::Start(text))?;
        self.write(Event::Text(BytesText::from_escaped(escape_xml_text(value))))?;
        self.write(Event::End(BytesEnd::new(self.name("t"))))?;
        self.write(Event::End(BytesEnd::new(self.name("is"))))?;
        self.write(Event::End(BytesEnd::new(self.name("c"))))
    }
}

fn prefix_of(e: &BytesStart) -> String {
    e.name()
        .prefix()
        .map(|prefix| format!("{}:", String::from_utf8_lossy(prefix.as_ref())))
        .unwrap_or_default()
}

/// Copy of a `<row>` start tag without its `spans` hint, which would be
/// stale once cells are added.
fn without_spans(e: &BytesStart) -> Result<BytesStart<'static>, ReportError> {
    let mut row = e.to_owned();
    row.clear_attributes();
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != b"spans" {
            row.push_attribute(attr);
        }
    }
    Ok(row)
}

/// `<dimension ref>` widened to cover every written cell.
fn widened_dimension(e: &BytesStart, writes: &RowWrites) -> Result<BytesStart<'static>, ReportError> {
    let Some(reference) = attribute(e, b"ref")? else {
        return Ok(e.to_owned());
    };
    let mut corners = reference.split(':').map(str::parse::<CellRef>);
    let (first, last) = match (corners.next(), corners.next()) {
        (Some(Ok(first)), Some(Ok(last))) => (first, last),
        (Some(Ok(first)), None) => (first, first),
        _ => return Ok(e.to_owned()),
    };

    let (mut min_row, mut min_col) = (first.row.min(last.row), first.col.min(last.col));
    let (mut max_row, mut max_col) = (first.row.max(last.row), first.col.max(last.col));
    for (row, cells) in writes {
        for col in cells.keys() {
            min_row = min_row.min(*row);
            max_row = max_row.max(*row);
            min_col = min_col.min(*col);
            max_col = max_col.max(*col);
        }
    }

    let top_left = CellRef::new(min_col, min_row);
    let bottom_right = CellRef::new(max_col, max_row);
    let widened = if top_left == bottom_right {
        top_left.address()
    } else {
        format!("{}:{}", top_left, bottom_right)
    };

    let mut dimension = e.to_owned();
    dimension.clear_attributes();
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"ref" {
            dimension.push_attribute(("ref", widened.as_str()));
        } else {
            dimension.push_attribute(attr);
        }
    }
    Ok(dimension)
}
