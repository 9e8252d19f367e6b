//! Sheet collaborator: owns columns and a lazy data source, produces cell
//! records and the rendered worksheet part

use crate::column::Column;
use crate::error::{Result, XlsxError};
use crate::package::shared_strings::SharedStringPool;
use crate::package::styles::StyleResolver;
use crate::package::xml::push_escaped;
use crate::types::{CellValue, NumberHint, StyleSpec};

/// Worksheet name limit imposed by the format
const MAX_SHEET_NAME_LEN: usize = 31;

/// Metadata extracted from every sheet before any content is rendered
#[derive(Debug, Clone)]
pub struct SheetMeta {
    /// 1-based position, doubles as the sheet id
    pub id: u32,
    pub name: String,
    /// Relationship id linking the workbook part to the worksheet part
    pub rel_id: String,
    /// Part path inside the archive
    pub path: String,
    pub has_header: bool,
    /// Total row count including the header row
    pub rows: u32,
    /// Computed used range, `A1` when the sheet is empty
    pub used_range: String,
}

/// One cell produced by a sheet: position, value, merged style, and whether
/// a string value routes through the shared-string table
pub(crate) struct CellRecord {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
    pub style: Option<StyleSpec>,
    pub shared: bool,
}

/// The contract the package assembler depends on
///
/// `load` is invoked exactly once per generation run, for every sheet,
/// before any sheet is rendered. `render` receives the run's single style
/// resolver and shared-string pool so ids stay consistent workbook-wide.
pub trait SheetSource {
    fn name(&self) -> &str;
    fn has_header(&self) -> bool;
    /// Trigger the lazy data load; a sheet without a data source is an error
    fn load(&mut self) -> Result<()>;
    /// Total rows including the header; valid after `load`
    fn row_count(&self) -> u32;
    /// Used range such as `A1:C11`; valid after `load`
    fn used_range(&self) -> String;
    /// Render the worksheet XML part; valid after `load`
    fn render(
        &self,
        styles: &mut StyleResolver,
        strings: &mut SharedStringPool,
        book_style: Option<&StyleSpec>,
    ) -> Result<Vec<u8>>;
}

type RowProvider<T> = Box<dyn FnOnce() -> Vec<T> + Send>;

/// A typed sheet over a sequence of source objects
pub struct Sheet<T> {
    name: String,
    columns: Vec<Column<T>>,
    provider: Option<RowProvider<T>>,
    rows: Option<Vec<T>>,
    header: bool,
    style: Option<StyleSpec>,
    header_style: Option<StyleSpec>,
}

impl<T> Sheet<T> {
    /// Create a sheet; the name is sanitized to the format's rules here so
    /// downstream consumers always see a valid name
    pub fn new(name: &str) -> Self {
        Sheet {
            name: sanitize_sheet_name(name),
            columns: Vec::new(),
            provider: None,
            rows: None,
            header: true,
            style: None,
            header_style: Some(StyleSpec {
                font: Some(crate::types::FontSpec::bold()),
                ..StyleSpec::default()
            }),
        }
    }

    pub fn column(mut self, column: Column<T>) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: Vec<Column<T>>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Supply the object sequence directly
    pub fn with_rows(self, rows: Vec<T>) -> Self
    where
        T: Send + 'static,
    {
        self.with_source(move || rows)
    }

    /// Supply a lazily-invoked data source; it runs exactly once, during
    /// metadata collection
    pub fn with_source<F>(mut self, provider: F) -> Self
    where
        F: FnOnce() -> Vec<T> + Send + 'static,
    {
        self.provider = Some(Box::new(provider));
        self
    }

    /// Skip the header row
    pub fn without_header(mut self) -> Self {
        self.header = false;
        self
    }

    /// Sheet-level default style, below column and cell styles in the cascade
    pub fn with_style(mut self, style: StyleSpec) -> Self {
        self.style = Some(style);
        self
    }

    /// Style for the header row; defaults to a bold font
    pub fn with_header_style(mut self, style: StyleSpec) -> Self {
        self.header_style = Some(style);
        self
    }

    fn included_columns(&self) -> impl Iterator<Item = &Column<T>> {
        self.columns.iter().filter(|c| c.included)
    }

    /// Ordered cell records for the whole sheet, styles already merged
    /// through the cell < column < sheet < workbook cascade
    fn cell_records(&self, book_style: Option<&StyleSpec>) -> Result<Vec<CellRecord>> {
        let rows = self.rows.as_ref().ok_or_else(|| XlsxError::MissingDataSource {
            sheet: self.name.clone(),
        })?;

        let columns: Vec<&Column<T>> = self.included_columns().collect();
        let mut records = Vec::with_capacity((rows.len() + 1) * columns.len());
        let mut row_index = 0u32;

        if self.header {
            row_index += 1;
            for (col_index, column) in columns.iter().enumerate() {
                records.push(CellRecord {
                    row: row_index,
                    col: col_index as u32 + 1,
                    value: CellValue::String(column.header.clone()),
                    style: StyleSpec::cascade(&[
                        self.header_style.as_ref(),
                        self.style.as_ref(),
                        book_style,
                    ]),
                    shared: true,
                });
            }
        }

        for object in rows {
            row_index += 1;
            for (col_index, column) in columns.iter().enumerate() {
                let value = (column.accessor)(object);
                let cell_style = column
                    .cell_style
                    .as_ref()
                    .and_then(|styler| styler(object));
                let mut style = StyleSpec::cascade(&[
                    cell_style.as_ref(),
                    column.style.as_ref(),
                    self.style.as_ref(),
                    book_style,
                ]);
                // A number format alone still needs a cell-format entry
                if style.is_none() && effective_hint(column.hint, &value) != NumberHint::General {
                    style = Some(StyleSpec::default());
                }
                let shared = column.shared && matches!(value, CellValue::String(_));
                records.push(CellRecord {
                    row: row_index,
                    col: col_index as u32 + 1,
                    value,
                    style,
                    shared,
                });
            }
        }

        Ok(records)
    }

    fn serialize_cell(
        &self,
        buffer: &mut Vec<u8>,
        record: &CellRecord,
        style_id: Option<u32>,
    ) -> Result<()> {
        let mut num = itoa::Buffer::new();

        if record.value.is_empty() && style_id.is_none() {
            return Ok(());
        }

        buffer.extend_from_slice(b"<c r=\"");
        push_column_letter(buffer, record.col);
        buffer.extend_from_slice(num.format(record.row).as_bytes());
        buffer.push(b'"');
        if let Some(id) = style_id.filter(|&id| id > 0) {
            buffer.extend_from_slice(b" s=\"");
            buffer.extend_from_slice(num.format(id).as_bytes());
            buffer.push(b'"');
        }

        match &record.value {
            CellValue::Empty => buffer.extend_from_slice(b"/>"),
            // Shared strings are serialized by the caller; anything that
            // reaches here is emitted inline
            CellValue::String(s) => {
                buffer.extend_from_slice(b" t=\"inlineStr\"><is><t>");
                push_escaped(buffer, s);
                buffer.extend_from_slice(b"</t></is></c>");
            }
            CellValue::Int(i) => {
                buffer.extend_from_slice(b" t=\"n\"><v>");
                buffer.extend_from_slice(num.format(*i).as_bytes());
                buffer.extend_from_slice(b"</v></c>");
            }
            CellValue::Float(f) => {
                buffer.extend_from_slice(b" t=\"n\"><v>");
                buffer.extend_from_slice(f.to_string().as_bytes());
                buffer.extend_from_slice(b"</v></c>");
            }
            CellValue::Bool(b) => {
                buffer.extend_from_slice(b" t=\"b\"><v>");
                buffer.extend_from_slice(if *b { b"1" } else { b"0" });
                buffer.extend_from_slice(b"</v></c>");
            }
            CellValue::DateTime(serial) => {
                buffer.extend_from_slice(b" t=\"n\"><v>");
                buffer.extend_from_slice(serial.to_string().as_bytes());
                buffer.extend_from_slice(b"</v></c>");
            }
            CellValue::Formula(formula) => {
                buffer.extend_from_slice(b"><f>");
                push_escaped(buffer, formula.strip_prefix('=').unwrap_or(formula));
                buffer.extend_from_slice(b"</f></c>");
            }
            CellValue::Error(e) => {
                buffer.extend_from_slice(b" t=\"e\"><v>");
                push_escaped(buffer, e);
                buffer.extend_from_slice(b"</v></c>");
            }
        }
        Ok(())
    }
}

impl<T> SheetSource for Sheet<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_header(&self) -> bool {
        self.header
    }

    fn load(&mut self) -> Result<()> {
        if self.rows.is_some() {
            return Ok(());
        }
        let provider = self
            .provider
            .take()
            .ok_or_else(|| XlsxError::MissingDataSource {
                sheet: self.name.clone(),
            })?;
        self.rows = Some(provider());
        Ok(())
    }

    fn row_count(&self) -> u32 {
        let data = self.rows.as_ref().map(|r| r.len() as u32).unwrap_or(0);
        let header = u32::from(self.header && self.included_columns().count() > 0);
        data + header
    }

    fn used_range(&self) -> String {
        let rows = self.row_count();
        let cols = self.included_columns().count() as u32;
        if rows == 0 || cols == 0 {
            return "A1".to_string();
        }
        let mut range = String::from("A1:");
        let mut buffer = Vec::new();
        push_column_letter(&mut buffer, cols);
        range.push_str(std::str::from_utf8(&buffer).unwrap_or("A"));
        range.push_str(&rows.to_string());
        range
    }

    fn render(
        &self,
        styles: &mut StyleResolver,
        strings: &mut SharedStringPool,
        book_style: Option<&StyleSpec>,
    ) -> Result<Vec<u8>> {
        let records = self.cell_records(book_style)?;
        let columns: Vec<&Column<T>> = self.included_columns().collect();
        let mut buffer = Vec::with_capacity(512 + records.len() * 32);
        let mut num = itoa::Buffer::new();

        buffer.extend_from_slice(
            b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
              <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
              xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
        );
        buffer.extend_from_slice(b"<dimension ref=\"");
        buffer.extend_from_slice(self.used_range().as_bytes());
        buffer.extend_from_slice(b"\"/>");

        if columns.iter().any(|c| c.width.is_some()) {
            buffer.extend_from_slice(b"<cols>");
            for (index, column) in columns.iter().enumerate() {
                if let Some(width) = column.width {
                    let position = num.format(index as u64 + 1).as_bytes().to_vec();
                    buffer.extend_from_slice(b"<col min=\"");
                    buffer.extend_from_slice(&position);
                    buffer.extend_from_slice(b"\" max=\"");
                    buffer.extend_from_slice(&position);
                    buffer.extend_from_slice(b"\" width=\"");
                    buffer.extend_from_slice(width.to_string().as_bytes());
                    buffer.extend_from_slice(b"\" customWidth=\"1\"/>");
                }
            }
            buffer.extend_from_slice(b"</cols>");
        }

        buffer.extend_from_slice(b"<sheetData>");
        let mut current_row = 0u32;
        for record in &records {
            if record.row != current_row {
                if current_row != 0 {
                    buffer.extend_from_slice(b"</row>");
                }
                current_row = record.row;
                buffer.extend_from_slice(b"<row r=\"");
                buffer.extend_from_slice(num.format(current_row).as_bytes());
                buffer.extend_from_slice(b"\">");
            }

            let hint = if record.row == 1 && self.header {
                NumberHint::General
            } else {
                let column = &columns[record.col as usize - 1];
                effective_hint(column.hint, &record.value)
            };
            let style_id = styles.register(record.style.as_ref(), hint);

            if record.shared {
                if let CellValue::String(s) = &record.value {
                    let index = strings.intern(s);
                    buffer.extend_from_slice(b"<c r=\"");
                    push_column_letter(&mut buffer, record.col);
                    buffer.extend_from_slice(num.format(record.row).as_bytes());
                    buffer.push(b'"');
                    if let Some(id) = style_id.filter(|&id| id > 0) {
                        buffer.extend_from_slice(b" s=\"");
                        buffer.extend_from_slice(num.format(id).as_bytes());
                        buffer.push(b'"');
                    }
                    buffer.extend_from_slice(b" t=\"s\"><v>");
                    buffer.extend_from_slice(num.format(index).as_bytes());
                    buffer.extend_from_slice(b"</v></c>");
                    continue;
                }
            }
            self.serialize_cell(&mut buffer, record, style_id)?;
        }
        if current_row != 0 {
            buffer.extend_from_slice(b"</row>");
        }
        buffer.extend_from_slice(b"</sheetData></worksheet>");

        Ok(buffer)
    }
}

/// Replace characters the format forbids in sheet names and clamp the
/// length; an empty result falls back to a placeholder
pub(crate) fn sanitize_sheet_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        name = name.chars().take(MAX_SHEET_NAME_LEN).collect();
    }
    if name.trim().is_empty() {
        name = "Sheet1".to_string();
    }
    name
}

/// Append the A..Z, AA..ZZ, ... letter run for a 1-based column number
pub(crate) fn push_column_letter(buffer: &mut Vec<u8>, mut n: u32) {
    let mut tmp = [0u8; 8];
    let mut len = 0;
    while n > 0 {
        tmp[len] = b'A' + ((n - 1) % 26) as u8;
        len += 1;
        n = (n - 1) / 26;
    }
    for i in (0..len).rev() {
        buffer.push(tmp[i]);
    }
}

/// Date-like values pick up the matching format even without an explicit hint
fn effective_hint(hint: NumberHint, value: &CellValue) -> NumberHint {
    match (hint, value) {
        (NumberHint::General, CellValue::DateTime(_)) => NumberHint::DateTime,
        _ => hint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, FillSpec};

    struct Person {
        name: &'static str,
        age: i64,
        ratio: f64,
    }

    fn people() -> Vec<Person> {
        vec![
            Person {
                name: "Alice",
                age: 30,
                ratio: 0.42,
            },
            Person {
                name: "Bob",
                age: 25,
                ratio: 0.9,
            },
        ]
    }

    fn person_sheet() -> Sheet<Person> {
        Sheet::new("People")
            .column(Column::new("Name", |p: &Person| p.name.into()))
            .column(Column::new("Age", |p: &Person| CellValue::Int(p.age)))
            .column(Column::new("Ratio", |p: &Person| CellValue::Float(p.ratio)).percent(1))
            .with_rows(people())
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("Q1 [Draft]/West"), "Q1 _Draft__West");
        assert_eq!(sanitize_sheet_name(""), "Sheet1");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).len(), 31);
        assert_eq!(sanitize_sheet_name("Plain"), "Plain");
    }

    #[test]
    fn test_column_letters() {
        let letter = |n| {
            let mut b = Vec::new();
            push_column_letter(&mut b, n);
            String::from_utf8(b).unwrap()
        };
        assert_eq!(letter(1), "A");
        assert_eq!(letter(26), "Z");
        assert_eq!(letter(27), "AA");
        assert_eq!(letter(702), "ZZ");
        assert_eq!(letter(703), "AAA");
    }

    #[test]
    fn test_used_range_includes_header() {
        let mut sheet = person_sheet();
        sheet.load().unwrap();
        assert_eq!(sheet.used_range(), "A1:C3");
        assert_eq!(sheet.row_count(), 3);
    }

    #[test]
    fn test_missing_data_source() {
        let mut sheet: Sheet<Person> =
            Sheet::new("Empty").column(Column::new("Name", |p: &Person| p.name.into()));
        let err = sheet.load().unwrap_err();
        assert!(matches!(err, XlsxError::MissingDataSource { sheet } if sheet == "Empty"));
    }

    #[test]
    fn test_load_is_idempotent() {
        let mut sheet = person_sheet();
        sheet.load().unwrap();
        sheet.load().unwrap();
        assert_eq!(sheet.row_count(), 3);
    }

    #[test]
    fn test_render_rows_and_shared_strings() {
        let mut sheet = person_sheet();
        sheet.load().unwrap();

        let mut styles = StyleResolver::new();
        let mut strings = SharedStringPool::new();
        let xml = sheet.render(&mut styles, &mut strings, None).unwrap();
        let xml = String::from_utf8(xml).unwrap();

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<dimension ref=\"A1:C3\"/>"));
        assert!(xml.contains("<row r=\"1\">"));
        assert!(xml.contains("<row r=\"3\">"));
        // Headers and names flow through the shared-string table
        assert_eq!(strings.len(), 5);
        assert!(xml.contains("t=\"s\""));
        // Bold default header style landed as a non-zero style id
        assert!(xml.contains(" s=\"1\""));
        // Percent column registered a resolved style with the custom format
        let styles_xml = String::from_utf8(styles.styles_xml().unwrap()).unwrap();
        assert!(styles_xml.contains("formatCode=\"0.0%\""));
    }

    #[test]
    fn test_excluded_column_contributes_nothing() {
        let mut sheet = Sheet::new("Partial")
            .column(Column::new("Keep", |p: &Person| p.name.into()))
            .column(Column::new("Drop", |p: &Person| CellValue::Int(p.age)).include_if(false))
            .with_rows(people());
        sheet.load().unwrap();
        assert_eq!(sheet.used_range(), "A1:A3");

        let mut styles = StyleResolver::new();
        let mut strings = SharedStringPool::new();
        let xml = String::from_utf8(sheet.render(&mut styles, &mut strings, None).unwrap()).unwrap();
        assert!(!xml.contains("Drop"));
        assert!(!xml.contains("t=\"n\""));
    }

    #[test]
    fn test_cell_value_variants_serialize() {
        struct Mixed;
        let mut sheet = Sheet::new("Mixed")
            .without_header()
            .column(Column::new("A", |_: &Mixed| CellValue::Bool(true)))
            .column(Column::new("B", |_: &Mixed| {
                CellValue::Formula("=SUM(A1:A2)".into())
            }))
            .column(Column::new("C", |_: &Mixed| CellValue::Error("#DIV/0!".into())))
            .column(Column::new("D", |_: &Mixed| CellValue::DateTime(45000.5)))
            .column(Column::new("E", |_: &Mixed| CellValue::String("inline".into())).inline_strings())
            .column(Column::new("F", |_: &Mixed| CellValue::Empty))
            .with_rows(vec![Mixed]);
        sheet.load().unwrap();

        let mut styles = StyleResolver::new();
        let mut strings = SharedStringPool::new();
        let xml = String::from_utf8(sheet.render(&mut styles, &mut strings, None).unwrap()).unwrap();

        assert!(xml.contains("t=\"b\"><v>1</v>"));
        assert!(xml.contains("<f>SUM(A1:A2)</f>"));
        assert!(xml.contains("t=\"e\"><v>#DIV/0!</v>"));
        assert!(xml.contains("<v>45000.5</v>"));
        assert!(xml.contains("t=\"inlineStr\"><is><t>inline</t></is>"));
        // Empty cell with no style is skipped entirely
        assert!(!xml.contains("r=\"F1\""));
        assert_eq!(strings.len(), 0);
    }

    #[test]
    fn test_sheet_style_cascades_into_cells() {
        let fill = FillSpec::Solid(Color(200, 200, 0));
        let mut sheet = Sheet::new("Styled")
            .without_header()
            .column(Column::new("N", |p: &Person| CellValue::Int(p.age)))
            .with_style(StyleSpec {
                fill: Some(fill),
                ..StyleSpec::default()
            })
            .with_rows(people());
        sheet.load().unwrap();

        let mut styles = StyleResolver::new();
        let mut strings = SharedStringPool::new();
        let xml = String::from_utf8(sheet.render(&mut styles, &mut strings, None).unwrap()).unwrap();
        assert!(xml.contains(" s=\"1\""));
        assert_eq!(styles.style_count(), 2);
    }

    #[test]
    fn test_column_widths_emit_cols_section() {
        let mut sheet = Sheet::new("Wide")
            .column(Column::new("Name", |p: &Person| p.name.into()).with_width(24.5))
            .with_rows(people());
        sheet.load().unwrap();

        let mut styles = StyleResolver::new();
        let mut strings = SharedStringPool::new();
        let xml = String::from_utf8(sheet.render(&mut styles, &mut strings, None).unwrap()).unwrap();
        assert!(xml.contains("<cols><col min=\"1\" max=\"1\" width=\"24.5\" customWidth=\"1\"/></cols>"));
    }
}
