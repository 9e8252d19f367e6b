//! Package assembly: drives the style and string pools across all sheets,
//! renders every XML part with consistent cross-references, and packs the
//! finished file tree into one archive
//!
//! The four phases are strictly ordered. Metadata for every sheet is
//! collected before any content renders (the workbook part enumerates all
//! sheets), all sheet content renders before any global part (the style and
//! shared-string parts reflect final pool state), and packaging runs last.

pub mod shared_strings;
pub mod styles;
pub mod xml;
pub mod zip;

use crate::error::{Result, XlsxError};
use crate::sheet::{SheetMeta, SheetSource};
use crate::types::StyleSpec;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use self::shared_strings::SharedStringPool;
use self::styles::StyleResolver;
use self::xml::XmlWriter;
use self::zip::{PackageStats, ZipContainerWriter, ZipEntry};

/// Advisory notification stream observed during generation
///
/// Purely informational: ignoring every event never changes the produced
/// archive, and no event feeds back into generation.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    /// Phase 1: a sheet's data source ran and its metadata was extracted
    SheetLoaded { name: &'a str, rows: u32 },
    /// Phase 2: a worksheet part rendered and validated
    SheetRendered { name: &'a str, bytes: usize },
    /// Phase 3: a global part rendered
    PartRendered { path: &'a str },
    /// Phase 4: the archive is complete
    Finished { stats: PackageStats },
}

pub(crate) type ProgressCallback = dyn Fn(&ProgressEvent<'_>) + Send;

/// Document properties recorded in `docProps/`
pub(crate) struct DocProperties {
    pub title: Option<String>,
    pub author: String,
    pub created: DateTime<Utc>,
}

/// Runs the four-phase protocol over a set of sheet collaborators
///
/// Constructed fresh per generation call; the pools it owns are never
/// reused across runs.
pub(crate) struct PackageAssembler<'a> {
    sheets: &'a mut [Box<dyn SheetSource>],
    props: &'a DocProperties,
    default_style: Option<&'a StyleSpec>,
    compression: u32,
    progress: Option<&'a ProgressCallback>,
}

impl<'a> PackageAssembler<'a> {
    pub fn new(
        sheets: &'a mut [Box<dyn SheetSource>],
        props: &'a DocProperties,
        default_style: Option<&'a StyleSpec>,
        compression: u32,
        progress: Option<&'a ProgressCallback>,
    ) -> Self {
        PackageAssembler {
            sheets,
            props,
            default_style,
            compression,
            progress,
        }
    }

    /// Produce the complete archive bytes, or the first error encountered
    pub fn assemble(&mut self) -> Result<(Vec<u8>, PackageStats)> {
        let metas = self.collect_metadata()?;

        let mut styles = StyleResolver::new();
        let mut strings = SharedStringPool::new();
        let sheet_parts = self.render_sheets(&metas, &mut styles, &mut strings)?;

        let parts = self.render_globals(&metas, &styles, &strings, sheet_parts)?;

        self.package(parts)
    }

    /// Phase 1: run every sheet's data load exactly once and extract metadata
    fn collect_metadata(&mut self) -> Result<Vec<SheetMeta>> {
        let mut metas = Vec::with_capacity(self.sheets.len());
        for (index, sheet) in self.sheets.iter_mut().enumerate() {
            sheet.load()?;
            let id = index as u32 + 1;
            let meta = SheetMeta {
                id,
                name: sheet.name().to_string(),
                rel_id: format!("rId{id}"),
                path: format!("xl/worksheets/sheet{id}.xml"),
                has_header: sheet.has_header(),
                rows: sheet.row_count(),
                used_range: sheet.used_range(),
            };
            log::debug!("sheet {} '{}': {} rows", meta.id, meta.name, meta.rows);
            // Inlined `self.emit` to avoid borrowing all of `*self` while
            // `self.sheets` is mutably borrowed by the loop; `self.progress`
            // is a disjoint field.
            if let Some(callback) = self.progress {
                callback(&ProgressEvent::SheetLoaded {
                    name: &meta.name,
                    rows: meta.rows,
                });
            }
            metas.push(meta);
        }
        Ok(metas)
    }

    /// Phase 2: render every worksheet part against the shared pools
    fn render_sheets(
        &self,
        metas: &[SheetMeta],
        styles: &mut StyleResolver,
        strings: &mut SharedStringPool,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        let mut parts = Vec::with_capacity(metas.len());
        for (sheet, meta) in self.sheets.iter().zip(metas) {
            let rendered = sheet.render(styles, strings, self.default_style)?;
            validate_worksheet(&meta.path, &rendered, meta.rows)?;
            log::debug!("rendered {} ({} bytes)", meta.path, rendered.len());
            self.emit(ProgressEvent::SheetRendered {
                name: &meta.name,
                bytes: rendered.len(),
            });
            parts.push((meta.path.clone(), rendered));
        }
        Ok(parts)
    }

    /// Phase 3: render the global parts from final pool state and arrange
    /// the complete file tree in canonical order
    fn render_globals(
        &self,
        metas: &[SheetMeta],
        styles: &StyleResolver,
        strings: &SharedStringPool,
        sheet_parts: Vec<(String, Vec<u8>)>,
    ) -> Result<IndexMap<String, Vec<u8>>> {
        let mut parts = IndexMap::new();
        self.add_part(&mut parts, "[Content_Types].xml", content_types(metas)?)?;
        self.add_part(&mut parts, "_rels/.rels", ROOT_RELS.as_bytes().to_vec())?;
        self.add_part(&mut parts, "xl/workbook.xml", workbook_xml(metas)?)?;
        self.add_part(&mut parts, "xl/_rels/workbook.xml.rels", workbook_rels(metas)?)?;
        self.add_part(&mut parts, "xl/styles.xml", styles.styles_xml()?)?;
        self.add_part(&mut parts, "xl/sharedStrings.xml", strings.to_xml()?)?;
        self.add_part(&mut parts, "xl/theme/theme1.xml", THEME_XML.as_bytes().to_vec())?;
        for (path, bytes) in sheet_parts {
            parts.insert(path, bytes);
        }
        self.add_part(&mut parts, "docProps/core.xml", core_props(self.props)?)?;
        self.add_part(&mut parts, "docProps/app.xml", app_props(metas)?)?;
        Ok(parts)
    }

    /// Phase 4: hand the file tree to the container writer
    fn package(&self, parts: IndexMap<String, Vec<u8>>) -> Result<(Vec<u8>, PackageStats)> {
        let modified = self.props.created.naive_utc();
        let entries: Vec<ZipEntry> = parts
            .into_iter()
            .map(|(path, data)| ZipEntry::new(path, data, modified))
            .collect();

        let writer = ZipContainerWriter::new(self.compression);
        let (bytes, stats) = writer.archive(&entries)?;
        log::debug!(
            "packaged {} parts: {} -> {} bytes ({} deflated, {} stored)",
            stats.entries,
            stats.bytes_in,
            stats.bytes_out,
            stats.deflated,
            stats.stored
        );
        self.emit(ProgressEvent::Finished { stats });
        Ok((bytes, stats))
    }

    fn add_part(
        &self,
        parts: &mut IndexMap<String, Vec<u8>>,
        path: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        if bytes.is_empty() {
            return Err(XlsxError::XmlGeneration {
                part: path.to_string(),
            });
        }
        self.emit(ProgressEvent::PartRendered { path });
        parts.insert(path.to_string(), bytes);
        Ok(())
    }

    fn emit(&self, event: ProgressEvent<'_>) {
        if let Some(callback) = self.progress {
            callback(&event);
        }
    }
}

/// Structural spot-check on a rendered worksheet part; catches programmer
/// error early, not a schema validation
fn validate_worksheet(path: &str, rendered: &[u8], rows: u32) -> Result<()> {
    if rendered.is_empty() {
        return Err(XlsxError::XmlGeneration {
            part: path.to_string(),
        });
    }
    let text = std::str::from_utf8(rendered).map_err(|_| XlsxError::Encoding {
        part: path.to_string(),
    })?;

    let mut missing = None;
    for marker in ["<?xml", "<worksheet", "<sheetData", "</worksheet>"] {
        if !text.contains(marker) {
            missing = Some(marker);
            break;
        }
    }
    if missing.is_none() && rows > 0 && !text.contains("<row ") {
        missing = Some("<row>");
    }
    match missing {
        Some(marker) => Err(XlsxError::XmlValidation {
            part: path.to_string(),
            reason: format!("missing {marker}"),
        }),
        None => Ok(()),
    }
}

fn content_types(metas: &[SheetMeta]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(1024);
    let mut w = XmlWriter::new(&mut output);
    w.declaration()?;
    w.write_raw(
        b"<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
          <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
          <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
          <Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
    )?;
    for meta in metas {
        w.start_element("Override")?;
        w.attribute("PartName", &format!("/{}", meta.path))?;
        w.attribute(
            "ContentType",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
        )?;
        w.close_empty()?;
    }
    w.write_raw(
        b"<Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>\
          <Override PartName=\"/xl/sharedStrings.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml\"/>\
          <Override PartName=\"/xl/theme/theme1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.theme+xml\"/>\
          <Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>\
          <Override PartName=\"/docProps/app.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.extended-properties+xml\"/>\
          </Types>",
    )?;
    w.flush()?;
    Ok(output)
}

fn workbook_xml(metas: &[SheetMeta]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(512);
    let mut w = XmlWriter::new(&mut output);
    w.declaration()?;
    w.write_raw(
        b"<workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
          xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
          <sheets>",
    )?;
    for meta in metas {
        w.start_element("sheet")?;
        w.attribute("name", &meta.name)?;
        w.attribute_int("sheetId", meta.id as i64)?;
        w.attribute("r:id", &meta.rel_id)?;
        w.close_empty()?;
    }
    w.write_raw(b"</sheets></workbook>")?;
    w.flush()?;
    Ok(output)
}

fn workbook_rels(metas: &[SheetMeta]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(512);
    let mut w = XmlWriter::new(&mut output);
    w.declaration()?;
    w.write_raw(
        b"<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    )?;
    for meta in metas {
        w.start_element("Relationship")?;
        w.attribute("Id", &meta.rel_id)?;
        w.attribute(
            "Type",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet",
        )?;
        w.attribute("Target", &format!("worksheets/sheet{}.xml", meta.id))?;
        w.close_empty()?;
    }
    let count = metas.len() as u32;
    let fixed = [
        (
            count + 1,
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles",
            "styles.xml",
        ),
        (
            count + 2,
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings",
            "sharedStrings.xml",
        ),
        (
            count + 3,
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme",
            "theme/theme1.xml",
        ),
    ];
    for (id, rel_type, target) in fixed {
        w.start_element("Relationship")?;
        w.attribute("Id", &format!("rId{id}"))?;
        w.attribute("Type", rel_type)?;
        w.attribute("Target", target)?;
        w.close_empty()?;
    }
    w.write_raw(b"</Relationships>")?;
    w.flush()?;
    Ok(output)
}

fn core_props(props: &DocProperties) -> Result<Vec<u8>> {
    let stamp = props.created.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let mut output = Vec::with_capacity(512);
    let mut w = XmlWriter::new(&mut output);
    w.declaration()?;
    w.write_raw(
        b"<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
          xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" \
          xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">",
    )?;
    if let Some(title) = &props.title {
        w.text_element("dc:title", title)?;
    }
    w.text_element("dc:creator", &props.author)?;
    w.text_element("cp:lastModifiedBy", &props.author)?;
    for element in ["dcterms:created", "dcterms:modified"] {
        w.start_element(element)?;
        w.attribute("xsi:type", "dcterms:W3CDTF")?;
        w.close_start_tag()?;
        w.write_str(&stamp)?;
        w.end_element(element)?;
    }
    w.write_raw(b"</cp:coreProperties>")?;
    w.flush()?;
    Ok(output)
}

fn app_props(metas: &[SheetMeta]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(512);
    let mut w = XmlWriter::new(&mut output);
    w.declaration()?;
    w.write_raw(
        b"<Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/extended-properties\" \
          xmlns:vt=\"http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes\">\
          <Application>sheetpack</Application><DocSecurity>0</DocSecurity><ScaleCrop>false</ScaleCrop>\
          <HeadingPairs><vt:vector size=\"2\" baseType=\"variant\">\
          <vt:variant><vt:lpstr>Worksheets</vt:lpstr></vt:variant>",
    )?;
    w.write_raw(b"<vt:variant><vt:i4>")?;
    w.write_str(&metas.len().to_string())?;
    w.write_raw(b"</vt:i4></vt:variant></vt:vector></HeadingPairs><TitlesOfParts>")?;
    w.start_element("vt:vector")?;
    w.attribute_int("size", metas.len() as i64)?;
    w.attribute("baseType", "lpstr")?;
    w.close_start_tag()?;
    for meta in metas {
        w.text_element("vt:lpstr", &meta.name)?;
    }
    w.write_raw(
        b"</vt:vector></TitlesOfParts><LinksUpToDate>false</LinksUpToDate>\
          <SharedDoc>false</SharedDoc><HyperlinksChanged>false</HyperlinksChanged>\
          <AppVersion>1.0</AppVersion></Properties>",
    )?;
    w.flush()?;
    Ok(output)
}

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#;

/// Static default theme; callers never customize it
const THEME_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme">
<a:themeElements>
<a:clrScheme name="Office">
<a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1>
<a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1>
<a:dk2><a:srgbClr val="44546A"/></a:dk2>
<a:lt2><a:srgbClr val="E7E6E6"/></a:lt2>
<a:accent1><a:srgbClr val="4472C4"/></a:accent1>
<a:accent2><a:srgbClr val="ED7D31"/></a:accent2>
<a:accent3><a:srgbClr val="A5A5A5"/></a:accent3>
<a:accent4><a:srgbClr val="FFC000"/></a:accent4>
<a:accent5><a:srgbClr val="5B9BD5"/></a:accent5>
<a:accent6><a:srgbClr val="70AD47"/></a:accent6>
<a:hlink><a:srgbClr val="0563C1"/></a:hlink>
<a:folHlink><a:srgbClr val="954F72"/></a:folHlink>
</a:clrScheme>
<a:fontScheme name="Office">
<a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont>
<a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont>
</a:fontScheme>
<a:fmtScheme name="Office">
<a:fillStyleLst>
<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>
<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>
<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>
</a:fillStyleLst>
<a:lnStyleLst>
<a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>
<a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>
<a:ln w="19050"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>
</a:lnStyleLst>
<a:effectStyleLst>
<a:effectStyle><a:effectLst/></a:effectStyle>
<a:effectStyle><a:effectLst/></a:effectStyle>
<a:effectStyle><a:effectLst/></a:effectStyle>
</a:effectStyleLst>
<a:bgFillStyleLst>
<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>
<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>
<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>
</a:bgFillStyleLst>
</a:fmtScheme>
</a:themeElements>
<a:objectDefaults/>
<a:extraClrSchemeLst/>
</a:theme>"#;
