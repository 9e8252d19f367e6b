//! Style resolution: component pools, resolved-style dedup, styles.xml

use super::xml::XmlWriter;
use crate::error::Result;
use crate::types::{AlignSpec, BorderLine, BorderSpec, FillSpec, FontSpec, NumberHint, StyleSpec};
use indexmap::{IndexMap, IndexSet};
use std::hash::Hash;

/// Built-in number-format ids used directly, never through the custom pool
const NUM_FMT_DATE: u32 = 14;
const NUM_FMT_DATE_TIME: u32 = 22;
/// First id available for custom number formats
const NUM_FMT_CUSTOM_BASE: u32 = 164;

/// Insertion-ordered deduplicating pool; structurally-equal values share a slot
struct Pool<T: Hash + Eq> {
    items: IndexSet<T>,
}

impl<T: Hash + Eq> Pool<T> {
    fn new() -> Self {
        Pool {
            items: IndexSet::new(),
        }
    }

    fn intern(&mut self, value: T) -> u32 {
        let (index, _) = self.items.insert_full(value);
        index as u32
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// One concrete combination of component indices; itself pooled, so two
/// cells built from equal descriptors share a single cell-format entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ResolvedStyle {
    font_id: u32,
    fill_id: u32,
    border_id: u32,
    align_id: Option<u32>,
    num_fmt_id: u32,
}

impl ResolvedStyle {
    const DEFAULT: ResolvedStyle = ResolvedStyle {
        font_id: 0,
        fill_id: 0,
        border_id: 0,
        align_id: None,
        num_fmt_id: 0,
    };
}

/// Deduplicates style descriptors into compact index-referenced pools and
/// renders `xl/styles.xml`
///
/// Scoped to one generation run. The constructor seeds the mandatory
/// defaults: font/border index 0, the `none` and `gray125` fills the format
/// requires at fill indices 0 and 1, and the default resolved style at
/// cell-format index 0.
pub struct StyleResolver {
    fonts: Pool<FontSpec>,
    fills: Pool<FillSpec>,
    borders: Pool<BorderSpec>,
    aligns: Pool<AlignSpec>,
    num_fmts: IndexMap<String, u32>,
    resolved: Pool<ResolvedStyle>,
}

impl StyleResolver {
    pub fn new() -> Self {
        let mut resolver = StyleResolver {
            fonts: Pool::new(),
            fills: Pool::new(),
            borders: Pool::new(),
            aligns: Pool::new(),
            num_fmts: IndexMap::new(),
            resolved: Pool::new(),
        };
        resolver.fonts.intern(FontSpec::default());
        resolver.fills.intern(FillSpec::None);
        resolver.fills.intern(FillSpec::Gray125);
        resolver.borders.intern(BorderSpec::default());
        resolver.resolved.intern(ResolvedStyle::DEFAULT);
        resolver
    }

    /// Resolve a merged style descriptor into a cell-format index
    ///
    /// Returns `None` when no descriptor is given: the cell inherits styling
    /// and contributes nothing here. Idempotent: structurally equal inputs
    /// always yield the same index, however often and in whatever order they
    /// are registered.
    pub fn register(&mut self, style: Option<&StyleSpec>, hint: NumberHint) -> Option<u32> {
        let style = style?;

        let font_id = match &style.font {
            Some(font) => self.fonts.intern(font.clone()),
            None => 0,
        };
        let fill_id = match style.fill {
            Some(fill) => self.fills.intern(fill),
            None => 0,
        };
        let border_id = match style.border {
            Some(border) => self.borders.intern(border),
            None => 0,
        };
        let align_id = style.align.map(|align| self.aligns.intern(align));
        let num_fmt_id = self.num_fmt_id(hint);

        let index = self.resolved.intern(ResolvedStyle {
            font_id,
            fill_id,
            border_id,
            align_id,
            num_fmt_id,
        });
        log::trace!(
            "resolved style -> xf {} ({} pooled)",
            index,
            self.resolved.len()
        );
        Some(index)
    }

    /// Derive the number-format id for a hint; date-like hints use the
    /// built-in ids, percentages register a custom code at 164+
    fn num_fmt_id(&mut self, hint: NumberHint) -> u32 {
        match hint {
            NumberHint::General => 0,
            NumberHint::Date => NUM_FMT_DATE,
            NumberHint::DateTime => NUM_FMT_DATE_TIME,
            NumberHint::Percent(decimals) => {
                let code = percent_code(decimals);
                if let Some(&id) = self.num_fmts.get(&code) {
                    return id;
                }
                let id = NUM_FMT_CUSTOM_BASE + self.num_fmts.len() as u32;
                self.num_fmts.insert(code, id);
                id
            }
        }
    }

    /// Number of pooled cell formats, defaults included
    pub fn style_count(&self) -> usize {
        self.resolved.len()
    }

    /// Render `xl/styles.xml`
    ///
    /// Section order is mandated by the format: custom number formats,
    /// fonts, fills, borders, then the fixed master format, the cell formats
    /// in insertion order, and the fixed named style.
    pub fn styles_xml(&self) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(2048);
        let mut w = XmlWriter::new(&mut output);

        w.declaration()?;
        w.start_element("styleSheet")?;
        w.attribute(
            "xmlns",
            "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
        )?;
        w.close_start_tag()?;

        if !self.num_fmts.is_empty() {
            w.start_element("numFmts")?;
            w.attribute_int("count", self.num_fmts.len() as i64)?;
            w.close_start_tag()?;
            for (code, id) in &self.num_fmts {
                w.start_element("numFmt")?;
                w.attribute_int("numFmtId", *id as i64)?;
                w.attribute("formatCode", code)?;
                w.close_empty()?;
            }
            w.end_element("numFmts")?;
        }

        w.start_element("fonts")?;
        w.attribute_int("count", self.fonts.len() as i64)?;
        w.close_start_tag()?;
        for font in self.fonts.iter() {
            write_font(&mut w, font)?;
        }
        w.end_element("fonts")?;

        w.start_element("fills")?;
        w.attribute_int("count", self.fills.len() as i64)?;
        w.close_start_tag()?;
        for fill in self.fills.iter() {
            write_fill(&mut w, fill)?;
        }
        w.end_element("fills")?;

        w.start_element("borders")?;
        w.attribute_int("count", self.borders.len() as i64)?;
        w.close_start_tag()?;
        for border in self.borders.iter() {
            write_border(&mut w, border)?;
        }
        w.end_element("borders")?;

        // Master format entry; cellXfs entries reference it through xfId
        w.write_raw(
            b"<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>",
        )?;

        w.start_element("cellXfs")?;
        w.attribute_int("count", self.resolved.len() as i64)?;
        w.close_start_tag()?;
        for style in self.resolved.iter() {
            write_xf(&mut w, style, &self.aligns)?;
        }
        w.end_element("cellXfs")?;

        // Named style entry; the format requires at least "Normal"
        w.write_raw(
            b"<cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>",
        )?;

        w.end_element("styleSheet")?;
        w.flush()?;
        Ok(output)
    }
}

impl Default for StyleResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn percent_code(decimals: u8) -> String {
    if decimals == 0 {
        "0%".to_string()
    } else {
        format!("0.{}%", "0".repeat(decimals as usize))
    }
}

fn write_font<W: std::io::Write>(w: &mut XmlWriter<W>, font: &FontSpec) -> Result<()> {
    w.start_element("font")?;
    w.close_start_tag()?;
    if font.bold {
        w.write_raw(b"<b/>")?;
    }
    if font.italic {
        w.write_raw(b"<i/>")?;
    }
    w.start_element("sz")?;
    w.attribute_int("val", font.size as i64)?;
    w.close_empty()?;
    if let Some(color) = font.color {
        w.start_element("color")?;
        w.attribute("rgb", &color.to_argb())?;
        w.close_empty()?;
    }
    w.start_element("name")?;
    w.attribute("val", &font.name)?;
    w.close_empty()?;
    w.end_element("font")
}

fn write_fill<W: std::io::Write>(w: &mut XmlWriter<W>, fill: &FillSpec) -> Result<()> {
    w.start_element("fill")?;
    w.close_start_tag()?;
    match fill {
        FillSpec::None => w.write_raw(b"<patternFill patternType=\"none\"/>")?,
        FillSpec::Gray125 => w.write_raw(b"<patternFill patternType=\"gray125\"/>")?,
        FillSpec::Solid(color) => {
            w.write_raw(b"<patternFill patternType=\"solid\"><fgColor rgb=\"")?;
            w.write_str(&color.to_argb())?;
            w.write_raw(b"\"/><bgColor indexed=\"64\"/></patternFill>")?;
        }
    }
    w.end_element("fill")
}

fn write_border<W: std::io::Write>(w: &mut XmlWriter<W>, border: &BorderSpec) -> Result<()> {
    w.start_element("border")?;
    w.close_start_tag()?;
    write_edge(w, "left", border.left)?;
    write_edge(w, "right", border.right)?;
    write_edge(w, "top", border.top)?;
    write_edge(w, "bottom", border.bottom)?;
    w.write_raw(b"<diagonal/>")?;
    w.end_element("border")
}

fn write_edge<W: std::io::Write>(
    w: &mut XmlWriter<W>,
    edge: &str,
    line: Option<BorderLine>,
) -> Result<()> {
    w.start_element(edge)?;
    match line {
        Some(line) => {
            w.attribute("style", line.as_str())?;
            w.close_empty()
        }
        None => w.close_empty(),
    }
}

fn write_xf<W: std::io::Write>(
    w: &mut XmlWriter<W>,
    style: &ResolvedStyle,
    aligns: &Pool<AlignSpec>,
) -> Result<()> {
    w.start_element("xf")?;
    w.attribute_int("numFmtId", style.num_fmt_id as i64)?;
    w.attribute_int("fontId", style.font_id as i64)?;
    w.attribute_int("fillId", style.fill_id as i64)?;
    w.attribute_int("borderId", style.border_id as i64)?;
    w.attribute("xfId", "0")?;
    if style.num_fmt_id > 0 {
        w.attribute("applyNumberFormat", "1")?;
    }
    if style.font_id > 0 {
        w.attribute("applyFont", "1")?;
    }
    if style.fill_id > 0 {
        w.attribute("applyFill", "1")?;
    }
    if style.border_id > 0 {
        w.attribute("applyBorder", "1")?;
    }

    let align = style
        .align_id
        .and_then(|id| aligns.items.get_index(id as usize));
    match align {
        Some(align) => {
            w.attribute("applyAlignment", "1")?;
            w.close_start_tag()?;
            w.start_element("alignment")?;
            if let Some(horizontal) = align.horizontal {
                w.attribute("horizontal", horizontal.as_str())?;
            }
            if let Some(vertical) = align.vertical {
                w.attribute("vertical", vertical.as_str())?;
            }
            if align.wrap {
                w.attribute("wrapText", "1")?;
            }
            w.close_empty()?;
            w.end_element("xf")
        }
        None => w.close_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, HorizontalAlign};

    fn bold_style() -> StyleSpec {
        StyleSpec {
            font: Some(FontSpec::bold()),
            ..StyleSpec::default()
        }
    }

    #[test]
    fn test_mandatory_defaults_preseeded() {
        let resolver = StyleResolver::new();
        assert_eq!(resolver.fonts.len(), 1);
        assert_eq!(resolver.fills.len(), 2);
        assert_eq!(resolver.borders.len(), 1);
        assert_eq!(resolver.style_count(), 1);
        assert_eq!(resolver.aligns.len(), 0);
    }

    #[test]
    fn test_absent_descriptor_is_none() {
        let mut resolver = StyleResolver::new();
        assert_eq!(resolver.register(None, NumberHint::General), None);
        assert_eq!(resolver.style_count(), 1);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut resolver = StyleResolver::new();
        let a = resolver.register(Some(&bold_style()), NumberHint::General);
        let b = resolver.register(Some(&bold_style()), NumberHint::General);
        assert_eq!(a, b);
        assert_eq!(a, Some(1));
        assert_eq!(resolver.style_count(), 2);
    }

    #[test]
    fn test_insertion_order_indices() {
        let mut resolver = StyleResolver::new();
        let first = StyleSpec {
            fill: Some(FillSpec::Solid(Color(255, 0, 0))),
            ..StyleSpec::default()
        };
        let second = StyleSpec {
            fill: Some(FillSpec::Solid(Color(0, 255, 0))),
            ..StyleSpec::default()
        };
        assert_eq!(resolver.register(Some(&first), NumberHint::General), Some(1));
        assert_eq!(resolver.register(Some(&second), NumberHint::General), Some(2));
        assert_eq!(resolver.register(Some(&first), NumberHint::General), Some(1));
    }

    #[test]
    fn test_default_descriptor_maps_to_index_zero() {
        let mut resolver = StyleResolver::new();
        let empty = StyleSpec::default();
        assert_eq!(resolver.register(Some(&empty), NumberHint::General), Some(0));
        assert_eq!(resolver.style_count(), 1);
    }

    #[test]
    fn test_custom_num_fmt_ids_start_at_164() {
        let mut resolver = StyleResolver::new();
        assert_eq!(resolver.num_fmt_id(NumberHint::Percent(1)), 164);
        assert_eq!(resolver.num_fmt_id(NumberHint::Percent(3)), 165);
        assert_eq!(resolver.num_fmt_id(NumberHint::Percent(1)), 164);
    }

    #[test]
    fn test_date_formats_bypass_custom_pool() {
        let mut resolver = StyleResolver::new();
        assert_eq!(resolver.num_fmt_id(NumberHint::Date), 14);
        assert_eq!(resolver.num_fmt_id(NumberHint::DateTime), 22);
        assert!(resolver.num_fmts.is_empty());
        assert_eq!(resolver.num_fmt_id(NumberHint::Percent(0)), 164);
    }

    #[test]
    fn test_percent_codes() {
        assert_eq!(percent_code(0), "0%");
        assert_eq!(percent_code(2), "0.00%");
    }

    #[test]
    fn test_styles_xml_fixed_entries() {
        let mut resolver = StyleResolver::new();
        resolver.register(
            Some(&StyleSpec {
                align: Some(AlignSpec {
                    horizontal: Some(HorizontalAlign::Center),
                    vertical: None,
                    wrap: true,
                }),
                ..bold_style()
            }),
            NumberHint::Percent(2),
        );

        let xml = String::from_utf8(resolver.styles_xml().unwrap()).unwrap();
        assert!(xml.contains("<numFmts count=\"1\">"));
        assert!(xml.contains("numFmtId=\"164\" formatCode=\"0.00%\""));
        assert!(xml.contains("<fills count=\"2\">"));
        assert!(xml.contains("patternType=\"gray125\""));
        assert!(xml.contains("<cellStyleXfs count=\"1\">"));
        assert!(xml.contains("<cellXfs count=\"2\">"));
        assert!(xml.contains("<alignment horizontal=\"center\" wrapText=\"1\"/>"));
        assert!(xml.contains("<cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/>"));
        // numFmts must precede fonts, fonts precede fills, fills precede borders
        let pos = |needle: &str| xml.find(needle).unwrap();
        assert!(pos("<numFmts") < pos("<fonts"));
        assert!(pos("<fonts") < pos("<fills"));
        assert!(pos("<fills") < pos("<borders"));
        assert!(pos("<borders") < pos("<cellStyleXfs"));
        assert!(pos("<cellXfs") < pos("<cellStyles"));
    }

    #[test]
    fn test_alignment_absent_from_default_xf() {
        let resolver = StyleResolver::new();
        let xml = String::from_utf8(resolver.styles_xml().unwrap()).unwrap();
        assert!(!xml.contains("applyAlignment"));
        assert!(xml.contains(
            "<cellXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/></cellXfs>"
        ));
    }
}
