//! Cell values and style descriptors

use std::fmt;

/// Represents a single cell value in a worksheet
///
/// Serialization is an exhaustive match over these variants; extending the
/// set of supported values means adding a variant here and handling it in
/// the worksheet renderer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellValue {
    /// Empty cell
    Empty,
    /// String value, deduplicated through the shared-string table by default
    String(String),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// Date/time as an Excel serial number
    DateTime(f64),
    /// Formula in Excel syntax, with or without a leading `=`
    Formula(String),
    /// Error literal such as `#DIV/0!`
    Error(String),
}

impl CellValue {
    /// Check if cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Convert cell value to a display string
    pub fn as_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::DateTime(d) => d.to_string(),
            CellValue::Formula(f) => f.clone(),
            CellValue::Error(e) => e.clone(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// Hint that drives number-format derivation for a cell
///
/// Percentages carry the requested decimal precision. Date and date-time map
/// to the built-in format ids and never consume a custom-format slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NumberHint {
    #[default]
    General,
    Percent(u8),
    Date,
    DateTime,
}

/// RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    /// ARGB hex form used by the format, alpha always opaque
    pub(crate) fn to_argb(self) -> String {
        format!("FF{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

/// Font component of a style descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FontSpec {
    /// Typeface name
    pub name: String,
    /// Size in points
    pub size: u16,
    pub bold: bool,
    pub italic: bool,
    pub color: Option<Color>,
}

impl Default for FontSpec {
    fn default() -> Self {
        FontSpec {
            name: "Calibri".to_string(),
            size: 11,
            bold: false,
            italic: false,
            color: None,
        }
    }
}

impl FontSpec {
    /// Default face and size with bold set
    pub fn bold() -> Self {
        FontSpec {
            bold: true,
            ..FontSpec::default()
        }
    }
}

/// Fill component of a style descriptor
///
/// `None` and `Gray125` exist because the format mandates them as the first
/// two fill-pool entries; user styles normally use `Solid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FillSpec {
    #[default]
    None,
    Gray125,
    Solid(Color),
}

/// Line style for one border edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BorderLine {
    Thin,
    Medium,
    Thick,
    Dashed,
}

impl BorderLine {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            BorderLine::Thin => "thin",
            BorderLine::Medium => "medium",
            BorderLine::Thick => "thick",
            BorderLine::Dashed => "dashed",
        }
    }
}

/// Border component of a style descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BorderSpec {
    pub left: Option<BorderLine>,
    pub right: Option<BorderLine>,
    pub top: Option<BorderLine>,
    pub bottom: Option<BorderLine>,
}

impl BorderSpec {
    /// Same line style on all four edges
    pub fn all(line: BorderLine) -> Self {
        BorderSpec {
            left: Some(line),
            right: Some(line),
            top: Some(line),
            bottom: Some(line),
        }
    }
}

/// Horizontal alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
}

impl HorizontalAlign {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            HorizontalAlign::Left => "left",
            HorizontalAlign::Center => "center",
            HorizontalAlign::Right => "right",
        }
    }
}

/// Vertical alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VerticalAlign {
    Top,
    Center,
    Bottom,
}

impl VerticalAlign {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            VerticalAlign::Top => "top",
            VerticalAlign::Center => "center",
            VerticalAlign::Bottom => "bottom",
        }
    }
}

/// Alignment component of a style descriptor
///
/// Unlike font/fill/border, alignment has no mandatory default entry: a cell
/// without alignment simply carries no alignment block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlignSpec {
    pub horizontal: Option<HorizontalAlign>,
    pub vertical: Option<VerticalAlign>,
    pub wrap: bool,
}

/// Style descriptor for a cell, column, sheet, or the whole workbook
///
/// Every component is independently optional. Descriptors from the four
/// layers are merged once per cell with [`StyleSpec::or`] before style
/// resolution; the innermost layer wins per component.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StyleSpec {
    pub font: Option<FontSpec>,
    pub fill: Option<FillSpec>,
    pub border: Option<BorderSpec>,
    pub align: Option<AlignSpec>,
}

impl StyleSpec {
    /// Merge with a fallback layer: components set on `self` win, missing
    /// components are taken from `outer`.
    pub fn or(&self, outer: &StyleSpec) -> StyleSpec {
        StyleSpec {
            font: self.font.clone().or_else(|| outer.font.clone()),
            fill: self.fill.or(outer.fill),
            border: self.border.or(outer.border),
            align: self.align.or(outer.align),
        }
    }

    /// Apply the cell < column < sheet < workbook cascade; `layers` runs
    /// innermost first and the innermost setting wins per component.
    /// Returns `None` when no layer contributes anything.
    pub(crate) fn cascade(layers: &[Option<&StyleSpec>]) -> Option<StyleSpec> {
        let mut merged: Option<StyleSpec> = None;
        for layer in layers.iter().flatten() {
            merged = Some(match merged {
                Some(inner) => inner.or(layer),
                None => (*layer).clone(),
            });
        }
        merged
    }
}
