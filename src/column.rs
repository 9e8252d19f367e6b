//! Declarative column definitions
//!
//! A column binds a header, a typed accessor from the source object to a
//! cell value, and optional presentation settings. Columns are plain values
//! built with chained constructors; a sheet owns an ordered list of them.

use crate::types::{CellValue, NumberHint, StyleSpec};

type Accessor<T> = Box<dyn Fn(&T) -> CellValue + Send + Sync>;
type CellStyler<T> = Box<dyn Fn(&T) -> Option<StyleSpec> + Send + Sync>;

/// One column of a typed sheet
pub struct Column<T> {
    pub(crate) header: String,
    pub(crate) accessor: Accessor<T>,
    pub(crate) style: Option<StyleSpec>,
    pub(crate) cell_style: Option<CellStyler<T>>,
    pub(crate) hint: NumberHint,
    pub(crate) shared: bool,
    pub(crate) included: bool,
    pub(crate) width: Option<f64>,
}

impl<T> Column<T> {
    /// Bind a header and an accessor producing this column's cell values
    pub fn new<F>(header: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&T) -> CellValue + Send + Sync + 'static,
    {
        Column {
            header: header.into(),
            accessor: Box::new(accessor),
            style: None,
            cell_style: None,
            hint: NumberHint::General,
            shared: true,
            included: true,
            width: None,
        }
    }

    /// Column-level style, overridden per cell by [`Column::with_cell_style`]
    pub fn with_style(mut self, style: StyleSpec) -> Self {
        self.style = Some(style);
        self
    }

    /// Per-cell style derived from the source object; wins over the
    /// column-level style in the cascade
    pub fn with_cell_style<F>(mut self, styler: F) -> Self
    where
        F: Fn(&T) -> Option<StyleSpec> + Send + Sync + 'static,
    {
        self.cell_style = Some(Box::new(styler));
        self
    }

    /// Format numeric values as a percentage with the given decimal precision
    pub fn percent(mut self, decimals: u8) -> Self {
        self.hint = NumberHint::Percent(decimals);
        self
    }

    /// Format serial values as dates
    pub fn date(mut self) -> Self {
        self.hint = NumberHint::Date;
        self
    }

    /// Format serial values as date-times
    pub fn date_time(mut self) -> Self {
        self.hint = NumberHint::DateTime;
        self
    }

    /// Emit string cells inline instead of through the shared-string table
    pub fn inline_strings(mut self) -> Self {
        self.shared = false;
        self
    }

    /// Conditionally include this column; excluded columns contribute
    /// neither header nor cells
    pub fn include_if(mut self, included: bool) -> Self {
        self.included = included;
        self
    }

    /// Display width in character units
    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }
}
