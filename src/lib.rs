//! # sheetpack
//!
//! Turns typed in-memory data into complete `.xlsx` files, with the whole
//! OOXML package pipeline in one crate:
//!
//! - **Style resolution**: font/fill/border/alignment/number-format
//!   combinations deduplicate into compact index-referenced pools
//! - **Shared strings**: repeated text stored once, referenced by index
//! - **Package assembly**: every XML part generated with mutually
//!   consistent style ids, string indices, relationship ids and sheet ids
//! - **Container writing**: a self-contained classic ZIP encoder produces
//!   the final archive, no archive library required at runtime
//!
//! ## Quick start
//!
//! ```no_run
//! use sheetpack::{CellValue, Column, Sheet, Workbook};
//!
//! struct Employee {
//!     name: String,
//!     age: i64,
//!     utilization: f64,
//! }
//!
//! # fn main() -> sheetpack::Result<()> {
//! let staff = vec![
//!     Employee { name: "Alice".into(), age: 30, utilization: 0.87 },
//!     Employee { name: "Bob".into(), age: 25, utilization: 0.64 },
//! ];
//!
//! let mut workbook = Workbook::new().with_title("Staffing");
//! workbook.add_sheet(
//!     Sheet::new("Staff")
//!         .column(Column::new("Name", |e: &Employee| e.name.as_str().into()))
//!         .column(Column::new("Age", |e: &Employee| CellValue::Int(e.age)))
//!         .column(
//!             Column::new("Utilization", |e: &Employee| {
//!                 CellValue::Float(e.utilization)
//!             })
//!             .percent(1),
//!         )
//!         .with_rows(staff),
//! );
//! workbook.save("staffing.xlsx")?;
//! # Ok(())
//! # }
//! ```
//!
//! Generation is single-threaded and all-or-nothing: a run either produces
//! a complete archive or returns the first [`XlsxError`] encountered, never
//! a partial file.

pub mod column;
pub mod error;
pub mod package;
pub mod sheet;
pub mod types;
pub mod workbook;

pub use column::Column;
pub use error::{Result, XlsxError};
pub use package::zip::{PackageStats, ZipContainerWriter, ZipEntry};
pub use package::ProgressEvent;
pub use sheet::{Sheet, SheetMeta, SheetSource};
pub use types::{
    AlignSpec, BorderLine, BorderSpec, CellValue, Color, FillSpec, FontSpec, HorizontalAlign,
    NumberHint, StyleSpec, VerticalAlign,
};
pub use workbook::Workbook;
