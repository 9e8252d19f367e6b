//! Workbook façade: configuration, sheet registration, and the single
//! generate-file entry point

use crate::error::Result;
use crate::package::zip::PackageStats;
use crate::package::{DocProperties, PackageAssembler, ProgressCallback, ProgressEvent};
use crate::sheet::SheetSource;
use crate::types::StyleSpec;
use chrono::{DateTime, Utc};
use std::path::Path;

/// An in-memory workbook that generates one `.xlsx` archive per call
///
/// All pools and metadata live inside one generation run; calling
/// [`Workbook::save`] twice performs two independent runs over the same
/// sheet definitions.
///
/// # Examples
///
/// ```no_run
/// use sheetpack::{CellValue, Column, Sheet, Workbook};
///
/// struct Order { id: i64, total: f64 }
///
/// # fn main() -> sheetpack::Result<()> {
/// let mut workbook = Workbook::new().with_title("Orders");
/// workbook.add_sheet(
///     Sheet::new("Q1")
///         .column(Column::new("Id", |o: &Order| CellValue::Int(o.id)))
///         .column(Column::new("Total", |o: &Order| CellValue::Float(o.total)))
///         .with_rows(vec![Order { id: 1, total: 9.99 }]),
/// );
/// workbook.save("orders.xlsx")?;
/// # Ok(())
/// # }
/// ```
pub struct Workbook {
    sheets: Vec<Box<dyn SheetSource>>,
    title: Option<String>,
    author: String,
    created: DateTime<Utc>,
    default_style: Option<StyleSpec>,
    compression: u32,
    progress: Option<Box<ProgressCallback>>,
}

impl Workbook {
    pub fn new() -> Self {
        Workbook {
            sheets: Vec::new(),
            title: None,
            author: "sheetpack".to_string(),
            created: Utc::now(),
            default_style: None,
            compression: 6,
            progress: None,
        }
    }

    /// Register a sheet; sheets render and appear in registration order
    pub fn add_sheet(&mut self, sheet: impl SheetSource + 'static) -> &mut Self {
        self.sheets.push(Box::new(sheet));
        self
    }

    /// Document title recorded in `docProps/core.xml`
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Author recorded as creator and last-modified-by
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Pin the created/modified timestamp; also stamps the archive entries,
    /// which makes output byte-deterministic
    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    /// Workbook-wide default style, the outermost layer of the cascade
    pub fn with_default_style(mut self, style: StyleSpec) -> Self {
        self.default_style = Some(style);
        self
    }

    /// Deflate level 0-9 for the container writer, default 6
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression = level.min(9);
        self
    }

    /// Observe advisory progress notifications during generation
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressEvent<'_>) + Send + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Run the full four-phase generation and return the archive bytes
    /// without touching disk
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let (bytes, _) = self.assemble()?;
        Ok(bytes)
    }

    /// Generate the archive and write it to `path`
    ///
    /// Assembly happens fully in memory first, and the bytes land via a
    /// rename from a `.partial` sibling, so a failed run never leaves a
    /// corrupt file at the final path.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<PackageStats> {
        let (bytes, stats) = self.assemble()?;

        let path = path.as_ref();
        let partial = path.with_extension("partial");
        std::fs::write(&partial, &bytes)?;
        if let Err(e) = std::fs::rename(&partial, path) {
            let _ = std::fs::remove_file(&partial);
            return Err(e.into());
        }
        Ok(stats)
    }

    fn assemble(&mut self) -> Result<(Vec<u8>, PackageStats)> {
        let props = DocProperties {
            title: self.title.clone(),
            author: self.author.clone(),
            created: self.created,
        };
        PackageAssembler::new(
            &mut self.sheets,
            &props,
            self.default_style.as_ref(),
            self.compression,
            self.progress.as_deref(),
        )
        .assemble()
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::sheet::Sheet;
    use crate::types::CellValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct Row {
        n: i64,
    }

    fn simple_sheet(name: &str, rows: usize) -> Sheet<Row> {
        Sheet::new(name)
            .column(Column::new("N", |r: &Row| CellValue::Int(r.n)))
            .with_rows((0..rows as i64).map(|n| Row { n }).collect())
    }

    #[test]
    fn test_save_writes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let mut workbook = Workbook::new();
        workbook.add_sheet(simple_sheet("Data", 3));
        let stats = workbook.save(&path).unwrap();

        assert!(path.exists());
        assert_eq!(stats.entries, 10);
        assert!(!dir.path().join("out.partial").exists());
    }

    #[test]
    fn test_missing_data_source_aborts_whole_package() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let mut workbook = Workbook::new();
        workbook.add_sheet(simple_sheet("Ok", 1));
        workbook.add_sheet(Sheet::<Row>::new("Broken").column(Column::new("N", |r: &Row| {
            CellValue::Int(r.n)
        })));

        assert!(workbook.save(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_deterministic_bytes_with_pinned_timestamp() {
        let created = chrono::DateTime::parse_from_rfc3339("2024-05-06T07:08:09Z")
            .unwrap()
            .with_timezone(&Utc);

        let build = || {
            let mut wb = Workbook::new().with_created(created);
            wb.add_sheet(simple_sheet("Data", 10));
            wb.to_bytes().unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_progress_events_are_advisory() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);

        let mut workbook = Workbook::new().on_progress(move |event| {
            if matches!(event, ProgressEvent::Finished { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        workbook.add_sheet(simple_sheet("Data", 2));
        workbook.to_bytes().unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
