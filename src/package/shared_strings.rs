//! Shared-string table for workbook-wide text deduplication

use super::xml::XmlWriter;
use crate::error::Result;
use indexmap::IndexSet;

/// Insertion-ordered, deduplicated pool of text values
///
/// Every distinct string gets the next free index; re-registering an
/// existing value returns its original index. The pool is scoped to one
/// generation run and only ever grows.
pub struct SharedStringPool {
    strings: IndexSet<String>,
}

impl SharedStringPool {
    pub fn new() -> Self {
        SharedStringPool {
            strings: IndexSet::with_capacity(1024),
        }
    }

    /// Register a string and return its index
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(index) = self.strings.get_index_of(s) {
            return index as u32;
        }
        let (index, _) = self.strings.insert_full(s.to_string());
        index as u32
    }

    /// Bulk registration; values already present are skipped, first-seen
    /// order of new values is preserved
    pub fn intern_all<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for value in values {
            self.intern(value.as_ref());
        }
    }

    /// Number of pooled strings; by construction equal to the unique count
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Render `xl/sharedStrings.xml`
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(256 + self.strings.len() * 32);
        let mut writer = XmlWriter::new(&mut output);

        writer.declaration()?;
        writer.start_element("sst")?;
        writer.attribute(
            "xmlns",
            "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
        )?;
        writer.attribute_int("count", self.strings.len() as i64)?;
        writer.attribute_int("uniqueCount", self.strings.len() as i64)?;
        writer.close_start_tag()?;

        for s in &self.strings {
            writer.start_element("si")?;
            writer.close_start_tag()?;
            writer.text_element("t", s)?;
            writer.end_element("si")?;
        }

        writer.end_element("sst")?;
        writer.flush()?;
        Ok(output)
    }
}

impl Default for SharedStringPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_and_order() {
        let mut pool = SharedStringPool::new();

        assert_eq!(pool.intern("Alice"), 0);
        assert_eq!(pool.intern("Bob"), 1);
        assert_eq!(pool.intern("Alice"), 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_intern_all_preserves_first_seen_order() {
        let mut pool = SharedStringPool::new();
        pool.intern("zero");
        pool.intern_all(["one", "zero", "two"]);

        assert_eq!(pool.intern("one"), 1);
        assert_eq!(pool.intern("two"), 2);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_xml_counts_and_escaping() {
        let mut pool = SharedStringPool::new();
        pool.intern("a<b");
        pool.intern("c&d");

        let xml = String::from_utf8(pool.to_xml().unwrap()).unwrap();
        assert!(xml.contains("count=\"2\" uniqueCount=\"2\""));
        assert!(xml.contains("<si><t>a&lt;b</t></si><si><t>c&amp;d</t></si>"));
    }

    #[test]
    fn test_empty_pool_xml() {
        let pool = SharedStringPool::new();
        let xml = String::from_utf8(pool.to_xml().unwrap()).unwrap();
        assert!(xml.contains("count=\"0\" uniqueCount=\"0\""));
    }
}
