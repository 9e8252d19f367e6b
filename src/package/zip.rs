//! Self-contained classic ZIP encoder
//!
//! Encodes an ordered list of named byte blobs into one archive held fully
//! in memory. Classic 32-bit ZIP only: entries of 4 GiB or more and archives
//! with 65,535 or more entries are rejected, never mis-encoded.

use crate::error::{Result, XlsxError};
use chrono::{Datelike, NaiveDateTime, Timelike};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_DIR_SIG: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4b50;
const VERSION: u16 = 20;
const METHOD_STORE: u16 = 0;
const METHOD_DEFLATE: u16 = 8;
const MAX_ENTRIES: usize = 0xFFFF;

/// Payloads below this size are stored verbatim; deflate overhead wins
const COMPRESSION_THRESHOLD: usize = 1024;

/// Extensions of payloads that are already compressed
const STORED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "zip", "gz", "7z"];

/// One named byte blob destined for the archive
pub struct ZipEntry {
    /// Forward-slash path inside the archive
    pub path: String,
    /// Uncompressed payload
    pub data: Vec<u8>,
    /// Modification timestamp recorded in the directory records
    pub modified: NaiveDateTime,
}

impl ZipEntry {
    pub fn new(path: impl Into<String>, data: Vec<u8>, modified: NaiveDateTime) -> Self {
        ZipEntry {
            path: path.into(),
            data,
            modified,
        }
    }
}

/// Aggregate compression statistics for one archive
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageStats {
    pub entries: usize,
    pub deflated: usize,
    pub stored: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Pure binary ZIP encoder; holds no state between invocations
///
/// Identical entry lists (paths, bytes, timestamps) always produce
/// byte-identical archives.
pub struct ZipContainerWriter {
    level: u32,
}

impl ZipContainerWriter {
    /// `level` is a deflate level 0-9; values above 9 are clamped
    pub fn new(level: u32) -> Self {
        ZipContainerWriter {
            level: level.min(9),
        }
    }

    /// Encode the entries, in input order, into a complete archive
    pub fn archive(&self, entries: &[ZipEntry]) -> Result<(Vec<u8>, PackageStats)> {
        if entries.len() >= MAX_ENTRIES {
            return Err(XlsxError::DataWrite {
                path: String::new(),
                reason: format!(
                    "archive would hold {} entries, the classic ZIP limit is {}",
                    entries.len(),
                    MAX_ENTRIES
                ),
            });
        }
        for entry in entries {
            validate_path(&entry.path)?;
            if entry.data.len() as u64 > u32::MAX as u64 {
                return Err(XlsxError::PayloadTooLarge {
                    path: entry.path.clone(),
                    size: entry.data.len() as u64,
                });
            }
        }

        let mut output = Vec::new();
        let mut central_dir = Vec::new();
        let mut stats = PackageStats {
            entries: entries.len(),
            ..PackageStats::default()
        };

        for entry in entries {
            let offset = output.len() as u32;
            let crc = crc32fast::hash(&entry.data);
            let (method, payload) = self.encode_payload(entry)?;
            let (dos_time, dos_date) = dos_datetime(entry.modified);

            stats.bytes_in += entry.data.len() as u64;
            stats.bytes_out += payload.len() as u64;
            if method == METHOD_DEFLATE {
                stats.deflated += 1;
            } else {
                stats.stored += 1;
            }

            // Local file header, immediately followed by the payload
            put_u32(&mut output, LOCAL_HEADER_SIG);
            put_u16(&mut output, VERSION);
            put_u16(&mut output, 0); // general purpose flags
            put_u16(&mut output, method);
            put_u16(&mut output, dos_time);
            put_u16(&mut output, dos_date);
            put_u32(&mut output, crc);
            put_u32(&mut output, payload.len() as u32);
            put_u32(&mut output, entry.data.len() as u32);
            put_u16(&mut output, entry.path.len() as u16);
            put_u16(&mut output, 0); // extra field length
            output.extend_from_slice(entry.path.as_bytes());
            output.extend_from_slice(&payload);

            // Matching central-directory record, pointing back at the header
            put_u32(&mut central_dir, CENTRAL_DIR_SIG);
            put_u16(&mut central_dir, VERSION); // version made by
            put_u16(&mut central_dir, VERSION); // version needed
            put_u16(&mut central_dir, 0);
            put_u16(&mut central_dir, method);
            put_u16(&mut central_dir, dos_time);
            put_u16(&mut central_dir, dos_date);
            put_u32(&mut central_dir, crc);
            put_u32(&mut central_dir, payload.len() as u32);
            put_u32(&mut central_dir, entry.data.len() as u32);
            put_u16(&mut central_dir, entry.path.len() as u16);
            put_u16(&mut central_dir, 0); // extra field length
            put_u16(&mut central_dir, 0); // comment length
            put_u16(&mut central_dir, 0); // disk number start
            put_u16(&mut central_dir, 0); // internal attributes
            put_u32(&mut central_dir, 0); // external attributes
            put_u32(&mut central_dir, offset);
            central_dir.extend_from_slice(entry.path.as_bytes());
        }

        let central_offset = output.len() as u64;
        if central_offset + central_dir.len() as u64 > u32::MAX as u64 {
            return Err(XlsxError::DataWrite {
                path: String::new(),
                reason: "archive exceeds the classic ZIP 4 GiB limit".to_string(),
            });
        }
        output.extend_from_slice(&central_dir);

        put_u32(&mut output, END_OF_CENTRAL_DIR_SIG);
        put_u16(&mut output, 0); // disk number
        put_u16(&mut output, 0); // central-directory disk
        put_u16(&mut output, entries.len() as u16);
        put_u16(&mut output, entries.len() as u16);
        put_u32(&mut output, central_dir.len() as u32);
        put_u32(&mut output, central_offset as u32);
        put_u16(&mut output, 0); // comment length

        Ok((output, stats))
    }

    /// Pick store or deflate for one payload; deflate is kept only when it
    /// is strictly smaller than the input
    fn encode_payload(&self, entry: &ZipEntry) -> Result<(u16, Vec<u8>)> {
        if entry.data.len() < COMPRESSION_THRESHOLD || has_stored_extension(&entry.path) {
            return Ok((METHOD_STORE, entry.data.clone()));
        }

        let mut encoder =
            DeflateEncoder::new(Vec::with_capacity(entry.data.len() / 2), Compression::new(self.level));
        encoder
            .write_all(&entry.data)
            .and_then(|_| encoder.finish())
            .map(|compressed| {
                if compressed.len() < entry.data.len() {
                    (METHOD_DEFLATE, compressed)
                } else {
                    (METHOD_STORE, entry.data.clone())
                }
            })
            .map_err(|e| XlsxError::DataWrite {
                path: entry.path.clone(),
                reason: e.to_string(),
            })
    }
}

fn validate_path(path: &str) -> Result<()> {
    let rejected = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|segment| segment == "..");
    if rejected {
        return Err(XlsxError::InvalidEntryPath {
            path: path.to_string(),
        });
    }
    Ok(())
}

fn has_stored_extension(path: &str) -> bool {
    path.rsplit('.')
        .next()
        .map(|ext| STORED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Pack a timestamp into the two 16-bit DOS fields required by the
/// directory records; 2-second resolution, years clamp to the 1980 epoch
fn dos_datetime(t: NaiveDateTime) -> (u16, u16) {
    let year = t.year().max(1980) as u16;
    let date = ((year - 1980) << 9) | ((t.month() as u16) << 5) | t.day() as u16;
    let time = ((t.hour() as u16) << 11) | ((t.minute() as u16) << 5) | (t.second() as u16 / 2);
    (time, date)
}

#[inline]
fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

#[inline]
fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::{Cursor, Read};

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(10, 30, 44)
            .unwrap()
    }

    fn entry(path: &str, data: Vec<u8>) -> ZipEntry {
        ZipEntry::new(path, data, stamp())
    }

    #[test]
    fn test_round_trip_with_reference_reader() {
        let entries = vec![
            entry("a.txt", b"hello".to_vec()),
            entry("dir/b.xml", vec![b'x'; 5000]),
        ];
        let (bytes, _) = ZipContainerWriter::new(6).archive(&entries).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        for want in &entries {
            let mut file = archive.by_name(&want.path).unwrap();
            let mut got = Vec::new();
            file.read_to_end(&mut got).unwrap();
            assert_eq!(got, want.data);
            assert_eq!(file.crc32(), crc32fast::hash(&want.data));
        }
    }

    #[test]
    fn test_deterministic_output() {
        let make = || vec![entry("a.xml", vec![7u8; 4000]), entry("b.xml", b"b".to_vec())];
        let writer = ZipContainerWriter::new(6);
        let (first, _) = writer.archive(&make()).unwrap();
        let (second, _) = writer.archive(&make()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parent_traversal_rejected() {
        let writer = ZipContainerWriter::new(6);
        for bad in ["../evil", "a/../b", ""] {
            let err = writer.archive(&[entry(bad, b"x".to_vec())]).unwrap_err();
            assert!(matches!(err, XlsxError::InvalidEntryPath { .. }), "{bad}");
        }
    }

    #[test]
    fn test_repetitive_payload_deflates() {
        let (_, stats) = ZipContainerWriter::new(6)
            .archive(&[entry("big.xml", vec![b'a'; 10_000])])
            .unwrap();
        assert_eq!(stats.deflated, 1);
        assert!(stats.bytes_out < stats.bytes_in);
    }

    #[test]
    fn test_small_payload_stored_verbatim() {
        let (_, stats) = ZipContainerWriter::new(6)
            .archive(&[entry("small.xml", vec![b'a'; 500])])
            .unwrap();
        assert_eq!(stats.stored, 1);
        assert_eq!(stats.bytes_out, 500);
    }

    #[test]
    fn test_compressed_extension_stored() {
        let (_, stats) = ZipContainerWriter::new(6)
            .archive(&[entry("image.png", vec![b'a'; 10_000])])
            .unwrap();
        assert_eq!(stats.stored, 1);
    }

    #[test]
    fn test_level_zero_still_valid() {
        let (bytes, _) = ZipContainerWriter::new(0)
            .archive(&[entry("a.xml", vec![b'z'; 3000])])
            .unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut got = Vec::new();
        archive.by_index(0).unwrap().read_to_end(&mut got).unwrap();
        assert_eq!(got, vec![b'z'; 3000]);
    }

    #[test]
    fn test_dos_datetime_packing() {
        let (time, date) = dos_datetime(stamp());
        // 2024-06-15 -> (44 << 9) | (6 << 5) | 15
        assert_eq!(date, (44 << 9) | (6 << 5) | 15);
        // 10:30:44 -> (10 << 11) | (30 << 5) | 22
        assert_eq!(time, (10 << 11) | (30 << 5) | 22);
    }

    #[test]
    fn test_dos_datetime_clamps_pre_epoch_years() {
        let old = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let (_, date) = dos_datetime(old);
        assert_eq!(date >> 9, 0); // clamped to 1980
    }

    #[test]
    fn test_empty_archive_has_end_record_only() {
        let (bytes, stats) = ZipContainerWriter::new(6).archive(&[]).unwrap();
        assert_eq!(bytes.len(), 22);
        assert_eq!(stats.entries, 0);
        assert_eq!(&bytes[0..4], &END_OF_CENTRAL_DIR_SIG.to_le_bytes());
    }
}
