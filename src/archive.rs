//! Store-only ZIP writer for the EPUB OCF container.
//!
//! EPUB readers are strict about the container: the first entry must be an
//! uncompressed `mimetype` file with no extra fields, and the central directory
//! must agree byte-for-byte with the local headers. The archive is therefore
//! assembled by hand in a single pass:
//!
//! ```text
//! [local header 1][name 1][data 1] ... [local header n][name n][data n]
//! [central record 1][name 1] ... [central record n][name n]
//! [end of central directory]
//! ```
//!
//! Every entry uses method 0 ("store"), so compressed size always equals
//! uncompressed size. Adding deflate later means writing both sizes
//! independently and setting method 8 in the local *and* central headers.
//!
//! All multi-byte integers are little-endian. Modification time and date are
//! written as zero, which keeps the output deterministic for identical input.

use thiserror::Error;

const SIG_LOCAL_FILE_HEADER: u32 = 0x04034b50;
const SIG_CENTRAL_DIRECTORY: u32 = 0x02014b50;
const SIG_END_OF_CENTRAL_DIRECTORY: u32 = 0x06054b50;

const LOCAL_HEADER_LEN: usize = 30;
const CENTRAL_HEADER_LEN: usize = 46;
const END_OF_CENTRAL_DIRECTORY_LEN: usize = 22;

/// ZIP 2.0: the minimum version that understands stored entries in directories.
const VERSION: u16 = 20;
const METHOD_STORE: u16 = 0;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ZipError {
    #[error("entry name must not be empty")]
    EmptyName,
    #[error("entry name too long ({len} bytes): {name}")]
    NameTooLong { name: String, len: usize },
    #[error("entry {name} is too large for a 32-bit ZIP ({size} bytes)")]
    EntryTooLarge { name: String, size: usize },
    #[error("archive exceeds the 32-bit ZIP offset limit")]
    ArchiveTooLarge,
    #[error("too many entries for a single ZIP ({0})")]
    TooManyEntries(usize),
}

/// One file to be written into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Path inside the archive, `/`-separated (e.g. `OEBPS/content.opf`).
    pub name: String,
    pub data: Vec<u8>,
}

impl ZipEntry {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Bookkeeping for one written local entry. The central directory is derived
/// from these, so `offset` must match the real position of the local header.
struct ZipRecord<'a> {
    name_bytes: &'a [u8],
    crc32: u32,
    size: u32,
    offset: u32,
}

/// CRC-32 (IEEE 802.3, reflected polynomial `0xEDB88320`) lookup table.
pub const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

/// CRC-32 checksum of `data`, as stored in ZIP headers.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = (crc >> 8) ^ CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize];
    }
    crc ^ 0xFFFF_FFFF
}

/// Serialize `entries`, in order, into a complete ZIP archive.
///
/// Entries are never skipped, reordered, or compressed. Fails only when an
/// entry cannot be represented in the classic (non-ZIP64) format.
pub fn build_zip(entries: &[ZipEntry]) -> Result<Vec<u8>, ZipError> {
    let count = u16::try_from(entries.len()).map_err(|_| ZipError::TooManyEntries(entries.len()))?;

    let payload: usize = entries
        .iter()
        .map(|e| LOCAL_HEADER_LEN + CENTRAL_HEADER_LEN + 2 * e.name.len() + e.data.len())
        .sum();
    let mut out = Vec::with_capacity(payload + END_OF_CENTRAL_DIRECTORY_LEN);
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        let name_bytes = entry.name.as_bytes();
        if name_bytes.is_empty() {
            return Err(ZipError::EmptyName);
        }
        let name_len = u16::try_from(name_bytes.len()).map_err(|_| ZipError::NameTooLong {
            name: entry.name.clone(),
            len: name_bytes.len(),
        })?;
        let size = u32::try_from(entry.data.len()).map_err(|_| ZipError::EntryTooLarge {
            name: entry.name.clone(),
            size: entry.data.len(),
        })?;
        let offset = u32::try_from(out.len()).map_err(|_| ZipError::ArchiveTooLarge)?;
        let crc = crc32(&entry.data);

        write_u32(&mut out, SIG_LOCAL_FILE_HEADER);
        write_u16(&mut out, VERSION);
        write_u16(&mut out, 0); // flags
        write_u16(&mut out, METHOD_STORE);
        write_u16(&mut out, 0); // mod time
        write_u16(&mut out, 0); // mod date
        write_u32(&mut out, crc);
        write_u32(&mut out, size); // compressed
        write_u32(&mut out, size); // uncompressed
        write_u16(&mut out, name_len);
        write_u16(&mut out, 0); // extra length
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(&entry.data);

        records.push(ZipRecord {
            name_bytes,
            crc32: crc,
            size,
            offset,
        });
    }

    let central_start = out.len();
    let central_offset = u32::try_from(central_start).map_err(|_| ZipError::ArchiveTooLarge)?;

    for record in &records {
        write_u32(&mut out, SIG_CENTRAL_DIRECTORY);
        write_u16(&mut out, VERSION); // made by
        write_u16(&mut out, VERSION); // needed
        write_u16(&mut out, 0); // flags
        write_u16(&mut out, METHOD_STORE);
        write_u16(&mut out, 0); // mod time
        write_u16(&mut out, 0); // mod date
        write_u32(&mut out, record.crc32);
        write_u32(&mut out, record.size);
        write_u32(&mut out, record.size);
        write_u16(&mut out, record.name_bytes.len() as u16);
        write_u16(&mut out, 0); // extra length
        write_u16(&mut out, 0); // comment length
        write_u16(&mut out, 0); // disk number start
        write_u16(&mut out, 0); // internal attributes
        write_u32(&mut out, 0); // external attributes
        write_u32(&mut out, record.offset);
        out.extend_from_slice(record.name_bytes);
    }

    let central_size =
        u32::try_from(out.len() - central_start).map_err(|_| ZipError::ArchiveTooLarge)?;

    write_u32(&mut out, SIG_END_OF_CENTRAL_DIRECTORY);
    write_u16(&mut out, 0); // this disk
    write_u16(&mut out, 0); // disk with central directory
    write_u16(&mut out, count); // entries on this disk
    write_u16(&mut out, count); // entries total
    write_u32(&mut out, central_size);
    write_u32(&mut out, central_offset);
    write_u16(&mut out, 0); // comment length

    u32::try_from(out.len()).map_err(|_| ZipError::ArchiveTooLarge)?;
    Ok(out)
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}
