//! Minimal sfnt (TrueType/OpenType) table directory reader.

/// TrueType outlines.
pub const FLAVOR_TRUETYPE: u32 = 0x0001_0000;
/// CFF outlines.
pub const FLAVOR_OTTO: u32 = u32::from_be_bytes(*b"OTTO");
/// Legacy Apple TrueType.
pub const FLAVOR_TRUE: u32 = u32::from_be_bytes(*b"true");

const COLLECTION: u32 = u32::from_be_bytes(*b"ttcf");

/// Size of the offset table and of one table record.
pub const HEADER_SIZE: usize = 12;
pub const RECORD_SIZE: usize = 16;

/// One table of a parsed font.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table<'a> {
    pub tag: [u8; 4],
    pub checksum: u32,
    pub data: &'a [u8],
}

/// A parsed font: its flavor and its tables sorted by tag.
#[derive(Debug, Clone)]
pub struct Sfnt<'a> {
    pub flavor: u32,
    pub tables: Vec<Table<'a>>,
}

impl Sfnt<'_> {
    /// Size of the uncompressed font, with every table padded to four bytes.
    pub fn total_size(&self) -> u32 {
        let tables: usize = self.tables.iter().map(|t| pad4(t.data.len())).sum();
        (HEADER_SIZE + RECORD_SIZE * self.tables.len() + tables) as u32
    }
}

/// Parse the table directory of a single font.
pub fn parse(data: &[u8]) -> Result<Sfnt<'_>, String> {
    let flavor = read_u32(data, 0)?;
    match flavor {
        FLAVOR_TRUETYPE | FLAVOR_OTTO | FLAVOR_TRUE => {}
        COLLECTION => return Err("font collections are not supported".to_string()),
        other => return Err(format!("not an sfnt font (flavor {other:#010x})")),
    }

    let count = read_u16(data, 4)? as usize;
    let mut tables = Vec::with_capacity(count);

    for i in 0..count {
        let record = HEADER_SIZE + i * RECORD_SIZE;
        let tag = data
            .get(record..record + 4)
            .and_then(|t| <[u8; 4]>::try_from(t).ok())
            .ok_or_else(|| "truncated table directory".to_string())?;
        let checksum = read_u32(data, record + 4)?;
        let offset = read_u32(data, record + 8)? as usize;
        let length = read_u32(data, record + 12)? as usize;

        let table = offset
            .checked_add(length)
            .and_then(|end| data.get(offset..end))
            .ok_or_else(|| {
                format!(
                    "table '{}' extends past the end of the file",
                    String::from_utf8_lossy(&tag)
                )
            })?;

        tables.push(Table {
            tag,
            checksum,
            data: table,
        });
    }

    tables.sort_by_key(|t| t.tag);
    Ok(Sfnt { flavor, tables })
}

/// Round up to a multiple of four.
pub fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, String> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "unexpected end of font data".to_string())
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, String> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| "unexpected end of font data".to_string())
}
