//! WOFF 2.0 encoding with null table transforms and one brotli stream.

use std::io::Write;

use super::sfnt::Sfnt;

const SIGNATURE: &[u8; 4] = b"wOF2";
const HEADER_SIZE: usize = 48;

/// Tags with a one-byte index in the table directory.
const KNOWN_TAGS: [&[u8; 4]; 63] = [
    b"cmap", b"head", b"hhea", b"hmtx", b"maxp", b"name", b"OS/2", b"post", b"cvt ", b"fpgm",
    b"glyf", b"loca", b"prep", b"CFF ", b"VORG", b"EBDT", b"EBLC", b"gasp", b"hdmx", b"kern",
    b"LTSH", b"PCLT", b"VDMX", b"vhea", b"vmtx", b"BASE", b"GDEF", b"GPOS", b"GSUB", b"EBSC",
    b"JSTF", b"MATH", b"CBDT", b"CBLC", b"COLR", b"CPAL", b"SVG ", b"sbix", b"acnt", b"avar",
    b"bdat", b"bloc", b"bsln", b"cvar", b"fdsc", b"feat", b"fmtx", b"fvar", b"gvar", b"hsty",
    b"just", b"lcar", b"mort", b"morx", b"opbd", b"prop", b"trak", b"Zapf", b"Silf", b"Glat",
    b"Gloc", b"Feat", b"Sill",
];

/// Tag index meaning "a four-byte tag follows".
const ARBITRARY_TAG: u8 = 63;

/// Transform version 3 is the null transform for `glyf` and `loca`; every
/// other table's null transform is version 0.
const GLYF_LOCA_NULL_TRANSFORM: u8 = 3 << 6;

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 11;
const BROTLI_WINDOW: u32 = 22;

/// Encode a parsed font as WOFF 2.0.
pub fn encode(font: &Sfnt<'_>) -> Result<Vec<u8>, String> {
    let mut directory = Vec::new();
    let mut stream = Vec::new();

    for table in &font.tables {
        let index = KNOWN_TAGS
            .iter()
            .position(|known| **known == table.tag)
            .map(|i| i as u8);

        let transform = if &table.tag == b"glyf" || &table.tag == b"loca" {
            GLYF_LOCA_NULL_TRANSFORM
        } else {
            0
        };

        directory.push(index.unwrap_or(ARBITRARY_TAG) | transform);
        if index.is_none() {
            directory.extend_from_slice(&table.tag);
        }
        write_base128(&mut directory, table.data.len() as u32);

        stream.extend_from_slice(table.data);
    }

    let compressed = compress(&stream)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + directory.len() + compressed.len() + 3);
    out.extend_from_slice(SIGNATURE);
    out.extend_from_slice(&font.flavor.to_be_bytes());
    // Length is patched once padding is known.
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&(font.tables.len() as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&font.total_size().to_be_bytes());
    out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&[0u8; 20]);
    out.extend_from_slice(&directory);
    out.extend_from_slice(&compressed);
    out.resize(super::sfnt::pad4(out.len()), 0);

    let length = (out.len() as u32).to_be_bytes();
    out[8..12].copy_from_slice(&length);

    Ok(out)
}

/// Append `value` as a UIntBase128: big-endian groups of seven bits, high
/// bit set on every byte but the last, no leading zero groups.
pub fn write_base128(out: &mut Vec<u8>, mut value: u32) {
    let mut groups = [0u8; 5];
    let mut len = 0;
    loop {
        groups[len] = (value & 0x7F) as u8;
        len += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | continuation);
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut writer = brotli::CompressorWriter::new(
        Vec::new(),
        BROTLI_BUFFER,
        BROTLI_QUALITY,
        BROTLI_WINDOW,
    );
    writer.write_all(data).map_err(|e| e.to_string())?;
    Ok(writer.into_inner())
}
