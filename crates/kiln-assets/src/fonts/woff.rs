//! WOFF 1.0 encoding: per-table zlib compression.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::sfnt::{pad4, Sfnt};

const SIGNATURE: &[u8; 4] = b"wOFF";
const HEADER_SIZE: usize = 44;
const ENTRY_SIZE: usize = 20;

/// Encode a parsed font as WOFF 1.0.
pub fn encode(font: &Sfnt<'_>) -> Result<Vec<u8>, String> {
    let mut entries = Vec::with_capacity(font.tables.len() * ENTRY_SIZE);
    let mut data = Vec::new();
    let data_start = HEADER_SIZE + ENTRY_SIZE * font.tables.len();

    for table in &font.tables {
        let compressed = compress(table.data)?;
        // Tables that do not shrink are stored as-is.
        let stored: &[u8] = if compressed.len() < table.data.len() {
            &compressed
        } else {
            table.data
        };

        let offset = data_start + data.len();
        entries.extend_from_slice(&table.tag);
        entries.extend_from_slice(&(offset as u32).to_be_bytes());
        entries.extend_from_slice(&(stored.len() as u32).to_be_bytes());
        entries.extend_from_slice(&(table.data.len() as u32).to_be_bytes());
        entries.extend_from_slice(&table.checksum.to_be_bytes());

        data.extend_from_slice(stored);
        data.resize(pad4(data.len()), 0);
    }

    let length = data_start + data.len();
    let mut out = Vec::with_capacity(length);
    out.extend_from_slice(SIGNATURE);
    out.extend_from_slice(&font.flavor.to_be_bytes());
    out.extend_from_slice(&(length as u32).to_be_bytes());
    out.extend_from_slice(&(font.tables.len() as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&font.total_size().to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    // No metadata or private data blocks.
    out.extend_from_slice(&[0u8; 20]);
    out.extend_from_slice(&entries);
    out.extend_from_slice(&data);

    Ok(out)
}

fn compress(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).map_err(|e| e.to_string())?;
    encoder.finish().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::super::sfnt::{self, fixture};
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    fn u32_at(data: &[u8], offset: usize) -> u32 {
        u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn writes_header() {
        let font = fixture::sample();
        let sfnt = sfnt::parse(&font).unwrap();

        let woff = encode(&sfnt).unwrap();

        assert_eq!(&woff[0..4], b"wOFF");
        assert_eq!(u32_at(&woff, 4), sfnt::FLAVOR_TRUETYPE);
        assert_eq!(u32_at(&woff, 8) as usize, woff.len());
        assert_eq!(&woff[12..14], &[0, 5]);
        assert_eq!(u32_at(&woff, 16), sfnt.total_size());
        assert_eq!(&woff[20..24], &[0, 1, 0, 0]);
        assert_eq!(woff.len() % 4, 0);
    }

    #[test]
    fn tables_round_trip_through_zlib_or_raw() {
        let font = fixture::sample();
        let sfnt = sfnt::parse(&font).unwrap();

        let woff = encode(&sfnt).unwrap();

        for (i, table) in sfnt.tables.iter().enumerate() {
            let entry = HEADER_SIZE + i * ENTRY_SIZE;
            assert_eq!(&woff[entry..entry + 4], &table.tag);

            let offset = u32_at(&woff, entry + 4) as usize;
            let comp_length = u32_at(&woff, entry + 8) as usize;
            let orig_length = u32_at(&woff, entry + 12) as usize;
            assert_eq!(offset % 4, 0);
            assert_eq!(orig_length, table.data.len());
            assert_eq!(u32_at(&woff, entry + 16), table.checksum);

            let stored = &woff[offset..offset + comp_length];
            let restored = if comp_length < orig_length {
                let mut out = Vec::new();
                ZlibDecoder::new(stored).read_to_end(&mut out).unwrap();
                out
            } else {
                stored.to_vec()
            };
            assert_eq!(restored, table.data);
        }
    }

    #[test]
    fn compresses_repetitive_tables() {
        let font = fixture::sample();
        let sfnt = sfnt::parse(&font).unwrap();

        let woff = encode(&sfnt).unwrap();

        let glyf = sfnt.tables.iter().position(|t| &t.tag == b"glyf").unwrap();
        let entry = HEADER_SIZE + glyf * ENTRY_SIZE;
        assert!(u32_at(&woff, entry + 8) < u32_at(&woff, entry + 12));
    }
}
