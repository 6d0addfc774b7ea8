// Shared between the unit tests and the integration tests, which is why
// everything is addressed relative to this file rather than the crate root.

#[allow(dead_code)]
pub mod writer {
    //! A big-endian byte writer for building synthetic font data in tests.

    #[derive(Clone, Copy)]
    pub enum TtfType {
        Raw(&'static [u8]),
        UInt8(u8),
        UInt16(u16),
        UInt32(u32),
    }

    pub fn convert(values: &[TtfType]) -> Vec<u8> {
        let mut data = Vec::with_capacity(256);
        for v in values {
            convert_type(*v, &mut data);
        }
        data
    }

    pub fn convert_type(value: TtfType, data: &mut Vec<u8>) {
        match value {
            TtfType::Raw(bytes) => data.extend_from_slice(bytes),
            TtfType::UInt8(n) => data.push(n),
            TtfType::UInt16(n) => data.extend_from_slice(&n.to_be_bytes()),
            TtfType::UInt32(n) => data.extend_from_slice(&n.to_be_bytes()),
        }
    }

    pub struct Writer {
        pub data: Vec<u8>,
    }

    impl Writer {
        pub fn new() -> Writer {
            Writer {
                data: Vec::with_capacity(256),
            }
        }

        pub fn offset(&self) -> usize {
            self.data.len()
        }

        pub fn write(&mut self, value: TtfType) {
            convert_type(value, &mut self.data);
        }
    }
}

#[allow(dead_code)]
pub mod fontdata {
    //! Builders for complete synthetic font files.
    //!
    //! Table data is long aligned and the directory records carry real
    //! checksums, so the output satisfies the same structural expectations
    //! as a font from disk.

    use super::writer::{TtfType::*, Writer};

    const TTCF_MAGIC: u32 = 0x74746366;
    const TTF_MAGIC: u32 = 0x00010000;
    const OFFSET_TABLE_SIZE: usize = 12;
    const TABLE_RECORD_SIZE: usize = 16;

    fn checksum(data: &[u8]) -> u32 {
        let mut sum = 0u32;
        for chunk in data.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            sum = sum.wrapping_add(u32::from_be_bytes(word));
        }
        sum
    }

    fn long_align(offset: usize) -> usize {
        (offset + 3) & !3
    }

    // searchRange, entrySelector, rangeShift as the OpenType spec defines them
    fn binary_search_fields(num_tables: usize) -> (u16, u16, u16) {
        let mut entry_selector = 0u16;
        while (1usize << (entry_selector + 1)) <= num_tables {
            entry_selector += 1;
        }
        let search_range = if num_tables == 0 {
            0
        } else {
            16 * (1u16 << entry_selector)
        };
        let range_shift = 16 * num_tables as u16 - search_range;
        (search_range, entry_selector, range_shift)
    }

    fn write_directory(w: &mut Writer, magic: u32, tables: &[(u32, &[u8])], data_start: usize) {
        let (search_range, entry_selector, range_shift) = binary_search_fields(tables.len());
        w.write(UInt32(magic));
        w.write(UInt16(tables.len() as u16));
        w.write(UInt16(search_range));
        w.write(UInt16(entry_selector));
        w.write(UInt16(range_shift));

        let mut offset = data_start;
        for (tag, data) in tables {
            w.write(UInt32(*tag));
            w.write(UInt32(checksum(data)));
            w.write(UInt32(offset as u32));
            w.write(UInt32(data.len() as u32));
            offset = long_align(offset + data.len());
        }
    }

    fn write_table_data(w: &mut Writer, tables: &[(u32, &[u8])]) {
        for (_, data) in tables {
            w.data.extend_from_slice(data);
            while w.offset() % 4 != 0 {
                w.write(UInt8(0));
            }
        }
    }

    /// A single-face font with the given flavor magic and tables, in the
    /// order given. Duplicate tags are emitted as-is.
    pub fn single_font(magic: u32, tables: &[(u32, &[u8])]) -> Vec<u8> {
        let data_start = OFFSET_TABLE_SIZE + TABLE_RECORD_SIZE * tables.len();
        let mut w = Writer::new();
        write_directory(&mut w, magic, tables, data_start);
        write_table_data(&mut w, tables);
        w.data
    }

    /// A font collection with one face directory per entry of `faces`.
    /// Table data is pooled after the directories; offsets are from the
    /// start of the file, as in a real collection.
    pub fn collection(faces: &[&[(u32, &[u8])]]) -> Vec<u8> {
        let header_size = OFFSET_TABLE_SIZE + 4 * faces.len();

        let mut directory_offsets = Vec::with_capacity(faces.len());
        let mut offset = header_size;
        for face in faces {
            directory_offsets.push(offset as u32);
            offset += OFFSET_TABLE_SIZE + TABLE_RECORD_SIZE * face.len();
        }
        let pool_start = offset;

        let mut w = Writer::new();
        w.write(UInt32(TTCF_MAGIC));
        w.write(UInt16(1)); // major version
        w.write(UInt16(0)); // minor version
        w.write(UInt32(faces.len() as u32));
        for directory_offset in &directory_offsets {
            w.write(UInt32(*directory_offset));
        }

        let mut data_start = pool_start;
        for face in faces {
            write_directory(&mut w, TTF_MAGIC, face, data_start);
            for (_, data) in *face {
                data_start = long_align(data_start + data.len());
            }
        }
        assert_eq!(w.offset(), pool_start);
        for face in faces {
            write_table_data(&mut w, face);
        }
        w.data
    }
}
