//! Font file container parsing.
//!
//! Handles the table directory of single OpenType fonts and the header of
//! font collections, exposing each face as an enumerable, tag-searchable set
//! of table records. Unrecognised containers degrade to a zero-face
//! [`FontFile`] rather than a parse failure, so callers can still report the
//! format gracefully.

use crate::binary::read::{CheckIndex, ReadArray, ReadBinary, ReadCtxt, ReadFrom, ReadScope};
use crate::binary::U32Be;
use crate::error::ParseError;
use crate::size;
use crate::tag;

use std::borrow::Cow;

/// Magic value identifying a CFF font (`OTTO`)
pub const CFF_MAGIC: u32 = tag::OTTO;

/// Magic number identifying TrueType 1.0
///
/// The version number 1.0 as a 16.16 fixed-point value, indicating TrueType glyph data.
pub const TTF_MAGIC: u32 = 0x00010000;

/// Magic value identifying a TrueType font collection `ttcf`
pub const TTCF_MAGIC: u32 = tag::TTCF;

/// The interface through which shaping logic consumes font tables.
pub trait FontTableProvider {
    /// Return data for the specified table if present
    fn table_data<'a>(&'a self, tag: u32) -> Result<Option<Cow<'a, [u8]>>, ParseError>;

    fn has_table(&self, tag: u32) -> bool;

    fn read_table_data<'a>(&'a self, tag: u32) -> Result<Cow<'a, [u8]>, ParseError> {
        self.table_data(tag)?.ok_or(ParseError::MissingValue)
    }
}

/// Exposes the sfnt version of a font.
pub trait SfntVersion {
    fn sfnt_version(&self) -> u32;
}

/// The flavor of a font file, determined from its leading version tag.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FontKind {
    /// OpenType font with TrueType outlines.
    TrueType,
    /// OpenType font with CFF outlines.
    Cff,
    /// A collection of fonts.
    Collection,
    /// Not a recognised font container.
    Unknown,
}

/// A font file: a single font, a collection of fonts, or an unrecognised container.
pub struct FontFile<'a> {
    pub scope: ReadScope<'a>,
    pub data: FontData<'a>,
}

pub enum FontData<'a> {
    Single(FaceDirectory<'a>),
    Collection(CollectionHeader<'a>),
    /// The unrecognised leading tag. Yields a degenerate zero-face file.
    Unknown(u32),
}

/// Font collection header
pub struct CollectionHeader<'a> {
    pub major_version: u16,
    pub minor_version: u16,
    face_offsets: ReadArray<'a, U32Be>,
}

/// The table directory of a single face
///
/// <https://docs.microsoft.com/en-us/typography/opentype/spec/otff#organization-of-an-opentype-font>
#[derive(Clone)]
pub struct FaceDirectory<'a> {
    pub sfnt_version: u32,
    pub search_range: u16,
    pub entry_selector: u16,
    pub range_shift: u16,
    table_records: ReadArray<'a, TableRecord>,
}

/// Implementation of `FontTableProvider` for a single face of a font file.
pub struct FaceTableProvider<'a> {
    scope: ReadScope<'a>,
    face: FaceDirectory<'a>,
}

/// An entry in a face's table directory
///
/// Offsets are relative to the start of the font file.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Hash)]
pub struct TableRecord {
    pub table_tag: u32,
    pub checksum: u32,
    pub offset: u32,
    pub length: u32,
}

impl<'a> FontFile<'a> {
    pub fn kind(&self) -> FontKind {
        match &self.data {
            FontData::Single(face) => match face.sfnt_version {
                CFF_MAGIC => FontKind::Cff,
                _ => FontKind::TrueType,
            },
            FontData::Collection(_) => FontKind::Collection,
            FontData::Unknown(_) => FontKind::Unknown,
        }
    }

    /// The number of faces in this file.
    ///
    /// A single font has exactly one face; an unrecognised container has none.
    pub fn face_count(&self) -> usize {
        match &self.data {
            FontData::Single(_) => 1,
            FontData::Collection(header) => header.face_count(),
            FontData::Unknown(_) => 0,
        }
    }

    /// Read the table directory of the face at `index`.
    ///
    /// Collection faces are parsed lazily on each call.
    pub fn face(&self, index: usize) -> Result<FaceDirectory<'a>, ParseError> {
        match &self.data {
            FontData::Single(face) => match index {
                0 => Ok(face.clone()),
                _ => Err(ParseError::BadIndex),
            },
            FontData::Collection(header) => {
                let offset = header.face_offset(index)?;
                self.scope.offset(offset).read::<FaceDirectory<'_>>()
            }
            FontData::Unknown(_) => Err(ParseError::BadIndex),
        }
    }

    pub fn table_provider(&self, index: usize) -> Result<FaceTableProvider<'a>, ParseError> {
        let face = self.face(index)?;
        Ok(FaceTableProvider {
            scope: self.scope,
            face,
        })
    }
}

impl<'b> ReadBinary for FontFile<'b> {
    type HostType<'a> = FontFile<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let mut peek = ctxt.clone();
        let magic = peek.read_u32be()?;
        match magic {
            TTF_MAGIC | CFF_MAGIC => {
                let face = ctxt.read::<FaceDirectory<'_>>()?;
                let data = FontData::Single(face);
                Ok(FontFile { scope, data })
            }
            TTCF_MAGIC => {
                let header = ctxt.read::<CollectionHeader<'_>>()?;
                let data = FontData::Collection(header);
                Ok(FontFile { scope, data })
            }
            _ => Ok(FontFile {
                scope,
                data: FontData::Unknown(magic),
            }),
        }
    }
}

impl<'b> ReadBinary for CollectionHeader<'b> {
    type HostType<'a> = CollectionHeader<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let ttc_tag = ctxt.read_u32be()?;
        match ttc_tag {
            TTCF_MAGIC => {
                let major_version = ctxt.read_u16be()?;
                let minor_version = ctxt.read_u16be()?;
                ctxt.check_version(major_version == 1 || major_version == 2)?;
                let num_fonts = usize::try_from(ctxt.read_u32be()?)?;
                let face_offsets = ctxt.read_array::<U32Be>(num_fonts)?;
                Ok(CollectionHeader {
                    major_version,
                    minor_version,
                    face_offsets,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'b> ReadBinary for FaceDirectory<'b> {
    type HostType<'a> = FaceDirectory<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let sfnt_version = ctxt.read_u32be()?;
        match sfnt_version {
            TTF_MAGIC | CFF_MAGIC => {
                let num_tables = ctxt.read_u16be()?;
                let search_range = ctxt.read_u16be()?;
                let entry_selector = ctxt.read_u16be()?;
                let range_shift = ctxt.read_u16be()?;
                let table_records = ctxt.read_array::<TableRecord>(usize::from(num_tables))?;
                Ok(FaceDirectory {
                    sfnt_version,
                    search_range,
                    entry_selector,
                    range_shift,
                    table_records,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> CollectionHeader<'a> {
    pub fn face_count(&self) -> usize {
        self.face_offsets.len()
    }

    pub fn face_offset(&self, index: usize) -> Result<usize, ParseError> {
        self.face_offsets
            .check_index(index)
            .and_then(|()| self.face_offsets.read_item(index))
            .and_then(|offset| usize::try_from(offset).map_err(ParseError::from))
    }
}

impl<'a> FaceDirectory<'a> {
    pub fn table_count(&self) -> usize {
        self.table_records.len()
    }

    pub fn table_record(&self, index: usize) -> Result<TableRecord, ParseError> {
        self.table_records.read_item(index)
    }

    pub fn table_records(&self) -> impl Iterator<Item = TableRecord> + 'a {
        self.table_records.iter()
    }

    /// Find the record for `tag`, scanning in on-disk order.
    ///
    /// The format does not guarantee unique tags; the first match wins.
    pub fn find_table_record(&self, tag: u32) -> Option<TableRecord> {
        for table_record in &self.table_records {
            if table_record.table_tag == tag {
                return Some(table_record);
            }
        }
        None
    }

    /// Slice out the bytes of the table with `tag`, bounds-checked against `scope`.
    pub fn read_table(
        &self,
        scope: &ReadScope<'a>,
        tag: u32,
    ) -> Result<Option<ReadScope<'a>>, ParseError> {
        if let Some(table_record) = self.find_table_record(tag) {
            let table = table_record.read_table(scope)?;
            Ok(Some(table))
        } else {
            Ok(None)
        }
    }
}

impl TableRecord {
    pub const SIZE: usize = 4 * size::U32;

    pub fn read_table<'a>(&self, scope: &ReadScope<'a>) -> Result<ReadScope<'a>, ParseError> {
        let offset = usize::try_from(self.offset)?;
        let length = usize::try_from(self.length)?;
        scope.offset_length(offset, length)
    }
}

impl ReadFrom for TableRecord {
    type ReadType = ((U32Be, U32Be), (U32Be, U32Be));
    fn read_from(((table_tag, checksum), (offset, length)): ((u32, u32), (u32, u32))) -> Self {
        TableRecord {
            table_tag,
            checksum,
            offset,
            length,
        }
    }
}

impl<'a> FontTableProvider for FaceTableProvider<'a> {
    fn table_data<'b>(&'b self, tag: u32) -> Result<Option<Cow<'b, [u8]>>, ParseError> {
        self.face
            .read_table(&self.scope, tag)
            .map(|scope| scope.map(|scope| Cow::Borrowed(scope.data())))
    }

    fn has_table(&self, tag: u32) -> bool {
        self.face.find_table_record(tag).is_some()
    }
}

impl<'a> SfntVersion for FaceTableProvider<'a> {
    fn sfnt_version(&self) -> u32 {
        self.face.sfnt_version
    }
}

impl<T: FontTableProvider> FontTableProvider for Box<T> {
    fn table_data<'a>(&'a self, tag: u32) -> Result<Option<Cow<'a, [u8]>>, ParseError> {
        self.as_ref().table_data(tag)
    }

    fn has_table(&self, tag: u32) -> bool {
        self.as_ref().has_table(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum;
    use crate::tests::fontdata::{collection, single_font};

    #[test]
    fn test_read_single_font() {
        let data = single_font(TTF_MAGIC, &[(tag::GLYF, &[1, 2, 3, 4]), (tag::KERN, &[5, 6])]);
        let file = ReadScope::new(&data).read::<FontFile<'_>>().unwrap();

        assert_eq!(file.kind(), FontKind::TrueType);
        assert_eq!(file.face_count(), 1);

        let face = file.face(0).unwrap();
        assert_eq!(face.table_count(), 2);
        assert_eq!(face.table_record(2), Err(ParseError::BadIndex));
        assert_eq!(file.face(1).err(), Some(ParseError::BadIndex));

        let record = face.find_table_record(tag::KERN).unwrap();
        assert_eq!(record.table_tag, tag::KERN);
        assert_eq!(record.length, 2);
        let table = face.read_table(&file.scope, tag::KERN).unwrap().unwrap();
        assert_eq!(table.data(), &[5, 6]);

        assert!(face.read_table(&file.scope, tag::CMAP).unwrap().is_none());
    }

    #[test]
    fn test_single_font_cff_flavor() {
        let data = single_font(CFF_MAGIC, &[(tag::HEAD, &[0; 4])]);
        let file = ReadScope::new(&data).read::<FontFile<'_>>().unwrap();
        assert_eq!(file.kind(), FontKind::Cff);
    }

    #[test]
    fn test_record_checksums_match_table_data() {
        let data = single_font(TTF_MAGIC, &[(tag::GLYF, &[1, 2, 3, 4, 5])]);
        let file = ReadScope::new(&data).read::<FontFile<'_>>().unwrap();
        let face = file.face(0).unwrap();

        let record = face.find_table_record(tag::GLYF).unwrap();
        let table = record.read_table(&file.scope).unwrap();
        let sum = checksum::table_checksum(table.data()).unwrap();
        assert_eq!(record.checksum, sum.0);
    }

    #[test]
    fn test_duplicate_table_tags_first_match_wins() {
        let data = single_font(TTF_MAGIC, &[(tag::KERN, &[1, 1]), (tag::KERN, &[2, 2])]);
        let file = ReadScope::new(&data).read::<FontFile<'_>>().unwrap();
        let face = file.face(0).unwrap();

        let table = face.read_table(&file.scope, tag::KERN).unwrap().unwrap();
        assert_eq!(table.data(), &[1, 1]);
    }

    #[test]
    fn test_read_collection() {
        let data = collection(&[
            &[(tag::GLYF, &[1, 2, 3, 4])],
            &[(tag::GLYF, &[9, 9]), (tag::KERN, &[7, 7])],
        ]);
        let file = ReadScope::new(&data).read::<FontFile<'_>>().unwrap();

        assert_eq!(file.kind(), FontKind::Collection);
        assert_eq!(file.face_count(), 2);

        let face0 = file.face(0).unwrap();
        assert_eq!(face0.table_count(), 1);
        let face1 = file.face(1).unwrap();
        assert_eq!(face1.table_count(), 2);
        let table = face1.read_table(&file.scope, tag::KERN).unwrap().unwrap();
        assert_eq!(table.data(), &[7, 7]);

        assert_eq!(file.face(2).err(), Some(ParseError::BadIndex));
    }

    #[test]
    fn test_unknown_flavor_degenerate_directory() {
        let data = *b"wOF2rest";
        let file = ReadScope::new(&data).read::<FontFile<'_>>().unwrap();

        assert_eq!(file.kind(), FontKind::Unknown);
        assert_eq!(file.face_count(), 0);
        assert_eq!(file.face(0).err(), Some(ParseError::BadIndex));
        match file.data {
            FontData::Unknown(magic) => assert_eq!(magic, u32::from_be_bytes(*b"wOF2")),
            _ => panic!("expected FontData::Unknown"),
        }
    }

    #[test]
    fn test_truncated_directory() {
        let data = single_font(TTF_MAGIC, &[(tag::GLYF, &[1, 2, 3, 4])]);
        // Cut the directory off in the middle of its only table record
        let truncated = &data[..16];
        assert!(ReadScope::new(truncated).read::<FontFile<'_>>().is_err());
    }

    #[test]
    fn test_table_provider() {
        let data = single_font(TTF_MAGIC, &[(tag::GLYF, &[1, 2, 3, 4])]);
        let file = ReadScope::new(&data).read::<FontFile<'_>>().unwrap();
        let provider = file.table_provider(0).unwrap();

        assert_eq!(provider.sfnt_version(), TTF_MAGIC);
        assert!(provider.has_table(tag::GLYF));
        assert!(!provider.has_table(tag::CMAP));
        let glyf = provider.read_table_data(tag::GLYF).unwrap();
        assert_eq!(&*glyf, &[1, 2, 3, 4]);
        assert_eq!(
            provider.read_table_data(tag::CMAP),
            Err(ParseError::MissingValue)
        );
    }
}
