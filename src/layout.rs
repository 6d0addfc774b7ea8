//! Structural parsing of `GSUB`/`GPOS` layout tables and `GDEF` glyph classes.
//!
//! `GSUB` and `GPOS` share the same top-level structure: a script list, a
//! feature list, and a lookup list, each addressed by a 16-bit offset from
//! the table base. Every nested table here is exposed as a lazy view that is
//! re-derived on access; nothing is cached, so repeated access is idempotent
//! and no view can mutate another.

use crate::binary::read::{CheckIndex, ReadArray, ReadBinary, ReadCtxt, ReadFrom, ReadScope};
use crate::binary::{U16Be, U32Be};
use crate::error::ParseError;
use crate::tag;
use bitflags::bitflags;
use log::warn;
use std::marker::PhantomData;

pub enum GSUB {}
pub enum GPOS {}

/// Glyph class "no class", returned for glyphs a `ClassDef` does not cover.
pub const GLYPH_CLASS_NONE: u16 = 0;
pub const GLYPH_CLASS_BASE: u16 = 1;
pub const GLYPH_CLASS_LIGATURE: u16 = 2;
pub const GLYPH_CLASS_MARK: u16 = 3;
pub const GLYPH_CLASS_COMPONENT: u16 = 4;

/// Marker trait for the two table kinds sharing the layout-table schema.
pub trait LayoutTableType: Sized {
    /// The tag of this table in the font's table directory.
    const TAG: u32;

    /// Validate a lookup type code against the range this table defines.
    fn check_lookup_type(lookup_type: u16) -> Result<u16, ParseError>;
}

impl LayoutTableType for GSUB {
    const TAG: u32 = tag::GSUB;

    fn check_lookup_type(lookup_type: u16) -> Result<u16, ParseError> {
        match lookup_type {
            1..=8 => Ok(lookup_type),
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl LayoutTableType for GPOS {
    const TAG: u32 = tag::GPOS;

    fn check_lookup_type(lookup_type: u16) -> Result<u16, ParseError> {
        match lookup_type {
            1..=9 => Ok(lookup_type),
            _ => Err(ParseError::BadVersion),
        }
    }
}

/// GSUB and GPOS tables have the same top-level structure
pub struct LayoutTable<'a, T> {
    scope: ReadScope<'a>,
    pub major_version: u16,
    pub minor_version: u16,
    script_list_offset: u16,
    feature_list_offset: u16,
    lookup_list_offset: u16,
    phantom: PhantomData<T>,
}

/// A tagged record in a script, langsys, or feature list.
///
/// The offset is relative to the base of the list holding the record.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TagRecord {
    pub tag: u32,
    pub offset: u16,
}

/// A list of (tag, offset) records whose targets are decoded lazily.
///
/// Records are exposed in on-disk order. Tags are not guaranteed unique by
/// the format; tag search returns the first match.
pub struct RecordList<'a, T> {
    scope: ReadScope<'a>,
    records: ReadArray<'a, TagRecord>,
    phantom: PhantomData<T>,
}

pub struct ScriptTable<'a> {
    scope: ReadScope<'a>,
    default_langsys_offset: u16,
    langsys_records: RecordList<'a, LangSys<'a>>,
}

pub struct LangSys<'a> {
    lookup_order: u16, // reserved field, should be zero
    required_feature_index: u16,
    feature_indices: ReadArray<'a, U16Be>,
}

pub struct FeatureTable<'a> {
    feature_params: u16, // reserved field, should be zero
    lookup_indices: ReadArray<'a, U16Be>,
}

/// The lookup list: a 16-bit count followed by offsets, without tags.
pub struct LookupList<'a, T> {
    scope: ReadScope<'a>,
    lookup_offsets: ReadArray<'a, U16Be>,
    phantom: PhantomData<T>,
}

pub struct Lookup<'a, T: LayoutTableType> {
    scope: ReadScope<'a>,
    lookup_type: u16,
    flags: LookupFlags,
    mark_filtering_set: Option<u16>,
    subtable_offsets: ReadArray<'a, U16Be>,
    phantom: PhantomData<T>,
}

pub struct LookupSubtableIter<'a, 'b, T: LayoutTableType> {
    lookup: &'b Lookup<'a, T>,
    index: usize,
}

bitflags! {
    /// The flag word of a lookup.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct LookupFlags: u16 {
        const RIGHT_TO_LEFT = 0x0001;
        const IGNORE_BASE_GLYPHS = 0x0002;
        const IGNORE_LIGATURES = 0x0004;
        const IGNORE_MARKS = 0x0008;
        const USE_MARK_FILTERING_SET = 0x0010;
        const MARK_ATTACHMENT_TYPE_MASK = 0xFF00;
    }
}

pub struct GdefTable<'a> {
    pub opt_glyph_classdef: Option<ClassDef<'a>>,
    pub opt_mark_attach_classdef: Option<ClassDef<'a>>,
}

pub enum ClassDef<'a> {
    Format1 {
        start_glyph: u16,
        class_values: ReadArray<'a, U16Be>,
    },
    Format2 {
        class_ranges: ReadArray<'a, ClassRangeRecord>,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ClassRangeRecord {
    start_glyph: u16,
    end_glyph: u16,
    class_value: u16,
}

impl ReadFrom for TagRecord {
    type ReadType = (U32Be, U16Be);
    fn read_from((tag, offset): (u32, u16)) -> Self {
        TagRecord { tag, offset }
    }
}

impl<'b, T> ReadBinary for LayoutTable<'b, T> {
    type HostType<'a> = LayoutTable<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();

        let major_version = ctxt.read_u16be()?;
        let minor_version = ctxt.read_u16be()?;
        // We handle versions 1.x
        ctxt.check_version(major_version == 1)?;
        let script_list_offset = ctxt.read_u16be()?;
        let feature_list_offset = ctxt.read_u16be()?;
        let lookup_list_offset = ctxt.read_u16be()?;

        // Version 1.1 adds an offset to a FeatureVariations table, which is not read here.

        Ok(LayoutTable {
            scope,
            major_version,
            minor_version,
            script_list_offset,
            feature_list_offset,
            lookup_list_offset,
            phantom: PhantomData,
        })
    }
}

impl<'a, T: LayoutTableType> LayoutTable<'a, T> {
    /// Resolve a header offset. Zero means the list is absent.
    fn list_scope(&self, offset: u16) -> Result<Option<ReadScope<'a>>, ParseError> {
        let offset = usize::from(offset);
        if offset == 0 {
            Ok(None)
        } else if offset >= self.scope.data().len() {
            Err(ParseError::BadOffset)
        } else {
            Ok(Some(self.scope.offset(offset)))
        }
    }

    pub fn script_list(&self) -> Result<Option<RecordList<'a, ScriptTable<'a>>>, ParseError> {
        self.list_scope(self.script_list_offset)?
            .map(|scope| scope.read::<RecordList<'_, ScriptTable<'_>>>())
            .transpose()
    }

    pub fn feature_list(&self) -> Result<Option<RecordList<'a, FeatureTable<'a>>>, ParseError> {
        self.list_scope(self.feature_list_offset)?
            .map(|scope| scope.read::<RecordList<'_, FeatureTable<'_>>>())
            .transpose()
    }

    pub fn lookup_list(&self) -> Result<Option<LookupList<'a, T>>, ParseError> {
        self.list_scope(self.lookup_list_offset)?
            .map(|scope| scope.read::<LookupList<'_, T>>())
            .transpose()
    }

    pub fn find_script(&self, script_tag: u32) -> Result<Option<ScriptTable<'a>>, ParseError> {
        if let Some(script_list) = self.script_list()? {
            if let Some(script_table) = script_list.find(script_tag)? {
                return Ok(Some(script_table));
            }
        }
        Ok(None)
    }

    pub fn find_script_or_default(
        &self,
        script_tag: u32,
    ) -> Result<Option<ScriptTable<'a>>, ParseError> {
        if let Some(script_list) = self.script_list()? {
            if let Some(script_table) = script_list.find(script_tag)? {
                return Ok(Some(script_table));
            } else {
                return script_list.find(tag::DFLT);
            }
        }
        Ok(None)
    }

    pub fn feature_by_index(&self, feature_index: u16) -> Result<FeatureTable<'a>, ParseError> {
        match self.feature_list()? {
            Some(feature_list) => feature_list.get(usize::from(feature_index)),
            None => Err(ParseError::BadIndex),
        }
    }

    /// Find the feature with `feature_tag` among those a langsys declares.
    ///
    /// Out-of-range feature indices in the langsys are skipped so that one
    /// malformed entry does not hide the rest.
    pub fn find_langsys_feature(
        &self,
        langsys: &LangSys<'a>,
        feature_tag: u32,
    ) -> Result<Option<FeatureTable<'a>>, ParseError> {
        if let Some(feature_list) = self.feature_list()? {
            for feature_index in langsys.feature_indices() {
                let index = usize::from(feature_index);
                match feature_list.record(index) {
                    Ok(record) if record.tag == feature_tag => {
                        return feature_list.get(index).map(Some);
                    }
                    Ok(_) => {}
                    Err(err) => warn!("skipping invalid feature index {}: {}", feature_index, err),
                }
            }
        }
        Ok(None)
    }
}

impl<'b, T> ReadBinary for RecordList<'b, T> {
    type HostType<'a> = RecordList<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let count = usize::from(ctxt.read_u16be()?);
        let records = ctxt.read_array::<TagRecord>(count)?;
        Ok(RecordList {
            scope,
            records,
            phantom: PhantomData,
        })
    }
}

impl<'a, T> RecordList<'a, T> {
    fn new(scope: ReadScope<'a>, records: ReadArray<'a, TagRecord>) -> RecordList<'a, T> {
        RecordList {
            scope,
            records,
            phantom: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, index: usize) -> Result<TagRecord, ParseError> {
        self.records.read_item(index)
    }

    pub fn tag(&self, index: usize) -> Result<u32, ParseError> {
        self.record(index).map(|record| record.tag)
    }

    pub fn records(&self) -> impl Iterator<Item = TagRecord> + 'a {
        self.records.iter()
    }
}

impl<'a, T> RecordList<'a, T>
where
    T: ReadBinary,
{
    /// Decode the target of the record at `index`.
    ///
    /// The view is constructed on every call; nothing is cached.
    pub fn get(&self, index: usize) -> Result<T::HostType<'a>, ParseError> {
        let record = self.records.read_item(index)?;
        self.scope.offset(usize::from(record.offset)).read::<T>()
    }

    /// Decode the target of the first record with `tag`, in on-disk order.
    pub fn find(&self, tag: u32) -> Result<Option<T::HostType<'a>>, ParseError> {
        for record in self.records.iter() {
            if record.tag == tag {
                let table = self.scope.offset(usize::from(record.offset)).read::<T>()?;
                return Ok(Some(table));
            }
        }
        Ok(None)
    }
}

impl<'a, T> Clone for RecordList<'a, T> {
    fn clone(&self) -> Self {
        RecordList {
            scope: self.scope,
            records: self.records.clone(),
            phantom: PhantomData,
        }
    }
}

impl<'b> ReadBinary for ScriptTable<'b> {
    type HostType<'a> = ScriptTable<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let default_langsys_offset = ctxt.read_u16be()?;
        let langsys_count = usize::from(ctxt.read_u16be()?);
        // LangSys record offsets are relative to the script table base
        let records = ctxt.read_array::<TagRecord>(langsys_count)?;
        Ok(ScriptTable {
            scope,
            default_langsys_offset,
            langsys_records: RecordList::new(scope, records),
        })
    }
}

impl<'a> ScriptTable<'a> {
    /// An absent default language system is a valid, observable state, not an error.
    pub fn has_default_langsys(&self) -> bool {
        self.default_langsys_offset != 0
    }

    pub fn default_langsys(&self) -> Result<Option<LangSys<'a>>, ParseError> {
        if self.default_langsys_offset == 0 {
            Ok(None)
        } else {
            self.scope
                .offset(usize::from(self.default_langsys_offset))
                .read::<LangSys<'_>>()
                .map(Some)
        }
    }

    pub fn langsys_list(&self) -> RecordList<'a, LangSys<'a>> {
        self.langsys_records.clone()
    }

    pub fn find_langsys(&self, langsys_tag: u32) -> Result<Option<LangSys<'a>>, ParseError> {
        self.langsys_records.find(langsys_tag)
    }

    pub fn find_langsys_or_default(
        &self,
        opt_lang_tag: Option<u32>,
    ) -> Result<Option<LangSys<'a>>, ParseError> {
        match opt_lang_tag {
            Some(lang_tag) => match self.find_langsys(lang_tag)? {
                Some(langsys) => Ok(Some(langsys)),
                None => self.default_langsys(),
            },
            None => self.default_langsys(),
        }
    }
}

impl<'b> ReadBinary for LangSys<'b> {
    type HostType<'a> = LangSys<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let lookup_order = ctxt.read_u16be()?;
        let required_feature_index = ctxt.read_u16be()?;
        let feature_index_count = usize::from(ctxt.read_u16be()?);
        let feature_indices = ctxt.read_array::<U16Be>(feature_index_count)?;
        Ok(LangSys {
            lookup_order,
            required_feature_index,
            feature_indices,
        })
    }
}

impl<'a> LangSys<'a> {
    /// Sentinel value of the required-feature field meaning "no feature required".
    pub const NO_REQUIRED_FEATURE: u16 = 0xFFFF;

    /// The raw required-feature field, which may be the sentinel.
    pub fn required_feature_index(&self) -> u16 {
        self.required_feature_index
    }

    pub fn required_feature(&self) -> Option<u16> {
        match self.required_feature_index {
            Self::NO_REQUIRED_FEATURE => None,
            index => Some(index),
        }
    }

    pub fn lookup_order(&self) -> u16 {
        self.lookup_order
    }

    pub fn feature_index_count(&self) -> usize {
        self.feature_indices.len()
    }

    pub fn feature_index(&self, index: usize) -> Result<u16, ParseError> {
        self.feature_indices.read_item(index)
    }

    pub fn feature_indices(&self) -> impl Iterator<Item = u16> + 'a {
        self.feature_indices.iter()
    }
}

impl<'b> ReadBinary for FeatureTable<'b> {
    type HostType<'a> = FeatureTable<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let feature_params = ctxt.read_u16be()?;
        let lookup_index_count = usize::from(ctxt.read_u16be()?);
        let lookup_indices = ctxt.read_array::<U16Be>(lookup_index_count)?;
        Ok(FeatureTable {
            feature_params,
            lookup_indices,
        })
    }
}

impl<'a> FeatureTable<'a> {
    pub fn feature_params(&self) -> u16 {
        self.feature_params
    }

    pub fn lookup_index_count(&self) -> usize {
        self.lookup_indices.len()
    }

    pub fn lookup_index(&self, index: usize) -> Result<u16, ParseError> {
        self.lookup_indices.read_item(index)
    }

    pub fn lookup_indices(&self) -> impl Iterator<Item = u16> + 'a {
        self.lookup_indices.iter()
    }
}

impl<'b, T: LayoutTableType> ReadBinary for LookupList<'b, T> {
    type HostType<'a> = LookupList<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let lookup_count = usize::from(ctxt.read_u16be()?);
        let lookup_offsets = ctxt.read_array::<U16Be>(lookup_count)?;
        Ok(LookupList {
            scope,
            lookup_offsets,
            phantom: PhantomData,
        })
    }
}

impl<'a, T: LayoutTableType> LookupList<'a, T> {
    pub fn len(&self) -> usize {
        self.lookup_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup_offsets.is_empty()
    }

    /// Decode the lookup at `index`. The view is re-derived on every call.
    pub fn lookup(&self, index: usize) -> Result<Lookup<'a, T>, ParseError> {
        self.lookup_offsets.check_index(index)?;
        let offset = self.lookup_offsets.read_item(index)?;
        self.scope
            .offset(usize::from(offset))
            .read::<Lookup<'_, T>>()
    }
}

impl<'b, T: LayoutTableType> ReadBinary for Lookup<'b, T> {
    type HostType<'a> = Lookup<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let scope = ctxt.scope();
        let lookup_type = T::check_lookup_type(ctxt.read_u16be()?)?;
        let flags = LookupFlags::from_bits_retain(ctxt.read_u16be()?);
        let subtable_count = usize::from(ctxt.read_u16be()?);
        let subtable_offsets = ctxt.read_array::<U16Be>(subtable_count)?;
        let mark_filtering_set = if flags.contains(LookupFlags::USE_MARK_FILTERING_SET) {
            Some(ctxt.read_u16be()?)
        } else {
            None
        };
        Ok(Lookup {
            scope,
            lookup_type,
            flags,
            mark_filtering_set,
            subtable_offsets,
            phantom: PhantomData,
        })
    }
}

impl<'a, T: LayoutTableType> Lookup<'a, T> {
    pub fn lookup_type(&self) -> u16 {
        self.lookup_type
    }

    pub fn flags(&self) -> LookupFlags {
        self.flags
    }

    /// The mark-attachment type from the high byte of the flag word, zero if unset.
    pub fn mark_attachment_type(&self) -> u16 {
        (self.flags & LookupFlags::MARK_ATTACHMENT_TYPE_MASK).bits() >> 8
    }

    /// Present iff `USE_MARK_FILTERING_SET` is set in the flags.
    pub fn mark_filtering_set(&self) -> Option<u16> {
        self.mark_filtering_set
    }

    pub fn subtable_count(&self) -> usize {
        self.subtable_offsets.len()
    }

    /// The bytes of the subtable at `index`.
    ///
    /// Interpretation of the subtable depends on the lookup type and is the
    /// business of shaping logic.
    pub fn subtable(&self, index: usize) -> Result<ReadScope<'a>, ParseError> {
        let offset = self.subtable_offsets.read_item(index)?;
        Ok(self.scope.offset(usize::from(offset)))
    }

    pub fn subtables<'b>(&'b self) -> LookupSubtableIter<'a, 'b, T> {
        LookupSubtableIter {
            lookup: self,
            index: 0,
        }
    }
}

impl<'a, 'b, T: LayoutTableType> Iterator for LookupSubtableIter<'a, 'b, T> {
    type Item = ReadScope<'a>;

    fn next(&mut self) -> Option<ReadScope<'a>> {
        let offset = self.lookup.subtable_offsets.get_item(self.index)?;
        let subtable = self.lookup.scope.offset(usize::from(offset));
        self.index += 1;
        Some(subtable)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.lookup.subtable_offsets.len();
        if self.index < len {
            let upper = len - self.index;
            (upper, Some(upper))
        } else {
            (0, Some(0))
        }
    }
}

impl<'b> ReadBinary for GdefTable<'b> {
    type HostType<'a> = GdefTable<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        let table = ctxt.scope();

        let major_version = ctxt.read_u16be()?;
        ctxt.check_version(major_version == 1)?;
        let _minor_version = ctxt.read_u16be()?;
        let glyph_classdef_offset = usize::from(ctxt.read_u16be()?);
        let _attach_list_offset = usize::from(ctxt.read_u16be()?);
        let _lig_caret_list_offset = usize::from(ctxt.read_u16be()?);
        // MarkAttachClassDef was added in OpenType 1.2 without a version bump, so its
        // presence cannot be determined from the version alone. Like HarfBuzz we always
        // attempt to read the field.
        let mark_attach_classdef_offset = usize::from(ctxt.read_u16be()?);

        let gdef_header_size = 6 * crate::size::U16;

        // A zero offset, or one that points inside the fixed header, means no table.
        let opt_glyph_classdef = if glyph_classdef_offset < gdef_header_size {
            None
        } else {
            Some(table.offset(glyph_classdef_offset).read::<ClassDef<'_>>()?)
        };

        let opt_mark_attach_classdef = if mark_attach_classdef_offset < gdef_header_size {
            None
        } else {
            Some(
                table
                    .offset(mark_attach_classdef_offset)
                    .read::<ClassDef<'_>>()?,
            )
        };

        Ok(GdefTable {
            opt_glyph_classdef,
            opt_mark_attach_classdef,
        })
    }
}

impl<'a> GdefTable<'a> {
    /// The glyph class of `glyph`; `GLYPH_CLASS_NONE` on miss or absent sub-table.
    pub fn glyph_class(&self, glyph: u16) -> u16 {
        self.opt_glyph_classdef
            .as_ref()
            .map(|classdef| classdef.glyph_class_value(glyph))
            .unwrap_or(GLYPH_CLASS_NONE)
    }

    /// The mark-attachment class of `glyph`; zero on miss or absent sub-table.
    pub fn mark_attachment_class(&self, glyph: u16) -> u16 {
        self.opt_mark_attach_classdef
            .as_ref()
            .map(|classdef| classdef.glyph_class_value(glyph))
            .unwrap_or(0)
    }
}

impl ReadFrom for ClassRangeRecord {
    type ReadType = (U16Be, U16Be, U16Be);
    fn read_from((start_glyph, end_glyph, class_value): (u16, u16, u16)) -> Self {
        ClassRangeRecord {
            start_glyph,
            end_glyph,
            class_value,
        }
    }
}

impl<'b> ReadBinary for ClassDef<'b> {
    type HostType<'a> = ClassDef<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self::HostType<'a>, ParseError> {
        match ctxt.read_u16be()? {
            1 => {
                let start_glyph = ctxt.read_u16be()?;
                let glyph_count = ctxt.read_u16be()?;
                let class_values = ctxt.read_array::<U16Be>(usize::from(glyph_count))?;
                Ok(ClassDef::Format1 {
                    start_glyph,
                    class_values,
                })
            }
            2 => {
                let class_range_count = usize::from(ctxt.read_u16be()?);
                // Some fonts declare a range count that exceeds the bytes available for
                // the range array. Cap the length based on what is actually present.
                let class_ranges = match ctxt.read_array::<ClassRangeRecord>(class_range_count) {
                    Ok(class_ranges) => class_ranges,
                    Err(_) => {
                        warn!(
                            "class range count {} exceeds available bytes, truncating",
                            class_range_count
                        );
                        ctxt.read_array_upto::<ClassRangeRecord>(class_range_count)?
                    }
                };
                Ok(ClassDef::Format2 { class_ranges })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> ClassDef<'a> {
    /// The class of `glyph`. Total: any glyph not covered maps to class 0.
    pub fn glyph_class_value(&self, glyph: u16) -> u16 {
        match self {
            ClassDef::Format1 {
                start_glyph,
                class_values,
            } => {
                if glyph >= *start_glyph {
                    class_values
                        .get_item(usize::from(glyph - start_glyph))
                        .unwrap_or(GLYPH_CLASS_NONE)
                } else {
                    GLYPH_CLASS_NONE
                }
            }
            ClassDef::Format2 { class_ranges } => {
                for class_range in class_ranges {
                    if (glyph >= class_range.start_glyph) && (glyph <= class_range.end_glyph) {
                        return class_range.class_value;
                    }
                }
                GLYPH_CLASS_NONE
            }
        }
    }
}
