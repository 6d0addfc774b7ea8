#![warn(rust_2018_idioms)]

//! Structural core of an OpenType layout engine.
//!
//! `otlayout` reads the binary tables inside a font file without copying the
//! underlying bytes: the table directory (single fonts and collections), the
//! script/language-system/feature/lookup hierarchy shared by `GSUB` and
//! `GPOS`, and the glyph-class data in `GDEF`. Every nested table is exposed
//! as a bounds-checked view over the caller's buffer and re-derived on
//! access.
//!
//! The crate also provides [`idmap::IdMap`], a shared, fail-soft integer map
//! used by shaping logic for glyph-id remapping caches.

/// Reading of binary data.
pub mod binary;
/// Checksum calculation routines.
pub mod checksum;
pub mod error;
pub mod idmap;
pub mod layout;
pub mod size;
pub mod tables;
pub mod tag;
/// Shared test code.
#[cfg(test)]
pub mod tests;
