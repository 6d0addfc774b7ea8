#![deny(missing_docs)]

use std::num::Wrapping;

use crate::binary::read::ReadScope;
use crate::binary::U32Be;
use crate::error::ParseError;

/// Calculate a checksum of `data` according to the OpenType table checksum algorithm
///
/// An unaligned tail is treated as if the data were zero-padded to a 32-bit boundary, so the
/// function can be applied directly to raw table slices.
///
/// https://docs.microsoft.com/en-us/typography/opentype/spec/otff#calculating-checksums
pub fn table_checksum(data: &[u8]) -> Result<Wrapping<u32>, ParseError> {
    let mut ctxt = ReadScope::new(data).ctxt();
    let array = ctxt.read_array::<U32Be>(data.len() / 4)?;
    let mut sum: Wrapping<u32> = array.iter().map(Wrapping).sum();

    let tail = &data[data.len() / 4 * 4..];
    if !tail.is_empty() {
        let mut last = [0u8; 4];
        last[..tail.len()].copy_from_slice(tail);
        sum += Wrapping(u32::from_be_bytes(last));
    }

    Ok(sum)
}
