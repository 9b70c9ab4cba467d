//! RVA to file offset translation.

use crate::error::{PeError, Result};
use crate::section::SectionHeader;

/// Translates relative virtual addresses into offsets within the image
/// buffer, using the section table.
///
/// Sections are scanned in file order and the first one whose virtual range
/// contains the RVA wins.  Images carry few sections, so a linear scan is
/// all the lookup structure needed.
#[derive(Debug, Clone, Copy)]
pub struct RvaResolver<'a> {
    sections: &'a [SectionHeader],
    buffer_len: usize,
}

impl<'a> RvaResolver<'a> {
    pub fn new(sections: &'a [SectionHeader], buffer_len: usize) -> Self {
        Self {
            sections,
            buffer_len,
        }
    }

    /// The first section mapping `rva`, if any.
    pub fn section_for(&self, rva: u32) -> Option<&'a SectionHeader> {
        self.sections.iter().find(|s| s.contains_rva(rva))
    }

    /// File offset of `rva`, checked to have `len` readable bytes behind it.
    pub fn resolve(&self, rva: u32, len: usize) -> Result<usize> {
        let section = self.section_for(rva).ok_or(PeError::RvaNotMapped { rva })?;
        let delta = rva - section.virtual_address;
        let offset = u64::from(section.pointer_to_raw_data) + u64::from(delta);
        let fits = offset
            .checked_add(len as u64)
            .is_some_and(|end| end <= self.buffer_len as u64);
        if !fits {
            return Err(PeError::out_of_bounds(offset, len, self.buffer_len));
        }
        // `offset <= buffer_len` here, so it fits in usize.
        Ok(offset as usize)
    }
}
