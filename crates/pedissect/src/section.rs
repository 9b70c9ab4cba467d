//! Section table.

use log::debug;

use crate::error::{PeError, Result};
use crate::headers::NtHeaders;
use crate::reader::ImageReader;

/// Size of one `IMAGE_SECTION_HEADER`.
pub const SECTION_HEADER_SIZE: usize = 40;

/// Section characteristics flags.
pub mod characteristics {
    pub const CNT_CODE: u32 = 0x0000_0020;
    pub const CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
    pub const CNT_UNINITIALIZED_DATA: u32 = 0x0000_0080;
    pub const MEM_DISCARDABLE: u32 = 0x0200_0000;
    pub const MEM_SHARED: u32 = 0x1000_0000;
    pub const MEM_EXECUTE: u32 = 0x2000_0000;
    pub const MEM_READ: u32 = 0x4000_0000;
    pub const MEM_WRITE: u32 = 0x8000_0000;
}

/// A single section header (40 bytes in the file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SectionHeader {
    /// Raw 8-byte name (may or may not be null-terminated).
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_name"))]
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

impl SectionHeader {
    /// Decode the section header at `offset`.
    pub fn parse(reader: &ImageReader<'_>, offset: usize) -> Result<Self> {
        reader.check_range(offset, SECTION_HEADER_SIZE)?;
        Ok(SectionHeader {
            name: reader.read_array(offset)?,
            virtual_size: reader.read_u32(offset + 8)?,
            virtual_address: reader.read_u32(offset + 12)?,
            size_of_raw_data: reader.read_u32(offset + 16)?,
            pointer_to_raw_data: reader.read_u32(offset + 20)?,
            pointer_to_relocations: reader.read_u32(offset + 24)?,
            pointer_to_linenumbers: reader.read_u32(offset + 28)?,
            number_of_relocations: reader.read_u16(offset + 32)?,
            number_of_linenumbers: reader.read_u16(offset + 34)?,
            characteristics: reader.read_u32(offset + 36)?,
        })
    }

    /// The section name with trailing NULs trimmed.  An 8-byte name has no
    /// terminator at all.
    pub fn name_str(&self) -> String {
        name_to_string(&self.name)
    }

    /// `VirtualAddress <= rva < VirtualAddress + VirtualSize`, without
    /// overflow.  A section with a zero `VirtualSize` maps nothing, whatever
    /// its raw size.
    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.virtual_address
            && u64::from(rva) < u64::from(self.virtual_address) + u64::from(self.virtual_size)
    }

    pub fn is_code(&self) -> bool {
        self.characteristics & characteristics::CNT_CODE != 0
    }

    pub fn is_executable(&self) -> bool {
        self.characteristics & characteristics::MEM_EXECUTE != 0
    }

    pub fn is_readable(&self) -> bool {
        self.characteristics & characteristics::MEM_READ != 0
    }

    pub fn is_writable(&self) -> bool {
        self.characteristics & characteristics::MEM_WRITE != 0
    }

    /// `R`/`W`/`X` summary of the memory flags, e.g. `"R-X"`.
    pub fn permissions(&self) -> String {
        [
            (self.is_readable(), 'R'),
            (self.is_writable(), 'W'),
            (self.is_executable(), 'X'),
        ]
        .iter()
        .map(|&(set, c)| if set { c } else { '-' })
        .collect()
    }
}

fn name_to_string(name: &[u8; 8]) -> String {
    let len = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    String::from_utf8_lossy(&name[..len]).into_owned()
}

#[cfg(feature = "serde")]
fn serialize_name<S>(name: &[u8; 8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&name_to_string(name))
}

/// Read `NumberOfSections` headers from the table that follows the optional
/// header, in file order.
pub fn parse_sections(
    reader: &ImageReader<'_>,
    nt: &NtHeaders,
    max_sections: usize,
) -> Result<Vec<SectionHeader>> {
    let count = usize::from(nt.file_header.number_of_sections);
    if count > max_sections {
        return Err(PeError::TooManySections {
            count,
            limit: max_sections,
        });
    }

    let table = nt.section_table_offset();
    let mut sections = Vec::with_capacity(count);
    for i in 0..count {
        let section = SectionHeader::parse(reader, table + i * SECTION_HEADER_SIZE)?;
        debug!(
            "section {} {:<8} va=0x{:08X} vsize=0x{:08X} raw=0x{:08X} rsize=0x{:08X}",
            i,
            section.name_str(),
            section.virtual_address,
            section.virtual_size,
            section.pointer_to_raw_data,
            section.size_of_raw_data
        );
        sections.push(section);
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{FileHeader, OptionalHeader};

    fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
        buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// NT headers whose section table starts at `0x18 + size_of_optional_header`.
    fn nt_with(number_of_sections: u16, size_of_optional_header: u16) -> NtHeaders {
        NtHeaders {
            offset: 0,
            signature: 0x4550,
            file_header: FileHeader {
                number_of_sections,
                size_of_optional_header,
                ..FileHeader::default()
            },
            optional_header: OptionalHeader::default(),
        }
    }

    fn write_section(
        buf: &mut [u8],
        at: usize,
        name: &[u8],
        va: u32,
        vsize: u32,
        raw: u32,
        rsize: u32,
    ) {
        buf[at..at + name.len()].copy_from_slice(name);
        put_u32(buf, at + 8, vsize);
        put_u32(buf, at + 12, va);
        put_u32(buf, at + 16, rsize);
        put_u32(buf, at + 20, raw);
        put_u32(buf, at + 36, 0x6000_0020);
    }

    #[test]
    fn table_starts_after_declared_optional_header() {
        // An optional header 8 bytes longer than usual still places the
        // table exactly where SizeOfOptionalHeader says.
        let opt_size = 0xE0 + 8;
        let nt = nt_with(2, opt_size);
        let table = nt.section_table_offset();
        assert_eq!(table, 0x18 + opt_size as usize);

        let mut buf = vec![0u8; table + 2 * SECTION_HEADER_SIZE];
        write_section(&mut buf, table, b".text", 0x1000, 0x800, 0x400, 0x800);
        write_section(&mut buf, table + 40, b".rdata\0\0", 0x2000, 0x300, 0xC00, 0x400);

        let sections = parse_sections(&ImageReader::new(&buf), &nt, 96).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name_str(), ".text");
        assert_eq!(sections[0].virtual_address, 0x1000);
        assert_eq!(sections[0].pointer_to_raw_data, 0x400);
        assert_eq!(sections[1].name_str(), ".rdata");
        assert_eq!(sections[1].size_of_raw_data, 0x400);
        assert_eq!(sections[1].characteristics, 0x6000_0020);
        assert_eq!(sections[0].permissions(), "R-X");
        assert!(sections[0].is_code());
    }

    #[test]
    fn truncated_table_is_out_of_bounds() {
        let nt = nt_with(2, 0xE0);
        let table = nt.section_table_offset();
        let buf = vec![0u8; table + SECTION_HEADER_SIZE + 10];
        assert!(matches!(
            parse_sections(&ImageReader::new(&buf), &nt, 96).unwrap_err(),
            PeError::OutOfBounds { .. }
        ));
    }

    #[test]
    fn section_count_is_capped() {
        let nt = nt_with(0xFFFF, 0xE0);
        assert_eq!(
            parse_sections(&ImageReader::new(&[]), &nt, 96).unwrap_err(),
            PeError::TooManySections {
                count: 0xFFFF,
                limit: 96,
            }
        );
    }

    #[test]
    fn zero_sections_is_fine() {
        let nt = nt_with(0, 0xE0);
        assert!(parse_sections(&ImageReader::new(&[]), &nt, 96)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn full_eight_byte_name() {
        let header = SectionHeader {
            name: *b"longname",
            ..SectionHeader::default()
        };
        assert_eq!(header.name_str(), "longname");
    }

    #[test]
    fn contains_rva_uses_half_open_range() {
        let section = SectionHeader {
            virtual_address: 0x1000,
            virtual_size: 0x100,
            size_of_raw_data: 0x200,
            ..SectionHeader::default()
        };
        assert!(!section.contains_rva(0xFFF));
        assert!(section.contains_rva(0x1000));
        assert!(section.contains_rva(0x10FF));
        assert!(!section.contains_rva(0x1100));
    }

    #[test]
    fn zero_virtual_size_maps_nothing() {
        let section = SectionHeader {
            virtual_address: 0x1000,
            virtual_size: 0,
            size_of_raw_data: 0x200,
            ..SectionHeader::default()
        };
        assert!(!section.contains_rva(0x1000));
        assert!(!section.contains_rva(0x1001));
        assert!(!section.contains_rva(0x11FF));
    }

    #[test]
    fn range_at_top_of_address_space_does_not_overflow() {
        let section = SectionHeader {
            virtual_address: 0xFFFF_F000,
            virtual_size: 0x2000,
            ..SectionHeader::default()
        };
        assert!(section.contains_rva(u32::MAX));
    }
}
