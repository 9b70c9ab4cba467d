//! DOS, NT, file and optional headers.
//!
//! ```text
//! 0x0000          DOS header (64 bytes, e_lfanew at 0x3C)
//! e_lfanew        "PE\0\0"
//! e_lfanew + 4    COFF file header (20 bytes)
//! e_lfanew + 24   optional header (SizeOfOptionalHeader bytes)
//!                 section table follows
//! ```
//!
//! PE32 and PE32+ optional headers share one decoder: the only layout
//! differences are the pointer-sized fields, whose width comes from the
//! requested [`Architecture`].

use log::debug;

use crate::arch::Architecture;
use crate::error::{PeError, Result, SignatureKind};
use crate::reader::ImageReader;

// ---------------------------------------------------------------------------
// Well-known constants
// ---------------------------------------------------------------------------

/// `MZ`
pub const DOS_MAGIC: u16 = 0x5A4D;
/// `PE\0\0`
pub const PE_SIGNATURE: u32 = 0x0000_4550;

pub const DOS_HEADER_SIZE: usize = 64;
pub const FILE_HEADER_SIZE: usize = 20;
pub const DATA_DIRECTORY_SIZE: usize = 8;
pub const NUMBER_OF_DIRECTORY_ENTRIES: usize = 16;

pub const DIRECTORY_ENTRY_EXPORT: usize = 0;
pub const DIRECTORY_ENTRY_IMPORT: usize = 1;

/// COFF `Machine` values.
pub mod machine {
    pub const UNKNOWN: u16 = 0x0000;
    pub const I386: u16 = 0x014C;
    pub const ARM: u16 = 0x01C0;
    pub const ARMNT: u16 = 0x01C4;
    pub const IA64: u16 = 0x0200;
    pub const AMD64: u16 = 0x8664;
    pub const ARM64: u16 = 0xAA64;
}

/// COFF `Characteristics` flags.
pub mod file_characteristics {
    pub const RELOCS_STRIPPED: u16 = 0x0001;
    pub const EXECUTABLE_IMAGE: u16 = 0x0002;
    pub const LARGE_ADDRESS_AWARE: u16 = 0x0020;
    pub const MACHINE_32BIT: u16 = 0x0100;
    pub const DEBUG_STRIPPED: u16 = 0x0200;
    pub const SYSTEM: u16 = 0x1000;
    pub const DLL: u16 = 0x2000;
}

/// Display names for the data-directory slots, by index.
pub const DIRECTORY_NAMES: [&str; NUMBER_OF_DIRECTORY_ENTRIES] = [
    "Export",
    "Import",
    "Resource",
    "Exception",
    "Security",
    "Relocation",
    "Debug",
    "Architecture",
    "GlobalPtr",
    "TLS",
    "LoadConfig",
    "BoundImport",
    "IAT",
    "DelayImport",
    "CLR",
    "Reserved",
];

// ---------------------------------------------------------------------------
// Structures
// ---------------------------------------------------------------------------

/// `IMAGE_DOS_HEADER`, every field, for diagnostic display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DosHeader {
    pub e_magic: u16,
    pub e_cblp: u16,
    pub e_cp: u16,
    pub e_crlc: u16,
    pub e_cparhdr: u16,
    pub e_minalloc: u16,
    pub e_maxalloc: u16,
    pub e_ss: u16,
    pub e_sp: u16,
    pub e_csum: u16,
    pub e_ip: u16,
    pub e_cs: u16,
    pub e_lfarlc: u16,
    pub e_ovno: u16,
    pub e_res: [u16; 4],
    pub e_oemid: u16,
    pub e_oeminfo: u16,
    pub e_res2: [u16; 10],
    /// Signed file offset of the NT headers.
    pub e_lfanew: i32,
}

impl DosHeader {
    pub fn has_valid_magic(&self) -> bool {
        self.e_magic == DOS_MAGIC
    }

    /// The named 16-bit fields plus `e_lfanew`, in file order, as
    /// `(name, value)` rows.  Reserved arrays are left out.
    pub fn fields(&self) -> [(&'static str, u32); 17] {
        [
            ("e_magic", self.e_magic.into()),
            ("e_cblp", self.e_cblp.into()),
            ("e_cp", self.e_cp.into()),
            ("e_crlc", self.e_crlc.into()),
            ("e_cparhdr", self.e_cparhdr.into()),
            ("e_minalloc", self.e_minalloc.into()),
            ("e_maxalloc", self.e_maxalloc.into()),
            ("e_ss", self.e_ss.into()),
            ("e_sp", self.e_sp.into()),
            ("e_csum", self.e_csum.into()),
            ("e_ip", self.e_ip.into()),
            ("e_cs", self.e_cs.into()),
            ("e_lfarlc", self.e_lfarlc.into()),
            ("e_ovno", self.e_ovno.into()),
            ("e_oemid", self.e_oemid.into()),
            ("e_oeminfo", self.e_oeminfo.into()),
            ("e_lfanew", self.e_lfanew as u32),
        ]
    }
}

/// COFF file header (`IMAGE_FILE_HEADER`, 20 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl FileHeader {
    pub fn is_dll(&self) -> bool {
        self.characteristics & file_characteristics::DLL != 0
    }

    pub fn is_executable(&self) -> bool {
        self.characteristics & file_characteristics::EXECUTABLE_IMAGE != 0
    }

    pub fn machine_name(&self) -> &'static str {
        match self.machine {
            machine::I386 => "x86",
            machine::AMD64 => "x86-64",
            machine::ARM64 => "ARM64",
            machine::ARM | machine::ARMNT => "ARM",
            machine::IA64 => "IA-64",
            machine::UNKNOWN => "unknown",
            _ => "other",
        }
    }
}

/// A single entry in the data-directory table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0
    }
}

/// Optional header for either width.  Pointer-sized fields are widened to
/// `u64`; `base_of_data` only exists in PE32 images.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct OptionalHeader {
    /// `0x010B` for PE32, `0x020B` for PE32+.
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: Option<u32>,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    /// Read as stored; never verified.
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
    /// The entries actually present in the file, at most 16.
    pub data_directories: Vec<DataDirectory>,
}

impl OptionalHeader {
    pub fn architecture(&self) -> Option<Architecture> {
        Architecture::from_magic(self.magic)
    }

    pub fn data_directory(&self, index: usize) -> DataDirectory {
        self.data_directories.get(index).copied().unwrap_or_default()
    }

    pub fn export_directory(&self) -> DataDirectory {
        self.data_directory(DIRECTORY_ENTRY_EXPORT)
    }

    pub fn import_directory(&self) -> DataDirectory {
        self.data_directory(DIRECTORY_ENTRY_IMPORT)
    }
}

/// NT headers: signature, file header and optional header, plus the file
/// offset they were found at.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NtHeaders {
    /// File offset of the `PE\0\0` signature (`e_lfanew`).
    pub offset: usize,
    pub signature: u32,
    pub file_header: FileHeader,
    pub optional_header: OptionalHeader,
}

impl NtHeaders {
    pub fn optional_header_offset(&self) -> usize {
        self.offset + 4 + FILE_HEADER_SIZE
    }

    /// Where the first section header lives.  `SizeOfOptionalHeader` is
    /// taken from the file: optional headers may carry extra directories.
    pub fn section_table_offset(&self) -> usize {
        self.optional_header_offset() + usize::from(self.file_header.size_of_optional_header)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Decode the 64-byte DOS header at the start of the buffer.
pub fn parse_dos_header(reader: &ImageReader<'_>) -> Result<DosHeader> {
    reader.check_range(0, DOS_HEADER_SIZE)?;

    let word = |index: usize| reader.read_u16(index * 2);
    let mut e_res = [0u16; 4];
    for (i, slot) in e_res.iter_mut().enumerate() {
        *slot = word(14 + i)?;
    }
    let mut e_res2 = [0u16; 10];
    for (i, slot) in e_res2.iter_mut().enumerate() {
        *slot = word(20 + i)?;
    }

    Ok(DosHeader {
        e_magic: word(0)?,
        e_cblp: word(1)?,
        e_cp: word(2)?,
        e_crlc: word(3)?,
        e_cparhdr: word(4)?,
        e_minalloc: word(5)?,
        e_maxalloc: word(6)?,
        e_ss: word(7)?,
        e_sp: word(8)?,
        e_csum: word(9)?,
        e_ip: word(10)?,
        e_cs: word(11)?,
        e_lfarlc: word(12)?,
        e_ovno: word(13)?,
        e_res,
        e_oemid: word(18)?,
        e_oeminfo: word(19)?,
        e_res2,
        e_lfanew: reader.read_i32(0x3C)?,
    })
}

/// Locate and validate the NT headers `dos` points at.
pub fn parse_nt_headers(
    reader: &ImageReader<'_>,
    dos: &DosHeader,
    arch: Architecture,
) -> Result<NtHeaders> {
    // e_lfanew must leave room for the signature.
    let offset = usize::try_from(dos.e_lfanew)
        .map_err(|_| PeError::out_of_bounds(u64::from(dos.e_lfanew as u32), 4, reader.len()))?;
    let signature = reader.read_u32(offset)?;
    if signature != PE_SIGNATURE {
        return Err(PeError::BadSignature {
            what: SignatureKind::Nt,
            expected: PE_SIGNATURE,
            found: signature,
        });
    }

    let file_header = parse_file_header(reader, offset + 4)?;
    debug!(
        "NT headers at 0x{:X}: machine=0x{:04X} sections={} optional_header_size={}",
        offset,
        file_header.machine,
        file_header.number_of_sections,
        file_header.size_of_optional_header
    );

    let optional_header = parse_optional_header(
        reader,
        offset + 4 + FILE_HEADER_SIZE,
        file_header.size_of_optional_header,
        arch,
    )?;

    Ok(NtHeaders {
        offset,
        signature,
        file_header,
        optional_header,
    })
}

/// Decode the 20-byte COFF header at `offset`.
pub fn parse_file_header(reader: &ImageReader<'_>, offset: usize) -> Result<FileHeader> {
    reader.check_range(offset, FILE_HEADER_SIZE)?;
    Ok(FileHeader {
        machine: reader.read_u16(offset)?,
        number_of_sections: reader.read_u16(offset + 2)?,
        time_date_stamp: reader.read_u32(offset + 4)?,
        pointer_to_symbol_table: reader.read_u32(offset + 8)?,
        number_of_symbols: reader.read_u32(offset + 12)?,
        size_of_optional_header: reader.read_u16(offset + 16)?,
        characteristics: reader.read_u16(offset + 18)?,
    })
}

/// Decode the optional header at `offset` as the requested width.
///
/// Fails with `UnsupportedFormat` when the magic names the other width (or
/// neither).  Data directories are read only as far as both
/// `NumberOfRvaAndSizes` and `SizeOfOptionalHeader` allow.
pub fn parse_optional_header(
    reader: &ImageReader<'_>,
    offset: usize,
    size_of_optional_header: u16,
    arch: Architecture,
) -> Result<OptionalHeader> {
    let magic = reader.read_u16(offset)?;
    if magic != arch.optional_magic() {
        return Err(PeError::UnsupportedFormat {
            magic,
            requested: arch,
        });
    }

    let fixed = arch.optional_header_fixed_size();
    reader.check_range(offset, fixed)?;

    let w = arch.word_size();
    let at = |rel: usize| offset + rel;
    let u16_at = |rel: usize| reader.read_u16(at(rel));
    let u32_at = |rel: usize| reader.read_u32(at(rel));
    let word_at = |rel: usize| reader.read_word(at(rel), w);

    // PE32 splits offset 24 into BaseOfData + a 32-bit ImageBase;
    // PE32+ uses it for a 64-bit ImageBase.
    let (base_of_data, image_base) = match arch {
        Architecture::X86 => (Some(u32_at(24)?), u64::from(u32_at(28)?)),
        Architecture::X64 => (None, reader.read_u64(at(24))?),
    };

    // Stack/heap sizes start at 72 and are pointer-sized; everything after
    // them shifts with the width.
    let loader_flags_rel = 72 + 4 * w;
    let number_of_rva_and_sizes = u32_at(loader_flags_rel + 4)?;
    let directories_rel = loader_flags_rel + 8;
    debug_assert_eq!(directories_rel, fixed);

    let room = usize::from(size_of_optional_header).saturating_sub(fixed) / DATA_DIRECTORY_SIZE;
    let count = (number_of_rva_and_sizes as usize)
        .min(NUMBER_OF_DIRECTORY_ENTRIES)
        .min(room);
    let mut data_directories = Vec::with_capacity(count);
    for i in 0..count {
        let base = at(directories_rel + i * DATA_DIRECTORY_SIZE);
        data_directories.push(DataDirectory {
            virtual_address: reader.read_u32(base)?,
            size: reader.read_u32(base + 4)?,
        });
    }

    let header = OptionalHeader {
        magic,
        major_linker_version: reader.read_u8(at(2))?,
        minor_linker_version: reader.read_u8(at(3))?,
        size_of_code: u32_at(4)?,
        size_of_initialized_data: u32_at(8)?,
        size_of_uninitialized_data: u32_at(12)?,
        address_of_entry_point: u32_at(16)?,
        base_of_code: u32_at(20)?,
        base_of_data,
        image_base,
        section_alignment: u32_at(32)?,
        file_alignment: u32_at(36)?,
        major_operating_system_version: u16_at(40)?,
        minor_operating_system_version: u16_at(42)?,
        major_image_version: u16_at(44)?,
        minor_image_version: u16_at(46)?,
        major_subsystem_version: u16_at(48)?,
        minor_subsystem_version: u16_at(50)?,
        win32_version_value: u32_at(52)?,
        size_of_image: u32_at(56)?,
        size_of_headers: u32_at(60)?,
        check_sum: u32_at(64)?,
        subsystem: u16_at(68)?,
        dll_characteristics: u16_at(70)?,
        size_of_stack_reserve: word_at(72)?,
        size_of_stack_commit: word_at(72 + w)?,
        size_of_heap_reserve: word_at(72 + 2 * w)?,
        size_of_heap_commit: word_at(72 + 3 * w)?,
        loader_flags: u32_at(loader_flags_rel)?,
        number_of_rva_and_sizes,
        data_directories,
    };

    debug!(
        "optional header ({}): entry=0x{:08X} image_base=0x{:X} directories={}",
        arch,
        header.address_of_entry_point,
        header.image_base,
        header.data_directories.len()
    );
    Ok(header)
}
