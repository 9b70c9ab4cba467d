//! Synthetic PE images for integration tests.
//!
//! Layout produced by [`ImageBuilder::build`]:
//!
//! ```text
//! 0x000  DOS header, e_lfanew = 0x80
//! 0x080  NT headers, 16 data directories
//! ....   section table (.text, then .idata when imports were added)
//! 0x400  .text   RVA 0x1000, 0x200 bytes
//! 0x600  .idata  RVA 0x2000: descriptors, then per module the lookup
//!        table, the address table, the name and hint/name records
//! ```

#![allow(dead_code)]

use pedissect::Architecture;

pub const PE_OFFSET: usize = 0x80;
pub const TEXT_RVA: u32 = 0x1000;
pub const TEXT_RAW: usize = 0x400;
pub const IDATA_RVA: u32 = 0x2000;
pub const IDATA_RAW: usize = 0x600;
pub const FILE_ALIGNMENT: usize = 0x200;
pub const DESCRIPTOR_SIZE: usize = 20;

pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn put_word(buf: &mut [u8], offset: usize, value: u64, arch: Architecture) {
    match arch {
        Architecture::X86 => put_u32(buf, offset, value as u32),
        Architecture::X64 => put_u64(buf, offset, value),
    }
}

fn put_cstr(buf: &mut [u8], offset: usize, s: &str) {
    buf[offset..offset + s.len()].copy_from_slice(s.as_bytes());
    buf[offset + s.len()] = 0;
}

fn align(value: usize, to: usize) -> usize {
    (value + to - 1) / to * to
}

#[derive(Debug, Clone)]
pub enum Import {
    Named { hint: u16, name: String },
    Ordinal(u16),
}

impl Import {
    pub fn named(hint: u16, name: &str) -> Self {
        Import::Named {
            hint,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct ModuleFixture {
    name: String,
    imports: Vec<Import>,
    lookup_table: bool,
}

/// File offsets of everything written for one imported module.
#[derive(Debug, Clone)]
pub struct ModuleLayout {
    pub descriptor: usize,
    pub name: usize,
    pub lookup_table: usize,
    pub address_table: usize,
    /// One entry per import; `None` for ordinals.
    pub hint_names: Vec<Option<usize>>,
}

#[derive(Debug, Clone)]
pub struct BuiltImage {
    pub bytes: Vec<u8>,
    pub arch: Architecture,
    pub optional_header: usize,
    pub section_table: usize,
    pub modules: Vec<ModuleLayout>,
    /// File offset of the zero descriptor that ends the table.
    pub terminator: usize,
}

impl BuiltImage {
    /// RVA of a file offset inside `.idata`.
    pub fn idata_rva(&self, offset: usize) -> u32 {
        IDATA_RVA + (offset - IDATA_RAW) as u32
    }

    pub fn put_u16(&mut self, offset: usize, value: u16) {
        put_u16(&mut self.bytes, offset, value);
    }

    pub fn put_u32(&mut self, offset: usize, value: u32) {
        put_u32(&mut self.bytes, offset, value);
    }
}

#[derive(Debug, Clone)]
pub struct ImageBuilder {
    arch: Architecture,
    machine: u16,
    characteristics: u16,
    modules: Vec<ModuleFixture>,
}

impl ImageBuilder {
    pub fn new(arch: Architecture) -> Self {
        let (machine, characteristics) = match arch {
            Architecture::X86 => (0x014C, 0x0102),
            Architecture::X64 => (0x8664, 0x0022),
        };
        Self {
            arch,
            machine,
            characteristics,
            modules: Vec::new(),
        }
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    pub fn dll(mut self) -> Self {
        self.characteristics |= 0x2000;
        self
    }

    pub fn module(mut self, name: &str, imports: &[Import]) -> Self {
        self.modules.push(ModuleFixture {
            name: name.to_string(),
            imports: imports.to_vec(),
            lookup_table: true,
        });
        self
    }

    /// A module whose descriptor has `OriginalFirstThunk == 0`.
    pub fn module_without_lookup_table(mut self, name: &str, imports: &[Import]) -> Self {
        self.modules.push(ModuleFixture {
            name: name.to_string(),
            imports: imports.to_vec(),
            lookup_table: false,
        });
        self
    }

    pub fn build(&self) -> BuiltImage {
        let arch = self.arch;
        let w = arch.thunk_size();
        let has_idata = !self.modules.is_empty();

        // Lay out .idata relative to its start.
        let mut cursor = (self.modules.len() + 1) * DESCRIPTOR_SIZE;
        let mut layouts = Vec::new();
        for (i, module) in self.modules.iter().enumerate() {
            cursor = align(cursor, 8);
            let table_len = (module.imports.len() + 1) * w;
            let lookup_table = cursor;
            cursor += table_len;
            let address_table = cursor;
            cursor += table_len;
            let name = cursor;
            cursor += module.name.len() + 1;
            let mut hint_names = Vec::new();
            for import in &module.imports {
                match import {
                    Import::Named { name, .. } => {
                        cursor = align(cursor, 2);
                        hint_names.push(Some(IDATA_RAW + cursor));
                        cursor += 2 + name.len() + 1;
                    }
                    Import::Ordinal(_) => hint_names.push(None),
                }
            }
            layouts.push(ModuleLayout {
                descriptor: IDATA_RAW + i * DESCRIPTOR_SIZE,
                name: IDATA_RAW + name,
                lookup_table: IDATA_RAW + lookup_table,
                address_table: IDATA_RAW + address_table,
                hint_names,
            });
        }
        let idata_virtual_size = cursor;
        let idata_raw_size = align(idata_virtual_size, FILE_ALIGNMENT);

        let total = if has_idata {
            IDATA_RAW + idata_raw_size
        } else {
            TEXT_RAW + FILE_ALIGNMENT
        };
        let mut buf = vec![0u8; total];

        // DOS header
        put_u16(&mut buf, 0x00, 0x5A4D);
        put_u16(&mut buf, 0x02, 0x0090);
        put_u16(&mut buf, 0x04, 0x0003);
        put_u16(&mut buf, 0x08, 0x0004);
        put_u16(&mut buf, 0x0C, 0xFFFF);
        put_u16(&mut buf, 0x10, 0x00B8);
        put_u16(&mut buf, 0x18, 0x0040);
        put_u32(&mut buf, 0x3C, PE_OFFSET as u32);

        // NT signature + COFF header
        let number_of_sections: u16 = if has_idata { 2 } else { 1 };
        let optional_size = arch.optional_header_fixed_size() + 16 * 8;
        put_u32(&mut buf, PE_OFFSET, 0x0000_4550);
        let fh = PE_OFFSET + 4;
        put_u16(&mut buf, fh, self.machine);
        put_u16(&mut buf, fh + 2, number_of_sections);
        put_u32(&mut buf, fh + 4, 0x5F5E_0F00);
        put_u16(&mut buf, fh + 16, optional_size as u16);
        put_u16(&mut buf, fh + 18, self.characteristics);

        // Optional header
        let oh = fh + 20;
        put_u16(&mut buf, oh, arch.optional_magic());
        buf[oh + 2] = 14;
        put_u32(&mut buf, oh + 4, FILE_ALIGNMENT as u32);
        put_u32(&mut buf, oh + 16, TEXT_RVA);
        put_u32(&mut buf, oh + 20, TEXT_RVA);
        match arch {
            Architecture::X86 => {
                put_u32(&mut buf, oh + 24, IDATA_RVA);
                put_u32(&mut buf, oh + 28, 0x0040_0000);
            }
            Architecture::X64 => put_u64(&mut buf, oh + 24, 0x1_4000_0000),
        }
        put_u32(&mut buf, oh + 32, 0x1000);
        put_u32(&mut buf, oh + 36, FILE_ALIGNMENT as u32);
        put_u16(&mut buf, oh + 40, 6);
        put_u16(&mut buf, oh + 48, 6);
        put_u32(&mut buf, oh + 56, 0x3000);
        put_u32(&mut buf, oh + 60, TEXT_RAW as u32);
        put_u16(&mut buf, oh + 68, 3);
        put_u16(&mut buf, oh + 70, 0x8160);
        put_word(&mut buf, oh + 72, 0x10_0000, arch);
        put_word(&mut buf, oh + 72 + w, 0x1000, arch);
        put_word(&mut buf, oh + 72 + 2 * w, 0x10_0000, arch);
        put_word(&mut buf, oh + 72 + 3 * w, 0x1000, arch);
        put_u32(&mut buf, oh + 76 + 4 * w, 16);
        let directories = oh + 80 + 4 * w;
        if has_idata {
            put_u32(&mut buf, directories + 8, IDATA_RVA);
            let directory_size = (self.modules.len() + 1) * DESCRIPTOR_SIZE;
            put_u32(&mut buf, directories + 12, directory_size as u32);
        }

        // Section table
        let section_table = oh + optional_size;
        write_section(
            &mut buf,
            section_table,
            b".text",
            TEXT_RVA,
            0x10,
            TEXT_RAW,
            FILE_ALIGNMENT,
            0x6000_0020,
        );
        if has_idata {
            write_section(
                &mut buf,
                section_table + 40,
                b".idata",
                IDATA_RVA,
                idata_virtual_size as u32,
                IDATA_RAW,
                idata_raw_size,
                0xC000_0040,
            );
        }

        // Import data
        let rva = |offset: usize| IDATA_RVA + (offset - IDATA_RAW) as u32;
        for (module, layout) in self.modules.iter().zip(&layouts) {
            let d = layout.descriptor;
            if module.lookup_table {
                put_u32(&mut buf, d, rva(layout.lookup_table));
            }
            put_u32(&mut buf, d + 12, rva(layout.name));
            put_u32(&mut buf, d + 16, rva(layout.address_table));
            put_cstr(&mut buf, layout.name, &module.name);

            let records = module.imports.iter().zip(&layout.hint_names);
            for (i, (import, hint_name)) in records.enumerate() {
                let value = match (import, hint_name) {
                    (Import::Named { hint, name }, Some(at)) => {
                        put_u16(&mut buf, *at, *hint);
                        put_cstr(&mut buf, at + 2, name);
                        u64::from(rva(*at))
                    }
                    (Import::Ordinal(ordinal), _) => arch.ordinal_flag() | u64::from(*ordinal),
                    (Import::Named { .. }, None) => unreachable!("named import without record"),
                };
                if module.lookup_table {
                    put_word(&mut buf, layout.lookup_table + i * w, value, arch);
                }
                put_word(&mut buf, layout.address_table + i * w, value, arch);
            }
        }

        BuiltImage {
            bytes: buf,
            arch,
            optional_header: oh,
            section_table,
            terminator: IDATA_RAW + self.modules.len() * DESCRIPTOR_SIZE,
            modules: layouts,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn write_section(
    buf: &mut [u8],
    at: usize,
    name: &[u8],
    va: u32,
    vsize: u32,
    raw: usize,
    raw_size: usize,
    characteristics: u32,
) {
    buf[at..at + name.len()].copy_from_slice(name);
    put_u32(buf, at + 8, vsize);
    put_u32(buf, at + 12, va);
    put_u32(buf, at + 16, raw_size as u32);
    put_u32(buf, at + 20, raw as u32);
    put_u32(buf, at + 36, characteristics);
}
