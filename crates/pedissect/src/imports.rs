//! Import directory walking.
//!
//! The import directory is an array of `IMAGE_IMPORT_DESCRIPTOR` records
//! ended by one whose `Name` is zero.  Each descriptor points at a thunk
//! array (the import lookup table, or the import address table when the
//! lookup table RVA is zero) ended by a zero entry.  A thunk with the
//! ordinal flag set imports by ordinal; otherwise it is the RVA of a
//! hint/name record:
//!
//! ```text
//! u16   Hint
//! char  Name[]   (NUL-terminated)
//! ```
//!
//! Both loops are capped by [`ParseOptions`] on top of their terminators.
//! A failure inside one module ends the walk there but keeps every module
//! resolved before it.

use std::fmt;

use log::{debug, trace, warn};

use crate::arch::Architecture;
use crate::error::{PeError, Result};
use crate::headers::DataDirectory;
use crate::options::ParseOptions;
use crate::reader::ImageReader;
use crate::rva::RvaResolver;

/// Size of an `IMAGE_IMPORT_DESCRIPTOR`.
pub const IMPORT_DESCRIPTOR_SIZE: usize = 20;

/// Bits 30..0 of a by-name thunk hold the hint/name RVA.
const NAME_RVA_MASK: u64 = 0x7FFF_FFFF;

/// One `IMAGE_IMPORT_DESCRIPTOR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImportDescriptor {
    /// RVA of the import lookup table.
    pub original_first_thunk: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    /// RVA of the module name.
    pub name: u32,
    /// RVA of the import address table.
    pub first_thunk: u32,
}

impl ImportDescriptor {
    pub fn parse(reader: &ImageReader<'_>, offset: usize) -> Result<Self> {
        reader.check_range(offset, IMPORT_DESCRIPTOR_SIZE)?;
        Ok(ImportDescriptor {
            original_first_thunk: reader.read_u32(offset)?,
            time_date_stamp: reader.read_u32(offset + 4)?,
            forwarder_chain: reader.read_u32(offset + 8)?,
            name: reader.read_u32(offset + 12)?,
            first_thunk: reader.read_u32(offset + 16)?,
        })
    }

    /// The descriptor array ends at the first entry without a name.
    pub fn is_terminator(&self) -> bool {
        self.name == 0
    }

    /// Thunk array to enumerate: the lookup table, or the address table for
    /// linkers that leave `OriginalFirstThunk` empty.
    pub fn lookup_table_rva(&self) -> u32 {
        if self.original_first_thunk != 0 {
            self.original_first_thunk
        } else {
            self.first_thunk
        }
    }
}

/// A raw, non-zero thunk value split by its ordinal flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThunkValue {
    Ordinal(u16),
    /// RVA of a hint/name record.
    NameRva(u32),
}

impl ThunkValue {
    pub fn classify(raw: u64, arch: Architecture) -> Self {
        if raw & arch.ordinal_flag() != 0 {
            ThunkValue::Ordinal((raw & 0xFFFF) as u16)
        } else {
            ThunkValue::NameRva((raw & NAME_RVA_MASK) as u32)
        }
    }
}

/// A resolved hint/name record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImportByName {
    /// RVA of the record (the hint, not the name).
    pub rva: u32,
    pub hint: u16,
    pub name: String,
}

/// How a single function is imported.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ThunkEntry {
    Ordinal(u16),
    Named(ImportByName),
}

impl ThunkEntry {
    pub fn name(&self) -> Option<&str> {
        match self {
            ThunkEntry::Named(by_name) => Some(&by_name.name),
            ThunkEntry::Ordinal(_) => None,
        }
    }

    pub fn ordinal(&self) -> Option<u16> {
        match self {
            ThunkEntry::Ordinal(ordinal) => Some(*ordinal),
            ThunkEntry::Named(_) => None,
        }
    }
}

impl fmt::Display for ThunkEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThunkEntry::Ordinal(ordinal) => write!(f, "#{ordinal}"),
            ThunkEntry::Named(by_name) => f.write_str(&by_name.name),
        }
    }
}

/// One imported function and the IAT slot the loader patches for it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImportedFunction {
    pub iat_rva: u32,
    pub entry: ThunkEntry,
}

/// A module named by an import descriptor and its imports, in table order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImportedModule {
    pub name: String,
    pub descriptor: ImportDescriptor,
    pub functions: Vec<ImportedFunction>,
}

impl ImportedModule {
    pub fn thunks(&self) -> impl Iterator<Item = &ThunkEntry> + '_ {
        self.functions.iter().map(|f| &f.entry)
    }

    pub fn imports_function(&self, name: &str) -> bool {
        self.thunks().any(|t| t.name() == Some(name))
    }
}

/// The modules resolved from the import directory, plus the error that
/// stopped the walk early, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImportTable {
    modules: Vec<ImportedModule>,
    #[cfg_attr(feature = "serde", serde(skip))]
    error: Option<PeError>,
}

impl ImportTable {
    pub fn modules(&self) -> &[ImportedModule] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// `MalformedImportTable` describing where the walk stopped.
    pub fn error(&self) -> Option<&PeError> {
        self.error.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Case-insensitive lookup; Windows module names are not case-sensitive.
    pub fn module(&self, name: &str) -> Option<&ImportedModule> {
        self.modules
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Total number of imported functions across all modules.
    pub fn function_count(&self) -> usize {
        self.modules.iter().map(|m| m.functions.len()).sum()
    }

    /// The modules, or the walk error if the table was malformed.
    pub fn into_result(self) -> Result<Vec<ImportedModule>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.modules),
        }
    }

    fn stop(&mut self, module_index: usize, source: PeError) {
        warn!("import walk stopped at module #{module_index}: {source}");
        self.error = Some(PeError::malformed_import(module_index, source));
    }
}

/// Walk the import directory described by `directory`.
///
/// A zero directory RVA means the image imports nothing.  Header and
/// section data are never touched; failures are recorded in the returned
/// table, tagged with the index of the descriptor being read.
pub fn walk_imports(
    reader: &ImageReader<'_>,
    resolver: &RvaResolver<'_>,
    directory: DataDirectory,
    options: &ParseOptions,
) -> ImportTable {
    let mut table = ImportTable::default();
    if !directory.is_present() {
        debug!("no import directory");
        return table;
    }

    let mut cursor = match resolver.resolve(directory.virtual_address, IMPORT_DESCRIPTOR_SIZE) {
        Ok(offset) => offset,
        Err(err) => {
            table.stop(0, err);
            return table;
        }
    };

    let walker = ModuleWalker {
        reader,
        resolver,
        options,
    };
    loop {
        let index = table.modules.len();
        let descriptor = match ImportDescriptor::parse(reader, cursor) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                table.stop(index, err);
                break;
            }
        };
        if descriptor.is_terminator() {
            break;
        }
        if index >= options.max_import_descriptors {
            table.stop(
                index,
                PeError::IterationLimit {
                    table: "import descriptor table",
                    limit: options.max_import_descriptors,
                },
            );
            break;
        }
        match walker.read_module(descriptor) {
            Ok(module) => {
                debug!(
                    "import #{index}: {} ({} functions)",
                    module.name,
                    module.functions.len()
                );
                table.modules.push(module);
            }
            Err(err) => {
                table.stop(index, err);
                break;
            }
        }
        cursor += IMPORT_DESCRIPTOR_SIZE;
    }
    table
}

struct ModuleWalker<'r, 'a> {
    reader: &'r ImageReader<'a>,
    resolver: &'r RvaResolver<'a>,
    options: &'r ParseOptions,
}

impl ModuleWalker<'_, '_> {
    /// Resolve the name and thunk array of a non-terminating descriptor.
    fn read_module(&self, descriptor: ImportDescriptor) -> Result<ImportedModule> {
        let name = self.read_name(descriptor.name)?;
        let functions = self.read_thunks(&descriptor)?;
        Ok(ImportedModule {
            name,
            descriptor,
            functions,
        })
    }

    fn read_name(&self, rva: u32) -> Result<String> {
        let offset = self.resolver.resolve(rva, 1)?;
        self.reader.read_string(offset, self.options.max_name_len)
    }

    fn read_thunks(&self, descriptor: &ImportDescriptor) -> Result<Vec<ImportedFunction>> {
        let arch = self.options.architecture;
        let width = arch.thunk_size();
        let limit = self.options.max_thunks_per_module;

        let mut offset = self.resolver.resolve(descriptor.lookup_table_rva(), width)?;
        let mut functions = Vec::new();
        loop {
            let raw = self.reader.read_word(offset, width)?;
            if raw == 0 {
                break;
            }
            if functions.len() >= limit {
                return Err(PeError::IterationLimit {
                    table: "import lookup table",
                    limit,
                });
            }

            let entry = match ThunkValue::classify(raw, arch) {
                ThunkValue::Ordinal(ordinal) => ThunkEntry::Ordinal(ordinal),
                ThunkValue::NameRva(rva) => ThunkEntry::Named(self.read_hint_name(rva)?),
            };
            let slot = (functions.len() * width) as u32;
            let iat_rva = descriptor.first_thunk.wrapping_add(slot);
            trace!("thunk 0x{raw:X} at 0x{offset:X} -> {entry} (IAT 0x{iat_rva:08X})");

            functions.push(ImportedFunction { iat_rva, entry });
            offset += width;
        }
        Ok(functions)
    }

    fn read_hint_name(&self, rva: u32) -> Result<ImportByName> {
        let offset = self.resolver.resolve(rva, 2)?;
        let hint = self.reader.read_u16(offset)?;
        let name = self.reader.read_string(offset + 2, self.options.max_name_len)?;
        Ok(ImportByName { rva, hint, name })
    }
}
