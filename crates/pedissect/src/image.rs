//! Top-level parse entry points.

use log::debug;

use crate::arch::Architecture;
use crate::error::{PeError, Result, SignatureKind};
use crate::headers::{self, DosHeader, NtHeaders, DOS_MAGIC};
use crate::imports::{self, ImportTable, ImportedModule};
use crate::options::ParseOptions;
use crate::reader::ImageReader;
use crate::rva::RvaResolver;
use crate::section::{self, SectionHeader};

/// Everything decoded from one image.
///
/// Owns its data and holds no reference to the input buffer.  Header and
/// section failures never produce a `ParseResult`; an import walk that
/// stopped early does, with the reason in [`ImportTable::error`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParseResult {
    architecture: Architecture,
    dos_header: DosHeader,
    nt_headers: NtHeaders,
    sections: Vec<SectionHeader>,
    imports: ImportTable,
}

impl ParseResult {
    /// The width the image was parsed as.
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn dos_header(&self) -> &DosHeader {
        &self.dos_header
    }

    pub fn nt_headers(&self) -> &NtHeaders {
        &self.nt_headers
    }

    /// Section headers in file order.
    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    pub fn imports(&self) -> &ImportTable {
        &self.imports
    }

    /// Imported modules in descriptor order.
    pub fn modules(&self) -> &[ImportedModule] {
        self.imports.modules()
    }

    pub fn section_by_name(&self, name: &str) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.name_str() == name)
    }

    /// The section an RVA resolves through, using the same first-match rule
    /// as the import walk.
    pub fn section_for_rva(&self, rva: u32) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.contains_rva(rva))
    }

    /// Case-insensitive module lookup.
    pub fn module(&self, name: &str) -> Option<&ImportedModule> {
        self.imports.module(name)
    }

    /// Total imported functions across all modules.
    pub fn import_count(&self) -> usize {
        self.imports.function_count()
    }
}

/// Parse `buffer` as an image of the given width with default limits.
pub fn parse(buffer: &[u8], architecture: Architecture) -> Result<ParseResult> {
    parse_with_options(buffer, &ParseOptions::new(architecture))
}

/// Parse `buffer` with explicit options.
///
/// Headers and the section table fail fast.  The import walk never fails
/// the parse; see [`ImportTable::error`].
pub fn parse_with_options(buffer: &[u8], options: &ParseOptions) -> Result<ParseResult> {
    let reader = ImageReader::new(buffer);
    let architecture = options.architecture;
    debug!("parsing {} byte image as {}", reader.len(), architecture);

    let dos_header = headers::parse_dos_header(&reader)?;
    if options.require_dos_magic && !dos_header.has_valid_magic() {
        return Err(PeError::BadSignature {
            what: SignatureKind::Dos,
            expected: u32::from(DOS_MAGIC),
            found: u32::from(dos_header.e_magic),
        });
    }

    let nt_headers = headers::parse_nt_headers(&reader, &dos_header, architecture)?;
    let sections = section::parse_sections(&reader, &nt_headers, options.max_sections)?;
    debug!("{} sections", sections.len());

    let resolver = RvaResolver::new(&sections, reader.len());
    let imports = imports::walk_imports(
        &reader,
        &resolver,
        nt_headers.optional_header.import_directory(),
        options,
    );

    Ok(ParseResult {
        architecture,
        dos_header,
        nt_headers,
        sections,
        imports,
    })
}
