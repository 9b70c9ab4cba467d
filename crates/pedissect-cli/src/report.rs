//! Text and JSON rendering of a parsed image.

use std::fmt;
use std::path::Path;

use pedissect::headers::DIRECTORY_NAMES;
use pedissect::{ImportedModule, ParseResult, ThunkEntry};
use serde_json::{json, Map, Value};

use crate::View;

const RULE: &str = "════════════════════════════════════════";

pub(crate) fn render_text(path: &Path, image: &ParseResult, view: View) -> String {
    TextReport { path, image, view }.to_string()
}

struct TextReport<'a> {
    path: &'a Path,
    image: &'a ParseResult,
    view: View,
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let image = self.image;
        writeln!(f, "PE Analysis: {}", self.path.display())?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "Architecture:   {}", image.architecture())?;
        writeln!(f)?;

        if matches!(self.view, View::All | View::Headers) {
            write_dos_header(f, image)?;
            write_file_header(f, image)?;
            write_optional_header(f, image)?;
            write_data_directories(f, image)?;
        }
        if matches!(self.view, View::All | View::Sections) {
            write_sections(f, image)?;
        }
        if matches!(self.view, View::All | View::Imports) {
            write_imports(f, image)?;
        }
        Ok(())
    }
}

fn write_dos_header(f: &mut fmt::Formatter<'_>, image: &ParseResult) -> fmt::Result {
    writeln!(f, "DOS Header:")?;
    for (name, value) in image.dos_header().fields() {
        writeln!(f, "  {name:<12}  0x{value:04X}")?;
    }
    writeln!(f)
}

fn write_file_header(f: &mut fmt::Formatter<'_>, image: &ParseResult) -> fmt::Result {
    let nt = image.nt_headers();
    let fh = &nt.file_header;
    let kind = if fh.is_dll() {
        "DLL"
    } else if fh.is_executable() {
        "executable"
    } else {
        "object"
    };

    writeln!(f, "File Header (NT signature 0x{:08X} at 0x{:X}):", nt.signature, nt.offset)?;
    writeln!(f, "  Machine:        0x{:04X} ({})", fh.machine, fh.machine_name())?;
    writeln!(f, "  Sections:       {}", fh.number_of_sections)?;
    writeln!(f, "  TimeDateStamp:  0x{:08X}", fh.time_date_stamp)?;
    writeln!(
        f,
        "  Symbol table:   0x{:08X} ({} symbols)",
        fh.pointer_to_symbol_table, fh.number_of_symbols
    )?;
    writeln!(f, "  Opt hdr size:   0x{:04X}", fh.size_of_optional_header)?;
    writeln!(f, "  Characteristics: 0x{:04X} ({kind})", fh.characteristics)?;
    writeln!(f)
}

fn write_optional_header(f: &mut fmt::Formatter<'_>, image: &ParseResult) -> fmt::Result {
    let oh = &image.nt_headers().optional_header;
    let format = if image.architecture().is_64bit() { "PE32+" } else { "PE32" };

    writeln!(f, "Optional Header:")?;
    writeln!(f, "  Magic:          0x{:04X} ({format})", oh.magic)?;
    writeln!(f, "  Linker:         {}.{}", oh.major_linker_version, oh.minor_linker_version)?;
    writeln!(f, "  Entry point:    0x{:08X}", oh.address_of_entry_point)?;
    writeln!(f, "  Base of code:   0x{:08X}", oh.base_of_code)?;
    if let Some(base_of_data) = oh.base_of_data {
        writeln!(f, "  Base of data:   0x{base_of_data:08X}")?;
    }
    writeln!(f, "  Image base:     0x{:016X}", oh.image_base)?;
    writeln!(f, "  Section align:  0x{:08X}", oh.section_alignment)?;
    writeln!(f, "  File align:     0x{:08X}", oh.file_alignment)?;
    writeln!(
        f,
        "  OS version:     {}.{}",
        oh.major_operating_system_version, oh.minor_operating_system_version
    )?;
    writeln!(f, "  Image version:  {}.{}", oh.major_image_version, oh.minor_image_version)?;
    writeln!(
        f,
        "  Subsystem:      {} (version {}.{})",
        oh.subsystem, oh.major_subsystem_version, oh.minor_subsystem_version
    )?;
    writeln!(f, "  Size of code:   0x{:08X}", oh.size_of_code)?;
    writeln!(f, "  Size of image:  0x{:08X}", oh.size_of_image)?;
    writeln!(f, "  Size of hdrs:   0x{:08X}", oh.size_of_headers)?;
    writeln!(f, "  Checksum:       0x{:08X}", oh.check_sum)?;
    writeln!(f, "  DllCharacteristics: 0x{:04X}", oh.dll_characteristics)?;
    writeln!(
        f,
        "  Stack:          reserve 0x{:X}, commit 0x{:X}",
        oh.size_of_stack_reserve, oh.size_of_stack_commit
    )?;
    writeln!(
        f,
        "  Heap:           reserve 0x{:X}, commit 0x{:X}",
        oh.size_of_heap_reserve, oh.size_of_heap_commit
    )?;
    writeln!(f, "  Loader flags:   0x{:08X}", oh.loader_flags)?;
    writeln!(f, "  RVA and sizes:  {}", oh.number_of_rva_and_sizes)?;
    writeln!(f)
}

fn write_data_directories(f: &mut fmt::Formatter<'_>, image: &ParseResult) -> fmt::Result {
    writeln!(f, "Data Directories:")?;
    let directories = &image.nt_headers().optional_header.data_directories;
    for (i, dir) in directories.iter().enumerate() {
        if dir.virtual_address != 0 || dir.size != 0 {
            let name = DIRECTORY_NAMES.get(i).copied().unwrap_or("Unknown");
            writeln!(
                f,
                "  [{:2}] {:<12}  RVA=0x{:08X}  Size=0x{:08X}",
                i, name, dir.virtual_address, dir.size
            )?;
        }
    }
    writeln!(f)
}

fn write_sections(f: &mut fmt::Formatter<'_>, image: &ParseResult) -> fmt::Result {
    writeln!(f, "Sections:")?;
    writeln!(
        f,
        "  {:<8}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}  {}",
        "Name", "VirtSize", "VirtAddr", "RawSize", "RawPtr", "Flags", "Perm"
    )?;
    for section in image.sections() {
        writeln!(
            f,
            "  {:<8}  0x{:08X}  0x{:08X}  0x{:08X}  0x{:08X}  0x{:08X}  {}",
            section.name_str(),
            section.virtual_size,
            section.virtual_address,
            section.size_of_raw_data,
            section.pointer_to_raw_data,
            section.characteristics,
            section.permissions(),
        )?;
    }
    writeln!(f)
}

fn write_imports(f: &mut fmt::Formatter<'_>, image: &ParseResult) -> fmt::Result {
    let imports = image.imports();
    writeln!(
        f,
        "Imports: {} modules, {} functions",
        imports.len(),
        imports.function_count()
    )?;
    for module in imports.modules() {
        write_module(f, module)?;
    }
    if let Some(err) = imports.error() {
        writeln!(f, "  ! {err}: {}", err.root_cause())?;
    }
    Ok(())
}

fn write_module(f: &mut fmt::Formatter<'_>, module: &ImportedModule) -> fmt::Result {
    writeln!(f, "  {} ({} functions)", module.name, module.functions.len())?;
    for function in &module.functions {
        match &function.entry {
            ThunkEntry::Named(by_name) => writeln!(
                f,
                "    0x{:08X}  {:>5}  {}",
                function.iat_rva, by_name.hint, by_name.name
            )?,
            ThunkEntry::Ordinal(ordinal) => {
                writeln!(f, "    0x{:08X}  {:>5}  #{}", function.iat_rva, "", ordinal)?
            }
        }
    }
    Ok(())
}

/// JSON document for `view`.  Import failures appear as `import_error`.
pub(crate) fn to_json(path: &Path, image: &ParseResult, view: View) -> Value {
    let mut map = Map::new();
    map.insert("file".into(), json!(path.display().to_string()));
    map.insert("architecture".into(), json!(image.architecture()));

    if matches!(view, View::All | View::Headers) {
        map.insert("dos_header".into(), json!(image.dos_header()));
        map.insert("nt_headers".into(), json!(image.nt_headers()));
    }
    if matches!(view, View::All | View::Sections) {
        map.insert("sections".into(), json!(image.sections()));
    }
    if matches!(view, View::All | View::Imports) {
        map.insert("imports".into(), json!(image.modules()));
        map.insert(
            "import_error".into(),
            json!(image.imports().error().map(ToString::to_string)),
        );
    }
    Value::Object(map)
}
