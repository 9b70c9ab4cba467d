//! Bounds-checked dissection of PE/COFF images.
//!
//! Parses the DOS header, NT headers, section table and import directory of
//! an in-memory image.  Every read is an offset into the caller's buffer and
//! is checked against its length, so truncated or hostile files produce a
//! [`PeError`] rather than a panic.
//!
//! The image width is not detected here; the caller classifies it and
//! passes an [`Architecture`].
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("app.exe")?;
//! let image = pedissect::parse(&bytes, pedissect::Architecture::X86)?;
//! for module in image.modules() {
//!     println!("{}: {} imports", module.name, module.functions.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod arch;
pub mod error;
pub mod headers;
pub mod image;
pub mod imports;
pub mod options;
pub mod reader;
pub mod rva;
pub mod section;

pub use arch::Architecture;
pub use error::{PeError, Result, SignatureKind};
pub use headers::{DataDirectory, DosHeader, FileHeader, NtHeaders, OptionalHeader};
pub use image::{parse, parse_with_options, ParseResult};
pub use imports::{ImportByName, ImportTable, ImportedFunction, ImportedModule, ThunkEntry};
pub use options::ParseOptions;
pub use reader::ImageReader;
pub use rva::RvaResolver;
pub use section::SectionHeader;
