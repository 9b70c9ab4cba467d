//! Errors produced while dissecting a PE image.

use std::fmt;

use thiserror::Error;

use crate::arch::Architecture;

/// Which magic value failed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// `MZ` at the start of the DOS header.
    Dos,
    /// `PE\0\0` at `e_lfanew`.
    Nt,
}

impl fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureKind::Dos => write!(f, "DOS"),
            SignatureKind::Nt => write!(f, "NT"),
        }
    }
}

/// Errors that can occur while parsing a PE image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeError {
    /// A read of `len` bytes at `offset` does not fit inside the buffer.
    ///
    /// `offset` is 64 bits wide so that an offset which overflowed `usize`
    /// arithmetic, or a raw negative `e_lfanew`, is reported as found.
    #[error("read of {len} bytes at offset 0x{offset:X} exceeds buffer of {buffer_len} bytes")]
    OutOfBounds {
        offset: u64,
        len: usize,
        buffer_len: usize,
    },

    #[error("invalid {what} signature: expected 0x{expected:X}, found 0x{found:X}")]
    BadSignature {
        what: SignatureKind,
        expected: u32,
        found: u32,
    },

    /// The optional header magic does not match the requested width.
    #[error("optional header magic 0x{magic:04X} is not valid for a {requested} parse")]
    UnsupportedFormat {
        magic: u16,
        requested: Architecture,
    },

    #[error("no NUL terminator within {max_len} bytes of offset 0x{offset:X}")]
    UnterminatedString { offset: usize, max_len: usize },

    #[error("image declares {count} sections, limit is {limit}")]
    TooManySections { count: usize, limit: usize },

    #[error("RVA 0x{rva:08X} is not mapped by any section")]
    RvaNotMapped { rva: u32 },

    /// The import walk stopped at module `module_index`; modules before it
    /// were resolved and are kept.
    #[error("malformed import table at module #{module_index}")]
    MalformedImportTable {
        module_index: usize,
        #[source]
        source: Box<PeError>,
    },

    /// A sentinel-terminated table ran past its iteration cap.
    #[error("{table} exceeds {limit} entries without a terminator")]
    IterationLimit { table: &'static str, limit: usize },
}

impl PeError {
    pub(crate) fn out_of_bounds(offset: u64, len: usize, buffer_len: usize) -> Self {
        PeError::OutOfBounds {
            offset,
            len,
            buffer_len,
        }
    }

    pub(crate) fn malformed_import(module_index: usize, source: PeError) -> Self {
        PeError::MalformedImportTable {
            module_index,
            source: Box::new(source),
        }
    }

    /// Header and section failures abort a parse; a malformed import table
    /// only truncates the import list.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PeError::MalformedImportTable { .. })
    }

    /// The innermost error, looking through `MalformedImportTable`.
    pub fn root_cause(&self) -> &PeError {
        match self {
            PeError::MalformedImportTable { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeError>;
