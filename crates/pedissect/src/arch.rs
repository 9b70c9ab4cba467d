//! Image width classification.
//!
//! The parser never guesses whether an image is PE32 or PE32+; the caller
//! classifies the file up front and every width-dependent quantity (optional
//! header magic, thunk size, ordinal flag) is derived from that choice.  The
//! header, section and import walks are otherwise identical for both widths.

use std::fmt;

/// Optional-header magic for PE32 (32-bit).
pub const PE32_MAGIC: u16 = 0x010B;
/// Optional-header magic for PE32+ (64-bit).
pub const PE32PLUS_MAGIC: u16 = 0x020B;

/// `IMAGE_ORDINAL_FLAG32`
pub const ORDINAL_FLAG32: u64 = 0x8000_0000;
/// `IMAGE_ORDINAL_FLAG64`
pub const ORDINAL_FLAG64: u64 = 0x8000_0000_0000_0000;

/// The out-of-band 32/64-bit classification supplied with the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Architecture {
    /// PE32 images (x86).
    #[default]
    X86,
    /// PE32+ images (x86-64, ARM64).
    X64,
}

impl Architecture {
    /// The optional-header magic an image of this width must carry.
    pub const fn optional_magic(self) -> u16 {
        match self {
            Architecture::X86 => PE32_MAGIC,
            Architecture::X64 => PE32PLUS_MAGIC,
        }
    }

    /// Width of the pointer-sized optional header fields (image base,
    /// stack and heap sizes).
    pub const fn word_size(self) -> usize {
        match self {
            Architecture::X86 => 4,
            Architecture::X64 => 8,
        }
    }

    /// Size in bytes of one import lookup / address table entry.
    pub const fn thunk_size(self) -> usize {
        self.word_size()
    }

    /// The "import by ordinal" bit of a thunk value.
    pub const fn ordinal_flag(self) -> u64 {
        match self {
            Architecture::X86 => ORDINAL_FLAG32,
            Architecture::X64 => ORDINAL_FLAG64,
        }
    }

    /// Size of the optional header up to (not including) the data directories.
    pub const fn optional_header_fixed_size(self) -> usize {
        match self {
            Architecture::X86 => 96,
            Architecture::X64 => 112,
        }
    }

    /// Map an optional-header magic back to a width, if it is one we know.
    pub const fn from_magic(magic: u16) -> Option<Self> {
        match magic {
            PE32_MAGIC => Some(Architecture::X86),
            PE32PLUS_MAGIC => Some(Architecture::X64),
            _ => None,
        }
    }

    pub const fn is_64bit(self) -> bool {
        matches!(self, Architecture::X64)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86 => write!(f, "x86 (32-bit)"),
            Architecture::X64 => write!(f, "x86-64 (64-bit)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_differ_where_the_format_says_so() {
        assert_eq!(Architecture::X86.thunk_size(), 4);
        assert_eq!(Architecture::X64.thunk_size(), 8);
        assert_eq!(Architecture::X86.optional_header_fixed_size(), 96);
        assert_eq!(Architecture::X64.optional_header_fixed_size(), 112);
        assert_eq!(Architecture::X86.ordinal_flag(), 0x8000_0000);
        assert_eq!(Architecture::X64.ordinal_flag(), 1 << 63);
    }

    #[test]
    fn magic_round_trips_through_from_magic() {
        for arch in [Architecture::X86, Architecture::X64] {
            assert_eq!(Architecture::from_magic(arch.optional_magic()), Some(arch));
        }
        assert_eq!(Architecture::from_magic(0x0107), None);
    }

    #[test]
    fn display_names() {
        assert_eq!(Architecture::X86.to_string(), "x86 (32-bit)");
        assert_eq!(Architecture::X64.to_string(), "x86-64 (64-bit)");
    }
}
