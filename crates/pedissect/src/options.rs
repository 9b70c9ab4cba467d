//! Parser configuration.

use crate::arch::Architecture;

/// Default cap on `NumberOfSections`; the Windows loader refuses more.
pub const DEFAULT_MAX_SECTIONS: usize = 96;
pub const DEFAULT_MAX_IMPORT_DESCRIPTORS: usize = 4096;
pub const DEFAULT_MAX_THUNKS_PER_MODULE: usize = 65_536;
pub const DEFAULT_MAX_NAME_LEN: usize = 4096;

/// Knobs for a single parse.
///
/// The limits bound every walk driven by counts or terminators found in the
/// image, so a corrupt file costs bounded work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Width of the image, classified by the caller.
    pub architecture: Architecture,
    /// Reject buffers that do not start with `MZ`.  On by default, which is
    /// stricter than reading the DOS header alone: a buffer with a readable
    /// header but another magic fails with `BadSignature` instead of being
    /// decoded further.  Turn it off to accept such images.
    pub require_dos_magic: bool,
    pub max_sections: usize,
    pub max_import_descriptors: usize,
    pub max_thunks_per_module: usize,
    /// Longest module or function name read before giving up on a string.
    pub max_name_len: usize,
}

impl ParseOptions {
    pub fn new(architecture: Architecture) -> Self {
        Self {
            architecture,
            ..Self::default()
        }
    }

    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    pub fn with_require_dos_magic(mut self, require: bool) -> Self {
        self.require_dos_magic = require;
        self
    }

    pub fn with_max_sections(mut self, limit: usize) -> Self {
        self.max_sections = limit;
        self
    }

    pub fn with_max_import_descriptors(mut self, limit: usize) -> Self {
        self.max_import_descriptors = limit;
        self
    }

    pub fn with_max_thunks_per_module(mut self, limit: usize) -> Self {
        self.max_thunks_per_module = limit;
        self
    }

    pub fn with_max_name_len(mut self, limit: usize) -> Self {
        self.max_name_len = limit;
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            architecture: Architecture::X86,
            require_dos_magic: true,
            max_sections: DEFAULT_MAX_SECTIONS,
            max_import_descriptors: DEFAULT_MAX_IMPORT_DESCRIPTORS,
            max_thunks_per_module: DEFAULT_MAX_THUNKS_PER_MODULE,
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}
