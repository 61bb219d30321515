//! Constants shared by the primitive encoder and the engine.

/// Default pull size used when a consumer does not specify one (spec 4.5).
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// Maximum code-unit count eligible for the unescaped-string fast path (spec 4.2).
pub const FAST_PATH_MAX_LEN: usize = 64;

/// Upper bound of the fast-path's printable, non-surrogate code point range (spec 4.2).
pub const FAST_PATH_MAX_CODEPOINT: u32 = 0xD799;

/// Lower bound of the fast-path's printable range (spec 4.2).
pub const FAST_PATH_MIN_CODEPOINT: u32 = 0x0020;

/// Maximum indent depth accepted from a numeric indent spec (spec 4.3).
pub const MAX_INDENT_COUNT: u8 = 10;

/// Maximum length of a custom indent string (spec 4.3).
pub const MAX_INDENT_TEXT_LEN: usize = 10;
