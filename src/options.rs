use std::rc::Rc;

use crate::error::Result;
use crate::shared::{DEFAULT_HIGH_WATER_MARK, MAX_INDENT_COUNT, MAX_INDENT_TEXT_LEN};
use crate::value::Value;

/// A user-supplied key/value transform, spec 4.3's first replacer shape.
///
/// Returns `Ok(None)` to elide the key/value pair entirely (in object
/// context; in array context `None` becomes `Primitive::Undefined`, which
/// the primitive encoder renders as `null`), `Ok(Some(value))` to
/// substitute, or `Err` to surface `ReplacerFailure`.
pub type TransformFn = Rc<dyn Fn(&str, &Value) -> Result<Option<Value>>>;

/// The two replacer shapes spec 4.3 recognizes.
#[derive(Clone)]
pub enum Replacer {
    Transform(TransformFn),
    /// An allow-list of object keys, in the order they should be emitted.
    Keys(Vec<String>),
}

/// Indentation configuration (spec 4.3): either a clamped space count or a
/// literal string, truncated to 10 characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indent {
    None,
    Count(u8),
    Custom(String),
}

impl Indent {
    #[must_use]
    pub fn spaces(count: u8) -> Self {
        if count == 0 {
            Self::None
        } else {
            Self::Count(count.min(MAX_INDENT_COUNT))
        }
    }

    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        let value: String = value.into();
        if value.is_empty() {
            return Self::None;
        }
        let truncated: String = value.chars().take(MAX_INDENT_TEXT_LEN).collect();
        Self::Custom(truncated)
    }

    /// The literal string inserted once per indentation level, or `None`
    /// when pretty-printing is disabled.
    #[must_use]
    pub fn unit(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Count(n) => Some(" ".repeat(usize::from(*n))),
            Self::Custom(s) => Some(s.clone()),
        }
    }
}

/// User-facing encode configuration.
#[derive(Clone, Default)]
pub struct EncodeOptions {
    pub indent: Option<Indent>,
    pub replacer: Option<Replacer>,
    /// High-water mark used by `Encoder`'s ambient `Stream` impl when a
    /// consumer pulls without specifying a size (spec 4.5).
    pub high_water_mark: Option<usize>,
}

/// Defaulted, ready-to-use encode configuration.
#[derive(Clone)]
pub struct ResolvedEncodeOptions {
    pub indent: Indent,
    pub replacer: Option<Replacer>,
    pub high_water_mark: usize,
}

#[must_use]
pub fn resolve_encode_options(options: Option<EncodeOptions>) -> ResolvedEncodeOptions {
    let options = options.unwrap_or_default();
    ResolvedEncodeOptions {
        indent: options.indent.unwrap_or(Indent::None),
        replacer: options.replacer,
        high_water_mark: options.high_water_mark.unwrap_or(DEFAULT_HIGH_WATER_MARK),
    }
}
