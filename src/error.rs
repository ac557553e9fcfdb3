//! Central error types for the graphbuf codec.
//!
//! Every failure aborts the in-flight read or write. Errors are grouped into five
//! categories (see [`ErrorCategory`]) and carry the position at which they were
//! raised: field number, wire type, byte offset and nesting depth.

use core::fmt;
use std::borrow::Cow;

use crate::wire_type::WireType;

/// Coarse classification of every [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad varint, tag/wire-type mismatch, truncated stream, unmatched terminator.
    StreamCorruption,
    /// Unbalanced enter/exit of sub-items or maximum depth exceeded.
    NestingViolation,
    /// Unknown back-reference or unresolved reserved key.
    ReferenceViolation,
    /// Wrong array rank or collection length ceiling exceeded.
    CollectionViolation,
    /// An encoding that the requested wire shape cannot express.
    UnsupportedEncoding,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StreamCorruption => "stream corruption",
            Self::NestingViolation => "nesting violation",
            Self::ReferenceViolation => "reference violation",
            Self::CollectionViolation => "collection violation",
            Self::UnsupportedEncoding => "unsupported encoding",
        };
        f.write_str(name)
    }
}

/// The concrete failure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A varint is longer than 10 bytes or overflows 64 bits.
    MalformedVarint,
    /// The stream (or the current region) ended before the value was complete.
    TruncatedStream,
    /// A field number outside `1..=536_870_911`.
    InvalidFieldNumber(u64),
    /// Wire type 6 or 7.
    InvalidWireType(u8),
    /// An end-group tag where no group is open.
    UnexpectedEndGroup,
    /// An end-group tag whose field number does not match the open group.
    MismatchedEndGroup { expected: u32, found: u32 },
    /// A group region was closed without reading its end-group tag.
    UnterminatedGroup(u32),
    /// A length-delimited region was closed before all of its bytes were read.
    SubItemNotConsumed { remaining: u64 },
    /// The wire type on the stream does not fit the expected value.
    WireTypeMismatch { expected: WireType },
    /// A string payload is not valid UTF-8.
    InvalidUtf8,
    /// An enum wire value without a mapping.
    UnknownEnumValue(i64),
    /// The underlying sink failed.
    Io(String),

    /// More nested sub-items than the configured maximum.
    DepthExceeded { max: u32 },
    /// A sub-item token was closed out of LIFO order or twice.
    UnbalancedSubItem,

    /// A back-reference to a key that was never assigned.
    UnknownObjectKey(u32),
    /// A new-object marker reusing an already assigned key.
    DuplicateObjectKey(u32),
    /// A reserved key was still unresolved when its segment closed.
    UnresolvedReservedKey(u32),
    /// A type token referring to an unknown type key.
    UnknownTypeKey(u32),
    /// A type token naming a type the model does not know.
    UnknownTypeName(String),
    /// An object key of 0 or above `u32::MAX` on the stream.
    InvalidObjectKey(u64),
    /// An object id that is missing from the graph or still reserved.
    DanglingObject(u32),

    /// A multi-dimensional array with the wrong number of dimension lengths.
    WrongArrayRank { expected: u8, found: usize },
    /// A declared or accumulated length above the configured ceiling.
    LengthCeilingExceeded { length: u64, max: u64 },
    /// A multi-dimensional array whose items do not fill its dimensions.
    ArrayLengthMismatch { expected: u64, found: u64 },
    /// A collection subtype discriminator without a known collection kind.
    UnknownSubtype(u64),

    /// Packed encoding requested for a wire type that cannot be packed.
    NotPackable(WireType),
    /// A length-prefixed frame was opened on a forward-only sink.
    BufferingRequired,
    /// `start_sub_item` after a header that is neither length-delimited nor a group.
    InvalidSubItemWireType,
    /// The value stored in the graph does not fit the field definition.
    ValueKindMismatch { expected: &'static str, found: &'static str },
    /// An enum value without a wire mapping.
    UnmappedEnumValue(i64),
    /// A message of a different runtime type in a slot without type tokens.
    DynamicTypeRequiresWrapper,
    /// The type model handed to the codec is inconsistent.
    InvalidModel(Cow<'static, str>),
}

impl ErrorKind {
    /// The category this kind belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedVarint
            | Self::TruncatedStream
            | Self::InvalidFieldNumber(_)
            | Self::InvalidWireType(_)
            | Self::UnexpectedEndGroup
            | Self::MismatchedEndGroup { .. }
            | Self::UnterminatedGroup(_)
            | Self::SubItemNotConsumed { .. }
            | Self::WireTypeMismatch { .. }
            | Self::InvalidUtf8
            | Self::UnknownEnumValue(_)
            | Self::Io(_) => ErrorCategory::StreamCorruption,
            Self::DepthExceeded { .. } | Self::UnbalancedSubItem => ErrorCategory::NestingViolation,
            Self::UnknownObjectKey(_)
            | Self::DuplicateObjectKey(_)
            | Self::UnresolvedReservedKey(_)
            | Self::UnknownTypeKey(_)
            | Self::UnknownTypeName(_)
            | Self::InvalidObjectKey(_)
            | Self::DanglingObject(_) => ErrorCategory::ReferenceViolation,
            Self::WrongArrayRank { .. }
            | Self::LengthCeilingExceeded { .. }
            | Self::ArrayLengthMismatch { .. }
            | Self::UnknownSubtype(_) => ErrorCategory::CollectionViolation,
            Self::NotPackable(_)
            | Self::BufferingRequired
            | Self::InvalidSubItemWireType
            | Self::ValueKindMismatch { .. }
            | Self::UnmappedEnumValue(_)
            | Self::DynamicTypeRequiresWrapper
            | Self::InvalidModel(_) => ErrorCategory::UnsupportedEncoding,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedVarint => write!(f, "malformed varint (more than 10 bytes or 64-bit overflow)"),
            Self::TruncatedStream => write!(f, "unexpected end of stream"),
            Self::InvalidFieldNumber(n) => write!(f, "invalid field number {n}"),
            Self::InvalidWireType(wt) => write!(f, "invalid wire type {wt}"),
            Self::UnexpectedEndGroup => write!(f, "end-group tag outside of a group"),
            Self::MismatchedEndGroup { expected, found } => {
                write!(f, "end-group for field {found} while group {expected} is open")
            }
            Self::UnterminatedGroup(n) => write!(f, "group {n} closed without end-group tag"),
            Self::SubItemNotConsumed { remaining } => {
                write!(f, "sub-item closed with {remaining} unread bytes")
            }
            Self::WireTypeMismatch { expected } => write!(f, "wire type mismatch, expected {expected}"),
            Self::InvalidUtf8 => write!(f, "string payload is not valid UTF-8"),
            Self::UnknownEnumValue(v) => write!(f, "no enum value mapped to wire value {v}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::DepthExceeded { max } => write!(f, "nesting too deep (maximum {max})"),
            Self::UnbalancedSubItem => write!(f, "sub-item closed out of order"),
            Self::UnknownObjectKey(key) => write!(f, "back-reference to unknown object key {key}"),
            Self::DuplicateObjectKey(key) => write!(f, "object key {key} assigned twice"),
            Self::UnresolvedReservedKey(key) => write!(f, "reserved object key {key} was never resolved"),
            Self::UnknownTypeKey(key) => write!(f, "unknown type key {key}"),
            Self::UnknownTypeName(name) => write!(f, "unknown type name '{name}'"),
            Self::InvalidObjectKey(key) => write!(f, "invalid object key {key}"),
            Self::DanglingObject(id) => write!(f, "object #{id} is missing from the graph or unresolved"),
            Self::WrongArrayRank { expected, found } => {
                write!(f, "wrong array rank: expected {expected} dimensions, found {found}")
            }
            Self::LengthCeilingExceeded { length, max } => {
                write!(f, "collection length {length} exceeds maximum {max}")
            }
            Self::ArrayLengthMismatch { expected, found } => {
                write!(f, "array declares {expected} elements but holds {found}")
            }
            Self::UnknownSubtype(code) => write!(f, "unknown collection subtype {code}"),
            Self::NotPackable(wt) => write!(f, "wire type {wt} cannot be packed"),
            Self::BufferingRequired => {
                write!(f, "length-prefixed frame requires buffering on a forward-only stream")
            }
            Self::InvalidSubItemWireType => {
                write!(f, "sub-item requires a length-delimited or start-group header")
            }
            Self::ValueKindMismatch { expected, found } => {
                write!(f, "value kind mismatch: field expects {expected}, found {found}")
            }
            Self::UnmappedEnumValue(v) => write!(f, "enum value {v} has no wire mapping"),
            Self::DynamicTypeRequiresWrapper => {
                write!(f, "message of another runtime type requires a type-token value format")
            }
            Self::InvalidModel(msg) => write!(f, "invalid type model: {msg}"),
        }
    }
}

/// Where in the stream an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Field number of the last header (0 if none).
    pub field_number: u32,
    /// Wire type of the last header.
    pub wire_type: Option<WireType>,
    /// Absolute byte offset.
    pub position: u64,
    /// Sub-item nesting depth.
    pub depth: u32,
}

/// Error raised by any codec operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    context: ErrorContext,
}

impl Error {
    /// Creates an error without stream position.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, context: ErrorContext::default() }
    }

    /// Creates an error at a known stream position.
    pub fn at(kind: ErrorKind, context: ErrorContext) -> Self {
        Self { kind, context }
    }

    /// Erstellt einen `InvalidModel` Fehler mit Nachricht.
    pub fn invalid_model(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidModel(msg.into()))
    }

    /// The concrete failure.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Shorthand for `self.kind().category()`.
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Position at which the error was raised.
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Replaces an empty context; an existing one is kept because it is closer
    /// to the fault.
    pub(crate) fn or_context(mut self, context: ErrorContext) -> Self {
        if self.context == ErrorContext::default() {
            self.context = context;
        }
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.category(), self.kind)?;
        let ctx = &self.context;
        if *ctx != ErrorContext::default() {
            write!(f, " (field {}", ctx.field_number)?;
            if let Some(wt) = ctx.wire_type {
                write!(f, ", wire type {wt}")?;
            }
            write!(f, ", offset {}, depth {})", ctx.position, ctx.depth)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io(err.to_string()))
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
