//! Codec options.
//!
//! # Beispiel
//!
//! ```
//! use graphbuf::options::{CodecOptions, Profile};
//!
//! let opts = CodecOptions::default()
//!     .with_profile(Profile::Extended)
//!     .with_max_depth(64)
//!     .with_max_array_length(4096);
//!
//! assert_eq!(opts.profile(), Profile::Extended);
//! assert_eq!(opts.max_depth(), 64);
//! assert_eq!(opts.max_array_length(), 4096);
//! assert!(!opts.forward_only());
//! ```

/// Default maximum sub-item nesting, as in protobuf.
pub const DEFAULT_MAX_DEPTH: u32 = 100;

/// Default ceiling for collection lengths (16 million elements).
pub const DEFAULT_MAX_ARRAY_LENGTH: u64 = 1 << 24;

/// Default number of buffered bytes before a streaming writer drains to its sink.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 64 * 1024;

/// Top-level wire profile. The two are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Profile {
    /// Byte-exact protobuf: empty sequences are omitted, sequences are only
    /// wrapped when packed.
    #[default]
    Compatible,
    /// Every sequence is wrapped in a frame carrying its declared length and,
    /// where needed, a subtype discriminator.
    Extended,
}

/// Options controlling one serialize/deserialize operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecOptions {
    pub(crate) profile: Profile,
    pub(crate) max_depth: u32,
    pub(crate) max_array_length: u64,
    pub(crate) forward_only: bool,
    pub(crate) flush_threshold: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            profile: Profile::Compatible,
            max_depth: DEFAULT_MAX_DEPTH,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
            forward_only: false,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

impl CodecOptions {
    // --- Getter ---

    /// Wire profile.
    pub fn profile(&self) -> Profile { self.profile }
    /// Maximum sub-item nesting depth.
    pub fn max_depth(&self) -> u32 { self.max_depth }
    /// Ceiling for declared or accumulated collection lengths.
    pub fn max_array_length(&self) -> u64 { self.max_array_length }
    /// Fail instead of buffering length-prefixed frames on non-seekable sinks.
    pub fn forward_only(&self) -> bool { self.forward_only }
    /// Buffered bytes before a streaming writer drains.
    pub fn flush_threshold(&self) -> usize { self.flush_threshold }

    /// True for [`Profile::Extended`].
    pub fn is_extended(&self) -> bool {
        self.profile == Profile::Extended
    }

    // --- Builder-Setter (Fluent API) ---

    /// Setzt das Profil.
    pub fn with_profile(mut self, profile: Profile) -> Self { self.profile = profile; self }
    /// Setzt die maximale Verschachtelungstiefe.
    pub fn with_max_depth(mut self, depth: u32) -> Self { self.max_depth = depth; self }
    /// Setzt die Obergrenze für Collection-Längen.
    pub fn with_max_array_length(mut self, len: u64) -> Self { self.max_array_length = len; self }
    /// Aktiviert den Forward-Only-Modus.
    pub fn with_forward_only(mut self) -> Self { self.forward_only = true; self }
    /// Setzt die Flush-Schwelle.
    pub fn with_flush_threshold(mut self, bytes: usize) -> Self { self.flush_threshold = bytes; self }

    // --- Mutable Setter ---

    /// Setzt das Profil.
    pub fn set_profile(&mut self, profile: Profile) { self.profile = profile; }
    /// Setzt die maximale Verschachtelungstiefe.
    pub fn set_max_depth(&mut self, depth: u32) { self.max_depth = depth; }
    /// Setzt die Obergrenze für Collection-Längen.
    pub fn set_max_array_length(&mut self, len: u64) { self.max_array_length = len; }
    /// Setzt den Forward-Only-Modus.
    pub fn set_forward_only(&mut self, val: bool) { self.forward_only = val; }
    /// Setzt die Flush-Schwelle.
    pub fn set_flush_threshold(&mut self, bytes: usize) { self.flush_threshold = bytes; }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = CodecOptions::default();
        assert_eq!(opts.profile(), Profile::Compatible);
        assert_eq!(opts.max_depth(), DEFAULT_MAX_DEPTH);
        assert_eq!(opts.max_array_length(), DEFAULT_MAX_ARRAY_LENGTH);
        assert!(!opts.forward_only());
        assert_eq!(opts.flush_threshold(), DEFAULT_FLUSH_THRESHOLD);
        assert!(!opts.is_extended());
    }

    #[test]
    fn mutable_setters() {
        let mut opts = CodecOptions::default();
        opts.set_profile(Profile::Extended);
        opts.set_forward_only(true);
        opts.set_flush_threshold(16);
        assert!(opts.is_extended());
        assert!(opts.forward_only());
        assert_eq!(opts.flush_threshold(), 16);
    }
}
