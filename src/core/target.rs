//! Target description shared by every function of a compilation unit.
//!
//! A [`TargetContext`] is built once from a target triple and a feature
//! string and is read-only afterwards, so worker threads selecting
//! different functions can share it by reference.

use crate::dag::ValueType;
use std::fmt;
use std::str::FromStr;
use target_lexicon::{Architecture, OperatingSystem, PointerWidth, Triple};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid target triple '{triple}': {reason}")]
    InvalidTriple { triple: String, reason: String },

    #[error("unknown target feature '{0}'")]
    UnknownFeature(String),

    #[error("malformed feature '{0}', expected +name or -name")]
    MalformedFeature(String),
}

/// Known subtarget features and their attribute-string names.
const FEATURE_NAMES: &[(&str, u32)] = &[
    ("atomics", TargetFeatures::ATOMICS),
    ("bulk-memory", TargetFeatures::BULK_MEMORY),
    ("mutable-globals", TargetFeatures::MUTABLE_GLOBALS),
    ("sign-ext", TargetFeatures::SIGN_EXT),
    ("nontrapping-fptoint", TargetFeatures::NONTRAPPING_FPTOINT),
    ("simd128", TargetFeatures::SIMD128),
    ("multivalue", TargetFeatures::MULTIVALUE),
    ("tail-call", TargetFeatures::TAIL_CALL),
    ("reference-types", TargetFeatures::REFERENCE_TYPES),
];

/// Set of enabled subtarget features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetFeatures(u32);

impl TargetFeatures {
    pub const ATOMICS: u32 = 1 << 0;
    pub const BULK_MEMORY: u32 = 1 << 1;
    pub const MUTABLE_GLOBALS: u32 = 1 << 2;
    pub const SIGN_EXT: u32 = 1 << 3;
    pub const NONTRAPPING_FPTOINT: u32 = 1 << 4;
    pub const SIMD128: u32 = 1 << 5;
    pub const MULTIVALUE: u32 = 1 << 6;
    pub const TAIL_CALL: u32 = 1 << 7;
    pub const REFERENCE_TYPES: u32 = 1 << 8;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(self, bits: u32) -> Self {
        Self(self.0 | bits)
    }

    pub const fn without(self, bits: u32) -> Self {
        Self(self.0 & !bits)
    }

    pub const fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    /// Parse an attribute string such as `+atomics,+bulk-memory,-simd128`.
    ///
    /// Later entries override earlier ones.
    pub fn parse(attrs: &str) -> Result<Self, ConfigError> {
        let mut features = Self::empty();
        for entry in attrs.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (enable, name) = if let Some(name) = entry.strip_prefix('+') {
                (true, name)
            } else if let Some(name) = entry.strip_prefix('-') {
                (false, name)
            } else {
                return Err(ConfigError::MalformedFeature(entry.to_string()));
            };
            let bit = FEATURE_NAMES
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, bit)| *bit)
                .ok_or_else(|| ConfigError::UnknownFeature(name.to_string()))?;
            features = if enable {
                features.with(bit)
            } else {
                features.without(bit)
            };
        }
        Ok(features)
    }
}

impl fmt::Display for TargetFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enabled: Vec<String> = FEATURE_NAMES
            .iter()
            .filter(|(_, bit)| self.contains(*bit))
            .map(|(name, _)| format!("+{name}"))
            .collect();
        f.write_str(&enabled.join(","))
    }
}

/// Immutable per-unit target facts consulted by selection rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetContext {
    triple: Triple,
    features: TargetFeatures,
    pointer_width: u32,
}

impl TargetContext {
    pub fn new(triple: Triple, features: TargetFeatures) -> Self {
        let pointer_width = match triple.pointer_width() {
            Ok(PointerWidth::U16) => 16,
            Ok(PointerWidth::U64) => 64,
            _ => 32,
        };
        Self {
            triple,
            features,
            pointer_width,
        }
    }

    /// Build from a triple string and an attribute string.
    pub fn from_strs(triple: &str, attrs: &str) -> Result<Self, ConfigError> {
        let parsed = Triple::from_str(triple).map_err(|e| ConfigError::InvalidTriple {
            triple: triple.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(parsed, TargetFeatures::parse(attrs)?))
    }

    pub fn triple(&self) -> &Triple {
        &self.triple
    }

    pub fn features(&self) -> TargetFeatures {
        self.features
    }

    pub fn has_atomics(&self) -> bool {
        self.features.contains(TargetFeatures::ATOMICS)
    }

    pub fn has_bulk_memory(&self) -> bool {
        self.features.contains(TargetFeatures::BULK_MEMORY)
    }

    /// 64-bit linear memory addressing, implied by a wasm64 triple.
    pub fn has_addr64(&self) -> bool {
        matches!(self.triple.architecture, Architecture::Wasm64) || self.pointer_width == 64
    }

    pub fn pointer_width(&self) -> u32 {
        self.pointer_width
    }

    pub fn pointer_type(&self) -> ValueType {
        if self.pointer_width == 64 {
            ValueType::I64
        } else {
            ValueType::I32
        }
    }

    pub fn is_os_emscripten(&self) -> bool {
        self.triple.operating_system == OperatingSystem::Emscripten
    }
}

impl Default for TargetContext {
    fn default() -> Self {
        Self::new(
            Triple {
                architecture: Architecture::Wasm32,
                ..Triple::unknown()
            },
            TargetFeatures::empty(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feature_string() {
        let f = TargetFeatures::parse("+atomics, +bulk-memory,-atomics,+simd128").unwrap();
        assert!(!f.contains(TargetFeatures::ATOMICS));
        assert!(f.contains(TargetFeatures::BULK_MEMORY));
        assert!(f.contains(TargetFeatures::SIMD128));
        assert_eq!(f.to_string(), "+bulk-memory,+simd128");
    }

    #[test]
    fn rejects_unknown_features() {
        assert_eq!(
            TargetFeatures::parse("+warp-drive"),
            Err(ConfigError::UnknownFeature("warp-drive".into()))
        );
        assert_eq!(
            TargetFeatures::parse("atomics"),
            Err(ConfigError::MalformedFeature("atomics".into()))
        );
    }

    #[test]
    fn triple_drives_os_and_pointer_width() {
        let cx = TargetContext::from_strs("wasm32-unknown-emscripten", "+atomics").unwrap();
        assert!(cx.is_os_emscripten());
        assert!(cx.has_atomics());
        assert!(!cx.has_addr64());
        assert_eq!(cx.pointer_type(), ValueType::I32);

        let cx = TargetContext::from_strs("wasm64-unknown-unknown", "").unwrap();
        assert!(cx.has_addr64());
        assert_eq!(cx.pointer_width(), 64);

        let cx = TargetContext::from_strs("wasm32-wasi", "").unwrap();
        assert!(!cx.is_os_emscripten());
    }

    #[test]
    fn shared_across_threads() {
        fn assert_sync<T: Sync + Send>() {}
        assert_sync::<TargetContext>();
    }
}
