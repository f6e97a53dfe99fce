//! Centralized limits for shader bytecode decoding.
//!
//! Bytecode is treated as untrusted input. These limits bound memory usage and keep decoding of
//! pathological blobs to a bounded number of steps.

use crate::types::{ShaderType, ShaderVersion};

/// Maximum accepted shader bytecode length in bytes.
pub(crate) const MAX_BYTECODE_BYTES: usize = 1024 * 1024;

/// Maximum nesting of `if`/`loop`/`rep` blocks.
pub(crate) const MAX_CONTROL_FLOW_NESTING: usize = 64;

/// Register number offsets that fold `CONST2`/`CONST3`/`CONST4` into the single `c#` space.
///
/// These are part of the wire format: register type 11 addresses `c2048..c4095`, 12 addresses
/// `c4096..c6143` and 13 addresses `c6144..c8191`.
pub(crate) const CONST2_OFFSET: u32 = 2048;
pub(crate) const CONST3_OFFSET: u32 = 4096;
pub(crate) const CONST4_OFFSET: u32 = 6144;

/// Size of the float constant file for a shader version.
///
/// Used to bound the implicit array that relative addressing falls back to when no constant
/// table describes the addressed range.
pub(crate) fn max_float_constants(version: ShaderVersion) -> u32 {
    match (version.shader_type, version.major) {
        (ShaderType::Vertex, 1) => 96,
        (ShaderType::Vertex, _) => 256,
        (ShaderType::Pixel, 1) => 8,
        (ShaderType::Pixel, 2) => 32,
        (ShaderType::Pixel, _) => 224,
    }
}
