//! Direct3D 9 shader-model bytecode decoding and retargeting.
//!
//! [`parse`] walks a vs_1_1..vs_3_0 / ps_1_1..ps_3_0 token stream, validates it against the
//! rules of its shader model and hands every instruction to an output profile:
//!
//! - `d3d`: D3D assembly text.
//! - `bytecode`: the validated token stream, copied verbatim.
//! - `glsl` / `glsl120`: GLSL 1.10 / 1.20 source.
//!
//! Parsing never panics on malformed input. Problems are collected into
//! [`ParseResult::errors`], and the output is empty whenever any error was recorded.

mod limits;
mod opcodes;
mod output;
mod parser;
mod profile;
mod registers;
mod result;
mod token;
mod types;
mod validate;

use tracing::warn;

pub use dxsm_ctab::{
    Preshader, PreshaderInstruction, PreshaderOpcode, PreshaderOperand, PreshaderOperandKind,
    RegisterSet, Symbol, SymbolClass, SymbolType, SymbolTypeInfo,
};
pub use crate::opcodes::Opcode;
pub use crate::parser::ParseState;
pub use crate::profile::{Profile, ProfileError, ProfileKind};
pub use crate::registers::ConstantValue;
pub use crate::result::{
    Attribute, Constant, ParseError, ParseOptions, ParseResult, Sampler, SamplerMap,
    SwizzleRemap, Uniform, UniformType,
};
pub use crate::token::decode_version_token;
pub use crate::types::{
    normalize_register, RegisterType, ShaderType, ShaderVersion, Swizzle, TextureType, Usage,
};

/// Parses `bytecode` with the profile named `profile`.
///
/// An unknown profile name yields a result holding a single error.
pub fn parse(profile: &str, bytecode: &[u8], options: &ParseOptions) -> ParseResult {
    match profile.parse::<ProfileKind>() {
        Ok(kind) => parse_with(kind, bytecode, options),
        Err(err) => ParseResult::failed(err.to_string()),
    }
}

/// Parses `bytecode` with an already selected profile.
pub fn parse_with(kind: ProfileKind, bytecode: &[u8], options: &ParseOptions) -> ParseResult {
    if bytecode.len() > limits::MAX_BYTECODE_BYTES {
        return ParseResult::failed(format!(
            "Shader bytecode is too large ({} bytes, max {})",
            bytecode.len(),
            limits::MAX_BYTECODE_BYTES
        ));
    }

    let trailing = bytecode.len() % 4;
    if trailing != 0 {
        warn!(trailing, "ignoring bytes past the last whole token");
    }

    let mut count = bytecode.len() / 4;
    if let Some(declared) = options.declared_token_count {
        count = count.min(declared);
    }

    let mut tokens = Vec::new();
    if tokens.try_reserve_exact(count).is_err() {
        return ParseResult::out_of_memory();
    }
    tokens.extend(
        bytecode
            .chunks_exact(4)
            .take(count)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
    );

    parser::run(kind.create(), &tokens, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_profile_is_reported() {
        let result = parse("arb1", &[], &ParseOptions::default());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0].message,
            "Profile 'arb1' is unknown or unsupported"
        );
        assert!(result.output.is_empty());
    }

    #[test]
    fn empty_input_runs_out_of_tokens() {
        let result = parse("d3d", &[], &ParseOptions::default());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "Out of tokens");
    }

    #[test]
    fn oversized_input_is_rejected() {
        let bytes = vec![0u8; limits::MAX_BYTECODE_BYTES + 4];
        let result = parse("d3d", &bytes, &ParseOptions::default());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("too large"));
    }
}
