//! Safe parsers for the metadata blocks embedded in D3D9 shader bytecode comments.
//!
//! Compiled SM1-SM3 shaders carry two kinds of structured payload inside comment tokens:
//!
//! - `CTAB`: the constant table, mapping named high-level uniforms onto register ranges.
//! - `PRES`: a preshader, a small CPU-side arithmetic program (with its own `CTAB`, literal
//!   pool and output map) that precomputes constant registers before the GPU shader runs.
//!
//! All input is treated as **untrusted**: offsets and counts are bounds-checked and recursion
//! into nested struct types is depth-limited, so malformed blocks produce a [`CtabError`]
//! instead of a panic.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Parser for constant table (`CTAB`) blocks.
pub mod ctab;
mod error;
mod fourcc;
/// Parser for preshader (`PRES`) blocks.
pub mod preshader;
mod reader;

/// Helpers for building synthetic `CTAB`/preshader blocks in tests.
///
/// Only available for this crate's own tests or with the `test-utils` feature enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::ctab::{
    parse_ctab, ConstantTable, RegisterSet, Symbol, SymbolClass, SymbolStructMember, SymbolType,
    SymbolTypeInfo, MAX_TYPE_DEPTH,
};
pub use crate::error::CtabError;
pub use crate::fourcc::FourCC;
pub use crate::preshader::{
    parse_preshader, Preshader, PreshaderInstruction, PreshaderOpcode, PreshaderOperand,
    PreshaderOperandKind,
};

/// Comment payload id of an embedded constant table.
pub const CTAB_ID: FourCC = FourCC(*b"CTAB");
/// Comment payload id of an embedded preshader.
pub const PRES_ID: FourCC = FourCC(*b"PRES");

/// Reinterprets a run of little-endian tokens as the byte block they were packed from.
pub fn tokens_to_bytes(tokens: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(tokens.len() * 4);
    for token in tokens {
        bytes.extend_from_slice(&token.to_le_bytes());
    }
    bytes
}
