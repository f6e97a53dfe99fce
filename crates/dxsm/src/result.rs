//! Public parse options and results.

use std::fmt;

use dxsm_ctab::{Preshader, Symbol};

use crate::registers::ConstantValue;
use crate::types::{ShaderType, Swizzle, TextureType, Usage};

/// Rewrites the swizzle of vertex inputs declared with `usage`/`index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwizzleRemap {
    pub usage: Usage,
    pub index: u32,
    /// Component `i` of the attribute is read from `swizzle[i]` of the bound data.
    pub swizzle: Swizzle,
}

/// Overrides the texture type of an implicitly declared ps_1_x sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerMap {
    pub index: u32,
    pub texture_type: TextureType,
}

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Entry point name for profiles that emit a function. Defaults to `main`.
    pub mainfn: Option<String>,
    pub swizzles: Vec<SwizzleRemap>,
    pub samplers: Vec<SamplerMap>,
    /// Caps the stream below the buffer length, in tokens.
    pub declared_token_count: Option<usize>,
}

impl ParseOptions {
    pub fn mainfn(&self) -> &str {
        self.mainfn.as_deref().unwrap_or("main")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Float,
    Int,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uniform {
    pub uniform_type: UniformType,
    pub index: u32,
    /// Zero for a single register, the register count for arrays.
    pub array_count: u32,
    /// Literal array built from DEF constants rather than supplied by the application.
    pub constant: bool,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub usage: Usage,
    pub index: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sampler {
    pub texture_type: TextureType,
    pub index: u32,
    pub name: String,
    /// Needs bump-environment uniforms (`texbem`/`texbeml`).
    pub texbem: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant {
    pub index: u32,
    pub value: ConstantValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub filename: Option<String>,
    /// Byte offset of the offending token, when known.
    pub position: Option<usize>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(filename) = &self.filename {
            write!(f, "{filename}:")?;
        }
        match self.position {
            Some(position) => write!(f, "{position}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ParseError {}

/// Everything a parse produces. Always well-formed, even when `errors` is not empty.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub output: Vec<u8>,
    pub major_ver: u8,
    pub minor_ver: u8,
    pub shader_type: Option<ShaderType>,
    pub instruction_count: u32,
    /// Used arrays first, by start register, then single float, int and bool registers.
    /// Profiles that pack uniforms assign slots in this order.
    pub uniforms: Vec<Uniform>,
    pub attributes: Vec<Attribute>,
    pub outputs: Vec<Attribute>,
    pub samplers: Vec<Sampler>,
    pub constants: Vec<Constant>,
    pub symbols: Vec<Symbol>,
    pub errors: Vec<ParseError>,
    pub swizzles: Vec<SwizzleRemap>,
    pub preshader: Option<Preshader>,
    pub mainfn: String,
}

impl ParseResult {
    pub const OUT_OF_MEMORY: &'static str = "Out of memory";

    /// Canonical result for allocation failure.
    pub fn out_of_memory() -> Self {
        Self {
            errors: vec![ParseError {
                message: Self::OUT_OF_MEMORY.to_owned(),
                filename: None,
                position: None,
            }],
            ..Self::default()
        }
    }

    /// Result for a failure before any decoding started.
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            errors: vec![ParseError {
                message: message.into(),
                filename: None,
                position: None,
            }],
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Output as text; lossy for binary profiles.
    pub fn output_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }
}
