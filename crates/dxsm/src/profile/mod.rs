//! Output profiles.
//!
//! The parser drives a [`Profile`] through a fixed sequence of callbacks: `start`, one `emit`
//! per instruction, `end` at the END token, then the declaration callbacks and `finalize`.
//! Every callback except `emit` and `register_name` defaults to doing nothing.

mod bytecode;
mod d3d;
mod glsl;

use std::str::FromStr;

use crate::opcodes::Opcode;
use crate::parser::ParseState;
use crate::registers::{RegisterEntry, SamplerEntry, VariableGroup};
use crate::types::{RegisterType, ShaderVersion};

use bytecode::BytecodeProfile;
use d3d::D3dProfile;
use glsl::{GlslProfile, GlslVersion};

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile '{0}' is unknown or unsupported")]
    Unknown(String),
}

/// The profiles this crate can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    D3d,
    Bytecode,
    Glsl,
    Glsl120,
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 4] = [
        ProfileKind::D3d,
        ProfileKind::Bytecode,
        ProfileKind::Glsl,
        ProfileKind::Glsl120,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProfileKind::D3d => "d3d",
            ProfileKind::Bytecode => "bytecode",
            ProfileKind::Glsl => "glsl",
            ProfileKind::Glsl120 => "glsl120",
        }
    }

    pub(crate) fn create(self) -> Box<dyn Profile> {
        match self {
            ProfileKind::D3d => Box::new(D3dProfile),
            ProfileKind::Bytecode => Box::new(BytecodeProfile),
            ProfileKind::Glsl => Box::new(GlslProfile::new(GlslVersion::V110)),
            ProfileKind::Glsl120 => Box::new(GlslProfile::new(GlslVersion::V120)),
        }
    }
}

impl FromStr for ProfileKind {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProfileKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ProfileError::Unknown(s.to_owned()))
    }
}

#[allow(unused_variables)]
pub trait Profile {
    fn name(&self) -> &'static str;

    /// Name the profile gives `regtype:regnum` in its output.
    fn register_name(&self, ctx: &ParseState<'_>, regtype: RegisterType, regnum: u32) -> String;

    fn start(&mut self, ctx: &mut ParseState<'_>) {}

    fn end(&mut self, ctx: &mut ParseState<'_>) {}

    /// The ps_1_4 PHASE marker.
    fn phase(&mut self, ctx: &mut ParseState<'_>) {}

    /// A register that needs a variable of its own (temps, address, loop, predicate, labels).
    fn global(&mut self, ctx: &mut ParseState<'_>, regtype: RegisterType, regnum: u32) {}

    /// A relatively addressed uniform array.
    fn array(&mut self, ctx: &mut ParseState<'_>, group: VariableGroup) {}

    /// A relatively addressed array built from DEF literals.
    fn const_array(&mut self, ctx: &mut ParseState<'_>, group: VariableGroup, values: &[[f32; 4]]) {}

    /// A uniform register. `group` is set when the register lives inside a used array.
    fn uniform(
        &mut self,
        ctx: &mut ParseState<'_>,
        regtype: RegisterType,
        regnum: u32,
        group: Option<VariableGroup>,
    ) {
    }

    fn sampler(&mut self, ctx: &mut ParseState<'_>, sampler: SamplerEntry) {}

    /// A declared or implied input or output.
    fn attribute(&mut self, ctx: &mut ParseState<'_>, attribute: RegisterEntry) {}

    fn emit(&mut self, ctx: &mut ParseState<'_>, opcode: Opcode);

    fn finalize(&mut self, ctx: &mut ParseState<'_>) {}
}

/// Register names as the D3D assembler spells them.
pub(crate) fn d3d_register_name(version: ShaderVersion, regtype: RegisterType, regnum: u32) -> String {
    match regtype {
        RegisterType::Temp => format!("r{regnum}"),
        RegisterType::Input => format!("v{regnum}"),
        RegisterType::Const => format!("c{regnum}"),
        RegisterType::Address => format!("a{regnum}"),
        RegisterType::Texture => format!("t{regnum}"),
        RegisterType::RastOut => match regnum {
            0 => "oPos".to_owned(),
            1 => "oFog".to_owned(),
            2 => "oPts".to_owned(),
            n => format!("oRast{n}"),
        },
        RegisterType::AttrOut => format!("oD{regnum}"),
        RegisterType::Output if version.major < 3 => format!("oT{regnum}"),
        RegisterType::Output => format!("o{regnum}"),
        RegisterType::ConstInt => format!("i{regnum}"),
        RegisterType::ColorOut => format!("oC{regnum}"),
        RegisterType::DepthOut => "oDepth".to_owned(),
        RegisterType::Sampler => format!("s{regnum}"),
        RegisterType::ConstBool => format!("b{regnum}"),
        RegisterType::Loop => "aL".to_owned(),
        RegisterType::TempFloat16 => format!("h{regnum}"),
        RegisterType::Misc => match regnum {
            0 => "vPos".to_owned(),
            1 => "vFace".to_owned(),
            n => format!("vMisc{n}"),
        },
        RegisterType::Label => format!("l{regnum}"),
        RegisterType::Predicate => format!("p{regnum}"),
    }
}

/// Comparison selected by the control bits of `ifc`, `breakc` and `setp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparison {
    Gt,
    Eq,
    Ge,
    Lt,
    Ne,
    Le,
}

impl Comparison {
    pub(crate) fn from_controls(controls: u32) -> Option<Self> {
        Some(match controls {
            1 => Self::Gt,
            2 => Self::Eq,
            3 => Self::Ge,
            4 => Self::Lt,
            5 => Self::Ne,
            6 => Self::Le,
            _ => return None,
        })
    }

    pub(crate) fn suffix(self) -> &'static str {
        match self {
            Self::Gt => "_gt",
            Self::Eq => "_eq",
            Self::Ge => "_ge",
            Self::Lt => "_lt",
            Self::Ne => "_ne",
            Self::Le => "_le",
        }
    }

    pub(crate) fn operator(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Eq => "==",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Ne => "!=",
            Self::Le => "<=",
        }
    }

    /// Component-wise GLSL builtin.
    pub(crate) fn function(self) -> &'static str {
        match self {
            Self::Gt => "greaterThan",
            Self::Eq => "equal",
            Self::Ge => "greaterThanEqual",
            Self::Lt => "lessThan",
            Self::Ne => "notEqual",
            Self::Le => "lessThanEqual",
        }
    }
}

/// Formats a float with an explicit decimal point so it always reads back as a float literal.
pub(crate) fn format_float(v: f32) -> String {
    if !v.is_finite() {
        return if v.is_nan() {
            "0.0".to_owned()
        } else if v > 0.0 {
            "3.4028235e38".to_owned()
        } else {
            "-3.4028235e38".to_owned()
        };
    }
    let mut s = format!("{v:.8}");
    if let Some(dot) = s.find('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.len() == dot + 1 {
            s.push('0');
        }
    }
    s
}
