//! Decoded shader-model vocabulary: versions, register files, usages and operand modifiers.

use std::fmt;

use crate::limits::{CONST2_OFFSET, CONST3_OFFSET, CONST4_OFFSET};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Vertex,
    Pixel,
}

impl ShaderType {
    /// Two-letter prefix used by assembly version lines and generated identifiers.
    pub fn prefix(self) -> &'static str {
        match self {
            ShaderType::Vertex => "vs",
            ShaderType::Pixel => "ps",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderVersion {
    pub shader_type: ShaderType,
    pub major: u8,
    pub minor: u8,
}

impl ShaderVersion {
    pub fn new(shader_type: ShaderType, major: u8, minor: u8) -> Self {
        Self {
            shader_type,
            major,
            minor,
        }
    }

    pub fn is_vertex(&self) -> bool {
        self.shader_type == ShaderType::Vertex
    }

    pub fn is_pixel(&self) -> bool {
        self.shader_type == ShaderType::Pixel
    }

    /// Returns true when this version is `major.minor` or newer.
    pub fn at_least(&self, major: u8, minor: u8) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    /// Returns true when this version is older than `major.minor`.
    pub fn below(&self, major: u8, minor: u8) -> bool {
        !self.at_least(major, minor)
    }

    pub fn is_supported(&self) -> bool {
        match self.shader_type {
            ShaderType::Vertex => {
                matches!((self.major, self.minor), (1, 1) | (2, 0) | (2, 1) | (3, 0))
            }
            ShaderType::Pixel => matches!(
                (self.major, self.minor),
                (1, 1) | (1, 2) | (1, 3) | (1, 4) | (2, 0) | (2, 1) | (3, 0)
            ),
        }
    }
}

impl fmt::Display for ShaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.shader_type.prefix();
        if self.major == 2 && self.minor == 1 {
            write!(f, "{prefix}_2_x")
        } else {
            write!(f, "{prefix}_{}_{}", self.major, self.minor)
        }
    }
}

/// Register files after stage-dependent decoding and `CONST2..4` folding.
///
/// Variant order is the iteration order of every register map in the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegisterType {
    Temp,
    Input,
    Const,
    /// `a0` (vertex shaders and relative-addressing tokens).
    Address,
    /// `t#` (pixel shaders).
    Texture,
    /// `oPos`, `oFog`, `oPts`.
    RastOut,
    /// `oD#`.
    AttrOut,
    /// `oT#` before SM3, `o#` in vs_3_0.
    Output,
    ConstInt,
    ColorOut,
    DepthOut,
    Sampler,
    ConstBool,
    Loop,
    TempFloat16,
    /// `vPos` / `vFace`.
    Misc,
    Label,
    Predicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegisterContext {
    Operand,
    Relative,
}

/// Folds the `CONST2`/`CONST3`/`CONST4` register types into `CONST`.
///
/// Returns the raw register type (0..=19) with the folded register number. Register types
/// other than 11/12/13 pass through unchanged.
pub fn normalize_register(raw_type: u32, regnum: u32) -> (u32, u32) {
    match raw_type {
        11 => (2, regnum + CONST2_OFFSET),
        12 => (2, regnum + CONST3_OFFSET),
        13 => (2, regnum + CONST4_OFFSET),
        other => (other, regnum),
    }
}

impl RegisterType {
    pub(crate) fn from_raw(raw: u32, shader_type: ShaderType, ctx: RegisterContext) -> Option<Self> {
        Some(match raw {
            0 => Self::Temp,
            1 => Self::Input,
            2 => Self::Const,
            3 => match (ctx, shader_type) {
                (RegisterContext::Relative, _) | (_, ShaderType::Vertex) => Self::Address,
                (RegisterContext::Operand, ShaderType::Pixel) => Self::Texture,
            },
            4 => Self::RastOut,
            5 => Self::AttrOut,
            6 => Self::Output,
            7 => Self::ConstInt,
            8 => Self::ColorOut,
            9 => Self::DepthOut,
            10 => Self::Sampler,
            14 => Self::ConstBool,
            15 => Self::Loop,
            16 => Self::TempFloat16,
            17 => Self::Misc,
            18 => Self::Label,
            19 => Self::Predicate,
            _ => return None,
        })
    }

    /// Raw `D3DSHADER_PARAM_REGISTER_TYPE` value.
    pub fn raw(self) -> u32 {
        match self {
            Self::Temp => 0,
            Self::Input => 1,
            Self::Const => 2,
            Self::Address | Self::Texture => 3,
            Self::RastOut => 4,
            Self::AttrOut => 5,
            Self::Output => 6,
            Self::ConstInt => 7,
            Self::ColorOut => 8,
            Self::DepthOut => 9,
            Self::Sampler => 10,
            Self::ConstBool => 14,
            Self::Loop => 15,
            Self::TempFloat16 => 16,
            Self::Misc => 17,
            Self::Label => 18,
            Self::Predicate => 19,
        }
    }

    /// True for register files the shader writes as stage outputs.
    pub fn is_output(self) -> bool {
        matches!(
            self,
            Self::RastOut | Self::AttrOut | Self::Output | Self::ColorOut | Self::DepthOut
        )
    }

    pub fn is_constant(self) -> bool {
        matches!(self, Self::Const | Self::ConstInt | Self::ConstBool)
    }
}

/// `D3DDECLUSAGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Usage {
    Position,
    BlendWeight,
    BlendIndices,
    Normal,
    PointSize,
    TexCoord,
    Tangent,
    Binormal,
    TessFactor,
    PositionT,
    Color,
    Fog,
    Depth,
    Sample,
}

impl Usage {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Position,
            1 => Self::BlendWeight,
            2 => Self::BlendIndices,
            3 => Self::Normal,
            4 => Self::PointSize,
            5 => Self::TexCoord,
            6 => Self::Tangent,
            7 => Self::Binormal,
            8 => Self::TessFactor,
            9 => Self::PositionT,
            10 => Self::Color,
            11 => Self::Fog,
            12 => Self::Depth,
            13 => Self::Sample,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::BlendWeight => "blendweight",
            Self::BlendIndices => "blendindices",
            Self::Normal => "normal",
            Self::PointSize => "psize",
            Self::TexCoord => "texcoord",
            Self::Tangent => "tangent",
            Self::Binormal => "binormal",
            Self::TessFactor => "tessfactor",
            Self::PositionT => "positiont",
            Self::Color => "color",
            Self::Fog => "fog",
            Self::Depth => "depth",
            Self::Sample => "sample",
        }
    }
}

/// `D3DSAMPLER_TEXTURE_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureType {
    Texture2D,
    TextureCube,
    TextureVolume,
}

impl TextureType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            2 => Some(Self::Texture2D),
            3 => Some(Self::TextureCube),
            4 => Some(Self::TextureVolume),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Texture2D => "2d",
            Self::TextureCube => "cube",
            Self::TextureVolume => "volume",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceModifier {
    #[default]
    None,
    Negate,
    Bias,
    BiasNegate,
    Sign,
    SignNegate,
    Complement,
    X2,
    X2Negate,
    Dz,
    Dw,
    Abs,
    AbsNegate,
    Not,
}

impl SourceModifier {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::None,
            1 => Self::Negate,
            2 => Self::Bias,
            3 => Self::BiasNegate,
            4 => Self::Sign,
            5 => Self::SignNegate,
            6 => Self::Complement,
            7 => Self::X2,
            8 => Self::X2Negate,
            9 => Self::Dz,
            10 => Self::Dw,
            11 => Self::Abs,
            12 => Self::AbsNegate,
            13 => Self::Not,
            _ => return None,
        })
    }

    /// Modifiers that only exist in ps_1_x.
    pub fn is_legacy(self) -> bool {
        matches!(
            self,
            Self::Bias
                | Self::BiasNegate
                | Self::Sign
                | Self::SignNegate
                | Self::Complement
                | Self::X2
                | Self::X2Negate
                | Self::Dz
                | Self::Dw
        )
    }
}

bitflags::bitflags! {
    /// Destination result modifiers (bits 20..24 of a destination token).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResultModifiers: u8 {
        const SATURATE = 0x1;
        const PARTIAL_PRECISION = 0x2;
        const CENTROID = 0x4;
    }
}

/// A packed source swizzle: two bits per output component, x in the low bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swizzle(pub u8);

impl Swizzle {
    pub const IDENTITY: Swizzle = Swizzle(0xE4);

    pub fn replicate(component: u8) -> Self {
        let c = component & 0x3;
        Self(c | (c << 2) | (c << 4) | (c << 6))
    }

    pub fn component(self, i: usize) -> u8 {
        (self.0 >> (i * 2)) & 0x3
    }

    pub fn is_identity(self) -> bool {
        self == Self::IDENTITY
    }

    pub fn is_replicate(self) -> bool {
        let x = self.component(0);
        (1..4).all(|i| self.component(i) == x)
    }

    /// Applies `remap` after this swizzle: component `i` reads `remap[self[i]]`.
    pub fn remap(self, remap: Swizzle) -> Swizzle {
        let mut out = 0u8;
        for i in 0..4 {
            out |= remap.component(self.component(i) as usize) << (i * 2);
        }
        Swizzle(out)
    }

    /// Returns the swizzled channel letters, `"xyzw"` style.
    pub fn letters(self) -> String {
        (0..4).map(|i| component_letter(self.component(i))).collect()
    }
}

impl Default for Swizzle {
    fn default() -> Self {
        Self::IDENTITY
    }
}

pub fn component_letter(component: u8) -> char {
    ['x', 'y', 'z', 'w'][usize::from(component & 0x3)]
}

/// Destination write-mask: bit 0 is x.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMask(pub u8);

impl WriteMask {
    pub const FULL: WriteMask = WriteMask(0xF);
    pub const XYZ: WriteMask = WriteMask(0x7);
    pub const XY: WriteMask = WriteMask(0x3);
    pub const X: WriteMask = WriteMask(0x1);
    pub const Y: WriteMask = WriteMask(0x2);

    pub fn is_full(self) -> bool {
        self.0 == 0xF
    }

    pub fn contains(self, component: usize) -> bool {
        self.0 & (1 << component) != 0
    }

    pub fn count(self) -> u32 {
        u32::from(self.0 & 0xF).count_ones()
    }

    pub fn letters(self) -> String {
        (0..4)
            .filter(|&i| self.contains(i))
            .map(|i| component_letter(i as u8))
            .collect()
    }
}

impl Default for WriteMask {
    fn default() -> Self {
        Self::FULL
    }
}

/// Relative-addressing register of an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeAddress {
    pub regtype: RegisterType,
    pub regnum: u32,
    pub component: u8,
    /// Index of the inferred constant array the base register falls into.
    pub group: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestOperand {
    pub token: u32,
    pub regtype: RegisterType,
    pub regnum: u32,
    pub writemask: WriteMask,
    pub result_mod: ResultModifiers,
    /// Signed power-of-two scale: 1 is `_x2`, -1 is `_d2`.
    pub result_shift: i8,
    pub relative: Option<RelativeAddress>,
}

impl Default for DestOperand {
    fn default() -> Self {
        Self {
            token: 0,
            regtype: RegisterType::Temp,
            regnum: 0,
            writemask: WriteMask::FULL,
            result_mod: ResultModifiers::empty(),
            result_shift: 0,
            relative: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOperand {
    pub token: u32,
    pub regtype: RegisterType,
    pub regnum: u32,
    pub swizzle: Swizzle,
    pub modifier: SourceModifier,
    pub relative: Option<RelativeAddress>,
}

impl Default for SourceOperand {
    fn default() -> Self {
        Self {
            token: 0,
            regtype: RegisterType::Temp,
            regnum: 0,
            swizzle: Swizzle::IDENTITY,
            modifier: SourceModifier::None,
            relative: None,
        }
    }
}
