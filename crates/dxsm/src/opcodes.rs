//! Opcode vocabulary and the static instruction table.

use crate::parser::ParseState;
use crate::validate::*;

bitflags::bitflags! {
    /// Shader stages an instruction may appear in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShaderTypes: u8 {
        const VERTEX = 0x1;
        const PIXEL = 0x2;
        const BOTH = Self::VERTEX.bits() | Self::PIXEL.bits();
    }
}

/// Operand layout of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgShape {
    None,
    D,
    S,
    SS,
    DS,
    DSS,
    DSSS,
    DSSSS,
    /// Destination plus four raw dwords.
    Def,
    /// Destination plus one raw dword.
    DefB,
    /// Usage/texture-type control token plus destination.
    Dcl,
    /// Destination plus one source in SM3, three before.
    SinCos,
    /// `tex t#` (ps_1_1..1_3), `texld r#, t#` (ps_1_4), `texld r#, src, s#` (SM2+).
    Tex,
    /// `texcoord t#`, or `texcrd r#, t#` in ps_1_4.
    TexCrd,
}

impl ArgShape {
    pub fn has_dest(self) -> bool {
        !matches!(self, ArgShape::None | ArgShape::S | ArgShape::SS)
    }
}

/// Runs per-opcode legality rules against the decoded operands.
pub type Validator = fn(&mut ParseState<'_>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop = 0,
    Mov = 1,
    Add = 2,
    Sub = 3,
    Mad = 4,
    Mul = 5,
    Rcp = 6,
    Rsq = 7,
    Dp3 = 8,
    Dp4 = 9,
    Min = 10,
    Max = 11,
    Slt = 12,
    Sge = 13,
    Exp = 14,
    Log = 15,
    Lit = 16,
    Dst = 17,
    Lrp = 18,
    Frc = 19,
    M4x4 = 20,
    M4x3 = 21,
    M3x4 = 22,
    M3x3 = 23,
    M3x2 = 24,
    Call = 25,
    CallNz = 26,
    Loop = 27,
    Ret = 28,
    EndLoop = 29,
    Label = 30,
    Dcl = 31,
    Pow = 32,
    Crs = 33,
    Sgn = 34,
    Abs = 35,
    Nrm = 36,
    SinCos = 37,
    Rep = 38,
    EndRep = 39,
    If = 40,
    Ifc = 41,
    Else = 42,
    EndIf = 43,
    Break = 44,
    Breakc = 45,
    Mova = 46,
    DefB = 47,
    DefI = 48,
    TexCoord = 49,
    TexKill = 50,
    Tex = 51,
    TexBem = 52,
    TexBemL = 53,
    TexReg2Ar = 54,
    TexReg2Gb = 55,
    TexM3x2Pad = 56,
    TexM3x2Tex = 57,
    TexM3x3Pad = 58,
    TexM3x3Tex = 59,
    TexM3x3Spec = 60,
    TexM3x3VSpec = 61,
    ExpP = 62,
    LogP = 63,
    Cnd = 64,
    Def = 65,
    TexReg2Rgb = 66,
    TexDp3Tex = 67,
    TexM3x2Depth = 68,
    TexDp3 = 69,
    TexM3x3 = 70,
    TexDepth = 71,
    Cmp = 72,
    Bem = 73,
    Dp2Add = 74,
    Dsx = 75,
    Dsy = 76,
    TexLdd = 77,
    Setp = 78,
    TexLdl = 79,
    BreakP = 80,
}

impl Opcode {
    /// Maps a raw `D3DSIO_*` value to an opcode. `PHASE`, `COMMENT` and `END` are handled by the
    /// stream loop and are not part of the table.
    pub fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::Nop,
            1 => Self::Mov,
            2 => Self::Add,
            3 => Self::Sub,
            4 => Self::Mad,
            5 => Self::Mul,
            6 => Self::Rcp,
            7 => Self::Rsq,
            8 => Self::Dp3,
            9 => Self::Dp4,
            10 => Self::Min,
            11 => Self::Max,
            12 => Self::Slt,
            13 => Self::Sge,
            14 => Self::Exp,
            15 => Self::Log,
            16 => Self::Lit,
            17 => Self::Dst,
            18 => Self::Lrp,
            19 => Self::Frc,
            20 => Self::M4x4,
            21 => Self::M4x3,
            22 => Self::M3x4,
            23 => Self::M3x3,
            24 => Self::M3x2,
            25 => Self::Call,
            26 => Self::CallNz,
            27 => Self::Loop,
            28 => Self::Ret,
            29 => Self::EndLoop,
            30 => Self::Label,
            31 => Self::Dcl,
            32 => Self::Pow,
            33 => Self::Crs,
            34 => Self::Sgn,
            35 => Self::Abs,
            36 => Self::Nrm,
            37 => Self::SinCos,
            38 => Self::Rep,
            39 => Self::EndRep,
            40 => Self::If,
            41 => Self::Ifc,
            42 => Self::Else,
            43 => Self::EndIf,
            44 => Self::Break,
            45 => Self::Breakc,
            46 => Self::Mova,
            47 => Self::DefB,
            48 => Self::DefI,
            64 => Self::TexCoord,
            65 => Self::TexKill,
            66 => Self::Tex,
            67 => Self::TexBem,
            68 => Self::TexBemL,
            69 => Self::TexReg2Ar,
            70 => Self::TexReg2Gb,
            71 => Self::TexM3x2Pad,
            72 => Self::TexM3x2Tex,
            73 => Self::TexM3x3Pad,
            74 => Self::TexM3x3Tex,
            76 => Self::TexM3x3Spec,
            77 => Self::TexM3x3VSpec,
            78 => Self::ExpP,
            79 => Self::LogP,
            80 => Self::Cnd,
            81 => Self::Def,
            82 => Self::TexReg2Rgb,
            83 => Self::TexDp3Tex,
            84 => Self::TexM3x2Depth,
            85 => Self::TexDp3,
            86 => Self::TexM3x3,
            87 => Self::TexDepth,
            88 => Self::Cmp,
            89 => Self::Bem,
            90 => Self::Dp2Add,
            91 => Self::Dsx,
            92 => Self::Dsy,
            93 => Self::TexLdd,
            94 => Self::Setp,
            95 => Self::TexLdl,
            96 => Self::BreakP,
            _ => return None,
        })
    }

    pub fn raw(self) -> u16 {
        match self {
            Self::Nop => 0,
            Self::Mov => 1,
            Self::Add => 2,
            Self::Sub => 3,
            Self::Mad => 4,
            Self::Mul => 5,
            Self::Rcp => 6,
            Self::Rsq => 7,
            Self::Dp3 => 8,
            Self::Dp4 => 9,
            Self::Min => 10,
            Self::Max => 11,
            Self::Slt => 12,
            Self::Sge => 13,
            Self::Exp => 14,
            Self::Log => 15,
            Self::Lit => 16,
            Self::Dst => 17,
            Self::Lrp => 18,
            Self::Frc => 19,
            Self::M4x4 => 20,
            Self::M4x3 => 21,
            Self::M3x4 => 22,
            Self::M3x3 => 23,
            Self::M3x2 => 24,
            Self::Call => 25,
            Self::CallNz => 26,
            Self::Loop => 27,
            Self::Ret => 28,
            Self::EndLoop => 29,
            Self::Label => 30,
            Self::Dcl => 31,
            Self::Pow => 32,
            Self::Crs => 33,
            Self::Sgn => 34,
            Self::Abs => 35,
            Self::Nrm => 36,
            Self::SinCos => 37,
            Self::Rep => 38,
            Self::EndRep => 39,
            Self::If => 40,
            Self::Ifc => 41,
            Self::Else => 42,
            Self::EndIf => 43,
            Self::Break => 44,
            Self::Breakc => 45,
            Self::Mova => 46,
            Self::DefB => 47,
            Self::DefI => 48,
            Self::TexCoord => 64,
            Self::TexKill => 65,
            Self::Tex => 66,
            Self::TexBem => 67,
            Self::TexBemL => 68,
            Self::TexReg2Ar => 69,
            Self::TexReg2Gb => 70,
            Self::TexM3x2Pad => 71,
            Self::TexM3x2Tex => 72,
            Self::TexM3x3Pad => 73,
            Self::TexM3x3Tex => 74,
            Self::TexM3x3Spec => 76,
            Self::TexM3x3VSpec => 77,
            Self::ExpP => 78,
            Self::LogP => 79,
            Self::Cnd => 80,
            Self::Def => 81,
            Self::TexReg2Rgb => 82,
            Self::TexDp3Tex => 83,
            Self::TexM3x2Depth => 84,
            Self::TexDp3 => 85,
            Self::TexM3x3 => 86,
            Self::TexDepth => 87,
            Self::Cmp => 88,
            Self::Bem => 89,
            Self::Dp2Add => 90,
            Self::Dsx => 91,
            Self::Dsy => 92,
            Self::TexLdd => 93,
            Self::Setp => 94,
            Self::TexLdl => 95,
            Self::BreakP => 96,
        }
    }

    pub fn descriptor(self) -> &'static InstructionDescriptor {
        &INSTRUCTIONS[self as usize]
    }

    /// Lower-case assembly mnemonic.
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// DEF, DEFI, DEFB and DCL may only appear before the first executable instruction.
    pub fn is_declaration(self) -> bool {
        matches!(self, Self::Def | Self::DefI | Self::DefB | Self::Dcl)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InstructionDescriptor {
    pub opcode: Opcode,
    pub name: &'static str,
    /// Instruction slot cost summed into the instruction count.
    pub slots: u32,
    pub shader_types: ShaderTypes,
    pub shape: ArgShape,
    /// Oldest and newest shader model major versions that accept the opcode.
    pub min_major: u8,
    pub max_major: u8,
    pub validator: Option<Validator>,
}

macro_rules! instruction {
    (
        $op:ident,
        $name:literal,
        $slots:literal,
        $types:ident,
        $shape:ident,
        $min:literal..=$max:literal,
        $validator:expr
    ) => {
        InstructionDescriptor {
            opcode: Opcode::$op,
            name: $name,
            slots: $slots,
            shader_types: ShaderTypes::$types,
            shape: ArgShape::$shape,
            min_major: $min,
            max_major: $max,
            validator: $validator,
        }
    };
}

/// Indexed by `Opcode as usize`.
pub static INSTRUCTIONS: [InstructionDescriptor; 81] = [
    instruction!(Nop, "nop", 1, BOTH, None, 1..=3, None),
    instruction!(Mov, "mov", 1, BOTH, DS, 1..=3, None),
    instruction!(Add, "add", 1, BOTH, DSS, 1..=3, None),
    instruction!(Sub, "sub", 1, BOTH, DSS, 1..=3, None),
    instruction!(Mad, "mad", 1, BOTH, DSSS, 1..=3, None),
    instruction!(Mul, "mul", 1, BOTH, DSS, 1..=3, None),
    instruction!(Rcp, "rcp", 1, BOTH, DS, 1..=3, None),
    instruction!(Rsq, "rsq", 1, BOTH, DS, 1..=3, None),
    instruction!(Dp3, "dp3", 1, BOTH, DSS, 1..=3, None),
    instruction!(Dp4, "dp4", 1, BOTH, DSS, 1..=3, None),
    instruction!(Min, "min", 1, BOTH, DSS, 1..=3, None),
    instruction!(Max, "max", 1, BOTH, DSS, 1..=3, None),
    instruction!(Slt, "slt", 1, VERTEX, DSS, 1..=3, None),
    instruction!(Sge, "sge", 1, VERTEX, DSS, 1..=3, None),
    instruction!(Exp, "exp", 1, BOTH, DS, 1..=3, None),
    instruction!(Log, "log", 1, BOTH, DS, 1..=3, None),
    instruction!(Lit, "lit", 3, VERTEX, DS, 1..=3, None),
    instruction!(Dst, "dst", 1, VERTEX, DSS, 1..=3, None),
    instruction!(Lrp, "lrp", 2, BOTH, DSSS, 1..=3, None),
    instruction!(Frc, "frc", 1, BOTH, DS, 1..=3, None),
    instruction!(M4x4, "m4x4", 4, BOTH, DSS, 1..=3, Some(validate_m4x4)),
    instruction!(M4x3, "m4x3", 3, BOTH, DSS, 1..=3, Some(validate_m4x3)),
    instruction!(M3x4, "m3x4", 4, BOTH, DSS, 1..=3, Some(validate_m3x4)),
    instruction!(M3x3, "m3x3", 3, BOTH, DSS, 1..=3, Some(validate_m3x3)),
    instruction!(M3x2, "m3x2", 2, BOTH, DSS, 1..=3, Some(validate_m3x2)),
    instruction!(Call, "call", 2, BOTH, S, 2..=3, Some(validate_call)),
    instruction!(CallNz, "callnz", 3, BOTH, SS, 2..=3, Some(validate_callnz)),
    instruction!(Loop, "loop", 3, BOTH, SS, 2..=3, Some(validate_loop)),
    instruction!(Ret, "ret", 1, BOTH, None, 2..=3, Some(validate_ret)),
    instruction!(EndLoop, "endloop", 2, BOTH, None, 2..=3, Some(validate_endloop)),
    instruction!(Label, "label", 0, BOTH, S, 2..=3, Some(validate_label)),
    instruction!(Dcl, "dcl", 0, BOTH, Dcl, 1..=3, Some(validate_dcl)),
    instruction!(Pow, "pow", 3, BOTH, DSS, 2..=3, None),
    instruction!(Crs, "crs", 2, BOTH, DSS, 2..=3, None),
    instruction!(Sgn, "sgn", 3, VERTEX, DSSS, 2..=3, None),
    instruction!(Abs, "abs", 1, BOTH, DS, 2..=3, None),
    instruction!(Nrm, "nrm", 3, BOTH, DS, 2..=3, None),
    instruction!(SinCos, "sincos", 8, BOTH, SinCos, 2..=3, Some(validate_sincos)),
    instruction!(Rep, "rep", 3, BOTH, S, 2..=3, Some(validate_rep)),
    instruction!(EndRep, "endrep", 2, BOTH, None, 2..=3, Some(validate_endrep)),
    instruction!(If, "if", 3, BOTH, S, 2..=3, Some(validate_if)),
    instruction!(Ifc, "ifc", 3, BOTH, SS, 2..=3, Some(validate_ifc)),
    instruction!(Else, "else", 1, BOTH, None, 2..=3, Some(validate_else)),
    instruction!(EndIf, "endif", 1, BOTH, None, 2..=3, Some(validate_endif)),
    instruction!(Break, "break", 1, BOTH, None, 2..=3, Some(validate_break)),
    instruction!(Breakc, "breakc", 3, BOTH, SS, 2..=3, Some(validate_breakc)),
    instruction!(Mova, "mova", 1, VERTEX, DS, 2..=3, Some(validate_mova)),
    instruction!(DefB, "defb", 0, BOTH, DefB, 2..=3, Some(validate_defb)),
    instruction!(DefI, "defi", 0, BOTH, Def, 2..=3, Some(validate_defi)),
    instruction!(TexCoord, "texcoord", 1, PIXEL, TexCrd, 1..=1, Some(validate_texcoord)),
    instruction!(TexKill, "texkill", 2, PIXEL, D, 1..=3, Some(validate_texkill)),
    instruction!(Tex, "tex", 1, PIXEL, Tex, 1..=3, Some(validate_tex)),
    instruction!(TexBem, "texbem", 1, PIXEL, DS, 1..=1, Some(validate_texbem)),
    instruction!(TexBemL, "texbeml", 2, PIXEL, DS, 1..=1, Some(validate_texbem)),
    instruction!(TexReg2Ar, "texreg2ar", 1, PIXEL, DS, 1..=1, Some(validate_texreg2)),
    instruction!(TexReg2Gb, "texreg2gb", 1, PIXEL, DS, 1..=1, Some(validate_texreg2)),
    instruction!(TexM3x2Pad, "texm3x2pad", 1, PIXEL, DS, 1..=1, Some(validate_texm3x2pad)),
    instruction!(TexM3x2Tex, "texm3x2tex", 1, PIXEL, DS, 1..=1, Some(validate_texm3x2tex)),
    instruction!(TexM3x3Pad, "texm3x3pad", 1, PIXEL, DS, 1..=1, Some(validate_texm3x3pad)),
    instruction!(TexM3x3Tex, "texm3x3tex", 1, PIXEL, DS, 1..=1, Some(validate_texm3x3tex)),
    instruction!(TexM3x3Spec, "texm3x3spec", 1, PIXEL, DSS, 1..=1, Some(validate_texm3x3spec)),
    instruction!(TexM3x3VSpec, "texm3x3vspec", 1, PIXEL, DS, 1..=1, Some(validate_texm3x3vspec)),
    instruction!(ExpP, "expp", 1, BOTH, DS, 1..=3, None),
    instruction!(LogP, "logp", 1, BOTH, DS, 1..=3, None),
    instruction!(Cnd, "cnd", 1, PIXEL, DSSS, 1..=1, None),
    instruction!(Def, "def", 0, BOTH, Def, 1..=3, Some(validate_def)),
    instruction!(TexReg2Rgb, "texreg2rgb", 1, PIXEL, DS, 1..=1, Some(validate_texreg2)),
    instruction!(TexDp3Tex, "texdp3tex", 1, PIXEL, DS, 1..=1, Some(validate_texdp3)),
    instruction!(TexM3x2Depth, "texm3x2depth", 1, PIXEL, DS, 1..=1, Some(validate_texm3x2depth)),
    instruction!(TexDp3, "texdp3", 1, PIXEL, DS, 1..=1, Some(validate_texdp3)),
    instruction!(TexM3x3, "texm3x3", 1, PIXEL, DS, 1..=1, Some(validate_texm3x3)),
    instruction!(TexDepth, "texdepth", 1, PIXEL, D, 1..=1, Some(validate_texdepth)),
    instruction!(Cmp, "cmp", 1, PIXEL, DSSS, 1..=3, None),
    instruction!(Bem, "bem", 2, PIXEL, DSS, 1..=1, Some(validate_bem)),
    instruction!(Dp2Add, "dp2add", 2, PIXEL, DSSS, 2..=3, None),
    instruction!(Dsx, "dsx", 2, PIXEL, DS, 2..=3, None),
    instruction!(Dsy, "dsy", 2, PIXEL, DS, 2..=3, None),
    instruction!(TexLdd, "texldd", 3, PIXEL, DSSSS, 2..=3, Some(validate_texldd)),
    instruction!(Setp, "setp", 1, BOTH, DSS, 2..=3, Some(validate_setp)),
    instruction!(TexLdl, "texldl", 2, BOTH, DSS, 2..=3, Some(validate_texldl)),
    instruction!(BreakP, "breakp", 3, BOTH, S, 2..=3, Some(validate_breakp)),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_opcode() {
        for (i, desc) in INSTRUCTIONS.iter().enumerate() {
            assert_eq!(desc.opcode as usize, i, "{}", desc.name);
            assert_eq!(Opcode::from_raw(desc.opcode.raw()), Some(desc.opcode));
        }
    }

    #[test]
    fn raw_values_match_d3dsio() {
        assert_eq!(Opcode::from_raw(31), Some(Opcode::Dcl));
        assert_eq!(Opcode::from_raw(47), Some(Opcode::DefB));
        assert_eq!(Opcode::from_raw(48), Some(Opcode::DefI));
        assert_eq!(Opcode::from_raw(66), Some(Opcode::Tex));
        assert_eq!(Opcode::from_raw(81), Some(Opcode::Def));
        assert_eq!(Opcode::from_raw(94), Some(Opcode::Setp));
        assert_eq!(Opcode::from_raw(96), Some(Opcode::BreakP));
        assert_eq!(Opcode::from_raw(75), None);
        assert_eq!(Opcode::from_raw(49), None);
        assert_eq!(Opcode::from_raw(0xFFFD), None);
    }

    #[test]
    fn stage_masks() {
        assert!(Opcode::Mova.descriptor().shader_types == ShaderTypes::VERTEX);
        assert!(Opcode::Cmp.descriptor().shader_types == ShaderTypes::PIXEL);
        assert!(Opcode::Mov.descriptor().shader_types.contains(ShaderTypes::PIXEL));
    }
}
