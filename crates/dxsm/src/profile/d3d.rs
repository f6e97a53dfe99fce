//! D3D assembly text, close to what the D3DX disassembler prints.

use crate::opcodes::Opcode;
use crate::output::{out_line, Section};
use crate::parser::ParseState;
use crate::profile::{d3d_register_name, format_float, Comparison, Profile};
use crate::types::{
    component_letter, DestOperand, RegisterType, RelativeAddress, ResultModifiers, SourceModifier,
    SourceOperand, Swizzle, TextureType, Usage, WriteMask,
};
use crate::validate::{dcl_texture_type, dcl_usage};

pub struct D3dProfile;

impl D3dProfile {
    fn relative(ctx: &ParseState<'_>, base: String, regnum: u32, rel: &RelativeAddress) -> String {
        let mut index = d3d_register_name(ctx.version, rel.regtype, rel.regnum);
        if rel.regtype != RegisterType::Loop {
            index.push('.');
            index.push(component_letter(rel.component));
        }
        if ctx.version.major == 1 {
            let letter = base.trim_end_matches(|c: char| c.is_ascii_digit());
            if regnum == 0 {
                format!("{letter}[{index}]")
            } else {
                format!("{letter}[{index} + {regnum}]")
            }
        } else {
            format!("{base}[{index}]")
        }
    }

    fn dest(ctx: &ParseState<'_>, dest: &DestOperand) -> String {
        let mut s = d3d_register_name(ctx.version, dest.regtype, dest.regnum);
        if let Some(rel) = &dest.relative {
            s = Self::relative(ctx, s, dest.regnum, rel);
        }
        if !dest.writemask.is_full() {
            s.push('.');
            s.push_str(&dest.writemask.letters());
        }
        s
    }

    fn source(ctx: &ParseState<'_>, src: &SourceOperand) -> String {
        let mut reg = d3d_register_name(ctx.version, src.regtype, src.regnum);
        if let Some(rel) = &src.relative {
            reg = Self::relative(ctx, reg, src.regnum, rel);
        }
        let (pre, post) = match src.modifier {
            SourceModifier::None => ("", ""),
            SourceModifier::Negate => ("-", ""),
            SourceModifier::Bias => ("", "_bias"),
            SourceModifier::BiasNegate => ("-", "_bias"),
            SourceModifier::Sign => ("", "_bx2"),
            SourceModifier::SignNegate => ("-", "_bx2"),
            SourceModifier::Complement => ("1-", ""),
            SourceModifier::X2 => ("", "_x2"),
            SourceModifier::X2Negate => ("-", "_x2"),
            SourceModifier::Dz => ("", "_dz"),
            SourceModifier::Dw => ("", "_dw"),
            SourceModifier::Abs => ("", "_abs"),
            SourceModifier::AbsNegate => ("-", "_abs"),
            SourceModifier::Not => ("!", ""),
        };
        format!("{pre}{reg}{post}{}", swizzle_suffix(src.swizzle))
    }

    fn modifiers(dest: &DestOperand) -> String {
        let mut s = String::new();
        if dest.result_mod.contains(ResultModifiers::SATURATE) {
            s.push_str("_sat");
        }
        if dest.result_mod.contains(ResultModifiers::PARTIAL_PRECISION) {
            s.push_str("_pp");
        }
        if dest.result_mod.contains(ResultModifiers::CENTROID) {
            s.push_str("_centroid");
        }
        s.push_str(match dest.result_shift {
            1 => "_x2",
            2 => "_x4",
            3 => "_x8",
            -1 => "_d2",
            -2 => "_d4",
            -3 => "_d8",
            _ => "",
        });
        s
    }

    fn mnemonic(ctx: &ParseState<'_>, opcode: Opcode) -> String {
        let version = ctx.version;
        match opcode {
            Opcode::Tex => match (version.major, version.minor) {
                (1, 4) => "texld".to_owned(),
                (1, _) => "tex".to_owned(),
                _ => match ctx.controls {
                    1 => "texldp".to_owned(),
                    2 => "texldb".to_owned(),
                    _ => "texld".to_owned(),
                },
            },
            Opcode::TexCoord if version.minor == 4 => "texcrd".to_owned(),
            Opcode::Ifc | Opcode::Breakc | Opcode::Setp => {
                let suffix = Comparison::from_controls(ctx.controls).map_or("", Comparison::suffix);
                format!("{}{suffix}", opcode.name())
            }
            _ => opcode.name().to_owned(),
        }
    }

    fn dcl(ctx: &ParseState<'_>) -> String {
        let dest = ctx.dest;
        let control = ctx.dcl_control;
        let mods = Self::modifiers(&dest);
        let reg = Self::dest(ctx, &dest);
        let version = ctx.version;
        match dest.regtype {
            RegisterType::Sampler => {
                let texture_type = TextureType::from_raw(dcl_texture_type(control))
                    .unwrap_or(TextureType::Texture2D);
                format!("dcl_{}{mods} {reg}", texture_type.name())
            }
            RegisterType::Misc => format!("dcl{mods} {reg}"),
            RegisterType::Input | RegisterType::Texture
                if version.is_pixel() && version.major == 2 =>
            {
                format!("dcl{mods} {reg}")
            }
            _ => {
                let (raw_usage, index) = dcl_usage(control);
                let usage = Usage::from_raw(raw_usage).map_or("unknown", Usage::name);
                if index == 0 {
                    format!("dcl_{usage}{mods} {reg}")
                } else {
                    format!("dcl_{usage}{index}{mods} {reg}")
                }
            }
        }
    }

    fn def(ctx: &ParseState<'_>, opcode: Opcode) -> String {
        let reg = Self::dest(ctx, &ctx.dest);
        let dwords = ctx.dwords;
        match opcode {
            Opcode::DefI => format!(
                "defi {reg}, {}, {}, {}, {}",
                dwords[0] as i32, dwords[1] as i32, dwords[2] as i32, dwords[3] as i32
            ),
            Opcode::DefB => format!(
                "defb {reg}, {}",
                if dwords[0] != 0 { "true" } else { "false" }
            ),
            _ => {
                let values: Vec<String> = dwords
                    .iter()
                    .map(|&d| format_float(f32::from_bits(d)))
                    .collect();
                format!("def {reg}, {}", values.join(", "))
            }
        }
    }

    fn instruction(ctx: &ParseState<'_>, opcode: Opcode) -> String {
        let desc = opcode.descriptor();
        let mut operands = Vec::with_capacity(ctx.source_count + 1);
        if desc.shape.has_dest() {
            operands.push(Self::dest(ctx, &ctx.dest));
        }
        for src in &ctx.sources[..ctx.source_count] {
            operands.push(Self::source(ctx, src));
        }

        let mut line = String::new();
        if ctx.coissue {
            line.push('+');
        }
        if let Some(pred) = &ctx.predicate {
            line.push('(');
            line.push_str(&Self::source(ctx, pred));
            line.push_str(") ");
        }
        line.push_str(&Self::mnemonic(ctx, opcode));
        if desc.shape.has_dest() {
            line.push_str(&Self::modifiers(&ctx.dest));
        }
        if !operands.is_empty() {
            line.push(' ');
            line.push_str(&operands.join(", "));
        }
        line
    }
}

/// Identity swizzles print nothing, replicates print one letter.
fn swizzle_suffix(swizzle: Swizzle) -> String {
    if swizzle.is_identity() {
        String::new()
    } else if swizzle.is_replicate() {
        format!(".{}", component_letter(swizzle.component(0)))
    } else {
        format!(".{}", swizzle.letters())
    }
}

impl Profile for D3dProfile {
    fn name(&self) -> &'static str {
        "d3d"
    }

    fn register_name(&self, ctx: &ParseState<'_>, regtype: RegisterType, regnum: u32) -> String {
        d3d_register_name(ctx.version, regtype, regnum)
    }

    fn start(&mut self, ctx: &mut ParseState<'_>) {
        let version = ctx.version;
        ctx.with_section(Section::Preflight, |ctx| out_line!(ctx.out, "{version}"));
        ctx.out.set_indent_level(1);
    }

    fn end(&mut self, ctx: &mut ParseState<'_>) {
        ctx.with_section(Section::Postflight, |ctx| out_line!(ctx.out, "end"));
    }

    fn phase(&mut self, ctx: &mut ParseState<'_>) {
        out_line!(ctx.out, "phase");
    }

    fn emit(&mut self, ctx: &mut ParseState<'_>, opcode: Opcode) {
        let line = match opcode {
            Opcode::Dcl => Self::dcl(ctx),
            Opcode::Def | Opcode::DefI | Opcode::DefB => Self::def(ctx, opcode),
            _ => Self::instruction(ctx, opcode),
        };
        if matches!(
            opcode,
            Opcode::EndLoop | Opcode::EndRep | Opcode::EndIf | Opcode::Else
        ) {
            ctx.out.dedent();
        }
        out_line!(ctx.out, "{line}");
        if matches!(
            opcode,
            Opcode::Loop | Opcode::Rep | Opcode::If | Opcode::Ifc | Opcode::Else
        ) {
            ctx.out.indent();
        }
    }
}
