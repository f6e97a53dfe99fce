//! GLSL 1.10/1.20 generation.
//!
//! Registers become prefixed globals (`vs_r0`, `ps_c3`). Uniform registers are packed into
//! one `vec4`, one `ivec4` and one `bool` array per shader and reached through `#define`s, so a
//! relatively addressed range only needs an `ARRAYBASE_n` offset into the packed array.
//! Fixed-function inputs and outputs alias the GL builtins the same way.

use std::collections::BTreeSet;

use crate::opcodes::Opcode;
use crate::output::{out_line, Section};
use crate::parser::ParseState;
use crate::profile::{d3d_register_name, format_float, Comparison, Profile};
use crate::registers::{RegisterEntry, SamplerEntry, VariableGroup};
use crate::types::{
    component_letter, RegisterType, ResultModifiers, SourceModifier, SourceOperand, TextureType,
    Usage, WriteMask,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlslVersion {
    V110,
    V120,
}

/// Texture lookup flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Plain,
    Projected,
    Bias,
    Lod,
    Grad,
}

pub struct GlslProfile {
    version: GlslVersion,
    float_uniforms: u32,
    int_uniforms: u32,
    bool_uniforms: u32,
    in_subroutine: bool,
    /// Open `loop` blocks: integer constant expression and the save slot of the outer `aL`.
    loops: Vec<(String, u32)>,
    bumpenv_stages: BTreeSet<u32>,
    needs_lod_extension: bool,
}

impl GlslProfile {
    pub fn new(version: GlslVersion) -> Self {
        Self {
            version,
            float_uniforms: 0,
            int_uniforms: 0,
            bool_uniforms: 0,
            in_subroutine: false,
            loops: Vec::new(),
            bumpenv_stages: BTreeSet::new(),
            needs_lod_extension: false,
        }
    }

    fn prefix(ctx: &ParseState<'_>) -> &'static str {
        ctx.version.shader_type.prefix()
    }

    fn name(ctx: &ParseState<'_>, regtype: RegisterType, regnum: u32) -> String {
        format!(
            "{}_{}",
            Self::prefix(ctx),
            d3d_register_name(ctx.version, regtype, regnum)
        )
    }

    /// Register reference for `src`, resolving relative addressing.
    fn register(ctx: &ParseState<'_>, src: &SourceOperand) -> String {
        let Some(rel) = &src.relative else {
            return Self::name(ctx, src.regtype, src.regnum);
        };
        let index = match rel.regtype {
            RegisterType::Loop => Self::name(ctx, RegisterType::Loop, 0),
            _ => format!(
                "{}.{}",
                Self::name(ctx, rel.regtype, rel.regnum),
                component_letter(rel.component)
            ),
        };
        let prefix = Self::prefix(ctx);
        match rel.group.and_then(|g| ctx.registers.groups().get(g)) {
            Some(group) if group.literal => format!(
                "{prefix}_const_array_{}_{}[{index} + {}]",
                group.index,
                group.count,
                src.regnum - group.index
            ),
            Some(group) => format!(
                "{prefix}_uniforms_vec4[ARRAYBASE_{} + {index} + {}]",
                group.index,
                src.regnum - group.index
            ),
            None => format!("{}[{index}]", Self::name(ctx, src.regtype, src.regnum)),
        }
    }

    /// Source expression restricted to the components of `mask`.
    fn source(ctx: &ParseState<'_>, src: &SourceOperand, mask: WriteMask) -> String {
        let base = Self::register(ctx, src);
        let letters: String = (0..4)
            .filter(|&i| mask.contains(i))
            .map(|i| component_letter(src.swizzle.component(i)))
            .collect();
        let reg = if letters == "xyzw" {
            base.clone()
        } else {
            format!("{base}.{letters}")
        };
        let component = |i: usize| format!("{base}.{}", component_letter(src.swizzle.component(i)));
        match src.modifier {
            SourceModifier::None => reg,
            SourceModifier::Negate => format!("-{reg}"),
            SourceModifier::Bias => format!("({reg} - 0.5)"),
            SourceModifier::BiasNegate => format!("-({reg} - 0.5)"),
            SourceModifier::Sign => format!("(({reg} * 2.0) - 1.0)"),
            SourceModifier::SignNegate => format!("-(({reg} * 2.0) - 1.0)"),
            SourceModifier::Complement => format!("(1.0 - {reg})"),
            SourceModifier::X2 => format!("({reg} * 2.0)"),
            SourceModifier::X2Negate => format!("-({reg} * 2.0)"),
            SourceModifier::Dz => format!("({reg} / {})", component(2)),
            SourceModifier::Dw => format!("({reg} / {})", component(3)),
            SourceModifier::Abs => format!("abs({reg})"),
            SourceModifier::AbsNegate => format!("-abs({reg})"),
            SourceModifier::Not => format!("!{reg}"),
        }
    }

    fn src(ctx: &ParseState<'_>, i: usize, mask: WriteMask) -> String {
        Self::source(ctx, &ctx.sources[i], mask)
    }

    fn scalar(ctx: &ParseState<'_>, i: usize) -> String {
        Self::src(ctx, i, WriteMask::X)
    }

    fn full(ctx: &ParseState<'_>, i: usize) -> String {
        Self::src(ctx, i, WriteMask::FULL)
    }

    /// Condition of `if`, `callnz` and `breakp`: a bool constant or one predicate component.
    fn condition(ctx: &ParseState<'_>, src: &SourceOperand) -> String {
        let not = if src.modifier == SourceModifier::Not { "!" } else { "" };
        let reg = Self::register(ctx, src);
        match src.regtype {
            RegisterType::Predicate => {
                format!("{not}{reg}.{}", component_letter(src.swizzle.component(0)))
            }
            _ => format!("{not}{reg}"),
        }
    }

    /// Destinations that map to scalar GL builtins.
    fn scalar_dest(ctx: &ParseState<'_>) -> bool {
        let dest = &ctx.dest;
        match dest.regtype {
            RegisterType::RastOut => dest.regnum != 0,
            RegisterType::DepthOut => true,
            RegisterType::Output if ctx.version.major >= 3 => ctx
                .registers
                .attribute(dest.regtype, dest.regnum)
                .and_then(|a| a.usage)
                .is_some_and(|u| matches!(u, Usage::Fog | Usage::PointSize)),
            _ => false,
        }
    }

    fn mask(ctx: &ParseState<'_>) -> WriteMask {
        if Self::scalar_dest(ctx) {
            WriteMask::X
        } else {
            ctx.dest.writemask
        }
    }

    fn components(ctx: &ParseState<'_>) -> u32 {
        Self::mask(ctx).count()
    }

    fn lhs(ctx: &ParseState<'_>) -> String {
        let dest = &ctx.dest;
        let name = Self::name(ctx, dest.regtype, dest.regnum);
        if Self::scalar_dest(ctx) || dest.writemask.is_full() {
            name
        } else {
            format!("{name}.{}", dest.writemask.letters())
        }
    }

    fn predicated(ctx: &mut ParseState<'_>, statement: String) {
        match ctx.predicate {
            Some(pred) => {
                let cond = Self::condition(ctx, &pred);
                out_line!(ctx.out, "if ({cond}) {{ {statement} }}");
            }
            None => out_line!(ctx.out, "{statement}"),
        }
    }

    /// Writes `expr` to the destination, applying result modifiers.
    fn assign(ctx: &mut ParseState<'_>, expr: String) {
        let dest = ctx.dest;
        let mut expr = expr;
        let scale = match dest.result_shift {
            1 => Some("2.0"),
            2 => Some("4.0"),
            3 => Some("8.0"),
            -1 => Some("0.5"),
            -2 => Some("0.25"),
            -3 => Some("0.125"),
            _ => None,
        };
        if let Some(scale) = scale {
            expr = format!("(({expr}) * {scale})");
        }
        if dest.result_mod.contains(ResultModifiers::SATURATE) {
            expr = format!("clamp({expr}, 0.0, 1.0)");
        }
        let lhs = Self::lhs(ctx);
        Self::predicated(ctx, format!("{lhs} = {expr};"));
    }

    /// Writes without result modifiers (integer and boolean destinations).
    fn assign_raw(ctx: &mut ParseState<'_>, expr: String) {
        let lhs = Self::lhs(ctx);
        Self::predicated(ctx, format!("{lhs} = {expr};"));
    }

    fn splat(n: u32, expr: String) -> String {
        if n == 1 {
            expr
        } else {
            format!("vec{n}({expr})")
        }
    }

    /// Selects the destination components from a full `vec4` expression.
    fn masked(ctx: &ParseState<'_>, vec4: String) -> String {
        let mask = Self::mask(ctx);
        if mask.is_full() {
            vec4
        } else {
            format!("{vec4}.{}", mask.letters())
        }
    }

    fn binary(ctx: &mut ParseState<'_>, op: &str) {
        let mask = Self::mask(ctx);
        let a = Self::src(ctx, 0, mask);
        let b = Self::src(ctx, 1, mask);
        Self::assign(ctx, format!("{a} {op} {b}"));
    }

    fn function1(ctx: &mut ParseState<'_>, f: &str) {
        let a = Self::src(ctx, 0, Self::mask(ctx));
        Self::assign(ctx, format!("{f}({a})"));
    }

    fn function2(ctx: &mut ParseState<'_>, f: &str) {
        let mask = Self::mask(ctx);
        let a = Self::src(ctx, 0, mask);
        let b = Self::src(ctx, 1, mask);
        Self::assign(ctx, format!("{f}({a}, {b})"));
    }

    fn scalar_function(ctx: &mut ParseState<'_>, expr: impl FnOnce(String) -> String) {
        let n = Self::components(ctx);
        let s = Self::scalar(ctx, 0);
        Self::assign(ctx, Self::splat(n, expr(s)));
    }

    fn compare(op: Comparison, a: &str, b: &str, n: u32) -> String {
        if n == 1 {
            format!("({a} {} {b})", op.operator())
        } else {
            format!("{}({a}, {b})", op.function())
        }
    }

    fn select(n: u32, cond_fn: &str, cond: &str, threshold: &str, a: &str, b: &str) -> String {
        if n == 1 {
            let op = if cond_fn == "greaterThan" { ">" } else { ">=" };
            format!("(({cond} {op} {threshold}) ? {a} : {b})")
        } else {
            format!("mix({b}, {a}, vec{n}({cond_fn}({cond}, vec{n}({threshold}))))")
        }
    }

    fn matrix(ctx: &mut ParseState<'_>, rows: u32, columns: WriteMask) {
        let state: &ParseState<'_> = ctx;
        let a = Self::src(state, 0, columns);
        let dots: Vec<String> = (0..rows)
            .map(|k| {
                let mut row = state.sources[1];
                row.regnum += k;
                format!("dot({a}, {})", Self::source(state, &row, columns))
            })
            .collect();
        Self::assign(ctx, format!("vec{rows}({})", dots.join(", ")));
    }

    fn sampler_name(ctx: &ParseState<'_>, stage: u32) -> String {
        Self::name(ctx, RegisterType::Sampler, stage)
    }

    fn lookup(&mut self, ctx: &ParseState<'_>, stage: u32, lookup: Lookup, coords: &str, extra: &[String]) -> String {
        let sampler = Self::sampler_name(ctx, stage);
        let texture_type = ctx.texture_type(stage);
        let (base, swizzle) = match texture_type {
            TextureType::Texture2D => ("texture2D", "xy"),
            TextureType::TextureCube => ("textureCube", "xyz"),
            TextureType::TextureVolume => ("texture3D", "xyz"),
        };
        if matches!(lookup, Lookup::Grad) || (lookup == Lookup::Lod && ctx.version.is_pixel()) {
            self.needs_lod_extension = true;
        }
        match lookup {
            Lookup::Plain => format!("{base}({sampler}, {coords}.{swizzle})"),
            Lookup::Projected if texture_type == TextureType::TextureCube => {
                format!("{base}({sampler}, {coords}.{swizzle})")
            }
            Lookup::Projected => format!("{base}Proj({sampler}, {coords})"),
            Lookup::Bias => format!("{base}({sampler}, {coords}.{swizzle}, {coords}.w)"),
            Lookup::Lod => format!("{base}Lod({sampler}, {coords}.{swizzle}, {coords}.w)"),
            Lookup::Grad => format!(
                "{base}GradARB({sampler}, {coords}.{swizzle}, {}.{swizzle}, {}.{swizzle})",
                extra.first().map_or("vec4(0.0)", String::as_str),
                extra.get(1).map_or("vec4(0.0)", String::as_str)
            ),
        }
    }

    /// Sample with a three-component coordinate expression (ps_1_x texture ops).
    fn lookup3(ctx: &ParseState<'_>, stage: u32, coords: &str) -> String {
        let sampler = Self::sampler_name(ctx, stage);
        match ctx.texture_type(stage) {
            TextureType::Texture2D => format!("texture2D({sampler}, ({coords}).xy)"),
            TextureType::TextureCube => format!("textureCube({sampler}, {coords})"),
            TextureType::TextureVolume => format!("texture3D({sampler}, {coords})"),
        }
    }

    fn texcoord(stage: u32) -> String {
        format!("gl_TexCoord[{stage}]")
    }

    /// Dot products of a completed `texm3x*` sequence.
    fn texm_dots(ctx: &ParseState<'_>) -> Vec<String> {
        let p = Self::prefix(ctx);
        ctx.pads
            .completed
            .iter()
            .map(|&(stage, src)| format!("dot({}.xyz, {p}_t{src}.xyz)", Self::texcoord(stage)))
            .collect()
    }

    fn texture_dest(ctx: &mut ParseState<'_>, expr: String) {
        let name = Self::name(ctx, RegisterType::Texture, ctx.dest.regnum);
        out_line!(ctx.out, "{name} = {expr};");
    }

    fn bumpenv(&mut self, ctx: &ParseState<'_>, stage: u32, src: &str) -> String {
        self.bumpenv_stages.insert(stage);
        let m = format!("{}_texbem", Self::sampler_name(ctx, stage));
        format!(
            "vec2({m}.x * {src}.x + {m}.z * {src}.y, {m}.y * {src}.x + {m}.w * {src}.y)"
        )
    }

    fn open_block(ctx: &mut ParseState<'_>, header: String) {
        out_line!(ctx.out, "{header}");
        out_line!(ctx.out, "{{");
        ctx.out.indent();
    }

    fn close_block(ctx: &mut ParseState<'_>) {
        ctx.out.dedent();
        out_line!(ctx.out, "}}");
    }

    fn emit_texture(&mut self, ctx: &mut ParseState<'_>, opcode: Opcode) {
        let version = ctx.version;
        let stage = ctx.dest.regnum;
        match opcode {
            Opcode::Tex => match (version.major, version.minor) {
                (1, 4) => {
                    let coords = Self::full(ctx, 0);
                    let sample = self.lookup(ctx, stage, Lookup::Plain, &coords, &[]);
                    let expr = Self::masked(ctx, sample);
                    Self::assign(ctx, expr);
                }
                (1, _) => {
                    let sample = self.lookup(ctx, stage, Lookup::Plain, &Self::texcoord(stage), &[]);
                    Self::texture_dest(ctx, sample);
                }
                _ => {
                    let lookup = match ctx.controls {
                        1 => Lookup::Projected,
                        2 => Lookup::Bias,
                        _ => Lookup::Plain,
                    };
                    let coords = Self::full(ctx, 0);
                    let sampler = ctx.sources[1].regnum;
                    let sample = self.lookup(ctx, sampler, lookup, &coords, &[]);
                    let expr = Self::masked(ctx, sample);
                    Self::assign(ctx, expr);
                }
            },
            Opcode::TexLdl | Opcode::TexLdd => {
                let coords = Self::full(ctx, 0);
                let sampler = ctx.sources[1].regnum;
                let (lookup, extra) = if opcode == Opcode::TexLdd {
                    (Lookup::Grad, vec![Self::full(ctx, 2), Self::full(ctx, 3)])
                } else {
                    (Lookup::Lod, Vec::new())
                };
                let sample = self.lookup(ctx, sampler, lookup, &coords, &extra);
                let expr = Self::masked(ctx, sample);
                Self::assign(ctx, expr);
            }
            Opcode::TexCoord => {
                if version.minor == 4 {
                    let expr = Self::src(ctx, 0, Self::mask(ctx));
                    Self::assign(ctx, expr);
                } else {
                    Self::texture_dest(ctx, format!("clamp({}, 0.0, 1.0)", Self::texcoord(stage)));
                }
            }
            Opcode::TexKill => {
                let dest = ctx.dest;
                let reg = if dest.regtype == RegisterType::Texture && version.minor < 4 && version.major == 1 {
                    Self::texcoord(dest.regnum)
                } else {
                    Self::name(ctx, dest.regtype, dest.regnum)
                };
                out_line!(ctx.out, "if (any(lessThan({reg}.xyz, vec3(0.0)))) discard;");
            }
            Opcode::TexBem | Opcode::TexBemL => {
                let src = Self::full(ctx, 0);
                let offset = self.bumpenv(ctx, stage, &src);
                let coords = format!("vec3({}.xy + {offset}, 0.0)", Self::texcoord(stage));
                let mut sample = Self::lookup3(ctx, stage, &coords);
                if opcode == Opcode::TexBemL {
                    let l = format!("{}_texbeml", Self::sampler_name(ctx, stage));
                    sample = format!("({sample} * ({src}.z * {l}.x + {l}.y))");
                }
                Self::texture_dest(ctx, sample);
            }
            Opcode::TexReg2Ar | Opcode::TexReg2Gb | Opcode::TexReg2Rgb => {
                let src = Self::full(ctx, 0);
                let coords = match opcode {
                    Opcode::TexReg2Ar => format!("vec3({src}.w, {src}.x, 0.0)"),
                    Opcode::TexReg2Gb => format!("vec3({src}.y, {src}.z, 0.0)"),
                    _ => format!("{src}.xyz"),
                };
                let sample = Self::lookup3(ctx, stage, &coords);
                Self::texture_dest(ctx, sample);
            }
            Opcode::TexM3x2Pad | Opcode::TexM3x3Pad => {}
            Opcode::TexM3x2Tex => {
                let dots = Self::texm_dots(ctx);
                let sample = Self::lookup3(ctx, stage, &format!("vec3({}, 0.0)", dots.join(", ")));
                Self::texture_dest(ctx, sample);
            }
            Opcode::TexM3x2Depth => {
                let dots = Self::texm_dots(ctx);
                if let [z, w] = dots.as_slice() {
                    out_line!(ctx.out, "gl_FragDepth = ({w} == 0.0) ? 1.0 : ({z} / {w});");
                }
            }
            Opcode::TexM3x3 => {
                let dots = Self::texm_dots(ctx);
                Self::texture_dest(ctx, format!("vec4({}, 1.0)", dots.join(", ")));
            }
            Opcode::TexM3x3Tex => {
                let dots = Self::texm_dots(ctx);
                let sample = Self::lookup3(ctx, stage, &format!("vec3({})", dots.join(", ")));
                Self::texture_dest(ctx, sample);
            }
            Opcode::TexM3x3Spec | Opcode::TexM3x3VSpec => {
                let dots = Self::texm_dots(ctx);
                let eye = if opcode == Opcode::TexM3x3Spec {
                    format!("{}.xyz", Self::full(ctx, 1))
                } else {
                    let ws: Vec<String> = ctx
                        .pads
                        .completed
                        .iter()
                        .map(|&(s, _)| format!("{}.w", Self::texcoord(s)))
                        .collect();
                    format!("vec3({})", ws.join(", "))
                };
                let reflect = "(2.0 * normal * (dot(normal, eye) / dot(normal, normal))) - eye";
                let sample = Self::lookup3(ctx, stage, reflect);
                out_line!(ctx.out, "{{");
                ctx.out.indent();
                out_line!(ctx.out, "vec3 normal = vec3({});", dots.join(", "));
                out_line!(ctx.out, "vec3 eye = {eye};");
                Self::texture_dest(ctx, sample);
                Self::close_block(ctx);
            }
            Opcode::TexDp3Tex | Opcode::TexDp3 => {
                let src = Self::full(ctx, 0);
                let dot = format!("dot({}.xyz, {src}.xyz)", Self::texcoord(stage));
                let expr = if opcode == Opcode::TexDp3 {
                    format!("vec4({dot})")
                } else {
                    Self::lookup3(ctx, stage, &format!("vec3({dot}, 0.0, 0.0)"))
                };
                Self::texture_dest(ctx, expr);
            }
            Opcode::TexDepth => {
                let r5 = Self::name(ctx, RegisterType::Temp, 5);
                out_line!(ctx.out, "gl_FragDepth = ({r5}.y == 0.0) ? 1.0 : ({r5}.x / {r5}.y);");
            }
            Opcode::Bem => {
                let a = Self::full(ctx, 0);
                let b = Self::full(ctx, 1);
                let offset = self.bumpenv(ctx, stage, &b);
                Self::assign(ctx, format!("{a}.xy + {offset}"));
            }
            _ => {}
        }
    }

    fn emit_flow(&mut self, ctx: &mut ParseState<'_>, opcode: Opcode) {
        let p = Self::prefix(ctx);
        match opcode {
            Opcode::Call => {
                let name = Self::name(ctx, RegisterType::Label, ctx.sources[0].regnum);
                out_line!(ctx.out, "{name}();");
            }
            Opcode::CallNz => {
                let name = Self::name(ctx, RegisterType::Label, ctx.sources[0].regnum);
                let cond = Self::condition(ctx, &ctx.sources[1]);
                out_line!(ctx.out, "if ({cond}) {{ {name}(); }}");
            }
            Opcode::Loop => {
                let slot = ctx.allocate_branch_label();
                let i = Self::register(ctx, &ctx.sources[1]);
                out_line!(ctx.out, "int {p}_aL_save{slot} = {p}_aL;");
                out_line!(ctx.out, "{p}_aL = {i}.y;");
                Self::open_block(
                    ctx,
                    format!("for (int {p}_loop{slot} = 0; {p}_loop{slot} < {i}.x; {p}_loop{slot}++)"),
                );
                self.loops.push((i, slot));
            }
            Opcode::EndLoop => {
                if let Some((i, slot)) = self.loops.pop() {
                    out_line!(ctx.out, "{p}_aL += {i}.z;");
                    Self::close_block(ctx);
                    out_line!(ctx.out, "{p}_aL = {p}_aL_save{slot};");
                }
            }
            Opcode::Rep => {
                let slot = ctx.allocate_branch_label();
                let i = Self::register(ctx, &ctx.sources[0]);
                Self::open_block(
                    ctx,
                    format!("for (int {p}_rep{slot} = 0; {p}_rep{slot} < {i}.x; {p}_rep{slot}++)"),
                );
            }
            Opcode::EndRep | Opcode::EndIf => Self::close_block(ctx),
            Opcode::If => {
                let cond = Self::condition(ctx, &ctx.sources[0]);
                Self::open_block(ctx, format!("if ({cond})"));
            }
            Opcode::Ifc | Opcode::Breakc => {
                let op = Comparison::from_controls(ctx.controls).unwrap_or(Comparison::Eq);
                let a = Self::scalar(ctx, 0);
                let b = Self::scalar(ctx, 1);
                let cond = format!("{a} {} {b}", op.operator());
                if opcode == Opcode::Ifc {
                    Self::open_block(ctx, format!("if ({cond})"));
                } else {
                    out_line!(ctx.out, "if ({cond}) {{ break; }}");
                }
            }
            Opcode::Else => {
                Self::close_block(ctx);
                Self::open_block(ctx, "else".to_owned());
            }
            Opcode::Break => out_line!(ctx.out, "break;"),
            Opcode::BreakP => {
                let cond = Self::condition(ctx, &ctx.sources[0]);
                out_line!(ctx.out, "if ({cond}) {{ break; }}");
            }
            Opcode::Label => {
                let label = ctx.sources[0].regnum;
                let section = if ctx.label_called(label) {
                    Section::Subroutines
                } else {
                    Section::Ignore
                };
                let name = Self::name(ctx, RegisterType::Label, label);
                ctx.out.push_section(section);
                ctx.out.set_indent_level(0);
                Self::open_block(ctx, format!("void {name}()"));
                self.in_subroutine = true;
            }
            Opcode::Ret => {
                // The validator only clears the subroutine on an unnested RET.
                if self.in_subroutine && ctx.subroutine.is_none() {
                    Self::close_block(ctx);
                    ctx.out.pop_section();
                    self.in_subroutine = false;
                } else {
                    out_line!(ctx.out, "return;");
                }
            }
            _ => {}
        }
    }

    fn emit_def(ctx: &mut ParseState<'_>, opcode: Opcode) {
        let name = Self::name(ctx, ctx.dest.regtype, ctx.dest.regnum);
        let d = ctx.dwords;
        let line = match opcode {
            Opcode::DefB => format!("const bool {name} = {};", d[0] != 0),
            Opcode::DefI => format!(
                "const ivec4 {name} = ivec4({}, {}, {}, {});",
                d[0] as i32, d[1] as i32, d[2] as i32, d[3] as i32
            ),
            _ => format!("const vec4 {name} = {};", vec4_literal(&d.map(f32::from_bits))),
        };
        ctx.with_section(Section::Globals, |ctx| out_line!(ctx.out, "{line}"));
    }

    /// Builtin aliased by an input or output register, or `None` for a custom varying.
    fn builtin(ctx: &ParseState<'_>, attr: &RegisterEntry) -> Option<String> {
        let version = ctx.version;
        let usage = attr.usage?;
        let index = attr.index;
        let fixed = match (attr.regtype, version.is_vertex()) {
            (RegisterType::RastOut, _) => match attr.regnum {
                0 => "gl_Position".to_owned(),
                1 => "gl_FogFragCoord".to_owned(),
                _ => "gl_PointSize".to_owned(),
            },
            (RegisterType::AttrOut, _) if index == 0 => "gl_FrontColor".to_owned(),
            (RegisterType::AttrOut, _) => "gl_FrontSecondaryColor".to_owned(),
            (RegisterType::Output, true) if version.major < 3 => Self::texcoord(attr.regnum),
            (RegisterType::ColorOut, _) => format!("gl_FragData[{}]", attr.regnum),
            (RegisterType::DepthOut, _) => "gl_FragDepth".to_owned(),
            (RegisterType::Texture, false) => Self::texcoord(attr.regnum),
            (RegisterType::Output, true) | (RegisterType::Input, false) => {
                let output = attr.regtype == RegisterType::Output;
                match (usage, index) {
                    (Usage::Position, 0) if output => "gl_Position".to_owned(),
                    (Usage::PointSize, 0) if output => "gl_PointSize".to_owned(),
                    (Usage::Fog, 0) if output => "gl_FogFragCoord".to_owned(),
                    (Usage::Fog, 0) => "vec4(gl_FogFragCoord)".to_owned(),
                    (Usage::Color, 0) if output => "gl_FrontColor".to_owned(),
                    (Usage::Color, 1) if output => "gl_FrontSecondaryColor".to_owned(),
                    (Usage::Color, 0) => "gl_Color".to_owned(),
                    (Usage::Color, 1) => "gl_SecondaryColor".to_owned(),
                    (Usage::TexCoord, n) => Self::texcoord(n),
                    _ => return None,
                }
            }
            _ => return None,
        };
        Some(fixed)
    }
}

fn vec4_literal(v: &[f32; 4]) -> String {
    format!(
        "vec4({}, {}, {}, {})",
        format_float(v[0]),
        format_float(v[1]),
        format_float(v[2]),
        format_float(v[3])
    )
}

impl Profile for GlslProfile {
    fn name(&self) -> &'static str {
        match self.version {
            GlslVersion::V110 => "glsl",
            GlslVersion::V120 => "glsl120",
        }
    }

    fn register_name(&self, ctx: &ParseState<'_>, regtype: RegisterType, regnum: u32) -> String {
        Self::name(ctx, regtype, regnum)
    }

    fn start(&mut self, ctx: &mut ParseState<'_>) {
        let version = match self.version {
            GlslVersion::V110 => 110,
            GlslVersion::V120 => 120,
        };
        let mainfn = ctx.options().mainfn().to_owned();
        ctx.with_section(Section::Preflight, |ctx| out_line!(ctx.out, "#version {version}"));
        ctx.with_section(Section::MainlineIntro, |ctx| {
            out_line!(ctx.out, "void {mainfn}()");
            out_line!(ctx.out, "{{");
        });
        ctx.with_section(Section::MainlineTop, |ctx| ctx.out.set_indent_level(1));
        ctx.out.set_indent_level(1);
    }

    fn end(&mut self, ctx: &mut ParseState<'_>) {
        if ctx.version.is_pixel() && ctx.version.major == 1 {
            let r0 = Self::name(ctx, RegisterType::Temp, 0);
            out_line!(ctx.out, "gl_FragColor = {r0};");
        }
        ctx.with_section(Section::Postflight, |ctx| out_line!(ctx.out, "}}"));
    }

    fn global(&mut self, ctx: &mut ParseState<'_>, regtype: RegisterType, regnum: u32) {
        let name = Self::name(ctx, regtype, regnum);
        let line = match regtype {
            RegisterType::Temp | RegisterType::TempFloat16 | RegisterType::Texture => {
                format!("vec4 {name};")
            }
            RegisterType::Address => format!("ivec4 {name};"),
            RegisterType::Loop => format!("int {name};"),
            RegisterType::Predicate => format!("bvec4 {name};"),
            RegisterType::Label if ctx.label_called(regnum) => format!("void {name}();"),
            RegisterType::Misc if regnum == 0 => format!("#define {name} gl_FragCoord"),
            RegisterType::Misc => {
                format!("#define {name} vec4(gl_FrontFacing ? 1.0 : -1.0)")
            }
            _ => return,
        };
        ctx.with_section(Section::Globals, |ctx| out_line!(ctx.out, "{line}"));
    }

    fn array(&mut self, ctx: &mut ParseState<'_>, group: VariableGroup) {
        let base = self.float_uniforms;
        self.float_uniforms += group.count;
        ctx.with_section(Section::Globals, |ctx| {
            out_line!(ctx.out, "#define ARRAYBASE_{} {base}", group.index);
        });
    }

    fn const_array(&mut self, ctx: &mut ParseState<'_>, group: VariableGroup, values: &[[f32; 4]]) {
        let p = Self::prefix(ctx);
        let name = format!("{p}_const_array_{}_{}", group.index, group.count);
        let literals: Vec<String> = values.iter().map(vec4_literal).collect();
        match self.version {
            GlslVersion::V120 => {
                let n = group.count;
                let line = format!(
                    "const vec4 {name}[{n}] = vec4[{n}]({});",
                    literals.join(", ")
                );
                ctx.with_section(Section::Globals, |ctx| out_line!(ctx.out, "{line}"));
            }
            GlslVersion::V110 => {
                ctx.with_section(Section::Globals, |ctx| {
                    out_line!(ctx.out, "vec4 {name}[{}];", group.count);
                });
                ctx.with_section(Section::MainlineTop, |ctx| {
                    for (i, literal) in literals.iter().enumerate() {
                        out_line!(ctx.out, "{name}[{i}] = {literal};");
                    }
                });
            }
        }
    }

    fn uniform(
        &mut self,
        ctx: &mut ParseState<'_>,
        regtype: RegisterType,
        regnum: u32,
        group: Option<VariableGroup>,
    ) {
        let p = Self::prefix(ctx);
        let name = Self::name(ctx, regtype, regnum);
        let target = match (regtype, group) {
            (RegisterType::Const, Some(group)) => format!(
                "{p}_uniforms_vec4[ARRAYBASE_{} + {}]",
                group.index,
                regnum - group.index
            ),
            (RegisterType::Const, None) => {
                let slot = self.float_uniforms;
                self.float_uniforms += 1;
                format!("{p}_uniforms_vec4[{slot}]")
            }
            (RegisterType::ConstInt, _) => {
                let slot = self.int_uniforms;
                self.int_uniforms += 1;
                format!("{p}_uniforms_ivec4[{slot}]")
            }
            (RegisterType::ConstBool, _) => {
                let slot = self.bool_uniforms;
                self.bool_uniforms += 1;
                format!("{p}_uniforms_bool[{slot}]")
            }
            _ => return,
        };
        ctx.with_section(Section::Globals, |ctx| {
            out_line!(ctx.out, "#define {name} {target}");
        });
    }

    fn sampler(&mut self, ctx: &mut ParseState<'_>, sampler: SamplerEntry) {
        let name = Self::sampler_name(ctx, sampler.regnum);
        let ty = match sampler.texture_type {
            TextureType::Texture2D => "sampler2D",
            TextureType::TextureCube => "samplerCube",
            TextureType::TextureVolume => "sampler3D",
        };
        if sampler.texbem {
            self.bumpenv_stages.insert(sampler.regnum);
        }
        ctx.with_section(Section::Globals, |ctx| out_line!(ctx.out, "uniform {ty} {name};"));
    }

    fn attribute(&mut self, ctx: &mut ParseState<'_>, attribute: RegisterEntry) {
        let version = ctx.version;
        let name = Self::name(ctx, attribute.regtype, attribute.regnum);
        let section = if attribute.regtype.is_output() {
            Section::Outputs
        } else {
            Section::Inputs
        };

        if version.is_vertex() && attribute.regtype == RegisterType::Input {
            ctx.with_section(section, |ctx| out_line!(ctx.out, "attribute vec4 {name};"));
            return;
        }
        // ps_1_1..1_3 texture registers are plain globals; the texcoords are read directly.
        if version.is_pixel()
            && version.major == 1
            && version.minor < 4
            && attribute.regtype == RegisterType::Texture
        {
            return;
        }

        let lines = match Self::builtin(ctx, &attribute) {
            Some(builtin) => vec![format!("#define {name} {builtin}")],
            None => {
                let usage = attribute.usage.map_or("unknown", Usage::name);
                let varying = format!("io_{usage}_{}", attribute.index);
                vec![
                    format!("varying vec4 {varying};"),
                    format!("#define {name} {varying}"),
                ]
            }
        };
        ctx.with_section(section, |ctx| {
            for line in &lines {
                out_line!(ctx.out, "{line}");
            }
        });
    }

    fn emit(&mut self, ctx: &mut ParseState<'_>, opcode: Opcode) {
        let unsupported_relative = ctx.dest.relative.is_some() && opcode.descriptor().shape.has_dest()
            || ctx.sources[..ctx.source_count].iter().any(|s| {
                s.relative.is_some() && matches!(s.regtype, RegisterType::Input | RegisterType::Output)
            });
        if unsupported_relative {
            ctx.fail("Relative addressing of shader inputs and outputs isn't supported in GLSL");
            return;
        }

        let n = Self::components(ctx);
        match opcode {
            Opcode::Nop | Opcode::Dcl => {}
            Opcode::Def | Opcode::DefI | Opcode::DefB => Self::emit_def(ctx, opcode),
            Opcode::Mov if ctx.dest.regtype == RegisterType::Address => {
                let a = Self::src(ctx, 0, Self::mask(ctx));
                let ty = if n == 1 { "int".to_owned() } else { format!("ivec{n}") };
                Self::assign_raw(ctx, format!("{ty}(floor({a}))"));
            }
            Opcode::Mova => {
                let a = Self::src(ctx, 0, Self::mask(ctx));
                let ty = if n == 1 { "int".to_owned() } else { format!("ivec{n}") };
                Self::assign_raw(ctx, format!("{ty}(floor(abs({a}) + 0.5) * sign({a}))"));
            }
            Opcode::Mov => {
                let a = Self::src(ctx, 0, Self::mask(ctx));
                Self::assign(ctx, a);
            }
            Opcode::Add => Self::binary(ctx, "+"),
            Opcode::Sub => Self::binary(ctx, "-"),
            Opcode::Mul => Self::binary(ctx, "*"),
            Opcode::Mad => {
                let mask = Self::mask(ctx);
                let a = Self::src(ctx, 0, mask);
                let b = Self::src(ctx, 1, mask);
                let c = Self::src(ctx, 2, mask);
                Self::assign(ctx, format!("{a} * {b} + {c}"));
            }
            Opcode::Rcp => Self::scalar_function(ctx, |s| format!("1.0 / {s}")),
            Opcode::Rsq => Self::scalar_function(ctx, |s| format!("inversesqrt(abs({s}))")),
            Opcode::Exp | Opcode::ExpP => Self::scalar_function(ctx, |s| format!("exp2({s})")),
            Opcode::Log | Opcode::LogP => Self::scalar_function(ctx, |s| format!("log2(abs({s}))")),
            Opcode::Pow => {
                let a = Self::scalar(ctx, 0);
                let b = Self::scalar(ctx, 1);
                Self::assign(ctx, Self::splat(n, format!("pow(abs({a}), {b})")));
            }
            Opcode::Dp3 | Opcode::Dp4 => {
                let mask = if opcode == Opcode::Dp3 { WriteMask::XYZ } else { WriteMask::FULL };
                let a = Self::src(ctx, 0, mask);
                let b = Self::src(ctx, 1, mask);
                Self::assign(ctx, Self::splat(n, format!("dot({a}, {b})")));
            }
            Opcode::Dp2Add => {
                let a = Self::src(ctx, 0, WriteMask::XY);
                let b = Self::src(ctx, 1, WriteMask::XY);
                let c = Self::scalar(ctx, 2);
                Self::assign(ctx, Self::splat(n, format!("dot({a}, {b}) + {c}")));
            }
            Opcode::Min => Self::function2(ctx, "min"),
            Opcode::Max => Self::function2(ctx, "max"),
            Opcode::Slt | Opcode::Sge => {
                let mask = Self::mask(ctx);
                let a = Self::src(ctx, 0, mask);
                let b = Self::src(ctx, 1, mask);
                let op = if opcode == Opcode::Slt { Comparison::Lt } else { Comparison::Ge };
                let cmp = Self::compare(op, &a, &b, n);
                let expr = if n == 1 { format!("float{cmp}") } else { format!("vec{n}({cmp})") };
                Self::assign(ctx, expr);
            }
            Opcode::Lit => {
                let s = Self::full(ctx, 0);
                let lit = format!(
                    "vec4(1.0, max({s}.x, 0.0), ({s}.x > 0.0) ? pow(max({s}.y, 0.0), clamp({s}.w, -127.9961, 127.9961)) : 0.0, 1.0)"
                );
                let expr = Self::masked(ctx, lit);
                Self::assign(ctx, expr);
            }
            Opcode::Dst => {
                let a = Self::full(ctx, 0);
                let b = Self::full(ctx, 1);
                let expr = Self::masked(ctx, format!("vec4(1.0, {a}.y * {b}.y, {a}.z, {b}.w)"));
                Self::assign(ctx, expr);
            }
            Opcode::Lrp => {
                let mask = Self::mask(ctx);
                let a = Self::src(ctx, 0, mask);
                let b = Self::src(ctx, 1, mask);
                let c = Self::src(ctx, 2, mask);
                Self::assign(ctx, format!("mix({c}, {b}, {a})"));
            }
            Opcode::Frc => Self::function1(ctx, "fract"),
            Opcode::Sgn => Self::function1(ctx, "sign"),
            Opcode::Abs => Self::function1(ctx, "abs"),
            Opcode::Dsx => Self::function1(ctx, "dFdx"),
            Opcode::Dsy => Self::function1(ctx, "dFdy"),
            Opcode::M4x4 => Self::matrix(ctx, 4, WriteMask::FULL),
            Opcode::M4x3 => Self::matrix(ctx, 3, WriteMask::FULL),
            Opcode::M3x4 => Self::matrix(ctx, 4, WriteMask::XYZ),
            Opcode::M3x3 => Self::matrix(ctx, 3, WriteMask::XYZ),
            Opcode::M3x2 => Self::matrix(ctx, 2, WriteMask::XYZ),
            Opcode::Crs => {
                let a = Self::src(ctx, 0, WriteMask::XYZ);
                let b = Self::src(ctx, 1, WriteMask::XYZ);
                let expr = Self::masked(ctx, format!("vec4(cross({a}, {b}), 0.0)"));
                Self::assign(ctx, expr);
            }
            Opcode::Nrm => {
                let a4 = Self::full(ctx, 0);
                let a3 = Self::src(ctx, 0, WriteMask::XYZ);
                let expr = Self::masked(ctx, format!("({a4} * inversesqrt(dot({a3}, {a3})))"));
                Self::assign(ctx, expr);
            }
            Opcode::SinCos => {
                let s = Self::scalar(ctx, 0);
                let expr = match ctx.dest.writemask {
                    WriteMask::X => format!("cos({s})"),
                    WriteMask::Y => format!("sin({s})"),
                    _ => format!("vec2(cos({s}), sin({s}))"),
                };
                Self::assign(ctx, expr);
            }
            Opcode::Cnd | Opcode::Cmp => {
                let mask = Self::mask(ctx);
                let a = Self::src(ctx, 0, mask);
                let b = Self::src(ctx, 1, mask);
                let c = Self::src(ctx, 2, mask);
                let expr = if opcode == Opcode::Cnd {
                    Self::select(n, "greaterThan", &a, "0.5", &b, &c)
                } else {
                    Self::select(n, "greaterThanEqual", &a, "0.0", &b, &c)
                };
                Self::assign(ctx, expr);
            }
            Opcode::Setp => {
                let mask = Self::mask(ctx);
                let a = Self::src(ctx, 0, mask);
                let b = Self::src(ctx, 1, mask);
                let op = Comparison::from_controls(ctx.controls).unwrap_or(Comparison::Eq);
                let expr = Self::compare(op, &a, &b, n);
                Self::assign_raw(ctx, expr);
            }
            Opcode::Call
            | Opcode::CallNz
            | Opcode::Loop
            | Opcode::EndLoop
            | Opcode::Rep
            | Opcode::EndRep
            | Opcode::If
            | Opcode::Ifc
            | Opcode::Else
            | Opcode::EndIf
            | Opcode::Break
            | Opcode::Breakc
            | Opcode::BreakP
            | Opcode::Label
            | Opcode::Ret => self.emit_flow(ctx, opcode),
            _ => self.emit_texture(ctx, opcode),
        }
    }

    fn finalize(&mut self, ctx: &mut ParseState<'_>) {
        let p = Self::prefix(ctx);
        let mut lines = Vec::new();
        if self.float_uniforms > 0 {
            lines.push(format!("uniform vec4 {p}_uniforms_vec4[{}];", self.float_uniforms));
        }
        if self.int_uniforms > 0 {
            lines.push(format!("uniform ivec4 {p}_uniforms_ivec4[{}];", self.int_uniforms));
        }
        if self.bool_uniforms > 0 {
            lines.push(format!("uniform bool {p}_uniforms_bool[{}];", self.bool_uniforms));
        }
        for &stage in &self.bumpenv_stages {
            let sampler = Self::sampler_name(ctx, stage);
            lines.push(format!("uniform vec4 {sampler}_texbem;"));
            lines.push(format!("uniform vec4 {sampler}_texbeml;"));
        }
        ctx.with_section(Section::Globals, |ctx| {
            for line in &lines {
                out_line!(ctx.out, "{line}");
            }
        });
        if self.needs_lod_extension {
            ctx.with_section(Section::Preflight, |ctx| {
                out_line!(ctx.out, "#extension GL_ARB_shader_texture_lod : enable");
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec4_literals_keep_decimal_points() {
        assert_eq!(vec4_literal(&[1.0, 0.5, -2.0, 0.0]), "vec4(1.0, 0.5, -2.0, 0.0)");
    }

    #[test]
    fn select_uses_ternary_for_scalars() {
        assert_eq!(
            GlslProfile::select(1, "greaterThanEqual", "a", "0.0", "b", "c"),
            "((a >= 0.0) ? b : c)"
        );
        assert_eq!(
            GlslProfile::select(3, "greaterThan", "a", "0.5", "b", "c"),
            "mix(c, b, vec3(greaterThan(a, vec3(0.5))))"
        );
    }
}
