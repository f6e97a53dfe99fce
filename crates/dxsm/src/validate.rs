//! Per-opcode legality checks.
//!
//! Validators run after an instruction's operands are decoded and before the profile sees it.
//! They record errors on the [`ParseState`] and update the control-flow, label and
//! texture-sequence bookkeeping. They never stop the parse.

use crate::limits::MAX_CONTROL_FLOW_NESTING;
use crate::opcodes::Opcode;
use crate::parser::{Block, LabelInfo, ParseState};
use crate::registers::{
    ConstantEntry, ConstantValue, ATTRIBUTE_CENTROID, ATTRIBUTE_PARTIAL_PRECISION,
};
use crate::token::PARAM_HIGH_BIT;
use crate::types::{RegisterType, ResultModifiers, SourceModifier, TextureType, Usage, WriteMask};

/// Source-modifier rules shared by every instruction.
pub(crate) fn check_operands(state: &mut ParseState<'_>) {
    let major = state.version.major;
    for i in 0..state.source_count {
        let src = state.sources[i];
        if src.modifier.is_legacy() && major >= 2 {
            state.fail(format!(
                "Source modifier {:?} not allowed in Shader Model {major}",
                src.modifier
            ));
        }
        if matches!(src.modifier, SourceModifier::Abs | SourceModifier::AbsNegate) && major < 3 {
            state.fail("Absolute value source modifier requires Shader Model 3");
        }
        if src.modifier == SourceModifier::Not
            && !matches!(src.regtype, RegisterType::ConstBool | RegisterType::Predicate)
        {
            state.fail("NOT source modifier only applies to boolean registers");
        }
    }
}

/// Enforces the fixed ps_1_x `texm3x2*`/`texm3x3*` instruction sequences.
pub(crate) fn check_texture_sequence(state: &mut ParseState<'_>) {
    let op = state.opcode;
    if state.pads.m3x2.is_some() && !matches!(op, Opcode::TexM3x2Tex | Opcode::TexM3x2Depth) {
        state.fail("TEXM3X2PAD must be followed by TEXM3X2TEX or TEXM3X2DEPTH");
        state.pads.m3x2 = None;
    }
    match state.pads.m3x3.len() {
        1 if op != Opcode::TexM3x3Pad => {
            state.fail("TEXM3X3PAD must be followed by a second TEXM3X3PAD");
            state.pads.m3x3.clear();
        }
        2 if !matches!(
            op,
            Opcode::TexM3x3 | Opcode::TexM3x3Tex | Opcode::TexM3x3Spec | Opcode::TexM3x3VSpec
        ) =>
        {
            state.fail("Two TEXM3X3PAD instructions must be followed by a TEXM3X3 instruction");
            state.pads.m3x3.clear();
        }
        _ => {}
    }
}

/// Matrix ops read `rows` consecutive registers starting at their second operand.
fn validate_matrix(state: &mut ParseState<'_>, allowed: WriteMask, rows: u32, name: &str) {
    let matrix = state.sources[1];
    if matrix.relative.is_none() {
        for row in 1..rows {
            state.registers.mark_used(matrix.regtype, matrix.regnum + row, false);
        }
    }
    let mask = state.dest.writemask;
    if mask != allowed {
        state.fail(format!(
            "{name} destination write mask must be .{}",
            allowed.letters()
        ));
    }
    if state.sources[1].modifier != SourceModifier::None {
        state.fail(format!("{name} matrix operand can't have a source modifier"));
    }
}

pub(crate) fn validate_m4x4(state: &mut ParseState<'_>) {
    validate_matrix(state, WriteMask::FULL, 4, "M4X4");
}

pub(crate) fn validate_m4x3(state: &mut ParseState<'_>) {
    validate_matrix(state, WriteMask::XYZ, 3, "M4X3");
}

pub(crate) fn validate_m3x4(state: &mut ParseState<'_>) {
    validate_matrix(state, WriteMask::FULL, 4, "M3X4");
}

pub(crate) fn validate_m3x3(state: &mut ParseState<'_>) {
    validate_matrix(state, WriteMask::XYZ, 3, "M3X3");
}

pub(crate) fn validate_m3x2(state: &mut ParseState<'_>) {
    validate_matrix(state, WriteMask::XY, 2, "M3X2");
}

fn expect_label(state: &mut ParseState<'_>, op: &str) -> Option<u32> {
    let src = state.sources[0];
    if src.regtype != RegisterType::Label {
        state.fail(format!("{op} operand must be a label"));
        return None;
    }
    Some(src.regnum)
}

fn record_call(state: &mut ParseState<'_>, op: &str) {
    let Some(label) = expect_label(state, op) else {
        return;
    };
    state.calls_seen = true;
    let wrapped = state.loops > 0;
    let info = state.labels.entry(label).or_insert_with(LabelInfo::default);
    info.called = true;
    let previous = *info.loop_wrapped.get_or_insert(wrapped);
    if previous != wrapped {
        state.fail(format!(
            "CALL to label l{label} must always be inside a LOOP or never inside one"
        ));
    }
}

pub(crate) fn validate_call(state: &mut ParseState<'_>) {
    record_call(state, "CALL");
}

pub(crate) fn validate_callnz(state: &mut ParseState<'_>) {
    if !matches!(
        state.sources[1].regtype,
        RegisterType::ConstBool | RegisterType::Predicate
    ) {
        state.fail("CALLNZ condition must be a boolean or predicate register");
    }
    record_call(state, "CALLNZ");
}

pub(crate) fn validate_ret(state: &mut ParseState<'_>) {
    if state.loops > 0 || state.reps > 0 {
        state.fail("RET can't close a LOOP or REP block");
    }
    // A RET nested in IF/ELSE returns early; only an unnested one ends the body.
    if !state.blocks.is_empty() {
        return;
    }
    match state.subroutine.take() {
        Some(_) => {}
        None => state.mainline_returned = true,
    }
}

pub(crate) fn validate_label(state: &mut ParseState<'_>) {
    let Some(label) = expect_label(state, "LABEL") else {
        return;
    };
    if state.subroutine.is_some() {
        state.fail("LABEL inside a subroutine; missing RET");
    }
    if !state.blocks.is_empty() {
        state.fail("LABEL inside a flow control block");
    }
    let info = state.labels.entry(label).or_insert_with(LabelInfo::default);
    let duplicate = std::mem::replace(&mut info.defined, true);
    if duplicate {
        state.fail(format!("Duplicate LABEL l{label}"));
    }
    state.subroutine = Some(label);
}

fn push_block(state: &mut ParseState<'_>, block: Block) {
    if state.blocks.len() >= MAX_CONTROL_FLOW_NESTING {
        state.fail("Flow control nested too deeply");
        return;
    }
    state.blocks.push(block);
}

pub(crate) fn validate_loop(state: &mut ParseState<'_>) {
    if state.sources[0].regtype != RegisterType::Loop {
        state.fail("LOOP counter must be aL");
    }
    if state.sources[1].regtype != RegisterType::ConstInt {
        state.fail("LOOP parameters must be an integer constant");
    }
    push_block(state, Block::Loop);
    state.loops += 1;
}

pub(crate) fn validate_endloop(state: &mut ParseState<'_>) {
    if state.blocks.last() == Some(&Block::Loop) {
        state.blocks.pop();
        state.loops -= 1;
    } else {
        state.fail("ENDLOOP without LOOP");
    }
}

pub(crate) fn validate_rep(state: &mut ParseState<'_>) {
    if state.sources[0].regtype != RegisterType::ConstInt {
        state.fail("REP count must be an integer constant");
    }
    push_block(state, Block::Rep);
    state.reps += 1;
}

pub(crate) fn validate_endrep(state: &mut ParseState<'_>) {
    if state.blocks.last() == Some(&Block::Rep) {
        state.blocks.pop();
        state.reps -= 1;
    } else {
        state.fail("ENDREP without REP");
    }
}

pub(crate) fn validate_if(state: &mut ParseState<'_>) {
    if !matches!(
        state.sources[0].regtype,
        RegisterType::ConstBool | RegisterType::Predicate
    ) {
        state.fail("IF condition must be a boolean or predicate register");
    }
    push_block(state, Block::If { has_else: false });
}

fn check_comparison(state: &mut ParseState<'_>, op: &str) {
    if !(1..=6).contains(&state.controls) {
        state.fail(format!("{op} has an unknown comparison ({})", state.controls));
    }
}

pub(crate) fn validate_ifc(state: &mut ParseState<'_>) {
    check_comparison(state, "IFC");
    push_block(state, Block::If { has_else: false });
}

pub(crate) fn validate_else(state: &mut ParseState<'_>) {
    let has_else = match state.blocks.last() {
        Some(Block::If { has_else }) => *has_else,
        _ => return state.fail("ELSE without IF"),
    };
    if has_else {
        state.fail("ELSE already seen for this IF");
    } else if let Some(block) = state.blocks.last_mut() {
        *block = Block::If { has_else: true };
    }
}

pub(crate) fn validate_endif(state: &mut ParseState<'_>) {
    if matches!(state.blocks.last(), Some(Block::If { .. })) {
        state.blocks.pop();
    } else {
        state.fail("ENDIF without IF");
    }
}

fn check_breakable(state: &mut ParseState<'_>, op: &str) {
    if state.loops == 0 && state.reps == 0 {
        state.fail(format!("{op} outside LOOP/ENDLOOP or REP/ENDREP"));
    }
}

pub(crate) fn validate_break(state: &mut ParseState<'_>) {
    check_breakable(state, "BREAK");
}

pub(crate) fn validate_breakc(state: &mut ParseState<'_>) {
    check_comparison(state, "BREAKC");
    check_breakable(state, "BREAKC");
}

pub(crate) fn validate_breakp(state: &mut ParseState<'_>) {
    if state.sources[0].regtype != RegisterType::Predicate {
        state.fail("BREAKP condition must be a predicate register");
    }
    check_breakable(state, "BREAKP");
}

pub(crate) fn validate_setp(state: &mut ParseState<'_>) {
    check_comparison(state, "SETP");
    if state.dest.regtype != RegisterType::Predicate {
        state.fail("SETP destination must be a predicate register");
    }
}

pub(crate) fn validate_mova(state: &mut ParseState<'_>) {
    if state.dest.regtype != RegisterType::Address {
        state.fail("MOVA destination must be the address register");
    }
}

pub(crate) fn validate_sincos(state: &mut ParseState<'_>) {
    let mask = state.dest.writemask;
    if !matches!(mask, WriteMask::X | WriteMask::Y | WriteMask::XY) {
        state.fail("SINCOS write mask must be .x, .y or .xy");
    }
    if state.version.major < 3 {
        for i in 1..3 {
            if state.sources[i].regtype != RegisterType::Const {
                state.fail("SINCOS helper operands must be constant registers");
            }
        }
    }
}

fn store_constant(state: &mut ParseState<'_>, expected: RegisterType, op: &str) {
    let dest = state.dest;
    if dest.regtype != expected {
        state.fail(format!("{op} destination must be a {expected:?} register"));
        return;
    }
    if dest.relative.is_some() {
        state.fail(format!("{op} can't use relative addressing"));
        return;
    }
    state.registers.add_constant(ConstantEntry {
        index: dest.regnum,
        value: def_value(state.opcode, &state.dwords),
    });
    state.registers.mark_defined(dest.regtype, dest.regnum);
}

/// Constant value of raw DEF/DEFI/DEFB dwords.
pub(crate) fn def_value(opcode: Opcode, dwords: &[u32; 4]) -> ConstantValue {
    match opcode {
        Opcode::DefI => ConstantValue::Int(dwords.map(|d| d as i32)),
        Opcode::DefB => ConstantValue::Bool(dwords[0] != 0),
        _ => ConstantValue::Float(dwords.map(f32::from_bits)),
    }
}

pub(crate) fn validate_def(state: &mut ParseState<'_>) {
    store_constant(state, RegisterType::Const, "DEF");
}

pub(crate) fn validate_defi(state: &mut ParseState<'_>) {
    store_constant(state, RegisterType::ConstInt, "DEFI");
}

pub(crate) fn validate_defb(state: &mut ParseState<'_>) {
    store_constant(state, RegisterType::ConstBool, "DEFB");
}

/// Usage and usage index carried by a DCL control token.
pub(crate) fn dcl_usage(control: u32) -> (u32, u32) {
    (control & 0x1F, (control >> 16) & 0xF)
}

/// Texture type carried by a sampler DCL control token.
pub(crate) fn dcl_texture_type(control: u32) -> u32 {
    (control >> 27) & 0xF
}

pub(crate) fn validate_dcl(state: &mut ParseState<'_>) {
    let dest = state.dest;
    let control = state.dcl_control & !PARAM_HIGH_BIT;
    let version = state.version;
    let (raw_usage, usage_index) = dcl_usage(control);
    let mut misc = 0;
    if dest.result_mod.contains(ResultModifiers::CENTROID) {
        misc |= ATTRIBUTE_CENTROID;
    }
    if dest.result_mod.contains(ResultModifiers::PARTIAL_PRECISION) {
        misc |= ATTRIBUTE_PARTIAL_PRECISION;
    }

    if version.is_pixel() && version.major == 1 {
        state.fail("DCL not allowed in ps_1_x");
        return;
    }

    let (regtype, regnum) = (dest.regtype, dest.regnum);
    match regtype {
        RegisterType::Sampler => {
            if version.is_vertex() && version.major < 3 {
                state.fail("Vertex shader samplers require vs_3_0");
                return;
            }
            let raw = dcl_texture_type(control);
            let Some(texture_type) = TextureType::from_raw(raw) else {
                state.fail(format!("Unknown sampler texture type {raw}"));
                return;
            };
            if !state.registers.add_sampler(regnum, texture_type) {
                state.fail(format!("Duplicate DCL of s{regnum}"));
            }
        }
        RegisterType::Misc => {
            if !(version.is_pixel() && version.major >= 3) {
                state.fail("vPos and vFace require ps_3_0");
            } else if regnum > 1 {
                state.fail(format!("Unknown misc register {regnum}"));
            }
        }
        RegisterType::Input | RegisterType::Texture | RegisterType::Output => {
            if regtype == RegisterType::Output && !(version.is_vertex() && version.major >= 3) {
                state.fail("Output DCL requires vs_3_0");
                return;
            }
            let usage = if version.is_pixel() && version.major == 2 {
                // ps_2_x declarations carry no usage; the register names it.
                Some(if regtype == RegisterType::Texture {
                    (Usage::TexCoord, regnum)
                } else {
                    (Usage::Color, regnum)
                })
            } else {
                Usage::from_raw(raw_usage).map(|u| (u, usage_index))
            };
            let Some((usage, index)) = usage else {
                state.fail(format!("Unknown DCL usage {raw_usage}"));
                return;
            };
            if regtype == RegisterType::Texture && version.is_vertex() {
                state.fail("Texture registers can't be declared in vertex shaders");
                return;
            }
            if !state
                .registers
                .add_attribute(regtype, regnum, usage, index, dest.writemask, misc)
            {
                state.fail(format!("Duplicate DCL of {regtype:?} {regnum}"));
            }
        }
        other => {
            state.fail(format!("Invalid register type {other:?} for DCL"));
            return;
        }
    }
    state.registers.mark_defined(regtype, regnum);
}

fn ps1_texture_dest(state: &mut ParseState<'_>, op: &str) -> Option<u32> {
    let dest = state.dest;
    if dest.regtype != RegisterType::Texture {
        state.fail(format!("{op} destination must be a texture register"));
        return None;
    }
    Some(dest.regnum)
}

fn ps1_texture_source(state: &mut ParseState<'_>, op: &str) {
    let src = state.sources[0];
    if src.regtype != RegisterType::Texture {
        state.fail(format!("{op} source must be a texture register"));
    } else if src.regnum >= state.dest.regnum {
        state.fail(format!("{op} source must be an earlier texture stage"));
    }
}

pub(crate) fn validate_texcoord(state: &mut ParseState<'_>) {
    if state.version.minor == 4 {
        if state.dest.regtype != RegisterType::Temp {
            state.fail("TEXCRD destination must be a temp register");
        }
        if state.sources[0].regtype != RegisterType::Texture {
            state.fail("TEXCRD source must be a texture register");
        }
    } else {
        ps1_texture_dest(state, "TEXCOORD");
    }
}

pub(crate) fn validate_texkill(state: &mut ParseState<'_>) {
    if !matches!(
        state.dest.regtype,
        RegisterType::Temp | RegisterType::Texture
    ) {
        state.fail("TEXKILL operand must be a temp or texture register");
    }
}

pub(crate) fn validate_tex(state: &mut ParseState<'_>) {
    let version = state.version;
    match (version.major, version.minor) {
        (1, 4) => {
            if state.dest.regtype != RegisterType::Temp {
                state.fail("TEXLD destination must be a temp register");
            }
            if !matches!(
                state.sources[0].regtype,
                RegisterType::Texture | RegisterType::Temp
            ) {
                state.fail("TEXLD source must be a texture or temp register");
            }
            let stage = state.dest.regnum;
            state.add_implicit_sampler(stage);
        }
        (1, _) => {
            if let Some(stage) = ps1_texture_dest(state, "TEX") {
                state.add_implicit_sampler(stage);
            }
        }
        _ => {
            if state.controls > 2 {
                state.fail(format!("Unknown TEXLD variant {}", state.controls));
            }
            if state.sources[1].regtype != RegisterType::Sampler {
                state.fail("TEXLD second source must be a sampler");
            }
        }
    }
}

pub(crate) fn validate_texbem(state: &mut ParseState<'_>) {
    let Some(stage) = ps1_texture_dest(state, "TEXBEM") else {
        return;
    };
    ps1_texture_source(state, "TEXBEM");
    state.add_implicit_sampler(stage);
    if let Some(sampler) = state.registers.sampler_mut(stage) {
        sampler.texbem = true;
    }
}

pub(crate) fn validate_texreg2(state: &mut ParseState<'_>) {
    if let Some(stage) = ps1_texture_dest(state, "TEXREG2") {
        state.add_implicit_sampler(stage);
    }
}

fn texm_row(state: &mut ParseState<'_>, op: &str) -> Option<(u32, u32)> {
    let stage = ps1_texture_dest(state, op)?;
    ps1_texture_source(state, op);
    Some((stage, state.sources[0].regnum))
}

pub(crate) fn validate_texm3x2pad(state: &mut ParseState<'_>) {
    if let Some(row) = texm_row(state, "TEXM3X2PAD") {
        state.pads.m3x2 = Some(row);
    }
}

fn finish_m3x2(state: &mut ParseState<'_>, op: &str) -> Option<u32> {
    let row = texm_row(state, op)?;
    let Some(pad) = state.pads.m3x2.take() else {
        state.fail(format!("{op} without preceding TEXM3X2PAD"));
        return None;
    };
    if row.0 != pad.0 + 1 {
        state.fail(format!("{op} must use the stage after TEXM3X2PAD"));
    }
    state.pads.completed = vec![pad, row];
    Some(row.0)
}

pub(crate) fn validate_texm3x2tex(state: &mut ParseState<'_>) {
    if let Some(stage) = finish_m3x2(state, "TEXM3X2TEX") {
        state.add_implicit_sampler(stage);
    }
}

pub(crate) fn validate_texm3x2depth(state: &mut ParseState<'_>) {
    finish_m3x2(state, "TEXM3X2DEPTH");
}

pub(crate) fn validate_texm3x3pad(state: &mut ParseState<'_>) {
    let Some(row) = texm_row(state, "TEXM3X3PAD") else {
        return;
    };
    if let Some(&(previous, _)) = state.pads.m3x3.last() {
        if row.0 != previous + 1 {
            state.fail("TEXM3X3PAD must use consecutive texture stages");
        }
    }
    state.pads.m3x3.push(row);
}

fn finish_m3x3(state: &mut ParseState<'_>, op: &str) -> Option<u32> {
    let row = texm_row(state, op)?;
    if state.pads.m3x3.len() != 2 {
        state.fail(format!("{op} needs two preceding TEXM3X3PAD instructions"));
        state.pads.m3x3.clear();
        return None;
    }
    let mut rows = std::mem::take(&mut state.pads.m3x3);
    if row.0 != rows[1].0 + 1 {
        state.fail(format!("{op} must use the stage after TEXM3X3PAD"));
    }
    rows.push(row);
    state.pads.completed = rows;
    Some(row.0)
}

pub(crate) fn validate_texm3x3(state: &mut ParseState<'_>) {
    finish_m3x3(state, "TEXM3X3");
}

pub(crate) fn validate_texm3x3tex(state: &mut ParseState<'_>) {
    if let Some(stage) = finish_m3x3(state, "TEXM3X3TEX") {
        state.add_implicit_sampler(stage);
    }
}

pub(crate) fn validate_texm3x3spec(state: &mut ParseState<'_>) {
    if let Some(stage) = finish_m3x3(state, "TEXM3X3SPEC") {
        if state.sources[1].regtype != RegisterType::Const {
            state.fail("TEXM3X3SPEC eye vector must be a constant register");
        }
        state.add_implicit_sampler(stage);
    }
}

pub(crate) fn validate_texm3x3vspec(state: &mut ParseState<'_>) {
    if let Some(stage) = finish_m3x3(state, "TEXM3X3VSPEC") {
        state.add_implicit_sampler(stage);
    }
}

pub(crate) fn validate_texdp3(state: &mut ParseState<'_>) {
    let op = if state.opcode == Opcode::TexDp3Tex { "TEXDP3TEX" } else { "TEXDP3" };
    let Some(stage) = ps1_texture_dest(state, op) else {
        return;
    };
    ps1_texture_source(state, op);
    if state.opcode == Opcode::TexDp3Tex {
        state.add_implicit_sampler(stage);
    }
}

pub(crate) fn validate_texdepth(state: &mut ParseState<'_>) {
    if state.version.minor != 4 {
        state.fail("TEXDEPTH requires ps_1_4");
    }
    let dest = state.dest;
    if dest.regtype != RegisterType::Temp || dest.regnum != 5 {
        state.fail("TEXDEPTH destination must be r5");
    }
}

pub(crate) fn validate_bem(state: &mut ParseState<'_>) {
    if state.version.minor != 4 {
        state.fail("BEM requires ps_1_4");
    }
    if state.dest.regtype != RegisterType::Temp {
        state.fail("BEM destination must be a temp register");
    }
    if !matches!(state.dest.writemask, WriteMask::XY) {
        state.fail("BEM write mask must be .xy");
    }
}

pub(crate) fn validate_texldd(state: &mut ParseState<'_>) {
    if state.sources[1].regtype != RegisterType::Sampler {
        state.fail("TEXLDD second source must be a sampler");
    }
}

pub(crate) fn validate_texldl(state: &mut ParseState<'_>) {
    if state.version.major < 3 {
        state.fail("TEXLDL requires Shader Model 3");
    }
    if state.sources[1].regtype != RegisterType::Sampler {
        state.fail("TEXLDL second source must be a sampler");
    }
}
