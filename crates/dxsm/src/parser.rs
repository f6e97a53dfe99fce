//! The token-stream decoder.
//!
//! [`ParseState`] walks the instruction stream once. For every instruction it decodes the
//! operands into per-instruction scratch fields, updates the register tracker, runs the
//! legality checks and, while no error has been recorded, hands the instruction to the active
//! [`Profile`]. After the END token a post-pass resolves which registers become uniforms,
//! attributes and samplers and asks the profile to declare them.

use dxsm_ctab::{parse_ctab, parse_preshader, tokens_to_bytes, Preshader, RegisterSet, Symbol};
use dxsm_ctab::{CTAB_ID, PRES_ID};
use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::limits::max_float_constants;
use crate::opcodes::{ArgShape, Opcode, ShaderTypes};
use crate::output::{Output, Section};
use crate::profile::Profile;
use crate::registers::{RegisterEntry, RegisterTracker, SamplerEntry, VariableGroup};
use crate::result::{
    Attribute, Constant, ParseError, ParseOptions, ParseResult, Sampler, Uniform, UniformType,
};
use crate::token::*;
use crate::types::{
    normalize_register, DestOperand, RegisterContext, RegisterType, RelativeAddress,
    ResultModifiers, ShaderType, ShaderVersion, SourceModifier, SourceOperand, Swizzle,
    TextureType, Usage, WriteMask,
};
use crate::validate;

pub(crate) const OUT_OF_TOKENS: &str = "Out of tokens";

/// An open `loop`, `rep` or `if` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Block {
    Loop,
    Rep,
    If { has_else: bool },
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LabelInfo {
    pub defined: bool,
    pub called: bool,
    /// Whether calls happen inside a `loop` block. Fixed by the first call.
    pub loop_wrapped: Option<bool>,
}

/// Pending ps_1_x `texm3x2pad`/`texm3x3pad` rows: `(dest regnum, source regnum)`.
#[derive(Debug, Clone, Default)]
pub(crate) struct TexturePads {
    pub m3x2: Option<(u32, u32)>,
    pub m3x3: Vec<(u32, u32)>,
    /// Rows of the most recently completed sequence, read by emitters.
    pub completed: Vec<(u32, u32)>,
}

/// Decoder state for one parse call.
pub struct ParseState<'a> {
    pub(crate) tokens: TokenStream<'a>,
    pub(crate) version: ShaderVersion,
    pub(crate) options: &'a ParseOptions,
    pub(crate) out: Output,
    pub(crate) registers: RegisterTracker,
    pub(crate) errors: Vec<ParseError>,
    failed: bool,
    out_of_tokens: bool,
    halted: bool,
    ended: bool,

    // Current instruction.
    pub(crate) opcode: Opcode,
    pub(crate) instruction_position: usize,
    pub(crate) controls: u32,
    pub(crate) coissue: bool,
    pub(crate) predicated: bool,
    pub(crate) dest: DestOperand,
    /// False when the destination's register type didn't decode.
    dest_tracked: bool,
    pub(crate) sources: [SourceOperand; 5],
    pub(crate) source_count: usize,
    pub(crate) predicate: Option<SourceOperand>,
    pub(crate) dwords: [u32; 4],
    pub(crate) dcl_control: u32,

    // Running state.
    pub(crate) instruction_count: u32,
    pub(crate) blocks: Vec<Block>,
    pub(crate) loops: u32,
    pub(crate) reps: u32,
    pub(crate) assigned_branch_labels: u32,
    pub(crate) seen_executable: bool,
    pub(crate) calls_seen: bool,
    pub(crate) mainline_returned: bool,
    pub(crate) subroutine: Option<u32>,
    pub(crate) labels: HashMap<u32, LabelInfo>,
    pub(crate) pads: TexturePads,
    pub(crate) previous_opcode: Option<Opcode>,
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) preshader: Option<Preshader>,
    have_ctab: bool,
}

impl std::fmt::Debug for ParseState<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseState")
            .field("version", &self.version)
            .field("position", &self.tokens.position())
            .field("errors", &self.errors.len())
            .finish_non_exhaustive()
    }
}

/// Runs a full parse over `tokens` with `profile`.
pub(crate) fn run(
    mut profile: Box<dyn Profile>,
    tokens: &[u32],
    options: &ParseOptions,
) -> ParseResult {
    let Some(&version_token) = tokens.first() else {
        return ParseResult::failed(OUT_OF_TOKENS);
    };
    let version = match decode_version_token(version_token) {
        Ok(version) => version,
        Err(message) => return ParseResult::failed(message),
    };

    let mut stream = TokenStream::new(tokens);
    stream.next_token();
    let mut state = ParseState::new(stream, version, options);

    profile.start(&mut state);
    state.parse_token_stream(profile.as_mut());
    if state.ended {
        state.check_end_of_stream();
        state.process_definitions(profile.as_mut());
        if !state.failed {
            profile.finalize(&mut state);
        }
    }
    state.into_result(profile.as_ref())
}

impl<'a> ParseState<'a> {
    pub(crate) fn new(
        tokens: TokenStream<'a>,
        version: ShaderVersion,
        options: &'a ParseOptions,
    ) -> Self {
        Self {
            tokens,
            version,
            options,
            out: Output::new(),
            registers: RegisterTracker::new(),
            errors: Vec::new(),
            failed: false,
            out_of_tokens: false,
            halted: false,
            ended: false,
            opcode: Opcode::Nop,
            instruction_position: 0,
            controls: 0,
            coissue: false,
            predicated: false,
            dest: DestOperand::default(),
            dest_tracked: false,
            sources: [SourceOperand::default(); 5],
            source_count: 0,
            predicate: None,
            dwords: [0; 4],
            dcl_control: 0,
            instruction_count: 0,
            blocks: Vec::new(),
            loops: 0,
            reps: 0,
            assigned_branch_labels: 0,
            seen_executable: false,
            calls_seen: false,
            mainline_returned: false,
            subroutine: None,
            labels: HashMap::new(),
            pads: TexturePads::default(),
            previous_opcode: None,
            symbols: Vec::new(),
            preshader: None,
            have_ctab: false,
        }
    }

    pub fn version(&self) -> ShaderVersion {
        self.version
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// True once any error has been recorded. Emission is suppressed from then on.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn options(&self) -> &ParseOptions {
        self.options
    }

    /// Records an error at the current instruction.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.failed = true;
        self.errors.push(ParseError {
            message: message.into(),
            filename: None,
            position: Some(self.instruction_position * 4),
        });
    }

    fn fail_out_of_tokens(&mut self) {
        if !self.out_of_tokens {
            self.out_of_tokens = true;
            self.fail(OUT_OF_TOKENS);
        }
    }

    /// Redirects output to `section` for the duration of `f`.
    pub fn with_section<R>(&mut self, section: Section, f: impl FnOnce(&mut Self) -> R) -> R {
        self.out.push_section(section);
        let result = f(self);
        self.out.pop_section();
        result
    }

    /// Hands out a fresh branch label number.
    pub fn allocate_branch_label(&mut self) -> u32 {
        let n = self.assigned_branch_labels;
        self.assigned_branch_labels += 1;
        n
    }

    pub(crate) fn label_called(&self, label: u32) -> bool {
        self.labels.get(&label).is_some_and(|l| l.called)
    }

    pub(crate) fn texture_type(&self, sampler: u32) -> TextureType {
        self.registers
            .sampler(sampler)
            .map(|s| s.texture_type)
            .unwrap_or(TextureType::Texture2D)
    }

    fn next_or_fail(&mut self) -> Option<u32> {
        let token = self.tokens.next_token();
        if token.is_none() {
            self.fail_out_of_tokens();
        }
        token
    }

    fn parse_token_stream(&mut self, profile: &mut dyn Profile) {
        while !self.halted && !self.out_of_tokens {
            self.instruction_position = self.tokens.position();
            let Some(token) = self.tokens.peek() else {
                self.fail_out_of_tokens();
                break;
            };

            if token == END_TOKEN {
                self.tokens.next_token();
                self.ended = true;
                if !self.failed {
                    profile.end(self);
                }
                if !self.tokens.is_empty() {
                    warn!(
                        trailing = self.tokens.remaining(),
                        "ignoring tokens after END"
                    );
                }
                break;
            }

            if token == PHASE_TOKEN {
                self.tokens.next_token();
                self.parse_phase(profile);
                continue;
            }

            if token & OPCODE_MASK == COMMENT_OPCODE {
                self.tokens.next_token();
                self.parse_comment(token);
                continue;
            }

            self.parse_instruction(profile);
        }
    }

    fn parse_phase(&mut self, profile: &mut dyn Profile) {
        if !(self.version.is_pixel() && self.version.major == 1 && self.version.minor == 4) {
            self.fail("PHASE token only available in 1.4 pixel shaders");
            return;
        }
        if self.failed {
            return;
        }
        profile.phase(self);
    }

    fn parse_comment(&mut self, token: u32) {
        let len = ((token & COMMENT_LENGTH_MASK) >> COMMENT_LENGTH_SHIFT) as usize;
        let Some(payload) = self.tokens.take(len) else {
            self.fail_out_of_tokens();
            return;
        };
        let Some((&id, body)) = payload.split_first() else {
            return;
        };

        if id == CTAB_ID.to_token() {
            if self.have_ctab {
                debug!("ignoring additional CTAB block");
                return;
            }
            self.have_ctab = true;
            match parse_ctab(&tokens_to_bytes(body)) {
                Ok(table) => {
                    for symbol in &table.symbols {
                        if symbol.register_set == RegisterSet::Float4 {
                            self.registers
                                .add_uniform_array(symbol.register_index, symbol.register_count);
                        }
                    }
                    debug!(symbols = table.symbols.len(), "parsed CTAB");
                    self.symbols = table.symbols;
                }
                Err(e) => self.fail(format!("Corrupt CTAB: {e}")),
            }
        } else if id == PRES_ID.to_token() {
            match parse_preshader(body) {
                Ok(preshader) => {
                    debug!(
                        instructions = preshader.instructions.len(),
                        "parsed preshader"
                    );
                    self.preshader = Some(preshader);
                }
                Err(e) => warn!("discarding malformed preshader: {e}"),
            }
        } else {
            debug!(len, "skipping comment block");
        }
    }

    fn reset_scratch(&mut self, token: u32) {
        self.controls = (token & CONTROLS_MASK) >> CONTROLS_SHIFT;
        self.coissue = token & COISSUE != 0;
        self.predicated = token & PREDICATED != 0;
        self.dest = DestOperand::default();
        self.dest_tracked = false;
        self.sources = [SourceOperand::default(); 5];
        self.source_count = 0;
        self.predicate = None;
        self.dwords = [0; 4];
        self.dcl_control = 0;
    }

    fn parse_instruction(&mut self, profile: &mut dyn Profile) {
        let Some(token) = self.tokens.next_token() else {
            self.fail_out_of_tokens();
            return;
        };
        let raw = (token & OPCODE_MASK) as u16;
        let declared_len = ((token & LENGTH_MASK) >> LENGTH_SHIFT) as usize;
        let start = self.tokens.position();
        self.reset_scratch(token);

        let Some(opcode) = Opcode::from_raw(raw) else {
            self.fail(format!("Unknown opcode ({raw:#06x})"));
            if self.version.major >= 2 {
                if self.tokens.take(declared_len).is_none() {
                    self.fail_out_of_tokens();
                }
            } else {
                // SM1 instructions carry no length; the stream cannot be resynchronized.
                self.halted = true;
            }
            return;
        };
        self.opcode = opcode;
        let desc = opcode.descriptor();

        self.check_instruction_token(token, desc.shader_types, desc.min_major, desc.max_major);

        let Some(consumed) = self.parse_args(desc.shape) else {
            return;
        };

        if self.version.major >= 2 && consumed != declared_len {
            self.fail(format!(
                "Instruction token count mismatch: {} declares {declared_len}, parsed {consumed}",
                desc.name.to_uppercase()
            ));
            self.tokens.seek(start + declared_len);
        }

        if desc.shape.has_dest() && !opcode.is_declaration() && self.dest_tracked {
            let (regtype, regnum) = (self.dest.regtype, self.dest.regnum);
            if opcode == Opcode::TexKill {
                // TEXKILL's lone operand is read, not written.
                self.note_read(regtype, regnum);
            } else {
                self.registers.mark_used(regtype, regnum, true);
            }
        }

        validate::check_operands(self);
        validate::check_texture_sequence(self);
        if let Some(validator) = desc.validator {
            validator(self);
        }

        if opcode.is_declaration() {
            if self.seen_executable {
                self.fail(format!(
                    "{} token must come before any instructions",
                    desc.name.to_uppercase()
                ));
            }
        } else if opcode != Opcode::Label {
            if self.mainline_returned && self.subroutine.is_none() {
                self.fail(format!(
                    "{} outside of a subroutine after the main body returned",
                    desc.name.to_uppercase()
                ));
            }
            self.seen_executable = true;
        }

        self.instruction_count += desc.slots;
        if !self.failed {
            profile.emit(self, opcode);
        }
        self.previous_opcode = Some(opcode);
    }

    fn check_instruction_token(&mut self, token: u32, types: ShaderTypes, min: u8, max: u8) {
        let name = self.opcode.name().to_uppercase();
        let stage = match self.version.shader_type {
            ShaderType::Vertex => ShaderTypes::VERTEX,
            ShaderType::Pixel => ShaderTypes::PIXEL,
        };
        if !types.contains(stage) {
            let which = match self.version.shader_type {
                ShaderType::Vertex => "vertex",
                ShaderType::Pixel => "pixel",
            };
            self.fail(format!("{name} not allowed in {which} shaders"));
        }
        if self.version.major < min || self.version.major > max {
            self.fail(format!(
                "{name} not allowed in Shader Model {}.{}",
                self.version.major, self.version.minor
            ));
        }
        if token & INSTRUCTION_HIGH_BIT != 0 {
            self.fail("Instruction token high bit must be zero");
        }
        if token & INSTRUCTION_RESERVED != 0 {
            self.fail("Reserved bit set in instruction token");
        }
        if self.coissue {
            if !(self.version.is_pixel() && self.version.major == 1) {
                self.fail("Co-issue is only allowed in ps_1_x");
            } else if self.previous_opcode.is_none() {
                self.fail("Co-issued instruction has no preceding instruction");
            }
        }
        if self.predicated && self.version.major < 2 {
            self.fail("Predicated instructions require Shader Model 2");
        }
    }

    /// Decodes the operands for `shape`, returning the operand tokens consumed or `None` when
    /// the stream ran out.
    fn parse_args(&mut self, shape: ArgShape) -> Option<usize> {
        let version = self.version;
        let (dest, sources) = match shape {
            ArgShape::None => (false, 0),
            ArgShape::D => (true, 0),
            ArgShape::S => (false, 1),
            ArgShape::SS => (false, 2),
            ArgShape::DS => (true, 1),
            ArgShape::DSS => (true, 2),
            ArgShape::DSSS => (true, 3),
            ArgShape::DSSSS => (true, 4),
            ArgShape::SinCos => (true, if version.major >= 3 { 1 } else { 3 }),
            ArgShape::Tex => match (version.major, version.minor) {
                (1, 4) => (true, 1),
                (1, _) => (true, 0),
                _ => (true, 2),
            },
            ArgShape::TexCrd => (true, if version.minor == 4 { 1 } else { 0 }),
            ArgShape::Def => return self.parse_def_args(4),
            ArgShape::DefB => return self.parse_def_args(1),
            ArgShape::Dcl => return self.parse_dcl_args(),
        };

        let mut consumed = 0;
        if dest {
            consumed += self.parse_destination()?;
        }
        consumed += self.parse_predicate()?;
        for i in 0..sources {
            consumed += self.parse_source(i)?;
        }
        self.source_count = sources;
        Some(consumed)
    }

    fn parse_def_args(&mut self, dwords: usize) -> Option<usize> {
        let consumed = self.parse_destination()?;
        let Some(values) = self.tokens.take(dwords) else {
            self.fail_out_of_tokens();
            return None;
        };
        self.dwords[..dwords].copy_from_slice(values);
        Some(consumed + dwords)
    }

    fn parse_dcl_args(&mut self) -> Option<usize> {
        let control = self.next_or_fail()?;
        if control & PARAM_HIGH_BIT == 0 {
            self.fail("DCL control token high bit must be one");
        }
        self.dcl_control = control;
        Some(1 + self.parse_destination()?)
    }

    fn parse_predicate(&mut self) -> Option<usize> {
        if !self.predicated {
            return Some(0);
        }
        let consumed = self.parse_source(4)?;
        let pred = self.sources[4];
        self.sources[4] = SourceOperand::default();
        if pred.regtype != RegisterType::Predicate {
            self.fail("Predicate token must be a predicate register");
        }
        if !matches!(pred.modifier, SourceModifier::None | SourceModifier::Not) {
            self.fail("Predicate register may only use the NOT modifier");
        }
        if !pred.swizzle.is_replicate() && !pred.swizzle.is_identity() {
            self.fail("Predicate swizzle must be replicate or identity");
        }
        self.predicate = Some(pred);
        Some(consumed)
    }

    /// Decodes the register type and number. An unknown type is reported and comes back as
    /// `None`; the operand is still consumed but never tracked.
    fn decode_register(
        &mut self,
        token: u32,
        ctx: RegisterContext,
    ) -> (Option<RegisterType>, u32) {
        let (raw_type, regnum) = normalize_register(raw_register_type(token), token & REGNUM_MASK);
        let regtype = RegisterType::from_raw(raw_type, self.version.shader_type, ctx);
        if regtype.is_none() {
            self.fail(format!("Unknown register type {raw_type}"));
        }
        (regtype, regnum)
    }

    /// Records a read of `regtype:regnum` and flags temps read before any write.
    fn note_read(&mut self, regtype: RegisterType, regnum: u32) {
        let written = self.registers.mark_used(regtype, regnum, false).written;
        if regtype == RegisterType::Temp
            && !written
            && !self.calls_seen
            && self.subroutine.is_none()
        {
            self.fail(format!("Temp register r{regnum} used uninitialized"));
        }
    }

    fn check_parameter_bits(&mut self, token: u32, what: &str) {
        if token & PARAM_HIGH_BIT == 0 {
            self.fail(format!("{what} token high bit must be one"));
        }
        if token & PARAM_RESERVED != 0 {
            self.fail(format!("Reserved bits set in {what} token"));
        }
    }

    fn parse_destination(&mut self) -> Option<usize> {
        let token = self.next_or_fail()?;
        self.check_parameter_bits(token, "Destination");
        let (known, regnum) = self.decode_register(token, RegisterContext::Operand);
        let regtype = known.unwrap_or(RegisterType::Temp);
        let mut consumed = 1;

        let relative = if token & RELATIVE != 0 {
            if known.is_some()
                && !(self.version.is_vertex() && self.version.major >= 3 && regtype == RegisterType::Output)
            {
                self.fail("Relative addressing of destination registers requires vs_3_0 outputs");
            }
            let (relative, used) = self.parse_relative(known, regnum)?;
            consumed += used;
            Some(relative)
        } else {
            None
        };

        let result_shift = result_shift(token);
        let result_mod =
            ResultModifiers::from_bits_truncate(((token & RESULT_MOD_MASK) >> RESULT_MOD_SHIFT) as u8);
        if result_shift != 0 && !(self.version.is_pixel() && self.version.major == 1) {
            self.fail(format!(
                "Result shift scale isn't supported in Shader Model {}",
                self.version.major
            ));
        }
        if result_mod.contains(ResultModifiers::CENTROID)
            && self.opcode != Opcode::Dcl
            && !(self.version.is_pixel() && self.version.major >= 2)
        {
            self.fail("Centroid result modifier only allowed in pixel shaders");
        }

        self.dest = DestOperand {
            token,
            regtype,
            regnum,
            writemask: WriteMask(((token & WRITEMASK_MASK) >> WRITEMASK_SHIFT) as u8),
            result_mod,
            result_shift,
            relative,
        };
        self.dest_tracked = known.is_some();
        Some(consumed)
    }

    fn parse_source(&mut self, slot: usize) -> Option<usize> {
        let token = self.next_or_fail()?;
        self.check_parameter_bits(token, "Source");
        let (known, regnum) = self.decode_register(token, RegisterContext::Operand);
        let regtype = known.unwrap_or(RegisterType::Temp);
        let mut consumed = 1;

        let modifier_raw = (token & SRCMOD_MASK) >> SRCMOD_SHIFT;
        let modifier = SourceModifier::from_raw(modifier_raw).unwrap_or_else(|| {
            self.fail(format!("Unknown source modifier {modifier_raw}"));
            SourceModifier::None
        });
        let mut swizzle = Swizzle(((token & SWIZZLE_MASK) >> SWIZZLE_SHIFT) as u8);

        let relative = if token & RELATIVE != 0 {
            let (relative, used) = self.parse_relative(known, regnum)?;
            consumed += used;
            Some(relative)
        } else {
            None
        };

        if self.version.is_vertex() && regtype == RegisterType::Input {
            if let Some(remap) = self.swizzle_remap(regnum) {
                swizzle = swizzle.remap(remap);
            }
        }

        if known.is_some() {
            self.note_read(regtype, regnum);
        }

        self.sources[slot] = SourceOperand {
            token,
            regtype,
            regnum,
            swizzle,
            modifier,
            relative,
        };
        Some(consumed)
    }

    fn swizzle_remap(&self, regnum: u32) -> Option<Swizzle> {
        let attr = self.registers.attribute(RegisterType::Input, regnum)?;
        let usage = attr.usage?;
        self.options
            .swizzles
            .iter()
            .find(|r| r.usage == usage && r.index == attr.index)
            .map(|r| r.swizzle)
    }

    /// Decodes relative addressing for `regtype:regnum`. SM1 uses `a0.x` implicitly, later
    /// models read an extra token.
    fn parse_relative(
        &mut self,
        regtype: Option<RegisterType>,
        regnum: u32,
    ) -> Option<(RelativeAddress, usize)> {
        let (rel_type, rel_num, component, consumed) = if self.version.major == 1 {
            if self.version.is_pixel() {
                self.fail("Relative addressing not allowed in ps_1_x");
            }
            (Some(RegisterType::Address), 0, 0, 0)
        } else {
            let token = self.next_or_fail()?;
            self.check_parameter_bits(token, "Relative address");
            let (rel_type, rel_num) = self.decode_register(token, RegisterContext::Relative);
            let swizzle = Swizzle(((token & SWIZZLE_MASK) >> SWIZZLE_SHIFT) as u8);
            if !swizzle.is_replicate() {
                self.fail("Relative address needs replicate swizzle");
            }
            if rel_type.is_some_and(|t| !matches!(t, RegisterType::Address | RegisterType::Loop)) {
                self.fail("Relative address must use a0 or aL");
            }
            (rel_type, rel_num, swizzle.component(0), 1)
        };
        if let Some(rel_type) = rel_type {
            self.registers.mark_used(rel_type, rel_num, false);
        }
        let rel_type = rel_type.unwrap_or(RegisterType::Address);

        let group = match regtype {
            Some(RegisterType::Const) => {
                self.registers.infer_array_groups();
                let limit = max_float_constants(self.version);
                let group = match self.registers.group_containing(regnum) {
                    Some(group) => group,
                    None => self.registers.add_fallback_group(regnum, limit),
                };
                self.registers.mark_group_used(group);
                Some(group)
            }
            Some(RegisterType::Input | RegisterType::Output) | None => None,
            Some(other) => {
                self.fail(format!("Relative addressing of {other:?} registers not allowed"));
                None
            }
        };

        Some((
            RelativeAddress {
                regtype: rel_type,
                regnum: rel_num,
                component,
                group,
            },
            consumed,
        ))
    }

    /// Adds a ps_1_x sampler implied by a texture instruction on stage `stage`.
    pub(crate) fn add_implicit_sampler(&mut self, stage: u32) {
        let texture_type = self
            .options
            .samplers
            .iter()
            .find(|s| s.index == stage)
            .map(|s| s.texture_type)
            .unwrap_or(TextureType::Texture2D);
        self.registers.add_sampler(stage, texture_type);
        self.registers.mark_used(RegisterType::Sampler, stage, false);
    }

    fn check_end_of_stream(&mut self) {
        while let Some(block) = self.blocks.pop() {
            self.fail(match block {
                Block::Loop => "LOOP without ENDLOOP",
                Block::Rep => "REP without ENDREP",
                Block::If { .. } => "IF without ENDIF",
            });
        }
        if !self.pads.m3x3.is_empty() || self.pads.m3x2.is_some() {
            self.fail("Texture matrix sequence not completed");
        }
        let mut undefined: Vec<u32> = self
            .labels
            .iter()
            .filter(|(_, info)| info.called && !info.defined)
            .map(|(&label, _)| label)
            .collect();
        undefined.sort_unstable();
        for label in undefined {
            self.fail(format!("CALL to undefined label l{label}"));
        }
    }

    /// Resolves registers into declarations and asks the profile to emit them.
    fn process_definitions(&mut self, profile: &mut dyn Profile) {
        self.registers.infer_array_groups();

        let used: Vec<RegisterEntry> = self.registers.used().cloned().collect();
        let mut globals: Vec<(RegisterType, u32)> = Vec::new();
        let mut uniforms: Vec<(RegisterType, u32, Option<VariableGroup>)> = Vec::new();
        let version = self.version;
        let ps1 = version.is_pixel() && version.major == 1;

        for reg in &used {
            let (regtype, regnum) = (reg.regtype, reg.regnum);
            match regtype {
                RegisterType::Temp
                | RegisterType::TempFloat16
                | RegisterType::Address
                | RegisterType::Loop
                | RegisterType::Predicate
                | RegisterType::Label => globals.push((regtype, regnum)),

                RegisterType::Misc => {
                    if !self.registers.is_defined(regtype, regnum) {
                        self.fail(format!("Misc register {regnum} used without DCL"));
                    }
                    globals.push((regtype, regnum));
                }

                RegisterType::Texture => {
                    if ps1 {
                        self.registers.add_attribute(
                            regtype,
                            regnum,
                            Usage::TexCoord,
                            regnum,
                            WriteMask::FULL,
                            0,
                        );
                        if version.minor < 4 {
                            globals.push((regtype, regnum));
                        }
                    } else if self.registers.attribute(regtype, regnum).is_none() {
                        self.fail(format!("Texture register t{regnum} used without DCL"));
                    }
                }

                RegisterType::Input => {
                    if ps1 {
                        self.registers.add_attribute(
                            regtype,
                            regnum,
                            Usage::Color,
                            regnum,
                            WriteMask::FULL,
                            0,
                        );
                    } else if self.registers.attribute(regtype, regnum).is_none() {
                        self.fail(format!("Input register v{regnum} used without DCL"));
                    }
                }

                RegisterType::Const => {
                    let group = self
                        .registers
                        .group_containing(regnum)
                        .map(|g| self.registers.groups()[g])
                        .filter(|g| g.used);
                    match group {
                        Some(group) if !group.literal => uniforms.push((regtype, regnum, Some(group))),
                        Some(_) => {}
                        None => {
                            if self.registers.constant(regtype, regnum).is_none() {
                                uniforms.push((regtype, regnum, None));
                            }
                        }
                    }
                }

                RegisterType::ConstInt | RegisterType::ConstBool => {
                    if self.registers.constant(regtype, regnum).is_none() {
                        uniforms.push((regtype, regnum, None));
                    }
                }

                RegisterType::Sampler => {
                    if self.registers.sampler(regnum).is_none() {
                        self.fail(format!("Sampler s{regnum} used without DCL"));
                    }
                }

                RegisterType::RastOut
                | RegisterType::AttrOut
                | RegisterType::Output
                | RegisterType::ColorOut
                | RegisterType::DepthOut => {
                    if version.is_vertex() && version.major >= 3 {
                        if self.registers.attribute(regtype, regnum).is_none() {
                            self.fail(format!("Output register o{regnum} used without DCL"));
                        }
                    } else if let Some(usage) = implicit_output_usage(regtype, regnum) {
                        self.registers.add_attribute(
                            regtype,
                            regnum,
                            usage,
                            implicit_output_index(regtype, regnum),
                            WriteMask::FULL,
                            0,
                        );
                    } else {
                        self.fail(format!("Invalid output register {regtype:?} {regnum}"));
                    }
                }
            }
        }

        if ps1 {
            // ps_1_x writes its color result through r0.
            globals.retain(|&(t, n)| !(t == RegisterType::Temp && n == 0));
            globals.insert(0, (RegisterType::Temp, 0));
        }

        if self.failed {
            return;
        }

        for (regtype, regnum) in globals {
            profile.global(self, regtype, regnum);
        }
        let mut groups: Vec<VariableGroup> = self.registers.groups().to_vec();
        groups.sort_by_key(|g| g.index);
        for group in groups.iter().filter(|g| g.used) {
            if group.literal {
                let values = self.registers.literal_values(group);
                profile.const_array(self, *group, &values);
            } else {
                profile.array(self, *group);
            }
        }
        for (regtype, regnum, group) in uniforms {
            profile.uniform(self, regtype, regnum, group);
        }
        let samplers: Vec<SamplerEntry> = self.registers.samplers().copied().collect();
        for sampler in samplers {
            profile.sampler(self, sampler);
        }
        let attributes: Vec<RegisterEntry> = self.registers.attributes().cloned().collect();
        for attribute in attributes {
            profile.attribute(self, attribute);
        }
    }

    fn into_result(self, profile: &dyn Profile) -> ParseResult {
        // Same order the declaration pass hands uniforms to the profile: used arrays by start
        // register, then single registers (float, int, bool). Packed slots follow this order.
        let mut uniforms = Vec::new();
        let mut groups: Vec<VariableGroup> =
            self.registers.groups().iter().filter(|g| g.used).copied().collect();
        groups.sort_by_key(|g| g.index);
        for group in &groups {
            uniforms.push(Uniform {
                uniform_type: UniformType::Float,
                index: group.index,
                array_count: group.count,
                constant: group.literal,
                name: profile.register_name(&self, RegisterType::Const, group.index),
            });
        }
        for reg in self.registers.used() {
            let uniform_type = match reg.regtype {
                RegisterType::Const => UniformType::Float,
                RegisterType::ConstInt => UniformType::Int,
                RegisterType::ConstBool => UniformType::Bool,
                _ => continue,
            };
            if self.registers.constant(reg.regtype, reg.regnum).is_some() {
                continue;
            }
            if reg.regtype == RegisterType::Const && groups.iter().any(|g| g.contains(reg.regnum)) {
                continue;
            }
            uniforms.push(Uniform {
                uniform_type,
                index: reg.regnum,
                array_count: 0,
                constant: false,
                name: profile.register_name(&self, reg.regtype, reg.regnum),
            });
        }

        let mut attributes = Vec::new();
        let mut outputs = Vec::new();
        for attr in self.registers.attributes() {
            let Some(usage) = attr.usage else { continue };
            let entry = Attribute {
                usage,
                index: attr.index,
                name: profile.register_name(&self, attr.regtype, attr.regnum),
            };
            if attr.regtype.is_output() {
                outputs.push(entry);
            } else {
                attributes.push(entry);
            }
        }

        let samplers = self
            .registers
            .samplers()
            .map(|s| Sampler {
                texture_type: s.texture_type,
                index: s.regnum,
                name: profile.register_name(&self, RegisterType::Sampler, s.regnum),
                texbem: s.texbem,
            })
            .collect();

        let constants = self
            .registers
            .constants()
            .iter()
            .map(|c| Constant {
                index: c.index,
                value: c.value,
            })
            .collect();

        let failed = self.failed;
        let mainfn = self.options.mainfn().to_owned();
        let swizzles = self.options.swizzles.clone();
        ParseResult {
            output: if failed { Vec::new() } else { self.out.into_bytes() },
            major_ver: self.version.major,
            minor_ver: self.version.minor,
            shader_type: Some(self.version.shader_type),
            instruction_count: self.instruction_count,
            uniforms,
            attributes,
            outputs,
            samplers,
            constants,
            symbols: self.symbols,
            errors: self.errors,
            swizzles,
            preshader: self.preshader,
            mainfn,
        }
    }
}

fn implicit_output_usage(regtype: RegisterType, regnum: u32) -> Option<Usage> {
    Some(match (regtype, regnum) {
        (RegisterType::RastOut, 0) => Usage::Position,
        (RegisterType::RastOut, 1) => Usage::Fog,
        (RegisterType::RastOut, 2) => Usage::PointSize,
        (RegisterType::AttrOut, _) => Usage::Color,
        (RegisterType::Output, _) => Usage::TexCoord,
        (RegisterType::ColorOut, _) => Usage::Color,
        (RegisterType::DepthOut, 0) => Usage::Depth,
        _ => return None,
    })
}

fn implicit_output_index(regtype: RegisterType, regnum: u32) -> u32 {
    match regtype {
        RegisterType::RastOut | RegisterType::DepthOut => 0,
        _ => regnum,
    }
}
