//! Passes the consumed token stream through unchanged.

use dxsm_ctab::tokens_to_bytes;

use crate::opcodes::Opcode;
use crate::parser::ParseState;
use crate::profile::{d3d_register_name, Profile};
use crate::types::RegisterType;

/// Emits the input tokens from the version token through END, dropping anything after END.
pub struct BytecodeProfile;

impl Profile for BytecodeProfile {
    fn name(&self) -> &'static str {
        "bytecode"
    }

    fn register_name(&self, ctx: &ParseState<'_>, regtype: RegisterType, regnum: u32) -> String {
        d3d_register_name(ctx.version, regtype, regnum)
    }

    fn emit(&mut self, _ctx: &mut ParseState<'_>, _opcode: Opcode) {}

    fn finalize(&mut self, ctx: &mut ParseState<'_>) {
        let bytes = tokens_to_bytes(ctx.tokens.consumed());
        ctx.out.set_binary(bytes);
    }
}
