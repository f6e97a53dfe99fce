//! Token stream cursor and bit-field layout of instruction and parameter tokens.

use crate::types::{ShaderType, ShaderVersion};

pub(crate) const OPCODE_MASK: u32 = 0x0000_FFFF;
pub(crate) const CONTROLS_MASK: u32 = 0x00FF_0000;
pub(crate) const CONTROLS_SHIFT: u32 = 16;
pub(crate) const LENGTH_MASK: u32 = 0x0F00_0000;
pub(crate) const LENGTH_SHIFT: u32 = 24;
pub(crate) const PREDICATED: u32 = 0x1000_0000;
pub(crate) const INSTRUCTION_RESERVED: u32 = 0x2000_0000;
pub(crate) const COISSUE: u32 = 0x4000_0000;
pub(crate) const INSTRUCTION_HIGH_BIT: u32 = 0x8000_0000;

pub(crate) const END_TOKEN: u32 = 0x0000_FFFF;
pub(crate) const PHASE_TOKEN: u32 = 0x0000_FFFD;
pub(crate) const COMMENT_OPCODE: u32 = 0xFFFE;
pub(crate) const COMMENT_LENGTH_MASK: u32 = 0x7FFF_0000;
pub(crate) const COMMENT_LENGTH_SHIFT: u32 = 16;

pub(crate) const REGNUM_MASK: u32 = 0x0000_07FF;
pub(crate) const REGTYPE_MASK: u32 = 0x7000_0000;
pub(crate) const REGTYPE_SHIFT: u32 = 28;
pub(crate) const REGTYPE_MASK2: u32 = 0x0000_1800;
pub(crate) const REGTYPE_SHIFT2: u32 = 8;
pub(crate) const RELATIVE: u32 = 0x0000_2000;
pub(crate) const PARAM_RESERVED: u32 = 0x0000_C000;
pub(crate) const PARAM_HIGH_BIT: u32 = 0x8000_0000;

pub(crate) const WRITEMASK_MASK: u32 = 0x000F_0000;
pub(crate) const WRITEMASK_SHIFT: u32 = 16;
pub(crate) const RESULT_MOD_MASK: u32 = 0x00F0_0000;
pub(crate) const RESULT_MOD_SHIFT: u32 = 20;
pub(crate) const RESULT_SHIFT_MASK: u32 = 0x0F00_0000;
pub(crate) const RESULT_SHIFT_SHIFT: u32 = 24;

pub(crate) const SWIZZLE_MASK: u32 = 0x00FF_0000;
pub(crate) const SWIZZLE_SHIFT: u32 = 16;
pub(crate) const SRCMOD_MASK: u32 = 0x0F00_0000;
pub(crate) const SRCMOD_SHIFT: u32 = 24;

/// Raw register type assembled from the two split bit ranges of a parameter token.
pub(crate) fn raw_register_type(token: u32) -> u32 {
    ((token & REGTYPE_MASK) >> REGTYPE_SHIFT) | ((token & REGTYPE_MASK2) >> REGTYPE_SHIFT2)
}

/// Sign-extends the 4-bit destination shift field.
pub(crate) fn result_shift(token: u32) -> i8 {
    let raw = ((token & RESULT_SHIFT_MASK) >> RESULT_SHIFT_SHIFT) as i8;
    if raw & 0x8 != 0 {
        raw - 16
    } else {
        raw
    }
}

/// Decodes the version token into a shader type and version.
///
/// Returns a message describing the problem for unknown types or unsupported versions.
pub fn decode_version_token(token: u32) -> Result<ShaderVersion, String> {
    let shader_type = match token >> 16 {
        0xFFFE => ShaderType::Vertex,
        0xFFFF => ShaderType::Pixel,
        other => return Err(format!("Unsupported shader type or not a shader at all ({other:#06x})")),
    };
    let major = ((token >> 8) & 0xFF) as u8;
    let minor = (token & 0xFF) as u8;
    let version = ShaderVersion::new(shader_type, major, minor);
    if !version.is_supported() {
        return Err(format!(
            "Shader Model {major}.{minor} is currently unsupported for {} shaders",
            match shader_type {
                ShaderType::Vertex => "vertex",
                ShaderType::Pixel => "pixel",
            }
        ));
    }
    Ok(version)
}

/// Cursor over a decoded token buffer, already cut to any declared token count.
#[derive(Debug, Clone)]
pub struct TokenStream<'a> {
    tokens: &'a [u32],
    pos: usize,
}

impl<'a> TokenStream<'a> {
    pub fn new(tokens: &'a [u32]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Index of the next token.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.tokens.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek(&self) -> Option<u32> {
        self.tokens.get(self.pos).copied()
    }

    pub fn next_token(&mut self) -> Option<u32> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    /// Consumes `count` tokens, or nothing when fewer remain.
    pub fn take(&mut self, count: usize) -> Option<&'a [u32]> {
        let end = self.pos.checked_add(count)?;
        let slice = self.tokens.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    /// Tokens consumed so far, including the version token.
    pub fn consumed(&self) -> &'a [u32] {
        &self.tokens[..self.pos]
    }

    /// Moves the cursor to `pos`, clamped to the stream length.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.tokens.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_tokens() {
        let vs = decode_version_token(0xFFFE_0101).unwrap();
        assert_eq!(vs, ShaderVersion::new(ShaderType::Vertex, 1, 1));
        let ps = decode_version_token(0xFFFF_0300).unwrap();
        assert_eq!(ps, ShaderVersion::new(ShaderType::Pixel, 3, 0));

        let err = decode_version_token(0x0000_0101).unwrap_err();
        assert!(err.contains("Unsupported shader type"), "{err}");
        let err = decode_version_token(0xFFFE_0104).unwrap_err();
        assert!(err.contains("1.4"), "{err}");
    }

    #[test]
    fn register_type_bits_are_split() {
        // c2048 is encoded as CONST2 (11): low bits 0b011 at 28..31, high bits 0b01 at 11..13.
        let token = 0x8000_0000 | (3 << REGTYPE_SHIFT) | (1 << 11);
        assert_eq!(raw_register_type(token), 11);
        assert_eq!(raw_register_type(0x8000_0000 | (2 << REGTYPE_SHIFT)), 2);
    }

    #[test]
    fn shift_is_sign_extended() {
        assert_eq!(result_shift(0x0100_0000), 1);
        assert_eq!(result_shift(0x0F00_0000), -1);
        assert_eq!(result_shift(0x0D00_0000), -3);
        assert_eq!(result_shift(0), 0);
    }

    #[test]
    fn stream_take_is_all_or_nothing() {
        let tokens = [1, 2, 3];
        let mut ts = TokenStream::new(&tokens);
        assert_eq!(ts.next_token(), Some(1));
        assert_eq!(ts.take(3), None);
        assert_eq!(ts.position(), 1);
        assert_eq!(ts.take(2), Some(&tokens[1..]));
        assert!(ts.is_empty());
        assert_eq!(ts.consumed(), &tokens[..]);
    }
}
