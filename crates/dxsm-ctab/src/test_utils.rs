//! Builders for synthetic `CTAB` and preshader blocks.

use crate::{FourCC, RegisterSet};

/// A type descriptor to serialize into a synthetic constant table.
#[derive(Debug, Clone)]
pub struct TypeDesc {
    /// Raw `D3DXPARAMETER_CLASS`.
    pub class: u16,
    /// Raw `D3DXPARAMETER_TYPE`.
    pub ty: u16,
    /// Rows.
    pub rows: u16,
    /// Columns.
    pub columns: u16,
    /// Array elements.
    pub elements: u16,
    /// Struct members.
    pub members: Vec<(String, TypeDesc)>,
}

impl TypeDesc {
    /// A `float1xN` vector.
    pub fn vector(columns: u16) -> Self {
        Self {
            class: 1,
            ty: 3,
            rows: 1,
            columns,
            elements: 1,
            members: Vec::new(),
        }
    }

    /// A row-major float matrix, optionally an array.
    pub fn matrix_rows(rows: u16, columns: u16, elements: u16) -> Self {
        Self {
            class: 2,
            ty: 3,
            rows,
            columns,
            elements,
            members: Vec::new(),
        }
    }

    /// A scalar `bool`.
    pub fn bool_scalar() -> Self {
        Self {
            class: 0,
            ty: 1,
            rows: 1,
            columns: 1,
            elements: 1,
            members: Vec::new(),
        }
    }

    /// A `sampler2D` object.
    pub fn sampler2d() -> Self {
        Self {
            class: 4,
            ty: 12,
            rows: 1,
            columns: 1,
            elements: 1,
            members: Vec::new(),
        }
    }

    /// A struct with the given members.
    pub fn structure(members: Vec<(&str, TypeDesc)>) -> Self {
        Self {
            class: 5,
            ty: 0,
            rows: 1,
            columns: 1,
            elements: 1,
            members: members
                .into_iter()
                .map(|(name, ty)| (name.to_owned(), ty))
                .collect(),
        }
    }
}

struct SymbolDesc {
    name: String,
    set: RegisterSet,
    index: u16,
    count: u16,
    ty: TypeDesc,
}

/// Serializes a constant table block (the payload following the `CTAB` fourcc).
#[derive(Default)]
pub struct CtabBuilder {
    creator: Option<String>,
    target: Option<String>,
    symbols: Vec<SymbolDesc>,
}

impl CtabBuilder {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the creator string.
    pub fn creator(mut self, creator: &str) -> Self {
        self.creator = Some(creator.to_owned());
        self
    }

    /// Sets the target string.
    pub fn target(mut self, target: &str) -> Self {
        self.target = Some(target.to_owned());
        self
    }

    /// Appends a symbol.
    pub fn symbol(
        mut self,
        name: &str,
        set: RegisterSet,
        index: u16,
        count: u16,
        ty: TypeDesc,
    ) -> Self {
        self.symbols.push(SymbolDesc {
            name: name.to_owned(),
            set,
            index,
            count,
            ty,
        });
        self
    }

    /// Returns the raw block bytes. Strings are pooled at the end of the block.
    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; 28 + self.symbols.len() * 20];
        let mut strings: Vec<(usize, String)> = Vec::new();

        put_u32(&mut out, 0, 28);
        if let Some(creator) = &self.creator {
            strings.push((4, creator.clone()));
        }
        put_u32(&mut out, 8, 0xFFFE_0300);
        put_u32(&mut out, 12, self.symbols.len() as u32);
        put_u32(&mut out, 16, 28);
        if let Some(target) = &self.target {
            strings.push((24, target.clone()));
        }

        for (i, sym) in self.symbols.iter().enumerate() {
            let base = 28 + i * 20;
            strings.push((base, sym.name.clone()));
            let set = match sym.set {
                RegisterSet::Bool => 0,
                RegisterSet::Int4 => 1,
                RegisterSet::Float4 => 2,
                RegisterSet::Sampler => 3,
            };
            put_u16(&mut out, base + 4, set);
            put_u16(&mut out, base + 6, sym.index);
            put_u16(&mut out, base + 8, sym.count);
            let type_offset = write_type(&mut out, &sym.ty, &mut strings);
            put_u32(&mut out, base + 12, type_offset as u32);
        }

        for (patch, s) in strings {
            let offset = out.len();
            out.extend_from_slice(s.as_bytes());
            out.push(0);
            put_u32(&mut out, patch, offset as u32);
        }
        out
    }

    /// Returns the block as comment payload tokens, prefixed with the `CTAB` id.
    pub fn build_payload(&self) -> Vec<u32> {
        payload_tokens(FourCC(*b"CTAB"), &self.build())
    }
}

fn write_type(out: &mut Vec<u8>, ty: &TypeDesc, strings: &mut Vec<(usize, String)>) -> usize {
    let offset = out.len();
    out.resize(offset + 16, 0);
    put_u16(out, offset, ty.class);
    put_u16(out, offset + 2, ty.ty);
    put_u16(out, offset + 4, ty.rows);
    put_u16(out, offset + 6, ty.columns);
    put_u16(out, offset + 8, ty.elements);
    put_u16(out, offset + 10, ty.members.len() as u16);
    if !ty.members.is_empty() {
        let members = out.len();
        out.resize(members + ty.members.len() * 8, 0);
        put_u32(out, offset + 12, members as u32);
        for (j, (name, member)) in ty.members.iter().enumerate() {
            strings.push((members + j * 8, name.clone()));
            let member_type = write_type(out, member, strings);
            put_u32(out, members + j * 8 + 4, member_type as u32);
        }
    }
    offset
}

/// Offsets of the first symbol's type descriptors inside a block built by [`CtabBuilder`].
#[derive(Debug, Clone, Copy)]
pub struct SymbolLayout {
    /// Offset of the symbol's type info.
    pub type_info_offset: usize,
    /// Offset of the type's struct member table (0 when it has no members).
    pub member_info_offset: usize,
}

/// Locates the type descriptors of the first symbol in a built block.
pub fn first_symbol_layout(bytes: &[u8]) -> SymbolLayout {
    let type_info_offset = get_u32(bytes, 28 + 12) as usize;
    let member_info_offset = get_u32(bytes, type_info_offset + 12) as usize;
    SymbolLayout {
        type_info_offset,
        member_info_offset,
    }
}

/// Serializes a preshader block (the payload following the `PRES` fourcc).
#[derive(Default)]
pub struct PreshaderBuilder {
    ctab: Option<Vec<u8>>,
    literals: Vec<f64>,
    outputs: Vec<(u32, u32)>,
    instructions: Vec<(u16, u8, Vec<(u32, u32)>)>,
}

impl PreshaderBuilder {
    /// Creates an empty preshader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Embeds a constant table describing the preshader inputs.
    pub fn ctab(mut self, ctab: &CtabBuilder) -> Self {
        self.ctab = Some(ctab.build());
        self
    }

    /// Appends a literal to the pool.
    pub fn literal(mut self, value: f64) -> Self {
        self.literals.push(value);
        self
    }

    /// Maps preshader output register `from` onto shader constant register `to`.
    pub fn output(mut self, from: u32, to: u32) -> Self {
        self.outputs.push((from, to));
        self
    }

    /// Appends an instruction. `operands` are `(kind, component index)` pairs, sources first
    /// and the destination last.
    pub fn instruction(mut self, opcode: u16, elements: u8, operands: &[(u32, u32)]) -> Self {
        self.instructions
            .push((opcode, elements, operands.to_vec()));
        self
    }

    /// Returns the preshader token stream.
    pub fn build(&self) -> Vec<u32> {
        let mut tokens = vec![0x4658_0201];
        if let Some(ctab) = &self.ctab {
            tokens.extend(comment(FourCC(*b"CTAB"), ctab));
        }

        let mut clit = Vec::new();
        clit.extend_from_slice(&(self.literals.len() as u32).to_le_bytes());
        for lit in &self.literals {
            clit.extend_from_slice(&lit.to_le_bytes());
        }
        tokens.extend(comment(FourCC(*b"CLIT"), &clit));

        let mut fxlc = vec![self.instructions.len() as u32];
        for (opcode, elements, operands) in &self.instructions {
            fxlc.push((u32::from(*opcode) << 16) | u32::from(*elements));
            fxlc.push(operands.len().saturating_sub(1) as u32);
            for &(kind, index) in operands {
                fxlc.extend_from_slice(&[0, kind, index]);
            }
        }
        tokens.extend(comment(FourCC(*b"FXLC"), &crate::tokens_to_bytes(&fxlc)));

        if !self.outputs.is_empty() {
            let mut prsi = vec![self.outputs.len() as u32];
            for &(from, to) in &self.outputs {
                prsi.extend_from_slice(&[from, to]);
            }
            tokens.extend(comment(FourCC(*b"PRSI"), &crate::tokens_to_bytes(&prsi)));
        }

        tokens.push(0x0000_FFFF);
        tokens
    }

    /// Returns the preshader as comment payload tokens, prefixed with the `PRES` id.
    pub fn build_payload(&self) -> Vec<u32> {
        let mut out = vec![FourCC(*b"PRES").to_token()];
        out.extend(self.build());
        out
    }
}

/// Packs `id` followed by `bytes` (zero-padded to a token boundary) into payload tokens.
pub fn payload_tokens(id: FourCC, bytes: &[u8]) -> Vec<u32> {
    let mut out = vec![id.to_token()];
    for chunk in bytes.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        out.push(u32::from_le_bytes(word));
    }
    out
}

/// Wraps payload tokens in a comment token (`0xFFFE` with the payload length in bits 16..31).
pub fn comment_tokens(payload: &[u32]) -> Vec<u32> {
    let mut out = vec![0xFFFE | ((payload.len() as u32) << 16)];
    out.extend_from_slice(payload);
    out
}

fn comment(id: FourCC, bytes: &[u8]) -> Vec<u32> {
    comment_tokens(&payload_tokens(id, bytes))
}

fn put_u16(out: &mut [u8], at: usize, v: u16) {
    out[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut [u8], at: usize, v: u32) {
    out[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn get_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
