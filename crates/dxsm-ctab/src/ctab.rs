use tracing::debug;

use crate::reader::ByteReader;
use crate::CtabError;

/// Declared size of the `D3DXSHADER_CONSTANTTABLE` header.
const CTAB_HEADER_LEN: u32 = 28;
const CONSTANT_INFO_LEN: usize = 20;
const TYPE_INFO_LEN: usize = 16;
const MEMBER_INFO_LEN: usize = 8;

/// Maximum nesting of struct member type descriptors.
///
/// Type offsets are attacker-controlled and may point back at themselves; exceeding this depth
/// is reported as corruption.
pub const MAX_TYPE_DEPTH: usize = 16;

/// Register file a constant table symbol is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterSet {
    /// `b#` registers.
    Bool,
    /// `i#` registers.
    Int4,
    /// `c#` registers.
    Float4,
    /// `s#` registers.
    Sampler,
}

impl RegisterSet {
    fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::Bool,
            1 => Self::Int4,
            2 => Self::Float4,
            3 => Self::Sampler,
            _ => return None,
        })
    }
}

/// `D3DXPARAMETER_CLASS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolClass {
    /// A single value.
    Scalar,
    /// A 1xN vector.
    Vector,
    /// Row-major matrix.
    MatrixRows,
    /// Column-major matrix.
    MatrixColumns,
    /// Texture, sampler or shader object.
    Object,
    /// Struct with named members.
    Struct,
}

impl SymbolClass {
    fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::Scalar,
            1 => Self::Vector,
            2 => Self::MatrixRows,
            3 => Self::MatrixColumns,
            4 => Self::Object,
            5 => Self::Struct,
            _ => return None,
        })
    }
}

/// `D3DXPARAMETER_TYPE`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolType {
    Void,
    Bool,
    Int,
    Float,
    String,
    Texture,
    Texture1D,
    Texture2D,
    Texture3D,
    TextureCube,
    Sampler,
    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCube,
    PixelShader,
    VertexShader,
    PixelFragment,
    VertexFragment,
    Unsupported,
}

impl SymbolType {
    fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::Void,
            1 => Self::Bool,
            2 => Self::Int,
            3 => Self::Float,
            4 => Self::String,
            5 => Self::Texture,
            6 => Self::Texture1D,
            7 => Self::Texture2D,
            8 => Self::Texture3D,
            9 => Self::TextureCube,
            10 => Self::Sampler,
            11 => Self::Sampler1D,
            12 => Self::Sampler2D,
            13 => Self::Sampler3D,
            14 => Self::SamplerCube,
            15 => Self::PixelShader,
            16 => Self::VertexShader,
            17 => Self::PixelFragment,
            18 => Self::VertexFragment,
            19 => Self::Unsupported,
            _ => return None,
        })
    }
}

/// Type descriptor of a symbol or struct member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTypeInfo {
    /// Parameter class.
    pub class: SymbolClass,
    /// Parameter base type.
    pub ty: SymbolType,
    /// Row count (1 for scalars and vectors).
    pub rows: u32,
    /// Column count.
    pub columns: u32,
    /// Array element count (1 for non-arrays).
    pub elements: u32,
    /// Struct members, in declaration order; empty for non-structs.
    pub members: Vec<SymbolStructMember>,
}

/// A named member of a struct symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolStructMember {
    /// Member name.
    pub name: String,
    /// Member type.
    pub info: SymbolTypeInfo,
}

/// A single constant table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// High-level variable name.
    pub name: String,
    /// Register file the variable lives in.
    pub register_set: RegisterSet,
    /// First register.
    pub register_index: u32,
    /// Number of consecutive registers.
    pub register_count: u32,
    /// Type descriptor.
    pub info: SymbolTypeInfo,
}

impl Symbol {
    /// Returns `true` if `register` lies inside this symbol's register range.
    pub fn contains_register(&self, register: u32) -> bool {
        register >= self.register_index
            && u64::from(register) < u64::from(self.register_index) + u64::from(self.register_count)
    }
}

/// A parsed constant table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConstantTable {
    /// Compiler identification string, if present.
    pub creator: Option<String>,
    /// Target profile string (e.g. `"vs_3_0"`), if present.
    pub target: Option<String>,
    /// Raw version dword.
    pub version: u32,
    /// Raw flags dword.
    pub flags: u32,
    /// Symbols in table order.
    pub symbols: Vec<Symbol>,
}

/// Parses a `CTAB` block.
///
/// `bytes` is the payload following the `CTAB` fourcc; every offset inside the table is
/// relative to its first byte.
pub fn parse_ctab(bytes: &[u8]) -> Result<ConstantTable, CtabError> {
    let r = ByteReader::new(bytes);
    let mut hdr = r.fork(0)?;
    let size = hdr
        .read_u32_le("header size")
        .map_err(|e| CtabError::malformed_header(e.context().to_owned()))?;
    if size != CTAB_HEADER_LEN {
        return Err(CtabError::malformed_header(format!(
            "header size {size}, expected {CTAB_HEADER_LEN}"
        )));
    }
    let creator_offset = hdr.read_u32_le("creator offset")?;
    let version = hdr.read_u32_le("version")?;
    let constant_count = hdr.read_u32_le("constant count")?;
    let constant_info_offset = hdr.read_u32_le("constant info offset")?;
    let flags = hdr.read_u32_le("flags")?;
    let target_offset = hdr.read_u32_le("target offset")?;

    let creator = (creator_offset != 0)
        .then(|| r.read_cstring_at(creator_offset as usize, "creator"))
        .transpose()?;
    let target = (target_offset != 0)
        .then(|| r.read_cstring_at(target_offset as usize, "target"))
        .transpose()?;

    let table_len = (constant_count as usize)
        .checked_mul(CONSTANT_INFO_LEN)
        .ok_or_else(|| CtabError::out_of_bounds("constant count overflows table size"))?;
    let table_end = (constant_info_offset as usize)
        .checked_add(table_len)
        .ok_or_else(|| CtabError::out_of_bounds("constant table end overflows"))?;
    if table_end > r.len() {
        return Err(CtabError::out_of_bounds(format!(
            "{constant_count} constants at offset {constant_info_offset} exceed block length {}",
            r.len()
        )));
    }

    let mut symbols = Vec::with_capacity(constant_count as usize);
    for i in 0..constant_count as usize {
        let mut cr = r.fork(constant_info_offset as usize + i * CONSTANT_INFO_LEN)?;
        let name_offset = cr.read_u32_le("name offset")?;
        let register_set_raw = cr.read_u16_le("register set")?;
        let register_index = cr.read_u16_le("register index")?;
        let register_count = cr.read_u16_le("register count")?;
        let _reserved = cr.read_u16_le("reserved")?;
        let type_info_offset = cr.read_u32_le("type info offset")?;
        let _default_value_offset = cr.read_u32_le("default value offset")?;

        let name = r.read_cstring_at(name_offset as usize, "symbol name")?;
        let register_set = RegisterSet::from_raw(register_set_raw).ok_or_else(|| {
            CtabError::corrupt(format!(
                "symbol {name:?} has unknown register set {register_set_raw}"
            ))
        })?;
        let info = parse_type_info(&r, type_info_offset as usize, 0)?;

        symbols.push(Symbol {
            name,
            register_set,
            register_index: u32::from(register_index),
            register_count: u32::from(register_count),
            info,
        });
    }

    debug!(
        symbols = symbols.len(),
        target = target.as_deref().unwrap_or(""),
        "parsed constant table"
    );

    Ok(ConstantTable {
        creator,
        target,
        version,
        flags,
        symbols,
    })
}

fn parse_type_info(
    r: &ByteReader<'_>,
    offset: usize,
    depth: usize,
) -> Result<SymbolTypeInfo, CtabError> {
    if depth > MAX_TYPE_DEPTH {
        return Err(CtabError::corrupt(format!(
            "struct member nesting exceeds maximum depth {MAX_TYPE_DEPTH}"
        )));
    }
    if offset.saturating_add(TYPE_INFO_LEN) > r.len() {
        return Err(CtabError::out_of_bounds(format!(
            "type info at offset {offset} exceeds block length {}",
            r.len()
        )));
    }

    let mut tr = r.fork(offset)?;
    let class_raw = tr.read_u16_le("type class")?;
    let ty_raw = tr.read_u16_le("type")?;
    let rows = tr.read_u16_le("rows")?;
    let columns = tr.read_u16_le("columns")?;
    let elements = tr.read_u16_le("elements")?;
    let member_count = tr.read_u16_le("struct member count")?;
    let member_info_offset = tr.read_u32_le("struct member offset")? as usize;

    let class = SymbolClass::from_raw(class_raw)
        .ok_or_else(|| CtabError::corrupt(format!("unknown symbol class {class_raw}")))?;
    let ty = SymbolType::from_raw(ty_raw)
        .ok_or_else(|| CtabError::corrupt(format!("unknown symbol type {ty_raw}")))?;

    let members_end = member_info_offset.saturating_add(usize::from(member_count) * MEMBER_INFO_LEN);
    if member_count > 0 && members_end > r.len() {
        return Err(CtabError::out_of_bounds(format!(
            "{member_count} struct members at offset {member_info_offset} exceed block length {}",
            r.len()
        )));
    }

    let mut members = Vec::with_capacity(usize::from(member_count));
    for i in 0..usize::from(member_count) {
        let mut mr = r.fork(member_info_offset + i * MEMBER_INFO_LEN)?;
        let name_offset = mr.read_u32_le("member name offset")?;
        let member_type_offset = mr.read_u32_le("member type offset")?;
        let name = r.read_cstring_at(name_offset as usize, "member name")?;
        let info = parse_type_info(r, member_type_offset as usize, depth + 1)?;
        members.push(SymbolStructMember { name, info });
    }

    Ok(SymbolTypeInfo {
        class,
        ty,
        rows: u32::from(rows),
        columns: u32::from(columns),
        elements: u32::from(elements),
        members,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_utils::{CtabBuilder, TypeDesc};

    #[test]
    fn parses_float_array_symbol() {
        let bytes = CtabBuilder::new()
            .target("vs_2_0")
            .symbol("Bones", RegisterSet::Float4, 4, 12, TypeDesc::matrix_rows(4, 3, 3))
            .build();
        let ctab = parse_ctab(&bytes).unwrap();
        assert_eq!(ctab.target.as_deref(), Some("vs_2_0"));
        assert_eq!(ctab.symbols.len(), 1);
        let sym = &ctab.symbols[0];
        assert_eq!(sym.name, "Bones");
        assert_eq!(sym.register_set, RegisterSet::Float4);
        assert_eq!((sym.register_index, sym.register_count), (4, 12));
        assert_eq!(sym.info.class, SymbolClass::MatrixRows);
        assert_eq!((sym.info.rows, sym.info.columns, sym.info.elements), (4, 3, 3));
        assert!(sym.contains_register(15));
        assert!(!sym.contains_register(16));
    }

    #[test]
    fn parses_struct_members() {
        let light = TypeDesc::structure(vec![
            ("Position", TypeDesc::vector(3)),
            ("Color", TypeDesc::vector(4)),
        ]);
        let bytes = CtabBuilder::new()
            .symbol("Light", RegisterSet::Float4, 0, 2, light)
            .build();
        let ctab = parse_ctab(&bytes).unwrap();
        let members = &ctab.symbols[0].info.members;
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name, "Position");
        assert_eq!(members[0].info.columns, 3);
        assert_eq!(members[1].name, "Color");
    }

    #[test]
    fn rejects_bad_header_size() {
        let mut bytes = CtabBuilder::new().build();
        bytes[0] = 27;
        assert!(matches!(
            parse_ctab(&bytes),
            Err(CtabError::MalformedHeader(_))
        ));
    }

    #[test]
    fn rejects_unterminated_name() {
        let mut bytes = CtabBuilder::new()
            .symbol("x", RegisterSet::Float4, 0, 1, TypeDesc::vector(4))
            .build();
        // Overwrite every NUL after the string pool start so the name runs off the end.
        let len = bytes.len();
        let last = len - 1;
        assert_eq!(bytes[last], 0);
        bytes[last] = b'!';
        assert!(parse_ctab(&bytes).is_err());
    }

    #[test]
    fn rejects_constant_table_past_end() {
        let mut bytes = CtabBuilder::new().build();
        // Claim 1000 constants.
        bytes[12..16].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(parse_ctab(&bytes), Err(CtabError::OutOfBounds(_))));
    }

    #[test]
    fn self_referential_struct_hits_depth_limit() {
        let mut bytes = CtabBuilder::new()
            .symbol(
                "Loop",
                RegisterSet::Float4,
                0,
                1,
                TypeDesc::structure(vec![("inner", TypeDesc::vector(4))]),
            )
            .build();
        let info = crate::test_utils::first_symbol_layout(&bytes);
        // Point the single member's type back at the struct's own type info.
        let member_type_field = info.member_info_offset + 4;
        bytes[member_type_field..member_type_field + 4]
            .copy_from_slice(&(info.type_info_offset as u32).to_le_bytes());
        let err = parse_ctab(&bytes).unwrap_err();
        assert!(err.context().contains("maximum depth"), "{err}");
    }
}
