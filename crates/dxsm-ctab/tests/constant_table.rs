use dxsm_ctab::{
    parse_ctab, tokens_to_bytes, CtabError, RegisterSet, SymbolClass, SymbolType, CTAB_ID,
};

fn put_u16(bytes: &mut Vec<u8>, v: u16) {
    bytes.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(bytes: &mut Vec<u8>, v: u32) {
    bytes.extend_from_slice(&v.to_le_bytes());
}

fn put_type(bytes: &mut Vec<u8>, class: u16, ty: u16, columns: u16, members: u16, member_offset: u32) {
    put_u16(bytes, class);
    put_u16(bytes, ty);
    put_u16(bytes, 1); // rows
    put_u16(bytes, columns);
    put_u16(bytes, 1); // elements
    put_u16(bytes, members);
    put_u32(bytes, member_offset);
}

fn put_constant(bytes: &mut Vec<u8>, name: u32, set: u16, index: u16, count: u16, ty: u32) {
    put_u32(bytes, name);
    put_u16(bytes, set);
    put_u16(bytes, index);
    put_u16(bytes, count);
    put_u16(bytes, 0);
    put_u32(bytes, ty);
    put_u32(bytes, 0);
}

/// Two symbols: `float4 Light` in c2 and `sampler2D Diffuse` in s1.
///
/// Layout:
///   0   header (28 bytes)
///   28  constant info x2 (20 bytes each)
///   68  type info: float4 vector
///   84  type info: sampler2D
///   100 strings: "Light", "Diffuse", "vs_3_0", "test"
fn build_ctab() -> Vec<u8> {
    let mut bytes = Vec::new();
    put_u32(&mut bytes, 28);
    put_u32(&mut bytes, 121); // creator
    put_u32(&mut bytes, 0xFFFE_0300);
    put_u32(&mut bytes, 2);
    put_u32(&mut bytes, 28);
    put_u32(&mut bytes, 0);
    put_u32(&mut bytes, 114); // target
    assert_eq!(bytes.len(), 28);

    put_constant(&mut bytes, 100, 2, 2, 1, 68);
    put_constant(&mut bytes, 106, 3, 1, 1, 84);
    assert_eq!(bytes.len(), 68);

    put_type(&mut bytes, 1, 3, 4, 0, 0);
    put_type(&mut bytes, 4, 12, 1, 0, 0);
    assert_eq!(bytes.len(), 100);

    bytes.extend_from_slice(b"Light\0Diffuse\0vs_3_0\0test\0");
    bytes
}

#[test]
fn parses_symbols_from_comment_payload() {
    let bytes = build_ctab();

    // The block travels inside a comment as tokens after the fourcc.
    let mut payload = vec![CTAB_ID.to_token()];
    payload.extend(bytes.chunks(4).map(|c| {
        let mut word = [0u8; 4];
        word[..c.len()].copy_from_slice(c);
        u32::from_le_bytes(word)
    }));
    assert_eq!(payload[0], u32::from_le_bytes(*b"CTAB"));

    let table = parse_ctab(&tokens_to_bytes(&payload[1..])).expect("parse CTAB");
    assert_eq!(table.creator.as_deref(), Some("test"));
    assert_eq!(table.target.as_deref(), Some("vs_3_0"));
    assert_eq!(table.version, 0xFFFE_0300);
    assert_eq!(table.symbols.len(), 2);

    let light = &table.symbols[0];
    assert_eq!(light.name, "Light");
    assert_eq!(light.register_set, RegisterSet::Float4);
    assert_eq!((light.register_index, light.register_count), (2, 1));
    assert_eq!(light.info.class, SymbolClass::Vector);
    assert_eq!(light.info.ty, SymbolType::Float);
    assert_eq!(light.info.columns, 4);

    let diffuse = &table.symbols[1];
    assert_eq!(diffuse.name, "Diffuse");
    assert_eq!(diffuse.register_set, RegisterSet::Sampler);
    assert_eq!(diffuse.register_index, 1);
    assert_eq!(diffuse.info.class, SymbolClass::Object);
    assert_eq!(diffuse.info.ty, SymbolType::Sampler2D);
}

#[test]
fn self_referencing_struct_is_corrupt() {
    // A struct whose only member points back at the struct type.
    let mut bytes = Vec::new();
    put_u32(&mut bytes, 28);
    put_u32(&mut bytes, 0);
    put_u32(&mut bytes, 0xFFFE_0300);
    put_u32(&mut bytes, 1);
    put_u32(&mut bytes, 28);
    put_u32(&mut bytes, 0);
    put_u32(&mut bytes, 0);
    put_constant(&mut bytes, 72, 2, 0, 1, 48);
    put_type(&mut bytes, 5, 0, 1, 1, 64);
    put_u32(&mut bytes, 72);
    put_u32(&mut bytes, 48);
    assert_eq!(bytes.len(), 72);
    bytes.extend_from_slice(b"self\0");

    let err = parse_ctab(&bytes).unwrap_err();
    assert!(matches!(err, CtabError::Corrupt(_)), "{err}");
}

#[test]
fn truncated_constant_info_is_out_of_bounds() {
    let mut bytes = build_ctab();
    bytes.truncate(60);
    let err = parse_ctab(&bytes).unwrap_err();
    assert!(matches!(err, CtabError::OutOfBounds(_)), "{err}");
}

#[test]
fn wrong_header_size_is_rejected() {
    let mut bytes = build_ctab();
    bytes[0] = 32;
    assert!(matches!(
        parse_ctab(&bytes),
        Err(CtabError::MalformedHeader(_))
    ));
}
