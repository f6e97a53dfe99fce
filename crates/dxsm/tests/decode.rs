use dxsm::{
    parse, Attribute, Constant, ConstantValue, ParseOptions, ParseResult, ProfileKind,
    RegisterSet, ShaderType, Swizzle, SwizzleRemap, Uniform, UniformType, Usage,
};
use dxsm_ctab::test_utils::{comment_tokens, CtabBuilder, PreshaderBuilder, TypeDesc};
use pretty_assertions::assert_eq;

const TEMP: u8 = 0;
const INPUT: u8 = 1;
const CONST: u8 = 2;
const ADDR: u8 = 3;
const TEXTURE: u8 = 3;
const RASTOUT: u8 = 4;
const ATTROUT: u8 = 5;
const CONSTINT: u8 = 7;
const COLOROUT: u8 = 8;
const SAMPLER: u8 = 10;
const CONSTBOOL: u8 = 14;
const LOOP: u8 = 15;
const LABEL: u8 = 18;
const PREDICATE: u8 = 19;

const PREDICATED: u32 = 0x1000_0000;

const END: u32 = 0x0000_FFFF;

fn version_token(stage: ShaderType, major: u8, minor: u8) -> u32 {
    let prefix = match stage {
        ShaderType::Vertex => 0xFFFE_0000,
        ShaderType::Pixel => 0xFFFF_0000,
    };
    prefix | ((major as u32) << 8) | (minor as u32)
}

fn opcode_token(op: u16, operand_count: u8) -> u32 {
    // Bits 24..27 hold the operand token count, not counting the opcode token itself.
    (op as u32) | ((operand_count as u32) << 24)
}

fn reg_token(regtype: u8, index: u32) -> u32 {
    let low3 = (regtype as u32) & 0x7;
    let high2 = (regtype as u32) & 0x18;
    0x8000_0000 | (low3 << 28) | (high2 << 8) | (index & 0x7FF)
}

fn dst_token(regtype: u8, index: u32, mask: u8) -> u32 {
    reg_token(regtype, index) | ((mask as u32) << 16)
}

fn src_token(regtype: u8, index: u32, swizzle: u8, srcmod: u8) -> u32 {
    reg_token(regtype, index) | ((swizzle as u32) << 16) | ((srcmod as u32) << 24)
}

fn dcl_token(usage: u32, index: u32) -> u32 {
    0x8000_0000 | usage | (index << 16)
}

fn to_bytes(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 4);
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

fn decode(profile: &str, words: &[u32]) -> ParseResult {
    parse(profile, &to_bytes(words), &ParseOptions::default())
}

fn messages(result: &ParseResult) -> Vec<&str> {
    result.errors.iter().map(|e| e.message.as_str()).collect()
}

#[test]
fn empty_vs_1_1_has_no_declarations() {
    let words = [version_token(ShaderType::Vertex, 1, 1), END];
    for kind in ProfileKind::ALL {
        let result = decode(kind.name(), &words);
        assert!(result.errors.is_empty(), "{}: {:?}", kind.name(), result.errors);
        assert_eq!(result.shader_type, Some(ShaderType::Vertex));
        assert_eq!((result.major_ver, result.minor_ver), (1, 1));
        assert_eq!(result.instruction_count, 0);
        assert!(result.uniforms.is_empty());
        assert!(result.attributes.is_empty());
        assert!(result.outputs.is_empty());
        assert!(result.samplers.is_empty());
        assert!(result.constants.is_empty());
        assert_eq!(result.mainfn, "main");
    }
}

#[test]
fn def_then_mov_to_color_output() {
    // ps_2_0
    //   def c0, 1.0, 2.0, 3.0, 4.0
    //   mov oC0, c0
    let words = [
        version_token(ShaderType::Pixel, 2, 0),
        opcode_token(81, 5),
        dst_token(CONST, 0, 0xF),
        1.0f32.to_bits(),
        2.0f32.to_bits(),
        3.0f32.to_bits(),
        4.0f32.to_bits(),
        opcode_token(1, 2),
        dst_token(COLOROUT, 0, 0xF),
        src_token(CONST, 0, 0xE4, 0),
        END,
    ];
    let result = decode("d3d", &words);
    assert!(result.is_ok(), "{:?}", result.errors);
    assert_eq!(
        result.constants,
        vec![Constant {
            index: 0,
            value: ConstantValue::Float([1.0, 2.0, 3.0, 4.0]),
        }]
    );
    // A DEF'd register is never a uniform.
    assert!(result.uniforms.is_empty());
    assert_eq!(
        result.outputs,
        vec![Attribute {
            usage: Usage::Color,
            index: 0,
            name: "oC0".into(),
        }]
    );
    assert_eq!(result.instruction_count, 1);
}

#[test]
fn truncated_operand_reports_out_of_tokens_once() {
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(4, 4),
        dst_token(TEMP, 0, 0xF),
        src_token(INPUT, 0, 0xE4, 0),
    ];
    for kind in ProfileKind::ALL {
        let result = decode(kind.name(), &words);
        assert_eq!(messages(&result), ["Out of tokens"], "{}", kind.name());
        assert!(result.output.is_empty());
        assert_eq!(result.shader_type, Some(ShaderType::Vertex));
    }
}

#[test]
fn truncated_comment_reports_out_of_tokens_once() {
    let words = [version_token(ShaderType::Pixel, 3, 0), 0xFFFE | (8 << 16), 0, 0];
    let result = decode("glsl", &words);
    assert_eq!(messages(&result), ["Out of tokens"]);
}

#[test]
fn declared_token_count_bounds_the_stream() {
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(1, 2),
        dst_token(RASTOUT, 0, 0xF),
        src_token(CONST, 0, 0xE4, 0),
        END,
    ];
    let options = ParseOptions {
        declared_token_count: Some(4),
        ..ParseOptions::default()
    };
    let result = parse("d3d", &to_bytes(&words), &options);
    assert_eq!(messages(&result), ["Out of tokens"]);
}

#[test]
fn def_after_instruction_is_rejected() {
    // ps_2_0
    //   mov r0, c1
    //   def c0, 0.0, 0.0, 0.0, 0.0
    //   mov oC0, r0
    let words = [
        version_token(ShaderType::Pixel, 2, 0),
        opcode_token(1, 2),
        dst_token(TEMP, 0, 0xF),
        src_token(CONST, 1, 0xE4, 0),
        opcode_token(81, 5),
        dst_token(CONST, 0, 0xF),
        0,
        0,
        0,
        0,
        opcode_token(1, 2),
        dst_token(COLOROUT, 0, 0xF),
        src_token(TEMP, 0, 0xE4, 0),
        END,
    ];
    let result = decode("d3d", &words);
    assert_eq!(messages(&result), ["DEF token must come before any instructions"]);
    assert_eq!(result.errors[0].position, Some(16));
    assert!(result.output.is_empty());
}

#[test]
fn loop_without_endloop_is_rejected() {
    // vs_2_0
    //   defi i0, 3, 0, 1, 0
    //   loop aL, i0
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(48, 5),
        dst_token(CONSTINT, 0, 0xF),
        3,
        0,
        1,
        0,
        opcode_token(27, 2),
        src_token(LOOP, 0, 0xE4, 0),
        src_token(CONSTINT, 0, 0xE4, 0),
        END,
    ];
    let result = decode("d3d", &words);
    assert_eq!(messages(&result), ["LOOP without ENDLOOP"]);
}

#[test]
fn break_outside_loop_is_rejected() {
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(44, 0),
        END,
    ];
    let result = decode("d3d", &words);
    assert_eq!(
        messages(&result),
        ["BREAK outside LOOP/ENDLOOP or REP/ENDREP"]
    );
}

#[test]
fn break_inside_rep_is_accepted() {
    // vs_2_0
    //   rep i0
    //     break
    //   endrep
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(38, 1),
        src_token(CONSTINT, 0, 0xE4, 0),
        opcode_token(44, 0),
        opcode_token(39, 0),
        END,
    ];
    let result = decode("d3d", &words);
    assert!(result.is_ok(), "{:?}", result.errors);
    assert_eq!(
        result.uniforms,
        vec![Uniform {
            uniform_type: UniformType::Int,
            index: 0,
            array_count: 0,
            constant: false,
            name: "i0".into(),
        }]
    );
}

fn call_program(second_call_in_loop: bool) -> Vec<u32> {
    let call = [opcode_token(25, 1), src_token(LABEL, 0, 0xE4, 0)];
    let mut words = vec![
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(48, 5),
        dst_token(CONSTINT, 0, 0xF),
        1,
        0,
        1,
        0,
    ];
    words.extend(call);
    if second_call_in_loop {
        words.extend([
            opcode_token(27, 2),
            src_token(LOOP, 0, 0xE4, 0),
            src_token(CONSTINT, 0, 0xE4, 0),
        ]);
        words.extend(call);
        words.push(opcode_token(29, 0));
    } else {
        words.extend(call);
    }
    words.extend([
        opcode_token(28, 0),
        opcode_token(30, 1),
        src_token(LABEL, 0, 0xE4, 0),
        opcode_token(28, 0),
        END,
    ]);
    words
}

#[test]
fn calls_must_agree_on_loop_wrapping() {
    let result = decode("d3d", &call_program(true));
    assert_eq!(
        messages(&result),
        ["CALL to label l0 must always be inside a LOOP or never inside one"]
    );

    for kind in ProfileKind::ALL {
        let result = decode(kind.name(), &call_program(false));
        assert!(result.is_ok(), "{}: {:?}", kind.name(), result.errors);
    }
}

#[test]
fn call_to_missing_label_is_rejected() {
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(25, 1),
        src_token(LABEL, 3, 0xE4, 0),
        opcode_token(28, 0),
        END,
    ];
    let result = decode("glsl", &words);
    assert_eq!(messages(&result), ["CALL to undefined label l3"]);
}

#[test]
fn unknown_opcode_is_skipped_by_length() {
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(75, 1),
        0x8000_0000,
        opcode_token(1, 2),
        dst_token(RASTOUT, 0, 0xF),
        src_token(CONST, 0, 0xE4, 0),
        END,
    ];
    let result = decode("d3d", &words);
    assert_eq!(messages(&result), ["Unknown opcode (0x004b)"]);
    assert_eq!(result.instruction_count, 1);
}

#[test]
fn phase_requires_ps_1_4() {
    let words = [version_token(ShaderType::Pixel, 2, 0), 0x0000_FFFD, END];
    let result = decode("d3d", &words);
    assert_eq!(
        messages(&result),
        ["PHASE token only available in 1.4 pixel shaders"]
    );
}

#[test]
fn unsupported_version_is_fatal() {
    let result = decode("d3d", &[version_token(ShaderType::Pixel, 1, 5), END]);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("unsupported"));
    assert_eq!(result.shader_type, None);
}

fn transform_program(ctab: &CtabBuilder) -> Vec<u32> {
    // vs_2_0
    //   dcl_position v0
    //   m4x4 oPos, v0, c0
    let mut words = vec![version_token(ShaderType::Vertex, 2, 0)];
    words.extend(comment_tokens(&ctab.build_payload()));
    words.extend([
        opcode_token(31, 2),
        dcl_token(0, 0),
        dst_token(INPUT, 0, 0xF),
        opcode_token(20, 3),
        dst_token(RASTOUT, 0, 0xF),
        src_token(INPUT, 0, 0xE4, 0),
        src_token(CONST, 0, 0xE4, 0),
        END,
    ]);
    words
}

#[test]
fn matrix_rows_become_uniforms() {
    let ctab = CtabBuilder::new().target("vs_2_0").symbol(
        "WorldViewProj",
        RegisterSet::Float4,
        0,
        4,
        TypeDesc::matrix_rows(4, 4, 1),
    );
    let result = decode("d3d", &transform_program(&ctab));
    assert!(result.is_ok(), "{:?}", result.errors);

    assert_eq!(result.symbols.len(), 1);
    assert_eq!(result.symbols[0].name, "WorldViewProj");
    assert_eq!(result.symbols[0].register_count, 4);

    let uniforms: Vec<(u32, &str)> = result
        .uniforms
        .iter()
        .map(|u| (u.index, u.name.as_str()))
        .collect();
    assert_eq!(uniforms, [(0, "c0"), (1, "c1"), (2, "c2"), (3, "c3")]);
    assert!(result.uniforms.iter().all(|u| u.array_count == 0));

    assert_eq!(
        result.attributes,
        vec![Attribute {
            usage: Usage::Position,
            index: 0,
            name: "v0".into(),
        }]
    );
    assert_eq!(
        result.outputs,
        vec![Attribute {
            usage: Usage::Position,
            index: 0,
            name: "oPos".into(),
        }]
    );
    assert_eq!(result.instruction_count, 4);
}

#[test]
fn corrupt_ctab_is_an_error() {
    let mut payload = CtabBuilder::new().build_payload();
    // Header size is the first token after the fourcc.
    payload[1] = 3;
    let mut words = vec![version_token(ShaderType::Vertex, 2, 0)];
    words.extend(comment_tokens(&payload));
    words.push(END);
    let result = decode("d3d", &words);
    assert_eq!(result.errors.len(), 1);
    assert!(
        result.errors[0].message.starts_with("Corrupt CTAB"),
        "{}",
        result.errors[0].message
    );
}

#[test]
fn preshader_is_attached_to_the_result() {
    let preshader = PreshaderBuilder::new()
        .literal(1.0)
        .instruction(0x1000, 1, &[(1, 0), (7, 5)])
        .build_payload();
    let mut words = vec![version_token(ShaderType::Vertex, 2, 0)];
    words.extend(comment_tokens(&preshader));
    words.push(END);

    let result = decode("d3d", &words);
    assert!(result.is_ok(), "{:?}", result.errors);
    let preshader = result.preshader.expect("preshader should be decoded");
    assert_eq!(preshader.literals, vec![1.0]);
    assert_eq!(preshader.instructions.len(), 1);
}

#[test]
fn relative_addressing_uses_the_ctab_array() {
    // vs_2_0
    //   dcl_position v0
    //   dcl_blendindices v1
    //   mova a0.x, v1.x
    //   mov r0, c4[a0.x]
    //   mov oPos, r0
    let ctab = CtabBuilder::new().symbol(
        "Bones",
        RegisterSet::Float4,
        4,
        8,
        TypeDesc::matrix_rows(4, 4, 2),
    );
    let mut words = vec![version_token(ShaderType::Vertex, 2, 0)];
    words.extend(comment_tokens(&ctab.build_payload()));
    words.extend([
        opcode_token(31, 2),
        dcl_token(0, 0),
        dst_token(INPUT, 0, 0xF),
        opcode_token(31, 2),
        dcl_token(2, 0),
        dst_token(INPUT, 1, 0xF),
        opcode_token(46, 2),
        dst_token(ADDR, 0, 0x1),
        src_token(INPUT, 1, 0x00, 0),
        opcode_token(1, 3),
        dst_token(TEMP, 0, 0xF),
        src_token(CONST, 4, 0xE4, 0) | 0x2000,
        src_token(ADDR, 0, 0x00, 0),
        opcode_token(1, 2),
        dst_token(RASTOUT, 0, 0xF),
        src_token(TEMP, 0, 0xE4, 0),
        END,
    ]);

    let result = decode("d3d", &words);
    assert!(result.is_ok(), "{:?}", result.errors);
    assert_eq!(
        result.uniforms,
        vec![Uniform {
            uniform_type: UniformType::Float,
            index: 4,
            array_count: 8,
            constant: false,
            name: "c4".into(),
        }]
    );
    let text = result.output_text();
    assert!(text.contains("mov r0, c4[a0.x]"), "{text}");

    let glsl = decode("glsl", &words);
    assert!(glsl.is_ok(), "{:?}", glsl.errors);
    let text = glsl.output_text();
    assert!(text.contains("#define ARRAYBASE_4 0"), "{text}");
    assert!(
        text.contains("vs_r0 = vs_uniforms_vec4[ARRAYBASE_4 + vs_a0.x + 0];"),
        "{text}"
    );
    assert!(text.contains("uniform vec4 vs_uniforms_vec4[8];"), "{text}");
    assert_eq!(glsl.uniforms[0].name, "vs_c4");
}

#[test]
fn swizzle_remap_rewrites_vertex_inputs() {
    // vs_2_0
    //   dcl_color v0
    //   mov oD0, v0
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(31, 2),
        dcl_token(10, 0),
        dst_token(INPUT, 0, 0xF),
        opcode_token(1, 2),
        dst_token(ATTROUT, 0, 0xF),
        src_token(INPUT, 0, 0xE4, 0),
        END,
    ];
    let zyxw = Swizzle(2 | (1 << 2) | (3 << 6));
    let options = ParseOptions {
        swizzles: vec![SwizzleRemap {
            usage: Usage::Color,
            index: 0,
            swizzle: zyxw,
        }],
        ..ParseOptions::default()
    };
    let result = parse("d3d", &to_bytes(&words), &options);
    assert!(result.is_ok(), "{:?}", result.errors);
    assert!(result.output_text().contains("mov oD0, v0.zyxw"));
    assert_eq!(result.swizzles, options.swizzles);
}

#[test]
fn ps_1_x_declares_textures_and_samplers_implicitly() {
    // ps_1_1
    //   tex t0
    //   mul r0, t0, v0
    let words = [
        version_token(ShaderType::Pixel, 1, 1),
        opcode_token(66, 0),
        dst_token(ADDR, 0, 0xF),
        opcode_token(5, 0),
        dst_token(TEMP, 0, 0xF),
        src_token(ADDR, 0, 0xE4, 0),
        src_token(INPUT, 0, 0xE4, 0),
        END,
    ];
    let result = decode("d3d", &words);
    assert!(result.is_ok(), "{:?}", result.errors);
    assert_eq!(result.samplers.len(), 1);
    assert_eq!(result.samplers[0].index, 0);
    assert_eq!(result.samplers[0].name, "s0");
    let attributes: Vec<(Usage, u32)> = result
        .attributes
        .iter()
        .map(|a| (a.usage, a.index))
        .collect();
    assert_eq!(attributes, [(Usage::Color, 0), (Usage::TexCoord, 0)]);
}

#[test]
fn packed_uniforms_are_listed_in_slot_order() {
    // vs_2_0
    //   dcl_position v0
    //   dcl_blendindices v1
    //   mova a0.x, v1.x
    //   mov r0, c4[a0.x]
    //   add oPos, r0, c0
    let ctab = CtabBuilder::new().symbol(
        "Bones",
        RegisterSet::Float4,
        4,
        8,
        TypeDesc::matrix_rows(4, 4, 2),
    );
    let mut words = vec![version_token(ShaderType::Vertex, 2, 0)];
    words.extend(comment_tokens(&ctab.build_payload()));
    words.extend([
        opcode_token(31, 2),
        dcl_token(0, 0),
        dst_token(INPUT, 0, 0xF),
        opcode_token(31, 2),
        dcl_token(2, 0),
        dst_token(INPUT, 1, 0xF),
        opcode_token(46, 2),
        dst_token(ADDR, 0, 0x1),
        src_token(INPUT, 1, 0x00, 0),
        opcode_token(1, 3),
        dst_token(TEMP, 0, 0xF),
        src_token(CONST, 4, 0xE4, 0) | 0x2000,
        src_token(ADDR, 0, 0x00, 0),
        opcode_token(2, 3),
        dst_token(RASTOUT, 0, 0xF),
        src_token(TEMP, 0, 0xE4, 0),
        src_token(CONST, 0, 0xE4, 0),
        END,
    ]);

    let glsl = decode("glsl", &words);
    assert!(glsl.is_ok(), "{:?}", glsl.errors);
    let layout: Vec<(u32, u32, &str)> = glsl
        .uniforms
        .iter()
        .map(|u| (u.index, u.array_count, u.name.as_str()))
        .collect();
    // The array takes slots 0..8, so c0 lands in slot 8.
    assert_eq!(layout, [(4, 8, "vs_c4"), (0, 0, "vs_c0")]);
    let text = glsl.output_text();
    assert!(text.contains("#define ARRAYBASE_4 0"), "{text}");
    assert!(text.contains("#define vs_c0 vs_uniforms_vec4[8]"), "{text}");
    assert!(text.contains("uniform vec4 vs_uniforms_vec4[9];"), "{text}");

    let d3d = decode("d3d", &words);
    let indices: Vec<u32> = d3d.uniforms.iter().map(|u| u.index).collect();
    assert_eq!(indices, [4, 0]);
}

#[test]
fn texkill_reads_its_operand() {
    // ps_2_0
    //   texkill r0
    //   mov oC0, r0
    let words = [
        version_token(ShaderType::Pixel, 2, 0),
        opcode_token(65, 1),
        dst_token(TEMP, 0, 0xF),
        opcode_token(1, 2),
        dst_token(COLOROUT, 0, 0xF),
        src_token(TEMP, 0, 0xE4, 0),
        END,
    ];
    let result = decode("d3d", &words);
    assert_eq!(
        messages(&result),
        [
            "Temp register r0 used uninitialized",
            "Temp register r0 used uninitialized"
        ]
    );
    assert_eq!(result.errors[0].position, Some(4));
    assert_eq!(result.errors[1].position, Some(12));

    // mov r0, c0 / texkill r0 / mov oC0, r0
    let words = [
        version_token(ShaderType::Pixel, 2, 0),
        opcode_token(1, 2),
        dst_token(TEMP, 0, 0xF),
        src_token(CONST, 0, 0xE4, 0),
        opcode_token(65, 1),
        dst_token(TEMP, 0, 0xF),
        opcode_token(1, 2),
        dst_token(COLOROUT, 0, 0xF),
        src_token(TEMP, 0, 0xE4, 0),
        END,
    ];
    for kind in ProfileKind::ALL {
        let result = decode(kind.name(), &words);
        assert!(result.is_ok(), "{}: {:?}", kind.name(), result.errors);
    }
}

#[test]
fn unknown_register_type_is_reported_once() {
    // mov r0, <type 20>0 / mov oPos, r0
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(1, 2),
        dst_token(TEMP, 0, 0xF),
        src_token(20, 0, 0xE4, 0),
        opcode_token(1, 2),
        dst_token(RASTOUT, 0, 0xF),
        src_token(TEMP, 0, 0xE4, 0),
        END,
    ];
    let result = decode("d3d", &words);
    assert_eq!(messages(&result), ["Unknown register type 20"]);

    // An unknown destination type doesn't count as a write of r0.
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(1, 2),
        dst_token(20, 0, 0xF),
        src_token(CONST, 0, 0xE4, 0),
        opcode_token(1, 2),
        dst_token(RASTOUT, 0, 0xF),
        src_token(TEMP, 0, 0xE4, 0),
        END,
    ];
    let result = decode("d3d", &words);
    assert_eq!(
        messages(&result),
        ["Unknown register type 20", "Temp register r0 used uninitialized"]
    );
}

#[test]
fn nested_ret_returns_early() {
    // vs_2_0
    //   call l0
    //   ret
    //   label l0
    //   if b0
    //     ret
    //   endif
    //   mov r0, c0
    //   ret
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(25, 1),
        src_token(LABEL, 0, 0xE4, 0),
        opcode_token(28, 0),
        opcode_token(30, 1),
        src_token(LABEL, 0, 0xE4, 0),
        opcode_token(40, 1),
        src_token(CONSTBOOL, 0, 0xE4, 0),
        opcode_token(28, 0),
        opcode_token(43, 0),
        opcode_token(1, 2),
        dst_token(TEMP, 0, 0xF),
        src_token(CONST, 0, 0xE4, 0),
        opcode_token(28, 0),
        END,
    ];
    for kind in ProfileKind::ALL {
        let result = decode(kind.name(), &words);
        assert!(result.is_ok(), "{}: {:?}", kind.name(), result.errors);
    }
    // The main body's RET and the nested one both return; the last RET closes vs_l0.
    let text = decode("glsl", &words).output_text().into_owned();
    assert_eq!(text.matches("return;").count(), 2, "{text}");

    // An early return in the main body leaves it open.
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(40, 1),
        src_token(CONSTBOOL, 0, 0xE4, 0),
        opcode_token(28, 0),
        opcode_token(43, 0),
        opcode_token(1, 2),
        dst_token(RASTOUT, 0, 0xF),
        src_token(CONST, 0, 0xE4, 0),
        END,
    ];
    let result = decode("d3d", &words);
    assert!(result.is_ok(), "{:?}", result.errors);
}

fn ps_1_1(body: &[u32]) -> Vec<u32> {
    let mut words = vec![version_token(ShaderType::Pixel, 1, 1)];
    words.extend_from_slice(body);
    words.push(END);
    words
}

#[test]
fn texm3x2pad_must_be_followed_by_its_partner() {
    // tex t0 / texm3x2pad t1, t0 / mov r0, t1
    let words = ps_1_1(&[
        opcode_token(66, 0),
        dst_token(TEXTURE, 0, 0xF),
        opcode_token(71, 0),
        dst_token(TEXTURE, 1, 0xF),
        src_token(TEXTURE, 0, 0xE4, 0),
        opcode_token(1, 0),
        dst_token(TEMP, 0, 0xF),
        src_token(TEXTURE, 1, 0xE4, 0),
    ]);
    let result = decode("d3d", &words);
    assert_eq!(
        messages(&result),
        ["TEXM3X2PAD must be followed by TEXM3X2TEX or TEXM3X2DEPTH"]
    );

    // tex t0 / texm3x2pad t1, t0 / texm3x2tex t2, t0 / mov r0, t2
    let words = ps_1_1(&[
        opcode_token(66, 0),
        dst_token(TEXTURE, 0, 0xF),
        opcode_token(71, 0),
        dst_token(TEXTURE, 1, 0xF),
        src_token(TEXTURE, 0, 0xE4, 0),
        opcode_token(72, 0),
        dst_token(TEXTURE, 2, 0xF),
        src_token(TEXTURE, 0, 0xE4, 0),
        opcode_token(1, 0),
        dst_token(TEMP, 0, 0xF),
        src_token(TEXTURE, 2, 0xE4, 0),
    ]);
    let result = decode("d3d", &words);
    assert!(result.is_ok(), "{:?}", result.errors);
}

#[test]
fn texm3x3pad_must_come_in_pairs() {
    // tex t0 / texm3x3pad t1, t0 / mov r0, t1
    let words = ps_1_1(&[
        opcode_token(66, 0),
        dst_token(TEXTURE, 0, 0xF),
        opcode_token(73, 0),
        dst_token(TEXTURE, 1, 0xF),
        src_token(TEXTURE, 0, 0xE4, 0),
        opcode_token(1, 0),
        dst_token(TEMP, 0, 0xF),
        src_token(TEXTURE, 1, 0xE4, 0),
    ]);
    let result = decode("d3d", &words);
    assert_eq!(
        messages(&result),
        ["TEXM3X3PAD must be followed by a second TEXM3X3PAD"]
    );
}

/// vs_2_0 `(pred) mov r0, c0`.
fn predicated_mov(predicate: u32) -> Vec<u32> {
    vec![
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(1, 3) | PREDICATED,
        dst_token(TEMP, 0, 0xF),
        predicate,
        src_token(CONST, 0, 0xE4, 0),
        END,
    ]
}

#[test]
fn predicate_token_rules() {
    let cases = [
        (
            src_token(CONST, 1, 0x00, 0),
            "Predicate token must be a predicate register",
        ),
        (
            src_token(PREDICATE, 0, 0x00, 1),
            "Predicate register may only use the NOT modifier",
        ),
        (
            src_token(PREDICATE, 0, 0xE1, 0),
            "Predicate swizzle must be replicate or identity",
        ),
    ];
    for (predicate, expected) in cases {
        let result = decode("d3d", &predicated_mov(predicate));
        assert_eq!(messages(&result), [expected]);
    }

    // (!p0.x) and (p0) are both fine.
    for predicate in [
        src_token(PREDICATE, 0, 0x00, 13),
        src_token(PREDICATE, 0, 0xE4, 0),
    ] {
        let result = decode("d3d", &predicated_mov(predicate));
        assert!(result.is_ok(), "{:?}", result.errors);
    }
}

/// vs_2_0 `setp p0, c0, c1` with the given comparison and destination.
fn setp(comparison: u32, dest: u32) -> Vec<u32> {
    vec![
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(94, 3) | (comparison << 16),
        dest,
        src_token(CONST, 0, 0xE4, 0),
        src_token(CONST, 1, 0xE4, 0),
        END,
    ]
}

#[test]
fn setp_needs_a_predicate_and_a_comparison() {
    let result = decode("d3d", &setp(1, dst_token(PREDICATE, 0, 0xF)));
    assert!(result.is_ok(), "{:?}", result.errors);
    assert!(result.output_text().contains("setp_gt p0, c0, c1"));

    let result = decode("d3d", &setp(1, dst_token(TEMP, 0, 0xF)));
    assert_eq!(
        messages(&result),
        ["SETP destination must be a predicate register"]
    );

    let result = decode("d3d", &setp(0, dst_token(PREDICATE, 0, 0xF)));
    assert_eq!(messages(&result), ["SETP has an unknown comparison (0)"]);
}

#[test]
fn mova_writes_the_address_register() {
    // mova r0.x, c0.x
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(46, 2),
        dst_token(TEMP, 0, 0x1),
        src_token(CONST, 0, 0x00, 0),
        END,
    ];
    let result = decode("d3d", &words);
    assert_eq!(
        messages(&result),
        ["MOVA destination must be the address register"]
    );
}

/// vs_2_0 `sincos r0<mask>, c0.x, <helper>, c2`.
fn sincos(mask: u8, helper: u32) -> Vec<u32> {
    vec![
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(37, 4),
        dst_token(TEMP, 0, mask),
        src_token(CONST, 0, 0x00, 0),
        helper,
        src_token(CONST, 2, 0xE4, 0),
        END,
    ]
}

#[test]
fn sincos_mask_and_helpers() {
    let result = decode("d3d", &sincos(0x3, src_token(CONST, 1, 0xE4, 0)));
    assert!(result.is_ok(), "{:?}", result.errors);

    let result = decode("d3d", &sincos(0x7, src_token(CONST, 1, 0xE4, 0)));
    assert_eq!(
        messages(&result),
        ["SINCOS write mask must be .x, .y or .xy"]
    );

    let result = decode("d3d", &sincos(0x1, src_token(CONSTINT, 0, 0xE4, 0)));
    assert_eq!(
        messages(&result),
        ["SINCOS helper operands must be constant registers"]
    );
}

const DCL_2D: u32 = 0x8000_0000 | (2 << 27);

#[test]
fn dcl_rules() {
    // ps_1_4 has no DCL.
    let words = [
        version_token(ShaderType::Pixel, 1, 4),
        opcode_token(31, 0),
        dcl_token(0, 0),
        dst_token(INPUT, 0, 0xF),
        END,
    ];
    assert_eq!(
        messages(&decode("d3d", &words)),
        ["DCL not allowed in ps_1_x"]
    );

    // dcl_2d s0 in vs_2_0
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(31, 2),
        DCL_2D,
        dst_token(SAMPLER, 0, 0xF),
        END,
    ];
    assert_eq!(
        messages(&decode("d3d", &words)),
        ["Vertex shader samplers require vs_3_0"]
    );

    // dcl_2d s0 twice in ps_2_0
    let words = [
        version_token(ShaderType::Pixel, 2, 0),
        opcode_token(31, 2),
        DCL_2D,
        dst_token(SAMPLER, 0, 0xF),
        opcode_token(31, 2),
        DCL_2D,
        dst_token(SAMPLER, 0, 0xF),
        END,
    ];
    assert_eq!(messages(&decode("d3d", &words)), ["Duplicate DCL of s0"]);

    // dcl_position v0 twice in vs_2_0
    let words = [
        version_token(ShaderType::Vertex, 2, 0),
        opcode_token(31, 2),
        dcl_token(0, 0),
        dst_token(INPUT, 0, 0xF),
        opcode_token(31, 2),
        dcl_token(0, 0),
        dst_token(INPUT, 0, 0xF),
        END,
    ];
    assert_eq!(
        messages(&decode("d3d", &words)),
        ["Duplicate DCL of Input 0"]
    );
}
