#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
#[cfg(not(target_arch = "wasm32"))]
use dxsm::{ParseOptions, ProfileKind};

#[cfg(not(target_arch = "wasm32"))]
fn reg_token(regtype: u32, index: u32) -> u32 {
    0x8000_0000 | ((regtype & 0x7) << 28) | ((regtype & 0x18) << 8) | (index & 0x7FF)
}

#[cfg(not(target_arch = "wasm32"))]
fn dst(regtype: u32, index: u32) -> u32 {
    reg_token(regtype, index) | (0xF << 16)
}

#[cfg(not(target_arch = "wasm32"))]
fn src(regtype: u32, index: u32) -> u32 {
    reg_token(regtype, index) | (0xE4 << 16)
}

#[cfg(not(target_arch = "wasm32"))]
fn op(opcode: u32, operands: u32) -> u32 {
    opcode | (operands << 24)
}

/// vs_2_0 transform: dcl_position v0, a long run of `m4x4`/`mad`/`add` and a write to oPos.
#[cfg(not(target_arch = "wasm32"))]
fn vertex_shader(body_repeats: usize) -> Vec<u8> {
    let mut tokens = vec![
        0xFFFE_0200,
        // dcl_position v0
        op(31, 2),
        0x8000_0000,
        dst(1, 0),
        // m4x4 r0, v0, c0
        op(20, 3),
        dst(0, 0),
        src(1, 0),
        src(2, 0),
    ];
    for i in 0..body_repeats {
        let c = 4 + (i as u32 % 64);
        // mad r0, r0, c#, v0
        tokens.extend([op(4, 4), dst(0, 0), src(0, 0), src(2, c), src(1, 0)]);
        // add r0, r0, c#
        tokens.extend([op(2, 3), dst(0, 0), src(0, 0), src(2, c)]);
    }
    // mov oPos, r0
    tokens.extend([op(1, 2), dst(4, 0), src(0, 0), 0x0000_FFFF]);
    tokens.iter().flat_map(|t| t.to_le_bytes()).collect()
}

#[cfg(not(target_arch = "wasm32"))]
fn bench_profiles(c: &mut Criterion) {
    let options = ParseOptions::default();
    let mut group = c.benchmark_group("dxsm_parse");
    for repeats in [16usize, 256] {
        let bytes = vertex_shader(repeats);
        for kind in ProfileKind::ALL {
            group.bench_with_input(
                BenchmarkId::new(kind.name(), repeats),
                &bytes,
                |b, bytes| {
                    b.iter(|| {
                        let result = dxsm::parse_with(kind, black_box(bytes), &options);
                        black_box(result.output.len());
                    })
                },
            );
        }
    }
    group.finish();
}

#[cfg(not(target_arch = "wasm32"))]
criterion_group!(benches, bench_profiles);
#[cfg(not(target_arch = "wasm32"))]
criterion_main!(benches);
