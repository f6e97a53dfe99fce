use std::env;
use std::fs;
use std::io::{self, Write as _};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use dxsm::{ParseOptions, ParseResult, ProfileKind, Swizzle, SwizzleRemap, Usage};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "\
dxsm_dump: decode a D3D9 shader bytecode file and print the translation

USAGE:
    cargo run -p dxsm --bin dxsm_dump -- <path> [--profile NAME] [--mainfn NAME]
        [--swizzle USAGE[N]=xyzw]... [--no-output]

FLAGS:
    --profile NAME    d3d, bytecode, glsl or glsl120 (default d3d)
    --mainfn NAME     Entry point name for GLSL output (default main)
    --swizzle SPEC    Remap a vertex input, e.g. color0=zyxw (repeatable)
    --no-output       Only print the reflection data and errors

Set RUST_LOG=dxsm=debug to trace comment and constant table handling.
"
}

fn main() {
    if let Err(err) = real_main() {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn real_main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut path: Option<PathBuf> = None;
    let mut profile = ProfileKind::D3d;
    let mut options = ParseOptions::default();
    let mut print_output = true;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print!("{}", usage());
                return Ok(());
            }
            "--profile" => {
                let Some(v) = args.next() else {
                    bail!("--profile requires a value");
                };
                profile = v.parse()?;
            }
            "--mainfn" => {
                let Some(v) = args.next() else {
                    bail!("--mainfn requires a value");
                };
                options.mainfn = Some(v);
            }
            "--swizzle" => {
                let Some(v) = args.next() else {
                    bail!("--swizzle requires a value");
                };
                options.swizzles.push(parse_swizzle(&v)?);
            }
            "--no-output" => print_output = false,
            _ if arg.starts_with('-') => {
                bail!("unknown option {arg:?}\n\n{}", usage());
            }
            _ => {
                if path.is_some() {
                    bail!("unexpected positional argument {arg:?}\n\n{}", usage());
                }
                path = Some(PathBuf::from(arg));
            }
        }
    }

    let Some(path) = path else {
        bail!("missing shader bytecode path\n\n{}", usage());
    };

    let bytes = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let result = dxsm::parse_with(profile, &bytes, &options);

    if print_output && !result.output.is_empty() {
        let mut stdout = io::stdout().lock();
        match profile {
            ProfileKind::Bytecode => {
                for (idx, word) in result.output.chunks_exact(4).enumerate() {
                    let v = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                    writeln!(stdout, "  [{idx:04}] 0x{v:08x}")?;
                }
            }
            _ => stdout.write_all(&result.output)?,
        }
        writeln!(stdout)?;
    }
    print_reflection(&result);

    if !result.is_ok() {
        bail!("{} error(s) while parsing {}", result.errors.len(), path.display());
    }
    Ok(())
}

/// Parses `usage[index]=letters`, e.g. `texcoord1=yxzw`.
fn parse_swizzle(value: &str) -> anyhow::Result<SwizzleRemap> {
    let Some((target, letters)) = value.split_once('=') else {
        bail!("invalid --swizzle value {value:?}: expected USAGE[N]=xyzw");
    };
    let digits = target.len() - target.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (name, index) = target.split_at(target.len() - digits);
    let index = if index.is_empty() {
        0
    } else {
        index
            .parse::<u32>()
            .with_context(|| format!("invalid usage index in {value:?}"))?
    };
    let usage = (0..14)
        .filter_map(Usage::from_raw)
        .find(|u| u.name() == name)
        .with_context(|| format!("unknown usage {name:?}"))?;

    if letters.len() != 4 {
        bail!("swizzle {letters:?} must have four components");
    }
    let mut swizzle = 0u8;
    for (i, c) in letters.chars().enumerate() {
        let component = match c {
            'x' | 'r' => 0,
            'y' | 'g' => 1,
            'z' | 'b' => 2,
            'w' | 'a' => 3,
            _ => bail!("invalid swizzle component {c:?} in {letters:?}"),
        };
        swizzle |= component << (i * 2);
    }

    Ok(SwizzleRemap {
        usage,
        index,
        swizzle: Swizzle(swizzle),
    })
}

fn print_reflection(result: &ParseResult) {
    let shader_type = result.shader_type.map_or("unknown", |t| t.prefix());
    println!(
        "{shader_type}_{}_{} instructions={}",
        result.major_ver, result.minor_ver, result.instruction_count
    );

    println!("uniforms: {}", result.uniforms.len());
    for u in &result.uniforms {
        let constant = if u.constant { " constant" } else { "" };
        println!(
            "  {:?} #{} array={}{constant} {:?}",
            u.uniform_type, u.index, u.array_count, u.name
        );
    }
    println!("attributes: {}", result.attributes.len());
    for a in &result.attributes {
        println!("  {}{} {:?}", a.usage.name(), a.index, a.name);
    }
    println!("outputs: {}", result.outputs.len());
    for a in &result.outputs {
        println!("  {}{} {:?}", a.usage.name(), a.index, a.name);
    }
    println!("samplers: {}", result.samplers.len());
    for s in &result.samplers {
        let texbem = if s.texbem { " texbem" } else { "" };
        println!("  {} #{}{texbem} {:?}", s.texture_type.name(), s.index, s.name);
    }
    println!("constants: {}", result.constants.len());
    for c in &result.constants {
        println!("  #{} {:?}", c.index, c.value);
    }
    println!("symbols: {}", result.symbols.len());
    for s in &result.symbols {
        println!(
            "  {:?} {:?} {}..+{}",
            s.name, s.register_set, s.register_index, s.register_count
        );
    }
    if let Some(preshader) = &result.preshader {
        println!(
            "preshader: {} instructions, {} literals, {} temps",
            preshader.instructions.len(),
            preshader.literals.len(),
            preshader.temp_count
        );
        for inst in &preshader.instructions {
            let operands: Vec<String> = inst
                .operands
                .iter()
                .map(|o| format!("{:?}[{}]", o.kind, o.index))
                .collect();
            println!(
                "  {} x{} {}",
                inst.opcode.name(),
                inst.element_count,
                operands.join(", ")
            );
        }
    }
    if !result.errors.is_empty() {
        println!("errors: {}", result.errors.len());
        for e in &result.errors {
            println!("  {e}");
        }
    }
}
