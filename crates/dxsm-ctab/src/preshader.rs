use tracing::debug;

use crate::ctab::{parse_ctab, RegisterSet, Symbol};
use crate::{tokens_to_bytes, CtabError, FourCC};

const PRESHADER_VERSION_HIGH: u32 = 0x4658;
const COMMENT_OPCODE: u32 = 0xFFFE;
const END_TOKEN: u32 = 0x0000_FFFF;

const CLIT_ID: FourCC = FourCC(*b"CLIT");
const FXLC_ID: FourCC = FourCC(*b"FXLC");
const PRSI_ID: FourCC = FourCC(*b"PRSI");

/// Preshader arithmetic opcode.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreshaderOpcode {
    Mov,
    Neg,
    Rcp,
    Frc,
    Exp,
    Log,
    Rsq,
    Sin,
    Cos,
    Floor,
    Ceil,
    Min,
    Max,
    Lt,
    Ge,
    Add,
    Mul,
    Atan2,
    Div,
    Cmp,
    Movc,
    Dot,
    Noise,
    MinScalar,
    MaxScalar,
    LtScalar,
    GeScalar,
    AddScalar,
    MulScalar,
    Atan2Scalar,
    DivScalar,
    DotScalar,
    NoiseScalar,
}

impl PreshaderOpcode {
    fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0x1000 => Self::Mov,
            0x1010 => Self::Neg,
            0x1030 => Self::Rcp,
            0x1040 => Self::Frc,
            0x1050 => Self::Exp,
            0x1060 => Self::Log,
            0x1070 => Self::Rsq,
            0x1080 => Self::Sin,
            0x1090 => Self::Cos,
            0x10A0 => Self::Floor,
            0x10B0 => Self::Ceil,
            0x2000 => Self::Min,
            0x2010 => Self::Max,
            0x2020 => Self::Lt,
            0x2030 => Self::Ge,
            0x2040 => Self::Add,
            0x2050 => Self::Mul,
            0x2060 => Self::Atan2,
            0x2080 => Self::Div,
            0x3000 => Self::Cmp,
            0x3010 => Self::Movc,
            0x5000 => Self::Dot,
            0x5020 => Self::Noise,
            0xA000 => Self::MinScalar,
            0xA010 => Self::MaxScalar,
            0xA020 => Self::LtScalar,
            0xA030 => Self::GeScalar,
            0xA040 => Self::AddScalar,
            0xA050 => Self::MulScalar,
            0xA060 => Self::Atan2Scalar,
            0xA080 => Self::DivScalar,
            0xD000 => Self::DotScalar,
            0xD020 => Self::NoiseScalar,
            _ => return None,
        })
    }

    /// Lower-case mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            Self::Mov => "mov",
            Self::Neg => "neg",
            Self::Rcp => "rcp",
            Self::Frc => "frc",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Rsq => "rsq",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Min | Self::MinScalar => "min",
            Self::Max | Self::MaxScalar => "max",
            Self::Lt | Self::LtScalar => "lt",
            Self::Ge | Self::GeScalar => "ge",
            Self::Add | Self::AddScalar => "add",
            Self::Mul | Self::MulScalar => "mul",
            Self::Atan2 | Self::Atan2Scalar => "atan2",
            Self::Div | Self::DivScalar => "div",
            Self::Cmp => "cmp",
            Self::Movc => "movc",
            Self::Dot | Self::DotScalar => "dot",
            Self::Noise | Self::NoiseScalar => "noise",
        }
    }

    /// Returns `true` for the variants whose first source is a single replicated component.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            Self::MinScalar
                | Self::MaxScalar
                | Self::LtScalar
                | Self::GeScalar
                | Self::AddScalar
                | Self::MulScalar
                | Self::Atan2Scalar
                | Self::DivScalar
                | Self::DotScalar
                | Self::NoiseScalar
        )
    }

    fn writes_scalar(self) -> bool {
        matches!(self, Self::Dot | Self::DotScalar)
    }
}

/// Where a preshader operand reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreshaderOperandKind {
    /// The literal pool.
    Literal,
    /// An input constant described by the preshader's constant table.
    Input,
    /// A shader constant register (resolved through the output map).
    Output,
    /// A preshader scratch register.
    Temp,
}

/// A single operand. `index` is in component units (four per register).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreshaderOperand {
    /// Operand file.
    pub kind: PreshaderOperandKind,
    /// Component index. For outputs this is already remapped onto the shader's constant file.
    pub index: u32,
    /// Index into [`Preshader::symbols`] for inputs.
    pub symbol: Option<usize>,
}

/// A single preshader instruction; the destination is the last operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreshaderInstruction {
    /// Operation.
    pub opcode: PreshaderOpcode,
    /// Components processed per operand.
    pub element_count: u32,
    /// Sources followed by the destination.
    pub operands: Vec<PreshaderOperand>,
}

/// A decoded preshader program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Preshader {
    /// Literal pool.
    pub literals: Vec<f64>,
    /// Size of the scratch file in components, rounded up to whole registers.
    pub temp_count: u32,
    /// Input symbols from the embedded constant table.
    pub symbols: Vec<Symbol>,
    /// Instructions in execution order.
    pub instructions: Vec<PreshaderInstruction>,
}

/// Parses a preshader token stream (the payload following the `PRES` fourcc).
pub fn parse_preshader(tokens: &[u32]) -> Result<Preshader, CtabError> {
    let version = *tokens
        .first()
        .ok_or_else(|| CtabError::malformed_header("empty preshader"))?;
    if version >> 16 != PRESHADER_VERSION_HIGH {
        return Err(CtabError::malformed_header(format!(
            "preshader version token 0x{version:08x} is not an FX token"
        )));
    }

    let mut ctab: Option<&[u32]> = None;
    let mut clit: Option<&[u32]> = None;
    let mut fxlc: Option<&[u32]> = None;
    let mut prsi: Option<&[u32]> = None;

    let mut pos = 1usize;
    while pos < tokens.len() {
        let token = tokens[pos];
        if token == END_TOKEN {
            break;
        }
        if token & 0xFFFF != COMMENT_OPCODE {
            return Err(CtabError::corrupt(format!(
                "unexpected token 0x{token:08x} at preshader token {pos}"
            )));
        }
        let len = ((token >> 16) & 0x7FFF) as usize;
        let block = tokens.get(pos + 1..pos + 1 + len).ok_or_else(|| {
            CtabError::out_of_bounds(format!(
                "preshader block of {len} tokens at {pos} runs past the end"
            ))
        })?;
        pos += 1 + len;

        let Some((&id, payload)) = block.split_first() else {
            continue;
        };
        match FourCC::from_token(id) {
            crate::CTAB_ID => ctab = Some(payload),
            CLIT_ID => clit = Some(payload),
            FXLC_ID => fxlc = Some(payload),
            PRSI_ID => prsi = Some(payload),
            other => debug!(id = %other, "skipping unknown preshader block"),
        }
    }

    let symbols = match ctab {
        Some(payload) => parse_ctab(&tokens_to_bytes(payload))?.symbols,
        None => Vec::new(),
    };
    let literals = match clit {
        Some(payload) => parse_literals(payload)?,
        None => Vec::new(),
    };
    let output_map = match prsi {
        Some(payload) => parse_output_map(payload)?,
        None => Vec::new(),
    };
    let code = fxlc.ok_or_else(|| CtabError::corrupt("preshader has no FXLC block"))?;

    let mut preshader = Preshader {
        literals,
        temp_count: 0,
        symbols,
        instructions: Vec::new(),
    };
    let mut temp_components = 0u32;
    parse_instructions(code, &mut preshader, &output_map, &mut temp_components)?;
    preshader.temp_count = temp_components.div_ceil(4) * 4;

    debug!(
        instructions = preshader.instructions.len(),
        literals = preshader.literals.len(),
        temps = preshader.temp_count,
        "parsed preshader"
    );
    Ok(preshader)
}

fn parse_literals(payload: &[u32]) -> Result<Vec<f64>, CtabError> {
    let (&count, rest) = payload
        .split_first()
        .ok_or_else(|| CtabError::malformed_header("CLIT block is empty"))?;
    let count = count as usize;
    if count.saturating_mul(2) > rest.len() {
        return Err(CtabError::out_of_bounds(format!(
            "CLIT declares {count} literals but holds {} tokens",
            rest.len()
        )));
    }
    Ok(rest
        .chunks_exact(2)
        .take(count)
        .map(|pair| f64::from_bits(u64::from(pair[0]) | (u64::from(pair[1]) << 32)))
        .collect())
}

fn parse_output_map(payload: &[u32]) -> Result<Vec<(u32, u32)>, CtabError> {
    let (&count, rest) = payload
        .split_first()
        .ok_or_else(|| CtabError::malformed_header("PRSI block is empty"))?;
    let count = count as usize;
    if count.saturating_mul(2) > rest.len() {
        return Err(CtabError::out_of_bounds(format!(
            "PRSI declares {count} mappings but holds {} tokens",
            rest.len()
        )));
    }
    Ok(rest
        .chunks_exact(2)
        .take(count)
        .map(|pair| (pair[0], pair[1]))
        .collect())
}

fn parse_instructions(
    code: &[u32],
    preshader: &mut Preshader,
    output_map: &[(u32, u32)],
    temp_components: &mut u32,
) -> Result<(), CtabError> {
    let (&count, mut rest) = code
        .split_first()
        .ok_or_else(|| CtabError::malformed_header("FXLC block is empty"))?;

    for i in 0..count {
        let header = take(&mut rest, 2, "instruction header")?;
        let raw_opcode = header[0] >> 16;
        let opcode = PreshaderOpcode::from_raw(raw_opcode).ok_or_else(|| {
            CtabError::corrupt(format!(
                "instruction {i} has unknown preshader opcode 0x{raw_opcode:04x}"
            ))
        })?;
        let element_count = header[0] & 0xFF;
        let operand_count = (header[1] as usize).saturating_add(1);

        let mut operands = Vec::with_capacity(operand_count.min(8));
        for j in 0..operand_count {
            let raw = take(&mut rest, 3, "operand")?;
            if raw[0] != 0 {
                return Err(CtabError::corrupt(format!(
                    "instruction {i} operand {j} uses unsupported array indexing"
                )));
            }
            let is_dest = j + 1 == operand_count;
            let width = if is_dest {
                if opcode.writes_scalar() {
                    1
                } else {
                    element_count
                }
            } else if j == 0 && opcode.is_scalar() {
                1
            } else {
                element_count
            };
            let operand = resolve_operand(preshader, output_map, raw[1], raw[2], width)
                .map_err(|e| {
                    CtabError::corrupt(format!("instruction {i} ({}): {}", opcode.name(), e.context()))
                })?;
            if operand.kind == PreshaderOperandKind::Temp {
                *temp_components = (*temp_components).max(operand.index.saturating_add(width));
            }
            operands.push(operand);
        }

        preshader.instructions.push(PreshaderInstruction {
            opcode,
            element_count,
            operands,
        });
    }
    Ok(())
}

fn take<'a>(rest: &mut &'a [u32], n: usize, what: &str) -> Result<&'a [u32], CtabError> {
    if rest.len() < n {
        return Err(CtabError::out_of_bounds(format!(
            "FXLC ran out of tokens reading {what}"
        )));
    }
    let (head, tail) = rest.split_at(n);
    *rest = tail;
    Ok(head)
}

fn resolve_operand(
    preshader: &Preshader,
    output_map: &[(u32, u32)],
    kind: u32,
    index: u32,
    width: u32,
) -> Result<PreshaderOperand, CtabError> {
    match kind {
        1 => {
            let end = u64::from(index) + u64::from(width);
            if end > preshader.literals.len() as u64 {
                return Err(CtabError::out_of_bounds(format!(
                    "literal {index} (+{width}) outside pool of {}",
                    preshader.literals.len()
                )));
            }
            Ok(PreshaderOperand {
                kind: PreshaderOperandKind::Literal,
                index,
                symbol: None,
            })
        }
        2 => {
            let register = index / 4;
            let symbol = preshader
                .symbols
                .iter()
                .position(|s| s.register_set == RegisterSet::Float4 && s.contains_register(register))
                .or_else(|| {
                    preshader
                        .symbols
                        .iter()
                        .position(|s| s.contains_register(register))
                })
                .ok_or_else(|| {
                    CtabError::corrupt(format!("input register {register} has no symbol"))
                })?;
            Ok(PreshaderOperand {
                kind: PreshaderOperandKind::Input,
                index,
                symbol: Some(symbol),
            })
        }
        4 => {
            let register = index / 4;
            let &(_, target) = output_map
                .iter()
                .find(|&&(from, _)| from == register)
                .ok_or_else(|| {
                    CtabError::corrupt(format!("output register {register} is not in the PRSI map"))
                })?;
            Ok(PreshaderOperand {
                kind: PreshaderOperandKind::Output,
                index: target.saturating_mul(4).saturating_add(index % 4),
                symbol: None,
            })
        }
        7 => Ok(PreshaderOperand {
            kind: PreshaderOperandKind::Temp,
            index,
            symbol: None,
        }),
        other => Err(CtabError::corrupt(format!("unknown operand kind {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_utils::{CtabBuilder, PreshaderBuilder, TypeDesc};

    fn inputs() -> CtabBuilder {
        CtabBuilder::new()
            .symbol("Scale", RegisterSet::Float4, 0, 1, TypeDesc::vector(4))
            .symbol("Offset", RegisterSet::Float4, 1, 1, TypeDesc::vector(4))
    }

    #[test]
    fn resolves_inputs_outputs_and_literals() {
        // temp0.xyzw = Scale * Offset; c7 = temp0 + 2.0
        let tokens = PreshaderBuilder::new()
            .ctab(&inputs())
            .literal(2.0)
            .output(0, 7)
            .instruction(0x2050, 4, &[(2, 0), (2, 4), (7, 0)])
            .instruction(0xA040, 4, &[(1, 0), (7, 0), (4, 0)])
            .build();
        let pre = parse_preshader(&tokens).unwrap();

        assert_eq!(pre.literals, vec![2.0]);
        assert_eq!(pre.symbols.len(), 2);
        assert_eq!(pre.instructions.len(), 2);
        assert_eq!(pre.temp_count, 4);

        let mul = &pre.instructions[0];
        assert_eq!(mul.opcode, PreshaderOpcode::Mul);
        assert_eq!(mul.operands[0].symbol, Some(0));
        assert_eq!(mul.operands[1].symbol, Some(1));

        let add = &pre.instructions[1];
        assert_eq!(add.opcode, PreshaderOpcode::AddScalar);
        assert_eq!(add.operands[2].kind, PreshaderOperandKind::Output);
        assert_eq!(add.operands[2].index, 28);
    }

    #[test]
    fn temp_count_rounds_up_to_whole_registers() {
        let tokens = PreshaderBuilder::new()
            .literal(1.0)
            .instruction(0x1000, 1, &[(1, 0), (7, 5)])
            .build();
        let pre = parse_preshader(&tokens).unwrap();
        assert_eq!(pre.temp_count, 8);
    }

    #[test]
    fn unknown_input_is_fatal() {
        let tokens = PreshaderBuilder::new()
            .ctab(&inputs())
            .instruction(0x1000, 4, &[(2, 40), (7, 0)])
            .build();
        let err = parse_preshader(&tokens).unwrap_err();
        assert!(err.context().contains("input register 10"), "{err}");
    }

    #[test]
    fn unmapped_output_is_fatal() {
        let tokens = PreshaderBuilder::new()
            .literal(1.0)
            .instruction(0x1000, 1, &[(1, 0), (4, 8)])
            .build();
        let err = parse_preshader(&tokens).unwrap_err();
        assert!(err.context().contains("PRSI"), "{err}");
    }

    #[test]
    fn literal_out_of_pool_is_fatal() {
        let tokens = PreshaderBuilder::new()
            .literal(1.0)
            .instruction(0x1000, 4, &[(1, 0), (7, 0)])
            .build();
        assert!(parse_preshader(&tokens).is_err());
    }

    #[test]
    fn rejects_non_fx_version() {
        assert!(matches!(
            parse_preshader(&[0xFFFE_0300, 0x0000_FFFF]),
            Err(CtabError::MalformedHeader(_))
        ));
    }

    #[test]
    fn truncated_block_is_out_of_bounds() {
        let tokens = [0x4658_0201, 0xFFFE | (10 << 16), FXLC_ID.to_token()];
        assert!(matches!(
            parse_preshader(&tokens),
            Err(CtabError::OutOfBounds(_))
        ));
    }
}
