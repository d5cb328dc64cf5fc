//! # 二进制数值编解码（Binary Codec）
//!
//! ## 核心意图（Why）
//! - gRPC 以 `-bin` 后缀标记二进制元数据，值本身只是字节串；界面需要按用户声明的数值格式
//!   （宽度 + 字节序）把它显示为数字，或把输入的数字写回字节。
//!
//! ## 行为契约（What）
//! - [`encode`]：数值 → 恰好 `width` 字节；越界整数、带小数或非有限的浮点写入整数格式均返回
//!   [`CodecError::OutOfRange`]；
//! - [`decode`]：字节 → 数值；未声明格式时退化为 `"[Buffer ... N bytes]"` 占位文本而非报错；
//!   缓冲短于格式宽度时返回 [`CodecError::Truncated`]；
//! - 纯函数，无状态、无 I/O，整数遵循补码语义，浮点遵循 IEEE 754。
//!
//! ## 注意事项（Trade-offs）
//! - `BigUint64BE` 按**无符号** 64 位大端处理（编码与解码一致），由回归测试钉住；
//! - 旧式别名 `IntLE`/`IntBE`/`UintLE`/`UintBE`（及不带后缀的 `Int`/`Uint`）均映射到 8 位变体。

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 编码时使用的定长暂存区，容纳最宽格式并留有余量。
pub const SCRATCH_LEN: usize = 16;

/// 声明的数值格式：宽度、符号性与字节序。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NumericFormat {
    Int8,
    Int16LE,
    Int16BE,
    Int32LE,
    Int32BE,
    FloatLE,
    FloatBE,
    DoubleLE,
    DoubleBE,
    Uint8,
    Uint16LE,
    Uint16BE,
    Uint32LE,
    Uint32BE,
    BigInt64LE,
    BigInt64BE,
    BigUint64LE,
    BigUint64BE,
}

/// 格式的数值类别，决定文本解析与越界判定方式。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NumericKind {
    Signed,
    Unsigned,
    Float,
}

impl NumericFormat {
    /// 全部格式，顺序与界面下拉菜单一致。
    pub const ALL: [NumericFormat; 18] = [
        NumericFormat::Int8,
        NumericFormat::Int16LE,
        NumericFormat::Int16BE,
        NumericFormat::Int32LE,
        NumericFormat::Int32BE,
        NumericFormat::FloatLE,
        NumericFormat::FloatBE,
        NumericFormat::DoubleLE,
        NumericFormat::DoubleBE,
        NumericFormat::Uint8,
        NumericFormat::Uint16LE,
        NumericFormat::Uint16BE,
        NumericFormat::Uint32LE,
        NumericFormat::Uint32BE,
        NumericFormat::BigInt64LE,
        NumericFormat::BigInt64BE,
        NumericFormat::BigUint64LE,
        NumericFormat::BigUint64BE,
    ];

    /// 稳定的显示名，同时也是序列化形式。
    pub fn name(self) -> &'static str {
        match self {
            NumericFormat::Int8 => "Int8",
            NumericFormat::Int16LE => "Int16LE",
            NumericFormat::Int16BE => "Int16BE",
            NumericFormat::Int32LE => "Int32LE",
            NumericFormat::Int32BE => "Int32BE",
            NumericFormat::FloatLE => "FloatLE",
            NumericFormat::FloatBE => "FloatBE",
            NumericFormat::DoubleLE => "DoubleLE",
            NumericFormat::DoubleBE => "DoubleBE",
            NumericFormat::Uint8 => "Uint8",
            NumericFormat::Uint16LE => "Uint16LE",
            NumericFormat::Uint16BE => "Uint16BE",
            NumericFormat::Uint32LE => "Uint32LE",
            NumericFormat::Uint32BE => "Uint32BE",
            NumericFormat::BigInt64LE => "BigInt64LE",
            NumericFormat::BigInt64BE => "BigInt64BE",
            NumericFormat::BigUint64LE => "BigUint64LE",
            NumericFormat::BigUint64BE => "BigUint64BE",
        }
    }

    /// 格式占用的字节数（1/2/4/8）。
    pub fn width(self) -> usize {
        match self {
            NumericFormat::Int8 | NumericFormat::Uint8 => 1,
            NumericFormat::Int16LE
            | NumericFormat::Int16BE
            | NumericFormat::Uint16LE
            | NumericFormat::Uint16BE => 2,
            NumericFormat::Int32LE
            | NumericFormat::Int32BE
            | NumericFormat::Uint32LE
            | NumericFormat::Uint32BE
            | NumericFormat::FloatLE
            | NumericFormat::FloatBE => 4,
            NumericFormat::DoubleLE
            | NumericFormat::DoubleBE
            | NumericFormat::BigInt64LE
            | NumericFormat::BigInt64BE
            | NumericFormat::BigUint64LE
            | NumericFormat::BigUint64BE => 8,
        }
    }

    /// 数值类别。
    pub fn kind(self) -> NumericKind {
        match self {
            NumericFormat::Int8
            | NumericFormat::Int16LE
            | NumericFormat::Int16BE
            | NumericFormat::Int32LE
            | NumericFormat::Int32BE
            | NumericFormat::BigInt64LE
            | NumericFormat::BigInt64BE => NumericKind::Signed,
            NumericFormat::Uint8
            | NumericFormat::Uint16LE
            | NumericFormat::Uint16BE
            | NumericFormat::Uint32LE
            | NumericFormat::Uint32BE
            | NumericFormat::BigUint64LE
            | NumericFormat::BigUint64BE => NumericKind::Unsigned,
            NumericFormat::FloatLE
            | NumericFormat::FloatBE
            | NumericFormat::DoubleLE
            | NumericFormat::DoubleBE => NumericKind::Float,
        }
    }

    /// 按格式类别解析界面输入的文本数值。
    pub fn parse_value(self, text: &str) -> Result<NumericValue, CodecError> {
        let trimmed = text.trim();
        let invalid = || CodecError::InvalidLiteral {
            format: self,
            literal: trimmed.to_owned(),
        };
        match self.kind() {
            NumericKind::Signed => trimmed
                .parse::<i64>()
                .map(NumericValue::Int)
                .map_err(|_| invalid()),
            NumericKind::Unsigned => trimmed
                .parse::<u64>()
                .map(NumericValue::Uint)
                .map_err(|_| invalid()),
            NumericKind::Float => trimmed
                .parse::<f64>()
                .map(NumericValue::Float)
                .map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for NumericFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NumericFormat {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let legacy = match lowered.as_str() {
            "int" | "intle" | "intbe" => Some(NumericFormat::Int8),
            "uint" | "uintle" | "uintbe" => Some(NumericFormat::Uint8),
            _ => None,
        };
        legacy
            .or_else(|| {
                NumericFormat::ALL
                    .into_iter()
                    .find(|format| format.name().eq_ignore_ascii_case(&lowered))
            })
            .ok_or_else(|| CodecError::UnknownFormat { name: s.to_owned() })
    }
}

impl TryFrom<String> for NumericFormat {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NumericFormat> for String {
    fn from(value: NumericFormat) -> Self {
        value.name().to_owned()
    }
}

/// 与格式无关的数值载体。
///
/// 整数分别以 `i64`/`u64` 承载以覆盖 64 位格式的完整值域；浮点统一为 `f64`。
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericValue {
    Int(i64),
    Uint(u64),
    Float(f64),
}

impl NumericValue {
    fn as_f64(self) -> f64 {
        match self {
            NumericValue::Int(value) => value as f64,
            NumericValue::Uint(value) => value as f64,
            NumericValue::Float(value) => value,
        }
    }

    fn as_integral(self) -> Option<i128> {
        match self {
            NumericValue::Int(value) => Some(i128::from(value)),
            NumericValue::Uint(value) => Some(i128::from(value)),
            // `u64::MAX as f64` 向上取整到 2^64，仍在 i128 内。
            NumericValue::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                if value.abs() <= 2f64.powi(64) {
                    Some(value as i128)
                } else {
                    None
                }
            }
            NumericValue::Float(_) => None,
        }
    }
}

impl fmt::Display for NumericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericValue::Int(value) => write!(f, "{value}"),
            NumericValue::Uint(value) => write!(f, "{value}"),
            NumericValue::Float(value) => write!(f, "{value}"),
        }
    }
}

/// 解码结果：声明格式后得到数值，否则为不透明占位。
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedValue {
    Number(NumericValue),
    Opaque(String),
}

impl DecodedValue {
    /// 数值结果，占位时为 `None`。
    pub fn number(&self) -> Option<NumericValue> {
        match self {
            DecodedValue::Number(value) => Some(*value),
            DecodedValue::Opaque(_) => None,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Number(value) => value.fmt(f),
            DecodedValue::Opaque(label) => f.write_str(label),
        }
    }
}

/// 编解码错误。
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("value {value} does not fit numeric format {format}")]
    OutOfRange {
        format: NumericFormat,
        value: NumericValue,
    },

    #[error("numeric format {format} needs {needed} bytes but only {actual} were supplied")]
    Truncated {
        format: NumericFormat,
        needed: usize,
        actual: usize,
    },

    #[error("`{literal}` is not a valid {format} literal")]
    InvalidLiteral {
        format: NumericFormat,
        literal: String,
    },

    #[error("unknown numeric format `{name}`")]
    UnknownFormat { name: String },
}

/// 未声明格式时的占位文本。
pub fn opaque_label(len: usize) -> String {
    format!("[Buffer ... {len} bytes]")
}

fn integral<T: TryFrom<i128>>(value: NumericValue, format: NumericFormat) -> Result<T, CodecError> {
    value
        .as_integral()
        .and_then(|wide| T::try_from(wide).ok())
        .ok_or(CodecError::OutOfRange { format, value })
}

/// 按格式把数值写成字节。
///
/// # 契约说明
/// - 先写入 [`SCRATCH_LEN`] 字节的暂存区，再截取前 `format.width()` 字节返回；
/// - 浮点值写入 32 位格式时按 `f64 as f32` 舍入，与 IEEE 754 单精度一致。
pub fn encode(value: NumericValue, format: NumericFormat) -> Result<Vec<u8>, CodecError> {
    let mut scratch = [0u8; SCRATCH_LEN];
    let width = format.width();
    let out = &mut scratch[..width];
    match format {
        NumericFormat::Int8 => out.copy_from_slice(&integral::<i8>(value, format)?.to_be_bytes()),
        NumericFormat::Int16LE => {
            out.copy_from_slice(&integral::<i16>(value, format)?.to_le_bytes())
        }
        NumericFormat::Int16BE => {
            out.copy_from_slice(&integral::<i16>(value, format)?.to_be_bytes())
        }
        NumericFormat::Int32LE => {
            out.copy_from_slice(&integral::<i32>(value, format)?.to_le_bytes())
        }
        NumericFormat::Int32BE => {
            out.copy_from_slice(&integral::<i32>(value, format)?.to_be_bytes())
        }
        NumericFormat::FloatLE => out.copy_from_slice(&(value.as_f64() as f32).to_le_bytes()),
        NumericFormat::FloatBE => out.copy_from_slice(&(value.as_f64() as f32).to_be_bytes()),
        NumericFormat::DoubleLE => out.copy_from_slice(&value.as_f64().to_le_bytes()),
        NumericFormat::DoubleBE => out.copy_from_slice(&value.as_f64().to_be_bytes()),
        NumericFormat::Uint8 => out.copy_from_slice(&integral::<u8>(value, format)?.to_be_bytes()),
        NumericFormat::Uint16LE => {
            out.copy_from_slice(&integral::<u16>(value, format)?.to_le_bytes())
        }
        NumericFormat::Uint16BE => {
            out.copy_from_slice(&integral::<u16>(value, format)?.to_be_bytes())
        }
        NumericFormat::Uint32LE => {
            out.copy_from_slice(&integral::<u32>(value, format)?.to_le_bytes())
        }
        NumericFormat::Uint32BE => {
            out.copy_from_slice(&integral::<u32>(value, format)?.to_be_bytes())
        }
        NumericFormat::BigInt64LE => {
            out.copy_from_slice(&integral::<i64>(value, format)?.to_le_bytes())
        }
        NumericFormat::BigInt64BE => {
            out.copy_from_slice(&integral::<i64>(value, format)?.to_be_bytes())
        }
        NumericFormat::BigUint64LE => {
            out.copy_from_slice(&integral::<u64>(value, format)?.to_le_bytes())
        }
        NumericFormat::BigUint64BE => {
            out.copy_from_slice(&integral::<u64>(value, format)?.to_be_bytes())
        }
    }
    Ok(out.to_vec())
}

fn fixed<const N: usize>(view: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&view[..N]);
    buf
}

/// 按格式读取字节；`format` 为空时返回不透明占位。
///
/// 仅读取前 `width` 字节，多余字节被忽略。
pub fn decode(bytes: &[u8], format: Option<NumericFormat>) -> Result<DecodedValue, CodecError> {
    let Some(format) = format else {
        return Ok(DecodedValue::Opaque(opaque_label(bytes.len())));
    };
    let width = format.width();
    let view = bytes.get(..width).ok_or(CodecError::Truncated {
        format,
        needed: width,
        actual: bytes.len(),
    })?;

    let value = match format {
        NumericFormat::Int8 => NumericValue::Int(i64::from(i8::from_be_bytes(fixed(view)))),
        NumericFormat::Int16LE => NumericValue::Int(i64::from(i16::from_le_bytes(fixed(view)))),
        NumericFormat::Int16BE => NumericValue::Int(i64::from(i16::from_be_bytes(fixed(view)))),
        NumericFormat::Int32LE => NumericValue::Int(i64::from(i32::from_le_bytes(fixed(view)))),
        NumericFormat::Int32BE => NumericValue::Int(i64::from(i32::from_be_bytes(fixed(view)))),
        NumericFormat::FloatLE => {
            NumericValue::Float(f64::from(f32::from_le_bytes(fixed(view))))
        }
        NumericFormat::FloatBE => {
            NumericValue::Float(f64::from(f32::from_be_bytes(fixed(view))))
        }
        NumericFormat::DoubleLE => NumericValue::Float(f64::from_le_bytes(fixed(view))),
        NumericFormat::DoubleBE => NumericValue::Float(f64::from_be_bytes(fixed(view))),
        NumericFormat::Uint8 => NumericValue::Uint(u64::from(u8::from_be_bytes(fixed(view)))),
        NumericFormat::Uint16LE => {
            NumericValue::Uint(u64::from(u16::from_le_bytes(fixed(view))))
        }
        NumericFormat::Uint16BE => {
            NumericValue::Uint(u64::from(u16::from_be_bytes(fixed(view))))
        }
        NumericFormat::Uint32LE => {
            NumericValue::Uint(u64::from(u32::from_le_bytes(fixed(view))))
        }
        NumericFormat::Uint32BE => {
            NumericValue::Uint(u64::from(u32::from_be_bytes(fixed(view))))
        }
        NumericFormat::BigInt64LE => NumericValue::Int(i64::from_le_bytes(fixed(view))),
        NumericFormat::BigInt64BE => NumericValue::Int(i64::from_be_bytes(fixed(view))),
        NumericFormat::BigUint64LE => NumericValue::Uint(u64::from_le_bytes(fixed(view))),
        NumericFormat::BigUint64BE => NumericValue::Uint(u64::from_be_bytes(fixed(view))),
    };
    Ok(DecodedValue::Number(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int8_boundaries() {
        assert_eq!(encode(NumericValue::Int(-128), NumericFormat::Int8).unwrap(), vec![0x80]);
        assert_eq!(encode(NumericValue::Int(127), NumericFormat::Int8).unwrap(), vec![0x7f]);
        assert!(matches!(
            encode(NumericValue::Int(128), NumericFormat::Int8),
            Err(CodecError::OutOfRange { .. })
        ));
        assert!(matches!(
            encode(NumericValue::Int(-129), NumericFormat::Int8),
            Err(CodecError::OutOfRange { .. })
        ));
        assert_eq!(
            decode(&[0x80], Some(NumericFormat::Int8)).unwrap(),
            DecodedValue::Number(NumericValue::Int(-128))
        );
    }

    #[test]
    fn endianness_is_respected() {
        assert_eq!(
            encode(NumericValue::Int(0x0102), NumericFormat::Int16LE).unwrap(),
            vec![0x02, 0x01]
        );
        assert_eq!(
            encode(NumericValue::Int(0x0102), NumericFormat::Int16BE).unwrap(),
            vec![0x01, 0x02]
        );
        assert_eq!(
            decode(&[0x00, 0x00, 0x01, 0x00], Some(NumericFormat::Uint32BE)).unwrap(),
            DecodedValue::Number(NumericValue::Uint(256))
        );
        assert_eq!(
            decode(&[0x00, 0x01, 0x00, 0x00], Some(NumericFormat::Uint32LE)).unwrap(),
            DecodedValue::Number(NumericValue::Uint(256))
        );
    }

    #[test]
    fn big_uint64_be_is_unsigned() {
        let bytes = [0xff; 8];
        assert_eq!(
            decode(&bytes, Some(NumericFormat::BigUint64BE)).unwrap(),
            DecodedValue::Number(NumericValue::Uint(u64::MAX))
        );
        assert_eq!(
            encode(NumericValue::Uint(u64::MAX), NumericFormat::BigUint64BE).unwrap(),
            bytes.to_vec()
        );
        assert!(matches!(
            encode(NumericValue::Int(-1), NumericFormat::BigUint64BE),
            Err(CodecError::OutOfRange { .. })
        ));
    }

    #[test]
    fn float_formats_follow_ieee754() {
        assert_eq!(
            encode(NumericValue::Float(1.5), NumericFormat::FloatBE).unwrap(),
            vec![0x3f, 0xc0, 0x00, 0x00]
        );
        assert_eq!(
            encode(NumericValue::Float(-2.0), NumericFormat::DoubleLE).unwrap(),
            (-2.0f64).to_le_bytes().to_vec()
        );
        assert_eq!(
            decode(&[0x00, 0x00, 0xc0, 0x3f], Some(NumericFormat::FloatLE)).unwrap(),
            DecodedValue::Number(NumericValue::Float(1.5))
        );
    }

    #[test]
    fn fractional_float_rejected_for_integer_format() {
        assert!(matches!(
            encode(NumericValue::Float(1.25), NumericFormat::Int32LE),
            Err(CodecError::OutOfRange { .. })
        ));
        assert_eq!(
            encode(NumericValue::Float(7.0), NumericFormat::Uint8).unwrap(),
            vec![7]
        );
    }

    #[test]
    fn missing_format_yields_placeholder() {
        let decoded = decode(&[1, 2, 3], None).unwrap();
        assert_eq!(decoded, DecodedValue::Opaque("[Buffer ... 3 bytes]".to_owned()));
        assert_eq!(decode(&[1, 2], None).unwrap().to_string(), "[Buffer ... 2 bytes]");
    }

    #[test]
    fn short_buffer_is_truncated_error() {
        assert_eq!(
            decode(&[1, 2, 3], Some(NumericFormat::Int32BE)),
            Err(CodecError::Truncated {
                format: NumericFormat::Int32BE,
                needed: 4,
                actual: 3,
            })
        );
    }

    #[test]
    fn legacy_aliases_map_to_eight_bit() {
        assert_eq!("IntLE".parse::<NumericFormat>().unwrap(), NumericFormat::Int8);
        assert_eq!("intbe".parse::<NumericFormat>().unwrap(), NumericFormat::Int8);
        assert_eq!("UintBE".parse::<NumericFormat>().unwrap(), NumericFormat::Uint8);
        assert_eq!("uint16le".parse::<NumericFormat>().unwrap(), NumericFormat::Uint16LE);
        assert!("Int24".parse::<NumericFormat>().is_err());
    }

    #[test]
    fn parse_value_follows_kind() {
        assert_eq!(
            NumericFormat::Int16BE.parse_value(" -12 ").unwrap(),
            NumericValue::Int(-12)
        );
        assert_eq!(
            NumericFormat::DoubleBE.parse_value("2.5").unwrap(),
            NumericValue::Float(2.5)
        );
        assert!(NumericFormat::Uint8.parse_value("-1").is_err());
    }
}
