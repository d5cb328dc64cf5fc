//! 二进制数值编解码性质验证
//!
//! - 每种宽度/字节序在其完整值域内满足 `decode(encode(v, f), f) == v`；
//! - `BigUint64BE` 以标准库 `u64::{from_be_bytes, to_be_bytes}` 为独立参照，钉住无符号语义；
//! - 编码结果长度恒等于格式宽度。

use proptest::prelude::*;
use spark_probe::{
    NumericFormat, NumericValue,
    codec::{DecodedValue, decode, encode},
};

fn round_trip(value: NumericValue, format: NumericFormat) -> Result<(), TestCaseError> {
    let bytes = encode(value, format).map_err(|err| TestCaseError::fail(err.to_string()))?;
    prop_assert_eq!(bytes.len(), format.width());
    let decoded = decode(&bytes, Some(format)).map_err(|err| TestCaseError::fail(err.to_string()))?;
    prop_assert_eq!(decoded, DecodedValue::Number(value));
    Ok(())
}

proptest! {
    #[test]
    fn prop_signed_formats_round_trip(v8 in any::<i8>(), v16 in any::<i16>(), v32 in any::<i32>(), v64 in any::<i64>()) {
        round_trip(NumericValue::Int(v8.into()), NumericFormat::Int8)?;
        for format in [NumericFormat::Int16LE, NumericFormat::Int16BE] {
            round_trip(NumericValue::Int(v16.into()), format)?;
        }
        for format in [NumericFormat::Int32LE, NumericFormat::Int32BE] {
            round_trip(NumericValue::Int(v32.into()), format)?;
        }
        for format in [NumericFormat::BigInt64LE, NumericFormat::BigInt64BE] {
            round_trip(NumericValue::Int(v64), format)?;
        }
    }

    #[test]
    fn prop_unsigned_formats_round_trip(v8 in any::<u8>(), v16 in any::<u16>(), v32 in any::<u32>(), v64 in any::<u64>()) {
        round_trip(NumericValue::Uint(v8.into()), NumericFormat::Uint8)?;
        for format in [NumericFormat::Uint16LE, NumericFormat::Uint16BE] {
            round_trip(NumericValue::Uint(v16.into()), format)?;
        }
        for format in [NumericFormat::Uint32LE, NumericFormat::Uint32BE] {
            round_trip(NumericValue::Uint(v32.into()), format)?;
        }
        for format in [NumericFormat::BigUint64LE, NumericFormat::BigUint64BE] {
            round_trip(NumericValue::Uint(v64), format)?;
        }
    }

    #[test]
    fn prop_finite_floats_round_trip(single in any::<f32>().prop_filter("有限值", |v| v.is_finite()),
                                     double in any::<f64>().prop_filter("有限值", |v| v.is_finite())) {
        for format in [NumericFormat::FloatLE, NumericFormat::FloatBE] {
            round_trip(NumericValue::Float(f64::from(single)), format)?;
        }
        for format in [NumericFormat::DoubleLE, NumericFormat::DoubleBE] {
            round_trip(NumericValue::Float(double), format)?;
        }
    }

    #[test]
    fn prop_big_uint64_be_matches_std_reference(value in any::<u64>()) {
        let encoded = encode(NumericValue::Uint(value), NumericFormat::BigUint64BE)
            .map_err(|err| TestCaseError::fail(err.to_string()))?;
        prop_assert_eq!(encoded.as_slice(), &value.to_be_bytes()[..]);

        let raw = value.to_be_bytes();
        let decoded = decode(&raw, Some(NumericFormat::BigUint64BE))
            .map_err(|err| TestCaseError::fail(err.to_string()))?;
        prop_assert_eq!(decoded.number(), Some(NumericValue::Uint(u64::from_be_bytes(raw))));
    }
}

#[test]
fn big_uint64_be_high_bit_stays_unsigned() {
    let raw = [0xff; 8];
    let decoded = decode(&raw, Some(NumericFormat::BigUint64BE)).expect("8 字节应可解码");
    assert_eq!(decoded.number(), Some(NumericValue::Uint(u64::MAX)));
    assert_eq!(decoded.to_string(), "18446744073709551615");
    assert_eq!(
        encode(NumericValue::Uint(u64::MAX), NumericFormat::BigUint64BE).expect("u64::MAX 应可编码"),
        raw.to_vec()
    );
    assert!(encode(NumericValue::Int(-1), NumericFormat::BigUint64BE).is_err());
}

#[test]
fn width_boundaries_per_format() {
    let cases: [(NumericFormat, NumericValue, NumericValue); 6] = [
        (NumericFormat::Int8, NumericValue::Int(-128), NumericValue::Int(127)),
        (NumericFormat::Int16BE, NumericValue::Int(i16::MIN.into()), NumericValue::Int(i16::MAX.into())),
        (NumericFormat::Int32LE, NumericValue::Int(i32::MIN.into()), NumericValue::Int(i32::MAX.into())),
        (NumericFormat::Uint8, NumericValue::Uint(0), NumericValue::Uint(255)),
        (NumericFormat::Uint16LE, NumericValue::Uint(0), NumericValue::Uint(u16::MAX.into())),
        (NumericFormat::Uint32BE, NumericValue::Uint(0), NumericValue::Uint(u32::MAX.into())),
    ];
    for (format, min, max) in cases {
        for value in [min, max] {
            let bytes = encode(value, format).expect("边界值应可编码");
            assert_eq!(decode(&bytes, Some(format)).unwrap(), DecodedValue::Number(value));
        }
    }
    assert!(encode(NumericValue::Uint(256), NumericFormat::Uint8).is_err());
    assert!(encode(NumericValue::Int(i64::from(i16::MAX) + 1), NumericFormat::Int16BE).is_err());
    assert!(encode(NumericValue::Uint(u64::from(u32::MAX) + 1), NumericFormat::Uint32BE).is_err());
}
