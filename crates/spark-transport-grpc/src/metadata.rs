//! [`WireMetadata`] 与 tonic `MetadataMap` 之间的转换。
//!
//! `-bin` 键走二进制通道（线上自动 base64），其余键要求值为可见 ASCII。
//! 顺序与重复键按原样保留。

use spark_probe::{MetadataValue, WireMetadata, metadata::is_binary_key};
use tonic::metadata::{
    AsciiMetadataKey, AsciiMetadataValue, BinaryMetadataKey, BinaryMetadataValue, KeyAndValueRef,
    MetadataMap,
};
use tracing::warn;

use crate::error::GrpcError;

fn rejected(key: &str, detail: impl ToString) -> GrpcError {
    GrpcError::Metadata {
        key: key.to_owned(),
        detail: detail.to_string(),
    }
}

/// 出站：构造请求的 `MetadataMap`。
pub fn to_metadata_map(metadata: &WireMetadata) -> Result<MetadataMap, GrpcError> {
    let mut map = MetadataMap::new();
    for (key, value) in metadata.iter() {
        if is_binary_key(key) {
            let name = BinaryMetadataKey::from_bytes(key.as_bytes()).map_err(|err| rejected(key, err))?;
            map.append_bin(name, BinaryMetadataValue::from_bytes(value.as_bytes()));
            continue;
        }
        let name = AsciiMetadataKey::from_bytes(key.as_bytes()).map_err(|err| rejected(key, err))?;
        let text = value
            .as_text()
            .ok_or_else(|| rejected(key, "binary value on a text key"))?;
        let value = AsciiMetadataValue::try_from(text).map_err(|err| rejected(key, err))?;
        map.append(name, value);
    }
    Ok(map)
}

/// 入站：展开响应头、trailers 或错误状态携带的 `MetadataMap`。
///
/// 无法解读的值（非 UTF-8 文本、非法 base64）被跳过并记录告警。
pub fn from_metadata_map(map: &MetadataMap) -> WireMetadata {
    let mut wire = WireMetadata::new();
    for entry in map.iter() {
        match entry {
            KeyAndValueRef::Ascii(key, value) => match value.to_str() {
                Ok(text) => wire.append_text(key.as_str(), text),
                Err(err) => warn!(key = key.as_str(), %err, "dropping non-text metadata value"),
            },
            KeyAndValueRef::Binary(key, value) => match value.to_bytes() {
                Ok(bytes) => wire.append_binary(key.as_str(), bytes.to_vec()),
                Err(err) => warn!(key = key.as_str(), %err, "dropping undecodable binary metadata"),
            },
        }
    }
    wire
}

/// 文本值的便捷读取，主要供测试使用。
pub fn text_value<'a>(metadata: &'a WireMetadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(MetadataValue::as_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_map_keeps_text_and_binary_channels_apart() {
        let mut wire = WireMetadata::new();
        wire.append_text("x-user", "alice");
        wire.append_text("x-user", "bob");
        wire.append_binary("trace-bin", vec![0u8, 1, 2, 255]);

        let map = to_metadata_map(&wire).expect("合法元数据应可转换");
        let users: Vec<_> = map
            .get_all("x-user")
            .iter()
            .map(|value| value.to_str().unwrap().to_owned())
            .collect();
        assert_eq!(users, vec!["alice", "bob"]);
        let trace = map.get_bin("trace-bin").expect("应包含二进制值");
        assert_eq!(trace.to_bytes().unwrap().as_ref(), &[0u8, 1, 2, 255]);

        let back = from_metadata_map(&map);
        assert_eq!(back.len(), 3);
        assert_eq!(
            back.get("trace-bin"),
            Some(&MetadataValue::Binary(vec![0u8, 1, 2, 255]))
        );
        assert_eq!(text_value(&back, "x-user"), Some("alice"));
    }

    #[test]
    fn illegal_text_values_are_rejected() {
        let mut wire = WireMetadata::new();
        wire.append_text("x-note", "line\nbreak");
        assert!(matches!(
            to_metadata_map(&wire),
            Err(GrpcError::Metadata { ref key, .. }) if key == "x-note"
        ));

        let mut wire = WireMetadata::new();
        wire.append_text("bad key", "v");
        assert!(matches!(to_metadata_map(&wire), Err(GrpcError::Metadata { .. })));
    }
}
