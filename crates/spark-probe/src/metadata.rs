//! # 元数据翻译（Metadata Translator）
//!
//! ## 核心意图（Why）
//! - 界面侧以有序的 `{key, value}` 列表编辑/展示元数据；传输侧使用自身的多值容器。
//!   本模块在两者之间转换，并负责 `-bin` 键的二进制约定。
//!
//! ## 行为契约（What）
//! - [`to_wire`]：键统一转为小写 ASCII；`-bin` 键若声明了数值格式且值为文本，则解析为数字后经
//!   [`codec::encode`] 写成字节；未声明格式时文本按 UTF-8 字节发送；非 `-bin` 键只接受文本值；
//! - [`from_wire`]：展平为有序列表，二进制值原样保留为字节、`format` 为空，
//!   实际解码由调用方按需通过 [`MetadataEntry::display_value`] 触发。
//!
//! ## 注意事项（Trade-offs）
//! - [`WireMetadata`] 以 `Vec` 保序存储，允许同键多值；查找为线性扫描，元数据条目通常很少。

use serde::{Deserialize, Serialize};

use crate::{
    codec::{self, CodecError, NumericFormat},
    error::ProbeError,
};

/// 标记二进制元数据的保留后缀。
pub const BINARY_SUFFIX: &str = "-bin";

/// 判断键是否为二进制键。
pub fn is_binary_key(key: &str) -> bool {
    key.len() > BINARY_SUFFIX.len() && key.to_ascii_lowercase().ends_with(BINARY_SUFFIX)
}

/// 元数据值：文本或原始字节。
///
/// 序列化时文本为 JSON 字符串，字节为数字数组。
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Binary(Vec<u8>),
}

impl MetadataValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(text) => Some(text),
            MetadataValue::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MetadataValue::Text(text) => text.as_bytes(),
            MetadataValue::Binary(bytes) => bytes,
        }
    }
}

/// 界面侧的单条元数据。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: MetadataValue,
    /// 仅对 `-bin` 键有意义：出站时用于编码文本数值，入站时用于按需解码。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<NumericFormat>,
}

impl MetadataEntry {
    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: MetadataValue::Text(value.into()),
            format: None,
        }
    }

    pub fn binary(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: MetadataValue::Binary(value.into()),
            format: None,
        }
    }

    /// 声明数值格式，返回新条目。
    #[must_use]
    pub fn with_format(mut self, format: NumericFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn is_binary(&self) -> bool {
        is_binary_key(&self.key)
    }

    /// 用于展示的值。
    ///
    /// - 文本值原样返回；
    /// - 二进制值按声明格式解码，未声明时为 `"[Buffer ... N bytes]"` 占位；
    /// - 字节不足格式宽度时返回 [`CodecError::Truncated`]。
    pub fn display_value(&self) -> Result<String, CodecError> {
        match &self.value {
            MetadataValue::Text(text) => Ok(text.clone()),
            MetadataValue::Binary(bytes) => {
                codec::decode(bytes, self.format).map(|decoded| decoded.to_string())
            }
        }
    }
}

/// 传输侧的有序多值元数据容器。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WireMetadata {
    entries: Vec<(String, MetadataValue)>,
}

impl WireMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条文本值，键转为小写。
    pub fn append_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((
            key.into().to_ascii_lowercase(),
            MetadataValue::Text(value.into()),
        ));
    }

    /// 追加一条二进制值，键转为小写。
    pub fn append_binary(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.push((
            key.into().to_ascii_lowercase(),
            MetadataValue::Binary(value.into()),
        ));
    }

    /// 首个匹配值。
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    /// 拼接另一组元数据（例如响应头之后的 trailers），保持先后顺序。
    pub fn extend(&mut self, other: WireMetadata) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ProbeError {
    ProbeError::InvalidMetadata {
        key: key.to_owned(),
        reason: reason.into(),
    }
}

/// 由界面条目构造传输容器，保持原有顺序。
pub fn to_wire(entries: &[MetadataEntry]) -> Result<WireMetadata, ProbeError> {
    let mut wire = WireMetadata::new();
    for entry in entries {
        let key = entry.key.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(invalid(&entry.key, "metadata key must not be empty"));
        }

        if is_binary_key(&key) {
            let bytes = match (&entry.value, entry.format) {
                (MetadataValue::Text(text), Some(format)) => {
                    let value = format.parse_value(text)?;
                    codec::encode(value, format)?
                }
                (MetadataValue::Text(text), None) => text.as_bytes().to_vec(),
                (MetadataValue::Binary(bytes), _) => bytes.clone(),
            };
            wire.append_binary(key, bytes);
            continue;
        }

        match &entry.value {
            MetadataValue::Text(text) => wire.append_text(key, text.clone()),
            MetadataValue::Binary(_) => {
                return Err(invalid(
                    &key,
                    format!("binary values require a `{BINARY_SUFFIX}` key"),
                ));
            }
        }
    }
    Ok(wire)
}

/// 将传输容器展平为界面条目；二进制值不做解码。
pub fn from_wire(wire: &WireMetadata) -> Vec<MetadataEntry> {
    wire.iter()
        .map(|(key, value)| MetadataEntry {
            key: key.to_owned(),
            value: value.clone(),
            format: None,
        })
        .collect()
}
