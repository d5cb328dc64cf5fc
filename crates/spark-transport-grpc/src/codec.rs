//! # 编解码
//!
//! - [`RawCodec`]：tonic 的 `Codec` 实现，在线上帧与 `Bytes` 之间原样搬运，不感知消息类型；
//! - [`MessageTranscoder`]：依据方法的输入/输出消息描述，在 [`Payload`] 与 protobuf 字节之间转码。
//!   JSON 经 `DynamicMessage` 的 serde 支持完成映射，字段名遵循 protobuf JSON 映射规则。

use bytes::{Buf, BufMut, Bytes};
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use spark_probe::Payload;
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

use crate::error::GrpcError;

/// 透传字节的编解码器。
#[derive(Clone, Copy, Debug, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawEncoder;
    type Decoder = RawDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        RawEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawDecoder
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RawEncoder;

impl Encoder for RawEncoder {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put(item);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RawDecoder;

impl Decoder for RawDecoder {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}

/// 单个方法的请求/响应转码器。
#[derive(Clone, Debug)]
pub struct MessageTranscoder {
    input: MessageDescriptor,
    output: MessageDescriptor,
}

impl MessageTranscoder {
    pub fn new(input: MessageDescriptor, output: MessageDescriptor) -> Self {
        Self { input, output }
    }

    /// 请求消息 → 线上字节；`Raw` 视为已编码，原样发送。
    pub fn encode(&self, payload: &Payload) -> Result<Bytes, GrpcError> {
        match payload {
            Payload::Raw(bytes) => Ok(Bytes::copy_from_slice(bytes)),
            Payload::Json(value) => {
                let message = DynamicMessage::deserialize(self.input.clone(), value.clone())
                    .map_err(|err| GrpcError::Payload {
                        message: self.input.full_name().to_owned(),
                        detail: err.to_string(),
                    })?;
                Ok(Bytes::from(message.encode_to_vec()))
            }
        }
    }

    /// 线上字节 → 响应 JSON。
    pub fn decode(&self, bytes: Bytes) -> Result<Payload, GrpcError> {
        let failed = |detail: String| GrpcError::Payload {
            message: self.output.full_name().to_owned(),
            detail,
        };
        let message = DynamicMessage::decode(self.output.clone(), bytes)
            .map_err(|err| failed(err.to_string()))?;
        serde_json::to_value(&message)
            .map(Payload::Json)
            .map_err(|err| failed(err.to_string()))
    }

    pub fn input(&self) -> &MessageDescriptor {
        &self.input
    }

    pub fn output(&self) -> &MessageDescriptor {
        &self.output
    }
}
