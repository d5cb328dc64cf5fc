//! gRPC 传输绑定的错误域，在 crate 边界统一折叠为 [`ProbeError`]。

use std::{io, path::PathBuf};

use spark_probe::ProbeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrpcError {
    /// 描述符集文件读取失败。
    #[error("failed to read descriptor set `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 文件无法定位或内容不是合法的 `FileDescriptorSet`。
    #[error("invalid descriptor set `{path}`: {detail}")]
    Descriptor { path: PathBuf, detail: String },

    /// 地址无法解析为 URI。
    #[error("invalid endpoint `{endpoint}`: {detail}")]
    Endpoint { endpoint: String, detail: String },

    /// 连接器没有该服务的消息描述，通常意味着未经加载器加载。
    #[error("no message descriptors registered for service `{service}`")]
    UnknownService { service: String },

    /// JSON 与 protobuf 之间的转码失败。
    #[error("failed to transcode `{message}`: {detail}")]
    Payload { message: String, detail: String },

    /// 元数据无法放入 tonic 的 `MetadataMap`。
    #[error("metadata `{key}` rejected by transport: {detail}")]
    Metadata { key: String, detail: String },

    /// 调用的请求流已关闭或不接受后续消息。
    #[error("call no longer accepts messages: {detail}")]
    Closed { detail: String },
}

impl From<GrpcError> for ProbeError {
    fn from(err: GrpcError) -> Self {
        match err {
            GrpcError::Io { ref path, .. } | GrpcError::Descriptor { ref path, .. } => {
                ProbeError::DefinitionNotFound {
                    path: path.display().to_string(),
                    detail: err.to_string(),
                }
            }
            GrpcError::Metadata { key, detail } => ProbeError::InvalidMetadata {
                key,
                reason: detail,
            },
            GrpcError::Endpoint { .. } => ProbeError::transport("channel.connect", err.to_string()),
            GrpcError::UnknownService { .. } => {
                ProbeError::transport("stub.prepare", err.to_string())
            }
            GrpcError::Payload { .. } => ProbeError::transport("payload.encode", err.to_string()),
            GrpcError::Closed { .. } => ProbeError::transport("call.write", err.to_string()),
        }
    }
}
