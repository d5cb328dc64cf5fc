//! # 传输绑定契约
//!
//! ## 核心意图（Why）
//! - 外部 RPC 客户端库按方法暴露四种调用形态，每个调用对象发出 `data`/`status`/`error`
//!   三类事件，并提供 `end()`（优雅半关闭）与 `cancel()`（强制停止）。
//! - 本模块把这些能力表达为显式 trait：[`Connector`] 绑定地址得到 [`ServiceStub`]，
//!   [`ServiceStub`] 以四个方法对应四种形态，返回 [`TransportCall`]；入站事件通过
//!   [`CallListener`] 回调送回会话管理器。
//!
//! ## 行为契约（What）
//! - 监听器可能在任意线程被调用，也可能在 `ServiceStub` 方法返回之前同步触发；
//! - 每个调用最多发出一次 [`TransportEvent::Status`]，其后不再发出 `Data`；
//! - `end()`/`cancel()` 允许重复调用，重复调用无副作用。

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    definition::{MethodDefinition, ServiceDefinition},
    descriptor::Payload,
    error::ProbeError,
    metadata::WireMetadata,
};

/// 通道安全模式。当前仅支持明文；保留该字段以便日后加入 TLS 而不改变管理器契约。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSecurity {
    #[default]
    Plaintext,
}

/// gRPC 状态码。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StatusCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl StatusCode {
    /// 未知数值统一映射为 `Unknown`。
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => StatusCode::Ok,
            1 => StatusCode::Cancelled,
            3 => StatusCode::InvalidArgument,
            4 => StatusCode::DeadlineExceeded,
            5 => StatusCode::NotFound,
            6 => StatusCode::AlreadyExists,
            7 => StatusCode::PermissionDenied,
            8 => StatusCode::ResourceExhausted,
            9 => StatusCode::FailedPrecondition,
            10 => StatusCode::Aborted,
            11 => StatusCode::OutOfRange,
            12 => StatusCode::Unimplemented,
            13 => StatusCode::Internal,
            14 => StatusCode::Unavailable,
            15 => StatusCode::DataLoss,
            16 => StatusCode::Unauthenticated,
            _ => StatusCode::Unknown,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 终态：状态码、可读说明与 trailing 元数据。
#[derive(Clone, Debug, PartialEq)]
pub struct CallStatus {
    pub code: u32,
    pub details: String,
    pub metadata: WireMetadata,
}

impl CallStatus {
    pub fn new(code: u32, details: impl Into<String>, metadata: WireMetadata) -> Self {
        Self {
            code,
            details: details.into(),
            metadata,
        }
    }

    pub fn ok(metadata: WireMetadata) -> Self {
        Self::new(StatusCode::Ok.as_u32(), "", metadata)
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok.as_u32()
    }

    /// 失败说明；传输未给出说明时以状态码名称代替，保证非空。
    pub fn error_detail(&self) -> String {
        if self.details.trim().is_empty() {
            format!("{} ({})", StatusCode::from_u32(self.code), self.code)
        } else {
            self.details.clone()
        }
    }
}

/// 传输调用发出的入站事件。
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Data(Payload),
    Status(CallStatus),
    Error(String),
}

/// 入站事件回调。
pub type CallListener = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// 已建立的传输级调用。
pub trait TransportCall: Send + Sync {
    /// 向请求流写入一条消息；单请求形态的调用返回错误。
    fn write(&self, payload: Payload) -> Result<(), ProbeError>;

    /// 优雅结束写半部。
    fn end(&self);

    /// 强制停止调用。
    fn cancel(&self);
}

/// 绑定到某个地址的服务句柄，按四种形态发起调用。
///
/// 单请求形态随调用一并发送消息；写流形态只携带元数据打开调用，消息随后经
/// [`TransportCall::write`] 写入。
pub trait ServiceStub: Send + Sync {
    fn unary(
        &self,
        method: &MethodDefinition,
        payload: Payload,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Result<Arc<dyn TransportCall>, ProbeError>;

    fn server_stream(
        &self,
        method: &MethodDefinition,
        payload: Payload,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Result<Arc<dyn TransportCall>, ProbeError>;

    fn client_stream(
        &self,
        method: &MethodDefinition,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Result<Arc<dyn TransportCall>, ProbeError>;

    fn bidi_stream(
        &self,
        method: &MethodDefinition,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Result<Arc<dyn TransportCall>, ProbeError>;
}

/// 按地址与服务定义创建客户端句柄。
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        endpoint: &str,
        service: &ServiceDefinition,
        security: ChannelSecurity,
    ) -> Result<Arc<dyn ServiceStub>, ProbeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_detail_is_never_empty() {
        let status = CallStatus::new(14, "", WireMetadata::new());
        assert_eq!(status.error_detail(), "UNAVAILABLE (14)");
        let status = CallStatus::new(5, "no such user", WireMetadata::new());
        assert_eq!(status.error_detail(), "no such user");
        assert_eq!(StatusCode::from_u32(99), StatusCode::Unknown);
        assert!(CallStatus::ok(WireMetadata::new()).is_ok());
    }
}
