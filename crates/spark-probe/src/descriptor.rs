//! 方法调用描述符：从界面/进程边界进入核心的唯一输入。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{metadata::MetadataEntry, resolver::ServiceKey};

/// 请求/响应的四种流式形态。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum CallMode {
    Unary,
    ServerStream,
    ClientStream,
    BidirectionalStream,
}

impl CallMode {
    /// 由方法定义的流式标志推导调用形态。
    pub fn from_flags(client_streaming: bool, server_streaming: bool) -> Self {
        match (client_streaming, server_streaming) {
            (false, false) => CallMode::Unary,
            (false, true) => CallMode::ServerStream,
            (true, false) => CallMode::ClientStream,
            (true, true) => CallMode::BidirectionalStream,
        }
    }

    /// 请求侧是否为可多次推送的流；这类会话登记在可复用的打开调用仓储中。
    pub fn is_write_stream(self) -> bool {
        matches!(self, CallMode::ClientStream | CallMode::BidirectionalStream)
    }

    /// 响应侧是否为流。
    pub fn is_read_stream(self) -> bool {
        matches!(self, CallMode::ServerStream | CallMode::BidirectionalStream)
    }
}

/// 请求或响应消息体。
///
/// `Json` 由传输绑定依据方法的消息描述转码；`Raw` 视为已编码的线上字节。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Payload {
    Json(serde_json::Value),
    Raw(Vec<u8>),
}

impl Payload {
    /// 空消息 `{}`，即所有字段取默认值。
    pub fn empty() -> Self {
        Payload::Json(serde_json::Value::Object(serde_json::Map::new()))
    }
}

/// 方法调用描述符。
///
/// # 契约说明
/// - `id`：会话标识，在同一流上的多次推送间保持不变；
/// - `payload`：可选；写流模式下为空表示只打开（或触碰）调用而不写消息，
///   单请求模式下为空时发送 [`Payload::empty`]；
/// - 提交给一次调用尝试后视为不可变，再次推送需提交新的描述符。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodInvocation {
    pub id: String,
    pub endpoint: String,
    pub definition_path: PathBuf,
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub namespace: String,
    pub service_name: String,
    pub method_name: String,
    pub mode: CallMode,
    #[serde(default)]
    pub payload: Option<Payload>,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
}

impl MethodInvocation {
    /// 以目标地址与定义文件构造描述符，其余字段通过链式方法补齐。
    pub fn new(
        id: impl Into<String>,
        endpoint: impl Into<String>,
        definition_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            definition_path: definition_path.into(),
            include_dirs: Vec::new(),
            namespace: String::new(),
            service_name: String::new(),
            method_name: String::new(),
            mode: CallMode::Unary,
            payload: None,
            metadata: Vec::new(),
        }
    }

    #[must_use]
    pub fn target(
        mut self,
        namespace: impl Into<String>,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        mode: CallMode,
    ) -> Self {
        self.namespace = namespace.into();
        self.service_name = service_name.into();
        self.method_name = method_name.into();
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Vec<MetadataEntry>) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_include_dirs(mut self, include_dirs: Vec<PathBuf>) -> Self {
        self.include_dirs = include_dirs;
        self
    }

    /// 服务身份（命名空间 + 服务名），服务句柄缓存以此为键。
    pub fn service_key(&self) -> ServiceKey {
        ServiceKey::new(self.namespace.clone(), self.service_name.clone())
    }
}
