//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为调用会话核心对外暴露的错误语义提供集中定义：解析期（定义/服务/方法缺失）、
//!   会话期（会话不存在、调用模式冲突）、元数据与编解码、传输与配置；
//! - 每一类都是单次调用的正常、可恢复结果，核心内部不存在需要中止进程的条件。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，可直接交给 `anyhow` 等上层框架；
//! - 变体携带可读上下文（会话标识、服务名、路径），便于界面直接展示；
//! - 传输层终态失败（非零状态码）不走本枚举，而是作为
//!   [`CallOutcome::Failed`](crate::core::CallOutcome::Failed) 送达通知接收端。

use thiserror::Error;

use crate::{codec::CodecError, descriptor::CallMode};

/// 调用会话核心错误域。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - 全部变体为 `Clone + Send + Sync + 'static`，可在事件回调与调用方之间自由传递；
///   - `DefinitionNotFound`/`ServiceNotFound`/`MethodNotFound` 在发起调用之前返回，不做重试；
///   - `SessionNotFound` 表示关闭或推送引用了不存在的会话，属于可提示、非致命的情形。
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProbeError {
    /// 接口定义文件无法加载。
    #[error("interface definition `{path}` could not be loaded: {detail}")]
    DefinitionNotFound { path: String, detail: String },

    /// 命名空间/服务路径在已加载的定义中不存在。
    #[error("service `{service}` not found in namespace `{namespace}`")]
    ServiceNotFound { namespace: String, service: String },

    /// 服务上不存在指定方法。
    #[error("method `{method}` not found on service `{service}`")]
    MethodNotFound { service: String, method: String },

    /// 显式关闭或推送时未命中会话仓储。
    #[error("session `{session_id}` is not registered")]
    SessionNotFound { session_id: String },

    /// 请求的调用模式与已打开会话或方法声明不一致。
    #[error("session `{session_id}` expects {expected:?} but {requested:?} was requested")]
    CallModeMismatch {
        session_id: String,
        expected: CallMode,
        requested: CallMode,
    },

    /// 出站元数据条目非法。
    #[error("invalid metadata entry `{key}`: {reason}")]
    InvalidMetadata { key: String, reason: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// 传输绑定在建立调用或写入消息时失败。
    #[error("transport failure during `{context}`: {detail}")]
    Transport { context: String, detail: String },

    /// 配置文件读取或解析失败。
    #[error("configuration error: {detail}")]
    Config { detail: String },
}

impl ProbeError {
    /// 构造传输错误，`context` 使用点分阶段名，例如 `"call.write"`。
    pub fn transport(context: impl Into<String>, detail: impl Into<String>) -> Self {
        ProbeError::Transport {
            context: context.into(),
            detail: detail.into(),
        }
    }
}
