//! # spark-probe
//!
//! ## 定位与职责（Why）
//! - 交互式 RPC 探测工具的调用会话核心：把方法调用描述符转换为四种调用形态之一
//!   （一元、服务端流、客户端流、双向流），按会话标识跟踪在途调用，使同一流上的重复推送
//!   复用同一个传输级调用；
//! - 在原始字节与多种宽度/字节序的数值之间转换二进制元数据。
//!
//! ## 架构嵌入（Where）
//! - `codec`：无状态的二进制数值编解码；
//! - `metadata`：界面侧有序条目与传输侧容器之间的翻译；
//! - `definition` / `transport`：外部协作方（定义加载器、RPC 客户端库）的 trait 契约；
//! - `resolver`：服务句柄解析与缓存；
//! - `core`：会话状态与会话管理器；
//! - `config` / `error`：运行配置与错误域。
//!
//! ## 运行时策略（Trade-offs）
//! - 本 crate 不依赖任何异步运行时，事件经由传输绑定的回调同步转发；
//!   基于 tokio/tonic 的绑定位于 `spark-transport-grpc`。

pub mod codec;
pub mod config;
pub mod core;
pub mod definition;
pub mod descriptor;
pub mod error;
pub mod metadata;
pub mod resolver;
pub mod transport;

pub use crate::{
    codec::{CodecError, DecodedValue, NumericFormat, NumericKind, NumericValue},
    config::{ChannelConfig, DefinitionsConfig, LogConfig, ProbeConfig},
    core::{
        CallHandle, CallOutcome, CallSink, ChannelSink, Disposition, SessionEvent, SessionManager,
    },
    definition::{DefinitionLoader, DefinitionTree, MethodDefinition, ServiceDefinition},
    descriptor::{CallMode, MethodInvocation, Payload},
    error::ProbeError,
    metadata::{MetadataEntry, MetadataValue, WireMetadata},
    resolver::{ServiceHandle, ServiceKey, ServiceResolver},
    transport::{
        CallListener, CallStatus, ChannelSecurity, Connector, ServiceStub, StatusCode,
        TransportCall, TransportEvent,
    },
};
