#![doc = r#"
# spark-transport-grpc

## 设计动机（Why）
- **定位**：为 `spark-probe` 的调用会话核心提供基于 Tokio/tonic 的传输绑定，
  以及读取描述符集（`FileDescriptorSet`）的定义加载器；
- **架构角色**：核心只认识 `DefinitionLoader`/`Connector`/`ServiceStub`/`TransportCall`
  四个 trait，本 crate 是它们的生产实现，并附带 `spark-probe-bridge` 进程桥。

## 核心契约（What）
- 请求/响应以 `prost-reflect` 的 `DynamicMessage` 在 JSON 与 protobuf 之间转码，
  无需为目标服务生成代码；
- 每个调用由运行时上的一个任务驱动，事件经核心提供的监听器送回；
- 通道仅支持明文，TLS 不在本 crate 范围内。

## 实现策略（How）
- `tonic::client::Grpc` 搭配透传字节的 `RawCodec`，覆盖 unary / server streaming /
  client streaming / bidi streaming 四种形态；
- 写流形态的请求流是 `futures` 无界通道，`end()` 关闭通道即半关闭。

## 风险与考量（Trade-offs）
- **惰性建连**：通道以 `connect_lazy` 创建，地址不可达时在首个调用上以
  `UNAVAILABLE` 终态暴露，而不是在解析阶段失败；
- **无界请求队列**：推送频率由界面操作决定，当前不设背压。
"#]

mod backend;
mod call;
pub mod bridge;
pub mod codec;
pub mod error;
pub mod loader;
pub mod logging;
pub mod metadata;
mod stub;

pub use backend::GrpcBackend;
pub use call::GrpcCall;
pub use error::GrpcError;
pub use loader::{DescriptorRegistry, DescriptorSetLoader};
pub use stub::{GrpcConnector, GrpcStub, endpoint_uri};
