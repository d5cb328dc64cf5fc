//! 进程级日志初始化。
//!
//! 过滤规则优先取 `RUST_LOG`，其次取配置中的 `[log] filter`，两者都无法解析时回退到 `info`。
//! 日志写入 stderr，stdout 留给 JSON-lines 事件流。

use spark_probe::LogConfig;
use tracing_subscriber::{
    EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
};

pub fn build_env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 安装全局订阅器；重复安装返回错误。
pub fn install_tracing(config: &LogConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(build_env_filter(config))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
}
