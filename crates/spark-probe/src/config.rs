//! # 运行配置（ProbeConfig）
//!
//! ## 行为契约（What）
//! - 以 TOML 描述日志过滤、默认 include 目录与通道参数；所有段落与字段均可省略，缺省取默认值；
//! - 未知字段直接拒绝，避免拼写错误被静默忽略；
//! - 解析/读取失败统一映射为 [`ProbeError::Config`]。
//!
//! ```toml
//! [log]
//! filter = "info"
//!
//! [definitions]
//! include_dirs = ["./protos"]
//!
//! [channel]
//! security = "plaintext"
//! connect_timeout_ms = 5000
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{error::ProbeError, transport::ChannelSecurity};

const DEFAULT_FILTER: &str = "info";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// 顶层配置。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    pub log: LogConfig,
    pub definitions: DefinitionsConfig,
    pub channel: ChannelConfig,
}

/// 日志配置；`filter` 采用 `tracing-subscriber` 的 `EnvFilter` 语法。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_owned(),
        }
    }
}

/// 定义加载配置。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefinitionsConfig {
    /// 追加在每个描述符自带 include 目录之后。
    pub include_dirs: Vec<PathBuf>,
}

/// 通道配置。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    pub security: ChannelSecurity,
    pub connect_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            security: ChannelSecurity::default(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl ChannelConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl ProbeConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ProbeError> {
        toml::from_str(raw).map_err(|err| ProbeError::Config {
            detail: err.to_string(),
        })
    }

    /// 读取并解析配置文件。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProbeError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| ProbeError::Config {
            detail: format!("failed to read `{}`: {err}", path.display()),
        })?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ProbeConfig::from_toml_str("").expect("空配置应可解析");
        assert_eq!(config, ProbeConfig::default());
        assert_eq!(config.log.filter, "info");
        assert_eq!(config.channel.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.channel.security, ChannelSecurity::Plaintext);
    }

    #[test]
    fn sections_override_defaults() {
        let config = ProbeConfig::from_toml_str(
            r#"
            [log]
            filter = "spark_probe=debug"

            [definitions]
            include_dirs = ["./protos", "/opt/protos"]

            [channel]
            security = "plaintext"
            connect_timeout_ms = 250
            "#,
        )
        .expect("完整配置应可解析");
        assert_eq!(config.log.filter, "spark_probe=debug");
        assert_eq!(
            config.definitions.include_dirs,
            vec![PathBuf::from("./protos"), PathBuf::from("/opt/protos")]
        );
        assert_eq!(config.channel.connect_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ProbeConfig::from_toml_str("[channel]\ntls = true\n").unwrap_err();
        assert!(matches!(err, ProbeError::Config { .. }));
        let err = ProbeConfig::from_toml_str("[channel]\nsecurity = \"mtls\"\n").unwrap_err();
        assert!(matches!(err, ProbeError::Config { .. }));
    }

    #[test]
    fn missing_file_maps_to_config_error() {
        let err = ProbeConfig::load("/definitely/not/here/probe.toml").unwrap_err();
        match err {
            ProbeError::Config { detail } => assert!(detail.contains("probe.toml")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
