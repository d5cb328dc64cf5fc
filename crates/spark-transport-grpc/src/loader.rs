//! # 描述符集加载器
//!
//! ## 行为契约（What）
//! - 读取 `protoc --include_imports --descriptor_set_out` 产出的 `FileDescriptorSet`
//!   （`.pb`/`.protoset`），构建 命名空间（protobuf package）→ 服务 → 方法 的定义树；
//! - 路径定位顺序：绝对路径或相对当前目录可直接命中时使用之，否则依次在 include 目录下查找；
//! - 每个服务的 [`ServiceDescriptor`] 同时登记到共享的 [`DescriptorRegistry`]，
//!   供连接器在调用期取得请求/响应的消息描述。

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use prost_reflect::{DescriptorPool, ServiceDescriptor};
use spark_probe::{
    CallMode, DefinitionLoader, DefinitionTree, MethodDefinition, ProbeError, ServiceDefinition,
};
use tracing::debug;

use crate::error::GrpcError;

/// 服务全名 → 服务描述。
pub type DescriptorRegistry = Arc<DashMap<String, ServiceDescriptor>>;

#[derive(Clone, Debug, Default)]
pub struct DescriptorSetLoader {
    registry: DescriptorRegistry,
}

impl DescriptorSetLoader {
    pub fn new(registry: DescriptorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    fn read_pool(&self, path: &Path, include_dirs: &[PathBuf]) -> Result<DescriptorPool, GrpcError> {
        let located = locate(path, include_dirs).ok_or_else(|| GrpcError::Descriptor {
            path: path.to_path_buf(),
            detail: format!(
                "file not found in working directory or {} include dir(s)",
                include_dirs.len()
            ),
        })?;
        let bytes = fs::read(&located).map_err(|source| GrpcError::Io {
            path: located.clone(),
            source,
        })?;
        DescriptorPool::decode(bytes.as_slice()).map_err(|err| GrpcError::Descriptor {
            path: located,
            detail: err.to_string(),
        })
    }
}

fn locate(path: &Path, include_dirs: &[PathBuf]) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if path.is_absolute() {
        return None;
    }
    include_dirs
        .iter()
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.is_file())
}

/// 把服务描述转换为核心的服务定义。
pub fn service_definition(service: &ServiceDescriptor) -> ServiceDefinition {
    let namespace = service.package_name();
    let methods = service
        .methods()
        .map(|method| {
            MethodDefinition::new(
                namespace,
                service.name(),
                method.name(),
                CallMode::from_flags(method.is_client_streaming(), method.is_server_streaming()),
            )
            .with_types(method.input().full_name(), method.output().full_name())
        })
        .collect();
    ServiceDefinition::new(namespace, service.name(), methods)
}

impl DefinitionLoader for DescriptorSetLoader {
    fn load(&self, path: &Path, include_dirs: &[PathBuf]) -> Result<DefinitionTree, ProbeError> {
        let pool = self.read_pool(path, include_dirs)?;
        let mut tree = DefinitionTree::new();
        for service in pool.services() {
            tree.insert(service_definition(&service));
            self.registry.insert(service.full_name().to_owned(), service);
        }
        debug!(path = %path.display(), services = tree.services().count(), "loaded descriptor set");
        Ok(tree)
    }
}
