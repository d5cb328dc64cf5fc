//! # 服务解析（Service Resolver）
//!
//! ## 行为契约（What）
//! - `resolve`：加载定义 → 按命名空间/服务名导航 → 以明文通道绑定地址 → 缓存句柄；
//! - 缓存以 (命名空间, 服务名) 为键；命中且地址一致时直接复用，地址变化时丢弃旧句柄并重建；
//!   除地址变化外没有其它失效途径；
//! - 句柄在解析时一次性构建 方法名 → 方法定义 的映射表，调用期按名查表，不依赖运行时反射。

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use tracing::debug;

use crate::{
    definition::{DefinitionLoader, MethodDefinition, ServiceDefinition},
    descriptor::MethodInvocation,
    error::ProbeError,
    transport::{ChannelSecurity, Connector, ServiceStub},
};

/// 服务身份。
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ServiceKey {
    namespace: String,
    service: String,
}

impl ServiceKey {
    pub fn new(namespace: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            service: service.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

/// 绑定到某个地址的可调用服务句柄。
pub struct ServiceHandle {
    endpoint: Arc<str>,
    service: ServiceDefinition,
    methods: HashMap<String, MethodDefinition>,
    stub: Arc<dyn ServiceStub>,
}

impl ServiceHandle {
    pub fn new(endpoint: &str, service: ServiceDefinition, stub: Arc<dyn ServiceStub>) -> Self {
        let methods = service
            .methods()
            .iter()
            .map(|method| (method.name.clone(), method.clone()))
            .collect();
        Self {
            endpoint: Arc::from(endpoint),
            service,
            methods,
            stub,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn service(&self) -> &ServiceDefinition {
        &self.service
    }

    pub fn stub(&self) -> &Arc<dyn ServiceStub> {
        &self.stub
    }

    /// 按方法名查表。
    pub fn method(&self, name: &str) -> Result<&MethodDefinition, ProbeError> {
        self.methods
            .get(name)
            .ok_or_else(|| ProbeError::MethodNotFound {
                service: self.service.full_name(),
                method: name.to_owned(),
            })
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("endpoint", &self.endpoint)
            .field("service", &self.service.full_name())
            .field("methods", &self.methods.len())
            .finish_non_exhaustive()
    }
}

/// 服务解析器，持有进程级的服务句柄缓存。
pub struct ServiceResolver {
    loader: Arc<dyn DefinitionLoader>,
    connector: Arc<dyn Connector>,
    security: ChannelSecurity,
    default_include_dirs: Vec<PathBuf>,
    handles: DashMap<ServiceKey, Arc<ServiceHandle>>,
}

impl ServiceResolver {
    pub fn new(loader: Arc<dyn DefinitionLoader>, connector: Arc<dyn Connector>) -> Self {
        Self {
            loader,
            connector,
            security: ChannelSecurity::default(),
            default_include_dirs: Vec::new(),
            handles: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_security(mut self, security: ChannelSecurity) -> Self {
        self.security = security;
        self
    }

    /// 追加到每个描述符 include 目录之后的默认搜索目录。
    #[must_use]
    pub fn with_include_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.default_include_dirs = dirs;
        self
    }

    /// 解析描述符对应的服务句柄。
    ///
    /// # 契约说明
    /// - 定义无法加载返回 [`ProbeError::DefinitionNotFound`]（由加载器给出）；
    /// - 命名空间/服务不存在返回 [`ProbeError::ServiceNotFound`]；
    /// - 成功后缓存中该服务身份对应的条目绑定到 `invocation.endpoint`。
    pub fn resolve(&self, invocation: &MethodInvocation) -> Result<Arc<ServiceHandle>, ProbeError> {
        let key = invocation.service_key();
        let cached = self
            .handles
            .get(&key)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(handle) = cached {
            if handle.endpoint() == invocation.endpoint {
                return Ok(handle);
            }
            debug!(
                service = %handle.service().full_name(),
                from = %handle.endpoint(),
                to = %invocation.endpoint,
                "endpoint changed, rebinding service handle"
            );
        }

        let include_dirs = self.include_dirs_for(&invocation.include_dirs);
        let handle = Arc::new(self.bind(&key, &invocation.definition_path, &include_dirs, &invocation.endpoint)?);
        self.handles.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    fn include_dirs_for(&self, requested: &[PathBuf]) -> Vec<PathBuf> {
        let mut dirs = requested.to_vec();
        dirs.extend(
            self.default_include_dirs
                .iter()
                .filter(|dir| !requested.contains(dir))
                .cloned(),
        );
        dirs
    }

    fn bind(
        &self,
        key: &ServiceKey,
        definition_path: &Path,
        include_dirs: &[PathBuf],
        endpoint: &str,
    ) -> Result<ServiceHandle, ProbeError> {
        let tree = self.loader.load(definition_path, include_dirs)?;
        let service = tree
            .lookup(key.namespace(), key.service())
            .cloned()
            .ok_or_else(|| ProbeError::ServiceNotFound {
                namespace: key.namespace().to_owned(),
                service: key.service().to_owned(),
            })?;
        let stub = self.connector.connect(endpoint, &service, self.security)?;
        debug!(service = %service.full_name(), %endpoint, "bound service handle");
        Ok(ServiceHandle::new(endpoint, service, stub))
    }

    /// 当前缓存的服务句柄数量。
    pub fn cached_handles(&self) -> usize {
        self.handles.len()
    }
}

impl std::fmt::Debug for ServiceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceResolver")
            .field("security", &self.security)
            .field("default_include_dirs", &self.default_include_dirs)
            .field("cached_handles", &self.handles.len())
            .finish_non_exhaustive()
    }
}
