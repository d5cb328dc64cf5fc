//! # 接口定义树
//!
//! 定义加载器（外部协作方）把接口定义文件读成 命名空间 → 服务 → 方法 的可导航结构，
//! 服务解析器只依赖这里的类型，不关心定义文件的具体格式。

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::{descriptor::CallMode, error::ProbeError};

/// 单个方法的结构描述。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodDefinition {
    pub name: String,
    pub mode: CallMode,
    /// 线上路径，形如 `/pkg.Service/Method`。
    pub path: String,
    pub input_type: String,
    pub output_type: String,
}

impl MethodDefinition {
    pub fn new(namespace: &str, service: &str, name: impl Into<String>, mode: CallMode) -> Self {
        let name = name.into();
        let path = format!("/{}/{}", qualified_name(namespace, service), name);
        Self {
            name,
            mode,
            path,
            input_type: String::new(),
            output_type: String::new(),
        }
    }

    #[must_use]
    pub fn with_types(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.input_type = input.into();
        self.output_type = output.into();
        self
    }
}

/// 服务的结构描述。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceDefinition {
    namespace: String,
    name: String,
    methods: Vec<MethodDefinition>,
}

impl ServiceDefinition {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        methods: Vec<MethodDefinition>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            methods,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 带命名空间的全名，例如 `helloworld.Greeter`；根命名空间下即服务名本身。
    pub fn full_name(&self) -> String {
        qualified_name(&self.namespace, &self.name)
    }

    pub fn methods(&self) -> &[MethodDefinition] {
        &self.methods
    }
}

fn qualified_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_owned()
    } else {
        format!("{namespace}.{name}")
    }
}

/// 已加载定义的可导航树；空字符串命名空间即根。
#[derive(Clone, Debug, Default)]
pub struct DefinitionTree {
    namespaces: BTreeMap<String, BTreeMap<String, ServiceDefinition>>,
}

impl DefinitionTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入服务；同名服务以后插入者为准。
    pub fn insert(&mut self, service: ServiceDefinition) {
        self.namespaces
            .entry(service.namespace.clone())
            .or_default()
            .insert(service.name.clone(), service);
    }

    /// 命名空间为空时直接在根下查找，否则先定位命名空间再按服务名查找。
    pub fn lookup(&self, namespace: &str, service: &str) -> Option<&ServiceDefinition> {
        self.namespaces.get(namespace)?.get(service)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.namespaces.values().flat_map(BTreeMap::values)
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.values().all(BTreeMap::is_empty)
    }
}

/// 定义加载器：给定文件路径与 include 搜索目录，返回定义树。
///
/// 文件无法定位或无法解析时返回 [`ProbeError::DefinitionNotFound`]。
pub trait DefinitionLoader: Send + Sync {
    fn load(&self, path: &Path, include_dirs: &[PathBuf]) -> Result<DefinitionTree, ProbeError>;
}
