//! 把加载器与连接器装配到同一个描述符登记表上，并据此构造会话管理器。

use std::sync::Arc;

use spark_probe::{
    ChannelConfig, Connector, DefinitionLoader, ProbeConfig, SessionManager,
};
use tokio::runtime::Handle;

use crate::{
    loader::{DescriptorRegistry, DescriptorSetLoader},
    stub::GrpcConnector,
};

#[derive(Clone, Debug)]
pub struct GrpcBackend {
    loader: Arc<DescriptorSetLoader>,
    connector: Arc<GrpcConnector>,
}

impl GrpcBackend {
    /// `runtime` 用于驱动全部调用任务；调用方负责让运行时活得比管理器久。
    pub fn new(runtime: Handle, channel: &ChannelConfig) -> Self {
        let registry = DescriptorRegistry::default();
        Self {
            loader: Arc::new(DescriptorSetLoader::new(Arc::clone(&registry))),
            connector: Arc::new(GrpcConnector::new(
                runtime,
                registry,
                channel.connect_timeout(),
            )),
        }
    }

    pub fn loader(&self) -> Arc<dyn DefinitionLoader> {
        self.loader.clone()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }

    pub fn session_manager(&self, config: &ProbeConfig) -> SessionManager {
        SessionManager::with_config(self.loader(), self.connector(), config)
    }
}
