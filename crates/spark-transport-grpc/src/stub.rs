//! # 连接器与服务句柄
//!
//! ## 行为契约（What）
//! - [`GrpcConnector::connect`]：按服务全名从 [`DescriptorRegistry`] 取得服务描述，为地址建立
//!   惰性明文通道（首次调用时才真正建连）；未带协议前缀的地址补全为 `http://`；
//! - [`GrpcStub`]：每个方法在调用时按名查找消息描述，构造线上路径与转码器，
//!   随后在运行时上派生一个驱动任务并立即返回调用句柄。
//!
//! ## 注意事项（Trade-offs）
//! - `connect_lazy` 需要处于 Tokio 运行时上下文中，连接器通过持有的 `Handle::enter` 满足这一点，
//!   因此可从任意线程（包括非运行时线程）调用。

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use prost_reflect::ServiceDescriptor;
use spark_probe::{
    CallListener, ChannelSecurity, Connector, MethodDefinition, Payload, ProbeError,
    ServiceDefinition, ServiceStub, TransportCall, WireMetadata,
};
use tokio::runtime::Handle;
use tonic::{
    Request,
    client::Grpc,
    codegen::http::uri::PathAndQuery,
    transport::{Channel, Endpoint},
};
use tracing::debug;

use crate::{
    call::{self, Dispatch, Emitter, GrpcCall},
    codec::MessageTranscoder,
    error::GrpcError,
    loader::DescriptorRegistry,
    metadata::to_metadata_map,
};

/// 地址补全：`host:port` → `http://host:port`，已带协议前缀时原样返回。
pub fn endpoint_uri(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_owned()
    } else {
        format!("http://{endpoint}")
    }
}

#[derive(Clone, Debug)]
pub struct GrpcConnector {
    runtime: Handle,
    registry: DescriptorRegistry,
    connect_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(runtime: Handle, registry: DescriptorRegistry, connect_timeout: Duration) -> Self {
        Self {
            runtime,
            registry,
            connect_timeout,
        }
    }

    fn channel(&self, endpoint: &str) -> Result<Channel, GrpcError> {
        let uri = endpoint_uri(endpoint);
        let builder = Endpoint::from_shared(uri).map_err(|err| GrpcError::Endpoint {
            endpoint: endpoint.to_owned(),
            detail: err.to_string(),
        })?;
        let _runtime = self.runtime.enter();
        Ok(builder.connect_timeout(self.connect_timeout).connect_lazy())
    }
}

impl Connector for GrpcConnector {
    fn connect(
        &self,
        endpoint: &str,
        service: &ServiceDefinition,
        security: ChannelSecurity,
    ) -> Result<Arc<dyn ServiceStub>, ProbeError> {
        match security {
            ChannelSecurity::Plaintext => {}
        }
        let full_name = service.full_name();
        let descriptor = self
            .registry
            .get(&full_name)
            .map(|entry| entry.value().clone())
            .ok_or(GrpcError::UnknownService {
                service: full_name.clone(),
            })?;
        let channel = self.channel(endpoint)?;
        debug!(service = %full_name, %endpoint, "created lazy plaintext channel");
        Ok(Arc::new(GrpcStub {
            runtime: self.runtime.clone(),
            channel,
            service: descriptor,
        }))
    }
}

/// 绑定到某个地址的动态服务句柄。
#[derive(Clone, Debug)]
pub struct GrpcStub {
    runtime: Handle,
    channel: Channel,
    service: ServiceDescriptor,
}

impl GrpcStub {
    fn prepare(&self, method: &MethodDefinition) -> Result<(PathAndQuery, MessageTranscoder), GrpcError> {
        let descriptor = self
            .service
            .methods()
            .find(|candidate| candidate.name() == method.name)
            .ok_or_else(|| GrpcError::UnknownService {
                service: format!("{}/{}", self.service.full_name(), method.name),
            })?;
        let path = method
            .path
            .parse::<PathAndQuery>()
            .map_err(|err| GrpcError::Endpoint {
                endpoint: method.path.clone(),
                detail: err.to_string(),
            })?;
        Ok((
            path,
            MessageTranscoder::new(descriptor.input(), descriptor.output()),
        ))
    }

    fn request<T>(message: T, metadata: &WireMetadata) -> Result<Request<T>, GrpcError> {
        let mut request = Request::new(message);
        *request.metadata_mut() = to_metadata_map(metadata)?;
        Ok(request)
    }

    fn open(
        &self,
        path: PathAndQuery,
        transcoder: MessageTranscoder,
        listener: CallListener,
        outbound: Option<UnboundedSender<Bytes>>,
    ) -> (Dispatch, Arc<GrpcCall>) {
        let emitter = Emitter::new(listener);
        let call = Arc::new(GrpcCall::new(
            transcoder.clone(),
            outbound,
            Arc::clone(&emitter),
        ));
        let dispatch = Dispatch {
            grpc: Grpc::new(self.channel.clone()),
            path,
            transcoder,
            emitter,
        };
        (dispatch, call)
    }

    fn single_request(
        &self,
        method: &MethodDefinition,
        payload: &Payload,
        metadata: &WireMetadata,
        listener: CallListener,
    ) -> Result<(Dispatch, Arc<GrpcCall>, Request<Bytes>), GrpcError> {
        let (path, transcoder) = self.prepare(method)?;
        let request = Self::request(transcoder.encode(payload)?, metadata)?;
        let (dispatch, call) = self.open(path, transcoder, listener, None);
        Ok((dispatch, call, request))
    }

    fn streaming_request(
        &self,
        method: &MethodDefinition,
        metadata: &WireMetadata,
        listener: CallListener,
    ) -> Result<(Dispatch, Arc<GrpcCall>, Request<UnboundedReceiver<Bytes>>), GrpcError> {
        let (path, transcoder) = self.prepare(method)?;
        let (sender, receiver) = unbounded::<Bytes>();
        let request = Self::request(receiver, metadata)?;
        let (dispatch, call) = self.open(path, transcoder, listener, Some(sender));
        Ok((dispatch, call, request))
    }
}

impl ServiceStub for GrpcStub {
    fn unary(
        &self,
        method: &MethodDefinition,
        payload: Payload,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Result<Arc<dyn TransportCall>, ProbeError> {
        let (dispatch, handle, request) = self.single_request(method, &payload, &metadata, listener)?;
        handle.attach(self.runtime.spawn(call::unary(dispatch, request)).abort_handle());
        Ok(handle)
    }

    fn server_stream(
        &self,
        method: &MethodDefinition,
        payload: Payload,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Result<Arc<dyn TransportCall>, ProbeError> {
        let (dispatch, handle, request) = self.single_request(method, &payload, &metadata, listener)?;
        handle.attach(
            self.runtime
                .spawn(call::server_stream(dispatch, request))
                .abort_handle(),
        );
        Ok(handle)
    }

    fn client_stream(
        &self,
        method: &MethodDefinition,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Result<Arc<dyn TransportCall>, ProbeError> {
        let (dispatch, handle, request) = self.streaming_request(method, &metadata, listener)?;
        handle.attach(
            self.runtime
                .spawn(call::client_stream(dispatch, request))
                .abort_handle(),
        );
        Ok(handle)
    }

    fn bidi_stream(
        &self,
        method: &MethodDefinition,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Result<Arc<dyn TransportCall>, ProbeError> {
        let (dispatch, handle, request) = self.streaming_request(method, &metadata, listener)?;
        handle.attach(
            self.runtime
                .spawn(call::bidi_stream(dispatch, request))
                .abort_handle(),
        );
        Ok(handle)
    }
}
