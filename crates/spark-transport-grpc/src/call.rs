//! # 传输级调用
//!
//! ## 行为契约（What）
//! - 每个调用在 Tokio 运行时上由一个任务驱动，任务把响应帧、错误与终态经 [`Emitter`]
//!   转发给核心提供的监听器；
//! - 终态恰好发出一次：正常结束、服务端错误、本地转码失败与 `cancel()` 四条路径共享同一个
//!   一次性标志，先到者生效；
//! - 写流形态的请求流是一个无界通道，`write` 入队，`end()` 关闭通道即半关闭；
//! - 头部元数据与 trailers 按先后顺序合并后随终态送出。

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender};
use parking_lot::Mutex;
use spark_probe::{
    CallListener, CallStatus, Payload, ProbeError, StatusCode, TransportCall, TransportEvent,
    WireMetadata,
};
use tokio::task::AbortHandle;
use tonic::{
    Request, Response, Status, Streaming, client::Grpc, codegen::http::uri::PathAndQuery,
    transport::Channel,
};
use tracing::trace;

use crate::{
    codec::{MessageTranscoder, RawCodec},
    error::GrpcError,
    metadata::from_metadata_map,
};

/// 把事件交给监听器，并保证终态只发出一次。
pub(crate) struct Emitter {
    listener: CallListener,
    finished: AtomicBool,
}

impl Emitter {
    pub(crate) fn new(listener: CallListener) -> Arc<Self> {
        Arc::new(Self {
            listener,
            finished: AtomicBool::new(false),
        })
    }

    fn data(&self, payload: Payload) {
        if !self.finished.load(Ordering::SeqCst) {
            (self.listener)(TransportEvent::Data(payload));
        }
    }

    fn error(&self, detail: String) {
        if !self.finished.load(Ordering::SeqCst) {
            (self.listener)(TransportEvent::Error(detail));
        }
    }

    fn finish(&self, status: CallStatus) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            (self.listener)(TransportEvent::Status(status));
        }
    }

    /// 服务端或通道给出的失败状态；状态自带的元数据追加在已收到的头部之后。
    fn fail(&self, status: &Status, mut metadata: WireMetadata) {
        metadata.extend(from_metadata_map(status.metadata()));
        self.error(status.message().to_owned());
        self.finish(CallStatus::new(
            status.code() as u32,
            status.message(),
            metadata,
        ));
    }

    /// 本地转码失败，以 `INTERNAL` 终结调用。
    fn fail_local(&self, err: GrpcError, metadata: WireMetadata) {
        let detail = err.to_string();
        self.error(detail.clone());
        self.finish(CallStatus::new(StatusCode::Internal.as_u32(), detail, metadata));
    }
}

/// 驱动任务的中止句柄；`cancel` 先于 `attach` 到达时，任务在挂接时即被中止。
#[derive(Default)]
struct TaskSlot {
    handle: Option<AbortHandle>,
    cancelled: bool,
}

/// 单个 gRPC 调用的句柄。
pub struct GrpcCall {
    transcoder: MessageTranscoder,
    outbound: Option<UnboundedSender<Bytes>>,
    task: Mutex<TaskSlot>,
    emitter: Arc<Emitter>,
}

impl GrpcCall {
    pub(crate) fn new(
        transcoder: MessageTranscoder,
        outbound: Option<UnboundedSender<Bytes>>,
        emitter: Arc<Emitter>,
    ) -> Self {
        Self {
            transcoder,
            outbound,
            task: Mutex::new(TaskSlot::default()),
            emitter,
        }
    }

    pub(crate) fn attach(&self, task: AbortHandle) {
        let mut slot = self.task.lock();
        if slot.cancelled {
            task.abort();
        } else {
            slot.handle = Some(task);
        }
    }
}

impl TransportCall for GrpcCall {
    fn write(&self, payload: Payload) -> Result<(), ProbeError> {
        let Some(sender) = &self.outbound else {
            return Err(GrpcError::Closed {
                detail: "single-request calls take exactly one message".to_owned(),
            }
            .into());
        };
        let frame = self.transcoder.encode(&payload)?;
        sender
            .unbounded_send(frame)
            .map_err(|_| GrpcError::Closed {
                detail: "request stream already ended".to_owned(),
            })?;
        trace!(message = %self.transcoder.input().full_name(), "queued request frame");
        Ok(())
    }

    fn end(&self) {
        if let Some(sender) = &self.outbound {
            sender.close_channel();
        }
    }

    fn cancel(&self) {
        {
            let mut slot = self.task.lock();
            slot.cancelled = true;
            if let Some(task) = slot.handle.take() {
                task.abort();
            }
        }
        self.end();
        self.emitter.finish(CallStatus::new(
            StatusCode::Cancelled.as_u32(),
            "cancelled by client",
            WireMetadata::new(),
        ));
    }
}

impl std::fmt::Debug for GrpcCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcCall")
            .field("input", &self.transcoder.input().full_name())
            .field("output", &self.transcoder.output().full_name())
            .field("streaming_request", &self.outbound.is_some())
            .finish_non_exhaustive()
    }
}

/// 驱动任务所需的全部上下文。
pub(crate) struct Dispatch {
    pub(crate) grpc: Grpc<Channel>,
    pub(crate) path: PathAndQuery,
    pub(crate) transcoder: MessageTranscoder,
    pub(crate) emitter: Arc<Emitter>,
}

async fn ready(grpc: &mut Grpc<Channel>) -> Result<(), Status> {
    grpc.ready()
        .await
        .map_err(|err| Status::unavailable(format!("channel not ready: {err}")))
}

fn complete_single(dispatch: &Dispatch, result: Result<Response<Bytes>, Status>) {
    match result {
        Ok(response) => {
            let (headers, body, _) = response.into_parts();
            let metadata = from_metadata_map(&headers);
            match dispatch.transcoder.decode(body) {
                Ok(payload) => {
                    dispatch.emitter.data(payload);
                    dispatch.emitter.finish(CallStatus::ok(metadata));
                }
                Err(err) => dispatch.emitter.fail_local(err, metadata),
            }
        }
        Err(status) => dispatch.emitter.fail(&status, WireMetadata::new()),
    }
}

async fn drain(
    transcoder: &MessageTranscoder,
    emitter: &Emitter,
    result: Result<Response<Streaming<Bytes>>, Status>,
) {
    let response = match result {
        Ok(response) => response,
        Err(status) => return emitter.fail(&status, WireMetadata::new()),
    };
    let (headers, mut stream, _) = response.into_parts();
    let mut metadata = from_metadata_map(&headers);
    loop {
        match stream.message().await {
            Ok(Some(frame)) => match transcoder.decode(frame) {
                Ok(payload) => emitter.data(payload),
                Err(err) => return emitter.fail_local(err, metadata),
            },
            Ok(None) => break,
            Err(status) => return emitter.fail(&status, metadata),
        }
    }
    match stream.trailers().await {
        Ok(Some(trailers)) => metadata.extend(from_metadata_map(&trailers)),
        Ok(None) => {}
        Err(status) => return emitter.fail(&status, metadata),
    }
    emitter.finish(CallStatus::ok(metadata));
}

pub(crate) async fn unary(mut dispatch: Dispatch, request: Request<Bytes>) {
    if let Err(status) = ready(&mut dispatch.grpc).await {
        return dispatch.emitter.fail(&status, WireMetadata::new());
    }
    let result = dispatch
        .grpc
        .unary(request, dispatch.path.clone(), RawCodec)
        .await;
    complete_single(&dispatch, result);
}

pub(crate) async fn server_stream(mut dispatch: Dispatch, request: Request<Bytes>) {
    if let Err(status) = ready(&mut dispatch.grpc).await {
        return dispatch.emitter.fail(&status, WireMetadata::new());
    }
    let result = dispatch
        .grpc
        .server_streaming(request, dispatch.path.clone(), RawCodec)
        .await;
    drain(&dispatch.transcoder, &dispatch.emitter, result).await;
}

pub(crate) async fn client_stream(
    mut dispatch: Dispatch,
    request: Request<UnboundedReceiver<Bytes>>,
) {
    if let Err(status) = ready(&mut dispatch.grpc).await {
        return dispatch.emitter.fail(&status, WireMetadata::new());
    }
    let result = dispatch
        .grpc
        .client_streaming(request, dispatch.path.clone(), RawCodec)
        .await;
    complete_single(&dispatch, result);
}

pub(crate) async fn bidi_stream(mut dispatch: Dispatch, request: Request<UnboundedReceiver<Bytes>>) {
    if let Err(status) = ready(&mut dispatch.grpc).await {
        return dispatch.emitter.fail(&status, WireMetadata::new());
    }
    let result = dispatch
        .grpc
        .streaming(request, dispatch.path.clone(), RawCodec)
        .await;
    drain(&dispatch.transcoder, &dispatch.emitter, result).await;
}
