//! 集成测试共享的内存传输：记录每个调用收到的写入、半关闭与取消，并允许测试按需注入事件。

#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use spark_probe::{
    CallListener, CallMode, CallOutcome, CallSink, CallStatus, ChannelSecurity, Connector,
    DefinitionLoader, DefinitionTree, MethodDefinition, MethodInvocation, Payload, ProbeError,
    ServiceDefinition, ServiceResolver, ServiceStub, SessionManager, TransportCall,
    TransportEvent, WireMetadata,
};

pub const NAMESPACE: &str = "probe.v1";
pub const SERVICE: &str = "Echo";
pub const ENDPOINT: &str = "127.0.0.1:50051";

/// `probe.v1.Echo`：每种调用形态各一个方法。
pub fn echo_tree() -> DefinitionTree {
    let method = |name: &str, mode| {
        MethodDefinition::new(NAMESPACE, SERVICE, name, mode)
            .with_types("probe.v1.EchoRequest", "probe.v1.EchoReply")
    };
    let mut tree = DefinitionTree::new();
    tree.insert(ServiceDefinition::new(
        NAMESPACE,
        SERVICE,
        vec![
            method("Say", CallMode::Unary),
            method("Watch", CallMode::ServerStream),
            method("Upload", CallMode::ClientStream),
            method("Chat", CallMode::BidirectionalStream),
        ],
    ));
    tree
}

pub struct FakeLoader {
    tree: DefinitionTree,
    pub loads: AtomicUsize,
}

impl DefinitionLoader for FakeLoader {
    fn load(&self, path: &Path, _include_dirs: &[PathBuf]) -> Result<DefinitionTree, ProbeError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if path.ends_with("missing.pb") {
            return Err(ProbeError::DefinitionNotFound {
                path: path.display().to_string(),
                detail: "no such file".to_owned(),
            });
        }
        Ok(self.tree.clone())
    }
}

/// 一个被记录的传输级调用。
pub struct FakeCall {
    pub mode: CallMode,
    pub path: String,
    pub metadata: WireMetadata,
    pub request: Option<Payload>,
    pub writes: Mutex<Vec<Payload>>,
    pub ended: AtomicBool,
    pub cancelled: AtomicBool,
    finish_on_write: AtomicBool,
    listener: CallListener,
}

impl FakeCall {
    pub fn emit_data(&self, payload: Payload) {
        (self.listener)(TransportEvent::Data(payload));
    }

    pub fn emit_error(&self, detail: &str) {
        (self.listener)(TransportEvent::Error(detail.to_owned()));
    }

    pub fn emit_status(&self, code: u32, details: &str) {
        let mut trailers = WireMetadata::new();
        trailers.append_text("x-served-by", "fake");
        (self.listener)(TransportEvent::Status(CallStatus::new(code, details, trailers)));
    }

    pub fn writes(&self) -> Vec<Payload> {
        self.writes.lock().unwrap().clone()
    }

    pub fn ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 下一次 `write` 先送达成功终态并半关闭，随后该写入失败。
    pub fn finish_on_next_write(&self) {
        self.finish_on_write.store(true, Ordering::SeqCst);
    }
}

impl TransportCall for FakeCall {
    fn write(&self, payload: Payload) -> Result<(), ProbeError> {
        if self.finish_on_write.swap(false, Ordering::SeqCst) {
            self.emit_status(0, "");
            self.end();
        }
        if self.ended() || self.cancelled() {
            return Err(ProbeError::transport("call.write", "call already closed"));
        }
        self.writes.lock().unwrap().push(payload);
        Ok(())
    }

    fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// 记录全部调用的服务句柄；可配置一元调用在返回前同步失败。
#[derive(Default)]
pub struct FakeStub {
    calls: Mutex<Vec<Arc<FakeCall>>>,
    unary_failure: Mutex<Option<(u32, String)>>,
    stream_failure: Mutex<Option<(u32, String)>>,
}

impl FakeStub {
    pub fn fail_unary_with(&self, code: u32, details: &str) {
        *self.unary_failure.lock().unwrap() = Some((code, details.to_owned()));
    }

    /// 写流形态（ClientStream/BidirectionalStream）在打开时同步失败。
    pub fn fail_streams_with(&self, code: u32, details: &str) {
        *self.stream_failure.lock().unwrap() = Some((code, details.to_owned()));
    }

    fn fail_stream(&self, call: &FakeCall) {
        let failure = self.stream_failure.lock().unwrap().clone();
        if let Some((code, details)) = failure {
            call.emit_error(&details);
            call.emit_status(code, &details);
        }
    }

    pub fn calls(&self) -> Vec<Arc<FakeCall>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call(&self, index: usize) -> Arc<FakeCall> {
        Arc::clone(&self.calls.lock().unwrap()[index])
    }

    fn open(
        &self,
        method: &MethodDefinition,
        request: Option<Payload>,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Arc<FakeCall> {
        let call = Arc::new(FakeCall {
            mode: method.mode,
            path: method.path.clone(),
            metadata,
            request,
            writes: Mutex::new(Vec::new()),
            ended: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            finish_on_write: AtomicBool::new(false),
            listener,
        });
        self.calls.lock().unwrap().push(Arc::clone(&call));
        call
    }
}

impl ServiceStub for FakeStub {
    fn unary(
        &self,
        method: &MethodDefinition,
        payload: Payload,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Result<Arc<dyn TransportCall>, ProbeError> {
        let call = self.open(method, Some(payload), metadata, listener);
        let failure = self.unary_failure.lock().unwrap().clone();
        if let Some((code, details)) = failure {
            call.emit_error(&details);
            call.emit_status(code, &details);
        }
        Ok(call)
    }

    fn server_stream(
        &self,
        method: &MethodDefinition,
        payload: Payload,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Result<Arc<dyn TransportCall>, ProbeError> {
        Ok(self.open(method, Some(payload), metadata, listener))
    }

    fn client_stream(
        &self,
        method: &MethodDefinition,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Result<Arc<dyn TransportCall>, ProbeError> {
        let call = self.open(method, None, metadata, listener);
        self.fail_stream(&call);
        Ok(call)
    }

    fn bidi_stream(
        &self,
        method: &MethodDefinition,
        metadata: WireMetadata,
        listener: CallListener,
    ) -> Result<Arc<dyn TransportCall>, ProbeError> {
        let call = self.open(method, None, metadata, listener);
        self.fail_stream(&call);
        Ok(call)
    }
}

pub struct FakeConnector {
    stub: Arc<FakeStub>,
    pub connects: AtomicUsize,
    pub endpoints: Mutex<Vec<String>>,
}

impl Connector for FakeConnector {
    fn connect(
        &self,
        endpoint: &str,
        _service: &ServiceDefinition,
        _security: ChannelSecurity,
    ) -> Result<Arc<dyn ServiceStub>, ProbeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().unwrap().push(endpoint.to_owned());
        Ok(self.stub.clone())
    }
}

/// 按到达顺序记录全部通知。
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, CallOutcome)>>,
}

impl RecordingSink {
    pub fn outcomes(&self, session_id: &str) -> Vec<CallOutcome> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == session_id)
            .map(|(_, outcome)| outcome.clone())
            .collect()
    }

    pub fn terminal(&self, session_id: &str) -> Vec<CallOutcome> {
        self.outcomes(session_id)
            .into_iter()
            .filter(CallOutcome::is_terminal)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl CallSink for RecordingSink {
    fn notify(&self, session_id: &str, outcome: CallOutcome) {
        self.events
            .lock()
            .unwrap()
            .push((session_id.to_owned(), outcome));
    }
}

pub struct Harness {
    pub manager: SessionManager,
    pub loader: Arc<FakeLoader>,
    pub connector: Arc<FakeConnector>,
    pub stub: Arc<FakeStub>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        let loader = Arc::new(FakeLoader {
            tree: echo_tree(),
            loads: AtomicUsize::new(0),
        });
        let stub = Arc::new(FakeStub::default());
        let connector = Arc::new(FakeConnector {
            stub: Arc::clone(&stub),
            connects: AtomicUsize::new(0),
            endpoints: Mutex::new(Vec::new()),
        });
        let resolver = ServiceResolver::new(loader.clone(), connector.clone());
        Self {
            manager: SessionManager::new(resolver),
            loader,
            connector,
            stub,
            sink: Arc::new(RecordingSink::default()),
        }
    }

    pub fn invocation(&self, id: &str, method: &str, mode: CallMode) -> MethodInvocation {
        MethodInvocation::new(id, ENDPOINT, "protos/echo.pb").target(NAMESPACE, SERVICE, method, mode)
    }

    pub fn invoke(
        &self,
        invocation: &MethodInvocation,
    ) -> Result<spark_probe::CallHandle, ProbeError> {
        self.manager.invoke(invocation, self.sink.clone())
    }

    pub fn loads(&self) -> usize {
        self.loader.loads.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connector.connects.load(Ordering::SeqCst)
    }
}
