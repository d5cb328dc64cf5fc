//! # SessionManager：调用会话调度器
//!
//! ## 核心意图（Why）
//! - 把方法调用描述符翻译为四种调用形态之一，打开或复用传输级调用，并把入站事件
//!   转换为 [`CallOutcome`] 送达调用方提供的 [`CallSink`]；
//! - 维护以会话标识为键的打开调用仓储，保证同一会话标识同一时刻至多存在一个传输级调用。
//!
//! ## 架构定位（Where）
//! - 进程内单例：启动时构造一次，持有 [`ServiceResolver`]（服务句柄缓存）与两张 `DashMap`
//!   仓储，所有变更都经由本类型的公开操作完成；
//! - 本身不创建线程，入站事件由传输绑定在其自身线程上异步回调。
//!
//! ## 行为契约（What）
//! - `invoke`：
//!   - 写流形态（ClientStream/BidirectionalStream）首次调用打开并登记，后续同标识调用把消息写入同一调用；
//!   - 单请求形态（Unary/ServerStream）每次打开新调用，不进入打开调用仓储；
//!   - ServerStream 登记在独立的读流表中，仅用于显式 `close` 取消；同标识重复调用先取消旧读流；
//! - 终态：状态码 0 → `Completed`，非零 → `Failed`（说明为空时以状态码名称代替）；
//!   终止后先按代次注销，再关闭底层调用（写流半关闭，服务端流取消），最后通知接收端；
//! - `close`：写流与读流表均未命中时返回 [`ProbeError::SessionNotFound`]，不触发任何传输动作。
//!
//! ## 并发约束（Trade-offs）
//! - `invoke`/`close` 在 `open_lock` 下串行，保证同一会话标识的“查找-打开-登记”原子化；
//!   锁可重入，接收端在同步回调中再次调用 `invoke`/`close` 不会死锁；
//! - 监听器不获取 `open_lock`，只通过 `DashMap::remove_if` 按代次注销，不同会话的事件互不阻塞；
//! - 任何时候都不在持有 `DashMap` guard 的情况下调用传输层。

use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use tracing::{debug, info, warn};

use crate::{
    config::ProbeConfig,
    core::session::{CallHandle, CallLink, CallOutcome, CallSink, Disposition, OpenCall},
    definition::DefinitionLoader,
    descriptor::{CallMode, MethodInvocation, Payload},
    error::ProbeError,
    metadata::{from_wire, to_wire},
    resolver::ServiceResolver,
    transport::{CallListener, Connector, TransportEvent},
};

type Registry = DashMap<Arc<str>, OpenCall>;

/// 调用会话管理器。
///
/// # 教案式注释
/// - **意图 (Why)**：集中管理打开调用的生命周期，避免上层直接操作仓储；
/// - **契约 (What)**：以 `Arc<str>` 会话标识为键；写流仓储与读流表互不重叠；
/// - **风险 (Trade-offs)**：复用写流会话时沿用首次调用登记的接收端，后续调用传入的接收端被忽略。
pub struct SessionManager {
    resolver: ServiceResolver,
    sessions: Arc<Registry>,
    readers: Arc<Registry>,
    open_lock: ReentrantMutex<()>,
    generation: AtomicU64,
}

impl SessionManager {
    pub fn new(resolver: ServiceResolver) -> Self {
        Self {
            resolver,
            sessions: Arc::new(DashMap::new()),
            readers: Arc::new(DashMap::new()),
            open_lock: ReentrantMutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// 按配置装配解析器（通道安全模式、默认 include 目录）后构造管理器。
    pub fn with_config(
        loader: Arc<dyn DefinitionLoader>,
        connector: Arc<dyn Connector>,
        config: &ProbeConfig,
    ) -> Self {
        let resolver = ServiceResolver::new(loader, connector)
            .with_security(config.channel.security)
            .with_include_dirs(config.definitions.include_dirs.clone());
        Self::new(resolver)
    }

    pub fn resolver(&self) -> &ServiceResolver {
        &self.resolver
    }

    /// 发起或推送一次调用。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：
    ///   - 出站元数据在每次调用时重新翻译，非法元数据在任何传输动作之前返回错误；
    ///   - 解析失败（定义、服务、方法缺失）在打开调用之前返回；
    ///   - 描述符的调用形态须与方法声明及已登记会话一致，否则返回 [`ProbeError::CallModeMismatch`]；
    ///   - 终态可能在本方法返回之前已同步送达接收端；
    /// - **执行 (How)**：写流先查仓储，命中则写入并返回 `Reused`；未命中、已终止或写入时恰好终止则按新会话打开；
    ///   新调用在登记前即已终止时返回 `Unregistered`。
    pub fn invoke(
        &self,
        invocation: &MethodInvocation,
        sink: Arc<dyn CallSink>,
    ) -> Result<CallHandle, ProbeError> {
        let metadata = to_wire(&invocation.metadata)?;
        let _guard = self.open_lock.lock();

        if invocation.mode.is_write_stream()
            && let Some(handle) = self.push_existing(invocation)?
        {
            return Ok(handle);
        }

        let handle = self.resolver.resolve(invocation)?;
        let method = handle.method(&invocation.method_name)?.clone();
        if method.mode != invocation.mode {
            return Err(ProbeError::CallModeMismatch {
                session_id: invocation.id.clone(),
                expected: method.mode,
                requested: invocation.mode,
            });
        }

        let session_id: Arc<str> = Arc::from(invocation.id.as_str());
        let mode = invocation.mode;
        if mode == CallMode::ServerStream {
            self.cancel_reader(&session_id);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let link = Arc::new(CallLink::new(Arc::clone(&session_id), mode, generation));
        let listener = self.listener(Arc::clone(&link), sink);
        let stub = handle.stub();
        let request = || invocation.payload.clone().unwrap_or_else(Payload::empty);
        let call = match mode {
            CallMode::Unary => stub.unary(&method, request(), metadata, listener)?,
            CallMode::ServerStream => stub.server_stream(&method, request(), metadata, listener)?,
            CallMode::ClientStream => stub.client_stream(&method, metadata, listener)?,
            CallMode::BidirectionalStream => stub.bidi_stream(&method, metadata, listener)?,
        };
        link.bind(call);
        debug!(session_id = %session_id, ?mode, path = %method.path, generation, "opened call");

        let entry = OpenCall {
            mode,
            link: Arc::clone(&link),
        };
        let disposition = match mode {
            CallMode::ClientStream | CallMode::BidirectionalStream => {
                self.sessions.insert(Arc::clone(&session_id), entry);
                Disposition::Opened
            }
            CallMode::ServerStream => {
                if let Some(stale) = self.readers.insert(Arc::clone(&session_id), entry) {
                    stale.link.close_explicit();
                }
                Disposition::Unregistered
            }
            CallMode::Unary => Disposition::Unregistered,
        };

        // 终态可能先于登记到达，此时由这里补做注销与关闭；调用已结束，首条消息不再发送。
        if link.is_terminated() {
            deregister(self.registry_for(mode), &link);
            link.close_after_termination();
            if mode.is_write_stream() && invocation.payload.is_some() {
                warn!(session_id = %session_id, ?mode, "call ended before registration, first message not sent");
            }
            return Ok(CallHandle {
                session_id: invocation.id.clone(),
                mode,
                disposition: Disposition::Unregistered,
            });
        }

        if mode.is_write_stream()
            && let Some(payload) = invocation.payload.clone()
            && let Err(err) = link.write(payload)
        {
            warn!(session_id = %session_id, error = %err, "first write failed, aborting call");
            deregister(Some(&*self.sessions), &link);
            link.abort();
            return Err(err);
        }

        Ok(CallHandle {
            session_id: invocation.id.clone(),
            mode,
            disposition,
        })
    }

    /// 显式关闭会话。
    ///
    /// - **契约 (What)**：命中则先注销再关闭（ClientStream 半关闭，BidirectionalStream/ServerStream 取消）；
    ///   未命中返回 [`ProbeError::SessionNotFound`]，不触发任何传输动作；
    /// - Unary 调用从不登记，关闭其会话标识同样返回 `SessionNotFound`。
    pub fn close(&self, session_id: &str) -> Result<(), ProbeError> {
        let _guard = self.open_lock.lock();
        let removed = self
            .sessions
            .remove(session_id)
            .or_else(|| self.readers.remove(session_id));
        let Some((_, open)) = removed else {
            warn!(%session_id, "close requested for unknown session");
            return Err(ProbeError::SessionNotFound {
                session_id: session_id.to_owned(),
            });
        };
        let closed = open.link.close_explicit();
        debug!(%session_id, mode = ?open.mode, closed, "closed session");
        Ok(())
    }

    /// 打开调用仓储中的写流会话数量。
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// 会话标识是否对应一个已登记的写流调用或在途读流。
    pub fn is_open(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id) || self.readers.contains_key(session_id)
    }

    fn push_existing(
        &self,
        invocation: &MethodInvocation,
    ) -> Result<Option<CallHandle>, ProbeError> {
        let existing = self
            .sessions
            .get(invocation.id.as_str())
            .map(|entry| entry.value().clone());
        let Some(open) = existing else {
            return Ok(None);
        };
        if open.link.is_terminated() {
            deregister(Some(&*self.sessions), &open.link);
            return Ok(None);
        }
        if open.mode != invocation.mode {
            return Err(ProbeError::CallModeMismatch {
                session_id: invocation.id.clone(),
                expected: open.mode,
                requested: invocation.mode,
            });
        }
        if let Some(payload) = invocation.payload.clone() {
            if let Err(err) = open.link.write(payload) {
                // 终态与本次推送交错到达：旧调用已结束，按新会话重新打开。
                if open.link.is_terminated() {
                    debug!(session_id = %invocation.id, error = %err, "call ended during push, reopening");
                    deregister(Some(&*self.sessions), &open.link);
                    return Ok(None);
                }
                return Err(err);
            }
            debug!(session_id = %invocation.id, mode = ?open.mode, "pushed message on open call");
        }
        Ok(Some(CallHandle {
            session_id: invocation.id.clone(),
            mode: open.mode,
            disposition: Disposition::Reused,
        }))
    }

    fn cancel_reader(&self, session_id: &str) {
        if let Some((_, stale)) = self.readers.remove(session_id) {
            debug!(%session_id, generation = stale.link.generation(), "cancelling in-flight reader");
            stale.link.close_explicit();
        }
    }

    fn registry_for(&self, mode: CallMode) -> Option<&Registry> {
        match mode {
            CallMode::ClientStream | CallMode::BidirectionalStream => Some(&*self.sessions),
            CallMode::ServerStream => Some(&*self.readers),
            CallMode::Unary => None,
        }
    }

    fn listener(&self, link: Arc<CallLink>, sink: Arc<dyn CallSink>) -> CallListener {
        let registry: Option<Weak<Registry>> = match link.mode() {
            CallMode::ClientStream | CallMode::BidirectionalStream => {
                Some(Arc::downgrade(&self.sessions))
            }
            CallMode::ServerStream => Some(Arc::downgrade(&self.readers)),
            CallMode::Unary => None,
        };

        Arc::new(move |event| match event {
            TransportEvent::Data(payload) => {
                if !link.is_terminated() {
                    sink.notify(link.session_id(), CallOutcome::Data { payload });
                }
            }
            TransportEvent::Status(status) => {
                if !link.mark_terminated() {
                    return;
                }
                let metadata = from_wire(&status.metadata);
                let outcome = if status.is_ok() {
                    CallOutcome::Completed { metadata }
                } else {
                    CallOutcome::Failed {
                        metadata,
                        error: status.error_detail(),
                    }
                };
                if let Some(registry) = registry.as_ref().and_then(Weak::upgrade) {
                    deregister(Some(&*registry), &link);
                }
                link.close_after_termination();
                info!(
                    session_id = %link.session_id(),
                    mode = ?link.mode(),
                    code = status.code,
                    "call terminated"
                );
                sink.notify(link.session_id(), outcome);
            }
            TransportEvent::Error(detail) => {
                warn!(session_id = %link.session_id(), %detail, "transport reported an error");
            }
        })
    }
}

/// 仅当仓储中的条目仍属于该调用（代次一致）时才删除。
fn deregister(registry: Option<&Registry>, link: &CallLink) {
    if let Some(registry) = registry {
        registry.remove_if(link.session_id(), |_, open| {
            open.link.generation() == link.generation()
        });
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("resolver", &self.resolver)
            .field("open_sessions", &self.sessions.len())
            .field("readers", &self.readers.len())
            .finish_non_exhaustive()
    }
}
