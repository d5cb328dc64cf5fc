//! # 调用会话（Call Session）
//!
//! ## 核心意图（Why）
//! - 描述一次传输级调用在会话管理器内部的全部状态：会话标识、调用形态、代次、已绑定的
//!   [`TransportCall`] 以及“已终止/已关闭”两个一次性标志；
//! - 对外暴露调用结果 [`CallOutcome`] 与通知接收端 [`CallSink`]。
//!
//! ## 状态约束（What）
//! - `terminated`：首个终态事件置位，此后的终态事件被忽略，保证每个调用恰好一个
//!   `Completed`/`Failed`；
//! - `closed`：终止后的自动关闭、显式 `close` 与写入失败后的中止三条路径共享该标志，
//!   底层调用至多被关闭一次；
//! - `generation`：同一会话标识可在终止后被复用，仓储按代次删除条目，旧调用的终态事件
//!   不会误删新调用的条目。

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, Ordering},
    mpsc::Sender,
};

use serde::{Deserialize, Serialize};

use crate::{
    descriptor::{CallMode, Payload},
    error::ProbeError,
    metadata::MetadataEntry,
    transport::TransportCall,
};

/// 送达通知接收端的调用结果。
///
/// # 教案式说明
/// - **契约 (What)**：`Data` 在流式响应形态下可出现零到多次；`Completed`/`Failed`
///   恰好出现一次并终结该调用；`Failed::error` 永不为空。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallOutcome {
    Data {
        payload: Payload,
    },
    Completed {
        metadata: Vec<MetadataEntry>,
    },
    Failed {
        metadata: Vec<MetadataEntry>,
        error: String,
    },
}

impl CallOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallOutcome::Data { .. })
    }
}

/// 调用结果的通知接收端。
///
/// 可能在传输线程上被调用，也可能在 `invoke` 返回前同步调用；不同会话的通知可并发到达。
pub trait CallSink: Send + Sync {
    fn notify(&self, session_id: &str, outcome: CallOutcome);
}

impl<F> CallSink for F
where
    F: Fn(&str, CallOutcome) + Send + Sync,
{
    fn notify(&self, session_id: &str, outcome: CallOutcome) {
        self(session_id, outcome)
    }
}

/// 携带会话标识的调用结果，供通道型接收端使用。
#[derive(Clone, Debug, PartialEq)]
pub struct SessionEvent {
    pub session_id: String,
    pub outcome: CallOutcome,
}

/// 把调用结果转发到标准库通道；接收端已断开时静默丢弃。
#[derive(Clone, Debug)]
pub struct ChannelSink {
    sender: Sender<SessionEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<SessionEvent>) -> Self {
        Self { sender }
    }
}

impl CallSink for ChannelSink {
    fn notify(&self, session_id: &str, outcome: CallOutcome) {
        let _ = self.sender.send(SessionEvent {
            session_id: session_id.to_owned(),
            outcome,
        });
    }
}

/// `invoke` 对本次请求的处置方式。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Disposition {
    /// 新打开的写流调用，已登记到打开调用仓储。
    Opened,
    /// 命中已打开的写流调用，本次消息写入同一调用。
    Reused,
    /// 未进入打开调用仓储：单请求形态，或写流调用在登记前即已终止。
    Unregistered,
}

/// `invoke` 的返回值。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallHandle {
    pub session_id: String,
    pub mode: CallMode,
    pub disposition: Disposition,
}

/// 会话管理器与监听器共享的单次调用状态。
pub(crate) struct CallLink {
    session_id: Arc<str>,
    mode: CallMode,
    generation: u64,
    call: OnceLock<Arc<dyn TransportCall>>,
    terminated: AtomicBool,
    closed: AtomicBool,
}

impl CallLink {
    pub(crate) fn new(session_id: Arc<str>, mode: CallMode, generation: u64) -> Self {
        Self {
            session_id,
            mode,
            generation,
            call: OnceLock::new(),
            terminated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn mode(&self) -> CallMode {
        self.mode
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// 绑定传输调用；仅首次生效。
    pub(crate) fn bind(&self, call: Arc<dyn TransportCall>) {
        let _ = self.call.set(call);
    }

    /// 置位终止标志，返回是否为首次终止。
    pub(crate) fn mark_terminated(&self) -> bool {
        !self.terminated.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub(crate) fn write(&self, payload: Payload) -> Result<(), ProbeError> {
        match self.call.get() {
            Some(call) => call.write(payload),
            None => Err(ProbeError::transport(
                "call.write",
                "call is not bound to a transport",
            )),
        }
    }

    /// 终态到达后的关闭：写流半关闭，服务端流取消，一元调用无需动作。
    ///
    /// 尚未绑定时不做任何事，由 `invoke` 在绑定后补做。
    pub(crate) fn close_after_termination(&self) {
        let Some(call) = self.call.get() else {
            return;
        };
        if self.claim_close() {
            match self.mode {
                CallMode::ClientStream | CallMode::BidirectionalStream => call.end(),
                CallMode::ServerStream => call.cancel(),
                CallMode::Unary => {}
            }
        }
    }

    /// 显式关闭：客户端流半关闭，其余形态取消。返回本次是否实际执行了关闭。
    pub(crate) fn close_explicit(&self) -> bool {
        let Some(call) = self.call.get() else {
            return false;
        };
        if !self.claim_close() {
            return false;
        }
        match self.mode {
            CallMode::ClientStream => call.end(),
            CallMode::BidirectionalStream | CallMode::ServerStream | CallMode::Unary => {
                call.cancel()
            }
        }
        true
    }

    /// 写入失败后的中止。
    pub(crate) fn abort(&self) {
        if let Some(call) = self.call.get()
            && self.claim_close()
        {
            call.cancel();
        }
    }

    fn claim_close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CallLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallLink")
            .field("session_id", &self.session_id)
            .field("mode", &self.mode)
            .field("generation", &self.generation)
            .field("bound", &self.call.get().is_some())
            .field("terminated", &self.is_terminated())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// 仓储条目：调用形态与共享的调用状态。
#[derive(Clone, Debug)]
pub(crate) struct OpenCall {
    pub(crate) mode: CallMode,
    pub(crate) link: Arc<CallLink>,
}
