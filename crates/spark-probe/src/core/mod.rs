//! 调用会话核心：会话状态与会话管理器。

pub mod session;
pub mod session_manager;

pub use session::{CallHandle, CallOutcome, CallSink, ChannelSink, Disposition, SessionEvent};
pub use session_manager::SessionManager;
