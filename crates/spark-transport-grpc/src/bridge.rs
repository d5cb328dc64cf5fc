//! # JSON-lines 进程桥
//!
//! ## 意图（Why）
//! - 让不链接 Rust 的界面进程通过 stdin/stdout 驱动会话管理器。
//!
//! ## 契约（What）
//! - 输入每行一个请求：`{"op":"invoke", ...MethodInvocation}` 或 `{"op":"close","id":"..."}`；
//!   `invoke` 可附带 `responseFormats`（键 → 数值格式名），用于解码响应中的 `-bin` 元数据；
//! - 输出每行一个事件：`{"id","kind":"data"|"completed"|"failed"|"error", ...}`；
//!   `error` 表示请求本身被拒绝（解析失败、解析服务失败、关闭未知会话等），不是调用终态；
//! - 二进制元数据值输出为十六进制，声明了格式时附带 `decoded`。
//!
//! ## 执行（How）
//! - 所有事件共享同一个加锁的输出端，逐行写入后立即 flush，行与行之间不会交错。

use std::{
    collections::BTreeMap,
    io::{self, BufRead, Write},
    sync::Arc,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use spark_probe::{
    CallOutcome, CallSink, MetadataEntry, MetadataValue, MethodInvocation, NumericFormat,
    Payload, SessionManager,
};
use tracing::{debug, warn};

/// 桥接请求。
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeRequest {
    Invoke {
        #[serde(flatten)]
        invocation: MethodInvocation,
        #[serde(default, rename = "responseFormats")]
        response_formats: BTreeMap<String, NumericFormat>,
    },
    Close {
        id: String,
    },
}

impl BridgeRequest {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(Debug, Serialize)]
struct RenderedEntry {
    key: String,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    decoded: Option<String>,
}

#[derive(Debug, Serialize)]
struct BridgeEvent<'a> {
    id: &'a str,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Vec<RenderedEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> BridgeEvent<'a> {
    fn rejected(id: &'a str, error: &'a str) -> Self {
        Self {
            id,
            kind: "error",
            payload: None,
            metadata: None,
            error: Some(error),
        }
    }
}

type SharedWriter<W> = Arc<Mutex<W>>;

fn write_event<W: Write>(out: &Mutex<W>, event: &BridgeEvent<'_>) -> io::Result<()> {
    let line = serde_json::to_string(event)?;
    let mut out = out.lock();
    writeln!(out, "{line}")?;
    out.flush()
}

/// 把调用结果逐行写出的接收端；每次 `invoke` 携带各自的响应格式表。
pub struct JsonLinesSink<W> {
    out: SharedWriter<W>,
    formats: BTreeMap<String, NumericFormat>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: SharedWriter<W>, formats: BTreeMap<String, NumericFormat>) -> Self {
        let formats = formats
            .into_iter()
            .map(|(key, format)| (key.to_ascii_lowercase(), format))
            .collect();
        Self { out, formats }
    }

    fn render(&self, entries: &[MetadataEntry]) -> Vec<RenderedEntry> {
        entries
            .iter()
            .map(|entry| match &entry.value {
                MetadataValue::Text(text) => RenderedEntry {
                    key: entry.key.clone(),
                    value: text.clone(),
                    decoded: None,
                },
                MetadataValue::Binary(bytes) => {
                    let decoded = self.formats.get(&entry.key).map(|format| {
                        entry
                            .clone()
                            .with_format(*format)
                            .display_value()
                            .unwrap_or_else(|err| err.to_string())
                    });
                    RenderedEntry {
                        key: entry.key.clone(),
                        value: hex::encode(bytes),
                        decoded,
                    }
                }
            })
            .collect()
    }
}

impl<W: Write + Send> CallSink for JsonLinesSink<W> {
    fn notify(&self, session_id: &str, outcome: CallOutcome) {
        let event = match &outcome {
            CallOutcome::Data { payload } => BridgeEvent {
                id: session_id,
                kind: "data",
                payload: Some(payload),
                metadata: None,
                error: None,
            },
            CallOutcome::Completed { metadata } => BridgeEvent {
                id: session_id,
                kind: "completed",
                payload: None,
                metadata: Some(self.render(metadata)),
                error: None,
            },
            CallOutcome::Failed { metadata, error } => BridgeEvent {
                id: session_id,
                kind: "failed",
                payload: None,
                metadata: Some(self.render(metadata)),
                error: Some(error),
            },
        };
        if let Err(err) = write_event(&self.out, &event) {
            warn!(session_id, error = %err, "failed to write bridge event");
        }
    }
}

/// 把 stdin 请求分派给会话管理器。
pub struct Bridge<W> {
    manager: SessionManager,
    out: SharedWriter<W>,
}

impl<W: Write + Send + 'static> Bridge<W> {
    pub fn new(manager: SessionManager, out: W) -> Self {
        Self {
            manager,
            out: Arc::new(Mutex::new(out)),
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// 处理一行请求；失败以 `error` 事件回报，只有输出端写入失败才返回错误。
    pub fn handle_line(&self, line: &str) -> io::Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let request = match BridgeRequest::parse(line) {
            Ok(request) => request,
            Err(err) => {
                let detail = format!("malformed request: {err}");
                return write_event(&self.out, &BridgeEvent::rejected("", &detail));
            }
        };
        match request {
            BridgeRequest::Invoke {
                invocation,
                response_formats,
            } => {
                let sink = Arc::new(JsonLinesSink::new(
                    Arc::clone(&self.out),
                    response_formats,
                ));
                match self.manager.invoke(&invocation, sink) {
                    Ok(handle) => {
                        debug!(session_id = %handle.session_id, disposition = ?handle.disposition, "invoke accepted");
                        Ok(())
                    }
                    Err(err) => write_event(
                        &self.out,
                        &BridgeEvent::rejected(&invocation.id, &err.to_string()),
                    ),
                }
            }
            BridgeRequest::Close { id } => match self.manager.close(&id) {
                Ok(()) => Ok(()),
                Err(err) => write_event(&self.out, &BridgeEvent::rejected(&id, &err.to_string())),
            },
        }
    }

    /// 读到 EOF 为止。
    pub fn run<R: BufRead>(&self, input: R) -> io::Result<()> {
        for line in input.lines() {
            self.handle_line(&line?)?;
        }
        Ok(())
    }
}
