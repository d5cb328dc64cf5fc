//! `spark-probe-bridge [--config <path>]`：stdin 读请求、stdout 写事件的 JSON-lines 进程桥。

use std::{io, path::PathBuf};

use anyhow::{Context, bail};
use spark_probe::ProbeConfig;
use spark_transport_grpc::{GrpcBackend, bridge::Bridge, logging::install_tracing};
use tracing::info;

fn config_path(mut args: impl Iterator<Item = String>) -> anyhow::Result<Option<PathBuf>> {
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(value) = args.next() else {
                    bail!("--config requires a path");
                };
                path = Some(PathBuf::from(value));
            }
            other => bail!("unrecognized argument `{other}`; usage: spark-probe-bridge [--config <path>]"),
        }
    }
    Ok(path)
}

fn main() -> anyhow::Result<()> {
    let config = match config_path(std::env::args().skip(1))? {
        Some(path) => ProbeConfig::load(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ProbeConfig::default(),
    };
    install_tracing(&config.log)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("spark-probe-io")
        .build()
        .context("building tokio runtime")?;
    let backend = GrpcBackend::new(runtime.handle().clone(), &config.channel);
    let bridge = Bridge::new(backend.session_manager(&config), io::stdout());

    info!(
        include_dirs = config.definitions.include_dirs.len(),
        "bridge ready"
    );
    bridge.run(io::stdin().lock())?;
    info!(open_sessions = bridge.manager().open_sessions(), "stdin closed, shutting down");
    Ok(())
}
