pub mod handlers;

use crate::config::Config;
use crate::providers::dispatch::Dispatcher;
use crate::Result;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// 关闭时等待现有连接的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// 请求处理共享的只读状态
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        let dispatcher = Dispatcher::from_config(&config);
        Self { config, dispatcher }
    }

    pub fn with_dispatcher(config: Arc<Config>, dispatcher: Dispatcher) -> Self {
        Self { config, dispatcher }
    }
}

/// 启动 HTTP 服务器（带优雅关闭）
pub async fn start_server(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("DevMaster 服务器运行在 http://{}", listener.local_addr()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(());
    });

    serve(listener, state, shutdown_rx).await;
    info!("服务器已优雅关闭");
    Ok(())
}

/// 启动 HTTP 服务器（仅用于测试，不监听关闭信号），返回实际监听地址
pub async fn start_server_test(state: Arc<AppState>, addr: SocketAddr) -> Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("DevMaster 测试服务器运行在 http://{}", local_addr);

    tokio::spawn(async move {
        let (_shutdown_tx, shutdown_rx) = watch::channel(());
        serve(listener, state, shutdown_rx).await;
    });

    Ok(local_addr)
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let sigterm = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!("设置 SIGTERM 信号处理失败: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = sigterm => warn!("收到 SIGTERM 信号，开始优雅关闭..."),
            result = signal::ctrl_c() => match result {
                Ok(()) => warn!("收到 Ctrl+C 信号，开始优雅关闭..."),
                Err(e) => error!("设置 Ctrl+C 信号处理失败: {}", e),
            },
        }
    }

    #[cfg(not(unix))]
    {
        match signal::ctrl_c().await {
            Ok(()) => warn!("收到 Ctrl+C 信号，开始优雅关闭..."),
            Err(e) => error!("设置 Ctrl+C 信号处理失败: {}", e),
        }
    }
}

/// 接受连接直到收到关闭信号，然后等待进行中的连接结束
async fn serve(listener: TcpListener, state: Arc<AppState>, mut shutdown_rx: watch::Receiver<()>) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, _) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("接受连接失败: {}", e);
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let state = Arc::clone(&state);

                connections.spawn(async move {
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        handlers::handle_request(req, state)
                    });

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        error!("服务连接错误: {}", e);
                    }
                });
            }
            _ = shutdown_rx.changed() => {
                info!("收到关闭信号，停止接受新连接");
                break;
            }
        }

        // 回收已结束的连接任务
        while connections.try_join_next().is_some() {}
    }

    info!("等待 {} 个现有连接处理完成...", connections.len());
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("等待连接超时，强制关闭剩余连接");
    }
}
