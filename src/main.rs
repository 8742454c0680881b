use anyhow::Context;
use clap::Parser;
use devmaster::config::Config;
use devmaster::server::{self, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "devmaster")]
#[command(about = "DevMaster 学习内容生成服务", long_about = None)]
struct Args {
    /// 配置文件路径（不指定时从环境变量读取）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 监听地址
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // 加载配置
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("加载配置文件失败: {}", path.display()))?,
        None => Config::from_env(),
    };
    config.validate().context("配置校验失败")?;

    info!(providers = ?config.configured_providers(), "已配置的提供商");

    let addr: SocketAddr = args
        .bind
        .parse()
        .with_context(|| format!("无效的监听地址: {}", args.bind))?;

    let state = Arc::new(AppState::new(Arc::new(config)));
    server::start_server(state, addr).await?;

    Ok(())
}
