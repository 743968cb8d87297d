use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clamav_binding::clamav::{ffi, native, DatabaseStat, EngineManager};
use clamav_binding::config::ClamAVConfig;
use clamav_binding::scan;

#[derive(Parser, Debug)]
#[command(name = "clamav-scan", version)]
#[command(about = "Scan files and directories with libclamav and print a JSON summary")]
struct Args {
    /// JSON 配置文件
    #[arg(short, long, env = "CLAMAV_CONFIG")]
    config: Option<PathBuf>,

    /// 并发扫描线程数，覆盖配置
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// 要扫描的文件或目录
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clamav_binding=info,clamav_scan=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let mut config = ClamAVConfig::load(args.config.as_deref())?;
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
        config.validate()?;
    }
    tracing::info!("Configuration loaded: db_dir={}", config.database_dir);

    native::init(ffi::CL_INIT_DEFAULT)?;
    if config.debug {
        native::enable_debug();
    }
    tracing::info!(
        "libclamav {} (functionality level {})",
        native::version(),
        native::functionality_level()
    );

    let concurrency = config.concurrency;
    let options = config.scan_options();
    let manager = EngineManager::with_libclamav(config);
    manager
        .initialize()
        .context("ClamAV engine initialization failed")?;

    // 记录病毒库状态，扫描结束后报告是否需要重新加载
    let stat = DatabaseStat::open_dir(&manager.config().database_dir)?;

    let engine = manager.engine()?;
    let summary = scan::scan_paths(&engine, args.paths, options, concurrency).await?;
    drop(engine);

    if stat.has_changed() {
        tracing::warn!("Virus database changed during scan: {}", stat.dir().display());
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);

    for (path, virus) in summary.threats() {
        tracing::warn!("{}: {} FOUND", path.display(), virus);
    }

    drop(stat);
    manager.shutdown();
    native::cleanup_crypto();

    if summary.infected_files > 0 {
        std::process::exit(1);
    }
    if summary.errors > 0 {
        std::process::exit(2);
    }
    Ok(())
}
