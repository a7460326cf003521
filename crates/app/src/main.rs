mod settings;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kanshi_core::common::Symbol;
use kanshi_core::common::time::RealTimeProvider;
use kanshi_core::config::RunModeConfig;
use kanshi_core::notify::port::NotificationSink;
use kanshi_core::store::port::SummaryStore;
use kanshi_feed::JsonFileSource;
use kanshi_manager::{MonitorScheduler, SchedulerParams};
use kanshi_notify::LogSink;
use kanshi_store::{MemorySummaryStore, SqliteSummaryStore};
use tracing::{info, warn};

// 退出前等待通知队列清空的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 注入到 MonitorScheduler。
///
/// # Logic
/// 1. 加载配置并初始化全局日志。
/// 2. 实例化基础设施层（Feed、Store、Notify）。
/// 3. 构造应用服务层（MonitorScheduler），配置在此处统一校验。
/// 4. 按运行方式执行单次周期或持续监控，持续监控在收到退出信号后停止。
/// 5. 等待通知队列清空后退出。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 加载配置与日志
    let config = settings::load_config()?;
    let _log_guard = settings::init_logging(&config.logging);
    info!("Kanshi monitor starting...");

    // 2. 实例化基础设施层
    let source = Arc::new(JsonFileSource::new(&config.run.feed_dir));
    let store: Arc<dyn SummaryStore> = if config.store.persistence {
        Arc::new(SqliteSummaryStore::open(Path::new(&config.store.data_dir), config.store.retention).await?)
    } else {
        warn!("Persistence disabled, state will not survive restarts");
        Arc::new(MemorySummaryStore::new(config.store.retention))
    };
    let sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink::new())];

    let symbols: Vec<Symbol> = config.run.symbols.iter().cloned().map(Symbol::from).collect();
    let mode = config.run.mode;
    let interval = config.scheduler.interval();

    // 3. 构造应用服务层
    let scheduler = MonitorScheduler::new(SchedulerParams {
        config,
        source,
        store,
        sinks,
        clock: Arc::new(RealTimeProvider),
    })
    .await?;

    // 4. 执行
    match mode {
        RunModeConfig::Once => {
            let report = scheduler.run_once(&symbols).await?;
            info!(
                "Cycle #{} finished: {} fresh, {} stale, {} active alert(s)",
                report.cycle_id,
                report.fresh_count(),
                report.stale_count(),
                report.active_alerts.len()
            );
        }
        RunModeConfig::Continuous => {
            let handle = scheduler.start_continuous(symbols, interval)?;
            info!("Monitoring started. Waiting for signals...");
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received. Finishing current cycle...");
            handle.stop();
            handle.join().await?;
        }
    }

    // 5. 清空通知队列
    scheduler.shutdown(SHUTDOWN_GRACE).await;
    info!("Kanshi monitor stopped");
    Ok(())
}
