//! 宿主与演示程序使用的日志安装入口。

use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

use crate::{PipelineError, Result};

/// 安装 `fmt + EnvFilter` 全局 Subscriber。
///
/// # 教案式说明
/// - **意图（Why）**：管道、通道与对象池的事件都经 `tracing` 发出，宿主只需调用一次即可在终端看到；
/// - **逻辑（How）**：优先读取 `RUST_LOG`，未设置或无法解析时使用 `default_filter`（例如 `"spark_pipeline=debug"`）；
/// - **契约（What）**：进程内已有全局 Subscriber 时返回 [`PipelineError::Configuration`]，不会 panic。
pub fn install_fmt_subscriber(default_filter: &str) -> Result<()> {
    if dispatcher::has_been_set() {
        return Err(PipelineError::Configuration(
            "a global tracing subscriber is already installed".to_owned(),
        ));
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| PipelineError::Configuration(format!("failed to install subscriber: {err}")))
}
