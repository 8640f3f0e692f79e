//! Magpie - Rust 自动代购暂存引擎
//!
//! 入口：初始化日志、加载配置、接上 HTTP 后端，恢复持久化会话并把
//! 引擎事件打到日志，Ctrl+C 时拆除全部计时器退出。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use magpie::backend::HttpBackend;
use magpie::config::load_config;
use magpie::core::EngineEvent;
use magpie::{observability, EngineConfig, EngineRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let state_dir = cfg
        .app
        .state_dir
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("state"));
    std::fs::create_dir_all(&state_dir).context("Failed to create state dir")?;

    let backend = Arc::new(HttpBackend::new(
        cfg.backend.base_url.clone(),
        cfg.backend.request_timeout_secs,
    ));
    let registry = EngineRegistry::new(backend, EngineConfig::from_app(&cfg), Some(state_dir));

    let engine = registry.get_or_create(&cfg.app.user_id).await;
    let mut events = engine.subscribe();
    engine
        .resume()
        .await
        .context("Failed to resume persisted session")?;

    if !engine.session().active {
        engine.enable(Duration::from_secs(cfg.agent.default_window_secs));
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, tearing down");
                break;
            }
            event = events.recv() => {
                match event {
                    Ok(EngineEvent::CountdownTick { total_seconds_remaining, progress_fraction, .. }) => {
                        tracing::debug!(
                            "Countdown: {}s remaining ({:.1}%)",
                            total_seconds_remaining,
                            progress_fraction * 100.0
                        );
                    }
                    Ok(event) => {
                        tracing::info!("Engine event: {}", serde_json::to_string(&event)?);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Event feed lagged, skipped {} events", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    registry.teardown_all().await;
    Ok(())
}
