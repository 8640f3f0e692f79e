//! 进程级引擎注册表
//!
//! 按用户维度管理暂存引擎实例：同一用户拿到同一个引擎，登出/拆除时
//! 统一取消该用户的全部计时器。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::backend::StagingBackend;
use crate::core::engine::{EngineConfig, StagingEngine};
use crate::persist::SessionPersistence;

/// 用户 → 引擎 的进程级注册表
pub struct EngineRegistry {
    backend: Arc<dyn StagingBackend>,
    cfg: EngineConfig,
    /// 会话持久化目录；None 时不持久化
    state_dir: Option<PathBuf>,
    engines: RwLock<HashMap<String, Arc<StagingEngine>>>,
}

impl EngineRegistry {
    pub fn new(backend: Arc<dyn StagingBackend>, cfg: EngineConfig, state_dir: Option<PathBuf>) -> Self {
        Self {
            backend,
            cfg,
            state_dir,
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// 获取或创建用户的引擎
    pub async fn get_or_create(&self, user_id: &str) -> Arc<StagingEngine> {
        if let Some(engine) = self.engines.read().await.get(user_id) {
            return Arc::clone(engine);
        }

        let persistence = self
            .state_dir
            .as_ref()
            .map(|dir| SessionPersistence::new(dir.join(format!("{}.json", user_id))));
        let engine = StagingEngine::new(
            user_id,
            Arc::clone(&self.backend),
            self.cfg.clone(),
            persistence,
        );

        let mut engines = self.engines.write().await;
        // 并发创建时以先写入者为准
        Arc::clone(
            engines
                .entry(user_id.to_string())
                .or_insert(engine),
        )
    }

    pub async fn get(&self, user_id: &str) -> Option<Arc<StagingEngine>> {
        self.engines.read().await.get(user_id).cloned()
    }

    /// 拆除并移除用户的引擎（登出、导航离开）
    pub async fn remove(&self, user_id: &str) {
        if let Some(engine) = self.engines.write().await.remove(user_id) {
            engine.teardown();
        }
    }

    /// 拆除所有引擎（进程退出）
    pub async fn teardown_all(&self) {
        let mut engines = self.engines.write().await;
        for engine in engines.values() {
            engine.teardown();
        }
        engines.clear();
    }

    /// 当前处于激活托管中的用户数
    pub async fn active_count(&self) -> usize {
        let engines = self.engines.read().await;
        engines.values().filter(|e| e.session().active).count()
    }
}
