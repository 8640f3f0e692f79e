//! 暂存引擎集成测试

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use magpie::backend::{MockBackend, StagingBackend};
    use magpie::core::{EngineEvent, StagedItem};
    use magpie::persist::SessionPersistence;
    use magpie::{EngineConfig, StagingEngine};
    use tokio::time::sleep;

    fn fast_cfg() -> EngineConfig {
        EngineConfig {
            tick: Duration::from_millis(20),
            poll_interval: Duration::from_millis(60),
            commit_retries: 1,
        }
    }

    fn item(id: &str, name: &str, price: i64) -> StagedItem {
        StagedItem::new(id, name, price, "数码")
    }

    #[tokio::test]
    async fn test_window_close_commits_all_staged_items() {
        let backend = Arc::new(MockBackend::new());
        // 两件商品：50 币与 80 币
        backend
            .seed(vec![item("a", "机械键盘", 5000), item("b", "降噪耳机", 8000)])
            .await;
        let engine = StagingEngine::new("u1", Arc::clone(&backend) as _, fast_cfg(), None);
        let mut events = engine.subscribe();

        engine.enable(Duration::from_millis(200));
        assert!(engine.session().active);
        sleep(Duration::from_millis(100)).await;
        // 窗口内：列表已对账进来，合计 130 币
        assert_eq!(engine.total_coins().await, 130);

        sleep(Duration::from_millis(400)).await;

        // 到期：两件都转为订单，会话关闭
        assert!(!engine.session().active);
        assert!(engine.items().await.is_empty());
        assert!(backend.server_items().await.is_empty());

        let mut saw_expired = false;
        let mut commit_summary = None;
        while let Ok(event) = events.try_recv() {
            match event {
                EngineEvent::Expired => saw_expired = true,
                EngineEvent::CommitFinished { committed, failed } => {
                    commit_summary = Some((committed, failed));
                }
                _ => {}
            }
        }
        assert!(saw_expired);
        assert_eq!(commit_summary, Some((2, 0)));
    }

    #[tokio::test]
    async fn test_removed_item_is_not_committed() {
        let backend = Arc::new(MockBackend::new());
        backend
            .seed(vec![item("a", "机械键盘", 5000), item("b", "降噪耳机", 8000)])
            .await;
        let engine = StagingEngine::new("u1", Arc::clone(&backend) as _, fast_cfg(), None);

        engine.enable(Duration::from_millis(250));
        sleep(Duration::from_millis(80)).await;

        // 到期前用户移除 a
        engine.remove_item("a").await;
        sleep(Duration::from_millis(400)).await;

        assert!(!engine.session().active);
        // 只有 b 被提交：a 既不在暂存区也没变成订单
        assert!(backend.server_items().await.is_empty());
        assert_eq!(backend.delete_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(backend.commit_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_keeps_items_and_skips_commit() {
        let backend = Arc::new(MockBackend::new());
        backend.set_fail_stop(true); // 远端还不可达
        backend.seed(vec![item("a", "机械键盘", 5000)]).await;
        let engine = StagingEngine::new("u1", Arc::clone(&backend) as _, fast_cfg(), None);

        engine.enable(Duration::from_millis(300));
        sleep(Duration::from_millis(80)).await;

        engine.stop();
        // 远端失败也不影响：本地立即 Disabled
        assert!(!engine.session().active);

        sleep(Duration::from_millis(400)).await;
        // 停止不是放弃：暂存商品留在服务端，没有任何提交发生
        assert_eq!(backend.server_items().await.len(), 1);
        assert_eq!(backend.commit_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_partial_commit_failure_keeps_failed_item_staged() {
        let backend = Arc::new(MockBackend::new());
        backend
            .seed(vec![
                item("a", "机械键盘", 5000),
                item("b", "降噪耳机", 8000),
                item("c", "手环", 3000),
            ])
            .await;
        backend.fail_commit_always("b").await;
        let engine = StagingEngine::new("u1", Arc::clone(&backend) as _, fast_cfg(), None);
        let mut events = engine.subscribe();

        engine.enable(Duration::from_millis(150));
        sleep(Duration::from_millis(500)).await;

        // b 失败不拖累 a、c；b 留在暂存区可见，不被悄悄丢掉
        let staged: Vec<_> = engine.items().await.into_iter().map(|i| i.id).collect();
        assert_eq!(staged, vec!["b"]);
        let server: Vec<_> = backend
            .server_items()
            .await
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(server, vec!["b"]);

        let mut commit_summary = None;
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::CommitFinished { committed, failed } = event {
                commit_summary = Some((committed, failed));
            }
        }
        assert_eq!(commit_summary, Some((2, 1)));
    }

    #[tokio::test]
    async fn test_poller_reconciles_within_one_period() {
        let backend = Arc::new(MockBackend::new());
        backend.seed(vec![item("a", "机械键盘", 5000)]).await;
        let engine = StagingEngine::new("u1", Arc::clone(&backend) as _, fast_cfg(), None);

        engine.enable(Duration::from_secs(3600));
        sleep(Duration::from_millis(40)).await;
        assert_eq!(engine.items().await.len(), 1);

        // 服务端在别处发生了变化（比如另一台设备上移除了商品）
        backend.seed(vec![]).await;
        sleep(Duration::from_millis(120)).await;

        // 一个轮询周期内本地整体替换跟上
        assert!(engine.items().await.is_empty());
        engine.teardown();
    }

    #[tokio::test]
    async fn test_resume_restores_future_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let backend = Arc::new(MockBackend::new());

        {
            let engine = StagingEngine::new(
                "u1",
                Arc::clone(&backend) as _,
                fast_cfg(),
                Some(SessionPersistence::new(&path)),
            );
            engine.enable(Duration::from_secs(3600));
            let end = engine.session().end_ms.unwrap();
            engine.teardown();

            // 「重启」后的新引擎从持久化状态恢复同一个窗口
            let revived = StagingEngine::new(
                "u1",
                Arc::clone(&backend) as _,
                fast_cfg(),
                Some(SessionPersistence::new(&path)),
            );
            revived.resume().await.unwrap();
            let session = revived.session();
            assert!(session.active);
            assert_eq!(session.end_ms, Some(end));
            revived.teardown();
        }
    }

    #[tokio::test]
    async fn test_resume_with_elapsed_window_commits_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let backend = Arc::new(MockBackend::new());
        backend.seed(vec![item("a", "机械键盘", 5000)]).await;

        // 窗口在停机期间已经关闭
        SessionPersistence::new(&path)
            .save(magpie::core::now_ms() - 60_000)
            .unwrap();

        let engine = StagingEngine::new(
            "u1",
            Arc::clone(&backend) as _,
            fast_cfg(),
            Some(SessionPersistence::new(&path)),
        );
        engine.resume().await.unwrap();
        sleep(Duration::from_millis(100)).await;

        assert!(!engine.session().active);
        assert!(backend.server_items().await.is_empty());
        // 持久化状态已清理：再 resume 一次什么也不做
        assert_eq!(SessionPersistence::new(&path).load().unwrap(), None);
        assert_eq!(backend.commit_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upstream_stage_contract() {
        let backend = Arc::new(MockBackend::new());
        let engine = StagingEngine::new("u1", Arc::clone(&backend) as _, fast_cfg(), None);

        // 上游选品服务直接投放候选商品
        engine.stage(item("a", "机械键盘", 5099)).await;
        assert_eq!(engine.items().await.len(), 1);
        // 展示价取整币
        assert_eq!(engine.total_coins().await, 50);
    }

    /// MockBackend 同时要能当真实后端的替身给外部用：确认 trait 对象用法
    #[tokio::test]
    async fn test_backend_trait_object_usage() {
        let backend: Arc<dyn StagingBackend> = Arc::new(MockBackend::new());
        assert!(backend.fetch_pending("u1").await.unwrap().is_empty());
        assert!(backend.stop_agent("u1").await.is_ok());
    }
}
