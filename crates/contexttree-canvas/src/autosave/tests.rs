    use super::*;
    use crate::document::{Canvas, NodeKind, Position};
    use crate::store::MockCanvasStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DELAY: Duration = Duration::from_secs(10);

    fn entry() -> CanvasNode {
        CanvasNode::new("entry", NodeKind::Entry, Position::default()).primary()
    }

    fn nodes(count: usize) -> Vec<CanvasNode> {
        let mut nodes = vec![entry()];
        for i in 1..count {
            nodes.push(
                CanvasNode::new(format!("b{}", i), NodeKind::Branch, Position::default())
                    .forked_from("entry", format!("msg-{}", i)),
            );
        }
        nodes
    }

    fn saved(id: &str, patch: CanvasPatch, owner: &str) -> Result<Canvas> {
        let mut canvas = Canvas::new(id, owner, "t");
        canvas.apply_patch(patch)?;
        Ok(canvas)
    }

    /// Mock store counting writes and remembering the last written revision
    fn counting_store() -> (Arc<dyn CanvasStore>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let writes = Arc::new(AtomicUsize::new(0));
        let last_revision = Arc::new(AtomicUsize::new(0));

        let mut store = MockCanvasStore::new();
        let counter = writes.clone();
        let last = last_revision.clone();
        store
            .expect_update_canvas()
            .returning(move |id, patch, owner| {
                counter.fetch_add(1, Ordering::SeqCst);
                last.store(patch.revision.unwrap_or_default() as usize, Ordering::SeqCst);
                saved(id, patch, owner)
            });

        (Arc::new(store), writes, last_revision)
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_changes_is_one_write() {
        let (store, writes, last_revision) = counting_store();
        let autosave = AutoSaveCoordinator::new(store, DELAY);

        for revision in 1..=5 {
            let outcome = autosave
                .schedule("ada", "c1", revision, nodes(revision as usize), Vec::new())
                .await;
            assert_eq!(outcome, ScheduleOutcome::Scheduled);
            advance(1).await;
        }
        assert_eq!(writes.load(Ordering::SeqCst), 0);

        advance(10).await;
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(last_revision.load(Ordering::SeqCst), 5);

        let status = autosave.status("ada", "c1").await;
        assert!(!status.dirty);
        assert_eq!(status.saved_revision, Some(5));
        assert!(status.last_saved_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_content_is_written_once() {
        let (store, writes, _) = counting_store();
        let autosave = AutoSaveCoordinator::new(store, DELAY);

        assert_eq!(
            autosave.schedule("ada", "c1", 1, nodes(1), Vec::new()).await,
            ScheduleOutcome::Scheduled
        );
        for _ in 0..3 {
            assert_eq!(
                autosave.schedule("ada", "c1", 1, nodes(1), Vec::new()).await,
                ScheduleOutcome::Unchanged
            );
        }

        advance(11).await;
        assert_eq!(writes.load(Ordering::SeqCst), 1);

        assert_eq!(
            autosave.schedule("ada", "c1", 1, nodes(1), Vec::new()).await,
            ScheduleOutcome::Unchanged
        );
        advance(30).await;
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_then_save_now_writes_once() {
        let (store, writes, _) = counting_store();
        let autosave = AutoSaveCoordinator::new(store, DELAY);

        autosave.schedule("ada", "c1", 3, nodes(2), Vec::new()).await;
        let outcome = autosave
            .save_now("ada", "c1", 3, nodes(2), Vec::new())
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Saved { revision: 3 });
        assert_eq!(writes.load(Ordering::SeqCst), 1);

        advance(30).await;
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_now_when_clean() {
        let (store, writes, _) = counting_store();
        let autosave = AutoSaveCoordinator::new(store, DELAY);

        autosave.save_now("ada", "c1", 2, nodes(1), Vec::new()).await.unwrap();
        let outcome = autosave
            .save_now("ada", "c1", 2, nodes(1), Vec::new())
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Clean);
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_change_restarts_timer() {
        let (store, writes, last_revision) = counting_store();
        let autosave = AutoSaveCoordinator::new(store, DELAY);

        autosave.schedule("ada", "c1", 1, nodes(1), Vec::new()).await;
        advance(6).await;
        autosave.schedule("ada", "c1", 2, nodes(2), Vec::new()).await;
        advance(6).await;
        assert_eq!(writes.load(Ordering::SeqCst), 0);

        advance(5).await;
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(last_revision.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_revision_is_ignored() {
        let (store, writes, last_revision) = counting_store();
        let autosave = AutoSaveCoordinator::new(store, DELAY);

        autosave.schedule("ada", "c1", 4, nodes(3), Vec::new()).await;
        assert_eq!(
            autosave.schedule("ada", "c1", 2, nodes(1), Vec::new()).await,
            ScheduleOutcome::Unchanged
        );

        advance(11).await;
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(last_revision.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_stays_dirty_and_retries() {
        let writes = Arc::new(AtomicUsize::new(0));
        let counter = writes.clone();

        let mut store = MockCanvasStore::new();
        store
            .expect_update_canvas()
            .returning(move |id, patch, owner| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::database("database is locked"))
                } else {
                    saved(id, patch, owner)
                }
            });
        let autosave = AutoSaveCoordinator::new(Arc::new(store), DELAY);

        autosave.schedule("ada", "c1", 7, nodes(2), Vec::new()).await;
        advance(11).await;
        assert_eq!(writes.load(Ordering::SeqCst), 1);

        let status = autosave.status("ada", "c1").await;
        assert!(status.dirty);
        assert_eq!(status.pending_revision, Some(7));
        assert_eq!(status.saved_revision, None);
        assert!(status.last_error.is_some());

        // same revision is not "unchanged" while the last write failed
        assert_eq!(
            autosave.schedule("ada", "c1", 7, nodes(2), Vec::new()).await,
            ScheduleOutcome::Scheduled
        );
        let outcome = autosave
            .save_now("ada", "c1", 7, nodes(2), Vec::new())
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Saved { revision: 7 });

        let status = autosave.status("ada", "c1").await;
        assert!(!status.dirty);
        assert!(status.last_error.is_none());
        assert_eq!(writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_now_reports_failure() {
        let mut store = MockCanvasStore::new();
        store
            .expect_update_canvas()
            .returning(|id, _, _| Err(Error::CanvasNotFound(id.to_string())));
        let autosave = AutoSaveCoordinator::new(Arc::new(store), DELAY);

        let err = autosave
            .save_now("ada", "gone", 1, nodes(1), Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(autosave.status("ada", "gone").await, AutoSaveStatus::default());
        assert_eq!(autosave.active_slots().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_writes_are_not_retried() {
        let writes = Arc::new(AtomicUsize::new(0));
        let counter = writes.clone();

        let mut store = MockCanvasStore::new();
        store
            .expect_update_canvas()
            .returning(move |id, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::CanvasNotFound(id.to_string()))
            });
        let autosave = AutoSaveCoordinator::new(Arc::new(store), DELAY);

        for i in 0..100 {
            autosave
                .schedule("ada", &format!("missing-{}", i), 1, nodes(1), Vec::new())
                .await;
        }
        assert_eq!(autosave.dirty_count().await, 100);

        advance(3600).await;
        assert_eq!(writes.load(Ordering::SeqCst), 100);
        assert_eq!(autosave.dirty_count().await, 0);
        assert_eq!(autosave.active_slots().await, 0);

        assert_eq!(autosave.flush_all().await, 0);
        assert_eq!(writes.load(Ordering::SeqCst), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recoverable_failure_keeps_slot() {
        let mut store = MockCanvasStore::new();
        store
            .expect_update_canvas()
            .returning(|_, _, _| Err(Error::database("disk I/O error")));
        let autosave = AutoSaveCoordinator::new(Arc::new(store), DELAY);

        assert!(autosave
            .save_now("ada", "c1", 1, nodes(1), Vec::new())
            .await
            .is_err());
        assert_eq!(autosave.active_slots().await, 1);
        assert_eq!(autosave.dirty_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_slots_are_released() {
        let (store, writes, _) = counting_store();
        let autosave = AutoSaveCoordinator::new(store, DELAY);

        for i in 0..500 {
            autosave
                .save_now("ada", &format!("c{}", i), 1, nodes(1), Vec::new())
                .await
                .unwrap();
        }
        assert_eq!(writes.load(Ordering::SeqCst), 500);
        assert_eq!(autosave.active_slots().await, 0);

        autosave.schedule("ada", "timed", 1, nodes(1), Vec::new()).await;
        assert_eq!(autosave.active_slots().await, 1);
        advance(11).await;
        assert_eq!(autosave.active_slots().await, 0);

        // the saved revision outlives the slot
        let status = autosave.status("ada", "c7").await;
        assert!(!status.dirty);
        assert_eq!(status.saved_revision, Some(1));
        assert_eq!(
            autosave.schedule("ada", "c7", 1, nodes(1), Vec::new()).await,
            ScheduleOutcome::Unchanged
        );
        assert_eq!(
            autosave.save_now("ada", "c7", 1, nodes(1), Vec::new()).await.unwrap(),
            SaveOutcome::Clean
        );
        assert_eq!(autosave.active_slots().await, 0);
        assert_eq!(writes.load(Ordering::SeqCst), 501);

        autosave.discard("ada", "c7").await;
        assert_eq!(autosave.status("ada", "c7").await, AutoSaveStatus::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_cancels_timer() {
        let (store, writes, _) = counting_store();
        let autosave = AutoSaveCoordinator::new(store, DELAY);

        autosave.schedule("ada", "c1", 1, nodes(1), Vec::new()).await;
        assert!(autosave.discard("ada", "c1").await);
        assert!(!autosave.discard("ada", "c1").await);

        advance(30).await;
        assert_eq!(writes.load(Ordering::SeqCst), 0);
        assert_eq!(autosave.status("ada", "c1").await, AutoSaveStatus::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_are_independent() {
        let (store, writes, _) = counting_store();
        let autosave = AutoSaveCoordinator::new(store, DELAY);

        autosave.schedule("ada", "c1", 1, nodes(1), Vec::new()).await;
        autosave.schedule("ada", "c2", 1, nodes(1), Vec::new()).await;
        autosave.schedule("bob", "c1", 1, nodes(1), Vec::new()).await;
        assert_eq!(autosave.dirty_count().await, 3);

        advance(11).await;
        assert_eq!(writes.load(Ordering::SeqCst), 3);
        assert_eq!(autosave.dirty_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_all_writes_pending() {
        let (store, writes, _) = counting_store();
        let autosave = AutoSaveCoordinator::new(store, DELAY);

        autosave.schedule("ada", "c1", 1, nodes(1), Vec::new()).await;
        autosave.schedule("ada", "c2", 1, nodes(1), Vec::new()).await;

        assert_eq!(autosave.flush_all().await, 2);
        assert_eq!(writes.load(Ordering::SeqCst), 2);

        advance(30).await;
        assert_eq!(writes.load(Ordering::SeqCst), 2);
        assert_eq!(autosave.flush_all().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_timers() {
        let (store, writes, _) = counting_store();
        let autosave = AutoSaveCoordinator::new(store, DELAY);

        autosave.schedule("ada", "c1", 1, nodes(1), Vec::new()).await;
        assert_eq!(autosave.shutdown().await, 1);

        advance(30).await;
        assert_eq!(writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_config_defaults() {
        let config = AutoSaveConfig::default();
        assert_eq!(config.delay(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
        assert!(AutoSaveConfig { delay_ms: 0 }.validate().is_err());
    }
