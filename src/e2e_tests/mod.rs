#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    use crate::app::TodoContext;
    use crate::cache::{CacheKey, EntryStatus, TaskView};
    use crate::config::Config;
    use crate::controller::ControllerError;
    use crate::datastore::{MemoryStorage, Simulation, TaskStorage};
    use crate::model::{EntityId, NewList, NewTask, Priority, Status, Task};
    use crate::query::QueryState;

    const LATENCY: Duration = Duration::from_millis(500);

    fn slow_storage() -> Arc<MemoryStorage> {
        Arc::new(MemoryStorage::with_simulation(Simulation {
            latency_min: LATENCY,
            latency_max: LATENCY,
            failure_rate: 0.0,
        }))
    }

    fn names(state: &QueryState<Task>) -> Vec<&str> {
        state
            .data()
            .unwrap_or_default()
            .iter()
            .map(|task| task.name.as_str())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_shows_provisional_task_until_confirmed() {
        // GIVEN list 1 with 41 tasks, so the next one gets id 42
        let storage = slow_storage();
        storage.seed_list(NewList::new("Groceries"));
        for n in 0..41 {
            storage.seed_task(NewTask::new(format!("task {}", n), 1)).unwrap();
        }
        let ctx = TodoContext::new(Config::default(), storage);
        let mut view = ctx.queries.tasks(TaskView::ByList(1));
        view.settled().await;

        // WHEN
        let pending = ctx
            .mutations
            .begin_create_task(NewTask::new("Buy milk", 1).with_priority(Priority::Medium))
            .unwrap();
        let temporary = pending.temporary_id().unwrap();
        let commit = tokio::spawn(pending.commit());
        sleep(LATENCY / 2).await;

        // THEN the task is there with its temporary id
        let state = view.state();
        let head = &state.data().unwrap()[0];
        assert_eq!(head.name, "Buy milk");
        assert_eq!(head.id, temporary);
        assert!(!commit.is_finished());

        // WHEN storage confirms
        commit.await.unwrap().unwrap();

        // THEN
        let tasks = view.state().into_data().unwrap();
        assert_eq!(tasks[0].id, EntityId::Stored(42));
        assert_eq!(tasks[0].name, "Buy milk");
        assert_eq!(tasks.iter().filter(|task| task.name == "Buy milk").count(), 1);
        assert!(tasks.iter().all(|task| !task.id.is_temporary()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_toggle_reverts() {
        // GIVEN task 5, pending
        let storage = slow_storage();
        storage.seed_list(NewList::new("Chores"));
        for n in 1..=5 {
            storage.seed_task(NewTask::new(format!("chore {}", n), 1)).unwrap();
        }
        let ctx = TodoContext::new(Config::default(), storage.clone());
        let mut view = ctx.queries.tasks(TaskView::All);
        view.settled().await;
        let task = |state: QueryState<Task>| {
            state
                .into_data()
                .unwrap()
                .into_iter()
                .find(|task| task.id == EntityId::Stored(5))
                .unwrap()
        };
        let before = task(view.state());
        assert!(!before.is_completed);

        // WHEN
        storage.fail_next(1);
        let pending = ctx.mutations.begin_toggle_completion(5).unwrap();

        // THEN
        let patched = task(view.state());
        assert!(patched.is_completed);
        assert_eq!(patched.status, Status::Completed);

        // WHEN storage fails
        let err = pending.commit().await.unwrap_err();

        // THEN
        assert!(matches!(err, ControllerError::Storage(_)));
        let reverted = task(view.state());
        assert_eq!(reverted, before);
        assert_eq!(reverted.status, Status::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_hides_task_and_refreshes_derived_views() {
        // GIVEN task 9 in list 3, loaded in `All`, `ByList(3)` and `Completed`
        let storage = slow_storage();
        for name in ["Home", "Work", "Garden"] {
            storage.seed_list(NewList::new(name));
        }
        for n in 1..=9 {
            let list_id = if n == 9 { 3 } else { 1 };
            storage
                .seed_task(NewTask::new(format!("task {}", n), list_id).with_status(Status::Completed))
                .unwrap();
        }
        let ctx = TodoContext::new(Config::default(), storage.clone());
        let mut all = ctx.queries.tasks(TaskView::All);
        let mut in_list = ctx.queries.tasks(TaskView::ByList(3));
        let mut completed = ctx.queries.tasks(TaskView::Completed);
        all.settled().await;
        in_list.settled().await;
        assert!(names(&completed.settled().await).contains(&"task 9"));
        let upcoming = CacheKey::Task(TaskView::Upcoming);
        ctx.cache.set(&upcoming, Vec::<Task>::new());

        // WHEN
        let commit = tokio::spawn(ctx.mutations.begin_delete_task(9).unwrap().commit());

        // THEN both views drop it before storage answers
        assert!(!names(&all.state()).contains(&"task 9"));
        assert!(names(&in_list.state()).is_empty());

        // WHEN storage confirms
        commit.await.unwrap().unwrap();

        // THEN
        assert!(!names(&all.state()).contains(&"task 9"));
        assert!(names(&in_list.state()).is_empty());
        assert_eq!(ctx.cache.status(&upcoming), EntryStatus::Stale);
        while ctx.cache.status(completed.key()) != EntryStatus::Fresh {
            assert!(completed.changed().await);
        }
        let refreshed = completed.state();
        assert!(!names(&refreshed).contains(&"task 9"));
        assert_eq!(names(&refreshed).len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_task_twice_is_busy_until_settled() {
        let storage = slow_storage();
        storage.seed_list(NewList::new("Chores"));
        storage.seed_task(NewTask::new("Dishes", 1)).unwrap();
        let ctx = TodoContext::new(Config::default(), storage);
        let mut view = ctx.queries.tasks(TaskView::All);
        view.settled().await;

        let mutations = ctx.mutations.clone();
        let first = tokio::spawn(async move { mutations.toggle_completion(1).await });
        sleep(LATENCY / 10).await;

        assert_eq!(
            ctx.mutations.toggle_completion(1).await,
            Err(ControllerError::Busy(crate::model::EntityRef::task(1)))
        );
        first.await.unwrap().unwrap();
        assert!(view.state().data().unwrap()[0].is_completed);
        ctx.mutations.toggle_completion(1).await.unwrap();
        assert!(!view.state().data().unwrap()[0].is_completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_during_toggle_keeps_views_in_agreement() {
        // GIVEN `All` and `ByList(1)` loaded, `All` being refetched
        let storage = Arc::new(MemoryStorage::with_simulation(Simulation {
            latency_min: Duration::from_millis(100),
            latency_max: Duration::from_millis(100),
            failure_rate: 0.0,
        }));
        storage.seed_list(NewList::new("Chores"));
        storage.seed_task(NewTask::new("Dishes", 1)).unwrap();
        let ctx = TodoContext::new(Config::default(), storage.clone());
        let mut all = ctx.queries.tasks(TaskView::All);
        let mut in_list = ctx.queries.tasks(TaskView::ByList(1));
        all.settled().await;
        in_list.settled().await;
        let all_key = all.key().clone();
        ctx.queries.invalidate(move |key: &CacheKey| *key == all_key);
        let completed = |state: QueryState<Task>| state.into_data().unwrap()[0].is_completed;

        // WHEN `All` is read again while the toggle is pending
        let pending = ctx.mutations.begin_toggle_completion(1).unwrap();
        assert!(completed(all.state()));
        sleep(Duration::from_millis(50)).await;
        pending.commit().await.unwrap();

        // THEN the refetched rows carry the toggle too
        assert!(storage.task(1).await.unwrap().unwrap().is_completed);
        assert!(completed(all.state()));
        assert!(completed(in_list.state()));
        assert_eq!(ctx.cache.status(all.key()), EntryStatus::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_during_failed_toggle_is_corrected() {
        // GIVEN
        let storage = slow_storage();
        storage.seed_list(NewList::new("Chores"));
        storage.seed_task(NewTask::new("Dishes", 1)).unwrap();
        let ctx = TodoContext::new(Config::default(), storage.clone());
        let mut all = ctx.queries.tasks(TaskView::All);
        all.settled().await;

        // WHEN `All` is refetched under the pending toggle
        let pending = ctx.mutations.begin_toggle_completion(1).unwrap();
        ctx.queries.invalidate(|key: &CacheKey| *key == CacheKey::Task(TaskView::All));
        sleep(LATENCY * 2).await;

        // THEN the fetched rows carry the toggle
        assert_eq!(ctx.cache.status(all.key()), EntryStatus::Fresh);
        assert!(all.state().into_data().unwrap()[0].is_completed);

        // WHEN storage fails
        storage.fail_next(1);
        assert!(pending.commit().await.is_err());

        // THEN once refetched, the view matches storage again
        while ctx.cache.status(all.key()) != EntryStatus::Fresh {
            assert!(all.changed().await);
        }
        assert!(!all.state().into_data().unwrap()[0].is_completed);
    }
}
