use anyhow::anyhow;
use dotenv::dotenv;
use std::env;
use std::sync::Arc;
use tokio::runtime::Builder;
use tracing::{event, info, warn, Level};
use tracing_subscriber::EnvFilter;

use todocache::app::TodoContext;
use todocache::cache::ListView;
use todocache::config::Config;
use todocache::controller::ControllerError;
use todocache::datastore::{MemoryStorage, Simulation, Storage};
use todocache::log;
use todocache::model::{EntityId, NewList, NewTask, Priority, Status};
use todocache::query::QueryState;

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = match env::var("TODOCACHE_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::default(),
    };
    let env_filter = EnvFilter::try_from_env("TODOCACHE_LOG");
    log::setup(env_filter, config.log.as_ref())?;

    event!(Level::INFO, "Starting todocache: {}", env!("FULL_VERSION"));

    let storage = Arc::new(MemoryStorage::with_simulation(Simulation::from_config(
        &config.storage,
    )));
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let ctx = TodoContext::new(config, storage);
    runtime.block_on(session(&ctx))?;
    ctx.save_session()?;
    Ok(())
}

// a short scripted session over the simulated storage
async fn session<S: Storage>(ctx: &TodoContext<S>) -> anyhow::Result<()> {
    if ctx.restore_session()? {
        info!(list = ?ctx.ui.selected_list(), "Previous session restored.");
    }

    let groceries = ctx.mutations.create_list(NewList::new("Groceries")).await?;
    let list_id = stored_id(groceries.id, &groceries.name)?;
    ctx.ui.select_list(Some(list_id));

    let mut lists = ctx.queries.lists(ListView::All);
    let mut tasks = ctx.queries.tasks(ctx.ui.task_view());
    report("lists", &lists.settled().await);
    report("tasks", &tasks.settled().await);

    let milk = ctx
        .mutations
        .create_task(NewTask::new("Buy milk", list_id).with_priority(Priority::Medium))
        .await?;
    let milk_id = stored_id(milk.id, &milk.name)?;
    ctx.mutations
        .create_task(NewTask::new("Buy bread", list_id).with_priority(Priority::High))
        .await?;
    report("tasks", &tasks.state());

    match ctx.mutations.toggle_completion(milk_id).await {
        Ok(()) => info!(id = milk_id, "Task completed."),
        Err(err) if err.is_retryable() => warn!(reason = %err, "Toggle failed, try again."),
        Err(err) => return Err(err.into()),
    }
    ctx.mutations
        .update_status(milk_id, Status::InProgress)
        .await
        .or_else(ignore_storage_failure)?;

    let mut search = ctx.queries.search_tasks("Buy");
    report("search", &search.settled().await);

    ctx.mutations
        .delete_task(milk_id)
        .await
        .or_else(ignore_storage_failure)?;
    report("tasks", &tasks.settled().await);
    report("lists", &lists.state());
    Ok(())
}

fn stored_id(id: EntityId, name: &str) -> anyhow::Result<i64> {
    id.stored()
        .ok_or_else(|| anyhow!("{:?} was not assigned a stored id", name))
}

fn ignore_storage_failure(err: ControllerError) -> Result<(), ControllerError> {
    match err {
        ControllerError::Storage(reason) => {
            warn!(reason = %reason, "Storage failed, cache rolled back.");
            Ok(())
        }
        other => Err(other),
    }
}

fn report<T: std::fmt::Debug>(view: &str, state: &QueryState<T>) {
    match state {
        QueryState::Data(items) => info!(view, count = items.len(), "{:?}", items),
        QueryState::Error(err) => warn!(view, reason = %err, "view failed"),
        QueryState::Idle | QueryState::Loading => info!(view, "view not loaded"),
    }
}
