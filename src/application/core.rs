//! Store scheduler.
//!
//! [`Core`] owns every store and runs one background task per enabled store:
//! the task initializes its store once and then syncs it on a fixed interval
//! until shutdown. Extra tasks started with [`Core::start_task`] share the
//! same shutdown signal and are awaited by [`Core::stop`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use metrics::counter;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::application::stores::{
    AccountRoleStore, AccountStore, PoolStore, ProblemStore, QuizStore, RoleEdgeStore, RoleStore,
    SessionStore, SettingStore, UserStore, VisitStore,
};
use crate::cache::{
    CacheConfig, CacheStore, Database, Store, StoreError, StoreIndexes, TxMode, in_write_tx,
    within_write_tx,
};
use crate::config::{SecuritySettings, StoreSettings};

pub const SETTING_TABLE: &str = "quiz_setting";
pub const SETTING_EVENT_TABLE: &str = "quiz_setting_event";
pub const ROLE_TABLE: &str = "quiz_role";
pub const ROLE_EVENT_TABLE: &str = "quiz_role_event";
pub const ROLE_EDGE_TABLE: &str = "quiz_role_edge";
pub const ROLE_EDGE_EVENT_TABLE: &str = "quiz_role_edge_event";
pub const ACCOUNT_TABLE: &str = "quiz_account";
pub const ACCOUNT_EVENT_TABLE: &str = "quiz_account_event";
pub const ACCOUNT_ROLE_TABLE: &str = "quiz_account_role";
pub const ACCOUNT_ROLE_EVENT_TABLE: &str = "quiz_account_role_event";
pub const SESSION_TABLE: &str = "quiz_session";
pub const SESSION_EVENT_TABLE: &str = "quiz_session_event";
pub const USER_TABLE: &str = "quiz_user";
pub const USER_EVENT_TABLE: &str = "quiz_user_event";
pub const QUIZ_TABLE: &str = "quiz_quiz";
pub const QUIZ_EVENT_TABLE: &str = "quiz_quiz_event";
pub const POOL_TABLE: &str = "quiz_pool";
pub const POOL_EVENT_TABLE: &str = "quiz_pool_event";
pub const PROBLEM_TABLE: &str = "quiz_problem";
pub const PROBLEM_EVENT_TABLE: &str = "quiz_problem_event";
pub const VISIT_TABLE: &str = "quiz_visit";

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("core is already running")]
    AlreadyRunning,
    #[error("core is not running")]
    NotRunning,
    #[error("failed to initialize store `{store}`: {source}")]
    Init {
        store: &'static str,
        #[source]
        source: StoreError,
    },
}

struct Running {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Core<D: Database> {
    pub settings: Arc<SettingStore<D>>,
    pub roles: Arc<RoleStore<D>>,
    pub role_edges: Arc<RoleEdgeStore<D>>,
    pub accounts: Arc<AccountStore<D>>,
    pub account_roles: Arc<AccountRoleStore<D>>,
    pub sessions: Arc<SessionStore<D>>,
    /// Present only when a password salt is configured.
    pub users: Option<Arc<UserStore<D>>>,
    pub quizzes: Arc<QuizStore<D>>,
    pub pools: Arc<PoolStore<D>>,
    pub problems: Arc<ProblemStore<D>>,
    pub visits: Arc<VisitStore<D>>,
    db: D,
    fast_interval: Duration,
    slow_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl<D: Database> Core<D> {
    pub fn new(db: D, stores: &StoreSettings, security: Option<&SecuritySettings>) -> Self {
        let config = CacheConfig::from(stores);
        let users = security.map(|security| {
            Arc::new(UserStore::new(
                db.clone(),
                USER_TABLE,
                USER_EVENT_TABLE,
                config.clone(),
                security.password_salt.clone(),
            ))
        });

        Self {
            settings: cache_store(&db, SETTING_TABLE, SETTING_EVENT_TABLE, &config),
            roles: cache_store(&db, ROLE_TABLE, ROLE_EVENT_TABLE, &config),
            role_edges: cache_store(&db, ROLE_EDGE_TABLE, ROLE_EDGE_EVENT_TABLE, &config),
            accounts: cache_store(&db, ACCOUNT_TABLE, ACCOUNT_EVENT_TABLE, &config),
            account_roles: cache_store(&db, ACCOUNT_ROLE_TABLE, ACCOUNT_ROLE_EVENT_TABLE, &config),
            sessions: cache_store(&db, SESSION_TABLE, SESSION_EVENT_TABLE, &config),
            users,
            quizzes: cache_store(&db, QUIZ_TABLE, QUIZ_EVENT_TABLE, &config),
            pools: cache_store(&db, POOL_TABLE, POOL_EVENT_TABLE, &config),
            problems: cache_store(&db, PROBLEM_TABLE, PROBLEM_EVENT_TABLE, &config),
            visits: Arc::new(VisitStore::new(db.clone(), VISIT_TABLE)),
            fast_interval: stores.fast_sync_interval,
            slow_interval: stores.slow_sync_interval,
            running: Mutex::new(None),
            db,
        }
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    /// Enabled stores with their sync intervals, in start order.
    pub fn stores(&self) -> Vec<(Arc<dyn Store>, Duration)> {
        let slow = self.slow_interval;
        let fast = self.fast_interval;
        let mut stores = vec![
            scheduled(self.settings.clone(), slow),
            scheduled(self.roles.clone(), slow),
            scheduled(self.role_edges.clone(), slow),
            scheduled(self.accounts.clone(), fast),
            scheduled(self.account_roles.clone(), fast),
            scheduled(self.sessions.clone(), fast),
        ];
        if let Some(users) = &self.users {
            stores.push(scheduled(users.clone(), fast));
        }
        stores.push(scheduled(self.quizzes.clone(), slow));
        stores.push(scheduled(self.pools.clone(), slow));
        stores.push(scheduled(self.problems.clone(), slow));
        stores
    }

    /// Initializes every enabled store and starts their sync loops. Returns
    /// once all stores finished init. If any init fails, every task is
    /// stopped again and the last failure is returned.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(CoreError::AlreadyRunning);
        }
        info!("Starting core");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let stores = self.stores();
        let (init_tx, mut init_rx) = mpsc::channel(stores.len().max(1));
        let tasks: Vec<JoinHandle<()>> = stores
            .into_iter()
            .map(|(store, interval)| {
                tokio::spawn(run_store_loop(
                    store,
                    interval,
                    shutdown_rx.clone(),
                    init_tx.clone(),
                ))
            })
            .collect();
        drop(init_tx);

        let mut result = Ok(());
        while let Some(outcome) = init_rx.recv().await {
            if let Err(err) = outcome {
                error!(error = %err, "Store initialization failed");
                result = Err(err);
            }
        }

        let started = Running { shutdown, tasks };
        if result.is_err() {
            stop_tasks(started).await;
            return result;
        }
        *running = Some(started);
        info!("Core started");
        Ok(())
    }

    /// Signals every sync loop to exit and waits for all of them. In-flight
    /// syncs are abandoned and their transactions rolled back.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        stop_tasks(running).await;
        info!("Core stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Spawns `task` next to the sync loops. The task receives the core's
    /// shutdown signal and must return once it flips to `true`; [`Core::stop`]
    /// waits for it.
    pub async fn start_task<F, Fut>(&self, task: F) -> Result<(), CoreError>
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.running.lock().await;
        let running = guard.as_mut().ok_or(CoreError::NotRunning)?;
        debug!("Start core task");
        let shutdown = running.shutdown.subscribe();
        let future = task(shutdown);
        running.tasks.push(tokio::spawn(async move {
            future.await;
            debug!("Core task finished");
        }));
        Ok(())
    }

    /// Runs `f` inside one read-write transaction and commits it if `f`
    /// succeeds. Store writes made through the `*_in` methods with the given
    /// transaction commit or roll back together.
    ///
    /// Inside `f`, the standalone `create`/`update`/`delete` methods and a
    /// nested `wrap_tx` fail with [`StoreError::NestedTransaction`]: they
    /// would wait for the writer lock held by `f`'s own transaction. Reads,
    /// `init` and `sync` are allowed.
    pub async fn wrap_tx<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: for<'t> FnOnce(&'t mut D::Tx) -> BoxFuture<'t, Result<R, StoreError>>,
    {
        if in_write_tx() {
            return Err(StoreError::NestedTransaction);
        }
        let mut tx = self.db.begin(TxMode::ReadWrite).await?;
        let value = within_write_tx(f(&mut tx)).await?;
        self.db.commit(tx).await?;
        Ok(value)
    }
}

fn cache_store<S: StoreIndexes, D: Database>(
    db: &D,
    table: &str,
    event_table: &str,
    config: &CacheConfig,
) -> Arc<CacheStore<S, D>> {
    Arc::new(CacheStore::new(db.clone(), table, event_table, config.clone()))
}

fn scheduled(store: Arc<dyn Store>, interval: Duration) -> (Arc<dyn Store>, Duration) {
    (store, interval)
}

async fn stop_tasks(running: Running) {
    let _ = running.shutdown.send(true);
    for task in running.tasks {
        if let Err(err) = task.await {
            warn!(error = %err, "Store task ended abnormally");
        }
    }
}

async fn run_store_loop(
    store: Arc<dyn Store>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    init_done: mpsc::Sender<Result<(), CoreError>>,
) {
    let name = store.name();
    debug!(store = name, "Store task started");

    let outcome = tokio::select! {
        result = store.init() => result,
        _ = shutdown.changed() => {
            debug!(store = name, "Store task cancelled during init");
            return;
        }
    };
    let initialized = outcome.is_ok();
    let _ = init_done
        .send(outcome.map_err(|source| CoreError::Init {
            store: name,
            source,
        }))
        .await;
    drop(init_done);
    if !initialized {
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; init just brought the store up to date.
    ticker.tick().await;

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    result = store.sync() => {
                        if let Err(err) = result {
                            counter!("quizstore_store_sync_errors_total", "store" => name)
                                .increment(1);
                            warn!(
                                store = name,
                                error = %err,
                                retryable = err.is_retryable(),
                                "Store sync failed"
                            );
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }
    }
    debug!(store = name, "Store task finished");
}
