//! One live workflow instance: its state, its journal cursor, and its
//! in-flight effect tasks.

use crate::error::{DeliveryError, HostError, WorkflowError};
use crate::host::HostContext;
use crate::retry::run_activity;
use orderflow_core::effect::Effect;
use orderflow_core::journal::{JournalError, Origin};
use orderflow_core::reducer::Reducer;
use orderflow_core::workflow::{InstanceId, RunStatus, UpdateId, Workflow};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinSet;

/// Result of admitting a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Journaled and reduced
    Applied,
    /// An update with the same id was applied earlier
    Duplicate,
}

struct Core<W: Workflow> {
    state: W::State,
    next_sequence: u64,
    applied_updates: HashSet<UpdateId>,
    status: RunStatus<W::Failure>,
    /// Set when an effect result could not be journaled; the instance is unusable
    halted: Option<String>,
}

pub(crate) struct Instance<W: Workflow> {
    id: InstanceId,
    context: Arc<HostContext<W>>,
    core: RwLock<Core<W>>,
    /// Bumped after every applied action so waiters can re-check state
    changes: watch::Sender<u64>,
    activities: Mutex<JoinSet<()>>,
    timers: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl<W: Workflow> Instance<W> {
    pub(crate) fn new(
        id: InstanceId,
        context: Arc<HostContext<W>>,
        state: W::State,
        next_sequence: u64,
        applied_updates: HashSet<UpdateId>,
    ) -> Arc<Self> {
        let status = context.workflow.run_status(&state);
        let (changes, _) = watch::channel(0);

        Arc::new(Self {
            id,
            context,
            core: RwLock::new(Core {
                state,
                next_sequence,
                applied_updates,
                status,
                halted: None,
            }),
            changes,
            activities: Mutex::new(JoinSet::new()),
            timers: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Validate (optionally), journal, reduce, then run the resulting effects.
    ///
    /// The write lock is held from the duplicate check until the reducer has
    /// returned, so validation always sees the state the action is applied to.
    #[tracing::instrument(skip_all, fields(instance_id = %self.id, origin = ?origin), name = "admit")]
    pub(crate) async fn admit(
        self: &Arc<Self>,
        origin: Origin,
        action: W::Action,
        validate: bool,
    ) -> Result<Admission, WorkflowError<W>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HostError::ShutdownInProgress.into());
        }

        let effects = {
            let mut core = self.core.write().await;

            if let Some(reason) = &core.halted {
                return Err(halted(reason).into());
            }
            if let Origin::Update(update_id) = &origin {
                if core.applied_updates.contains(update_id) {
                    return Ok(Admission::Duplicate);
                }
            }
            if core.status.is_terminal() {
                tracing::debug!(status = ?core.status, "Dropping command for stopped instance");
                return Err(HostError::InstanceClosed(self.id.clone()).into());
            }
            if validate {
                if let Err(rejection) = self.context.workflow.validate(&core.state, &action) {
                    tracing::warn!(error = %rejection, "Command rejected");
                    return Err(DeliveryError::Rejected(rejection));
                }
            }

            let payload = bincode::serialize(&action).map_err(HostError::from)?;
            let record = self
                .context
                .record(&self.id, core.next_sequence, origin.clone(), payload);
            self.context
                .journal
                .append(record)
                .await
                .map_err(HostError::from)?;
            core.next_sequence += 1;

            if let Origin::Update(update_id) = origin {
                core.applied_updates.insert(update_id);
            }

            let effects = self
                .context
                .workflow
                .reduce(&mut core.state, action, &self.context.environment);
            core.status = self.context.workflow.run_status(&core.state);
            tracing::trace!(effects = effects.len(), "Reducer completed");

            if core.status.is_terminal() {
                tracing::info!(status = ?core.status, "Instance stopped");
                None
            } else {
                Some(effects)
            }
        };

        self.changes.send_modify(|version| *version += 1);

        // Running activities finish; their late results are dropped.
        match effects {
            Some(effects) => self.resume(effects),
            None => abort(&self.timers),
        }

        Ok(Admission::Applied)
    }

    /// Execute effects unless the instance already stopped.
    pub(crate) fn resume(self: &Arc<Self>, effects: impl IntoIterator<Item = Effect<W::Action>>) {
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(self: &Arc<Self>, effect: Effect<W::Action>) {
        match effect {
            Effect::None => {}
            Effect::Activity(activity) => {
                tracing::debug!(
                    instance_id = %self.id,
                    activity = activity.name(),
                    effect_id = %activity.id(),
                    "Scheduling activity"
                );
                let instance = Arc::clone(self);
                spawn(&self.activities, async move {
                    let origin = Origin::Activity(activity.id());
                    let action = run_activity(&instance.context.retry_policy, activity).await;
                    instance.feed_back(origin, action).await;
                });
            }
            Effect::Timer {
                id,
                duration,
                action,
            } => {
                tracing::debug!(instance_id = %self.id, effect_id = %id, ?duration, "Arming timer");
                let instance = Arc::clone(self);
                spawn(&self.timers, async move {
                    tokio::time::sleep(duration).await;
                    instance.feed_back(Origin::Timer(id), *action).await;
                });
            }
        }
    }

    async fn feed_back(self: &Arc<Self>, origin: Origin, action: W::Action) {
        match self.admit(origin.clone(), action, false).await {
            Ok(_) => {}
            Err(DeliveryError::Host(
                error @ (HostError::Journal(_) | HostError::Serialization(_)),
            )) => self.halt(&origin, &error).await,
            Err(error) => {
                tracing::debug!(instance_id = %self.id, error = %error, "Effect result dropped");
            }
        }
    }

    /// Stop the instance after an effect result was lost, and wake every waiter.
    async fn halt(&self, origin: &Origin, error: &HostError) {
        {
            let mut core = self.core.write().await;
            if core.halted.is_some() {
                tracing::debug!(
                    instance_id = %self.id,
                    origin = ?origin,
                    "Effect result dropped by halted instance"
                );
                return;
            }
            core.halted = Some(error.to_string());
        }
        tracing::error!(
            instance_id = %self.id,
            origin = ?origin,
            error = %error,
            "Effect result could not be journaled, halting instance"
        );
        abort(&self.timers);
        self.changes.send_modify(|version| *version += 1);
    }

    /// Stop accepting commands and abort in-flight effects.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        abort(&self.activities);
        abort(&self.timers);
        self.changes.send_modify(|version| *version += 1);
    }

    pub(crate) async fn read<T>(&self, f: impl FnOnce(&W::State) -> T) -> T {
        let core = self.core.read().await;
        f(&core.state)
    }

    pub(crate) async fn is_running(&self) -> bool {
        let core = self.core.read().await;
        core.halted.is_none() && !core.status.is_terminal()
    }

    /// Wait until the workflow reports an outcome for `update_id`.
    pub(crate) async fn wait_for_update(&self, update_id: &UpdateId) -> Result<(), WorkflowError<W>> {
        let mut changes = self.changes.subscribe();

        loop {
            {
                let core = self.core.read().await;
                if let Some(reason) = &core.halted {
                    return Err(halted(reason).into());
                }
                if let Some(outcome) = self.context.workflow.update_outcome(&core.state, update_id) {
                    return outcome.map_err(DeliveryError::Failed);
                }
                match &core.status {
                    RunStatus::Running => {}
                    RunStatus::Completed => {
                        return Err(HostError::InstanceClosed(self.id.clone()).into());
                    }
                    RunStatus::Cancelled => return Err(DeliveryError::Cancelled),
                    RunStatus::Failed(failure) => return Err(DeliveryError::Failed(failure.clone())),
                }
            }
            self.wait_for_change(&mut changes).await?;
        }
    }

    /// Wait until the instance stops.
    pub(crate) async fn wait_for_result(&self) -> Result<W::State, WorkflowError<W>> {
        let mut changes = self.changes.subscribe();

        loop {
            {
                let core = self.core.read().await;
                if let Some(reason) = &core.halted {
                    return Err(halted(reason).into());
                }
                match &core.status {
                    RunStatus::Running => {}
                    RunStatus::Completed => return Ok(core.state.clone()),
                    RunStatus::Cancelled => return Err(DeliveryError::Cancelled),
                    RunStatus::Failed(failure) => return Err(DeliveryError::Failed(failure.clone())),
                }
            }
            self.wait_for_change(&mut changes).await?;
        }
    }

    async fn wait_for_change(&self, changes: &mut watch::Receiver<u64>) -> Result<(), HostError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HostError::ShutdownInProgress);
        }
        changes
            .changed()
            .await
            .map_err(|_| HostError::InstanceClosed(self.id.clone()))
    }
}

fn halted(reason: &str) -> HostError {
    HostError::Journal(JournalError::Storage(format!("instance halted: {reason}")))
}

fn spawn<F>(tasks: &Mutex<JoinSet<()>>, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut tasks = lock(tasks);
    while tasks.try_join_next().is_some() {}
    tasks.spawn(task);
}

fn abort(tasks: &Mutex<JoinSet<()>>) {
    lock(tasks).abort_all();
}

fn lock(tasks: &Mutex<JoinSet<()>>) -> MutexGuard<'_, JoinSet<()>> {
    tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
