//! The durable execution host.
//!
//! A [`Host`] drives every instance of one [`Workflow`] type. Commands reach an
//! instance through the host; the host sequences them into the workflow one at
//! a time and journals each admitted action before it is reduced.

use crate::error::{DeliveryError, HostError, WorkflowError};
use crate::instance::{Admission, Instance};
use crate::retry::RetryPolicy;
use orderflow_core::effect::{Effect, EffectId};
use orderflow_core::environment::{Clock, SystemClock};
use orderflow_core::journal::{JournalRecord, JournalStore, Origin};
use orderflow_core::reducer::Reducer;
use orderflow_core::workflow::{InstanceId, UpdateId, Workflow};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Host configuration
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    /// Retry policy applied to every activity
    pub retry_policy: RetryPolicy,
}

/// Caller-side reference to a started instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceHandle {
    id: InstanceId,
}

impl InstanceHandle {
    /// Reference an instance by id
    #[must_use]
    pub const fn new(id: InstanceId) -> Self {
        Self { id }
    }

    /// Id of the referenced instance
    #[must_use]
    pub const fn id(&self) -> &InstanceId {
        &self.id
    }
}

/// Everything an instance needs from its host, shared by all instances
pub(crate) struct HostContext<W: Workflow> {
    pub(crate) workflow: W,
    pub(crate) environment: W::Environment,
    pub(crate) journal: Arc<dyn JournalStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) retry_policy: RetryPolicy,
}

impl<W: Workflow> HostContext<W> {
    pub(crate) fn record(
        &self,
        instance_id: &InstanceId,
        sequence: u64,
        origin: Origin,
        payload: Vec<u8>,
    ) -> JournalRecord {
        JournalRecord {
            instance_id: instance_id.clone(),
            sequence,
            origin,
            recorded_at: self.clock.now(),
            payload,
        }
    }
}

/// Durable execution host for one workflow type
///
/// Stopped instances stay loaded so their final state can still be queried,
/// until [`Host::release_stopped`] drops them. A released instance can be
/// loaded again from its journal with [`Host::recover`].
///
/// # Example
///
/// ```ignore
/// let host = Host::new(workflow, environment, Arc::new(InMemoryJournal::new()));
/// let order = host.start_instance(input).await?;
/// host.send_signal(&order, "CHECKOUT", serde_json::Value::Null).await?;
/// let final_state = host.await_result(&order).await?;
/// ```
pub struct Host<W: Workflow> {
    context: Arc<HostContext<W>>,
    instances: RwLock<HashMap<InstanceId, Arc<Instance<W>>>>,
    shutdown: AtomicBool,
}

impl<W: Workflow> Host<W> {
    /// Create a host with the default configuration and the system clock
    #[must_use]
    pub fn new(workflow: W, environment: W::Environment, journal: Arc<dyn JournalStore>) -> Self {
        Self::with_config(workflow, environment, journal, HostConfig::default())
    }

    /// Create a host with a custom configuration
    #[must_use]
    pub fn with_config(
        workflow: W,
        environment: W::Environment,
        journal: Arc<dyn JournalStore>,
        config: HostConfig,
    ) -> Self {
        Self {
            context: Arc::new(HostContext {
                workflow,
                environment,
                journal,
                clock: Arc::new(SystemClock),
                retry_policy: config.retry_policy,
            }),
            instances: RwLock::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Replace the clock used to stamp journal records
    ///
    /// Must be called before any instance is started.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        if let Some(context) = Arc::get_mut(&mut self.context) {
            context.clock = clock;
        }
        self
    }

    /// Start a new instance with a generated id
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the input cannot be journaled.
    pub async fn start_instance(&self, input: W::Input) -> Result<InstanceHandle, HostError> {
        self.start_instance_with_id(InstanceId::generate(W::ID_PREFIX), input)
            .await
    }

    /// Start a new instance with a caller-chosen id
    ///
    /// # Errors
    ///
    /// - [`HostError::InstanceExists`]: the id is already loaded or journaled
    /// - [`HostError::Journal`] / [`HostError::Serialization`]: the start record could not be written
    #[tracing::instrument(skip_all, fields(instance_id = %id), name = "start_instance")]
    pub async fn start_instance_with_id(
        &self,
        id: InstanceId,
        input: W::Input,
    ) -> Result<InstanceHandle, HostError> {
        self.ensure_accepting()?;

        let mut instances = self.instances.write().await;
        if instances.contains_key(&id) || !self.context.journal.load(&id).await?.is_empty() {
            return Err(HostError::InstanceExists(id));
        }

        let payload = bincode::serialize(&input)?;
        self.context
            .journal
            .append(self.context.record(&id, 0, Origin::Start, payload))
            .await?;

        let state = self.context.workflow.initial_state(input);
        let instance = Instance::new(id.clone(), Arc::clone(&self.context), state, 1, HashSet::new());
        instances.insert(id.clone(), instance);

        tracing::info!("Instance started");
        Ok(InstanceHandle { id })
    }

    /// Deliver an update with a fresh update id and wait for its outcome
    ///
    /// # Errors
    ///
    /// See [`Host::send_update_with_id`].
    pub async fn send_update(
        &self,
        handle: &InstanceHandle,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<(), WorkflowError<W>> {
        self.send_update_with_id(handle, UpdateId::generate(), name, payload)
            .await
    }

    /// Deliver an update and wait until the workflow reports its outcome
    ///
    /// Re-delivering an update id that was already admitted does not apply it
    /// again; the recorded outcome is returned instead.
    ///
    /// # Errors
    ///
    /// - [`DeliveryError::Rejected`]: unknown update, malformed payload, or failed validation
    /// - [`DeliveryError::Failed`]: the update's side effects failed fatally
    /// - [`DeliveryError::Cancelled`]: the instance was cancelled before the update settled
    /// - [`DeliveryError::Host`]: unknown or closed instance, journal failure
    #[tracing::instrument(
        skip_all,
        fields(instance_id = %handle.id(), update_id = %update_id, update = name),
        name = "send_update"
    )]
    pub async fn send_update_with_id(
        &self,
        handle: &InstanceHandle,
        update_id: UpdateId,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<(), WorkflowError<W>> {
        let instance = self.instance(handle).await?;
        let action = self
            .context
            .workflow
            .decode_update(name, update_id.clone(), payload)
            .map_err(DeliveryError::Rejected)?;

        match instance
            .admit(Origin::Update(update_id.clone()), action, true)
            .await?
        {
            Admission::Applied => tracing::debug!("Update admitted"),
            Admission::Duplicate => {
                tracing::info!("Update already applied, returning recorded outcome");
            }
        }

        instance.wait_for_update(&update_id).await
    }

    /// Deliver a signal
    ///
    /// Signals carry no result; this returns once the signal is admitted.
    ///
    /// # Errors
    ///
    /// - [`DeliveryError::Rejected`]: unknown signal, malformed payload, or failed validation
    /// - [`DeliveryError::Host`]: unknown or closed instance, journal failure
    #[tracing::instrument(
        skip_all,
        fields(instance_id = %handle.id(), signal = name),
        name = "send_signal"
    )]
    pub async fn send_signal(
        &self,
        handle: &InstanceHandle,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<(), WorkflowError<W>> {
        let instance = self.instance(handle).await?;
        let action = self
            .context
            .workflow
            .decode_signal(name, payload)
            .map_err(DeliveryError::Rejected)?;

        instance
            .admit(Origin::Signal(name.to_string()), action, true)
            .await?;
        tracing::debug!("Signal admitted");
        Ok(())
    }

    /// Answer a read-only query from the last fully-applied state
    ///
    /// Queries are answered for terminated instances too.
    ///
    /// # Errors
    ///
    /// - [`DeliveryError::Rejected`]: unknown query
    /// - [`DeliveryError::Host`]: unknown instance
    pub async fn query(
        &self,
        handle: &InstanceHandle,
        name: &str,
    ) -> Result<serde_json::Value, WorkflowError<W>> {
        let instance = self.instance(handle).await?;
        instance
            .read(|state| self.context.workflow.query(name, state))
            .await
            .map_err(DeliveryError::Rejected)
    }

    /// Wait for the instance to stop and return its final state
    ///
    /// # Errors
    ///
    /// - [`DeliveryError::Failed`]: the first fatal failure of the instance
    /// - [`DeliveryError::Cancelled`]: the instance was cancelled
    /// - [`DeliveryError::Host`]: unknown instance or host shutdown
    pub async fn await_result(&self, handle: &InstanceHandle) -> Result<W::State, WorkflowError<W>> {
        let instance = self.instance(handle).await?;
        instance.wait_for_result().await
    }

    /// Handles of instances that have not reached a terminal status
    pub async fn running_instances(&self) -> Vec<InstanceHandle> {
        let instances = self.instances.read().await;
        let mut running = Vec::new();
        for (id, instance) in instances.iter() {
            if instance.is_running().await {
                running.push(InstanceHandle { id: id.clone() });
            }
        }
        running.sort_by(|a, b| a.id.cmp(&b.id));
        running
    }

    /// Drop every stopped instance from memory and return how many were dropped
    ///
    /// Journals are untouched.
    pub async fn release_stopped(&self) -> usize {
        let mut instances = self.instances.write().await;
        let mut stopped = Vec::new();
        for (id, instance) in instances.iter() {
            if !instance.is_running().await {
                stopped.push(id.clone());
            }
        }
        for id in &stopped {
            instances.remove(id);
        }
        tracing::debug!(
            released = stopped.len(),
            loaded = instances.len(),
            "Released stopped instances"
        );
        stopped.len()
    }

    /// Rebuild an instance from its journal
    ///
    /// Every journaled action is folded through the reducer again. Activities
    /// and timers whose outcome is already journaled are not re-executed; the
    /// ones still outstanding are issued again. Recovering an instance that is
    /// already loaded is a no-op.
    ///
    /// # Errors
    ///
    /// - [`HostError::InstanceNotFound`]: nothing journaled under this id
    /// - [`HostError::CorruptJournal`] / [`HostError::Serialization`]: the journal cannot be replayed
    #[tracing::instrument(skip_all, fields(instance_id = %id), name = "recover")]
    pub async fn recover(&self, id: InstanceId) -> Result<InstanceHandle, HostError> {
        self.ensure_accepting()?;

        let mut instances = self.instances.write().await;
        if instances.contains_key(&id) {
            return Ok(InstanceHandle { id });
        }

        let mut records = self.context.journal.load(&id).await?.into_iter();
        let Some(start) = records.next() else {
            return Err(HostError::InstanceNotFound(id));
        };
        if start.origin != Origin::Start {
            return Err(HostError::CorruptJournal {
                instance_id: id,
                reason: "first record is not a start record".to_string(),
            });
        }

        let workflow = &self.context.workflow;
        let mut state = workflow.initial_state(bincode::deserialize(&start.payload)?);
        let mut next_sequence = 1;
        let mut applied_updates = HashSet::new();
        let mut outstanding: BTreeMap<EffectId, Effect<W::Action>> = BTreeMap::new();

        for record in records {
            if record.sequence != next_sequence {
                return Err(HostError::CorruptJournal {
                    instance_id: id,
                    reason: format!(
                        "expected sequence {next_sequence}, found {}",
                        record.sequence
                    ),
                });
            }

            let action: W::Action = bincode::deserialize(&record.payload)?;
            if let Some(completed) = record.origin.completed_effect() {
                outstanding.remove(&completed);
            }
            if let Origin::Update(update_id) = record.origin {
                applied_updates.insert(update_id);
            }

            for effect in workflow.reduce(&mut state, action, &self.context.environment) {
                if let Some(effect_id) = effect.id() {
                    outstanding.insert(effect_id, effect);
                }
            }
            next_sequence += 1;
        }

        let status = workflow.run_status(&state);
        let instance = Instance::new(
            id.clone(),
            Arc::clone(&self.context),
            state,
            next_sequence,
            applied_updates,
        );
        if status.is_terminal() {
            tracing::info!(replayed = next_sequence, ?status, "Stopped instance recovered from journal");
        } else {
            tracing::info!(
                replayed = next_sequence,
                reissued = outstanding.len(),
                "Instance recovered from journal"
            );
            instance.resume(outstanding.into_values());
        }
        instances.insert(id.clone(), instance);

        Ok(InstanceHandle { id })
    }

    /// Recover every instance found in the journal
    ///
    /// # Errors
    ///
    /// Returns the first [`HostError`] encountered.
    pub async fn recover_all(&self) -> Result<Vec<InstanceHandle>, HostError> {
        let mut handles = Vec::new();
        for id in self.context.journal.instances().await? {
            handles.push(self.recover(id).await?);
        }
        Ok(handles)
    }

    /// Stop accepting commands and abort every in-flight activity and timer
    ///
    /// Journaled progress is kept; a new host can [`recover`](Host::recover)
    /// the instances later.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);

        let mut instances = self.instances.write().await;
        for instance in instances.values() {
            instance.close();
        }
        tracing::info!(instances = instances.len(), "Host shut down");
        instances.clear();
    }

    fn ensure_accepting(&self) -> Result<(), HostError> {
        if self.shutdown.load(Ordering::Acquire) {
            tracing::warn!("Rejected command: host is shutting down");
            return Err(HostError::ShutdownInProgress);
        }
        Ok(())
    }

    async fn instance(&self, handle: &InstanceHandle) -> Result<Arc<Instance<W>>, HostError> {
        self.ensure_accepting()?;
        self.instances
            .read()
            .await
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| HostError::InstanceNotFound(handle.id.clone()))
    }
}
