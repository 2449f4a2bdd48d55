//! # Sync Engine
//!
//! Keeps the local video store in step with the AchRails server and owns
//! the in-memory view (videos, groups, collections) that presentation code
//! reads.
//!
//! ## Refresh cycle
//!
//! [`SyncEngine::refresh_online`] builds a task tree:
//!
//! ```text
//! refresh-online (umbrella)
//! ├── get-videos
//! │   ├── download <id>
//! │   └── upload <id>
//! └── get-groups
//! ```
//!
//! `get-videos` classifies each remote `(id, revision)` summary against the
//! local store:
//!
//! | Local record            | Action    |
//! |-------------------------|-----------|
//! | missing                 | download  |
//! | locally modified        | upload    |
//! | older revision          | download  |
//! | same or newer revision  | none      |
//!
//! Listeners get `update_started(total)` once classification is done and
//! `update_progress(done, total)` as each dispatched item finishes, failed or
//! not. When the umbrella completes, the store is flushed, local state is
//! reloaded and listeners get `updated()`.
//!
//! Whether the umbrella waits for the items is [`SyncConfig::completion_mode`].
//! With [`CompletionMode::EagerComplete`] it completes as soon as both
//! fetches are dispatched, so finalization may run before items land.
//!
//! ## Threading
//!
//! In-memory state and listener callbacks are only touched from jobs on the
//! engine's [`Coordinator`]. Store writes made by a refresh cycle go through
//! the coordinator as well, so they never interleave. Overlapping
//! `refresh_online` calls are not serialized; callers that care must wait on
//! the returned handle first.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use core_async::sync::watch;
use core_async::{CompletionMode, Coordinator, Task, TaskError};
use core_library::{
    Group, GroupCache, GroupList, LibraryError, User, VideoFilter, VideoId, VideoRecord,
    VideoRevisionSummary, VideoStore,
};
use core_runtime::config::SyncConfig;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::UserError;
use provider_achrails::{RemoteGroups, RemoteVideoApi};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::collections::{Collection, CollectionId, Collections};
use crate::error::{Result, SyncError};
use crate::listeners::{ListenerId, Listeners, RepositoryListener};
use crate::report::{ItemOutcome, StepOutcome, SyncAction, SyncReport};
use crate::upload::{ProgressCallback, UploadPipeline};

// ============================================================================
// State
// ============================================================================

#[derive(Default)]
struct LocalState {
    groups: Vec<Group>,
    user: Option<User>,
    collections: Collections,
    /// `(done, total)` of the latest refresh cycle.
    progress: (usize, usize),
}

struct Inner {
    store: Arc<dyn VideoStore>,
    group_cache: Arc<dyn GroupCache>,
    remote: RwLock<Option<Arc<dyn RemoteVideoApi>>>,
    uploads: UploadPipeline,
    coordinator: Coordinator,
    config: SyncConfig,
    event_bus: Option<EventBus>,
    state: Mutex<LocalState>,
    listeners: Listeners,
}

/// Bookkeeping of one refresh cycle, shared by its tasks.
struct Cycle {
    id: String,
    report: Mutex<SyncReport>,
    finished: watch::Sender<bool>,
}

impl Cycle {
    fn new() -> Self {
        let id = Uuid::new_v4().to_string();
        let (finished, _) = watch::channel(false);
        Self {
            report: Mutex::new(SyncReport::new(id.clone())),
            id,
            finished,
        }
    }

    fn update(&self, f: impl FnOnce(&mut SyncReport)) {
        f(&mut self.report.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn record(&self, id: VideoId, outcome: ItemOutcome) {
        self.update(|report| {
            report.items.insert(id, outcome);
        });
    }

    fn snapshot(&self) -> SyncReport {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Handle to a running refresh cycle.
pub struct RefreshHandle {
    task: Task,
    cycle: Arc<Cycle>,
}

impl RefreshHandle {
    pub fn cycle_id(&self) -> &str {
        &self.cycle.id
    }

    /// The umbrella task.
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Report as it stands now.
    pub fn report(&self) -> SyncReport {
        self.cycle.snapshot()
    }

    /// Wait for every task of the cycle and for finalization.
    pub async fn wait(&self) -> SyncReport {
        let _ = self.task.wait_tree().await;
        let mut finished = self.cycle.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
        self.cycle.snapshot()
    }
}

impl std::fmt::Debug for RefreshHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshHandle")
            .field("cycle_id", &self.cycle.id)
            .field("task", &self.task)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct SyncEngineBuilder {
    store: Arc<dyn VideoStore>,
    group_cache: Arc<dyn GroupCache>,
    remote: Option<Arc<dyn RemoteVideoApi>>,
    uploads: Option<UploadPipeline>,
    coordinator: Option<Coordinator>,
    config: SyncConfig,
    event_bus: Option<EventBus>,
}

impl SyncEngineBuilder {
    pub fn remote(mut self, remote: Arc<dyn RemoteVideoApi>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn upload_pipeline(mut self, pipeline: UploadPipeline) -> Self {
        self.uploads = Some(pipeline);
        self
    }

    /// Share an existing coordination context instead of spawning one.
    pub fn coordinator(mut self, coordinator: Coordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn completion_mode(mut self, mode: CompletionMode) -> Self {
        self.config.completion_mode = mode;
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Must be called inside a tokio runtime when no coordinator was given.
    pub fn build(self) -> SyncEngine {
        let uploads = self.uploads.unwrap_or_else(|| {
            let pipeline = UploadPipeline::new(self.config);
            match &self.event_bus {
                Some(bus) => pipeline.with_event_bus(bus.clone()),
                None => pipeline,
            }
        });

        SyncEngine {
            inner: Arc::new(Inner {
                store: self.store,
                group_cache: self.group_cache,
                remote: RwLock::new(self.remote),
                uploads,
                coordinator: self
                    .coordinator
                    .unwrap_or_else(|| Coordinator::spawn("sync-engine")),
                config: self.config,
                event_bus: self.event_bus,
                state: Mutex::new(LocalState::default()),
                listeners: Listeners::default(),
            }),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn builder(store: Arc<dyn VideoStore>, group_cache: Arc<dyn GroupCache>) -> SyncEngineBuilder {
        SyncEngineBuilder {
            store,
            group_cache,
            remote: None,
            uploads: None,
            coordinator: None,
            config: SyncConfig::default(),
            event_bus: None,
        }
    }

    /// Swap the remote client, e.g. after sign-in or sign-out.
    pub fn set_remote(&self, remote: Option<Arc<dyn RemoteVideoApi>>) {
        *self
            .inner
            .remote
            .write()
            .unwrap_or_else(PoisonError::into_inner) = remote;
    }

    pub fn remote(&self) -> Option<Arc<dyn RemoteVideoApi>> {
        self.inner.remote()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Listeners and read side
    // ------------------------------------------------------------------

    /// Register a listener. It is sent `updated()` right away.
    pub fn subscribe(&self, listener: Arc<dyn RepositoryListener>) -> ListenerId {
        let id = self.inner.listeners.add(Arc::clone(&listener));
        let inner = Arc::clone(&self.inner);
        let accepted = self.inner.coordinator.dispatch(async move {
            if let Some(listener) = inner.listeners.get(id) {
                listener.updated();
            }
        });
        if !accepted {
            // Nothing else runs listener callbacks once the loop is gone.
            warn!(listener_id = ?id, "Coordinator stopped, notifying listener inline");
            listener.updated();
        }
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Local videos, newest first.
    pub fn videos(&self) -> Vec<VideoRecord> {
        self.inner.lock_state().collections.all_videos().videos.clone()
    }

    pub fn find_video(&self, id: VideoId) -> Option<VideoRecord> {
        self.inner
            .lock_state()
            .collections
            .all_videos()
            .videos
            .iter()
            .find(|v| v.id() == id)
            .cloned()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.inner.lock_state().groups.clone()
    }

    /// Account the cached groups were fetched for.
    pub fn user(&self) -> Option<User> {
        self.inner.lock_state().user.clone()
    }

    pub fn collection(&self, id: &CollectionId) -> Option<Collection> {
        self.inner.lock_state().collections.get(id)
    }

    pub fn progress(&self) -> (usize, usize) {
        self.inner.lock_state().progress
    }

    // ------------------------------------------------------------------
    // Local operations
    // ------------------------------------------------------------------

    /// Reload videos and cached groups from storage and notify listeners.
    pub async fn refresh(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .run_on_coordinator(async move { inner.reload().await })
            .await
    }

    #[instrument(skip(self, record), fields(video_id = %record.id()))]
    pub async fn save_video(&self, record: &VideoRecord) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let record = record.clone();
        self.inner
            .run_on_coordinator(async move {
                inner.store.save(&record).await?;
                inner.store.flush().await?;
                inner.reload().await
            })
            .await
    }

    /// Save a local edit and push it when a remote client is configured.
    pub async fn edit_video(&self, mut record: VideoRecord) -> Result<Option<RefreshHandle>> {
        record.mark_modified();
        self.save_video(&record).await?;
        Ok(self.refresh_online())
    }

    /// Delete a video. Server-known videos are deleted remotely first and
    /// kept locally if that fails.
    #[instrument(skip(self), fields(video_id = %id))]
    pub async fn delete_video(&self, id: VideoId) -> Result<()> {
        let record = self
            .inner
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "video".to_string(),
                id: id.to_string(),
            })?;

        if !record.is_local_only() {
            let remote = self.inner.require_remote()?;
            remote.delete_video(id).await?;
            debug!("Deleted remotely");
        }

        let inner = Arc::clone(&self.inner);
        self.inner
            .run_on_coordinator(async move {
                inner.store.delete(id).await?;
                inner.store.flush().await?;
                inner.reload().await
            })
            .await?;

        info!("Video deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Remote passthroughs
    // ------------------------------------------------------------------

    pub async fn set_video_public(&self, id: VideoId) -> Result<()> {
        self.inner.require_remote()?.set_video_publicity(id, true).await?;
        Ok(())
    }

    pub async fn set_video_private(&self, id: VideoId) -> Result<()> {
        self.inner.require_remote()?.set_video_publicity(id, false).await?;
        Ok(())
    }

    pub async fn share_video_to_group(&self, id: VideoId, group_id: i64) -> Result<()> {
        self.inner
            .require_remote()?
            .share_video_to_group(id, group_id)
            .await?;
        Ok(())
    }

    pub async fn unshare_video_from_group(&self, id: VideoId, group_id: i64) -> Result<()> {
        self.inner
            .require_remote()?
            .unshare_video_from_group(id, group_id)
            .await?;
        Ok(())
    }

    /// Fetch the server's view of a single video.
    ///
    /// `None` without a remote client, for media that was never published,
    /// or when the server has nothing newer. Locally modified videos are
    /// uploaded instead. The result is not stored.
    #[instrument(skip(self, record), fields(video_id = %record.id(), revision = record.revision()))]
    pub async fn refresh_video(&self, record: &VideoRecord) -> Result<Option<VideoRecord>> {
        let Some(remote) = self.remote() else {
            return Ok(None);
        };
        if record.is_local_only() {
            return Ok(None);
        }

        if record.has_local_modifications {
            return Ok(Some(remote.put_video(record).await?));
        }

        let fetched = remote
            .get_video_if_newer(record.id(), record.revision(), true)
            .await?;
        Ok(fetched.into_record())
    }

    /// Keyword search on the server. Results are stored without flushing,
    /// except over local edits, and returned.
    #[instrument(skip(self))]
    pub async fn search_online(&self, query: &str) -> Result<Vec<VideoRecord>> {
        let remote = self.inner.require_remote()?;
        let results = remote.search_videos(query).await?;

        let inner = Arc::clone(&self.inner);
        let to_store = results.clone();
        self.inner
            .run_on_coordinator(async move {
                for record in &to_store {
                    if let Some(local) = inner.store.find_by_id(record.id()).await? {
                        if local.has_local_modifications {
                            debug!(video_id = %record.id(), "Keeping local edit over search result");
                            continue;
                        }
                    }
                    inner.store.save(record).await?;
                }
                Ok::<(), SyncError>(())
            })
            .await?;

        debug!(count = results.len(), "Online search finished");
        Ok(results)
    }

    /// Publish media and manifest through the upload pipeline, then store
    /// the server's record. Progress is delivered on the coordinator.
    pub async fn upload_video(
        &self,
        record: &VideoRecord,
        progress: ProgressCallback,
    ) -> std::result::Result<VideoRecord, UserError> {
        let Some(remote) = self.remote() else {
            return Err(UserError::invalid_server_url(None).with_debug_error("remote client not configured"));
        };

        let coordinator = self.inner.coordinator.clone();
        let on_coordinator: ProgressCallback = Arc::new(move |value| {
            let progress = Arc::clone(&progress);
            coordinator.dispatch(async move { progress(value) });
        });

        let inner = Arc::clone(&self.inner);
        let record = record.clone();
        let uploaded = core_async::spawn(async move {
            inner
                .uploads
                .upload(remote.as_ref(), &record, on_coordinator)
                .await
        })
        .await
        .map_err(|e| UserError::failed_to_upload_video(Some(Box::new(e))))??;

        self.save_video(&uploaded)
            .await
            .map_err(|e| UserError::failed_to_save_video(Some(Box::new(e))))?;
        Ok(uploaded)
    }

    // ------------------------------------------------------------------
    // Online refresh
    // ------------------------------------------------------------------

    /// Start a refresh cycle. `None` when no remote client is configured.
    pub fn refresh_online(&self) -> Option<RefreshHandle> {
        let remote = self.remote()?;
        let cycle = Arc::new(Cycle::new());
        info!(cycle_id = %cycle.id, mode = ?self.inner.config.completion_mode, "Starting online refresh");

        let umbrella = Task::builder("refresh-online")
            .mode(self.inner.config.completion_mode)
            .coordinator(self.inner.coordinator.clone())
            .build({
                let inner = Arc::clone(&self.inner);
                let cycle = Arc::clone(&cycle);
                move |task| async move {
                    let videos = inner.videos_task(Arc::clone(&remote), Arc::clone(&cycle));
                    let groups = inner.groups_task(remote, cycle);
                    task.add_subtask(&videos);
                    task.add_subtask(&groups);
                    videos.start();
                    groups.start();
                    task.done();
                }
            });

        umbrella.on_complete({
            let inner = Arc::clone(&self.inner);
            let cycle = Arc::clone(&cycle);
            move |_| async move { inner.finalize(&cycle).await }
        });
        umbrella.start();

        Some(RefreshHandle {
            task: umbrella,
            cycle,
        })
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("coordinator", &self.inner.coordinator.name())
            .field("has_remote", &self.inner.remote().is_some())
            .field("listeners", &self.inner.listeners.len())
            .field("uploads", &self.inner.uploads)
            .finish()
    }
}

// ============================================================================
// Internals
// ============================================================================

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remote(&self) -> Option<Arc<dyn RemoteVideoApi>> {
        self.remote
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_remote(&self) -> Result<Arc<dyn RemoteVideoApi>> {
        self.remote().ok_or(SyncError::NotConfigured)
    }

    fn current_user_id(&self) -> Option<String> {
        self.remote().map(|remote| remote.user_id())
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }

    /// Never call this from a job already on the coordinator.
    async fn run_on_coordinator<F>(&self, job: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.coordinator
            .run(job)
            .await
            .unwrap_or_else(|| Err(SyncError::coordinator_stopped()))
    }

    /// Runs on the coordinator.
    async fn reload(&self) -> Result<()> {
        let user_id = self.current_user_id();
        let videos = self
            .store
            .list_all(&VideoFilter::owned_by_or_local(user_id.clone()))
            .await?;

        let cached = match self.group_cache.load_groups().await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "Failed to load cached groups");
                None
            }
        };
        let (groups, user) = match cached {
            Some(list) if list.is_trusted_for(user_id.as_deref()) => (list.groups, Some(list.user)),
            Some(list) => {
                debug!(downloaded_by = %list.downloaded_by, "Ignoring groups cached for another account");
                (Vec::new(), None)
            }
            None => (Vec::new(), None),
        };

        let collections = Collections::build(videos, &groups);
        {
            let mut state = self.lock_state();
            state.collections = collections;
            state.groups = groups;
            state.user = user;
        }

        self.listeners.notify(|listener| listener.updated());
        Ok(())
    }

    async fn classify(&self, summary: &VideoRevisionSummary) -> Result<Option<SyncAction>> {
        let action = match self.store.find_by_id(summary.id).await? {
            None => Some(SyncAction::Download),
            Some(local) if local.has_local_modifications => Some(SyncAction::Upload),
            Some(local) if summary.revision > local.revision() => Some(SyncAction::Download),
            Some(_) => None,
        };
        Ok(action)
    }

    fn videos_task(self: &Arc<Self>, remote: Arc<dyn RemoteVideoApi>, cycle: Arc<Cycle>) -> Task {
        let inner = Arc::clone(self);
        Task::builder("get-videos")
            .mode(self.config.completion_mode)
            .build(move |task| async move {
                let summaries = match remote.list_videos().await {
                    Ok(summaries) => summaries,
                    Err(e) => {
                        warn!(cycle_id = %cycle.id, error = %e, "Failed to retrieve videos");
                        cycle.update(|r| r.videos = StepOutcome::Failed(e.to_string()));
                        task.fail(TaskError::new(SyncError::from(e)));
                        return;
                    }
                };

                let mut actions = Vec::new();
                for summary in &summaries {
                    match inner.classify(summary).await {
                        Ok(Some(action)) => actions.push((summary.id, action)),
                        Ok(None) => cycle.record(summary.id, ItemOutcome::UpToDate),
                        Err(e) => {
                            warn!(video_id = %summary.id, error = %e, "Could not read local copy, skipping");
                            cycle.record(
                                summary.id,
                                ItemOutcome::Skipped {
                                    message: e.to_string(),
                                },
                            );
                        }
                    }
                }

                for (id, action) in &actions {
                    cycle.record(*id, ItemOutcome::InFlight { action: *action });
                }
                debug!(cycle_id = %cycle.id, listed = summaries.len(), dispatched = actions.len(), "Classified videos");
                inner.begin_progress(&cycle, actions.len());

                for (id, action) in actions {
                    let item = inner.item_task(Arc::clone(&remote), Arc::clone(&cycle), id, action);
                    task.add_subtask(&item);
                    item.start();
                }

                cycle.update(|r| r.videos = StepOutcome::Succeeded);
                task.done();
            })
    }

    fn item_task(
        self: &Arc<Self>,
        remote: Arc<dyn RemoteVideoApi>,
        cycle: Arc<Cycle>,
        id: VideoId,
        action: SyncAction,
    ) -> Task {
        let name = match action {
            SyncAction::Download => format!("download {id}"),
            SyncAction::Upload => format!("upload {id}"),
        };

        let inner = Arc::clone(self);
        let item_cycle = Arc::clone(&cycle);
        let task = Task::builder(name)
            .coordinator(self.coordinator.clone())
            .build(move |task| async move {
                let cycle = item_cycle;
                let result = match action {
                    SyncAction::Download => inner.download(remote.as_ref(), id).await,
                    SyncAction::Upload => inner.upload(remote.as_ref(), id).await,
                };

                match result {
                    Ok(revision) => {
                        let outcome = match action {
                            SyncAction::Download => ItemOutcome::Downloaded { revision },
                            SyncAction::Upload => ItemOutcome::Uploaded { revision },
                        };
                        cycle.record(id, outcome);
                        task.done();
                    }
                    Err(e) => {
                        warn!(cycle_id = %cycle.id, video_id = %id, action = ?action, error = %e, "Sync item failed");
                        cycle.record(
                            id,
                            ItemOutcome::Failed {
                                action,
                                message: e.to_string(),
                            },
                        );
                        inner.emit(SyncEvent::ItemFailed {
                            cycle_id: cycle.id.clone(),
                            video_id: id.to_string(),
                            message: e.to_string(),
                        });
                        task.fail(TaskError::new(e));
                    }
                }
            });

        let inner = Arc::clone(self);
        task.on_complete(move |_| async move { inner.advance_progress(&cycle) });
        task
    }

    async fn download(&self, remote: &dyn RemoteVideoApi, id: VideoId) -> Result<i64> {
        let record = remote.get_video(id).await?;
        let revision = record.revision();
        self.save_serialized(record).await?;
        debug!(video_id = %id, revision, "Video downloaded");
        Ok(revision)
    }

    async fn upload(&self, remote: &dyn RemoteVideoApi, id: VideoId) -> Result<i64> {
        let local = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(SyncError::ConflictPolicy(id))?;
        let uploaded = remote.put_video(&local).await?;
        let revision = uploaded.revision();
        self.save_serialized(uploaded).await?;
        debug!(video_id = %id, revision, "Video uploaded");
        Ok(revision)
    }

    /// Store a record from a worker without flushing.
    async fn save_serialized(&self, record: VideoRecord) -> Result<()> {
        let store = Arc::clone(&self.store);
        self.run_on_coordinator(async move { store.save(&record).await.map_err(SyncError::from) })
            .await
    }

    fn groups_task(self: &Arc<Self>, remote: Arc<dyn RemoteVideoApi>, cycle: Arc<Cycle>) -> Task {
        let inner = Arc::clone(self);
        Task::new("get-groups", move |task| async move {
            let result = inner.fetch_groups(remote.as_ref()).await;
            cycle.update(|r| r.groups = StepOutcome::from_result(&result));
            match result {
                Ok(()) => {
                    task.done();
                }
                Err(e) => {
                    warn!(cycle_id = %cycle.id, error = %e, "Failed to retrieve groups");
                    task.fail(TaskError::new(e));
                }
            }
        })
    }

    async fn fetch_groups(&self, remote: &dyn RemoteVideoApi) -> Result<()> {
        let RemoteGroups { groups, user } = remote.get_groups().await?;
        let list = GroupList {
            groups,
            user,
            downloaded_by: remote.user_id(),
        };
        debug!(groups = list.groups.len(), downloaded_by = %list.downloaded_by, "Groups fetched");

        let cache = Arc::clone(&self.group_cache);
        self.run_on_coordinator(async move { cache.save_groups(&list).await.map_err(SyncError::from) })
            .await
    }

    fn begin_progress(self: &Arc<Self>, cycle: &Cycle, total: usize) {
        let inner = Arc::clone(self);
        let cycle_id = cycle.id.clone();
        let accepted = self.coordinator.dispatch(async move {
            inner.lock_state().progress = (0, total);
            inner.listeners.notify(|listener| listener.update_started(total));
            inner.emit(SyncEvent::Started {
                cycle_id,
                total: total as u64,
            });
        });
        if !accepted {
            warn!("Coordinator stopped, progress not reported");
        }
    }

    /// Runs on the coordinator.
    fn advance_progress(&self, cycle: &Cycle) {
        let (done, total) = {
            let mut state = self.lock_state();
            state.progress.0 += 1;
            state.progress
        };
        self.listeners
            .notify(|listener| listener.update_progress(done, total));
        self.emit(SyncEvent::Progress {
            cycle_id: cycle.id.clone(),
            done: done as u64,
            total: total as u64,
        });
    }

    /// Umbrella completion handler; runs on the coordinator.
    async fn finalize(&self, cycle: &Cycle) {
        let result = match self.store.flush().await {
            Ok(()) => self.reload().await,
            Err(e) => Err(e.into()),
        };
        cycle.update(|r| r.finalize = StepOutcome::from_result(&result));

        match result {
            Ok(()) => {
                let report = cycle.snapshot();
                info!(
                    cycle_id = %cycle.id,
                    downloaded = report.downloaded(),
                    uploaded = report.uploaded(),
                    failed = report.failed(),
                    "Online refresh finished"
                );
                self.emit(SyncEvent::Completed {
                    cycle_id: cycle.id.clone(),
                    downloaded: report.downloaded() as u64,
                    uploaded: report.uploaded() as u64,
                    failed: report.failed() as u64,
                });
            }
            Err(e) => {
                error!(cycle_id = %cycle.id, error = %e, "Failed to finalize online refresh");
                self.emit(SyncEvent::Failed {
                    cycle_id: cycle.id.clone(),
                    message: e.to_string(),
                });
            }
        }

        cycle.finished.send_replace(true);
    }
}
