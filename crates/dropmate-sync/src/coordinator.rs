//! Startup wiring between session, lifecycle, channel and cache.

use crate::CacheReconciler;
use dropmate_auth::{SessionManager, SessionStatus};
use dropmate_config_and_utils::Subscription;
use dropmate_lifecycle::{AppStateSource, LifecycleEvent, LifecycleObserver};
use dropmate_realtime::{ChannelController, EventKind};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum Command {
    Session(SessionStatus, Option<String>),
    Lifecycle(LifecycleEvent),
    Flush(oneshot::Sender<()>),
}

/// Starts the realtime sync wiring.
pub struct RealtimeSync;

impl RealtimeSync {
    /// Wire everything up and start the driver task.
    ///
    /// - realtime status, location and actor events go to the reconciler
    /// - an authenticated session while foregrounded connects the channel
    /// - an idle or signing-in session, or a suspend, disconnects it
    /// - a switch to another user reconnects with the new identity
    /// - a resume invalidates list views and reconnects if needed
    ///
    /// Must be called within a tokio runtime.
    pub fn start(
        session: SessionManager,
        controller: ChannelController,
        reconciler: CacheReconciler,
        app_state: AppStateSource,
    ) -> SyncHandle {
        let mut subscriptions = Vec::new();
        for kind in [
            EventKind::ShipmentStatus,
            EventKind::ShipmentLocation,
            EventKind::ActorLocation,
        ] {
            let reconciler = reconciler.clone();
            subscriptions.push(controller.on(kind, move |event| {
                reconciler.apply(event);
            }));
        }

        let (commands, rx) = mpsc::unbounded_channel();

        let tx = commands.clone();
        subscriptions.push(session.subscribe(move |snapshot| {
            let user_id = snapshot.user_id().map(str::to_string);
            let _ = tx.send(Command::Session(snapshot.status, user_id));
        }));

        let observer = LifecycleObserver::attach(&app_state, session.clone());
        let tx = commands.clone();
        subscriptions.push(observer.on_event(move |event| {
            let _ = tx.send(Command::Lifecycle(*event));
        }));

        let snapshot = session.snapshot();
        let _ = commands.send(Command::Session(
            snapshot.status,
            snapshot.user_id().map(str::to_string),
        ));

        let driver = Driver {
            controller: controller.clone(),
            reconciler,
            app_state,
            last_session: None,
        };
        let task = tokio::spawn(driver.run(rx));
        info!("Realtime sync started");

        SyncHandle {
            commands,
            controller,
            subscriptions,
            observer: Some(observer),
            task: Some(task),
        }
    }
}

struct Driver {
    controller: ChannelController,
    reconciler: CacheReconciler,
    app_state: AppStateSource,
    last_session: Option<(SessionStatus, Option<String>)>,
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Session(status, user_id) => self.session_changed(status, user_id).await,
                Command::Lifecycle(event) => self.lifecycle_changed(event).await,
                Command::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
    }

    async fn session_changed(&mut self, status: SessionStatus, user_id: Option<String>) {
        let current = Some((status, user_id));
        if self.last_session == current {
            return;
        }
        self.last_session = current;

        match status {
            SessionStatus::Authenticated => {
                let connected_user = self.controller.connected_user();
                if connected_user.is_some() && connected_user != self.session_user() {
                    info!(previous = ?connected_user, "Session user changed, reconnecting realtime channel");
                    self.controller.disconnect().await;
                }
                if self.app_state.current().is_foreground() {
                    self.connect().await;
                } else {
                    debug!("Authenticated in background, deferring realtime connect");
                }
            }
            SessionStatus::Idle | SessionStatus::Loading => self.controller.disconnect().await,
        }
    }

    fn session_user(&self) -> Option<String> {
        self.last_session.as_ref().and_then(|(_, user_id)| user_id.clone())
    }

    async fn lifecycle_changed(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Resume => {
                self.reconciler.on_resume();
                if !self.controller.is_connected() {
                    self.connect().await;
                }
            }
            LifecycleEvent::Suspend => self.controller.disconnect().await,
        }
    }

    async fn connect(&self) {
        if let Err(e) = self.controller.connect().await {
            warn!(error = %e, "Realtime connect failed");
        }
    }
}

/// Owns the sync wiring. Dropping it releases every subscription, stops the
/// driver and disconnects the channel.
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    controller: ChannelController,
    subscriptions: Vec<Subscription>,
    observer: Option<LifecycleObserver>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Wait until every reaction queued so far has run.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.commands.send(Command::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    pub fn controller(&self) -> &ChannelController {
        &self.controller
    }

    pub async fn shutdown(mut self) {
        self.release();
        self.controller.disconnect().await;
        info!("Realtime sync stopped");
    }

    fn release(&mut self) {
        self.subscriptions.clear();
        if let Some(mut observer) = self.observer.take() {
            observer.detach();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if self.task.is_none() {
            return;
        }
        self.release();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let controller = self.controller.clone();
            runtime.spawn(async move { controller.disconnect().await });
        }
    }
}
