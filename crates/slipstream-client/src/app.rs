// Client orchestration: one event loop tying the realtime channel, the
// notification store, the toast queue, and the draft session client together.
//
// Single logical owner per piece of state; everything arrives over mpsc
// channels and is handled in turn. Teardown (sign-out or quit) stops polling
// and closes the channel so nothing mutates state afterwards.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::{DraftBackend, HttpBackend, NotificationBackend};
use crate::config::Config;
use crate::draft::session::{DraftSessionClient, PollHandle};
use crate::notify::channel::{ChannelEvent, ChannelManager};
use crate::notify::store::NotificationService;
use crate::notify::toast::ToastQueue;
use crate::notify::{Notification, NotificationKind};
use crate::protocol::ChannelFrame;

/// Authentication transitions, driven from outside the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn { session_token: String },
    SignedOut,
}

/// Commands from the user-facing layer.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Refresh,
    SubmitPick { driver_id: String },
    MarkRead(String),
    MarkAllRead,
    DeleteNotification(String),
    ClearNotifications,
    DismissToast(String),
    Quit,
}

/// How often the loop sweeps toast expiry and the local pick countdown.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(500);

/// The assembled client.
pub struct App {
    config: Config,
    session: Arc<DraftSessionClient>,
    notifications: NotificationService,
    toasts: ToastQueue,
    channel: ChannelManager,
    channel_rx: mpsc::Receiver<ChannelEvent>,
    poll: Option<PollHandle>,
    /// Deadline the local countdown already prompted a refresh for, to avoid
    /// re-prompting every housekeeping tick.
    last_deadline_prompt: Option<DateTime<Utc>>,
}

impl App {
    /// Build the app against the HTTP backend from config.
    pub fn new(config: Config) -> Self {
        let token = config.credentials.session_token.clone().unwrap_or_default();
        let backend = Arc::new(HttpBackend::new(config.backend.base_url.clone(), token));
        let draft_backend: Arc<dyn DraftBackend> = backend.clone();
        Self::with_backends(config, draft_backend, backend)
    }

    /// Build the app against explicit backends; tests use in-process ones.
    pub fn with_backends(
        config: Config,
        draft_backend: Arc<dyn DraftBackend>,
        notification_backend: Arc<dyn NotificationBackend>,
    ) -> Self {
        let (channel_tx, channel_rx) = mpsc::channel(256);
        let session = Arc::new(DraftSessionClient::new(
            draft_backend,
            config.league.clone(),
            config.draft.roster_limits(),
        ));
        App {
            toasts: ToastQueue::new(config.notifications.toast_duration()),
            config,
            session,
            notifications: NotificationService::new(notification_backend),
            channel: ChannelManager::new(channel_tx),
            channel_rx,
            poll: None,
            last_deadline_prompt: None,
        }
    }

    pub fn session(&self) -> &Arc<DraftSessionClient> {
        &self.session
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    pub fn toasts(&self) -> &ToastQueue {
        &self.toasts
    }

    /// Run the event loop until a quit command arrives or the command channel
    /// closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<UserCommand>,
        mut auth: mpsc::Receiver<AuthEvent>,
    ) -> anyhow::Result<()> {
        info!("client event loop started");
        let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(event) = self.channel_rx.recv() => self.handle_channel_event(event),
                Some(event) = auth.recv() => self.handle_auth_event(event).await,
                maybe_command = commands.recv() => match maybe_command {
                    Some(UserCommand::Quit) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                _ = housekeeping.tick() => self.sweep().await,
            }
        }

        self.teardown().await;
        info!("client event loop stopped");
        Ok(())
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => info!("realtime notifications connected"),
            ChannelEvent::Disconnected => {
                // No transport-level reconnect: the feed degrades to the
                // request/response endpoints until the next sign-in.
                warn!("realtime notifications disconnected; feed degrades to polling");
                self.channel.mark_disconnected();
            }
            ChannelEvent::ParseError(message) => {
                warn!("notification frame rejected: {message}");
            }
            ChannelEvent::Frame(ChannelFrame::Heartbeat) => debug!("channel heartbeat"),
            ChannelEvent::Frame(ChannelFrame::Notification(payload)) => {
                let notification = Notification::from(payload);
                self.toasts.show(notification.clone(), Instant::now());
                self.notifications.ingest(notification);
            }
        }
    }

    async fn handle_auth_event(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn { session_token } => {
                info!("signed in; bringing subsystems up");
                if let Err(e) = self
                    .channel
                    .connect(&self.config.backend.channel_url, &session_token)
                    .await
                {
                    // The feed still works through request/response endpoints.
                    warn!("realtime channel unavailable: {e}");
                }
                match self.notifications.rebuild_from_server().await {
                    Ok(count) => info!("notification feed loaded ({count} items)"),
                    Err(e) => warn!("failed to load notification feed: {e}"),
                }
                if let Err(e) = self.session.refresh_drivers().await {
                    warn!("failed to load driver pool: {e}");
                }
                if let Err(e) = self.session.refresh().await {
                    warn!("initial draft refresh failed: {e}");
                }
                self.poll = Some(
                    self.session
                        .spawn_polling(self.config.draft.poll_interval()),
                );
            }
            AuthEvent::SignedOut => {
                info!("signed out; tearing subsystems down");
                self.teardown().await;
            }
        }
    }

    async fn handle_command(&mut self, command: UserCommand) {
        match command {
            UserCommand::Refresh => {
                if let Err(e) = self.session.refresh().await {
                    warn!("refresh failed: {e}");
                }
            }
            UserCommand::SubmitPick { driver_id } => match self.session.submit_pick(&driver_id).await {
                Ok(snapshot) => info!(
                    "pick {driver_id} accepted ({} picks made)",
                    snapshot.turn.total_picks_made
                ),
                Err(e) => {
                    warn!("pick {driver_id} rejected: {e}");
                    self.toasts.show(
                        Notification {
                            id: format!("local-pick-{driver_id}"),
                            kind: NotificationKind::Error,
                            title: "Pick rejected".into(),
                            message: e.to_string(),
                            timestamp: Utc::now(),
                            read: true,
                            action_url: None,
                            action_label: None,
                            league_id: Some(self.config.league.league_id.clone()),
                            race_id: Some(self.config.league.race_id.clone()),
                        },
                        Instant::now(),
                    );
                }
            },
            UserCommand::MarkRead(id) => {
                if let Err(e) = self.notifications.mark_read(&id).await {
                    warn!("{e}");
                }
            }
            UserCommand::MarkAllRead => {
                if let Err(e) = self.notifications.mark_all_read().await {
                    warn!("{e}");
                }
            }
            UserCommand::DeleteNotification(id) => {
                if let Err(e) = self.notifications.delete(&id).await {
                    warn!("{e}");
                }
            }
            UserCommand::ClearNotifications => {
                if let Err(e) = self.notifications.clear_all().await {
                    warn!("{e}");
                }
            }
            UserCommand::DismissToast(id) => {
                self.toasts.dismiss(&id);
            }
            UserCommand::Quit => {
                // Handled by run().
            }
        }
    }

    async fn sweep(&mut self) {
        // Headless, the exit transition collapses into the same tick; a view
        // layer would animate between the two phases.
        for id in self.toasts.tick(Instant::now()) {
            self.toasts.finish_exit(&id);
        }
        self.check_local_deadline().await;
    }

    /// When the local countdown reaches zero, prompt a refresh. The expiry is
    /// authoritative only once the backend commits a timeout transition; the
    /// client never mutates shared draft state on its own clock.
    async fn check_local_deadline(&mut self) {
        let deadline = match self
            .session
            .mirror()
            .await
            .snapshot
            .and_then(|s| s.turn.timer_deadline)
        {
            Some(deadline) => deadline,
            None => return,
        };
        if Utc::now() < deadline || self.last_deadline_prompt == Some(deadline) {
            return;
        }
        self.last_deadline_prompt = Some(deadline);
        debug!("local countdown reached zero; prompting refresh");
        if let Err(e) = self.session.refresh().await {
            warn!("deadline refresh failed: {e}");
        }
    }

    async fn teardown(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.stop().await;
        }
        self.channel.disconnect();
        self.notifications.discard();
        self.toasts.clear();
        self.last_deadline_prompt = None;
    }
}
