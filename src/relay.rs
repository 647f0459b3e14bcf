//! Session orchestration: listener events in, upload outcomes out.
//!
//! The relay owns the listener and the active-software pointer. Every parsed
//! record is handed to its own task, which reloads the settings file, checks
//! the credentials, uploads once and reports the outcome. Records are not
//! serialized against each other, so outcomes may arrive out of order.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::listener::{Datagram, ListenError, ListenerEvent, UdpListener};
use crate::parser::ParseError;
use crate::profile::{Registry, RegistryError, SoftwareProfile};
use crate::qso::{NormalizedQso, UploadResult};
use crate::settings::SettingsStore;
use crate::stats::RelayStats;
use crate::upload::Uploader;

/// Capacity of the channel between the listener and the relay.
const LISTENER_QUEUE: usize = 1000;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Listen(#[from] ListenError),
}

/// Commands accepted by [`Relay::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Switch to another logging program by id.
    ChangeSoftware(String),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeStatus {
    Success,
    Error,
}

/// Per-datagram notice for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct MessageNotice {
    pub message: String,
    pub address: IpAddr,
    pub port: u16,
    /// True only when the record reached LdA successfully.
    pub processed: bool,
    pub software: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<NoticeStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageNotice {
    fn base(datagram: &Datagram, profile: &SoftwareProfile) -> Self {
        Self {
            message: datagram.text.clone(),
            address: datagram.peer.ip(),
            port: datagram.peer.port(),
            processed: false,
            software: profile.display_name.to_string(),
            timestamp: None,
            status: None,
            details: None,
            error: None,
        }
    }

    /// The parser could not produce a record.
    pub fn unprocessed(datagram: &Datagram, profile: &SoftwareProfile, reason: &ParseError) -> Self {
        Self {
            timestamp: Some(datagram.received_at),
            error: Some(reason.to_string()),
            ..Self::base(datagram, profile)
        }
    }

    /// An upload attempt finished.
    pub fn uploaded(datagram: &Datagram, profile: &SoftwareProfile, result: &UploadResult) -> Self {
        let base = Self {
            timestamp: Some(Utc::now()),
            ..Self::base(datagram, profile)
        };

        if result.success {
            Self {
                processed: true,
                status: Some(NoticeStatus::Success),
                details: Some(result.message.clone()),
                ..base
            }
        } else {
            Self {
                status: Some(NoticeStatus::Error),
                error: Some(result.message.clone()),
                details: result
                    .error
                    .as_ref()
                    .and_then(|e| serde_json::to_string_pretty(e).ok()),
                ..base
            }
        }
    }
}

/// Events published to the presentation layer.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    Listening { port: u16 },
    MessageReceived(MessageNotice),
    UploadSucceeded(UploadResult),
    UploadFailed(UploadResult),
    /// Something other than the upload itself failed, e.g. the settings file
    /// could not be read.
    ProcessingError { message: String, error: String },
    ListenerError(String),
}

/// State shared by the relay and handed in at construction.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Id of the active software profile.
    pub software: String,
    pub bind_address: IpAddr,
    pub settings: SettingsStore,
}

/// The session orchestrator.
pub struct Relay<U> {
    registry: Arc<Registry>,
    session: SessionContext,
    listener: UdpListener,
    listener_events: mpsc::Receiver<ListenerEvent>,
    uploader: Arc<U>,
    stats: Arc<RelayStats>,
    events: mpsc::Sender<RelayEvent>,
}

impl<U: Uploader> Relay<U> {
    /// Fails if `session.software` is not in the registry.
    pub fn new(
        registry: Arc<Registry>,
        session: SessionContext,
        uploader: Arc<U>,
        stats: Arc<RelayStats>,
        events: mpsc::Sender<RelayEvent>,
    ) -> Result<Self, RelayError> {
        registry.require(&session.software)?;

        let (tx, rx) = mpsc::channel(LISTENER_QUEUE);
        let listener = UdpListener::new(session.bind_address, Arc::clone(&registry), tx);

        Ok(Self {
            registry,
            session,
            listener,
            listener_events: rx,
            uploader,
            stats,
            events,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn active_profile(&self) -> SoftwareProfile {
        self.registry
            .get(&self.session.software)
            .copied()
            .unwrap_or_else(|| *self.registry.default_profile())
    }

    /// Bind the active profile's port and process events until
    /// [`Command::Shutdown`] or the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let profile = self.active_profile();
        info!("Relaying for {}", profile);
        if let Err(e) = self.listener.start(profile.listen_port).await {
            self.listener_failed(&e).await;
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::ChangeSoftware(id)) => {
                        if let Err(e) = self.reconfigure(&id).await {
                            warn!("Could not switch to {}: {}", id, e);
                        }
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(event) = self.listener_events.recv() => {
                    self.handle_listener_event(event).await;
                }
            }
        }

        self.listener.stop().await;
        info!("Relay stopped");
    }

    /// Make `software` the active profile, rebinding only when its port
    /// differs from the bound one.
    ///
    /// Returns whether a rebind happened.
    pub async fn reconfigure(&mut self, software: &str) -> Result<bool, RelayError> {
        let profile = *self.registry.require(software)?;
        self.session.software = profile.id.to_string();

        match self.listener.rebind(profile.listen_port).await {
            Ok(rebound) => {
                if rebound {
                    info!("Switched to {}", profile);
                }
                Ok(rebound)
            }
            Err(e) => {
                self.listener_failed(&e).await;
                Err(e.into())
            }
        }
    }

    async fn listener_failed(&self, e: &ListenError) {
        error!("{}", e);
        self.emit(RelayEvent::ListenerError(e.to_string())).await;
    }

    async fn emit(&self, event: RelayEvent) {
        let _ = self.events.send(event).await;
    }

    async fn handle_listener_event(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Listening { port } => self.emit(RelayEvent::Listening { port }).await,
            ListenerEvent::Error(message) => self.emit(RelayEvent::ListenerError(message)).await,
            ListenerEvent::Datagram {
                datagram,
                profile,
                parsed,
            } => {
                self.stats
                    .record_datagram(profile.display_name, datagram.text.len());

                match parsed {
                    Ok(qso) => {
                        self.stats.record_parsed();
                        let task = RecordTask {
                            uploader: Arc::clone(&self.uploader),
                            settings: self.session.settings.clone(),
                            stats: Arc::clone(&self.stats),
                            events: self.events.clone(),
                            datagram,
                            profile,
                            qso,
                        };
                        tokio::spawn(task.run());
                    }
                    Err(e) => {
                        self.stats.record_unprocessed();
                        warn!("Message from {} not processed: {}", datagram.peer, e);
                        self.emit(RelayEvent::MessageReceived(MessageNotice::unprocessed(
                            &datagram, &profile, &e,
                        )))
                        .await;
                    }
                }
            }
        }
    }
}

/// Everything one record needs to reach LdA.
struct RecordTask<U> {
    uploader: Arc<U>,
    settings: SettingsStore,
    stats: Arc<RelayStats>,
    events: mpsc::Sender<RelayEvent>,
    datagram: Datagram,
    profile: SoftwareProfile,
    qso: NormalizedQso,
}

impl<U: Uploader> RecordTask<U> {
    async fn run(self) {
        let peer = self.datagram.peer;

        let settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                error!("Could not load settings for QSO from {}: {}", peer, e);
                self.stats.record_processing_error();
                let _ = self
                    .events
                    .send(RelayEvent::ProcessingError {
                        message: "Could not load the user settings".to_string(),
                        error: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let credentials = settings.credentials();
        let missing = credentials.missing_fields();
        if !missing.is_empty() {
            warn!("Not uploading {}: missing {}", self.qso.call, missing.join(", "));
            self.stats.record_upload_refused();
            let result = UploadResult::missing_configuration(&missing).with_data(self.qso);
            let notice = MessageNotice::uploaded(&self.datagram, &self.profile, &result);
            let _ = self.events.send(RelayEvent::MessageReceived(notice)).await;
            let _ = self.events.send(RelayEvent::UploadFailed(result)).await;
            return;
        }

        let started = Instant::now();
        let mut result = self.uploader.send(&self.qso, &credentials).await;
        self.stats.record_upload(result.success, started.elapsed());

        if result.success {
            info!("Uploaded {} to LdA: {}", self.qso.call, result.message);
        } else {
            warn!("LdA upload of {} failed: {}", self.qso.call, result.message);
        }

        if result.data.is_none() {
            result.data = Some(self.qso);
        }

        let notice = MessageNotice::uploaded(&self.datagram, &self.profile, &result);
        let _ = self.events.send(RelayEvent::MessageReceived(notice)).await;

        let event = if result.success {
            RelayEvent::UploadSucceeded(result)
        } else {
            RelayEvent::UploadFailed(result)
        };
        let _ = self.events.send(event).await;
    }
}
