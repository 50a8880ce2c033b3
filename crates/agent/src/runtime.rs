//! Conversation orchestration: inbound events through the dialogue engine
//! to the send queue, plus the operator actions behind the agent API.

use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use agroquote_channel::{ChannelError, SendQueue};
use agroquote_core::config::AppConfig;
use agroquote_core::dialogue::engine::{DialogueEngine, Effect, Turn, TurnStep};
use agroquote_core::dialogue::messages::LeadAlert;
use agroquote_core::dialogue::outbound::{MediaSource, OutboundMessage};
use agroquote_core::domain::inbound::InboundEvent;
use agroquote_core::domain::records::{HistoryRow, PriceList, QuoteRecord};
use agroquote_core::domain::session::{ConversationSummary, MemoryEntry, Role, Session};
use agroquote_core::errors::{ApplicationError, Degrade};
use agroquote_db::{
    BillingCapture, BillingRepository, ClientRepository, HistoryRepository,
    InMemoryBillingRepository, InMemoryClientRepository, InMemoryHistoryRepository,
    InMemoryPriceRepository, InMemoryQuoteRecordRepository, PriceRepository,
    QuoteRecordRepository, SweepReport,
};

use crate::escalation::AdvisorDesk;
use crate::events::{EventBus, LiveEvent};
use crate::guardrails::{BusySet, SeenSet};
use crate::handoff::{HandoffController, HandoffMode, HandoffState};
use crate::render::{NoopRenderer, QuoteRenderer};
use crate::store::{SessionHandle, SessionStore};

const CAPTION_MAX: usize = 1024;
const QUOTE_CAPTION: &str = "Cotización";

/// External record keepers the runtime writes to. Every call is best effort.
#[derive(Clone)]
pub struct Collaborators {
    pub history: Arc<dyn HistoryRepository>,
    pub quotes: Arc<dyn QuoteRecordRepository>,
    pub clients: Arc<dyn ClientRepository>,
    pub billing: Arc<dyn BillingRepository>,
    pub prices: Arc<dyn PriceRepository>,
    pub renderer: Arc<dyn QuoteRenderer>,
}

impl Collaborators {
    pub fn in_memory() -> Self {
        Self {
            history: Arc::new(InMemoryHistoryRepository::default()),
            quotes: Arc::new(InMemoryQuoteRecordRepository::default()),
            clients: Arc::new(InMemoryClientRepository::default()),
            billing: Arc::new(InMemoryBillingRepository::default()),
            prices: Arc::new(InMemoryPriceRepository::default()),
            renderer: Arc::new(NoopRenderer),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub dedup_window: Duration,
    pub mute_for: Duration,
    pub billing_capture_for: Duration,
    pub advisor_window: Duration,
    pub history_retention: Duration,
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let seconds = |value: u64| Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1_000));
        Self {
            dedup_window: seconds(config.dialogue.dedup_window_secs),
            mute_for: seconds(config.dialogue.mute_secs),
            billing_capture_for: seconds(config.dialogue.billing_capture_secs),
            advisor_window: seconds(config.dialogue.advisor_window_secs),
            history_retention: Duration::days(i64::from(config.sweeps.history_retention_days)),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("recipient is required")]
    MissingRecipient,
    #[error("nothing to send")]
    NothingToSend,
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl From<RuntimeError> for ApplicationError {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::MissingRecipient | RuntimeError::NothingToSend => {
                Self::InvalidRequest(error.to_string())
            }
            RuntimeError::Channel(error) => Self::Integration(error.to_string()),
        }
    }
}

/// What became of one inbound event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Same transport id seen inside the dedup window.
    Duplicate,
    /// Sent by a configured advisor; kept out of the dialogue.
    Advisor,
    /// Another event for the conversation is mid-turn. The message is logged
    /// and the next event picks it up.
    Busy,
    Handled { replies: usize },
}

/// A file an operator attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

/// Full log of one conversation for the operator console.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationHistory {
    pub id: String,
    pub name: Option<String>,
    pub human: bool,
    pub unread: u32,
    pub memory: Vec<MemoryEntry>,
}

pub struct ConversationRuntime {
    engine: DialogueEngine,
    store: SessionStore,
    queue: SendQueue,
    seen: SeenSet,
    busy: BusySet,
    handoff: HandoffController,
    events: EventBus,
    advisors: AdvisorDesk,
    records: Collaborators,
    history_retention: Duration,
}

impl ConversationRuntime {
    pub fn new(
        engine: DialogueEngine,
        store: SessionStore,
        queue: SendQueue,
        advisors: AdvisorDesk,
        records: Collaborators,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            engine,
            store,
            queue,
            seen: SeenSet::new(settings.dedup_window),
            busy: BusySet::new(),
            handoff: HandoffController::new(settings.mute_for, settings.billing_capture_for),
            events: EventBus::new(),
            advisors,
            records,
            history_retention: settings.history_retention,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn queue(&self) -> &SendQueue {
        &self.queue
    }

    pub fn engine(&self) -> &DialogueEngine {
        &self.engine
    }

    pub fn records(&self) -> &Collaborators {
        &self.records
    }

    pub async fn handle_inbound(&self, event: &InboundEvent, now: DateTime<Utc>) -> InboundOutcome {
        let id = event.conversation_id.as_str();

        if let Some(message_id) = event.message_id.as_deref() {
            if !self.seen.first_sighting(message_id, now) {
                debug!(
                    event_name = "ingress.duplicate",
                    conversation_id = %id,
                    message_id = %message_id,
                    "duplicate delivery ignored"
                );
                return InboundOutcome::Duplicate;
            }
        }

        if self.advisors.is_advisor(id) {
            self.advisors.heard_from_advisor(now);
            info!(event_name = "escalation.advisor_inbound", conversation_id = %id, "advisor message received");
            return InboundOutcome::Advisor;
        }

        let handle = self.store.get(id, now).await;
        {
            let mut session = handle.lock().await;
            if let Some(message_id) = &event.message_id {
                session.meta.last_inbound_id = Some(message_id.clone());
            }
        }
        self.remember(&handle, Role::User, event.transcript(), now).await;

        let Some(_turn_guard) = self.busy.try_acquire(id) else {
            debug!(event_name = "ingress.busy", conversation_id = %id, "turn in progress; event logged only");
            self.persist(&handle, now).await;
            self.events.publish(LiveEvent::Conversations { id: Some(id.to_string()) });
            return InboundOutcome::Busy;
        };

        self.preload_client(&handle, now).await;

        let turn = {
            let mut session = handle.lock().await;
            let turn = if session.is_muted(now) {
                self.engine.handle_muted(&mut session, event, now)
            } else {
                self.engine.handle(&mut session, event, now)
            };
            self.store.persist(&session, now).await;
            turn
        };

        let replies = self.carry_out(&handle, turn, now).await;
        self.persist(&handle, now).await;
        self.events.publish(LiveEvent::Conversations { id: Some(id.to_string()) });
        InboundOutcome::Handled { replies }
    }

    /// Looks the customer up once per session and fills what is known.
    /// Waits for the first unmuted turn.
    async fn preload_client(&self, handle: &SessionHandle, now: DateTime<Utc>) {
        let id = {
            let mut session = handle.lock().await;
            if session.meta.client_preloaded || session.is_muted(now) {
                return;
            }
            session.meta.client_preloaded = true;
            session.id.clone()
        };

        let found = self.records.clients.find_by_phone(&id).await.degrade("records.client_lookup_failed", &id).flatten();
        if let Some(client) = found {
            let mut session = handle.lock().await;
            self.engine.apply_returning_client(&mut session, &client);
            debug!(event_name = "session.client_preloaded", conversation_id = %id, "returning client");
            self.store.persist(&session, now).await;
        }
    }

    /// Queues the turn's messages in order, then runs its effects. Returns
    /// how many messages went to the customer.
    async fn carry_out(&self, handle: &SessionHandle, turn: Turn, now: DateTime<Utc>) -> usize {
        let id = handle.lock().await.id.clone();
        let mut prices: Option<PriceList> = None;
        let mut document: Option<OutboundMessage> = None;
        let mut replies = 0;

        for step in turn.steps {
            match step {
                TurnStep::Send { role, message } => {
                    self.queue.enqueue(&id, message.clone()).await;
                    self.remember(handle, role, message.transcript(), now).await;
                    replies += 1;
                }
                TurnStep::QuoteDocument(mut quote) => {
                    quote.apply_prices(self.prices(&mut prices).await);
                    if let Some(message) = self.deliver_quote(&id, &quote).await {
                        self.remember(handle, Role::Bot, message.transcript(), now).await;
                        document = Some(message);
                        replies += 1;
                    }
                }
            }
        }

        for effect in turn.effects {
            match effect {
                Effect::HandoffChanged { human, until } => {
                    self.events.publish(LiveEvent::Handoff { id: id.clone(), human, until });
                }
                Effect::RecordQuote(mut quote) => {
                    quote.apply_prices(self.prices(&mut prices).await);
                    self.records.quotes.append(quote).await.degrade("records.quote_failed", &id);
                }
                Effect::UpsertClient(client) => {
                    self.records.clients.upsert(client).await.degrade("records.client_failed", &id);
                }
                Effect::AlertAdvisors(lead) => {
                    self.alert_advisors(&lead, document.as_ref(), now).await;
                }
                Effect::StoreBilling(details) => {
                    let capture = BillingCapture { conversation_id: id.clone(), details, captured_at: now };
                    self.records.billing.append(capture).await.degrade("records.billing_failed", &id);
                }
                Effect::ConversationsChanged => {
                    self.events.publish(LiveEvent::Conversations { id: None });
                }
            }
        }
        replies
    }

    async fn prices<'a>(&self, cache: &'a mut Option<PriceList>) -> &'a PriceList {
        if cache.is_none() {
            let loaded = self.records.prices.load().await.degrade("records.prices_failed", "catalog");
            *cache = Some(loaded.unwrap_or_default());
        }
        cache.get_or_insert_with(PriceList::default)
    }

    /// Renders, uploads and queues the quote document. `None` when any step
    /// produced nothing.
    async fn deliver_quote(&self, id: &str, quote: &QuoteRecord) -> Option<OutboundMessage> {
        let rendered = self.records.renderer.render(quote).await.degrade("render.quote_failed", id).flatten()?;
        let media_id = self
            .queue
            .channel()
            .upload_media(rendered.bytes, &rendered.filename, &rendered.mime_type)
            .await
            .degrade("egress.upload_failed", id)?;

        let message = OutboundMessage::Document {
            source: MediaSource::MediaId { id: media_id },
            filename: rendered.filename,
            caption: Some(QUOTE_CAPTION.to_string()),
        };
        self.queue.enqueue(id, message.clone()).await;
        Some(message)
    }

    async fn alert_advisors(&self, lead: &LeadAlert, document: Option<&OutboundMessage>, now: DateTime<Utc>) {
        if self.advisors.numbers().is_empty() {
            return;
        }
        if !self.advisors.window_open(now) {
            warn!(
                event_name = "escalation.outside_window",
                conversation_id = %lead.conversation_id,
                "advisor has not written in the last day; free-form alert may be refused"
            );
        }

        let text = self.advisors.alert_text(lead);
        for number in self.advisors.numbers() {
            self.queue.enqueue(number, OutboundMessage::text(text.clone())).await;
            if let Some(document) = document {
                self.queue.enqueue(number, document.clone()).await;
            }
        }
        info!(
            event_name = "escalation.alert_sent",
            conversation_id = %lead.conversation_id,
            advisors = self.advisors.numbers().len(),
            "lead alert queued"
        );
    }

    /// Adds a line to the session log, then mirrors it to observers and the
    /// history collaborator.
    async fn remember(&self, handle: &SessionHandle, role: Role, content: String, now: DateTime<Utc>) -> MemoryEntry {
        let (id, entry) = {
            let mut session = handle.lock().await;
            let entry = session.remember(role, content, now);
            (session.id.clone(), entry)
        };
        self.announce(&id, &entry).await;
        entry
    }

    async fn announce(&self, id: &str, entry: &MemoryEntry) {
        self.events.publish(LiveEvent::message(id, entry));
        let row = HistoryRow {
            conversation_id: id.to_string(),
            role: entry.role,
            content: entry.content.clone(),
            recorded_at: entry.at,
        };
        self.records.history.append(row).await.degrade("records.history_failed", id);
    }

    async fn persist(&self, handle: &SessionHandle, now: DateTime<Utc>) {
        let session = handle.lock().await;
        self.store.persist(&session, now).await;
    }

    /// Operator text. Pauses the bot and may open the billing capture window.
    pub async fn agent_send(&self, to: &str, text: &str, now: DateTime<Utc>) -> Result<HandoffState, RuntimeError> {
        let to = to.trim();
        if to.is_empty() {
            return Err(RuntimeError::MissingRecipient);
        }
        if text.trim().is_empty() {
            return Err(RuntimeError::NothingToSend);
        }

        self.queue.enqueue(to, OutboundMessage::text(text)).await.settled().await?;

        let handle = self.store.get(to, now).await;
        let state = {
            let mut session = handle.lock().await;
            self.handoff.agent_sent(&mut session, text, now)
        };
        self.remember(&handle, Role::Agent, text.to_string(), now).await;
        self.persist(&handle, now).await;

        self.events.publish(LiveEvent::Handoff { id: to.to_string(), human: state.human, until: state.until });
        self.events.publish(LiveEvent::Conversations { id: Some(to.to_string()) });
        Ok(state)
    }

    /// Uploads and sends each file. Failed uploads or sends are skipped;
    /// returns how many went out.
    pub async fn agent_send_media(
        &self,
        to: &str,
        files: Vec<MediaUpload>,
        caption: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<usize, RuntimeError> {
        let to = to.trim();
        if to.is_empty() {
            return Err(RuntimeError::MissingRecipient);
        }
        if files.is_empty() {
            return Err(RuntimeError::NothingToSend);
        }

        let caption: Option<String> = caption
            .map(|text| text.chars().take(CAPTION_MAX).collect::<String>())
            .filter(|text| !text.trim().is_empty());

        let handle = self.store.get(to, now).await;
        let state = {
            let mut session = handle.lock().await;
            self.handoff.agent_sent_media(&mut session, now)
        };

        let mut sent = 0;
        for file in files {
            let Some(media_id) = self
                .queue
                .channel()
                .upload_media(file.bytes, &file.filename, &file.mime_type)
                .await
                .degrade("egress.upload_failed", to)
            else {
                continue;
            };

            let source = MediaSource::MediaId { id: media_id };
            let message = if file.mime_type.starts_with("image/") {
                OutboundMessage::Image { source, caption: caption.clone() }
            } else {
                OutboundMessage::Document { source, filename: file.filename, caption: caption.clone() }
            };

            if self.queue.enqueue(to, message.clone()).await.settled().await.is_ok() {
                sent += 1;
                self.remember(&handle, Role::Agent, message.transcript(), now).await;
            }
        }
        self.persist(&handle, now).await;

        self.events.publish(LiveEvent::Handoff { id: to.to_string(), human: state.human, until: state.until });
        self.events.publish(LiveEvent::Conversations { id: Some(to.to_string()) });
        Ok(sent)
    }

    /// Clears the unread counter and marks the last inbound message read on
    /// the channel.
    pub async fn mark_read(&self, to: &str, now: DateTime<Utc>) -> Result<(), RuntimeError> {
        let to = to.trim();
        if to.is_empty() {
            return Err(RuntimeError::MissingRecipient);
        }

        let handle = self.store.get(to, now).await;
        let last_inbound = {
            let mut session = handle.lock().await;
            session.mark_read();
            self.store.persist(&session, now).await;
            session.meta.last_inbound_id.clone()
        };
        if let Some(message_id) = last_inbound {
            self.queue.channel().mark_read(&message_id).await.degrade("egress.read_failed", to);
        }

        self.events.publish(LiveEvent::Read { id: to.to_string() });
        self.events.publish(LiveEvent::Conversations { id: Some(to.to_string()) });
        Ok(())
    }

    pub async fn set_handoff(&self, to: &str, mode: HandoffMode, now: DateTime<Utc>) -> Result<HandoffState, RuntimeError> {
        let to = to.trim();
        if to.is_empty() {
            return Err(RuntimeError::MissingRecipient);
        }

        let handle = self.store.get(to, now).await;
        let outcome = {
            let mut session = handle.lock().await;
            let outcome = self.handoff.set_mode(&mut session, mode, now);
            self.store.persist(&session, now).await;
            outcome
        };
        self.announce(to, &outcome.note).await;

        if let Some(text) = outcome.announce {
            self.queue.enqueue(to, OutboundMessage::text(text.clone())).await;
            self.remember(&handle, Role::Bot, text, now).await;
            self.persist(&handle, now).await;
        }

        info!(
            event_name = "handoff.changed",
            conversation_id = %to,
            human = outcome.state.human,
            "operator changed conversation mode"
        );
        self.events.publish(LiveEvent::Handoff { id: to.to_string(), human: outcome.state.human, until: outcome.state.until });
        self.events.publish(LiveEvent::Conversations { id: Some(to.to_string()) });
        Ok(outcome.state)
    }

    /// Unknown ids read as an empty log and are not created.
    pub async fn history(&self, id: &str, now: DateTime<Utc>) -> ConversationHistory {
        let session = self.store.peek(id, now).await.unwrap_or_else(|| Session::new(id));
        ConversationHistory {
            id: session.id.clone(),
            name: session.profile_name.clone(),
            human: session.is_muted(now),
            unread: session.meta.unread,
            memory: session.memory.clone(),
        }
    }

    pub async fn conversations(&self, now: DateTime<Utc>) -> Vec<ConversationSummary> {
        self.store.summaries(now).await
    }

    /// Drops in-memory sessions idle past the TTL.
    pub async fn sweep_memory(&self, now: DateTime<Utc>) -> usize {
        let removed = self.store.sweep_idle(now).await;
        if removed > 0 {
            info!(event_name = "sweep.memory", removed, "idle sessions evicted");
        }
        removed
    }

    /// Deletes snapshot files older than the TTL.
    pub async fn sweep_disk(&self, now: SystemTime) -> SweepReport {
        let report = self
            .store
            .snapshots()
            .sweep(now)
            .await
            .degrade("sweep.disk_failed", "sweep")
            .unwrap_or_default();
        if report.removed > 0 {
            info!(event_name = "sweep.disk", scanned = report.scanned, removed = report.removed, "expired snapshots deleted");
        }
        report
    }

    pub fn prune_seen(&self, now: DateTime<Utc>) -> usize {
        self.seen.prune(now)
    }

    pub async fn purge_history(&self, now: DateTime<Utc>) -> u64 {
        let cutoff = now - self.history_retention;
        let purged = self
            .records
            .history
            .purge_before(cutoff)
            .await
            .degrade("sweep.history_failed", "sweep")
            .unwrap_or(0);
        if purged > 0 {
            info!(event_name = "sweep.history", purged, "old history rows purged");
        }
        purged
    }

    pub fn heartbeat(&self, now: DateTime<Utc>) -> usize {
        self.events.publish(LiveEvent::Ping { at: now })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use agroquote_channel::{RecordingChannel, SendQueue};
    use agroquote_core::config::AppConfig;
    use agroquote_core::dialogue::engine::{DialogueEngine, DialogueSettings};
    use agroquote_core::dialogue::messages::AdvisorProfile;
    use agroquote_core::domain::catalog::Catalog;
    use agroquote_core::domain::inbound::InboundEvent;
    use agroquote_core::domain::session::Role;
    use agroquote_db::SnapshotStore;

    use super::{Collaborators, ConversationRuntime, InboundOutcome, MediaUpload, RuntimeError, RuntimeSettings};
    use crate::escalation::AdvisorDesk;
    use crate::handoff::HandoffMode;
    use crate::store::SessionStore;

    fn runtime(dir: &TempDir, channel: Arc<RecordingChannel>) -> ConversationRuntime {
        let store = SessionStore::new(SnapshotStore::new(dir.path().join("sessions"), Duration::days(7)));
        let queue = SendQueue::new(channel, StdDuration::from_millis(350));
        let advisors = AdvisorDesk::new(
            vec!["59170000099".to_string()],
            AdvisorProfile {
                name: "Carla".to_string(),
                role: "asesora".to_string(),
                brand: "Greenfield".to_string(),
                utc_offset_minutes: -240,
            },
            Duration::hours(24),
        );
        ConversationRuntime::new(
            DialogueEngine::new(Catalog::default(), DialogueSettings::from_config(&AppConfig::default())),
            store,
            queue,
            advisors,
            Collaborators::in_memory(),
            RuntimeSettings::default(),
        )
    }

    #[tokio::test]
    async fn duplicate_message_id_is_processed_once() {
        tokio::time::pause();
        let dir = TempDir::new().expect("tempdir");
        let runtime = runtime(&dir, Arc::new(RecordingChannel::new()));
        let now = Utc::now();
        let event = InboundEvent::text("59170000001", "Hola", now).with_message_id("wamid.1");

        assert!(matches!(runtime.handle_inbound(&event, now).await, InboundOutcome::Handled { .. }));
        assert_eq!(runtime.handle_inbound(&event, now).await, InboundOutcome::Duplicate);

        let history = runtime.history("59170000001", now).await;
        assert_eq!(history.memory.iter().filter(|entry| entry.role == Role::User).count(), 1);
    }

    #[tokio::test]
    async fn advisor_messages_stay_out_of_the_dialogue() {
        tokio::time::pause();
        let dir = TempDir::new().expect("tempdir");
        let runtime = runtime(&dir, Arc::new(RecordingChannel::new()));
        let now = Utc::now();

        let outcome = runtime.handle_inbound(&InboundEvent::text("+591 70000099", "ok", now), now).await;

        assert_eq!(outcome, InboundOutcome::Advisor);
        assert!(runtime.store().is_empty().await);
    }

    #[tokio::test]
    async fn history_of_unknown_id_creates_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let runtime = runtime(&dir, Arc::new(RecordingChannel::new()));

        let history = runtime.history("59170000404", Utc::now()).await;

        assert_eq!(history.id, "59170000404");
        assert!(history.memory.is_empty());
        assert!(runtime.store().is_empty().await);
        assert!(runtime.conversations(Utc::now()).await.is_empty());
    }

    #[tokio::test]
    async fn empty_recipient_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let runtime = runtime(&dir, Arc::new(RecordingChannel::new()));

        let error = runtime.agent_send("  ", "hola", Utc::now()).await.expect_err("no recipient");
        assert!(matches!(error, RuntimeError::MissingRecipient));
        let error = runtime.agent_send_media("59170000001", Vec::new(), None, Utc::now()).await.expect_err("no files");
        assert!(matches!(error, RuntimeError::NothingToSend));
    }

    #[tokio::test]
    async fn media_is_sent_by_kind_and_counted() {
        tokio::time::pause();
        let dir = TempDir::new().expect("tempdir");
        let channel = Arc::new(RecordingChannel::new());
        let runtime = runtime(&dir, channel.clone());
        let now = Utc::now();

        let files = vec![
            MediaUpload { bytes: vec![1, 2], filename: "foto.jpg".to_string(), mime_type: "image/jpeg".to_string() },
            MediaUpload { bytes: vec![3], filename: "ficha.pdf".to_string(), mime_type: "application/pdf".to_string() },
        ];
        let sent = runtime.agent_send_media("59170000002", files, Some("Ficha técnica"), now).await.expect("send media");

        assert_eq!(sent, 2);
        assert_eq!(channel.uploads().await.len(), 2);
        let history = runtime.history("59170000002", now).await;
        assert!(history.human);
        assert_eq!(history.memory.iter().filter(|entry| entry.role == Role::Agent).count(), 2);
    }

    #[tokio::test]
    async fn bot_handoff_announces_and_unmutes() {
        tokio::time::pause();
        let dir = TempDir::new().expect("tempdir");
        let channel = Arc::new(RecordingChannel::new());
        let runtime = runtime(&dir, channel.clone());
        let now = Utc::now();

        let paused = runtime.set_handoff("59170000003", HandoffMode::Human, now).await.expect("pause");
        assert!(paused.human);
        let resumed = runtime.set_handoff("59170000003", HandoffMode::Bot, now).await.expect("resume");
        assert!(!resumed.human);

        tokio::time::sleep(StdDuration::from_secs(1)).await;
        assert_eq!(channel.delivered_to("59170000003").await.len(), 1);
        let history = runtime.history("59170000003", now).await;
        assert!(!history.human);
        assert_eq!(history.memory.iter().filter(|entry| entry.role == Role::System).count(), 2);
    }
}
