use crate::api::{FetchOutcome, InboxApi, UploadOutcome};
use crate::config::Config;
use crate::log::ConversationLog;
use crate::render;
use crate::store::VisitorStore;
use crate::types::Message;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

pub const GREETING: &str = "👋 Hello! I'm the support assistant. How can I help you today?";
pub const ACK_NOTICE: &str = "⏳ Thank you! Our team will respond shortly.";
pub const UPLOAD_REJECTED_NOTICE: &str = "❌ File upload failed. Please try again.";
pub const UPLOAD_UNREACHABLE_NOTICE: &str =
    "❌ Could not upload file. Please check your connection.";

/// What the visitor wants to send: text, a staged attachment, or both.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub text: Option<String>,
    pub attachment: Option<PathBuf>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachment: None,
        }
    }

    pub fn attachment(path: impl Into<PathBuf>) -> Self {
        Self {
            text: None,
            attachment: Some(path.into()),
        }
    }
}

/// Visitor-side view of one conversation: durable identity, the mirrored
/// log, the open/collapsed state and the poll ticker. All mutation happens
/// on the caller's task; the ticker only sends wake-ups over the channel.
pub struct ConversationClient {
    api: InboxApi,
    store: VisitorStore,
    log: ConversationLog,
    visitor_id: String,
    last_seen: Option<DateTime<Utc>>,
    view_open: bool,
    title: String,
    poll_interval: Duration,
    ticks_tx: mpsc::UnboundedSender<()>,
    ticks_rx: mpsc::UnboundedReceiver<()>,
    poll_task: Option<JoinHandle<()>>,
}

impl ConversationClient {
    /// Loads or mints the visitor identity, registers it with the inbox on
    /// a best-effort basis and pulls the initial message list. Construction
    /// succeeds even when the server is unreachable; the client then runs
    /// on its local log until a later refresh gets through.
    pub async fn start(config: &Config) -> Result<Self> {
        let api = InboxApi::new(&config.server)?;
        let mut store = VisitorStore::open(&config.storage.dir)?;
        let visitor_id = store.load_or_create_visitor()?;
        let last_seen = store.last_seen(&visitor_id);
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();

        let mut client = Self {
            api,
            store,
            log: ConversationLog::new(),
            visitor_id,
            last_seen,
            view_open: false,
            title: config.widget.title.clone(),
            poll_interval: Duration::from_millis(config.polling.interval_ms),
            ticks_tx,
            ticks_rx,
            poll_task: None,
        };

        if let Err(err) = client.api.register_visitor(&client.visitor_id).await {
            warn!("could not register visitor with inbox server: {err:#}");
        }
        client.refresh().await;
        debug!("conversation client ready, visitor {}", client.visitor_id);
        Ok(client)
    }

    pub fn visitor_id(&self) -> &str {
        &self.visitor_id
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    pub fn is_open(&self) -> bool {
        self.view_open
    }

    /// Wake-ups from the poll ticker; the event loop selects on this and
    /// calls `refresh` for each tick.
    pub fn ticks(&mut self) -> &mut mpsc::UnboundedReceiver<()> {
        &mut self.ticks_rx
    }

    /// Pulls the authoritative list from the server. Transport failure
    /// keeps the local log untouched; a 404 means the conversation does not
    /// exist server-side, so the log resets and registration is retried.
    pub async fn refresh(&mut self) {
        match self.api.fetch_messages(&self.visitor_id).await {
            Ok(FetchOutcome::Messages(messages)) => {
                self.log.reconcile(messages);
            }
            Ok(FetchOutcome::NoConversation) => {
                if let Err(err) = self.api.register_visitor(&self.visitor_id).await {
                    warn!("could not re-register visitor: {err:#}");
                }
                self.log.clear();
            }
            Err(err) => {
                warn!("inbox server unreachable, keeping local conversation: {err:#}");
            }
        }
    }

    /// Unified send for text and attachments. The message appears in the
    /// log immediately as `active` and transitions to `sent` once the
    /// server accepts it. Returns the acknowledgment notice to show once;
    /// the notice is a display affordance, never a log entry.
    pub async fn send(&mut self, draft: Draft) -> Result<Option<&'static str>> {
        let text = draft
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let staged = match &draft.attachment {
            Some(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read attachment: {}", path.display()))?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                Some((name, bytes))
            }
            None => None,
        };
        if text.is_none() && staged.is_none() {
            bail!("nothing to send");
        }

        let mut notice = None;

        if let Some(text) = text {
            let message = Message::visitor(text, Utc::now());
            let client_id = message.id.clone();
            self.log.push(message);
            match self.api.send_message(&self.visitor_id, text).await {
                Ok(()) => {
                    if let Some(id) = client_id.as_deref() {
                        self.log.mark_sent(id);
                    }
                }
                Err(err) => {
                    warn!("message not delivered, left active: {err:#}");
                }
            }
            notice = Some(ACK_NOTICE);
            self.start_polling();
        }

        if let Some((name, bytes)) = staged {
            self.log
                .push(Message::visitor(format!("📎 Uploaded: {name}"), Utc::now()));
            match self.api.upload_file(&self.visitor_id, &name, bytes).await {
                Ok(UploadOutcome::Accepted) => {
                    notice = Some(ACK_NOTICE);
                    self.start_polling();
                }
                Ok(UploadOutcome::Rejected) => {
                    self.log
                        .push(Message::admin_notice(UPLOAD_REJECTED_NOTICE, Utc::now()));
                }
                Err(err) => {
                    warn!("attachment not uploaded: {err:#}");
                    self.log
                        .push(Message::admin_notice(UPLOAD_UNREACHABLE_NOTICE, Utc::now()));
                }
            }
        }

        Ok(notice)
    }

    /// Opens the conversation view: greets an empty conversation, then
    /// advances the last-seen marker so the unread badge clears. The
    /// greeting lands before the marker moves, so it never counts as
    /// unread.
    pub fn open(&mut self) {
        self.view_open = true;
        if self.log.is_empty() {
            self.log.push(Message::admin_notice(GREETING, Utc::now()));
        }
        let now = Utc::now();
        self.last_seen = Some(now);
        if let Err(err) = self.store.advance_last_seen(&self.visitor_id, now) {
            warn!("could not persist last-seen marker: {err:#}");
        }
    }

    /// Collapses the view to the badge line. Polling, if running, keeps
    /// running so replies still raise the badge.
    pub fn close(&mut self) {
        self.view_open = false;
    }

    /// Starts the poll ticker. A second start is a no-op; at most one
    /// ticker runs per client.
    pub fn start_polling(&mut self) {
        if self.poll_task.is_some() {
            return;
        }
        debug!("starting poll ticker, interval {:?}", self.poll_interval);
        let tx = self.ticks_tx.clone();
        let mut ticker = IntervalStream::new(tokio::time::interval(self.poll_interval));
        self.poll_task = Some(tokio::spawn(async move {
            // the first interval tick completes immediately, not one period in
            ticker.next().await;
            while ticker.next().await.is_some() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        }));
    }

    /// Cancels the poll ticker; stopping twice is a no-op. Nothing else
    /// stops it, closing the view in particular does not.
    pub fn stop_polling(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
            debug!("poll ticker stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task.is_some()
    }

    /// Projects the current state to display lines: the full conversation
    /// when open, the badge line when collapsed.
    pub fn render(&self) -> Vec<String> {
        if self.view_open {
            render::conversation_lines(self.log.messages(), Utc::now())
        } else {
            vec![render::badge_line(
                &self.title,
                self.log.has_unread(self.last_seen),
            )]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PollingConfig, ServerConfig, StorageConfig, WidgetConfig};
    use crate::types::DeliveryStatus;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir, url: &str, interval_ms: u64) -> Config {
        Config {
            server: ServerConfig {
                url: url.to_string(),
            },
            storage: StorageConfig {
                dir: dir.path().to_path_buf(),
            },
            polling: PollingConfig { interval_ms },
            widget: WidgetConfig {
                title: "support chat".to_string(),
            },
        }
    }

    async fn unreachable_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    #[tokio::test(start_paused = true)]
    async fn polling_starts_once_and_stops_on_request() {
        let dir = TempDir::new().unwrap();
        let url = unreachable_url().await;
        let config = test_config(&dir, &url, 100);
        let mut client = ConversationClient::start(&config).await.unwrap();

        client.start_polling();
        client.start_polling();
        assert!(client.is_polling());

        tokio::time::sleep(Duration::from_millis(350)).await;
        let mut ticks = 0;
        while client.ticks().try_recv().is_ok() {
            ticks += 1;
        }
        assert_eq!(ticks, 3, "one ticker, one tick per interval");

        client.stop_polling();
        client.stop_polling();
        assert!(!client.is_polling());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(client.ticks().try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_view_keeps_polling() {
        let dir = TempDir::new().unwrap();
        let url = unreachable_url().await;
        let config = test_config(&dir, &url, 100);
        let mut client = ConversationClient::start(&config).await.unwrap();

        client.start_polling();
        client.close();
        assert!(client.is_polling());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(client.ticks().try_recv().is_ok());
    }

    #[tokio::test]
    async fn open_greets_empty_conversation_once_and_clears_badge() {
        let dir = TempDir::new().unwrap();
        let url = unreachable_url().await;
        let config = test_config(&dir, &url, 5_000);
        let mut client = ConversationClient::start(&config).await.unwrap();

        client.open();
        assert_eq!(client.log().len(), 1);
        assert_eq!(client.log().messages()[0].text, GREETING);
        assert!(!client.log().has_unread(client.last_seen()));

        client.close();
        client.open();
        assert_eq!(client.log().len(), 1, "greeting must not repeat");
    }

    #[tokio::test]
    async fn open_persists_the_marker() {
        let dir = TempDir::new().unwrap();
        let url = unreachable_url().await;
        let config = test_config(&dir, &url, 5_000);

        let mut client = ConversationClient::start(&config).await.unwrap();
        client.open();
        let marker = client.last_seen().unwrap();

        let restarted = ConversationClient::start(&config).await.unwrap();
        assert_eq!(restarted.last_seen(), Some(marker));
    }

    #[tokio::test]
    async fn empty_draft_is_rejected() {
        let dir = TempDir::new().unwrap();
        let url = unreachable_url().await;
        let config = test_config(&dir, &url, 5_000);
        let mut client = ConversationClient::start(&config).await.unwrap();

        let err = client
            .send(Draft {
                text: Some("   ".to_string()),
                attachment: None,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nothing to send"));
        assert!(client.log().is_empty());
        assert!(!client.is_polling());
    }

    #[tokio::test]
    async fn optimistic_send_without_server_keeps_message_active() {
        let dir = TempDir::new().unwrap();
        let url = unreachable_url().await;
        let config = test_config(&dir, &url, 5_000);
        let mut client = ConversationClient::start(&config).await.unwrap();

        let notice = client.send(Draft::text("hello")).await.unwrap();
        assert_eq!(notice, Some(ACK_NOTICE));
        assert_eq!(client.log().len(), 1);
        assert_eq!(client.log().messages()[0].text, "hello");
        assert_eq!(
            client.log().messages()[0].status,
            Some(DeliveryStatus::Active)
        );
        assert!(client.is_polling());

        // a refresh that cannot reach the server leaves the log untouched
        client.refresh().await;
        assert_eq!(client.log().len(), 1);
    }

    #[tokio::test]
    async fn collapsed_render_is_the_badge_line() {
        let dir = TempDir::new().unwrap();
        let url = unreachable_url().await;
        let config = test_config(&dir, &url, 5_000);
        let client = ConversationClient::start(&config).await.unwrap();

        assert!(!client.is_open());
        assert_eq!(client.render(), vec!["[support chat]".to_string()]);
    }
}
