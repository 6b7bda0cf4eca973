use crate::config::ServerConfig;
use crate::types::Message;
use anyhow::{bail, Context, Result};
use reqwest::multipart;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Thin adapter for the admin inbox REST surface.
pub struct InboxApi {
    client: reqwest::Client,
    base_url: String,
}

/// Outcome of a message-list fetch the caller must branch on: a 404 means
/// "no conversation yet", not a failure.
#[derive(Debug)]
pub enum FetchOutcome {
    Messages(Vec<Message>),
    NoConversation,
}

/// `Rejected` covers any non-success response; transport failures surface
/// as `Err` so the caller can tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Accepted,
    Rejected,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VisitorPayload<'a> {
    visitor_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendPayload<'a> {
    visitor_id: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct MessagesEnvelope {
    #[serde(default)]
    messages: Vec<Message>,
}

impl InboxApi {
    pub fn new(cfg: &ServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            base_url: cfg.url.trim_end_matches('/').to_string(),
        })
    }

    /// Ensures a conversation exists server-side for this visitor. Safe to
    /// call again for a known visitor.
    pub async fn register_visitor(&self, visitor_id: &str) -> Result<()> {
        debug!("registering visitor {visitor_id}");
        let res = self
            .client
            .post(format!("{}/api/visitor", self.base_url))
            .json(&VisitorPayload { visitor_id })
            .send()
            .await
            .context("failed to reach inbox server")?;
        if !res.status().is_success() {
            bail!("visitor registration rejected: {}", res.status());
        }
        Ok(())
    }

    pub async fn fetch_messages(&self, visitor_id: &str) -> Result<FetchOutcome> {
        let res = self
            .client
            .get(format!("{}/api/messages/{visitor_id}", self.base_url))
            .send()
            .await
            .context("failed to reach inbox server")?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NoConversation);
        }
        if !res.status().is_success() {
            bail!("message fetch rejected: {}", res.status());
        }
        let envelope: MessagesEnvelope =
            res.json().await.context("failed to decode message list")?;
        Ok(FetchOutcome::Messages(envelope.messages))
    }

    pub async fn send_message(&self, visitor_id: &str, message: &str) -> Result<()> {
        debug!("sending message for {visitor_id}");
        let res = self
            .client
            .post(format!("{}/api/messages", self.base_url))
            .json(&SendPayload {
                visitor_id,
                message,
            })
            .send()
            .await
            .context("failed to reach inbox server")?;
        if !res.status().is_success() {
            bail!("message delivery rejected: {}", res.status());
        }
        Ok(())
    }

    pub async fn upload_file(
        &self,
        visitor_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome> {
        debug!("uploading {file_name} for {visitor_id}");
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new()
            .part("file", part)
            .text("visitorId", visitor_id.to_string());
        let res = self
            .client
            .post(format!("{}/api/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .context("failed to reach inbox server")?;
        if res.status().is_success() {
            Ok(UploadOutcome::Accepted)
        } else {
            Ok(UploadOutcome::Rejected)
        }
    }
}
