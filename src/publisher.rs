// =============================================================================
// publisher.rs - THE WEBHOOK DOOMSAYER
// =============================================================================
//
// Every new RFQ gets screamed into an enterprise chat group robot, one
// webhook per source. Loud, but only once per record.
//
// The poller only sees the `Dispatcher` trait: hand it a record and a notify
// target, get back Ok or an error. What the message looks like is this
// module's business and nobody else's.
//
// The group robot API answers HTTP 200 even when it hates you, so "sent"
// means the JSON reply says `errcode: 0`. Anything else is a failure, and a
// failed record is NOT marked as seen. It will be back next cycle.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::EnrichedRecord;

/// Badge images for levels 1-3. Level 0 gets no badge.
const LEVEL_BADGES: &[(u8, &str)] = &[
    (1, "https://img.alicdn.com/imgextra/i2/O1CN01B4pKUX1tIdHA9HOvG_!!6000000005879-2-tps-294-60.png"),
    (2, "https://img.alicdn.com/imgextra/i3/O1CN01vBjGY61VoBhRLyKX5_!!6000000002699-2-tps-279-60.png"),
    (3, "https://img.alicdn.com/imgextra/i1/O1CN01xqZ7i21uEnURLYxcU_!!6000000006006-2-tps-279-60.png"),
];

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook answered with HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("webhook rejected the message (errcode {code}): {message}")]
    Rejected { code: i64, message: String },
}

/// Delivers one record to one notify target.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, record: &EnrichedRecord, target: &str) -> Result<(), DispatchError>;
}

#[derive(Serialize)]
struct MarkdownBody<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    msgtype: &'static str,
    markdown_v2: MarkdownBody<'a>,
}

#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default = "unknown_errcode")]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

fn unknown_errcode() -> i64 {
    -1
}

/// Group robot webhook dispatcher. `target` is the full webhook URL.
#[derive(Debug, Clone)]
pub struct WeworkDispatcher {
    client: reqwest::Client,
}

impl WeworkDispatcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Dispatcher for WeworkDispatcher {
    async fn dispatch(&self, record: &EnrichedRecord, target: &str) -> Result<(), DispatchError> {
        let content = render_markdown(record);
        let payload = WebhookPayload {
            msgtype: "markdown_v2",
            markdown_v2: MarkdownBody { content: &content },
        };

        let response = self.client.post(target).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Status(status));
        }

        let reply: WebhookReply = response.json().await?;
        if reply.errcode != 0 {
            return Err(DispatchError::Rejected {
                code: reply.errcode,
                message: reply.errmsg,
            });
        }

        debug!(id = %record.id, "Webhook accepted the message");
        Ok(())
    }
}

/// Render the markdown card for one record.
pub fn render_markdown(record: &EnrichedRecord) -> String {
    let mut lines = vec![format!("##### {}", record.subject)];

    if let Some((_, badge)) = LEVEL_BADGES.iter().find(|(level, _)| *level == record.ranking) {
        lines.push(format!("![等级]({badge})"));
    }
    lines.push(format!("**数量:** {}", record.quantity));
    lines.push(format!("**来源:** {}", record.origin));

    let link = record
        .url
        .as_deref()
        .map(|url| format!("[阅读详情]({url})"))
        .unwrap_or_default();
    lines.push(format!("**内容描述:** {}{}", preview(&record.description), link));

    lines.join("\n")
}

/// First 200 characters, with `...` when we had to cut.
fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(ranking: u8, description: &str) -> EnrichedRecord {
        EnrichedRecord {
            id: "1001".into(),
            url: Some("https://example.com/rfq/1001".into()),
            ranking,
            posted_at: "2024-05-01".into(),
            origin: "Germany".into(),
            quantity: "5000 Pieces".into(),
            description: description.into(),
            subject: "Paper bags".into(),
        }
    }

    #[test]
    fn test_markdown_has_badge_for_ranked_records() {
        let text = render_markdown(&record(1, "short"));
        assert!(text.starts_with("##### Paper bags\n"));
        assert!(text.contains("6000000005879-2-tps-294-60.png"));
        assert!(text.contains("**数量:** 5000 Pieces"));
        assert!(text.contains("**来源:** Germany"));
        assert!(text.ends_with("short[阅读详情](https://example.com/rfq/1001)"));
    }

    #[test]
    fn test_markdown_skips_badge_for_unranked() {
        let text = render_markdown(&record(0, "short"));
        assert!(!text.contains("!["));
    }

    #[test]
    fn test_long_descriptions_are_cut_at_200_chars() {
        let long = "袋".repeat(250);
        let text = render_markdown(&record(2, &long));
        assert!(text.contains(&format!("{}...", "袋".repeat(200))));
        assert!(!text.contains(&"袋".repeat(201)));
        assert_eq!(preview(&"x".repeat(200)), "x".repeat(200));
    }

    #[tokio::test]
    async fn test_errcode_zero_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "msgtype": "markdown_v2" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "errcode": 0, "errmsg": "ok" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WeworkDispatcher::new(Duration::from_secs(5)).unwrap();
        dispatcher
            .dispatch(&record(1, "hello"), &server.uri())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_nonzero_errcode_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    serde_json::json!({ "errcode": 93000, "errmsg": "invalid webhook url" }),
                ),
            )
            .mount(&server)
            .await;

        let dispatcher = WeworkDispatcher::new(Duration::from_secs(5)).unwrap();
        let err = dispatcher
            .dispatch(&record(1, "hello"), &server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { code: 93000, .. }));
    }

    #[tokio::test]
    async fn test_http_error_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dispatcher = WeworkDispatcher::new(Duration::from_secs(5)).unwrap();
        let err = dispatcher
            .dispatch(&record(1, "hello"), &server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Status(_)));
    }
}
