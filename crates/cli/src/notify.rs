use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use drivewatch_core::Notifier;

/// Sends messages to one chat through the Telegram Bot API.
pub struct TelegramNotifier {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Deserialize)]
struct TelegramReply {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, bot_token: String, chat_id: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": message,
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            // The URL embeds the bot token; keep it out of the error.
            .map_err(|e| anyhow::anyhow!("telegram request failed: {}", e.without_url()))?;

        let status = resp.status();
        let reply: TelegramReply = resp
            .json()
            .await
            .with_context(|| format!("unexpected telegram response ({status})"))?;
        if !reply.ok {
            anyhow::bail!(
                "telegram rejected message ({status}): {}",
                reply.description.unwrap_or_default()
            );
        }
        debug!(chat = %self.chat_id, "telegram message sent");
        Ok(())
    }
}

/// Delivers every message to all configured notifiers.
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Arc<dyn Notifier>>) -> Self {
        Self { targets }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let results =
            futures::future::join_all(self.targets.iter().map(|target| target.send(message))).await;
        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.err())
            .map(|e| format!("{e:#}"))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("{}", failures.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Recording(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for Recording {
        async fn send(&self, message: &str) -> Result<()> {
            self.0.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Notifier for Failing {
        async fn send(&self, _message: &str) -> Result<()> {
            anyhow::bail!("down")
        }
    }

    #[tokio::test]
    async fn fanout_reaches_every_target() {
        let a = Arc::new(Recording(Mutex::new(Vec::new())));
        let b = Arc::new(Recording(Mutex::new(Vec::new())));
        let fanout = FanoutNotifier::new(vec![
            a.clone() as Arc<dyn Notifier>,
            Arc::new(Failing) as Arc<dyn Notifier>,
            b.clone() as Arc<dyn Notifier>,
        ]);

        let err = fanout.send("hello").await.unwrap_err();
        assert!(err.to_string().contains("down"));
        assert_eq!(*a.0.lock().unwrap(), vec!["hello"]);
        assert_eq!(*b.0.lock().unwrap(), vec!["hello"]);
    }

    /// Answer one request with `reply`, returning what was received.
    async fn one_shot(reply: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut received = Vec::new();
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&received);
                if n == 0 || text.contains("\"text\"") && text.ends_with('}') {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
                reply.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&received).to_string()
        });
        (base, handle)
    }

    #[tokio::test]
    async fn telegram_posts_to_send_message() {
        let (base, request) = one_shot(r#"{"ok": true, "result": {}}"#).await;
        let telegram =
            TelegramNotifier::new(&base, "123:abc".into(), "-42".into(), Duration::from_secs(5)).unwrap();

        telegram.send("file changed").await.unwrap();

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /bot123:abc/sendMessage "));
        assert!(request.contains("\"chat_id\":\"-42\""));
        assert!(request.contains("\"text\":\"file changed\""));
    }

    #[tokio::test]
    async fn telegram_reports_rejections() {
        let (base, _request) = one_shot(r#"{"ok": false, "description": "chat not found"}"#).await;
        let telegram =
            TelegramNotifier::new(&base, "t".into(), "c".into(), Duration::from_secs(5)).unwrap();

        let err = telegram.send("x").await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }
}
