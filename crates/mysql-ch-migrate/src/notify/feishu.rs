//! Feishu (Lark) interactive-card webhook notifier.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info};

use super::{FailureNotice, Notifier};
use crate::config::{NotificationConfig, TableJob};
use crate::error::{MigrateError, Result};
use crate::orchestrator::{RunStatistics, TableStatus};
use crate::transfer::progress::{format_duration, format_number};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_DETAIL_CHARS: usize = 1000;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Posts interactive cards to a Feishu bot webhook.
pub struct FeishuNotifier {
    config: NotificationConfig,
    http: reqwest::Client,
}

impl FeishuNotifier {
    pub fn new(config: NotificationConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| MigrateError::Notify(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// POST a card; succeeds iff the response carries `code == 0`.
    pub async fn send_card(&self, card: &Value) -> Result<()> {
        let response = self
            .http
            .post(&self.config.webhook_url)
            .json(card)
            .send()
            .await
            .map_err(|e| MigrateError::Notify(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| MigrateError::Notify(e.to_string()))?;

        if body.get("code").and_then(Value::as_i64) == Some(0) {
            Ok(())
        } else {
            let msg = body
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            Err(MigrateError::Notify(msg.to_string()))
        }
    }

    async fn deliver(&self, card: Value) {
        match self.send_card(&card).await {
            Ok(()) => info!("Notification sent"),
            Err(e) => error!("Failed to send notification: {}", e),
        }
    }

    pub(crate) fn start_card(
        &self,
        tables: &[TableJob],
        source_db: &str,
        target_db: &str,
        now: &str,
    ) -> Value {
        let table_list = tables
            .iter()
            .enumerate()
            .map(|(idx, t)| {
                format!(
                    "{}. **{}** -> **{}** (batch: {})",
                    idx + 1,
                    t.source_table,
                    t.target_table,
                    t.batch_size
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let elements = vec![
            md_div(format!(
                "**Environment**: {}\n\n**Time**: {}\n\n**Source DB**: {}\n\n**Target DB**: {}\n\n**Tables Count**: {}",
                self.config.env_name,
                now,
                source_db,
                target_db,
                tables.len()
            )),
            hr(),
            md_div(format!("**Table List**:\n\n{}", table_list)),
        ];

        self.card(
            format!("[START] {}", self.config.project_name),
            "blue",
            elements,
        )
    }

    pub(crate) fn success_card(&self, stats: &RunStatistics, now: &str) -> Value {
        let mut elements = vec![md_div(format!(
            "**Environment**: {}\n\n**Complete Time**: {}\n\n**Success Tables**: {}/{}\n\n**Total Rows**: {}\n\n**Total Time**: {}\n\n**Avg Speed**: {} rows/s",
            self.config.env_name,
            now,
            stats.success_tables,
            stats.total_tables,
            format_number(stats.total_rows),
            format_duration(stats.total_elapsed),
            format_number(stats.avg_speed as u64)
        ))];

        if !stats.tables.is_empty() {
            let details = stats
                .tables
                .iter()
                .map(|t| {
                    let icon = if t.status == TableStatus::Success {
                        "[OK]"
                    } else {
                        "[FAIL]"
                    };
                    format!(
                        "{} **{}**: {} rows, {}, {} rows/s",
                        icon,
                        t.source_table,
                        format_number(t.rows_transferred),
                        format_duration(t.elapsed_seconds),
                        format_number(t.rows_per_second as u64)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n");
            elements.push(hr());
            elements.push(md_div(format!("**Migration Details**:\n\n{}", details)));
        }

        self.card(
            format!("[SUCCESS] {}", self.config.project_name),
            "green",
            elements,
        )
    }

    pub(crate) fn failure_card(&self, failure: &FailureNotice, now: &str) -> Value {
        let mut elements = vec![
            md_div(format!(
                "**Environment**: {}\n\n**Failed Time**: {}\n\n**Failed Table**: {}\n\n**Progress**: {}/{} tables",
                self.config.env_name,
                now,
                failure.failed_table,
                failure.completed_tables,
                failure.total_tables
            )),
            hr(),
            md_div(format!(
                "**Error Message**:\n\n```\n{}\n```",
                failure.error_message
            )),
        ];

        if let Some(detail) = failure.detail.as_deref().filter(|d| !d.is_empty()) {
            elements.push(hr());
            elements.push(md_div(format!(
                "**Details**:\n\n```\n{}\n```",
                truncate_detail(detail)
            )));
        }

        self.card(
            format!("[FAILURE] {}", self.config.project_name),
            "red",
            elements,
        )
    }

    fn card(&self, title: String, template: &str, mut elements: Vec<Value>) -> Value {
        if let Some(mention) = self.mention_element() {
            elements.push(hr());
            elements.push(mention);
        }
        json!({
            "msg_type": "interactive",
            "card": {
                "config": { "wide_screen_mode": true },
                "header": {
                    "title": { "tag": "plain_text", "content": title },
                    "template": template
                },
                "elements": elements
            }
        })
    }

    fn mention_element(&self) -> Option<Value> {
        if self.config.mention_all {
            return Some(md_div("<at id=all></at>".to_string()));
        }
        if self.config.mention_users.is_empty() {
            return None;
        }
        let mentions = self
            .config
            .mention_users
            .iter()
            .map(|uid| format!("<at id={}></at>", uid))
            .collect::<Vec<_>>()
            .join(" ");
        Some(md_div(mentions))
    }
}

fn md_div(content: String) -> Value {
    json!({ "tag": "div", "text": { "tag": "lark_md", "content": content } })
}

fn hr() -> Value {
    json!({ "tag": "hr" })
}

fn truncate_detail(detail: &str) -> String {
    if detail.chars().count() <= MAX_DETAIL_CHARS {
        return detail.to_string();
    }
    let head: String = detail.chars().take(MAX_DETAIL_CHARS).collect();
    format!("{}\n... (truncated)", head)
}

fn now() -> String {
    chrono::Local::now().format(TIME_FORMAT).to_string()
}

#[async_trait]
impl Notifier for FeishuNotifier {
    async fn notify_start(&self, tables: &[TableJob], source_db: &str, target_db: &str) {
        if self.config.notify_on_start {
            self.deliver(self.start_card(tables, source_db, target_db, &now()))
                .await;
        }
    }

    async fn notify_success(&self, stats: &RunStatistics) {
        if self.config.notify_on_success {
            self.deliver(self.success_card(stats, &now())).await;
        }
    }

    async fn notify_failure(&self, failure: &FailureNotice) {
        if self.config.notify_on_failure {
            self.deliver(self.failure_card(failure, &now())).await;
        }
    }
}
