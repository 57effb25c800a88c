//! Outbound alerts.
//!
//! Notification failures never propagate: every [`Notifier`] reports success as
//! a bool and logs what went wrong.

use async_trait::async_trait;
use autotrader_core::{
    ClosedPosition, ExitReason, NotificationConfig, Notifier, ProviderSignal, TenantId,
};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

/// Telegram bot API notifier with per-tenant bot credentials.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    config: NotificationConfig,
    http: Client,
}

impl TelegramNotifier {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: NotificationConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    /// Sets a custom API base URL (useful for testing).
    #[must_use]
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.config.telegram_api_base = url.into();
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, tenant_id: TenantId, message: &str) -> bool {
        let Some(chat) = self.config.telegram_chats.get(&tenant_id.to_string()) else {
            tracing::debug!(tenant_id, "No Telegram credentials, notification skipped");
            return false;
        };
        if chat.bot_token.is_empty() || chat.chat_id.is_empty() {
            return false;
        }

        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.telegram_api_base, chat.bot_token
        );
        let body = SendMessage {
            chat_id: &chat.chat_id,
            text: message,
            parse_mode: "Markdown",
        };

        match self.http.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    tenant_id,
                    status = response.status().as_u16(),
                    "Telegram rejected notification"
                );
                false
            }
            Err(e) => {
                tracing::warn!(tenant_id, error = %e, "Telegram notification failed");
                false
            }
        }
    }
}

/// Writes notifications to the log. Used when no channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, tenant_id: TenantId, message: &str) -> bool {
        tracing::info!(tenant_id, message, "Notification");
        true
    }
}

/// Alert for a signal that cleared the tenant's threshold.
#[must_use]
pub fn signal_detected_message(
    signal: &ProviderSignal,
    executed: bool,
    at: DateTime<Utc>,
) -> String {
    let s = &signal.signal;
    let status = if executed {
        "Trade executed automatically"
    } else {
        "Waiting for manual execution"
    };
    format!(
        "*AUTO SIGNAL DETECTED*\n\n\
         *Instrument:* `{}`\n\
         *Signal:* `{}`\n\
         *Probability:* `{}%`\n\
         *Method:* `{}`\n\n\
         *Entry:* `{}`\n\
         *Stop Loss:* `{}`\n\
         *Take Profit:* `{}`\n\
         *Lots:* `{}`\n\n\
         _{status}_\n\n{}",
        signal.symbol,
        s.direction,
        signal.probability,
        signal.method,
        s.entry,
        s.stop_loss,
        s.take_profit,
        s.lots,
        at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// Alert for a closed position, with the balance after settlement.
#[must_use]
pub fn position_closed_message(closed: &ClosedPosition, at: DateTime<Utc>) -> String {
    let p = &closed.position;
    let reason = p.exit_reason.map_or("CLOSED", ExitReason::as_str).replace('_', " ");
    let sign = if p.realized_pnl > rust_decimal::Decimal::ZERO {
        "+"
    } else {
        ""
    };
    let verdict = match p.is_direction_correct {
        Some(true) => "Direction correct",
        Some(false) => "Direction wrong",
        None => "Direction undecided",
    };
    format!(
        "*POSITION CLOSED - {reason}*\n\n\
         *Instrument:* `{}`\n\
         *Direction:* `{}`\n\
         *Entry:* `{}`\n\
         *Exit:* `{}`\n\
         *P&L:* `{sign}${}`\n\n\
         _{verdict}_\n\n\
         *New Balance:* `${}`\n\n{}",
        p.symbol,
        p.direction,
        p.entry_price,
        p.exit_price.unwrap_or_default(),
        p.realized_pnl,
        closed.new_balance.round_dp(2),
        at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}
