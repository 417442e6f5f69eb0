//! Trade notifications.
//!
//! The live cycle reports every transition through a [`Notifier`]. Delivery
//! failures are returned to the caller, which logs and drops them; a lost
//! message never affects trading state.

use std::time::Duration;

use thiserror::Error;
use tracing::info;
use trendpilot_core::account::{CloseResult, OpenResult};
use trendpilot_core::domain::Side;

pub const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("notification rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// What happened, in the terms a human reader needs.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeEvent {
    Opened {
        symbol: String,
        side: Side,
        price: f64,
        time: String,
    },
    Closed {
        symbol: String,
        side: Side,
        price: f64,
        time: String,
        profit: f64,
        profit_percent: f64,
        balance_before: f64,
        balance_after: f64,
    },
}

impl TradeEvent {
    pub fn opened(symbol: &str, opened: &OpenResult) -> Self {
        TradeEvent::Opened {
            symbol: symbol.to_string(),
            side: opened.side,
            price: opened.entry_price,
            time: opened.open_time.clone(),
        }
    }

    pub fn closed(symbol: &str, closed: &CloseResult) -> Self {
        TradeEvent::Closed {
            symbol: symbol.to_string(),
            side: closed.side,
            price: closed.close_price,
            time: closed.close_time.clone(),
            profit: closed.profit,
            profit_percent: closed.profit_percent,
            balance_before: closed.balance_before_trade,
            balance_after: closed.balance,
        }
    }

    /// "OPEN LONG", "CLOSE SHORT", ...
    pub fn title(&self) -> String {
        let (verb, side) = match self {
            TradeEvent::Opened { side, .. } => ("OPEN", side),
            TradeEvent::Closed { side, .. } => ("CLOSE", side),
        };
        format!("{verb} {side}")
    }

    /// Telegram HTML message body.
    pub fn to_html(&self) -> String {
        match self {
            TradeEvent::Opened {
                symbol,
                price,
                time,
                ..
            } => format!(
                "<b>{}</b>\nPrice: <b>{price} $</b>\nTime: {time}\nSymbol: {symbol}",
                self.title()
            ),
            TradeEvent::Closed {
                symbol,
                price,
                time,
                profit,
                profit_percent,
                balance_before,
                balance_after,
                ..
            } => format!(
                "<b>{}</b>\nPrice: <b>{price} $</b>\nTime: {time}\nSymbol: {symbol}\n\
                 Profit: <b>{profit:.2} $ ({profit_percent:.2}%)</b>\n\
                 Balance: {balance_before:.2} $ -> {balance_after:.2} $",
                self.title()
            ),
        }
    }
}

/// Delivery port for trade events.
pub trait Notifier {
    fn notify(&self, event: &TradeEvent) -> Result<(), NotifyError>;
}

impl<T: Notifier + ?Sized> Notifier for Box<T> {
    fn notify(&self, event: &TradeEvent) -> Result<(), NotifyError> {
        (**self).notify(event)
    }
}

/// Discards every event (backtests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: &TradeEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Writes events to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &TradeEvent) -> Result<(), NotifyError> {
        info!(event = %event.title(), "{}", event.to_html().replace('\n', " | "));
        Ok(())
    }
}

/// Telegram Bot API `sendMessage` client.
pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str, timeout: Duration) -> Result<Self, NotifyError> {
        Self::with_base_url(TELEGRAM_API, token, chat_id, timeout)
    }

    pub fn with_base_url(
        base_url: &str,
        token: &str,
        chat_id: &str,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}/bot{token}/sendMessage", base_url.trim_end_matches('/')),
            chat_id: chat_id.to_string(),
        })
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, event: &TradeEvent) -> Result<(), NotifyError> {
        let text = event.to_html();
        let params = [
            ("chat_id", self.chat_id.as_str()),
            ("text", text.as_str()),
            ("parse_mode", "HTML"),
        ];
        let response = self
            .client
            .post(&self.url)
            .form(&params)
            .send()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for TelegramNotifier {
    // The URL embeds the bot token.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_event() -> TradeEvent {
        TradeEvent::Closed {
            symbol: "BTCUSDT".into(),
            side: Side::Short,
            price: 41_000.5,
            time: "2024-02-02 03:00:00.000000".into(),
            profit: 9.5,
            profit_percent: 0.95,
            balance_before: 1000.0,
            balance_after: 1009.5,
        }
    }

    #[test]
    fn titles() {
        let open = TradeEvent::Opened {
            symbol: "BTCUSDT".into(),
            side: Side::Long,
            price: 100.0,
            time: "t".into(),
        };
        assert_eq!(open.title(), "OPEN LONG");
        assert_eq!(closed_event().title(), "CLOSE SHORT");
    }

    #[test]
    fn close_message_carries_profit_and_balances() {
        let html = closed_event().to_html();
        assert!(html.starts_with("<b>CLOSE SHORT</b>"));
        assert!(html.contains("Price: <b>41000.5 $</b>"));
        assert!(html.contains("Profit: <b>9.50 $ (0.95%)</b>"));
        assert!(html.contains("1000.00 $ -> 1009.50 $"));
        assert!(html.contains("Symbol: BTCUSDT"));
    }

    #[test]
    fn debug_hides_token() {
        let n = TelegramNotifier::new("123:secret", "42", Duration::from_secs(1)).unwrap();
        let shown = format!("{n:?}");
        assert!(!shown.contains("secret"));
        assert!(shown.contains("42"));
    }

    #[test]
    fn unreachable_endpoint_is_a_transport_error() {
        let n = TelegramNotifier::with_base_url(
            "http://127.0.0.1:9",
            "t",
            "1",
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(matches!(
            n.notify(&closed_event()),
            Err(NotifyError::Transport(_))
        ));
    }

    #[test]
    fn log_notifier_never_fails() {
        assert!(LogNotifier.notify(&closed_event()).is_ok());
    }
}
