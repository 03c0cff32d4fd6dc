//! SMS delivery seam.
//!
//! The service only needs "send this text to this phone"; providers hide
//! behind the trait so handlers and tests never touch delivery details.

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
#[error("sms delivery failed: {0}")]
pub struct SmsError(pub String);

pub trait SmsSender: Send + Sync {
    fn send(&self, phone: &str, message: &str) -> Result<(), SmsError>;
}

/// Stub sender that logs instead of delivering. Stands in for a provider
/// integration in development.
#[derive(Debug, Default)]
pub struct LogSender;

impl SmsSender for LogSender {
    fn send(&self, phone: &str, message: &str) -> Result<(), SmsError> {
        info!(phone = %phone, "SMS (stub): {message}");
        Ok(())
    }
}

/// The text sent alongside a verification code
pub fn render_code_message(code: &str) -> String {
    format!("{code} is your verification code. Do not share it with anyone.")
}
