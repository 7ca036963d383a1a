use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Captured mail, shared with whoever built the mailer.
pub type Outbox = Arc<Mutex<Vec<OutgoingMail>>>;

/// Outbound email for password resets.
pub enum Mailer {
    /// Writes the message to the log. Used when no relay is configured.
    Log,
    /// POSTs the message as JSON to an HTTP mail relay.
    Http {
        client: reqwest::Client,
        relay_url: String,
        from: String,
    },
    /// Keeps messages in memory for inspection.
    Memory(Outbox),
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl Mailer {
    pub fn http(relay_url: String, from: String) -> Self {
        Mailer::Http {
            client: reqwest::Client::new(),
            relay_url,
            from,
        }
    }

    pub fn memory() -> (Self, Outbox) {
        let outbox = Outbox::default();
        (Mailer::Memory(outbox.clone()), outbox)
    }

    pub async fn send(&self, mail: OutgoingMail) -> Result<()> {
        match self {
            Mailer::Log => {
                info!("Mail to {}: {}\n{}", mail.to, mail.subject, mail.text);
                Ok(())
            }
            Mailer::Http { client, relay_url, from } => {
                client
                    .post(relay_url)
                    .json(&RelayPayload {
                        from,
                        to: &mail.to,
                        subject: &mail.subject,
                        text: &mail.text,
                    })
                    .send()
                    .await
                    .context("mail relay unreachable")?
                    .error_for_status()
                    .context("mail relay rejected message")?;
                info!("Mail to {} handed to relay", mail.to);
                Ok(())
            }
            Mailer::Memory(outbox) => {
                outbox
                    .lock()
                    .map_err(|e| anyhow::anyhow!("outbox lock poisoned: {}", e))?
                    .push(mail);
                Ok(())
            }
        }
    }
}

pub fn password_reset_mail(to: &str, public_url: &str, token: &str, ttl_minutes: i64) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Reset your Wellspring password".to_string(),
        text: format!(
            "We received a request to reset your password.\n\n\
             Use this link within {ttl_minutes} minutes:\n{}/reset-password?token={token}\n\n\
             If you did not ask for this, you can ignore this email.",
            public_url.trim_end_matches('/'),
        ),
    }
}
