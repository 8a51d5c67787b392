use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use sentinel_core::{
    config::{EmailConfig, SmtpSecurity},
    error::DeliveryError,
};

use crate::Notifier;

/// Sends each report as a plain-text mail to every configured recipient.
pub struct Email {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    server: String,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl Email {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("Invalid sender address '{}'", config.from))?;
        let to = config
            .to
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>().with_context(|| format!("Invalid recipient '{addr}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        if to.is_empty() {
            anyhow::bail!("At least one recipient is required");
        }

        let server = config.smtp_server.as_str();
        let builder = match config.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(server)
                .with_context(|| format!("Failed to set up TLS for {server}"))?,
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
                .with_context(|| format!("Failed to set up STARTTLS for {server}"))?,
            SmtpSecurity::Plain => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(server),
        };
        let username = config.username.clone().unwrap_or_else(|| from.email.to_string());
        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(username, config.password.clone()))
            .build();
        Ok(Self { transport, server: format!("{server}:{}", config.smtp_port), from, to })
    }

    pub fn message(&self, subject: &str, body: &str) -> Result<Message, DeliveryError> {
        let mut builder = Message::builder().from(self.from.clone());
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| DeliveryError::Malformed(Box::new(e)))
    }
}

#[async_trait]
impl Notifier for Email {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let message = self.message(subject, body)?;
        if let Err(e) = self.transport.send(message).await {
            return Err(match e.status() {
                Some(code) if e.is_permanent() => DeliveryError::Rejected {
                    status: code.to_string().parse().unwrap_or(550),
                    body: e.to_string(),
                },
                _ => DeliveryError::Unreachable(Box::new(e)),
            });
        }
        tracing::info!("Mailed '{}' to {} recipient(s) via {}", subject, self.to.len(), self.server);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 465,
            security: SmtpSecurity::Tls,
            username: None,
            password: "app-password".to_string(),
            from: "Sentinel <sentinel@example.com>".to_string(),
            to: vec!["reports@example.com".to_string(), "team@example.com".to_string()],
        }
    }

    #[test]
    fn test_message_headers_and_body() {
        let email = Email::new(&config()).unwrap();
        let message = email.message("octo/proj-a", "Summary: 2 commits").unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("From: "), "{formatted}");
        assert!(formatted.contains("sentinel@example.com"), "{formatted}");
        assert!(formatted.contains("reports@example.com"), "{formatted}");
        assert!(formatted.contains("team@example.com"), "{formatted}");
        assert!(formatted.contains("Subject: octo/proj-a"), "{formatted}");
        assert!(formatted.contains("Content-Type: text/plain"), "{formatted}");
        assert!(formatted.contains("\r\n\r\nSummary: 2 commits"), "{formatted}");
    }

    #[test]
    fn test_reject_bad_addresses() {
        let cases: &[(&str, &[&str])] = &[
            ("not an address", &["reports@example.com"]),
            ("sentinel@example.com", &["reports@example.com", "nobody"]),
            ("sentinel@example.com", &[]),
        ];
        for &(from, to) in cases {
            let config = EmailConfig {
                from: from.to_string(),
                to: to.iter().map(|s| s.to_string()).collect(),
                ..config()
            };
            assert!(Email::new(&config).is_err(), "{from:?} -> {to:?}");
        }
    }

    #[test]
    fn test_every_security_mode_builds() {
        for security in [SmtpSecurity::Tls, SmtpSecurity::StartTls, SmtpSecurity::Plain] {
            let config = EmailConfig { security, smtp_port: 2525, ..config() };
            let email = Email::new(&config).unwrap();
            assert_eq!(email.server, "smtp.example.com:2525");
        }
    }

    #[tokio::test]
    async fn test_closed_relay_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = EmailConfig {
            smtp_server: "127.0.0.1".to_string(),
            smtp_port: port,
            security: SmtpSecurity::Plain,
            ..config()
        };
        let err = Email::new(&config).unwrap().notify("subject", "body").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Unreachable(_)), "{err:?}");
    }
}
