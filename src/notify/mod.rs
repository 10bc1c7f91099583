use anyhow::{Context, Result};
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Config;

/// Completion notice for the engineer who owns the core port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionNotice {
    pub subject: String,
    pub body: String,
}

impl CompletionNotice {
    pub fn new(router_hostname: &str, router_port: &str, telco_hostname: &str) -> Self {
        Self {
            subject: format!(
                "{} {} successfully configured for {}",
                router_hostname, router_port, telco_hostname
            ),
            body: format!(
                "Please update the interface description for {} {}.",
                router_hostname, router_port
            ),
        }
    }
}

/// Plain-text mail over SMTP
pub struct Mailer {
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl Mailer {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let from: Mailbox = cfg
            .mail_from
            .parse()
            .with_context(|| format!("Invalid from email address '{}'", cfg.mail_from))?;

        let to = cfg
            .mail_to
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .with_context(|| format!("Invalid to email address '{}'", addr))
            })
            .collect::<Result<Vec<_>>>()?;
        if to.is_empty() {
            anyhow::bail!("MAIL_TO has no recipients");
        }

        // The relay is an internal MTA, usually localhost:25 without TLS
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.smtp_host)
            .port(cfg.smtp_port);
        if !cfg.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.smtp_username.clone(),
                cfg.smtp_password.clone(),
            ));
        }

        Ok(Self {
            from,
            to,
            transport: builder.build(),
        })
    }

    pub async fn send(&self, notice: &CompletionNotice) -> Result<()> {
        let mut message = Message::builder()
            .from(self.from.clone())
            .subject(notice.subject.as_str())
            .date_now()
            .header(ContentType::TEXT_PLAIN);
        for to in &self.to {
            message = message.to(to.clone());
        }
        let email = message
            .body(notice.body.clone())
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email via SMTP")?;

        tracing::info!(
            recipients = self.to.len(),
            subject = %notice.subject,
            "Email sent successfully"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_notice() {
        let notice = CompletionNotice::new("core1", "Gi0/0/0/7.254", "ACME-HQ-T280");
        assert_eq!(notice.subject, "core1 Gi0/0/0/7.254 successfully configured for ACME-HQ-T280");
        assert_eq!(notice.body, "Please update the interface description for core1 Gi0/0/0/7.254.");
    }

    #[test]
    fn test_mailer_needs_recipients() {
        let mut cfg = Config::load();
        cfg.mail_from = "provisioning@example.net".to_string();
        cfg.mail_to = Vec::new();
        assert!(Mailer::from_config(&cfg).is_err());

        cfg.mail_to = vec!["noc@example.net".to_string(), "not an address".to_string()];
        let err = Mailer::from_config(&cfg).err().unwrap();
        assert!(err.to_string().contains("not an address"));

        cfg.mail_to = vec!["noc@example.net".to_string()];
        assert!(Mailer::from_config(&cfg).is_ok());
    }
}
