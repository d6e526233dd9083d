use crate::configuration::SmtpSettings;
use crate::render::OutboundMessage;
use crate::transport::{SendError, Transport};
use async_trait::async_trait;
use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use std::time::Duration;

/// One authenticated STARTTLS session against the configured relay.
pub struct SmtpSession {
    host: String,
    port: u16,
    credentials: Credentials,
    timeout: Duration,
    sender: Mailbox,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpSession {
    pub fn new(settings: &SmtpSettings) -> Result<Self, anyhow::Error> {
        let sender = Mailbox::new(
            Some(settings.username.clone()),
            settings.sender_email.parse::<Address>()?,
        );
        Ok(Self {
            host: settings.host.clone(),
            port: settings.port,
            credentials: Credentials::new(
                settings.username.clone(),
                settings.password.expose_secret().clone(),
            ),
            timeout: Duration::from_secs(settings.timeout_seconds),
            sender,
            transport: None,
        })
    }

    fn message_from(&self, message: &OutboundMessage) -> Result<Message, SendError> {
        let to = Mailbox::new(
            None,
            message
                .to
                .as_ref()
                .parse::<Address>()
                .map_err(|e| SendError::Other(e.to_string()))?,
        );

        let alternative = MultiPart::alternative_plain_html(
            message.text_body.clone(),
            message.html_body.clone(),
        );
        let body = if message.inline_images.is_empty() {
            alternative
        } else {
            let mut related = MultiPart::related().multipart(alternative);
            for image in &message.inline_images {
                let content_type = ContentType::parse("image/png")
                    .map_err(|e| SendError::Other(e.to_string()))?;
                related = related.singlepart(
                    Attachment::new_inline(image.content_id.clone())
                        .body(image.content.clone(), content_type),
                );
            }
            related
        };

        Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(message.subject.clone())
            .date_now()
            .header(ListUnsubscribe(message.list_unsubscribe.clone()))
            .multipart(body)
            .map_err(|e| SendError::Other(e.to_string()))
    }
}

#[async_trait]
impl Transport for SmtpSession {
    #[tracing::instrument(name = "Connecting to SMTP relay", skip(self), fields(host = %self.host))]
    async fn connect(&mut self) -> Result<(), SendError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            .map_err(classify)?
            .port(self.port)
            .credentials(self.credentials.clone())
            .timeout(Some(self.timeout))
            .build();
        // NOOP round-trip: forces the handshake and surfaces bad credentials
        // before the first recipient is attempted.
        match transport.test_connection().await {
            Ok(true) => {
                self.transport = Some(transport);
                Ok(())
            }
            Ok(false) => Err(SendError::TransientDisconnect(
                "relay did not acknowledge the connection probe".into(),
            )),
            Err(e) => Err(classify(e)),
        }
    }

    async fn send_one(&mut self, message: &OutboundMessage) -> Result<(), SendError> {
        let transport = self.transport.as_ref().ok_or_else(|| {
            SendError::TransientDisconnect("no open connection to the relay".into())
        })?;
        let email = self.message_from(message)?;
        transport.send(email).await.map_err(classify)?;
        Ok(())
    }

    async fn disconnect(&mut self) {
        // Dropping the transport closes its pooled connections.
        if self.transport.take().is_some() {
            tracing::info!("SMTP connection closed");
        }
    }
}

/// Maps a relay reply onto the send loop's failure taxonomy.
///
/// 530/534/535 are authentication replies; 421 is the relay closing the
/// channel; the remaining 4xx replies are what Gmail and friends use for
/// quota and rate refusals; 5xx replies carrying a 5.7.x policy detail mean
/// the sending account itself was refused.
fn classify(error: lettre::transport::smtp::Error) -> SendError {
    let description = error.to_string();
    let code = error
        .status()
        .and_then(|code| code.to_string().parse::<u16>().ok());
    match code {
        Some(530) | Some(534) | Some(535) => SendError::AuthFailure(description),
        Some(421) => SendError::TransientDisconnect(description),
        Some(code) if (400..500).contains(&code) => SendError::QuotaExceeded(description),
        Some(_) if description.contains("5.7.") => SendError::SenderRejected(description),
        Some(_) => SendError::Other(description),
        // No reply code at all: the connection itself failed.
        None => SendError::TransientDisconnect(description),
    }
}

#[derive(Clone)]
struct ListUnsubscribe(String);

impl Header for ListUnsubscribe {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("List-Unsubscribe")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}
