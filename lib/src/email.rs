//! Outgoing mail: smtp transport construction and per-recipient digest
//! messages.

use lettre::{
    address::AddressError,
    message::{MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::Smtp;
use crate::render::Rendered;
use crate::{Config, Error, ErrorKind, Result};

pub type Mailer = AsyncSmtpTransport<Tokio1Executor>;

/// Opens the relay transport. Built once per dispatch and shared across
/// the whole fan-out.
pub fn transport(config: &Smtp) -> Result<Mailer> {
    let creds = Credentials::new(config.user.clone(), config.password.clone());

    let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
        .map_err(|e| Error::new(ErrorKind::Other(e.to_string())))?
        .port(config.port)
        .credentials(creds)
        .build();

    Ok(mailer)
}

/// Builds one recipient's digest message, plain and html alternative.
pub fn build_message(config: &Config, to: &str, rendered: &Rendered) -> Result<Message> {
    let sender = if config.smtp.sender.is_empty() {
        format!("{} <noreply@{}>", config.name, config.domain)
    } else {
        format!("{} <{}>", config.name, config.smtp.sender)
    };

    let message = Message::builder()
        .from(
            sender
                .parse()
                .map_err(|e: AddressError| Error::new(ErrorKind::EmailParseError(e.to_string())))?,
        )
        .reply_to(
            format!("noreply <noreply@{}>", config.domain)
                .parse()
                .map_err(|e: AddressError| Error::new(ErrorKind::EmailParseError(e.to_string())))?,
        )
        .to(to
            .parse()
            .map_err(|e: AddressError| Error::new(ErrorKind::EmailParseError(e.to_string())))?)
        .subject(rendered.subject.clone())
        .multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::plain(rendered.text.clone()))
                .singlepart(SinglePart::html(rendered.html.clone())),
        )?;

    Ok(message)
}

pub async fn send(mailer: &Mailer, message: Message) -> Result<()> {
    let response = mailer.send(message).await?;
    if response.is_positive() {
        Ok(())
    } else {
        Err(ErrorKind::EmailBadResponse(response.code().to_string()).into())
    }
}
