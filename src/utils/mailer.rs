use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::env;

#[derive(Debug)]
pub enum MailError {
    Config(String),
    Message(lettre::error::Error),
    Transport(lettre::transport::smtp::Error),
}

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailError::Config(e) => write!(f, "mail config error: {e}"),
            MailError::Message(e) => write!(f, "invalid mail message: {e}"),
            MailError::Transport(e) => write!(f, "smtp transport error: {e}"),
        }
    }
}

impl std::error::Error for MailError {}

/// Sends the password-reset link over SMTP. Relay settings come from the
/// EMAIL_SERVER_* environment variables; the caller treats failures as
/// non-fatal so the reset endpoint never leaks whether the address exists.
pub async fn send_password_reset_email(to: &str, reset_url: &str) -> Result<(), MailError> {
    let host = env::var("EMAIL_SERVER_HOST")
        .map_err(|_| MailError::Config("EMAIL_SERVER_HOST not set".to_string()))?;
    let from = env::var("EMAIL_FROM").unwrap_or_else(|_| "noreply@cashflow-tuesday.local".to_string());

    let body = format!(
        "You requested a password reset. Click the link to reset your password: {reset_url}\n\n\
         If you did not request a password reset, please ignore this email.\n"
    );

    let message = Message::builder()
        .from(from.parse().map_err(|_| MailError::Config("bad EMAIL_FROM address".to_string()))?)
        .to(to.parse().map_err(|_| MailError::Config("bad destination address".to_string()))?)
        .subject("Password Reset Request")
        .header(ContentType::TEXT_PLAIN)
        .body(body)
        .map_err(MailError::Message)?;

    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
        .map_err(MailError::Transport)?;

    if let Ok(port) = env::var("EMAIL_SERVER_PORT") {
        if let Ok(port) = port.parse::<u16>() {
            builder = builder.port(port);
        }
    }

    if let (Ok(user), Ok(pass)) = (
        env::var("EMAIL_SERVER_USER"),
        env::var("EMAIL_SERVER_PASSWORD"),
    ) {
        builder = builder.credentials(Credentials::new(user, pass));
    }

    let transport = builder.build();
    transport.send(message).await.map_err(MailError::Transport)?;

    Ok(())
}
