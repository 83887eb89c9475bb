//! Minimal SMTP-over-TLS email transport.
//!
//! Speaks just enough SMTP to deliver an alert: implicit TLS (port 465),
//! EHLO, AUTH LOGIN, one MAIL FROM / RCPT TO / DATA exchange, QUIT. Every
//! protocol line is built by a pure function so the wire format is testable
//! without a server.
//!
//! This is deliberately not a general mail client — no STARTTLS, no
//! pipelining, no multiple recipients. Alert delivery needs none of it.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;

use crate::error::{AlertError, Result};
use crate::transport::EmailTransport;

/// Default implicit-TLS SMTP port.
pub const DEFAULT_SMTP_PORT: u16 = 465;

/// Connection and per-read timeout.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// SMTP command builders (pure functions, testable)
// ---------------------------------------------------------------------------

/// Build an SMTP EHLO command.
pub fn ehlo_command(domain: &str) -> String {
    format!("EHLO {domain}\r\n")
}

/// Build an SMTP AUTH LOGIN command.
pub fn auth_login_command() -> String {
    "AUTH LOGIN\r\n".to_string()
}

/// Encode one AUTH LOGIN credential line (base64 + CRLF).
pub fn auth_credential_line(value: &str) -> String {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(value);
    format!("{encoded}\r\n")
}

/// Build an SMTP MAIL FROM command.
pub fn mail_from_command(from: &str) -> String {
    format!("MAIL FROM:<{from}>\r\n")
}

/// Build an SMTP RCPT TO command.
pub fn rcpt_to_command(to: &str) -> String {
    format!("RCPT TO:<{to}>\r\n")
}

/// Build an SMTP DATA command.
pub fn data_command() -> String {
    "DATA\r\n".to_string()
}

/// Build the full message payload for SMTP DATA, including the terminating
/// dot line.
pub fn message_payload(from: &str, to: &str, subject: &str, body: &str) -> String {
    format!(
        "From: {from}\r\n\
         To: {to}\r\n\
         Subject: {subject}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/plain; charset=UTF-8\r\n\
         \r\n\
         {body}\r\n\
         .\r\n"
    )
}

/// Build an SMTP QUIT command.
pub fn quit_command() -> String {
    "QUIT\r\n".to_string()
}

/// Parse the reply code off an SMTP response line ("250 OK" → 250).
pub fn parse_reply_code(line: &str) -> Option<u16> {
    line.get(..3)?.parse().ok()
}

/// Whether this line ends a (possibly multiline) SMTP reply. Continuation
/// lines use `250-...`, the final line `250 ...`.
pub fn is_final_reply_line(line: &str) -> bool {
    line.len() <= 4 || line.as_bytes().get(3) != Some(&b'-')
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// SMTP email transport over implicit TLS.
pub struct SmtpMailer {
    host: String,
    port: u16,
    username: String,
    password: String,
    from: String,
}

impl SmtpMailer {
    /// Create a mailer for `host:port`, authenticating as `username` and
    /// sending from the `from` address.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            from: from.into(),
        }
    }

    fn transport_err(&self, reason: impl Into<String>) -> AlertError {
        AlertError::Transport {
            channel: "email".into(),
            reason: reason.into(),
        }
    }

    fn tls_config() -> Arc<rustls::ClientConfig> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        )
    }

    /// Open the TLS session and run the full delivery exchange.
    fn deliver(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| self.transport_err(format!("connect {}:{}: {e}", self.host, self.port)))?;
        tcp.set_read_timeout(Some(IO_TIMEOUT))?;
        tcp.set_write_timeout(Some(IO_TIMEOUT))?;

        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| self.transport_err(format!("invalid SMTP hostname: {e}")))?;
        let conn = rustls::ClientConnection::new(Self::tls_config(), server_name)
            .map_err(|e| self.transport_err(format!("TLS setup failed: {e}")))?;
        let mut session = BufReader::new(rustls::StreamOwned::new(conn, tcp));

        // Greeting, then the scripted exchange.
        self.expect(&mut session, 220)?;

        self.command(&mut session, &ehlo_command("palisade.local"), 250)?;

        self.command(&mut session, &auth_login_command(), 334)?;
        self.command(&mut session, &auth_credential_line(&self.username), 334)?;
        self.command(&mut session, &auth_credential_line(&self.password), 235)?;

        self.command(&mut session, &mail_from_command(&self.from), 250)?;
        self.command(&mut session, &rcpt_to_command(to), 250)?;
        self.command(&mut session, &data_command(), 354)?;
        self.command(
            &mut session,
            &message_payload(&self.from, to, subject, body),
            250,
        )?;

        // QUIT is a courtesy; the message is already accepted.
        let _ = session.get_mut().write_all(quit_command().as_bytes());

        Ok(())
    }

    /// Write one command and require the given reply code.
    fn command(
        &self,
        session: &mut BufReader<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>,
        line: &str,
        expected: u16,
    ) -> Result<()> {
        session
            .get_mut()
            .write_all(line.as_bytes())
            .map_err(|e| self.transport_err(format!("SMTP write failed: {e}")))?;
        self.expect(session, expected)
    }

    /// Read one (possibly multiline) reply and require the given code.
    fn expect(
        &self,
        session: &mut BufReader<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>,
        expected: u16,
    ) -> Result<()> {
        loop {
            let mut line = String::new();
            let n = session
                .read_line(&mut line)
                .map_err(|e| self.transport_err(format!("SMTP read failed: {e}")))?;
            if n == 0 {
                return Err(self.transport_err("SMTP server closed the connection"));
            }

            let code = parse_reply_code(&line)
                .ok_or_else(|| self.transport_err(format!("unparseable SMTP reply: {line:?}")))?;

            if !is_final_reply_line(line.trim_end()) {
                continue;
            }
            if code != expected {
                return Err(self.transport_err(format!(
                    "expected SMTP {expected}, got: {}",
                    line.trim_end()
                )));
            }
            return Ok(());
        }
    }
}

impl EmailTransport for SmtpMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        tracing::debug!(host = %self.host, to = to, subject = subject, "sending alert email");
        self.deliver(to, subject, body)?;
        tracing::info!(to = to, "alert email delivered");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
