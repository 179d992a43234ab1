//! Mail reporter
//!
//! Sends one notification per failure, and optionally one on success, with
//! the build logs attached. When the configured SMTP host looks like a file
//! path inside an existing directory, the message is written to that file
//! instead, which is handy for testing a configuration.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::{Message, SmtpTransport, Transport};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use super::Reporter;
use crate::failure::Failure;

pub const DEFAULT_SUBJECT: &str = "Build %result% on %hostname% at %time%";

#[derive(Error, Debug)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("cannot build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Mail reporter settings, as found in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Sender; `user@hostname` when unset
    pub from: Option<String>,
    /// Recipients; the sender when empty
    pub to: Vec<String>,
    /// Subject template with `%result%`, `%hostname%` and `%time%` tokens
    pub subject: String,
    /// SMTP server, or the path of a file receiving the message
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Only send mail about failures
    pub only_errors: bool,
    /// Log files under this directory are attached
    pub log_dir: Option<PathBuf>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: None,
            to: Vec::new(),
            subject: DEFAULT_SUBJECT.to_string(),
            smtp_host: "localhost".to_string(),
            smtp_port: 25,
            only_errors: false,
            log_dir: None,
        }
    }
}

/// Replaces the subject tokens.
pub fn expand_subject(template: &str, result: &str, time: &str, hostname: &str) -> String {
    template
        .replace("%result%", result)
        .replace("%time%", time)
        .replace("%hostname%", hostname)
}

fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

fn default_address() -> String {
    let user = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "metabuild".to_string());
    format!("{}@{}", user, hostname())
}

pub struct MailReporter {
    config: MailConfig,
    post_success_message: Option<String>,
}

impl MailReporter {
    pub fn new(config: MailConfig) -> Self {
        Self {
            config,
            post_success_message: None,
        }
    }

    /// Body of the success notification.
    pub fn with_post_success_message(mut self, message: impl Into<String>) -> Self {
        self.post_success_message = Some(message.into());
        self
    }

    pub fn config(&self) -> &MailConfig {
        &self.config
    }

    fn sender(&self) -> String {
        self.config.from.clone().unwrap_or_else(default_address)
    }

    fn recipients(&self) -> Vec<String> {
        if self.config.to.is_empty() {
            vec![self.sender()]
        } else {
            self.config.to.clone()
        }
    }

    /// `.log` files under the log directory, with their name relative to it.
    fn log_files(&self) -> Vec<(String, PathBuf)> {
        let Some(log_dir) = &self.config.log_dir else {
            return Vec::new();
        };
        let mut logs: Vec<(String, PathBuf)> = WalkDir::new(log_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "log"))
            .map(|entry| {
                let name = entry
                    .path()
                    .strip_prefix(log_dir)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .into_owned();
                (name, entry.into_path())
            })
            .collect();
        logs.sort();
        logs
    }

    /// Builds the notification for `result` with `body` as text.
    pub fn build_message(&self, result: &str, body: &str) -> Result<Message, MailError> {
        let subject = expand_subject(
            &self.config.subject,
            result,
            &Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            &hostname(),
        );

        let mut builder = Message::builder()
            .from(self.sender().parse::<Mailbox>()?)
            .subject(subject)
            .date_now();
        for recipient in self.recipients() {
            builder = builder.to(recipient.parse::<Mailbox>()?);
        }

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(body.to_string()));
        for (name, path) in self.log_files() {
            let content = fs::read(&path)?;
            parts = parts.singlepart(Attachment::new(name).body(content, ContentType::TEXT_PLAIN));
        }
        Ok(builder.multipart(parts)?)
    }

    /// The file receiving messages, when the SMTP host names one.
    fn mailbox_file(&self) -> Option<&Path> {
        let host = &self.config.smtp_host;
        if !host.contains('/') {
            return None;
        }
        let path = Path::new(host);
        path.parent().filter(|dir| dir.is_dir()).map(|_| path)
    }

    /// Builds and delivers a notification.
    pub fn send_mail(&self, result: &str, body: &str) -> Result<(), MailError> {
        let message = self.build_message(result, body)?;
        let recipients = self.recipients();

        if let Some(path) = self.mailbox_file() {
            let mut content = format!("From: {}\nTo: {}\n", self.sender(), recipients.join(" ")).into_bytes();
            content.extend_from_slice(&message.formatted());
            fs::write(path, content)?;
            info!("saved notification email in {}", path.display());
            return Ok(());
        }

        let transport = SmtpTransport::builder_dangerous(self.config.smtp_host.as_str())
            .port(self.config.smtp_port)
            .build();
        transport.send(&message)?;
        info!(
            "sent notification mail to {} with source {}",
            recipients.join(", "),
            self.sender()
        );
        Ok(())
    }
}

impl Reporter for MailReporter {
    fn error(&self, failure: &Failure) {
        if !failure.mail() {
            return;
        }
        if let Err(e) = self.send_mail("failed", &failure.to_string()) {
            warn!("cannot send failure notification: {}", e);
        }
    }

    fn success(&self) {
        if self.config.only_errors {
            return;
        }
        let body = self.post_success_message.as_deref().unwrap_or("");
        if let Err(e) = self.send_mail("success", body) {
            warn!("cannot send success notification: {}", e);
        }
    }
}
