//! Terminal reporter

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Local;
use console::{Style, Term};
use log::warn;

use super::Reporter;
use crate::failure::Failure;
use crate::output::OutputConfig;

/// Prints one line per failure, and a final line on success.
pub struct ConsoleReporter {
    output: OutputConfig,
    post_success_message: Option<String>,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReporter {
    /// A reporter writing to stderr.
    pub fn new(output: OutputConfig) -> Self {
        Self::with_writer(output, Box::new(Term::stderr()))
    }

    pub fn with_writer(output: OutputConfig, sink: Box<dyn Write + Send>) -> Self {
        Self {
            output,
            post_success_message: None,
            sink: Mutex::new(sink),
        }
    }

    /// Text printed after the success line.
    pub fn with_post_success_message(mut self, message: impl Into<String>) -> Self {
        self.post_success_message = Some(message.into());
        self
    }

    fn write_line(&self, line: &str) {
        let result = match self.sink.lock() {
            Ok(mut sink) => writeln!(sink, "{}", line).and_then(|_| sink.flush()),
            Err(_) => Err(io::Error::other("console reporter lock poisoned")),
        };
        if let Err(e) = result {
            warn!("cannot write report: {}", e);
        }
    }
}

impl Reporter for ConsoleReporter {
    fn error(&self, failure: &Failure) {
        let label = self.output.paint(&Style::new().red().bold(), "Build failed:");
        self.write_line(&format!("{} {}", label, failure));
    }

    fn success(&self) {
        let label = self
            .output
            .paint(&Style::new().green().bold(), "Build finished successfully");
        self.write_line(&format!(
            "{} at {}",
            label,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        if let Some(message) = &self.post_success_message {
            self.write_line(message);
        }
    }
}
