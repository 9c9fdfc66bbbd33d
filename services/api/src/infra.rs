use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use itou::error::AppError;
use itou::job_applications::{EmailMessage, Mailer, NotificationError};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Development mail sink: every message becomes a log line.
#[derive(Debug, Default, Clone)]
pub(crate) struct TracingMailer;

impl Mailer for TracingMailer {
    fn send(&self, messages: Vec<EmailMessage>) -> Result<(), NotificationError> {
        for message in messages {
            info!(
                to = %message.to.join(", "),
                bcc = %message.bcc.join(", "),
                subject = %message.subject,
                "email sent"
            );
        }
        Ok(())
    }
}

/// Output file when given, stdout otherwise.
pub(crate) fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, AppError> {
    Ok(match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Box::new(BufWriter::new(File::create(path)?))
        }
        None => Box::new(BufWriter::new(io::stdout())),
    })
}
