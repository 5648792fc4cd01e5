//! Best-effort change notifications.
//!
//! One message per change, sent in change order. A failed send is logged and
//! counted, never retried, and never stops the remaining sends. Nothing here
//! remembers what was sent before.

use crate::diff::{Change, ChangeKind};
use crate::value::display_optional;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const MAIL_SUBJECT: &str = "Marks updated";

/// prn → contact address.
pub type ContactMap = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub trait MailTransport {
    fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub timeout: Duration,
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> anyhow::Result<Self> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid sender address {}: {}", settings.from, e))?;
        let transport = SmtpTransport::starttls_relay(&settings.host)?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(settings.timeout))
            .build();
        Ok(SmtpMailer { transport, from })
    }
}

impl MailTransport for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid recipient {}: {}", mail.to, e))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                mail.text.clone(),
                mail.html.clone(),
            ))?;
        self.transport.send(&message)?;
        Ok(())
    }
}

pub fn load_contacts(path: &Path) -> anyhow::Result<ContactMap> {
    let text = std::fs::read_to_string(path)?;
    let raw: HashMap<String, serde_json::Value> = serde_json::from_str(&text)?;
    // Blank or non-string entries mean "no address on file".
    Ok(raw
        .into_iter()
        .filter_map(|(prn, v)| {
            let email = v.as_str()?.trim().to_string();
            (!email.is_empty()).then_some((prn, email))
        })
        .collect())
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn compose(change: &Change, to: &str, dashboard_url: &str) -> OutgoingMail {
    let old = display_optional(change.old_value.as_ref());
    let new = display_optional(change.new_value.as_ref());

    let marks_text = match change.kind {
        ChangeKind::New => format!("Marks: {}", new),
        ChangeKind::Updated => format!("Old Marks: {}\nNew Marks: {}", old, new),
    };
    let text = format!(
        "Hey, You have a new score you have to check out.\n\nPRN: {}\nSubject: {}\nExam Type: {}\n{}\n",
        change.prn, change.subject, change.exam_type, marks_text
    );

    let marks_html = match change.kind {
        ChangeKind::New => format!(
            "<p class=\"marks\">Marks: <strong>{}</strong></p>",
            escape_html(&new)
        ),
        ChangeKind::Updated => format!(
            "<p class=\"marks\">Previous: <strong>{}</strong><br>Current: <strong>{}</strong></p>",
            escape_html(&old),
            escape_html(&new)
        ),
    };
    let html = format!(
        "<div>\
         <h1>Your marks have been updated</h1>\
         <table>\
         <tr><td>PRN</td><td>{}</td></tr>\
         <tr><td>Subject</td><td>{}</td></tr>\
         <tr><td>Exam Type</td><td>{}</td></tr>\
         </table>\
         {}\
         <p><a href=\"{}\">View Full Dashboard</a></p>\
         </div>",
        escape_html(&change.prn),
        escape_html(&change.subject),
        escape_html(&change.exam_type),
        marks_html,
        escape_html(dashboard_url)
    );

    OutgoingMail {
        to: to.to_string(),
        subject: MAIL_SUBJECT.to_string(),
        text,
        html,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Failed(String),
    NoContact,
    DryRun,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub changes: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped_no_contact: usize,
    pub skipped_dry_run: usize,
}

impl DispatchSummary {
    fn record(&mut self, outcome: &DispatchOutcome) {
        self.changes += 1;
        match outcome {
            DispatchOutcome::Sent => self.sent += 1,
            DispatchOutcome::Failed(_) => self.failed += 1,
            DispatchOutcome::NoContact => self.skipped_no_contact += 1,
            DispatchOutcome::DryRun => self.skipped_dry_run += 1,
        }
    }
}

/// Sends change notifications. Without a transport every change with a
/// contact is reported as a dry run.
pub struct Dispatcher<'a> {
    transport: Option<&'a dyn MailTransport>,
    dashboard_url: String,
}

impl<'a> Dispatcher<'a> {
    pub fn new(transport: Option<&'a dyn MailTransport>, dashboard_url: impl Into<String>) -> Self {
        Dispatcher {
            transport,
            dashboard_url: dashboard_url.into(),
        }
    }

    pub fn dispatch(&self, change: &Change, contact: Option<&str>) -> DispatchOutcome {
        let Some(to) = contact else {
            log::info!(
                "event=notify_skipped reason=no_contact prn={} subject={} exam_type={}",
                change.prn,
                change.subject,
                change.exam_type
            );
            return DispatchOutcome::NoContact;
        };
        let Some(transport) = self.transport else {
            return DispatchOutcome::DryRun;
        };
        let mail = compose(change, to, &self.dashboard_url);
        match transport.send(&mail) {
            Ok(()) => {
                log::info!("event=notify_sent prn={} to={}", change.prn, to);
                DispatchOutcome::Sent
            }
            Err(e) => {
                log::error!(
                    "event=notify_failed prn={} to={} error={:#}",
                    change.prn,
                    to,
                    e
                );
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    pub fn dispatch_all(&self, changes: &[Change], contacts: &ContactMap) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for change in changes {
            let contact = contacts.get(&change.prn).map(|s| s.as_str());
            let outcome = self.dispatch(change, contact);
            summary.record(&outcome);
        }
        summary
    }
}
