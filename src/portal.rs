//! Logs a student into the parent portal and returns the dashboard HTML.
//!
//! The portal has no API. A login is three requests: GET the login page for
//! its cookies and hidden form fields, POST the form without following the
//! redirect, then GET the redirect target with the merged cookies. Cookies are
//! carried in an explicit [`Session`] that each step takes and hands back.

use once_cell::sync::Lazy;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, COOKIE, LOCATION, SET_COOKIE, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Url;
use scraper::{Html, Selector};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LOGIN_URL: &str = "https://crce-students.contineo.in/parents/index.php?option=com_studentdashboard&controller=studentdashboard&task=dashboard";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const PASSWORD_FIELD: &str = "passwd";

static LOGIN_FORM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("form#login-form").expect("static selector"));
static HIDDEN_INPUT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input[type=\"hidden\"]").expect("static selector"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    #[error("network error: {0}")]
    Network(String),
    #[error("login form not found on login page")]
    FormNotFound,
    #[error("login rejected: {0}")]
    Rejected(String),
    #[error("login redirect has no Location header")]
    RedirectMissing,
}

impl LoginError {
    pub fn kind(&self) -> &'static str {
        match self {
            LoginError::Network(_) => "NetworkError",
            LoginError::FormNotFound => "FormNotFound",
            LoginError::Rejected(_) => "LoginRejected",
            LoginError::RedirectMissing => "RedirectMissing",
        }
    }
}

impl From<reqwest::Error> for LoginError {
    fn from(e: reqwest::Error) -> Self {
        LoginError::Network(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateOfBirth {
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

/// What the portal wants from a parent: the PRN and the student's birth date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub prn: String,
    pub dob: DateOfBirth,
}

impl Credentials {
    pub fn new(prn: impl Into<String>, day: u32, month: u32, year: i32) -> Self {
        Credentials {
            prn: prn.into(),
            dob: DateOfBirth { day, month, year },
        }
    }

    /// `YYYY-MM-DD`, the value the portal's own script submits as `passwd`.
    pub fn password(&self) -> String {
        format!(
            "{}-{:02}-{:02}",
            self.dob.year, self.dob.month, self.dob.day
        )
    }

    /// The portal's day dropdown values carry a trailing space.
    fn day_field(&self) -> String {
        format!("{:02} ", self.dob.day)
    }

    fn month_field(&self) -> String {
        format!("{:02}", self.dob.month)
    }
}

/// Cookies accumulated over one login sequence, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    cookies: Vec<(String, String)>,
}

impl Session {
    /// Merges every `Set-Cookie` in `headers`; a cookie seen again takes the new value.
    pub fn absorb(mut self, headers: &HeaderMap) -> Session {
        for raw in headers.get_all(SET_COOKIE) {
            let Ok(raw) = raw.to_str() else {
                continue;
            };
            self.set_from_header(raw);
        }
        self
    }

    fn set_from_header(&mut self, raw: &str) {
        let pair = raw.split(';').next().unwrap_or("");
        let Some((name, value)) = pair.split_once('=') else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let value = value.trim().to_string();
        match self.cookies.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = value,
            None => self.cookies.push((name.to_string(), value)),
        }
    }

    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub action: Option<String>,
    pub hidden: Vec<(String, String)>,
}

pub fn find_login_form(html: &str) -> Option<LoginForm> {
    let doc = Html::parse_document(html);
    let form = doc.select(&LOGIN_FORM).next()?;
    let action = form
        .value()
        .attr("action")
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());
    let hidden = form
        .select(&HIDDEN_INPUT)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or("");
            Some((name.to_string(), value.to_string()))
        })
        .collect();
    Some(LoginForm { action, hidden })
}

/// Whether a page still shows the login form, i.e. the login did not stick.
pub fn page_has_login_form(html: &str) -> bool {
    let doc = Html::parse_document(html);
    doc.select(&LOGIN_FORM).next().is_some()
}

/// Visible fields first, then the form's hidden fields in document order.
/// The password goes out exactly once, with the derived value.
pub fn build_login_body(creds: &Credentials, hidden: &[(String, String)]) -> Vec<(String, String)> {
    let mut body = vec![
        ("username".to_string(), creds.prn.clone()),
        ("dd".to_string(), creds.day_field()),
        ("mm".to_string(), creds.month_field()),
        ("yyyy".to_string(), creds.dob.year.to_string()),
        (PASSWORD_FIELD.to_string(), creds.password()),
    ];
    body.extend(
        hidden
            .iter()
            .filter(|(name, _)| name != PASSWORD_FIELD)
            .cloned(),
    );
    body
}

pub struct PortalClient {
    client: Client,
    login_url: Url,
    user_agent: String,
}

impl PortalClient {
    pub fn new(login_url: &str, user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let login_url = Url::parse(login_url)
            .map_err(|e| anyhow::anyhow!("invalid portal login url {}: {}", login_url, e))?;
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(PortalClient {
            client,
            login_url,
            user_agent: user_agent.to_string(),
        })
    }

    pub fn login_url(&self) -> &Url {
        &self.login_url
    }

    /// Runs the full login sequence and returns the authenticated page body.
    pub fn fetch_dashboard(&self, creds: &Credentials) -> Result<String, LoginError> {
        let (session, login_page) = self.get(self.login_url.clone(), Session::default())?;
        if !login_page.status().is_success() {
            return Err(LoginError::Network(format!(
                "login page returned {}",
                login_page.status()
            )));
        }
        let login_html = login_page.text()?;
        let form = find_login_form(&login_html).ok_or(LoginError::FormNotFound)?;

        let action = match form.action.as_deref() {
            Some(a) => self.login_url.join(a).unwrap_or_else(|e| {
                log::warn!("event=login_action_unparsable action={} error={}", a, e);
                self.login_url.clone()
            }),
            None => self.login_url.clone(),
        };
        let body = build_login_body(creds, &form.hidden);
        log::debug!(
            "event=login_post prn={} fields={} cookies={}",
            creds.prn,
            body.len(),
            session.cookies.len()
        );
        let (session, posted) = self.post_form(action, session, &body)?;

        let status = posted.status();
        if status.is_redirection() {
            let Some(location) = posted
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
            else {
                return Err(LoginError::RedirectMissing);
            };
            let target = self
                .login_url
                .join(&location)
                .map_err(|_| LoginError::RedirectMissing)?;
            let (_session, page) = self.get(target, session)?;
            return Ok(page.text()?);
        }
        if status.is_success() {
            return Ok(posted.text()?);
        }
        Err(LoginError::Rejected(format!("login POST returned {}", status)))
    }

    fn get(&self, url: Url, session: Session) -> Result<(Session, Response), LoginError> {
        let mut req = self.client.get(url).header(USER_AGENT, &self.user_agent);
        if let Some(cookie) = session.cookie_header() {
            req = req.header(COOKIE, cookie);
        }
        let resp = req.send()?;
        let session = session.absorb(resp.headers());
        Ok((session, resp))
    }

    fn post_form(
        &self,
        url: Url,
        session: Session,
        body: &[(String, String)],
    ) -> Result<(Session, Response), LoginError> {
        let mut req = self
            .client
            .post(url)
            .header(USER_AGENT, &self.user_agent)
            .form(body);
        if let Some(cookie) = session.cookie_header() {
            req = req.header(COOKIE, cookie);
        }
        let resp = req.send()?;
        let session = session.absorb(resp.headers());
        Ok((session, resp))
    }
}
