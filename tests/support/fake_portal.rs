//! A tiny HTTP/1.1 server that behaves like the parent portal: a login page
//! with a session cookie and hidden fields, a form POST answered with a 303,
//! and a dashboard that only renders for a logged-in session. A few extra
//! routes misbehave on purpose: a page with no login form, a login that
//! answers 302 without `Location`, and one that answers 403.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

pub const SESSION_COOKIE: &str = "PHPSESSID=fake-session";

pub struct Account {
    pub password: String,
    pub dashboard: String,
}

pub struct FakePortal {
    pub login_url: String,
    /// Every login POST body, decoded, in arrival order.
    pub posts: Arc<Mutex<Vec<Vec<(String, String)>>>>,
}

pub fn login_page() -> String {
    login_page_with_action("/login-post")
}

pub fn login_page_with_action(action: &str) -> String {
    format!(
        r#"<html><body>
        <form id="login-form" action="{}" method="post">
            <input type="text" name="username">
            <input type="hidden" name="option" value="com_user">
            <input type="hidden" name="passwd" value="">
            <input type="hidden" name="return" value="ZGFzaGJvYXJk">
        </form>
    </body></html>"#,
        action
    )
}

pub fn dashboard(columns: &str, categories: &str) -> String {
    format!(
        r#"<html><body><h1>Dashboard</h1>
        <div id="stackedBarChart_1"></div>
        <script>
          var chart = c3.generate({{
            bindto: '#stackedBarChart_1',
            data: {{ columns: {}, type: "bar" }},
            axis: {{ x: {{ type: 'category', categories: {} }} }}
          }});
        </script></body></html>"#,
        columns, categories
    )
}

impl FakePortal {
    pub fn start(accounts: HashMap<String, Account>) -> FakePortal {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake portal");
        let addr = listener.local_addr().expect("local addr");
        let posts = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&posts);
        let accounts = Arc::new(accounts);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let _ = serve(stream, &accounts, &recorded);
            }
        });
        FakePortal {
            login_url: format!("http://{}/login", addr),
            posts,
        }
    }
}

struct RawRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
}

fn read_request(stream: &TcpStream) -> std::io::Result<RawRequest> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("/").to_string();

    let mut headers = HashMap::new();
    loop {
        let mut h = String::new();
        reader.read_line(&mut h)?;
        let h = h.trim_end();
        if h.is_empty() {
            break;
        }
        if let Some((k, v)) = h.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }
    let len: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(RawRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(b) => {
                        out.push(b);
                        i += 2;
                    }
                    Err(_) => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

pub fn parse_form(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(k), percent_decode(v))
        })
        .collect()
}

fn cookies(req: &RawRequest) -> HashMap<String, String> {
    req.headers
        .get("cookie")
        .map(|raw| {
            raw.split(';')
                .filter_map(|c| c.trim().split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn respond(
    mut stream: &TcpStream,
    status: &str,
    extra_headers: &[(&str, String)],
    body: &str,
) -> std::io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        body.len()
    );
    for (k, v) in extra_headers {
        head.push_str(&format!("{}: {}\r\n", k, v));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes())?;
    stream.write_all(body.as_bytes())?;
    stream.flush()
}

fn serve(
    stream: TcpStream,
    accounts: &HashMap<String, Account>,
    posts: &Mutex<Vec<Vec<(String, String)>>>,
) -> std::io::Result<()> {
    let req = read_request(&stream)?;
    let route = req.path.split('?').next().unwrap_or("").to_string();
    let jar = cookies(&req);
    let has_session = jar.get("PHPSESSID").map(String::as_str) == Some("fake-session");

    match (req.method.as_str(), route.as_str()) {
        ("GET", "/login") => respond(
            &stream,
            "200 OK",
            &[("Set-Cookie", format!("{}; path=/; HttpOnly", SESSION_COOKIE))],
            &login_page(),
        ),
        ("POST", "/login-post") => {
            let form = parse_form(&req.body);
            if let Ok(mut all) = posts.lock() {
                all.push(form.clone());
            }
            let field = |name: &str| {
                form.iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            };
            let user = field("username");
            let accepted = has_session
                && accounts
                    .get(&user)
                    .map(|a| a.password == field("passwd"))
                    .unwrap_or(false);
            if accepted {
                respond(
                    &stream,
                    "303 See Other",
                    &[
                        ("Location", "/dashboard".to_string()),
                        ("Set-Cookie", format!("auth={}; path=/", user)),
                    ],
                    "",
                )
            } else {
                // The portal shows the form again instead of an error status.
                respond(&stream, "200 OK", &[], &login_page())
            }
        }
        ("GET", "/dashboard") => {
            let page = jar
                .get("auth")
                .filter(|_| has_session)
                .and_then(|user| accounts.get(user))
                .map(|a| a.dashboard.clone())
                .unwrap_or_else(login_page);
            respond(&stream, "200 OK", &[], &page)
        }
        ("GET", "/no-form") => respond(
            &stream,
            "200 OK",
            &[("Set-Cookie", format!("{}; path=/; HttpOnly", SESSION_COOKIE))],
            "<html><body><p>Portal under maintenance</p></body></html>",
        ),
        ("GET", "/redirect-login") => {
            respond(&stream, "200 OK", &[], &login_page_with_action("/post-302"))
        }
        ("POST", "/post-302") => respond(&stream, "302 Found", &[], ""),
        ("GET", "/forbidden-login") => {
            respond(&stream, "200 OK", &[], &login_page_with_action("/post-403"))
        }
        ("POST", "/post-403") => respond(&stream, "403 Forbidden", &[], "forbidden"),
        _ => respond(&stream, "404 Not Found", &[], "not found"),
    }
}
