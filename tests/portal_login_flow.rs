#[path = "../src/portal.rs"]
mod portal;
#[path = "support/fake_portal.rs"]
mod fake_portal;

use fake_portal::{dashboard, Account, FakePortal};
use portal::{Credentials, LoginError, PortalClient};
use std::collections::HashMap;
use std::time::Duration;

fn portal_with(prn: &str, password: &str, page: String) -> FakePortal {
    let mut accounts = HashMap::new();
    accounts.insert(
        prn.to_string(),
        Account {
            password: password.to_string(),
            dashboard: page,
        },
    );
    FakePortal::start(accounts)
}

fn client(url: &str) -> PortalClient {
    PortalClient::new(url, "marksyncd-test", Duration::from_secs(5)).expect("client")
}

#[test]
fn login_follows_redirect_with_merged_cookies() {
    let page = dashboard(r#"[["ISE-1", 11]]"#, r#"["25PCC13CE11"]"#);
    let fake = portal_with("PRN01", "2004-03-05", page.clone());

    let html = client(&fake.login_url)
        .fetch_dashboard(&Credentials::new("PRN01", 5, 3, 2004))
        .expect("dashboard");
    assert_eq!(html, page);

    let posts = fake.posts.lock().expect("posts");
    assert_eq!(posts.len(), 1);
    let body = &posts[0];
    let get = |name: &str| -> Vec<&str> {
        body.iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    };
    assert_eq!(get("username"), vec!["PRN01"]);
    assert_eq!(get("dd"), vec!["05 "]);
    assert_eq!(get("mm"), vec!["03"]);
    assert_eq!(get("yyyy"), vec!["2004"]);
    assert_eq!(get("passwd"), vec!["2004-03-05"]);
    assert_eq!(get("option"), vec!["com_user"]);
    assert_eq!(get("return"), vec!["ZGFzaGJvYXJk"]);
}

#[test]
fn wrong_birth_date_lands_back_on_login_form() {
    let page = dashboard(r#"[["ISE-1", 11]]"#, r#"["25PCC13CE11"]"#);
    let fake = portal_with("PRN01", "2004-03-05", page);

    let html = client(&fake.login_url)
        .fetch_dashboard(&Credentials::new("PRN01", 6, 3, 2004))
        .expect("portal answers with a page");
    assert!(portal::page_has_login_form(&html));
}

#[test]
fn unreachable_portal_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}/login", listener.local_addr().expect("addr"));
    drop(listener);

    let e = client(&url)
        .fetch_dashboard(&Credentials::new("PRN01", 5, 3, 2004))
        .expect_err("nothing listening");
    assert!(matches!(e, LoginError::Network(_)), "{e:?}");
    assert_eq!(e.kind(), "NetworkError");
}

#[test]
fn missing_login_page_is_network_error() {
    let fake = portal_with("PRN01", "2004-03-05", String::new());
    let url = fake.login_url.replace("/login", "/gone");

    let e = client(&url)
        .fetch_dashboard(&Credentials::new("PRN01", 5, 3, 2004))
        .expect_err("404");
    assert_eq!(e.kind(), "NetworkError");
}

fn login_error_at(route: &str) -> LoginError {
    let fake = portal_with("PRN01", "2004-03-05", String::new());
    let url = fake.login_url.replace("/login", route);
    client(&url)
        .fetch_dashboard(&Credentials::new("PRN01", 5, 3, 2004))
        .expect_err("login must fail")
}

#[test]
fn redirect_without_location_is_redirect_missing() {
    let e = login_error_at("/redirect-login");
    assert!(matches!(e, LoginError::RedirectMissing), "{e:?}");
    assert_eq!(e.kind(), "RedirectMissing");
}

#[test]
fn forbidden_login_post_is_rejected() {
    let e = login_error_at("/forbidden-login");
    assert!(matches!(&e, LoginError::Rejected(msg) if msg.contains("403")), "{e:?}");
    assert_eq!(e.kind(), "LoginRejected");
}

#[test]
fn page_without_login_form_is_form_not_found() {
    let e = login_error_at("/no-form");
    assert!(matches!(e, LoginError::FormNotFound), "{e:?}");
    assert_eq!(e.kind(), "FormNotFound");
}
