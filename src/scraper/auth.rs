//! Portal login. GET primes the server, POST sends the credentials, the session cookie is taken
//! from the `Set-Cookie` header of the answer.

use crate::model::{Credentials, Session};
use crate::scraper::client::{read_body, require_ok, PortalClient};
use crate::scraper::compile;
use crate::scraper::error::FetchError;
use reqwest::header::SET_COOKIE;
use tracing::{debug, info};

/// Login endpoint, relative to the portal root. Also the student's home page.
pub const LOGIN_PATH: &str = "/utente/eu";
/// The portal answers a rejected login with this text in the page body.
const FAILURE_MARKER: &str = "Erro no pedido";
const STUDENT_NUMBER_PATTERN: &str = r"(?:aluno=)(\d+)";

/// Log in and return the session cookie.
pub fn authenticate(client: &PortalClient, credentials: &Credentials) -> Result<Session, FetchError> {
    let url = client.url_for(LOGIN_PATH);
    info!(user = %credentials.identifier, "logging in");

    client.get(&url, None)?;

    let form = [
        ("identificador", credentials.identifier.as_str()),
        ("senha", credentials.secret.as_str()),
    ];
    let response = require_ok(client.post_form(&url, &form)?, &url, "login")?;

    let set_cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let body = read_body(response, &url)?;
    if body.contains(FAILURE_MARKER) {
        return Err(FetchError::InvalidCredentials);
    }

    let session = set_cookie
        .as_deref()
        .and_then(Session::from_set_cookie)
        .ok_or(FetchError::MissingSessionCookie)?;
    debug!(cookie = %session.name, "session established");
    Ok(session)
}

/// Look up the student's number (used in listing URLs) on the portal home page.
pub fn discover_student_number(
    client: &PortalClient,
    session: &Session,
) -> Result<u64, FetchError> {
    let url = client.url_for(LOGIN_PATH);
    let response = require_ok(client.get(&url, Some(session))?, &url, "home page")?;
    let body = read_body(response, &url)?;
    let number = parse_student_number(&body)?;
    info!(number, "found student number");
    Ok(number)
}

fn parse_student_number(html: &str) -> Result<u64, FetchError> {
    let pattern = compile(STUDENT_NUMBER_PATTERN)?;
    pattern
        .captures(html)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or(FetchError::StudentNumberNotFound)
}
