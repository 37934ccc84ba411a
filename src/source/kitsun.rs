//! Kitsun source: log in with email and password, then read the home counts.
//!
//! Kitsun keeps the session in a cookie, so every fetch builds its own
//! cookie-carrying client.  Nothing is shared between fetches; a stale session
//! can never leak into the next call.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use super::{credential, no_cache_headers, read_json, Count, FetchError};
use crate::settings::Credentials;

/// Applies to the login and the data call separately.
const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct Home {
    counts: HomeCounts,
}

#[derive(Debug, Deserialize)]
struct HomeCounts {
    reviews: Count,
}

pub(super) async fn fetch(base_url: &str, credentials: &Credentials) -> Result<Count, FetchError> {
    let email = credential(credentials, "username")?;
    let password = credential(credentials, "password")?;

    let client = reqwest::Client::builder()
        .cookie_store(true)
        .timeout(SESSION_TIMEOUT)
        .build()?;

    let login = client
        .post(format!("{base_url}/profile/login"))
        .headers(no_cache_headers())
        .header(reqwest::header::ACCEPT, "application/json, text/plain, */*")
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await?;
    let login: LoginResponse = read_json(login).await?;
    if !login.success {
        return Err(FetchError::AuthInvalid("login rejected".into()));
    }

    let home = client
        .get(format!("{base_url}/general/home"))
        .headers(no_cache_headers())
        .header(reqwest::header::ACCEPT, "application/json, text/plain, */*")
        .send()
        .await?;
    let home: Home = read_json(home).await?;
    Ok(home.counts.reviews)
}
