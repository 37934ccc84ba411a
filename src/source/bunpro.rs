//! Bunpro study-queue source.
//!
//! The API key is part of the path; the count is
//! `requested_information.reviews_available`.

use serde::Deserialize;

use super::{credential, no_cache_headers, read_json, Count, FetchError};
use crate::settings::Credentials;

#[derive(Debug, Deserialize)]
struct StudyQueue {
    requested_information: RequestedInformation,
}

#[derive(Debug, Deserialize)]
struct RequestedInformation {
    reviews_available: Count,
}

pub(super) async fn fetch(
    client: &reqwest::Client,
    base_url: &str,
    credentials: &Credentials,
) -> Result<Count, FetchError> {
    let api_key = credential(credentials, "apiKey")?;
    let url = format!("{base_url}/api/user/{api_key}/study_queue");

    let response = client.get(url).headers(no_cache_headers()).send().await?;
    let queue: StudyQueue = read_json(response).await?;
    Ok(queue.requested_information.reviews_available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{HttpSource, ReviewSource, SiteKind};
    use crate::settings::InstanceSettings;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> HttpSource {
        HttpSource::with_base_url(SiteKind::Bunpro, reqwest::Client::new(), &server.uri())
    }

    fn creds() -> Credentials {
        InstanceSettings::new("bunpro")
            .with_credential("apiKey", "k123")
            .credentials
    }

    #[tokio::test]
    async fn reads_reviews_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/k123/study_queue"))
            .and(header("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user_information": { "username": "someone" },
                "requested_information": { "reviews_available": 17, "next_review_date": 0 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(source(&server).fetch_count(&creds()).await, Ok(17));
    }

    #[tokio::test]
    async fn missing_field_is_unexpected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{ "message": "User does not exist." }]
            })))
            .mount(&server)
            .await;

        let err = source(&server).fetch_count(&creds()).await.unwrap_err();
        assert!(matches!(err, FetchError::Unexpected(_)), "{err:?}");
    }

    #[tokio::test]
    async fn rate_limit_status_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = source(&server).fetch_count(&creds()).await.unwrap_err();
        assert_eq!(err, FetchError::RateLimited);
    }
}
