//! WaniKani v2 summary source.

use serde::Deserialize;

use super::{credential, no_cache_headers, read_json, Count, FetchError};
use crate::settings::Credentials;

/// API revision the summary shape below was written against.
const API_REVISION: &str = "20170710";

#[derive(Debug, Deserialize)]
struct Summary {
    data: SummaryData,
}

#[derive(Debug, Deserialize)]
struct SummaryData {
    reviews: Vec<ReviewBucket>,
}

#[derive(Debug, Deserialize)]
struct ReviewBucket {
    subject_ids: Vec<u64>,
}

/// The first bucket holds everything available right now.
fn available_now(summary: &Summary) -> Count {
    summary
        .data
        .reviews
        .first()
        .map(|bucket| bucket.subject_ids.len() as Count)
        .unwrap_or(0)
}

pub(super) async fn fetch(
    client: &reqwest::Client,
    base_url: &str,
    credentials: &Credentials,
) -> Result<Count, FetchError> {
    let api_key = credential(credentials, "apiKey")?;

    let response = client
        .get(format!("{base_url}/v2/summary"))
        .headers(no_cache_headers())
        .header("Wanikani-Revision", API_REVISION)
        .bearer_auth(api_key)
        .send()
        .await?;
    let summary: Summary = read_json(response).await?;
    Ok(available_now(&summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::InstanceSettings;
    use crate::source::{HttpSource, ReviewSource, SiteKind};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> HttpSource {
        HttpSource::with_base_url(SiteKind::WaniKani, reqwest::Client::new(), &server.uri())
    }

    fn creds() -> Credentials {
        InstanceSettings::new("wanikani")
            .with_credential("apiKey", "tok")
            .credentials
    }

    #[test]
    fn empty_review_list_counts_zero() {
        let summary: Summary = serde_json::from_value(json!({ "data": { "reviews": [] } })).unwrap();
        assert_eq!(available_now(&summary), 0);
    }

    #[tokio::test]
    async fn counts_subjects_in_first_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/summary"))
            .and(header("authorization", "Bearer tok"))
            .and(header("wanikani-revision", "20170710"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "report",
                "data": {
                    "lessons": [],
                    "reviews": [
                        { "available_at": "2024-03-01T10:00:00.000000Z", "subject_ids": [1, 2, 3] },
                        { "available_at": "2024-03-01T11:00:00.000000Z", "subject_ids": [4] }
                    ]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(source(&server).fetch_count(&creds()).await, Ok(3));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = source(&server).fetch_count(&creds()).await.unwrap_err();
        assert!(matches!(err, FetchError::AuthInvalid(_)), "{err:?}");
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let src = HttpSource::with_base_url(
            SiteKind::WaniKani,
            reqwest::Client::new(),
            "http://127.0.0.1:1",
        );
        let err = src.fetch_count(&creds()).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)), "{err:?}");
    }
}
