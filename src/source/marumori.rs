//! MaruMori sources (vocabulary and grammar decks).
//!
//! Both decks hit the same account, so [`SiteKind::min_call_delay`] spaces
//! their calls out when a user has one button for each.
//!
//! [`SiteKind::min_call_delay`]: super::SiteKind::min_call_delay

use serde::Deserialize;

use super::{credential, no_cache_headers, read_json, Count, FetchError};
use crate::settings::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Deck {
    Vocab,
    Grammar,
}

impl Deck {
    fn path(self) -> &'static str {
        match self {
            Deck::Vocab => "vocab",
            Deck::Grammar => "grammar",
        }
    }
}

#[derive(Debug, Deserialize)]
struct DueReviews {
    count: Count,
}

pub(super) async fn fetch(
    client: &reqwest::Client,
    base_url: &str,
    deck: Deck,
    credentials: &Credentials,
) -> Result<Count, FetchError> {
    let api_key = credential(credentials, "apiKey")?;

    let response = client
        .get(format!("{base_url}/v1/reviews/{}", deck.path()))
        .headers(no_cache_headers())
        .bearer_auth(api_key)
        .send()
        .await?;
    let due: DueReviews = read_json(response).await?;
    Ok(due.count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::InstanceSettings;
    use crate::source::{HttpSource, ReviewSource, SiteKind};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds() -> Credentials {
        InstanceSettings::new("marumori-vocab")
            .with_credential("apiKey", "mm")
            .credentials
    }

    #[tokio::test]
    async fn each_deck_hits_its_own_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/reviews/vocab"))
            .and(header("authorization", "Bearer mm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 30 })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/reviews/grammar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 5 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let vocab = HttpSource::with_base_url(SiteKind::MaruMoriVocab, client.clone(), &server.uri());
        let grammar = HttpSource::with_base_url(SiteKind::MaruMoriGrammar, client, &server.uri());

        assert_eq!(vocab.fetch_count(&creds()).await, Ok(30));
        assert_eq!(grammar.fetch_count(&creds()).await, Ok(5));
    }

    #[tokio::test]
    async fn server_error_is_unexpected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let src = HttpSource::with_base_url(
            SiteKind::MaruMoriGrammar,
            reqwest::Client::new(),
            &server.uri(),
        );
        let err = src.fetch_count(&creds()).await.unwrap_err();
        assert!(matches!(err, FetchError::Unexpected(_)), "{err:?}");
    }
}
