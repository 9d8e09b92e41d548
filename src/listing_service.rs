//! External chart listing service.
//! See [Port].

use async_trait::async_trait;
use chart_listing::{ChartRecord, Error, ListingParameters};

/// Trait used to allow mocking the [chart_listing] service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Port: Send + Sync {
    /// Obtain one page of the listing using [chart_listing::obtain_listing()].
    async fn fetch(&self, limit: u32, offset: u64) -> Result<Vec<ChartRecord>, Error>;
}

/// Concrete implementation of [Port].
pub struct Gateway {
    http_client: reqwest::Client,
    base_url: url::Url,
}

impl Gateway {
    /// Construct a new [Gateway] fetching from `base_url`.
    #[must_use]
    pub fn new(http_client: reqwest::Client, base_url: url::Url) -> Self {
        Self {
            http_client,
            base_url,
        }
    }
}

#[async_trait]
impl Port for Gateway {
    async fn fetch(&self, limit: u32, offset: u64) -> Result<Vec<ChartRecord>, Error> {
        chart_listing::obtain_listing(
            &self.http_client,
            &self.base_url,
            &ListingParameters { limit, offset },
        )
        .await
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::{Gateway, Port};

    #[tokio::test]
    async fn gateway_fetches_requested_page() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::query_param("limit", "50"))
            .and(matchers::query_param("offset", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"datetime": "2024-01-01T00:00:00Z", "type": "ASAS", "url": "/a.pdf"},
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let gateway = Gateway::new(reqwest::Client::new(), mock_server.uri().parse().unwrap());
        let records = gateway.fetch(50, 100).await.unwrap();
        assert_eq!(1, records.len());
    }
}
