//! Client for the weather chart listing endpoint.
//!
//! The endpoint answers `GET <base-url>/?limit=<limit>&offset=<offset>` with a JSON array of
//! [`ChartRecord`]s, newest first, one per rendered chart file.

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

/// One chart file known to the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRecord {
    /// When the chart was last updated, as sent by the server (usually RFC 3339).
    pub datetime: String,
    /// Chart type code, e.g. `ASAS`.
    #[serde(rename = "type")]
    pub chart_type: String,
    /// Location of the rendered chart file.
    pub url: String,
}

/// Query parameters for [`obtain_listing()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListingParameters {
    /// Maximum number of records to return.
    pub limit: u32,
    /// Number of records to skip.
    pub offset: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error while performing request")]
    Reqwest(#[from] reqwest::Error),
    #[error("Response status unsuccessful, code: {code}, body: {body}")]
    ResponseStatusNotSuccessful { code: StatusCode, body: String },
    #[error("Error while parsing json, expected an array of chart records")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Error while serializing url query parameters")]
    SerdeUrlencoded(#[from] serde_urlencoded::ser::Error),
}

/// Build the request url for a page of the listing.
pub fn listing_url(base_url: &url::Url, parameters: &ListingParameters) -> Result<String, Error> {
    let query = serde_urlencoded::to_string(parameters)?;
    Ok(format!(
        "{}/?{}",
        base_url.as_str().trim_end_matches('/'),
        query
    ))
}

/// Obtain the raw json body for a page of the listing.
pub async fn obtain_listing_json(
    client: &reqwest::Client,
    base_url: &url::Url,
    parameters: &ListingParameters,
) -> Result<String, Error> {
    let url = listing_url(base_url, parameters)?;
    tracing::trace!("GET {}", url);

    let response = client.request(Method::GET, url).send().await?;

    if response.status().is_success() {
        response.text().await.map_err(Error::from)
    } else {
        Err(Error::ResponseStatusNotSuccessful {
            code: response.status(),
            body: response.text().await.unwrap_or_default(),
        })
    }
}

/// Obtain a page of the listing.
pub async fn obtain_listing(
    client: &reqwest::Client,
    base_url: &url::Url,
    parameters: &ListingParameters,
) -> Result<Vec<ChartRecord>, Error> {
    obtain_listing_json(client, base_url, parameters)
        .await
        .and_then(|json| Ok(serde_json::from_str(&json)?))
}
