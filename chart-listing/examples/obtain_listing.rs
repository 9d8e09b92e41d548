#[tokio::main]
async fn main() {
    let http_client = reqwest::Client::new();
    let base_url: url::Url = std::env::var("API_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_owned())
        .parse()
        .unwrap();

    let records = chart_listing::obtain_listing(
        &http_client,
        &base_url,
        &chart_listing::ListingParameters {
            limit: 10,
            offset: 0,
        },
    )
    .await
    .unwrap();

    dbg!(records);
}
