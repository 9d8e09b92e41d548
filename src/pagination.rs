//! View state for the chart table: current page, loading flag and loaded rows.
//! See [`PaginationController`].

use std::{fmt::Display, sync::Arc};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    catalog::ChartTypeCatalog,
    listing_service,
    rows::{project, DisplayRow},
};

/// Page size and zero-based page index requested by the table's pagination control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageParams {
    page_size: u32,
    page: u32,
}

/// Error created while constructing [`PageParams`].
#[derive(Debug, thiserror::Error)]
pub enum PageParamsError {
    /// Page size must be greater than zero.
    ZeroPageSize,
}

impl Display for PageParamsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageParamsError::ZeroPageSize => f.write_str("Page size must be greater than zero"),
        }
    }
}

impl PageParams {
    /// Construct a new [`PageParams`].
    pub fn new(page_size: u32, page: u32) -> Result<Self, PageParamsError> {
        if page_size == 0 {
            return Err(PageParamsError::ZeroPageSize);
        }
        Ok(Self { page_size, page })
    }

    /// Number of rows per page, the `limit` of the listing request.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Zero-based page index.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Number of rows before this page, the `offset` of the listing request.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page_size) * u64::from(self.page)
    }
}

/// How a fetch issued by [`PaginationController`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The requested params were already current, no fetch was issued.
    Unchanged,
    /// The fetch succeeded and its rows replaced the row set.
    Applied,
    /// The fetch failed, the row set was left untouched and a notice was queued.
    Failed,
    /// A newer fetch was issued before this one completed, its result was discarded.
    Superseded,
}

/// Snapshot of the controller state used for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct View {
    /// Params of the most recently requested page.
    pub params: PageParams,
    /// Rows of the most recently loaded page.
    pub rows: Vec<DisplayRow>,
    /// Whether a fetch is outstanding.
    pub loading: bool,
}

struct State {
    params: PageParams,
    rows: Vec<DisplayRow>,
    loading: bool,
    /// Sequence number of the most recently issued fetch, `0` before the first fetch.
    issued: u64,
    /// Whether the most recently issued fetch failed.
    failed: bool,
    notices: Vec<String>,
}

impl State {
    /// Enter the loading state for a new fetch of `params`, returning its sequence number.
    fn issue(&mut self, params: PageParams) -> u64 {
        self.params = params;
        self.issued += 1;
        self.loading = true;
        self.failed = false;
        self.issued
    }
}

/// Owns the table's pagination state and refetches the listing whenever it changes.
///
/// Every fetch is tagged with a sequence number. Only the completion of the most recently
/// issued fetch may replace the row set or clear the loading flag, so a slow response for an
/// older page can never overwrite the page most recently asked for.
///
/// Fetches run on their own task, so a fetch completes and clears the loading flag even when
/// the caller awaiting it is dropped.
pub struct PaginationController {
    listing: Arc<dyn listing_service::Port>,
    catalog: &'static ChartTypeCatalog,
    state: Arc<Mutex<State>>,
}

impl PaginationController {
    /// Construct a new idle [`PaginationController`] with no rows loaded.
    pub fn new(
        listing: Arc<dyn listing_service::Port>,
        catalog: &'static ChartTypeCatalog,
        params: PageParams,
    ) -> Self {
        Self {
            listing,
            catalog,
            state: Arc::new(Mutex::new(State {
                params,
                rows: Vec::new(),
                loading: false,
                issued: 0,
                failed: false,
                notices: Vec::new(),
            })),
        }
    }

    /// Perform the initial fetch for the params the controller was constructed with.
    pub async fn start(&self) -> Outcome {
        self.refresh().await
    }

    /// Request a new page. Issues a fetch unless `params` are already current and their last
    /// fetch did not fail.
    #[tracing::instrument(skip(self))]
    pub async fn set_params(&self, params: PageParams) -> Outcome {
        let sequence = {
            let mut state = self.state.lock().await;
            if state.issued > 0 && state.params == params && !state.failed {
                return Outcome::Unchanged;
            }
            state.issue(params)
        };
        self.fetch(sequence, params).await
    }

    /// Fetch the current page again.
    pub async fn refresh(&self) -> Outcome {
        let (sequence, params) = {
            let mut state = self.state.lock().await;
            let params = state.params;
            (state.issue(params), params)
        };
        self.fetch(sequence, params).await
    }

    /// Snapshot of the current state.
    pub async fn snapshot(&self) -> View {
        let state = self.state.lock().await;
        View {
            params: state.params,
            rows: state.rows.clone(),
            loading: state.loading,
        }
    }

    /// Drain the queued user notices. Each notice is returned exactly once.
    pub async fn take_notices(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().await.notices)
    }

    async fn fetch(&self, sequence: u64, params: PageParams) -> Outcome {
        let handle = tokio::spawn(fetch_and_apply(
            self.listing.clone(),
            self.catalog,
            self.state.clone(),
            sequence,
            params,
        ));
        match handle.await {
            Ok(outcome) => outcome,
            Err(error) => {
                let report = eyre::Report::new(error)
                    .wrap_err(format!("Listing fetch #{} did not complete", sequence));
                tracing::error!("{:?}", report);
                let mut state = self.state.lock().await;
                if state.issued != sequence {
                    return Outcome::Superseded;
                }
                state.loading = false;
                state.failed = true;
                state.notices.push(format!("{:#}", report));
                Outcome::Failed
            }
        }
    }
}

async fn fetch_and_apply(
    listing: Arc<dyn listing_service::Port>,
    catalog: &'static ChartTypeCatalog,
    state: Arc<Mutex<State>>,
    sequence: u64,
    params: PageParams,
) -> Outcome {
    let offset = params.offset();
    tracing::debug!(
        "Fetching listing #{} limit={} offset={}",
        sequence,
        params.page_size(),
        offset
    );
    let result = listing.fetch(params.page_size(), offset).await;

    let mut state = state.lock().await;
    if state.issued != sequence {
        tracing::debug!(
            "Discarding listing #{}, superseded by #{}",
            sequence,
            state.issued
        );
        return Outcome::Superseded;
    }
    state.loading = false;

    match result {
        Ok(records) => {
            tracing::info!(
                "Loaded {} chart records at offset {}",
                records.len(),
                offset
            );
            state.rows = project(&records, offset, catalog);
            Outcome::Applied
        }
        Err(error) => {
            let report = eyre::Report::new(error).wrap_err(format!(
                "Error fetching chart listing (limit={}, offset={})",
                params.page_size(),
                offset
            ));
            tracing::error!("{:?}", report);
            state.failed = true;
            state.notices.push(format!("{:#}", report));
            Outcome::Failed
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex as StdMutex},
    };

    use async_trait::async_trait;
    use chart_listing::{ChartRecord, Error};
    use reqwest::StatusCode;
    use tokio::sync::oneshot;

    use super::{Outcome, PageParams, PaginationController};
    use crate::{catalog::ChartTypeCatalog, listing_service};

    fn record(chart_type: &str, url: &str) -> ChartRecord {
        ChartRecord {
            datetime: "2024-01-01T00:00:00Z".to_owned(),
            chart_type: chart_type.to_owned(),
            url: url.to_owned(),
        }
    }

    fn params(page_size: u32, page: u32) -> PageParams {
        PageParams::new(page_size, page).unwrap()
    }

    fn status_error() -> Error {
        Error::ResponseStatusNotSuccessful {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_owned(),
        }
    }

    fn controller(
        listing: impl listing_service::Port + 'static,
        params: PageParams,
    ) -> PaginationController {
        PaginationController::new(Arc::new(listing), ChartTypeCatalog::jma(), params)
    }

    #[test]
    fn page_params_offset() {
        assert_eq!(0, params(100, 0).offset());
        assert_eq!(100, params(50, 2).offset());
        assert_eq!(u64::from(u32::MAX) * 1000, params(1000, u32::MAX).offset());
        assert!(PageParams::new(0, 1).is_err());
    }

    #[tokio::test]
    async fn start_fetches_first_page() {
        let mut listing = listing_service::MockPort::new();
        listing
            .expect_fetch()
            .withf(|limit, offset| *limit == 100 && *offset == 0)
            .times(1)
            .returning(|_, _| Ok(vec![record("ASAS", "/a.pdf")]));

        let controller = controller(listing, params(100, 0));
        assert!(!controller.snapshot().await.loading);
        assert_eq!(Outcome::Applied, controller.start().await);

        let view = controller.snapshot().await;
        assert!(!view.loading);
        assert_eq!(1, view.rows.len());
        assert_eq!(0, view.rows[0].id);
        assert_eq!("最新実況天気図", view.rows[0].description);
        assert_eq!("/a.pdf", view.rows[0].url);
    }

    #[tokio::test]
    async fn fetch_uses_page_size_times_page() {
        let mut listing = listing_service::MockPort::new();
        listing
            .expect_fetch()
            .withf(|limit, offset| *limit == 100 && *offset == 0)
            .times(1)
            .returning(|_, _| Ok(vec![]));
        listing
            .expect_fetch()
            .withf(|limit, offset| *limit == 50 && *offset == 100)
            .times(1)
            .returning(|_, _| Ok(vec![record("FSAS24", "/b.pdf"), record("ASAS", "/a.pdf")]));

        let controller = controller(listing, params(100, 0));
        controller.start().await;
        assert_eq!(Outcome::Applied, controller.set_params(params(50, 2)).await);

        let view = controller.snapshot().await;
        assert_eq!(params(50, 2), view.params);
        assert_eq!(vec![100, 101], view.rows.iter().map(|r| r.id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn page_size_change_fetches_once() {
        let mut listing = listing_service::MockPort::new();
        listing
            .expect_fetch()
            .withf(|limit, offset| *limit == 100 && *offset == 0)
            .times(1)
            .returning(|_, _| Ok(vec![]));
        listing
            .expect_fetch()
            .withf(|limit, offset| *limit == 500 && *offset == 0)
            .times(1)
            .returning(|_, _| Ok(vec![]));

        let controller = controller(listing, params(100, 0));
        controller.start().await;
        assert_eq!(Outcome::Applied, controller.set_params(params(500, 0)).await);
        assert_eq!(Outcome::Unchanged, controller.set_params(params(500, 0)).await);
    }

    #[tokio::test]
    async fn set_params_before_start_fetches() {
        let mut listing = listing_service::MockPort::new();
        listing
            .expect_fetch()
            .withf(|limit, offset| *limit == 100 && *offset == 0)
            .times(1)
            .returning(|_, _| Ok(vec![]));

        let controller = controller(listing, params(100, 0));
        assert_eq!(Outcome::Applied, controller.set_params(params(100, 0)).await);
    }

    #[tokio::test]
    async fn failure_keeps_rows_and_notifies_once() {
        let mut listing = listing_service::MockPort::new();
        listing
            .expect_fetch()
            .withf(|_, offset| *offset == 0)
            .times(1)
            .returning(|_, _| Ok(vec![record("ASAS", "/a.pdf")]));
        listing
            .expect_fetch()
            .withf(|_, offset| *offset == 10)
            .times(1)
            .returning(|_, _| Err(status_error()));

        let controller = controller(listing, params(10, 0));
        controller.start().await;
        let before = controller.snapshot().await.rows;

        assert_eq!(Outcome::Failed, controller.set_params(params(10, 1)).await);
        let view = controller.snapshot().await;
        assert!(!view.loading);
        assert_eq!(before, view.rows);

        let notices = controller.take_notices().await;
        assert_eq!(1, notices.len());
        assert!(notices[0].contains("offset=10"), "{}", notices[0]);
        assert!(controller.take_notices().await.is_empty());
    }

    #[tokio::test]
    async fn failed_page_is_fetched_again_when_requested_again() {
        let mut sequence = mockall::Sequence::new();
        let mut listing = listing_service::MockPort::new();
        listing
            .expect_fetch()
            .withf(|_, offset| *offset == 0)
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| Ok(vec![record("ASAS", "/a.pdf")]));
        listing
            .expect_fetch()
            .withf(|_, offset| *offset == 10)
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| Err(status_error()));
        listing
            .expect_fetch()
            .withf(|_, offset| *offset == 10)
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| Ok(vec![record("FSAS24", "/b.pdf")]));

        let controller = controller(listing, params(10, 0));
        controller.start().await;
        assert_eq!(Outcome::Failed, controller.set_params(params(10, 1)).await);
        assert_eq!(Outcome::Applied, controller.set_params(params(10, 1)).await);

        let view = controller.snapshot().await;
        assert_eq!(10, view.rows[0].id);
        assert_eq!("/b.pdf", view.rows[0].url);
        assert_eq!(Outcome::Unchanged, controller.set_params(params(10, 1)).await);
    }

    #[tokio::test]
    async fn refresh_refetches_current_page() {
        let mut listing = listing_service::MockPort::new();
        listing
            .expect_fetch()
            .withf(|limit, offset| *limit == 10 && *offset == 0)
            .times(2)
            .returning(|_, _| Ok(vec![]));

        let controller = controller(listing, params(10, 0));
        controller.start().await;
        assert_eq!(Outcome::Applied, controller.refresh().await);
    }

    /// Listing whose responses are released by the test, in any order.
    #[derive(Default)]
    struct GatedListing {
        calls: StdMutex<Vec<(u32, u64)>>,
        gates: StdMutex<VecDeque<oneshot::Receiver<Result<Vec<ChartRecord>, Error>>>>,
    }

    impl GatedListing {
        fn gate(&self) -> oneshot::Sender<Result<Vec<ChartRecord>, Error>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().push_back(rx);
            tx
        }

        async fn wait_for_calls(&self, n: usize) {
            while self.calls.lock().unwrap().len() < n {
                tokio::task::yield_now().await;
            }
        }
    }

    #[async_trait]
    impl listing_service::Port for Arc<GatedListing> {
        async fn fetch(&self, limit: u32, offset: u64) -> Result<Vec<ChartRecord>, Error> {
            let gate = {
                self.calls.lock().unwrap().push((limit, offset));
                self.gates.lock().unwrap().pop_front().expect("no gate for fetch")
            };
            gate.await.expect("gate dropped")
        }
    }

    #[tokio::test]
    async fn stale_response_is_discarded() {
        let listing = Arc::new(GatedListing::default());
        let first_gate = listing.gate();
        let second_gate = listing.gate();
        let controller = Arc::new(controller(listing.clone(), params(10, 0)));

        let first = tokio::spawn({
            let controller = controller.clone();
            async move { controller.set_params(params(10, 1)).await }
        });
        listing.wait_for_calls(1).await;
        let second = tokio::spawn({
            let controller = controller.clone();
            async move { controller.set_params(params(10, 2)).await }
        });
        listing.wait_for_calls(2).await;
        assert_eq!(vec![(10, 10), (10, 20)], *listing.calls.lock().unwrap());

        // The older request resolves first, the newer one is still outstanding.
        first_gate.send(Ok(vec![record("ASAS", "/page1.pdf")])).unwrap();
        assert_eq!(Outcome::Superseded, first.await.unwrap());
        let view = controller.snapshot().await;
        assert!(view.loading);
        assert!(view.rows.is_empty());

        second_gate.send(Ok(vec![record("ASAS", "/page2.pdf")])).unwrap();
        assert_eq!(Outcome::Applied, second.await.unwrap());
        let view = controller.snapshot().await;
        assert!(!view.loading);
        assert_eq!(params(10, 2), view.params);
        assert_eq!("/page2.pdf", view.rows[0].url);
        assert_eq!(20, view.rows[0].id);
    }

    #[tokio::test]
    async fn late_stale_response_does_not_overwrite() {
        let listing = Arc::new(GatedListing::default());
        let first_gate = listing.gate();
        let second_gate = listing.gate();
        let controller = Arc::new(controller(listing.clone(), params(10, 0)));

        let first = tokio::spawn({
            let controller = controller.clone();
            async move { controller.set_params(params(10, 1)).await }
        });
        listing.wait_for_calls(1).await;
        let second = tokio::spawn({
            let controller = controller.clone();
            async move { controller.set_params(params(10, 2)).await }
        });
        listing.wait_for_calls(2).await;

        second_gate.send(Ok(vec![record("ASAS", "/page2.pdf")])).unwrap();
        assert_eq!(Outcome::Applied, second.await.unwrap());

        // A failure of the superseded request is neither shown nor applied.
        first_gate.send(Err(status_error())).unwrap();
        assert_eq!(Outcome::Superseded, first.await.unwrap());

        let view = controller.snapshot().await;
        assert!(!view.loading);
        assert_eq!("/page2.pdf", view.rows[0].url);
        assert!(controller.take_notices().await.is_empty());
    }

    #[tokio::test]
    async fn dropped_request_still_completes_fetch() {
        let listing = Arc::new(GatedListing::default());
        let gate = listing.gate();
        let controller = Arc::new(controller(listing.clone(), params(10, 0)));

        let request = tokio::spawn({
            let controller = controller.clone();
            async move { controller.set_params(params(10, 1)).await }
        });
        listing.wait_for_calls(1).await;
        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());
        assert!(controller.snapshot().await.loading);

        gate.send(Ok(vec![record("ASAS", "/page1.pdf")])).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while controller.snapshot().await.loading {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("loading flag not cleared");

        let view = controller.snapshot().await;
        assert_eq!(params(10, 1), view.params);
        assert_eq!("/page1.pdf", view.rows[0].url);
        assert_eq!(Outcome::Unchanged, controller.set_params(params(10, 1)).await);
    }
}
