//! Projection of listing records into display rows. See [`project()`].

use chart_listing::ChartRecord;
use serde::Serialize;

use crate::catalog::ChartTypeCatalog;

/// A row of the chart table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRow {
    /// Page-relative ordinal, `offset + index`. Only unique within the loaded page, it has no
    /// relation to any server side identifier.
    pub id: u64,
    /// Last update time, verbatim from the listing.
    pub datetime: String,
    /// Chart type code, verbatim from the listing.
    #[serde(rename = "type")]
    pub chart_type: String,
    /// Catalog description for [`DisplayRow::chart_type`].
    pub description: &'static str,
    /// Location of the chart file, verbatim from the listing.
    pub url: String,
}

/// Project `records` fetched at `offset` into [`DisplayRow`]s, preserving order.
#[must_use]
pub fn project(
    records: &[ChartRecord],
    offset: u64,
    catalog: &ChartTypeCatalog,
) -> Vec<DisplayRow> {
    records
        .iter()
        .zip(offset..)
        .map(|(record, id)| DisplayRow {
            id,
            datetime: record.datetime.clone(),
            chart_type: record.chart_type.clone(),
            description: catalog.description(&record.chart_type),
            url: record.url.clone(),
        })
        .collect()
}
