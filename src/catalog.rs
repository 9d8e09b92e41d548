//! Static lookup table from JMA chart type codes to human readable descriptions.
//! See [`ChartTypeCatalog`].

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

/// Description used for chart type codes which are not present in the catalog.
pub const UNKNOWN_DESCRIPTION: &str = "unknown";

/// A chart type code and its description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChartTypeEntry {
    /// Chart type code, e.g. `ASAS`.
    pub code: &'static str,
    /// Human readable description of the chart.
    pub description: &'static str,
}

const JMA_ENTRIES: &[ChartTypeEntry] = &[
    ChartTypeEntry {
        code: "ASAS",
        description: "最新実況天気図",
    },
    ChartTypeEntry {
        code: "FSAS24",
        description: "最新24時間予想図",
    },
    ChartTypeEntry {
        code: "FSAS48",
        description: "最新48時間予想図",
    },
    ChartTypeEntry {
        code: "AUPA20",
        description: "アジア太平洋200hPa高度・気温・風・圏界面天気図",
    },
    ChartTypeEntry {
        code: "AUPA25",
        description: "アジア太平洋250hPa高度・気温・風天気図",
    },
    ChartTypeEntry {
        code: "AUPN30",
        description: "北太平洋300hPa高度・気温・風天気図",
    },
    ChartTypeEntry {
        code: "AUPQ35",
        description: "アジア500hPa・300hPa高度・気温・風・等風速線天気図",
    },
    ChartTypeEntry {
        code: "AUPQ78",
        description: "アジア850hPa・700hPa高度・気温・風・湿数天気図",
    },
    ChartTypeEntry {
        code: "AXFE578",
        description: "極東850hPa気温・風、700hPa上昇流／500hPa高度・渦度天気図",
    },
    ChartTypeEntry {
        code: "AXJP130/AXJP140",
        description: "高層断面図（風・気温・露点等）東経130度／140度解析",
    },
    ChartTypeEntry {
        code: "AXJP130",
        description: "高層断面図（風・気温・露点等）東経130度／140度解析",
    },
    ChartTypeEntry {
        code: "AUXN50",
        description: "北半球500hPa高度・気温天気図",
    },
    ChartTypeEntry {
        code: "FEAS/FEAS50",
        description: "アジア地上気圧、850hPa気温／500hPa高度・渦度天気図",
    },
];

static JMA_CATALOG: Lazy<ChartTypeCatalog> = Lazy::new(|| ChartTypeCatalog::new(JMA_ENTRIES));

/// Read-only mapping from chart type code to description.
#[derive(Debug)]
pub struct ChartTypeCatalog {
    entries: &'static [ChartTypeEntry],
    by_code: HashMap<&'static str, &'static str>,
}

impl ChartTypeCatalog {
    /// Construct a catalog from a constant entry table. Later duplicates of a code win.
    #[must_use]
    pub fn new(entries: &'static [ChartTypeEntry]) -> Self {
        let by_code = entries
            .iter()
            .map(|entry| (entry.code, entry.description))
            .collect();
        Self { entries, by_code }
    }

    /// The catalog of charts published by the Japan Meteorological Agency.
    #[must_use]
    pub fn jma() -> &'static Self {
        &JMA_CATALOG
    }

    /// Look up the description for `code`. Returns `None` when the code is not in the catalog.
    #[must_use]
    pub fn lookup(&self, code: &str) -> Option<&'static str> {
        self.by_code.get(code).copied()
    }

    /// Description for `code`, falling back to [`UNKNOWN_DESCRIPTION`] on a miss.
    #[must_use]
    pub fn description(&self, code: &str) -> &'static str {
        self.lookup(code).unwrap_or_else(|| {
            tracing::warn!("Chart type code {:?} is not in the catalog", code);
            UNKNOWN_DESCRIPTION
        })
    }

    /// All entries, in declaration order.
    #[must_use]
    pub fn entries(&self) -> &'static [ChartTypeEntry] {
        self.entries
    }
}
