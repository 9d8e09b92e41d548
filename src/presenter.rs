//! Column definitions and HTML rendering of the chart table.

use std::{cmp::Ordering, fmt::Write};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use html_builder::Html5;
use serde::{Deserialize, Serialize};

use crate::{pagination::View, rows::DisplayRow};

/// Title shown in the page header.
pub const TITLE: &str = "JMA chart";

/// Fields of [`DisplayRow`] which are shown as columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// [`DisplayRow::id`].
    Id,
    /// [`DisplayRow::datetime`].
    Datetime,
    /// [`DisplayRow::chart_type`].
    #[serde(rename = "type")]
    Type,
    /// [`DisplayRow::description`].
    Description,
    /// [`DisplayRow::url`].
    Url,
}

impl Field {
    /// Name used for this field in query parameters and json.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Datetime => "datetime",
            Field::Type => "type",
            Field::Description => "description",
            Field::Url => "url",
        }
    }
}

/// Definition of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Row field displayed in this column.
    pub field: Field,
    /// Header label.
    pub label: &'static str,
    /// Whether the table may be sorted by this column.
    pub sortable: bool,
    /// Column width in pixels.
    pub width: u32,
}

/// The table's columns, in display order.
pub static COLUMNS: [Column; 5] = [
    Column {
        field: Field::Id,
        label: "No.",
        sortable: false,
        width: 60,
    },
    Column {
        field: Field::Datetime,
        label: "last update",
        sortable: true,
        width: 220,
    },
    Column {
        field: Field::Type,
        label: "type",
        sortable: true,
        width: 160,
    },
    Column {
        field: Field::Description,
        label: "description",
        sortable: true,
        width: 500,
    },
    Column {
        field: Field::Url,
        label: "file",
        sortable: false,
        width: 60,
    },
];

/// Look up the [`Column`] for `field`.
#[must_use]
pub fn column(field: Field) -> &'static Column {
    COLUMNS
        .iter()
        .find(|column| column.field == field)
        .unwrap_or(&COLUMNS[0])
}

/// Rendered content of a table cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// Plain text.
    Text(String),
    /// A hyperlink.
    Link {
        /// Link target.
        href: String,
        /// Link text.
        label: &'static str,
    },
}

/// Format the value of `field` in `row` for display.
#[must_use]
pub fn format_cell(field: Field, row: &DisplayRow, timezone: &Tz) -> Cell {
    match field {
        Field::Id => Cell::Text((row.id + 1).to_string()),
        Field::Datetime => Cell::Text(format_datetime(&row.datetime, timezone)),
        Field::Type => Cell::Text(row.chart_type.clone()),
        Field::Description => Cell::Text(row.description.to_owned()),
        Field::Url => Cell::Link {
            href: row.url.clone(),
            label: "pdf",
        },
    }
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Format a listing timestamp in `timezone`, e.g. `2024-01-01T09:00:00+09:00`. Timestamps
/// without an offset are taken to be UTC, values which can't be parsed are returned as is.
#[must_use]
pub fn format_datetime(value: &str, timezone: &Tz) -> String {
    match parse_datetime(value) {
        Some(datetime) => datetime
            .with_timezone(timezone)
            .format("%Y-%m-%dT%H:%M:%S%:z")
            .to_string(),
        None => value.to_owned(),
    }
}

/// Direction of a [`SortOrder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    fn name(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Sorting requested for the rows of the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    /// Column to sort by.
    pub field: Field,
    /// Sort direction.
    pub direction: SortDirection,
}

/// Error created while presenting the table.
#[derive(Debug, thiserror::Error)]
pub enum PresenterError {
    /// The requested sort column is not sortable.
    #[error("Column `{0}` is not sortable")]
    Unsortable(&'static str),
    /// Writing the html document failed.
    #[error("Error writing html")]
    Fmt(#[from] std::fmt::Error),
}

/// Sort `rows` in place. Only the loaded page is sorted, the order of the listing is unchanged.
pub fn sort_rows(rows: &mut [DisplayRow], order: SortOrder) -> Result<(), PresenterError> {
    if !column(order.field).sortable {
        return Err(PresenterError::Unsortable(order.field.name()));
    }

    let compare = |a: &DisplayRow, b: &DisplayRow| -> Ordering {
        match order.field {
            Field::Datetime => parse_datetime(&a.datetime)
                .cmp(&parse_datetime(&b.datetime))
                .then_with(|| a.datetime.cmp(&b.datetime)),
            Field::Type => a.chart_type.cmp(&b.chart_type),
            Field::Description => a.description.cmp(&b.description),
            Field::Id | Field::Url => Ordering::Equal,
        }
    };

    match order.direction {
        SortDirection::Asc => rows.sort_by(compare),
        SortDirection::Desc => rows.sort_by(|a, b| compare(b, a)),
    }
    Ok(())
}

/// Everything needed to render the table page.
pub struct PageContext<'a> {
    /// State of the pagination controller.
    pub view: &'a View,
    /// Total number of rows reported to the pagination control.
    pub row_count: u64,
    /// Page sizes offered to the user.
    pub page_size_options: &'a [u32],
    /// Time zone for displaying timestamps.
    pub timezone: Tz,
    /// Sorting applied to `view.rows`, if any.
    pub sort: Option<SortOrder>,
    /// Errors to show the user.
    pub notices: &'a [String],
}

#[derive(Serialize)]
struct PageQuery {
    page: u32,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<&'static str>,
}

/// Link to the table page showing `page` sorted by `sort`.
pub fn page_href(page: u32, page_size: u32, sort: Option<SortOrder>) -> String {
    query_href("/", page, page_size, sort)
}

/// Link that refetches `page` before showing it.
pub fn refresh_href(page: u32, page_size: u32, sort: Option<SortOrder>) -> String {
    query_href("/refresh", page, page_size, sort)
}

fn query_href(path: &str, page: u32, page_size: u32, sort: Option<SortOrder>) -> String {
    let query = PageQuery {
        page,
        page_size,
        sort: sort.map(|sort| sort.field.name()),
        order: sort.map(|sort| sort.direction.name()),
    };
    // Serializing plain integers and static strings can't fail.
    format!(
        "{}?{}",
        path,
        serde_urlencoded::to_string(query).unwrap_or_default()
    )
}

/// Escape text for inclusion in html content or a double quoted attribute.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

const STYLE: &str = r#"body {
    margin: 0;
    font-family: sans-serif;
}
.title {
    padding: 0.2em 0.5em;
    margin: 0;
}
table {
    width: 100%;
    border-collapse: collapse;
}
th, td {
    height: 30px;
    text-align: left;
    border-bottom: 1px solid #e0e0e0;
}
.footer {
    padding: 0.5em;
}"#;

/// Render the table page as an html document.
pub fn render_page(context: &PageContext<'_>) -> Result<String, PresenterError> {
    let view = context.view;
    let page = view.params.page();
    let page_size = view.params.page_size();

    let mut buf = html_builder::Buffer::new();
    let mut html = buf.html();
    let mut head = html.head();
    head.meta().attr(r#"charset="utf-8""#);
    write!(head.title(), "{}", TITLE)?;
    write!(head.style(), "{}", STYLE)?;

    let mut body = html.body();
    write!(body.h1().attr(r#"class="title""#), "{}", TITLE)?;

    if view.loading {
        write!(body.p().attr(r#"class="loading""#), "loading…")?;
    }

    let mut table = body.table();
    let mut thead = table.thead();
    let mut header_row = thead.tr();
    for column in &COLUMNS {
        let style_attr = format!(r#"style="width: {}px""#, column.width);
        let mut th = header_row
            .th()
            .attr(&style_attr)
            .attr(&format!(r#"data-field="{}""#, column.field.name()));
        if column.sortable {
            let direction = match context.sort {
                Some(sort) if sort.field == column.field => sort.direction.reversed(),
                _ => SortDirection::Asc,
            };
            let href = page_href(
                page,
                page_size,
                Some(SortOrder {
                    field: column.field,
                    direction,
                }),
            );
            let href_attr = format!(r#"href="{}""#, escape(&href));
            write!(th.a().attr(&href_attr), "{}", escape(column.label))?;
        } else {
            write!(th, "{}", escape(column.label))?;
        }
    }

    let mut tbody = table.tbody();
    for row in &view.rows {
        let mut tr = tbody.tr();
        for column in &COLUMNS {
            let mut td = tr.td();
            match format_cell(column.field, row, &context.timezone) {
                Cell::Text(text) => write!(td, "{}", escape(&text))?,
                Cell::Link { href, label } => {
                    let href_attr = format!(r#"href="{}""#, escape(&href));
                    write!(td.a().attr(&href_attr), "{}", label)?;
                }
            }
        }
    }

    let mut footer = body.div().attr(r#"class="footer""#);
    let mut form = footer.form().attr(r#"method="get" action="/""#);
    write!(form.label().attr(r#"for="page_size""#), "Rows per page: ")?;
    let mut select = form
        .select()
        .attr(r#"id="page_size" name="page_size" onchange="this.form.submit()""#);
    for option in context.page_size_options {
        let value_attr = format!(r#"value="{}""#, option);
        let mut option_node = select.option().attr(&value_attr);
        if *option == page_size {
            option_node = option_node.attr("selected");
        }
        write!(option_node, "{}", option)?;
    }
    form.input().attr(r#"type="hidden" name="page" value="0""#);

    let offset = view.params.offset();
    let (first, last) = if offset >= context.row_count {
        (0, 0)
    } else {
        (
            offset + 1,
            u64::min(offset + u64::from(page_size), context.row_count),
        )
    };
    write!(
        footer.span().attr(r#"class="range""#),
        " {}–{} of {} ",
        first,
        last,
        context.row_count
    )?;

    if page > 0 {
        let href_attr = format!(
            r#"href="{}" rel="prev""#,
            escape(&page_href(page - 1, page_size, context.sort))
        );
        write!(footer.a().attr(&href_attr), "previous")?;
    }
    if let Some(next) = page.checked_add(1) {
        if offset + u64::from(page_size) < context.row_count {
            let href_attr = format!(
                r#"href="{}" rel="next""#,
                escape(&page_href(next, page_size, context.sort))
            );
            write!(footer.a().attr(&href_attr), " next")?;
        }
    }

    let href_attr = format!(
        r#"href="{}" class="reload""#,
        escape(&refresh_href(page, page_size, context.sort))
    );
    write!(footer.a().attr(&href_attr), " reload")?;

    for notice in context.notices {
        // serde_json string escaping is a valid javascript string literal.
        let literal = serde_json::to_string(notice).map_err(|_| std::fmt::Error)?;
        write!(
            body.script(),
            "alert({});",
            literal.replace("</", "<\\/")
        )?;
    }

    Ok(buf.finish())
}
