//! Server-rendered dashboard page.
//!
//! The sidebar holds the download/refresh buttons, the user multi-select,
//! the statistics and an info box. The main area embeds the map from
//! `/map` and, on request, shows the filtered rows as a table.

use std::fmt::Write as _;

use ecosystem_map_feature_models::FeatureTable;
use ecosystem_map_render::escape_html;
use ecosystem_map_session::RenderOutput;

/// Severity of a banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NoticeLevel {
    const fn css_class(self) -> &'static str {
        match self {
            Self::Info => "notice-info",
            Self::Success => "notice-success",
            Self::Warning => "notice-warning",
            Self::Error => "notice-error",
        }
    }
}

/// A banner shown above the page content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Query parameters shared by `/`, `/map` and `/api/features`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewParams {
    /// Selected usernames; empty means "All Users".
    pub users: Vec<String>,
    /// Whether to show the filtered rows.
    pub show_data: bool,
}

impl ViewParams {
    /// Collects repeated `users` keys and the `show_data` flag.
    #[must_use]
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "users" if !value.is_empty() => params.users.push(value.clone()),
                "show_data" => params.show_data = matches!(value.as_str(), "on" | "true" | "1"),
                _ => {}
            }
        }
        params
    }

    /// Query string carrying the user selection (`users=a&users=b`).
    #[must_use]
    pub fn users_query(&self) -> String {
        self.users
            .iter()
            .map(|user| format!("users={}", urlencoding::encode(user)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Everything the page needs for one response.
pub struct PageView<'a> {
    pub downloaded: bool,
    pub notices: &'a [Notice],
    pub output: Option<&'a RenderOutput>,
    pub params: &'a ViewParams,
    pub map_width: u32,
    pub map_height: u32,
}

/// Renders the full dashboard page.
#[must_use]
pub fn render_page(view: &PageView<'_>) -> String {
    let mut html = String::with_capacity(8 * 1024);
    html.push_str(PAGE_HEAD);

    html.push_str("<aside class=\"sidebar\">\n<h2>Data Filters</h2>\n");
    if !view.downloaded {
        html.push_str(
            "<form method=\"post\" action=\"/download\">\
             <button type=\"submit\">Download MLA637 Data</button></form>\n",
        );
    }
    html.push_str(
        "<form method=\"post\" action=\"/refresh\">\
         <button type=\"submit\">Refresh Data</button></form>\n",
    );

    if let Some(output) = view.output {
        user_filter(&mut html, output, view.params);
        statistics(&mut html, output);
    }

    html.push_str(
        "<hr>\n<div class=\"notice notice-info\">This application displays ecosystem services \
         data from the MLA637 project. Use the user filter above to view specific users' \
         data.</div>\n</aside>\n",
    );

    html.push_str("<main>\n<h1>Ecosystem Services Interactive Map</h1>\n");
    html.push_str(
        "<p>This application displays ecosystem services data from the MLA637 project. \
         Use the sidebar to filter by user username and explore the data.</p>\n",
    );

    for notice in view.notices {
        let _ = writeln!(
            html,
            "<div class=\"notice {}\">{}</div>",
            notice.level.css_class(),
            escape_html(&notice.message)
        );
    }

    if !view.downloaded {
        html.push_str(
            "<div class=\"notice notice-info\">Please download the MLA637 data using the \
             button in the sidebar to view the map.</div>\n",
        );
    } else if let Some(output) = view.output {
        let query = view.params.users_query();
        let src = if query.is_empty() {
            "/map".to_string()
        } else {
            format!("/map?{query}")
        };
        let _ = writeln!(
            html,
            "<h2>Ecosystem Services Map</h2>\n<iframe class=\"map\" src=\"{}\" width=\"{}\" \
             height=\"{}\" title=\"Ecosystem Services Map\"></iframe>",
            escape_html(&src),
            view.map_width,
            view.map_height
        );

        if view.params.show_data {
            data_table(&mut html, &output.filtered);
        }
    }

    html.push_str("</main>\n</body>\n</html>\n");
    html
}

fn user_filter(html: &mut String, output: &RenderOutput, params: &ViewParams) {
    html.push_str("<h2>Filter by User</h2>\n<form method=\"get\" action=\"/\">\n");

    if output.user_column.is_some() {
        html.push_str(
            "<label for=\"users\">Select users to display:</label>\n\
             <select id=\"users\" name=\"users\" multiple size=\"8\" title=\"Choose one or more \
             users to filter the data. Select 'All Users' to show everyone's data.\">\n",
        );
        for option in &output.user_options {
            let selected = if output.selected_users.contains(option) {
                " selected"
            } else {
                ""
            };
            let escaped = escape_html(option);
            let _ = writeln!(html, "<option value=\"{escaped}\"{selected}>{escaped}</option>");
        }
        html.push_str("</select>\n");
    }

    let checked = if params.show_data { " checked" } else { "" };
    let _ = write!(
        html,
        "<label><input type=\"checkbox\" name=\"show_data\"{checked}> Show filtered \
         data</label>\n<button type=\"submit\">Apply</button>\n</form>\n"
    );
}

fn statistics(html: &mut String, output: &RenderOutput) {
    html.push_str("<h2>Statistics</h2>\n");
    for (label, value) in output.stats.metrics() {
        let _ = writeln!(
            html,
            "<div class=\"metric\"><div class=\"metric-label\">{label}</div>\
             <div class=\"metric-value\">{value}</div></div>"
        );
    }
}

/// Appends the rows of `table` as an HTML table (geometry as lat/lon).
pub fn data_table(html: &mut String, table: &FeatureTable) {
    html.push_str(
        "<div class=\"table-wrap\"><table>\n<thead><tr><th>latitude</th><th>longitude</th>",
    );
    for column in table.columns() {
        let _ = write!(html, "<th>{}</th>", escape_html(column));
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for row in table.rows() {
        html.push_str("<tr>");
        for coordinate in [row.latitude(), row.longitude()] {
            let _ = write!(
                html,
                "<td>{}</td>",
                coordinate.map(|c| c.to_string()).unwrap_or_default()
            );
        }
        for value in &row.values {
            let _ = write!(html, "<td>{}</td>", escape_html(&value.to_string()));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table></div>\n");
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8" />
<meta name="viewport" content="width=device-width, initial-scale=1.0" />
<title>Ecosystem Services Interactive Map</title>
<style>
  body { display: flex; margin: 0; font-family: system-ui, sans-serif; color: #262730; }
  .sidebar {
    width: 300px; min-height: 100vh; padding: 1rem 1.25rem;
    background: #f0f2f6; box-sizing: border-box;
  }
  .sidebar form { margin: 0.5rem 0; }
  .sidebar select { width: 100%; margin: 0.25rem 0 0.5rem; }
  main { flex: 1; padding: 1rem 2rem; overflow-x: auto; }
  button {
    padding: 0.4rem 0.9rem; border: 1px solid #ccc; border-radius: 0.4rem;
    background: white; cursor: pointer;
  }
  .notice { padding: 0.75rem 1rem; margin: 0.5rem 0; border-radius: 0.4rem; }
  .notice-info { background: #e8f0fe; color: #1a4d8f; }
  .notice-success { background: #e6f4ea; color: #1e6b34; }
  .notice-warning { background: #fff8e1; color: #8a6100; }
  .notice-error { background: #fdecea; color: #9c1c1c; }
  .metric { margin: 0.5rem 0; }
  .metric-label { font-size: 0.85rem; }
  .metric-value { font-size: 1.8rem; }
  iframe.map { border: none; }
  .table-wrap { max-height: 400px; overflow: auto; margin-top: 1rem; }
  table { border-collapse: collapse; font-size: 0.85rem; }
  th, td { border: 1px solid #ddd; padding: 0.25rem 0.5rem; white-space: nowrap; }
</style>
</head>
<body>
"#;
