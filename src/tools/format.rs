//! Result set rendering.
//!
//! Pure functions turning a [`ResultSet`] into text: bordered tables, a
//! vertical layout, an HTML document, and the smart, paged and summary views
//! used by the advanced select tools. Widths are measured in terminal
//! display columns so CJK text lines up.

use crate::models::{ResultSet, TableSchema};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const NO_DATA: &str = "No data to display";
pub const DEFAULT_SMART_COLUMNS: usize = 10;
pub const DEFAULT_COLUMNS_PER_PAGE: usize = 8;
pub const DEFAULT_ROWS_PER_PAGE: usize = 20;
pub const DEFAULT_SUMMARY_COLUMNS: usize = 6;
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

const PLAIN_WIDTH: (usize, usize) = (8, 50);
const IDE_WIDTH: (usize, usize) = (8, 100);
const VERTICAL_MAX: usize = 100;

/// Rendering style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStyle {
    /// Bordered ASCII table with narrow columns
    #[default]
    Plain,
    /// Bordered table with wide columns and single-line cells
    Ide,
    /// One block per row
    Vertical,
    /// Standalone HTML document
    Html,
    /// Most informative columns only
    Smart,
    /// Grid of column pages by row pages
    Paged,
    /// Per-column statistics plus sample rows
    Summary,
}

/// Options for [`FormatManager::render`].
#[derive(Debug, Clone, PartialEq)]
pub struct FormattingOptions {
    pub style: DisplayStyle,
    pub max_columns: Option<usize>,
    pub columns_per_page: usize,
    pub rows_per_page: usize,
    /// Zero-based page index for the paged style
    pub page: Option<usize>,
    pub sample_rows: usize,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            style: DisplayStyle::Plain,
            max_columns: None,
            columns_per_page: DEFAULT_COLUMNS_PER_PAGE,
            rows_per_page: DEFAULT_ROWS_PER_PAGE,
            page: None,
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }
}

impl FormattingOptions {
    pub fn style(style: DisplayStyle) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }
}

/// Column comments and key columns used to annotate output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMeta {
    comments: HashMap<String, String>,
    keys: Vec<String>,
}

impl ColumnMeta {
    pub fn from_schema(schema: &TableSchema) -> Self {
        Self {
            comments: schema
                .columns
                .iter()
                .filter_map(|c| c.comment.clone().map(|comment| (c.name.clone(), comment)))
                .collect(),
            keys: schema.key_columns(),
        }
    }

    /// Header label: `name(comment)` when a comment is known.
    pub fn header(&self, column: &str) -> String {
        match self.comments.get(column) {
            Some(comment) if !comment.is_empty() => format!("{}({})", column, comment),
            _ => column.to_string(),
        }
    }

    pub fn is_key(&self, column: &str) -> bool {
        self.keys.iter().any(|k| k.eq_ignore_ascii_case(column))
    }
}

/// One rendered page of the paged view.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct PageView {
    /// Zero-based page index
    pub page: usize,
    pub columns: Vec<String>,
    /// Rows on this page; zero past the last page
    pub row_count: usize,
    pub text: String,
}

/// Paged rendering of a whole result set.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct PagedView {
    pub total_pages: usize,
    pub column_pages: usize,
    pub row_pages: usize,
    pub pages: Vec<PageView>,
}

/// Statistics for one column.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ColumnSummary {
    pub name: String,
    pub non_null: usize,
    pub distinct: usize,
    pub nulls: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<JsonValue>,
}

/// Summary rendering: statistics plus a text report with sample rows.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct SummaryView {
    pub total_rows: usize,
    pub total_columns: usize,
    pub columns: Vec<ColumnSummary>,
    pub text: String,
}

/// Result set formatter.
pub struct FormatManager;

impl FormatManager {
    /// Render with the chosen style; `table` names the HTML title.
    pub fn render(rs: &ResultSet, options: &FormattingOptions, meta: &ColumnMeta, table: &str) -> String {
        match options.style {
            DisplayStyle::Plain => Self::plain(rs, meta),
            DisplayStyle::Ide => Self::ide(rs, meta),
            DisplayStyle::Vertical => Self::vertical(rs),
            DisplayStyle::Html => Self::html(rs, table, meta),
            DisplayStyle::Smart => {
                Self::smart(rs, options.max_columns.unwrap_or(DEFAULT_SMART_COLUMNS), meta)
            }
            DisplayStyle::Paged => {
                let view = Self::paged(
                    rs,
                    options.columns_per_page,
                    options.rows_per_page,
                    options.page,
                    meta,
                );
                view.pages
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            DisplayStyle::Summary => {
                Self::summary(
                    rs,
                    options.max_columns.unwrap_or(DEFAULT_SUMMARY_COLUMNS),
                    options.sample_rows,
                    meta,
                )
                .text
            }
        }
    }

    /// Bordered table; widths clamp to 8..=50 display columns.
    pub fn plain(rs: &ResultSet, meta: &ColumnMeta) -> String {
        if rs.is_empty() {
            return NO_DATA.to_string();
        }
        grid(&rs.columns, &rs.rows, meta, PLAIN_WIDTH, false)
    }

    /// Bordered table; widths clamp to 8..=100 and newlines become spaces.
    pub fn ide(rs: &ResultSet, meta: &ColumnMeta) -> String {
        if rs.is_empty() {
            return NO_DATA.to_string();
        }
        grid(&rs.columns, &rs.rows, meta, IDE_WIDTH, true)
    }

    /// `Row N:` blocks with keys sorted.
    pub fn vertical(rs: &ResultSet) -> String {
        if rs.is_empty() {
            return NO_DATA.to_string();
        }
        let mut out = String::new();
        for (i, row) in rs.rows.iter().enumerate() {
            out.push_str(&format!("Row {}:\n", i + 1));
            let mut keys: Vec<&String> = row.keys().collect();
            keys.sort();
            for key in keys {
                let text = cell_text(row.get(key).unwrap_or(&JsonValue::Null));
                let text = if text.chars().count() > VERTICAL_MAX {
                    let head: String = text.chars().take(VERTICAL_MAX - 3).collect();
                    format!("{}...", head)
                } else {
                    text
                };
                out.push_str(&format!("  {}: {}\n", key, text));
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }

    /// Complete HTML document with escaped values.
    pub fn html(rs: &ResultSet, table: &str, meta: &ColumnMeta) -> String {
        let title = format!("Table Data: {}", escape_html(table));
        if rs.is_empty() {
            return format!(
                "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
                 <body><p>{}</p></body>\n</html>\n",
                NO_DATA
            );
        }

        let mut out = String::new();
        out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        out.push_str(&format!("<title>{}</title>\n", title));
        out.push_str(
            "<style>\n\
             body { font-family: sans-serif; margin: 20px; }\n\
             table { border-collapse: collapse; }\n\
             th, td { border: 1px solid #ccc; padding: 4px 8px; text-align: left; vertical-align: top; }\n\
             th { background: #f0f0f0; }\n\
             tr:nth-child(even) { background: #fafafa; }\n\
             </style>\n</head>\n<body>\n",
        );
        out.push_str(&format!("<h2>{}</h2>\n<table>\n<thead><tr>", title));
        for column in &rs.columns {
            out.push_str(&format!("<th>{}</th>", escape_html(&meta.header(column))));
        }
        out.push_str("</tr></thead>\n<tbody>\n");
        for row in &rs.rows {
            out.push_str("<tr>");
            for column in &rs.columns {
                let text = cell_text(row.get(column).unwrap_or(&JsonValue::Null));
                out.push_str(&format!("<td>{}</td>", escape_html(&text)));
            }
            out.push_str("</tr>\n");
        }
        out.push_str(&format!(
            "</tbody>\n</table>\n<p>{} rows</p>\n</body>\n</html>\n",
            rs.len()
        ));
        out
    }

    /// Columns that fit in `max_columns`, keeping keys and the most varied columns.
    pub fn smart_columns(rs: &ResultSet, max_columns: usize, meta: &ColumnMeta) -> Vec<String> {
        if rs.columns.len() <= max_columns {
            return rs.columns.clone();
        }
        let mut chosen: HashSet<&str> = rs
            .columns
            .iter()
            .filter(|c| meta.is_key(c))
            .map(String::as_str)
            .collect();

        let mut candidates: Vec<(usize, &String)> = rs
            .columns
            .iter()
            .filter(|c| !chosen.contains(c.as_str()))
            .map(|c| (distinct_non_null(rs, c), c))
            .collect();
        // Stable sort keeps the original order among ties
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let budget = max_columns.saturating_sub(chosen.len());
        for (_, column) in candidates.into_iter().take(budget) {
            chosen.insert(column.as_str());
        }
        rs.columns
            .iter()
            .filter(|c| chosen.contains(c.as_str()))
            .cloned()
            .collect()
    }

    /// Table of the most informative columns with a truncation note.
    pub fn smart(rs: &ResultSet, max_columns: usize, meta: &ColumnMeta) -> String {
        if rs.is_empty() {
            return NO_DATA.to_string();
        }
        let selected = Self::smart_columns(rs, max_columns, meta);
        let mut out = grid(&selected, &rs.rows, meta, IDE_WIDTH, true);
        if selected.len() < rs.columns.len() {
            let omitted: Vec<&str> = rs
                .columns
                .iter()
                .filter(|c| !selected.contains(c))
                .map(String::as_str)
                .collect();
            out.push_str(&format!(
                "\nShowing {} of {} columns. Omitted: {}",
                selected.len(),
                rs.columns.len(),
                omitted.join(", ")
            ));
        }
        out
    }

    /// Cut the result into column pages by row pages.
    ///
    /// Page `p` shows column page `p / row_pages` and row page
    /// `p % row_pages`. Without `page` every page is rendered; a page past
    /// the end renders with zero rows.
    pub fn paged(
        rs: &ResultSet,
        columns_per_page: usize,
        rows_per_page: usize,
        page: Option<usize>,
        meta: &ColumnMeta,
    ) -> PagedView {
        let columns_per_page = columns_per_page.max(1);
        let rows_per_page = rows_per_page.max(1);
        let column_pages = rs.columns.len().div_ceil(columns_per_page).max(1);
        let row_pages = rs.len().div_ceil(rows_per_page).max(1);
        let total_pages = column_pages * row_pages;

        let render = |index: usize| -> PageView {
            if index >= total_pages || rs.is_empty() {
                return PageView {
                    page: index,
                    columns: Vec::new(),
                    row_count: 0,
                    text: format!(
                        "Page {} of {}: {}",
                        index.saturating_add(1),
                        total_pages,
                        NO_DATA
                    ),
                };
            }
            let column_page = index / row_pages;
            let row_page = index % row_pages;
            let col_start = column_page * columns_per_page;
            let col_end = (col_start + columns_per_page).min(rs.columns.len());
            let row_start = row_page * rows_per_page;
            let row_end = (row_start + rows_per_page).min(rs.len());

            let columns = rs.columns[col_start..col_end].to_vec();
            let rows = &rs.rows[row_start..row_end];
            let mut text = format!(
                "Page {} of {} (columns {}-{} of {}, rows {}-{} of {})\n",
                index + 1,
                total_pages,
                col_start + 1,
                col_end,
                rs.columns.len(),
                row_start + 1,
                row_end,
                rs.len()
            );
            text.push_str(&grid(&columns, rows, meta, IDE_WIDTH, true));
            PageView {
                page: index,
                columns,
                row_count: rows.len(),
                text,
            }
        };

        let pages = match page {
            Some(index) => vec![render(index)],
            None => (0..total_pages).map(render).collect(),
        };
        PagedView {
            total_pages,
            column_pages,
            row_pages,
            pages,
        }
    }

    /// Statistics for the first `max_columns` columns and a sample of rows.
    pub fn summary(
        rs: &ResultSet,
        max_columns: usize,
        sample_rows: usize,
        meta: &ColumnMeta,
    ) -> SummaryView {
        if rs.is_empty() {
            return SummaryView {
                total_rows: 0,
                total_columns: rs.columns.len(),
                columns: Vec::new(),
                text: NO_DATA.to_string(),
            };
        }
        let shown: Vec<String> = rs.columns.iter().take(max_columns.max(1)).cloned().collect();
        let stats: Vec<ColumnSummary> = shown.iter().map(|c| column_summary(rs, c)).collect();

        let mut text = format!(
            "Summary: {} rows, {} columns",
            rs.len(),
            rs.columns.len()
        );
        if shown.len() < rs.columns.len() {
            text.push_str(&format!(" (statistics for first {})", shown.len()));
        }
        text.push_str("\n\n");
        for s in &stats {
            text.push_str(&format!(
                "{}: non-null {}, distinct {}, nulls {}",
                meta.header(&s.name),
                s.non_null,
                s.distinct,
                s.nulls
            ));
            if let (Some(min), Some(max)) = (&s.min, &s.max) {
                text.push_str(&format!(", min {}, max {}", cell_text(min), cell_text(max)));
            }
            text.push('\n');
        }

        let sample: Vec<Map<String, JsonValue>> =
            rs.rows.iter().take(sample_rows).cloned().collect();
        if !sample.is_empty() {
            text.push_str(&format!("\nSample ({} of {} rows):\n", sample.len(), rs.len()));
            text.push_str(&grid(&shown, &sample, meta, IDE_WIDTH, true));
        }

        SummaryView {
            total_rows: rs.len(),
            total_columns: rs.columns.len(),
            columns: stats,
            text,
        }
    }
}

/// Display text for a cell.
pub fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

/// Cut `text` to at most `width` display columns, marking cuts with `...`.
fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let budget = width.saturating_sub(3);
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push_str("...");
    out
}

fn pad(text: &str, width: usize, right_align: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    if right_align {
        format!("{}{}", fill, text)
    } else {
        format!("{}{}", text, fill)
    }
}

fn grid(
    columns: &[String],
    rows: &[Map<String, JsonValue>],
    meta: &ColumnMeta,
    (min_width, max_width): (usize, usize),
    single_line: bool,
) -> String {
    let clean = |value: &JsonValue| {
        let text = cell_text(value);
        if single_line {
            text.replace("\r\n", " ").replace(['\n', '\r'], " ")
        } else {
            text
        }
    };
    let headers: Vec<String> = columns.iter().map(|c| meta.header(c)).collect();
    let cells: Vec<Vec<(String, bool)>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| {
                    let value = row.get(c).unwrap_or(&JsonValue::Null);
                    (clean(value), matches!(value, JsonValue::Number(_)))
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let content = cells.iter().map(|r| r[i].0.width()).max().unwrap_or(0);
            h.width().max(content).clamp(min_width, max_width)
        })
        .collect();

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = String::new();
    output.push_str(&separator);
    let header: String = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("| {} ", pad(&truncate(h, *w), *w, false)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for row in &cells {
        let line: String = row
            .iter()
            .zip(&widths)
            .map(|((text, numeric), w)| format!("| {} ", pad(&truncate(text, *w), *w, *numeric)))
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }
    output.push_str(&separator);

    let row_text = if rows.len() == 1 { "row" } else { "rows" };
    output.push_str(&format!("{} {} in set\n", rows.len(), row_text));
    output
}

fn distinct_non_null(rs: &ResultSet, column: &str) -> usize {
    rs.column_values(column)
        .filter(|v| !v.is_null())
        .map(|v| v.to_string())
        .collect::<HashSet<_>>()
        .len()
}

fn column_summary(rs: &ResultSet, column: &str) -> ColumnSummary {
    let values: Vec<&JsonValue> = rs.column_values(column).filter(|v| !v.is_null()).collect();
    let distinct = values
        .iter()
        .map(|v| v.to_string())
        .collect::<HashSet<_>>()
        .len();

    let (min, max) = if !values.is_empty() && values.iter().all(|v| v.is_number()) {
        let cmp = |a: &&&JsonValue, b: &&&JsonValue| {
            let fa = a.as_f64().unwrap_or(f64::NAN);
            let fb = b.as_f64().unwrap_or(f64::NAN);
            fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
        };
        (
            values.iter().min_by(cmp).map(|v| (**v).clone()),
            values.iter().max_by(cmp).map(|v| (**v).clone()),
        )
    } else if !values.is_empty() && values.iter().all(|v| v.is_string()) {
        (
            values.iter().min_by_key(|v| v.as_str()).map(|v| (**v).clone()),
            values.iter().max_by_key(|v| v.as_str()).map(|v| (**v).clone()),
        )
    } else {
        (None, None)
    };

    ColumnSummary {
        name: column.to_string(),
        non_null: values.len(),
        distinct,
        nulls: rs.len() - values.len(),
        min,
        max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AbstractType, ColumnInfo, KeyRole};
    use serde_json::json;

    fn result_set(columns: &[&str], rows: Vec<JsonValue>) -> ResultSet {
        ResultSet::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.into_iter()
                .map(|r| r.as_object().cloned().unwrap())
                .collect(),
        )
    }

    fn people() -> ResultSet {
        result_set(
            &["id", "name"],
            vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})],
        )
    }

    #[test]
    fn test_empty_result_renders_no_data() {
        let rs = ResultSet::default();
        let meta = ColumnMeta::default();
        assert_eq!(FormatManager::plain(&rs, &meta), NO_DATA);
        assert_eq!(FormatManager::vertical(&rs), NO_DATA);
        assert!(FormatManager::html(&rs, "t", &meta).contains(NO_DATA));
    }

    #[test]
    fn test_plain_table_layout() {
        let text = FormatManager::plain(&people(), &ColumnMeta::default());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "+----------+----------+");
        assert_eq!(lines[1], "| id       | name     |");
        assert_eq!(lines[3], "|        1 | a        |");
        assert!(text.ends_with("2 rows in set\n"));
    }

    #[test]
    fn test_plain_truncates_long_values() {
        let long = "x".repeat(80);
        let rs = result_set(&["v"], vec![json!({"v": long})]);
        let text = FormatManager::plain(&rs, &ColumnMeta::default());
        let expected = format!("| {}... |", "x".repeat(47));
        assert!(text.contains(&expected));
    }

    #[test]
    fn test_ide_replaces_newlines() {
        let rs = result_set(&["v"], vec![json!({"v": "a\nb"})]);
        let text = FormatManager::ide(&rs, &ColumnMeta::default());
        assert!(text.contains("| a b      |"));
    }

    #[test]
    fn test_wide_characters_align() {
        let rs = result_set(&["v"], vec![json!({"v": "数据库"})]);
        let text = FormatManager::plain(&rs, &ColumnMeta::default());
        assert!(text.contains("| 数据库   |"));
    }

    #[test]
    fn test_vertical_sorted_and_truncated() {
        let rs = result_set(&["b", "a"], vec![json!({"b": "x".repeat(150), "a": 1})]);
        let text = FormatManager::vertical(&rs);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Row 1:");
        assert_eq!(lines[1], "  a: 1");
        assert_eq!(lines[2], format!("  b: {}...", "x".repeat(97)));
    }

    #[test]
    fn test_html_escapes_values() {
        let rs = result_set(&["v"], vec![json!({"v": "<b>&\nnext"})]);
        let html = FormatManager::html(&rs, "t1", &ColumnMeta::default());
        assert!(html.contains("<title>Table Data: t1</title>"));
        assert!(html.contains("<td>&lt;b&gt;&amp;<br>next</td>"));
    }

    #[test]
    fn test_header_includes_comment() {
        let schema = TableSchema {
            table: "t".into(),
            columns: vec![ColumnInfo {
                name: "id".into(),
                native_type: "INTEGER".into(),
                abstract_type: AbstractType::Integer,
                nullable: false,
                key: KeyRole::Primary,
                default: None,
                extra: None,
                max_length: None,
                comment: Some("identifier".into()),
            }],
        };
        let meta = ColumnMeta::from_schema(&schema);
        assert_eq!(meta.header("id"), "id(identifier)");
        assert!(meta.is_key("id"));
    }

    #[test]
    fn test_smart_keeps_keys_and_varied_columns() {
        let rs = result_set(
            &["id", "constant", "varied", "half"],
            vec![
                json!({"id": 1, "constant": "c", "varied": "a", "half": "x"}),
                json!({"id": 2, "constant": "c", "varied": "b", "half": "x"}),
                json!({"id": 3, "constant": "c", "varied": "c", "half": "y"}),
            ],
        );
        let meta = ColumnMeta {
            comments: HashMap::new(),
            keys: vec!["id".into()],
        };
        let columns = FormatManager::smart_columns(&rs, 3, &meta);
        assert_eq!(columns, vec!["id", "varied", "half"]);

        let text = FormatManager::smart(&rs, 3, &meta);
        assert!(text.contains("Omitted: constant"));
    }

    #[test]
    fn test_smart_fits_without_note() {
        let text = FormatManager::smart(&people(), 10, &ColumnMeta::default());
        assert!(!text.contains("Omitted"));
    }

    #[test]
    fn test_paged_grid_and_overflow() {
        let rows: Vec<JsonValue> = (0..5).map(|i| json!({"a": i, "b": i, "c": i})).collect();
        let rs = result_set(&["a", "b", "c"], rows);
        let meta = ColumnMeta::default();

        let all = FormatManager::paged(&rs, 2, 2, None, &meta);
        assert_eq!(all.column_pages, 2);
        assert_eq!(all.row_pages, 3);
        assert_eq!(all.pages.len(), 6);
        // page 4 is the second column page, second row page
        assert_eq!(all.pages[4].columns, vec!["c"]);
        assert_eq!(all.pages[4].row_count, 2);

        let beyond = FormatManager::paged(&rs, 2, 2, Some(99), &meta);
        assert_eq!(beyond.pages.len(), 1);
        assert_eq!(beyond.pages[0].row_count, 0);

        let last = FormatManager::paged(&rs, 2, 2, Some(usize::MAX), &meta);
        assert_eq!(last.pages[0].row_count, 0);
        assert!(last.pages[0].text.starts_with("Page "));
        assert!(last.pages[0].text.contains(" of 6: "));
    }

    #[test]
    fn test_summary_statistics() {
        let rs = result_set(
            &["n", "s"],
            vec![
                json!({"n": 10, "s": "pear"}),
                json!({"n": 2, "s": null}),
                json!({"n": 10, "s": "apple"}),
            ],
        );
        let view = FormatManager::summary(&rs, 6, 2, &ColumnMeta::default());
        let n = &view.columns[0];
        assert_eq!((n.non_null, n.distinct, n.nulls), (3, 2, 0));
        assert_eq!(n.min, Some(json!(2)));
        assert_eq!(n.max, Some(json!(10)));
        let s = &view.columns[1];
        assert_eq!(s.nulls, 1);
        assert_eq!(s.min, Some(json!("apple")));
        assert!(view.text.contains("Sample (2 of 3 rows)"));
    }
}
