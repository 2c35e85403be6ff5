use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{builtin::RowList, data::Value};

#[derive(Debug, Clone)]
struct Cell {
    text: String,
    numeric: bool,
}

impl Cell {
    fn from_value(value: Option<&Value>) -> Self {
        let numeric = matches!(
            value,
            Some(
                Value::Int(_)
                    | Value::Long(_)
                    | Value::Short(_)
                    | Value::Byte(_)
                    | Value::Float(_)
                    | Value::Decimal(_)
            )
        );
        let text = value.map(Value::as_display).unwrap_or_default();
        Self {
            text: sanitize_cell(&text).into_owned(),
            numeric,
        }
    }
}

/// Plain-text table of mapped rows; numeric cells are right-aligned.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl TextTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(list: &RowList) -> Self {
        let mut table = Self::new(list.columns());
        for row in list.rows() {
            let values = table
                .headers
                .iter()
                .map(|header| row.get(header))
                .map(Cell::from_value)
                .collect();
            table.rows.push(values);
        }
        table
    }

    pub fn push_row(&mut self, values: &[Value]) {
        let cells = (0..self.headers.len())
            .map(|idx| Cell::from_value(values.get(idx)))
            .collect();
        self.rows.push(cells);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn render(&self) -> String {
        let mut widths = self
            .headers
            .iter()
            .map(|h| display_width(h).max(3))
            .collect::<Vec<_>>();
        for row in &self.rows {
            for (idx, cell) in row.iter().enumerate() {
                widths[idx] = widths[idx].max(display_width(&cell.text));
            }
        }

        let mut output = String::new();
        let header_cells = self
            .headers
            .iter()
            .map(|h| Cell {
                text: sanitize_cell(h).into_owned(),
                numeric: false,
            })
            .collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_row(&header_cells, &widths));
        let separator = widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(output, "{separator}");
        for row in &self.rows {
            let _ = writeln!(output, "{}", format_row(row, &widths));
        }
        output
    }
}

pub fn print_rows(list: &RowList) {
    print!("{}", TextTable::from_rows(list).render());
}

fn format_row(cells: &[Cell], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let padding = " ".repeat(width.saturating_sub(display_width(&cell.text)));
            if cell.numeric {
                format!("{padding}{}", cell.text)
            } else {
                format!("{}{padding}", cell.text)
            }
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // ANSI colour sequence, e.g. \x1b[31m
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
