use crate::event::Row;

/// How an accumulated result set is presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewMode {
    Table,
    Raw,
}

/// An accumulated result set with its derived column order.
///
/// Columns come from the first row's key set, in first-observed order.
/// Keys appearing only in later rows are invisible in tabular rendering
/// but preserved verbatim in the rows for raw rendering; the asymmetry is
/// intentional.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl ResultSet {
    fn from_rows(rows: Vec<Row>) -> Option<Self> {
        let first = rows.first()?;
        let columns = first.keys().cloned().collect();
        Some(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Presentation state for the current result set.
///
/// The mode is a pure display switch: it never re-fetches and never
/// mutates the data, and it persists across dataset replacements.
#[derive(Debug)]
pub struct ResultsView {
    dataset: Option<ResultSet>,
    mode: ViewMode,
}

impl Default for ResultsView {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultsView {
    pub fn new() -> Self {
        Self {
            dataset: None,
            mode: ViewMode::Table,
        }
    }

    /// Replaces the displayed dataset.
    ///
    /// `None` or zero rows uniformly yield the empty state: no columns,
    /// and the row-count footer is suppressed entirely.
    pub fn set_dataset(&mut self, rows: Option<Vec<Row>>) {
        self.dataset = rows.and_then(ResultSet::from_rows);
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// The current dataset (absent in the empty state) and mode.
    pub fn current(&self) -> (Option<&ResultSet>, ViewMode) {
        (self.dataset.as_ref(), self.mode)
    }
}

/// Formats one cell value by classification, for both renderings.
///
/// Null or missing values become the literal `NULL` marker, nested values
/// their compact JSON form, numbers a digit-grouped form; everything else
/// is its plain string form. Markup escaping is the renderer's job.
pub fn format_cell(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "NULL".to_string(),
        Some(value @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
            value.to_string()
        }
        Some(serde_json::Value::Number(number)) => group_digits(&number.to_string()),
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(serde_json::Value::Bool(flag)) => flag.to_string(),
    }
}

/// Inserts thousands separators into the integer part of a serialized
/// number; the sign and any fraction or exponent pass through untouched.
fn group_digits(serialized: &str) -> String {
    let (sign, rest) = match serialized.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", serialized),
    };
    let (int_part, tail) = match rest.find(['.', 'e', 'E']) {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(serialized.len() + digits.len() / 3);
    for (i, ch) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*ch);
    }
    format!("{sign}{grouped}{tail}")
}
