use std::fmt::Display;

use chrono::{DateTime, SecondsFormat, Utc};

/// Row filter, ordering and paging in the backend's REST query dialect
/// (`column=op.value`, `order=column.desc`, `limit=n`).
#[derive(Debug, Clone, Default)]
pub struct Query {
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Vec<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    fn filter(mut self, column: &str, op: &str, value: impl Display) -> Self {
        self.filters.push((column.to_string(), format!("{}.{}", op, value)));
        self
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn neq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "neq", value)
    }

    pub fn gt(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "gt", value)
    }

    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn lt(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "lt", value)
    }

    pub fn gt_time(self, column: &str, at: DateTime<Utc>) -> Self {
        self.gt(column, timestamp(at))
    }

    pub fn gte_time(self, column: &str, at: DateTime<Utc>) -> Self {
        self.gte(column, timestamp(at))
    }

    pub fn lt_time(self, column: &str, at: DateTime<Utc>) -> Self {
        self.lt(column, timestamp(at))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(column, "is", "null")
    }

    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(column, "ilike", pattern)
    }

    pub fn in_<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let list: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        self.filter(column, "in", format!("({})", list.join(",")))
    }

    /// Disjunction of raw conditions, e.g. `["user1_id.eq.x", "user2_id.eq.x"]`.
    pub fn or(mut self, conditions: &[String]) -> Self {
        self.filters
            .push(("or".to_string(), format!("({})", conditions.join(","))));
        self
    }

    pub fn order(mut self, column: &str, descending: bool) -> Self {
        let dir = if descending { "desc" } else { "asc" };
        self.order.push(format!("{}.{}", column, dir));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn is_unfiltered(&self) -> bool {
        self.filters.is_empty()
    }

    /// Query-string pairs; values are URL-encoded by the HTTP client.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.filters.len() + 4);
        pairs.push((
            "select".to_string(),
            self.select.clone().unwrap_or_else(|| "*".to_string()),
        ));
        pairs.extend(self.filters.iter().cloned());
        if !self.order.is_empty() {
            pairs.push(("order".to_string(), self.order.join(",")));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        pairs
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `ilike` pattern matching `value` itself, case-insensitively. `%`, `_`
/// and `\` are escaped. `*` is the REST wildcard and has no escape, so it
/// becomes `_`, and callers must re-check the rows they get.
pub fn like_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            '*' => out.push('_'),
            _ => out.push(c),
        }
    }
    out
}

/// `*term*` for `ilike`, with the characters that delimit filter
/// expressions removed from user input.
pub fn contains_pattern(term: &str) -> String {
    let cleaned: String = term
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '%' | '.' | ':'))
        .collect();
    format!("*{}*", cleaned)
}
