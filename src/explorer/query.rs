//! Paging parameters and the read-only SQL gate.

use serde::{Deserialize, Serialize};

use crate::error::{DbHubError, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

const FORBIDDEN: [&str; 15] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "REPLACE", "TRUNCATE", "ATTACH",
    "DETACH", "PRAGMA", "VACUUM", "REINDEX", "GRANT", "REVOKE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    page: u32,
    page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Result<Self> {
        if page < 1 {
            return Err(DbHubError::InvalidPagination(format!("page must be >= 1, got {}", page)));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(DbHubError::InvalidPagination(format!(
                "page_size must be within 1..={}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.page_size as i64
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        let size = self.page_size as i64;
        (total.max(0) + size - 1) / size
    }
}

/// A single SELECT statement that passed the keyword gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOnlyQuery {
    sql: String,
}

impl ReadOnlyQuery {
    pub fn parse(sql: &str) -> Result<Self> {
        let statement = sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        if statement.is_empty() {
            return Err(DbHubError::InvalidQuery("query is empty".to_string()));
        }

        let scan = scan(statement)?;
        if scan.has_separator {
            return Err(DbHubError::InvalidQuery(
                "only a single statement is allowed".to_string(),
            ));
        }
        if let Some(word) = scan.words.iter().find(|w| FORBIDDEN.contains(&w.as_str())) {
            return Err(DbHubError::InvalidQuery(format!("{} is not allowed", word)));
        }

        match scan.words.first().map(String::as_str) {
            Some("SELECT") => {}
            Some("WITH") if scan.words.iter().any(|w| w == "SELECT") => {}
            _ => {
                return Err(DbHubError::InvalidQuery(
                    "only SELECT statements are allowed".to_string(),
                ))
            }
        }

        Ok(Self {
            sql: statement.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.sql
    }
}

struct Scan {
    /// Upper-cased bare words outside literals and comments
    words: Vec<String>,
    has_separator: bool,
}

fn scan(sql: &str) -> Result<Scan> {
    let chars: Vec<char> = sql.chars().collect();
    let mut words = Vec::new();
    let mut has_separator = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                i = skip_quoted(&chars, i, c)?;
            }
            '[' => {
                i = skip_quoted(&chars, i, ']')?;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(DbHubError::InvalidQuery("unterminated comment".to_string()));
                }
                i += 2;
            }
            ';' => {
                has_separator = true;
                i += 1;
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                words.push(chars[start..i].iter().collect::<String>().to_uppercase());
            }
            _ => i += 1,
        }
    }

    Ok(Scan {
        words,
        has_separator,
    })
}

/// Index just past the literal opened at `start`. A doubled closing quote is
/// an escaped quote.
fn skip_quoted(chars: &[char], start: usize, close: char) -> Result<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == close {
            if chars.get(i + 1) == Some(&close) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(DbHubError::InvalidQuery("unterminated quoted text".to_string()))
}
