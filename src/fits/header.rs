//! FITS header cards.
//!
//! A header is an ordered list of 80-character cards. Only the fixed-format
//! subset of the standard is handled: `KEYWORD = value / comment`, plus
//! cards without a value indicator (`COMMENT`, `HISTORY`, `HIERARCH`, blank
//! keywords), whose columns 9-80 are kept verbatim.

use crate::error::AppError;

/// Length of a single header card.
pub const CARD_LEN: usize = 80;

/// Keywords that describe the data layout. They are regenerated on write.
pub const STRUCTURAL_KEYS: [&str; 9] = [
    "SIMPLE", "XTENSION", "BITPIX", "EXTEND", "PCOUNT", "GCOUNT", "BSCALE", "BZERO", "BLANK",
];

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Keyword present with an undefined value.
    Undefined,
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Str(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            HeaderValue::Float(value)
        } else {
            HeaderValue::Undefined
        }
    }
}

impl From<Option<f64>> for HeaderValue {
    fn from(value: Option<f64>) -> Self {
        value.map(HeaderValue::from).unwrap_or(HeaderValue::Undefined)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub keyword: String,
    /// `None` for commentary cards.
    pub value: Option<HeaderValue>,
    /// For commentary cards, columns 9-80 as read, trailing blanks removed.
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn push_card(&mut self, card: Card) {
        self.cards.push(card);
    }

    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword)
            .and_then(|c| c.value.as_ref())
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        match self.get(keyword)? {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        match self.get(keyword)? {
            HeaderValue::Int(v) => Some(*v),
            HeaderValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        match self.get(keyword)? {
            HeaderValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn require_f64(&self, keyword: &str) -> Result<f64, AppError> {
        self.get_f64(keyword)
            .ok_or_else(|| AppError::data(format!("Missing or non-numeric header keyword `{keyword}`.")))
    }

    /// Set a keyword, replacing an existing card in place or appending a new one.
    ///
    /// Passing `comment = None` keeps the comment of an existing card.
    pub fn set(&mut self, keyword: &str, value: impl Into<HeaderValue>, comment: Option<&str>) {
        let keyword = keyword.to_ascii_uppercase();
        let value = value.into();
        if let Some(card) = self.cards.iter_mut().find(|c| c.keyword == keyword) {
            card.value = Some(value);
            if let Some(comment) = comment {
                card.comment = Some(comment.to_string());
            }
            return;
        }
        self.cards.push(Card {
            keyword,
            value: Some(value),
            comment: comment.map(str::to_string),
        });
    }

    /// Copy `keys` from `reference`, skipping the ones it does not carry.
    pub fn copy_keys(&mut self, reference: &Header, keys: &[&str]) {
        for key in keys {
            if let Some(card) = reference.cards.iter().find(|c| c.keyword == *key) {
                if let Some(value) = &card.value {
                    self.set(key, value.clone(), card.comment.as_deref());
                }
            }
        }
    }

    /// Header without layout keywords (`NAXISn` included).
    pub fn without_structure(&self) -> Header {
        let cards = self
            .cards
            .iter()
            .filter(|c| !is_structural(&c.keyword) && c.keyword != "END")
            .cloned()
            .collect();
        Header { cards }
    }
}

pub fn is_structural(keyword: &str) -> bool {
    STRUCTURAL_KEYS.contains(&keyword) || keyword.starts_with("NAXIS")
}

/// Parse one 80-byte card.
pub fn parse_card(raw: &[u8]) -> Card {
    let text: String = raw.iter().map(|&b| if b.is_ascii() { b as char } else { '?' }).collect();
    let keyword = text.get(0..8).unwrap_or(&text).trim_end().to_string();
    let has_value = text.get(8..10) == Some("= ");

    if !has_value {
        let rest = text.get(8..).unwrap_or("").trim_end();
        return Card {
            keyword,
            value: None,
            comment: if rest.trim_start().is_empty() { None } else { Some(rest.to_string()) },
        };
    }

    let field = text.get(10..).unwrap_or("");
    let (value, comment) = parse_value_field(field);
    Card {
        keyword,
        value: Some(value),
        comment,
    }
}

fn parse_value_field(field: &str) -> (HeaderValue, Option<String>) {
    let trimmed = field.trim_start();

    if let Some(body) = trimmed.strip_prefix('\'') {
        // Quoted string; `''` is an escaped quote.
        let mut out = String::new();
        let mut chars = body.char_indices().peekable();
        let mut end = body.len();
        while let Some((idx, ch)) = chars.next() {
            if ch == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    out.push('\'');
                    chars.next();
                    continue;
                }
                end = idx + 1;
                break;
            }
            out.push(ch);
        }
        let rest = body.get(end..).unwrap_or("");
        let comment = rest
            .split_once('/')
            .map(|(_, c)| c.trim().to_string())
            .filter(|c| !c.is_empty());
        return (HeaderValue::Str(out.trim_end().to_string()), comment);
    }

    let (token, comment) = match trimmed.split_once('/') {
        Some((v, c)) => (v.trim(), Some(c.trim().to_string()).filter(|c| !c.is_empty())),
        None => (trimmed.trim(), None),
    };

    let value = if token.is_empty() {
        HeaderValue::Undefined
    } else if token == "T" {
        HeaderValue::Bool(true)
    } else if token == "F" {
        HeaderValue::Bool(false)
    } else if let Ok(v) = token.parse::<i64>() {
        HeaderValue::Int(v)
    } else if let Ok(v) = token.replace(['D', 'd'], "E").parse::<f64>() {
        HeaderValue::Float(v)
    } else {
        HeaderValue::Str(token.to_string())
    };

    (value, comment)
}

/// Render one card as exactly 80 ASCII bytes.
pub fn format_card(card: &Card) -> String {
    let mut out = format!("{:<8}", truncate(&card.keyword, 8));

    match &card.value {
        None => {
            if let Some(text) = &card.comment {
                out.push_str(text);
            }
        }
        Some(value) => {
            out.push_str("= ");
            let rendered = format_value(value);
            out.push_str(&rendered);
            if let Some(comment) = &card.comment {
                out.push_str(" / ");
                out.push_str(comment);
            }
        }
    }

    let mut out: String = out.chars().map(|c| if c.is_ascii() { c } else { '?' }).collect();
    out.truncate(CARD_LEN);
    format!("{out:<80}")
}

fn format_value(value: &HeaderValue) -> String {
    match value {
        HeaderValue::Str(s) => {
            let escaped = truncate(s, 67).replace('\'', "''");
            format!("'{escaped:<8}'")
        }
        HeaderValue::Bool(b) => format!("{:>20}", if *b { "T" } else { "F" }),
        HeaderValue::Int(v) => format!("{v:>20}"),
        HeaderValue::Float(v) => format!("{:>20}", format_float(*v)),
        HeaderValue::Undefined => " ".repeat(20),
    }
}

fn format_float(v: f64) -> String {
    // Debug keeps a decimal point or an exponent, so the value reads back as a float.
    format!("{v:?}").to_uppercase()
}

fn truncate(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
