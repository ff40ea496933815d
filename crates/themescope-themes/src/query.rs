//! Boolean query synthesis for the retrieval service.
//!
//! Grammar: terms and `"quoted phrases"`, `field: value` restrictions,
//! `AND`/`OR`/`NOT`, proximity `NEAR/n` and ordered proximity `ONEAR/n`,
//! parentheses for grouping. Operators are case-insensitive.
//!
//! Synthesized queries are deterministic: every group is lower-cased,
//! deduplicated and sorted before joining.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use themescope_core::{Error, Result, RunContext};
use themescope_ingest::{query_terms, tokenize};

use crate::candidate::ThemeCandidate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryToken {
    Term(String),
    Phrase(String),
    /// `source:` prefix restricting the following operand.
    Field(String),
    And,
    Or,
    Not,
    Near(Option<u32>),
    ONear(Option<u32>),
    LParen,
    RParen,
}

impl QueryToken {
    fn is_binary(&self) -> bool {
        matches!(
            self,
            QueryToken::And | QueryToken::Or | QueryToken::Near(_) | QueryToken::ONear(_)
        )
    }

    fn is_operand(&self) -> bool {
        matches!(self, QueryToken::Term(_) | QueryToken::Phrase(_))
    }
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryToken::Term(t) => write!(f, "{}", t),
            QueryToken::Phrase(p) => write!(f, "\"{}\"", p),
            QueryToken::Field(name) => write!(f, "{}:", name),
            QueryToken::And => write!(f, "AND"),
            QueryToken::Or => write!(f, "OR"),
            QueryToken::Not => write!(f, "NOT"),
            QueryToken::Near(None) => write!(f, "NEAR"),
            QueryToken::Near(Some(n)) => write!(f, "NEAR/{}", n),
            QueryToken::ONear(None) => write!(f, "ONEAR"),
            QueryToken::ONear(Some(n)) => write!(f, "ONEAR/{}", n),
            QueryToken::LParen => write!(f, "("),
            QueryToken::RParen => write!(f, ")"),
        }
    }
}

fn operator(word: &str) -> Option<QueryToken> {
    let upper = word.to_ascii_uppercase();
    let proximity = |prefix: &str| -> Option<Option<u32>> {
        let rest = upper.strip_prefix(prefix)?;
        if rest.is_empty() {
            return Some(None);
        }
        rest.strip_prefix('/')?.parse().ok().map(Some)
    };
    match upper.as_str() {
        "AND" => Some(QueryToken::And),
        "OR" => Some(QueryToken::Or),
        "NOT" => Some(QueryToken::Not),
        _ => proximity("ONEAR")
            .map(QueryToken::ONear)
            .or_else(|| proximity("NEAR").map(QueryToken::Near)),
    }
}

fn push_word(tokens: &mut Vec<QueryToken>, word: &str) {
    if let Some((field, rest)) = word.split_once(':') {
        if !field.is_empty() {
            tokens.push(QueryToken::Field(field.to_string()));
            if !rest.is_empty() {
                push_word(tokens, rest);
            }
            return;
        }
    }
    tokens.push(operator(word).unwrap_or_else(|| QueryToken::Term(word.to_string())));
}

/// Lex a query string.
pub fn tokenize_query(query: &str) -> Result<Vec<QueryToken>> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();
    let mut word = String::new();

    while let Some(c) = chars.next() {
        match c {
            '(' | ')' | '"' => {
                if !word.is_empty() {
                    push_word(&mut tokens, &word);
                    word.clear();
                }
                match c {
                    '(' => tokens.push(QueryToken::LParen),
                    ')' => tokens.push(QueryToken::RParen),
                    _ => {
                        let mut phrase = String::new();
                        let mut closed = false;
                        while let Some(p) = chars.next() {
                            match p {
                                '\\' if matches!(chars.peek(), Some(&'"') | Some(&'\\')) => {
                                    phrase.extend(chars.next());
                                }
                                '"' => {
                                    closed = true;
                                    break;
                                }
                                other => phrase.push(other),
                            }
                        }
                        if !closed {
                            return Err(Error::Synthesis("unterminated quoted phrase".into()));
                        }
                        tokens.push(QueryToken::Phrase(phrase));
                    }
                }
            }
            c if c.is_whitespace() => {
                if !word.is_empty() {
                    push_word(&mut tokens, &word);
                    word.clear();
                }
            }
            other => word.push(other),
        }
    }
    if !word.is_empty() {
        push_word(&mut tokens, &word);
    }
    Ok(tokens)
}

/// Structural check: non-empty, balanced parentheses, binary operators only
/// between operands, `NOT` and field prefixes followed by an operand.
pub fn validate_query(query: &str) -> Result<()> {
    let tokens = tokenize_query(query)?;
    if tokens.is_empty() {
        return Err(Error::Synthesis("empty query".into()));
    }

    let invalid = |msg: String| Err(Error::Synthesis(msg));
    let mut depth = 0usize;
    let mut prev: Option<&QueryToken> = None;
    for token in &tokens {
        let after_operand = matches!(prev, Some(p) if p.is_operand() || *p == QueryToken::RParen);
        match token {
            t if t.is_binary() => {
                if !after_operand {
                    return invalid(format!("operator {} is missing its left operand", t));
                }
            }
            QueryToken::RParen => {
                if depth == 0 {
                    return invalid("unbalanced ')'".into());
                }
                if !after_operand {
                    return invalid("empty or incomplete group".into());
                }
                depth -= 1;
            }
            QueryToken::LParen => depth += 1,
            _ => {}
        }
        prev = Some(token);
    }

    if depth != 0 {
        return invalid("unbalanced '('".into());
    }
    match prev {
        Some(p) if p.is_operand() || *p == QueryToken::RParen => Ok(()),
        Some(p) => invalid(format!("query ends with {}", p)),
        None => invalid("empty query".into()),
    }
}

/// Quote terms the grammar would otherwise misread: whitespace, grouping or
/// field characters, quotes, and bare operators such as `or` or `near/3`.
/// Inside quotes, `\` and `"` are backslash-escaped.
pub fn quote_term(term: &str) -> String {
    let special = term
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | ':' | '"'));
    if special || operator(term).is_some() {
        format!("\"{}\"", term.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        term.to_string()
    }
}

/// `a` or `(a OR b OR c)`.
fn or_group(terms: &BTreeSet<String>) -> Option<String> {
    let quoted: Vec<String> = terms.iter().map(|t| quote_term(t)).collect();
    match quoted.len() {
        0 => None,
        1 => quoted.into_iter().next(),
        _ => Some(format!("({})", quoted.join(" OR "))),
    }
}

fn normalize_terms<'a, I>(terms: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    terms
        .into_iter()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

pub struct QuerySynthesizer {
    pub max_description_terms: usize,
    pub max_keyword_terms: usize,
}

impl Default for QuerySynthesizer {
    fn default() -> Self {
        Self {
            max_description_terms: 5,
            max_keyword_terms: 8,
        }
    }
}

impl QuerySynthesizer {
    pub fn for_candidate(&self, candidate: &ThemeCandidate, context: &RunContext) -> Result<String> {
        let mut keywords = candidate.keywords.clone();
        keywords.extend(candidate.top_terms.iter().cloned());
        self.synthesize(&candidate.name, &candidate.description, &keywords, context)
    }

    /// Build the query for one theme.
    ///
    /// Returns a filters-only query when the theme has no usable vocabulary,
    /// and `Error::Synthesis` when there are no filters either, when a filter
    /// key cannot be expressed as a field, or when the result does not
    /// validate.
    pub fn synthesize(
        &self,
        name: &str,
        description: &str,
        keywords: &[String],
        context: &RunContext,
    ) -> Result<String> {
        let theme_terms = self.theme_terms(name, description, keywords);
        let filters = filter_clauses(context)?;

        let mut clauses = Vec::new();
        if let Some(group) = or_group(&theme_terms) {
            clauses.push(group);
            if let Some(group) = or_group(&normalize_terms(&context.keywords)) {
                clauses.push(group);
            }
        }
        clauses.extend(filters);
        if clauses.is_empty() {
            return Err(Error::Synthesis(format!(
                "theme {:?} has no vocabulary and the run has no filters",
                name
            )));
        }

        let mut query = clauses.join(" AND ");
        if let Some(group) = or_group(&normalize_terms(&context.exclusions)) {
            query.push_str(" AND NOT ");
            query.push_str(&group);
        }
        if let Err(e) = validate_query(&query) {
            return Err(Error::Synthesis(format!("invalid query {:?}: {}", query, e)));
        }
        Ok(query)
    }

    fn theme_terms(&self, name: &str, description: &str, keywords: &[String]) -> BTreeSet<String> {
        let mut terms: BTreeSet<String> = query_terms(name).into_iter().collect();

        let mut frequency: HashMap<String, usize> = HashMap::new();
        for token in tokenize(description) {
            *frequency.entry(token).or_default() += 1;
        }
        let mut ranked: Vec<(String, usize)> = frequency
            .into_iter()
            .filter(|(t, _)| !terms.contains(t))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        terms.extend(ranked.into_iter().take(self.max_description_terms).map(|(t, _)| t));

        let extra: Vec<String> = normalize_terms(keywords)
            .into_iter()
            .filter(|t| !terms.contains(t))
            .take(self.max_keyword_terms)
            .collect();
        terms.extend(extra);
        terms
    }
}

fn is_field_name(key: &str) -> bool {
    !key.is_empty()
        && operator(key).is_none()
        && !key
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | ':' | '"'))
}

/// `key: value` or `key: (v1 OR v2)`, keys in order, values deduplicated
/// case-insensitively. Keys that cannot be written as a field prefix are an
/// error.
fn filter_clauses(context: &RunContext) -> Result<Vec<String>> {
    if let Some(key) = context.filters.keys().find(|k| !is_field_name(k.trim())) {
        return Err(Error::Synthesis(format!(
            "filter key {:?} cannot be used as a query field",
            key
        )));
    }
    let clauses = context
        .filters
        .iter()
        .filter_map(|(key, values)| {
            let key = key.trim();
            let mut values: Vec<&str> = values
                .iter()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .collect();
            values.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then(a.cmp(b)));
            values.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
            let quoted: Vec<String> = values.iter().map(|v| quote_term(v)).collect();
            match quoted.len() {
                0 => None,
                1 => Some(format!("{}: {}", key, quoted[0])),
                _ => Some(format!("{}: ({})", key, quoted.join(" OR "))),
            }
        })
        .collect();
    Ok(clauses)
}
