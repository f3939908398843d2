//! A small zoekt-flavoured query language.
//!
//! # Syntax
//!
//! | Form | Meaning |
//! |------|---------|
//! | `foo bar` | both substrings occur in the file content |
//! | `foo or bar` | either side matches |
//! | `-foo` | content must not contain `foo` |
//! | `"foo bar"` | phrase, taken literally |
//! | `repo:name` / `r:name` | repository name contains `name` |
//! | `file:main` / `f:main` | file path contains `main` |
//! | `case:yes` / `case:no` / `case:auto` | case sensitivity of substring atoms |
//!
//! `and` binds tighter than `or`. With `case:auto` (the default) an atom is
//! case sensitive only when it contains an uppercase character.

use std::fmt;
use thiserror::Error;

/// Parsed query tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Substring atom. Case-insensitive patterns are stored lowercased.
    Substring {
        pattern: String,
        case_sensitive: bool,
        /// Match against the file path instead of the content.
        file_name: bool,
    },
    /// Repository name contains the pattern.
    Repo(String),
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("query is empty")]
    Empty,
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("'or' must appear between two terms")]
    DanglingOr,
    #[error("'-' must be followed by a term")]
    EmptyNegation,
    #[error("field '{0}' needs a value")]
    EmptyField(String),
    #[error("unknown case mode '{0}', expected yes, no or auto")]
    UnknownCaseMode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaseMode {
    Yes,
    No,
    Auto,
}

struct Token {
    text: String,
    quoted: bool,
    negated: bool,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        // `-"phrase"` negates a quoted phrase
        let mut negated = false;
        if c == '-' {
            let mut look = chars.clone();
            look.next();
            if look.peek() == Some(&'"') {
                chars.next();
                negated = true;
            }
        }

        if chars.peek() == Some(&'"') {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '"' {
                    closed = true;
                    break;
                }
                text.push(ch);
            }
            if !closed {
                return Err(ParseError::UnterminatedQuote);
            }
            if !text.is_empty() {
                tokens.push(Token {
                    text,
                    quoted: true,
                    negated,
                });
            }
        } else {
            let mut text = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                text.push(ch);
                chars.next();
            }
            tokens.push(Token {
                text,
                quoted: false,
                negated: false,
            });
        }
    }

    Ok(tokens)
}

fn parse_case_mode(value: &str) -> Result<CaseMode, ParseError> {
    match value {
        "yes" => Ok(CaseMode::Yes),
        "no" => Ok(CaseMode::No),
        "auto" => Ok(CaseMode::Auto),
        other => Err(ParseError::UnknownCaseMode(other.to_string())),
    }
}

fn substring(pattern: &str, file_name: bool) -> Query {
    Query::Substring {
        pattern: pattern.to_string(),
        case_sensitive: true,
        file_name,
    }
}

fn field_atom(text: &str) -> Result<Query, ParseError> {
    for prefix in ["repo:", "r:"] {
        if let Some(value) = text.strip_prefix(prefix) {
            if value.is_empty() {
                return Err(ParseError::EmptyField(prefix.trim_end_matches(':').into()));
            }
            return Ok(Query::Repo(value.to_string()));
        }
    }
    for prefix in ["file:", "f:"] {
        if let Some(value) = text.strip_prefix(prefix) {
            if value.is_empty() {
                return Err(ParseError::EmptyField(prefix.trim_end_matches(':').into()));
            }
            return Ok(substring(value, true));
        }
    }
    Ok(substring(text, false))
}

fn atom(token: &Token) -> Result<Query, ParseError> {
    if token.quoted {
        let q = substring(&token.text, false);
        return Ok(if token.negated {
            Query::Not(Box::new(q))
        } else {
            q
        });
    }
    match token.text.strip_prefix('-') {
        Some("") => Err(ParseError::EmptyNegation),
        Some(rest) => Ok(Query::Not(Box::new(field_atom(rest)?))),
        None => field_atom(&token.text),
    }
}

fn conjunction(mut terms: Vec<Query>) -> Query {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        Query::And(terms)
    }
}

/// Lowercase-aware view of one document, built once per evaluated file.
pub struct DocView<'a> {
    pub repository: &'a str,
    pub path: &'a str,
    pub content: &'a str,
    path_lower: String,
    content_lower: String,
}

impl<'a> DocView<'a> {
    pub fn new(repository: &'a str, path: &'a str, content: &'a str) -> Self {
        Self {
            repository,
            path,
            content,
            path_lower: path.to_lowercase(),
            content_lower: content.to_lowercase(),
        }
    }
}

impl Query {
    /// Parse a query string.
    pub fn parse(input: &str) -> Result<Query, ParseError> {
        let mut case = CaseMode::Auto;
        let mut groups: Vec<Vec<Query>> = vec![Vec::new()];

        for token in tokenize(input)? {
            if !token.quoted {
                if token.text.eq_ignore_ascii_case("or") {
                    if groups.last().is_some_and(Vec::is_empty) {
                        return Err(ParseError::DanglingOr);
                    }
                    groups.push(Vec::new());
                    continue;
                }
                if let Some(mode) = token.text.strip_prefix("case:") {
                    case = parse_case_mode(mode)?;
                    continue;
                }
            }
            let q = atom(&token)?;
            if let Some(group) = groups.last_mut() {
                group.push(q);
            }
        }

        if groups.last().is_some_and(Vec::is_empty) {
            return Err(if groups.len() > 1 {
                ParseError::DanglingOr
            } else {
                ParseError::Empty
            });
        }

        let mut query = if groups.len() == 1 {
            conjunction(groups.remove(0))
        } else {
            Query::Or(groups.into_iter().map(conjunction).collect())
        };
        query.apply_case(case);
        Ok(query)
    }

    fn apply_case(&mut self, mode: CaseMode) {
        match self {
            Query::Substring {
                pattern,
                case_sensitive,
                ..
            } => {
                *case_sensitive = match mode {
                    CaseMode::Yes => true,
                    CaseMode::No => false,
                    CaseMode::Auto => pattern.chars().any(char::is_uppercase),
                };
                if !*case_sensitive {
                    *pattern = pattern.to_lowercase();
                }
            }
            Query::Repo(_) => {}
            Query::And(qs) | Query::Or(qs) => qs.iter_mut().for_each(|q| q.apply_case(mode)),
            Query::Not(inner) => inner.apply_case(mode),
        }
    }

    /// Evaluate the query against one document.
    pub fn matches(&self, doc: &DocView<'_>) -> bool {
        match self {
            Query::Substring {
                pattern,
                case_sensitive,
                file_name,
            } => {
                let haystack = match (*file_name, *case_sensitive) {
                    (true, true) => doc.path,
                    (true, false) => doc.path_lower.as_str(),
                    (false, true) => doc.content,
                    (false, false) => doc.content_lower.as_str(),
                };
                haystack.contains(pattern.as_str())
            }
            Query::Repo(pattern) => doc.repository.contains(pattern.as_str()),
            Query::And(qs) => qs.iter().all(|q| q.matches(doc)),
            Query::Or(qs) => qs.iter().any(|q| q.matches(doc)),
            Query::Not(inner) => !inner.matches(doc),
        }
    }

    /// Whether a substring atom occurs in `text` (a single line or a path).
    ///
    /// Returns false for non-substring nodes.
    pub fn atom_matches_text(&self, text: &str) -> bool {
        match self {
            Query::Substring {
                pattern,
                case_sensitive: true,
                ..
            } => text.contains(pattern.as_str()),
            Query::Substring { pattern, .. } => text.to_lowercase().contains(pattern.as_str()),
            _ => false,
        }
    }

    /// Conservative check whether any document of `repository` could match.
    ///
    /// Only repository atoms are decided; everything else is assumed to
    /// possibly match.
    pub fn could_match_repo(&self, repository: &str) -> bool {
        match self {
            Query::Repo(pattern) => repository.contains(pattern.as_str()),
            Query::Substring { .. } => true,
            Query::And(qs) => qs.iter().all(|q| q.could_match_repo(repository)),
            Query::Or(qs) => qs.iter().any(|q| q.could_match_repo(repository)),
            Query::Not(inner) => match inner.as_ref() {
                Query::Repo(pattern) => !repository.contains(pattern.as_str()),
                _ => true,
            },
        }
    }

    /// Call `f` for every leaf atom.
    pub fn visit_atoms(&self, f: &mut dyn FnMut(&Query)) {
        match self {
            Query::And(qs) | Query::Or(qs) => qs.iter().for_each(|q| q.visit_atoms(f)),
            Query::Not(inner) => inner.visit_atoms(f),
            atom => f(atom),
        }
    }

    /// True when every atom is a repository restriction.
    pub fn is_repo_only(&self) -> bool {
        let mut repo_only = true;
        self.visit_atoms(&mut |q| repo_only &= matches!(q, Query::Repo(_)));
        repo_only
    }

    /// Substring atoms that are not under a negation.
    pub fn positive_substrings(&self) -> Vec<&Query> {
        let mut out = Vec::new();
        self.collect_positive(&mut out);
        out
    }

    fn collect_positive<'q>(&'q self, out: &mut Vec<&'q Query>) {
        match self {
            Query::Substring { .. } => out.push(self),
            Query::Repo(_) | Query::Not(_) => {}
            Query::And(qs) | Query::Or(qs) => qs.iter().for_each(|q| q.collect_positive(out)),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Substring {
                pattern,
                case_sensitive,
                file_name,
            } => {
                let kind = if *file_name { "file" } else { "substr" };
                let case = if *case_sensitive { ":case" } else { "" };
                write!(f, "{}{}:{:?}", kind, case, pattern)
            }
            Query::Repo(r) => write!(f, "repo:{:?}", r),
            Query::And(qs) => write_list(f, "and", qs),
            Query::Or(qs) => write_list(f, "or", qs),
            Query::Not(inner) => write!(f, "(not {})", inner),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, op: &str, qs: &[Query]) -> fmt::Result {
    write!(f, "({}", op)?;
    for q in qs {
        write!(f, " {}", q)?;
    }
    write!(f, ")")
}
