//! Set definition queries.
//!
//! A set's definition is a small boolean query over record metadata:
//!
//! ```text
//! *                                   every published record
//! title:finches                       word match, case-insensitive
//! author:"Finch, Fiona"               phrase (substring) match
//! keyword:bird*                       prefix match
//! dsPersistentId:FK2/ABC123           persistent id or its trailing segment
//! subject:Medicine AND NOT title:draft
//! (keyword:a OR keyword:b) publisher:Harvard    juxtaposition means AND
//! ```

use thiserror::Error;

use crate::model::CanonicalMetadata;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("empty query")]
    Empty,
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("term '{0}' is missing a field (expected field:value)")]
    MissingField(String),
    #[error("empty value for field '{0}'")]
    EmptyValue(String),
    #[error("unterminated quoted phrase")]
    UnterminatedPhrase,
    #[error("unbalanced parentheses")]
    UnbalancedParens,
    #[error("unexpected '{0}'")]
    Unexpected(String),
    #[error("unexpected end of query")]
    UnexpectedEnd,
    #[error("query nests deeper than {0} levels")]
    TooDeep(usize),
    #[error("query has more than {0} tokens")]
    TooLong(usize),
}

/// Deepest nesting of `NOT` and parentheses accepted.
pub const MAX_QUERY_DEPTH: usize = 64;

/// Most tokens accepted in one definition. Bounds the depth of the
/// left-leaning `AND`/`OR` chains the parser builds.
pub const MAX_QUERY_TOKENS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Author,
    Description,
    Subject,
    Keyword,
    Publisher,
    Language,
    PersistentId,
}

impl Field {
    fn parse(name: &str) -> Result<Self, QueryError> {
        Ok(match name {
            "title" => Field::Title,
            "author" | "authorName" => Field::Author,
            "description" | "dsDescriptionValue" => Field::Description,
            "subject" => Field::Subject,
            "keyword" | "keywordValue" => Field::Keyword,
            "publisher" => Field::Publisher,
            "language" => Field::Language,
            "dsPersistentId" | "persistentId" => Field::PersistentId,
            other => return Err(QueryError::UnknownField(other.to_string())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Word(String),
    Prefix(String),
    Phrase(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    All,
    Term(Field, Value),
    And(Box<Query>, Box<Query>),
    Or(Box<Query>, Box<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(QueryError::Empty);
        }
        if tokens.len() > MAX_QUERY_TOKENS {
            return Err(QueryError::TooLong(MAX_QUERY_TOKENS));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let query = parser.parse_or()?;
        match parser.peek() {
            None => Ok(query),
            Some(Token::RParen) => Err(QueryError::UnbalancedParens),
            Some(tok) => Err(QueryError::Unexpected(tok.to_string())),
        }
    }

    pub fn matches(&self, md: &CanonicalMetadata) -> bool {
        match self {
            Query::All => true,
            Query::Term(field, value) => term_matches(*field, value, md),
            Query::And(a, b) => a.matches(md) && b.matches(md),
            Query::Or(a, b) => a.matches(md) || b.matches(md),
            Query::Not(q) => !q.matches(md),
        }
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Star,
    Term(Field, Value),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::Not => write!(f, "NOT"),
            Token::Star => write!(f, "*"),
            Token::Term(field, _) => write!(f, "{field:?} term"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '(' {
            chars.next();
            tokens.push(Token::LParen);
            continue;
        }
        if c == ')' {
            chars.next();
            tokens.push(Token::RParen);
            continue;
        }

        // A word runs to whitespace or a paren; a quote opens a phrase that may
        // contain either.
        let mut word = String::new();
        let mut quoted = None;
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '(' || c == ')' {
                break;
            }
            chars.next();
            if c == '"' {
                let mut phrase = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    phrase.push(c);
                }
                if !closed {
                    return Err(QueryError::UnterminatedPhrase);
                }
                quoted = Some(phrase);
                continue;
            }
            word.push(c);
        }

        let token = match (word.as_str(), &quoted) {
            ("AND", None) | ("&&", None) => Token::And,
            ("OR", None) | ("||", None) => Token::Or,
            ("NOT", None) => Token::Not,
            ("*", None) | ("*:*", None) => Token::Star,
            _ => lex_term(&word, quoted)?,
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn lex_term(word: &str, quoted: Option<String>) -> Result<Token, QueryError> {
    let Some((name, raw)) = word.split_once(':') else {
        return Err(QueryError::MissingField(word.to_string()));
    };
    let field = Field::parse(name)?;

    let value = match quoted {
        Some(phrase) if raw.is_empty() => Value::Phrase(phrase),
        Some(_) => return Err(QueryError::Unexpected(word.to_string())),
        None => match raw.strip_suffix('*') {
            Some(stem) if !stem.is_empty() => Value::Prefix(stem.to_string()),
            _ => Value::Word(raw.to_string()),
        },
    };

    match &value {
        Value::Word(v) | Value::Prefix(v) | Value::Phrase(v) if v.trim().is_empty() => {
            Err(QueryError::EmptyValue(name.to_string()))
        }
        _ => Ok(Token::Term(field, value)),
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn parse_or(&mut self) -> Result<Query, QueryError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Query::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Query, QueryError> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.next();
                }
                Some(Token::Not | Token::LParen | Token::Star | Token::Term(..)) => {}
                _ => break,
            }
            let right = self.parse_unary()?;
            left = Query::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Query, QueryError> {
        if self.depth >= MAX_QUERY_DEPTH {
            return Err(QueryError::TooDeep(MAX_QUERY_DEPTH));
        }
        self.depth += 1;
        let result = self.parse_unary_inner();
        self.depth -= 1;
        result
    }

    fn parse_unary_inner(&mut self) -> Result<Query, QueryError> {
        match self.next() {
            Some(Token::Not) => Ok(Query::Not(Box::new(self.parse_unary()?))),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(QueryError::UnbalancedParens),
                }
            }
            Some(Token::Star) => Ok(Query::All),
            Some(Token::Term(field, value)) => Ok(Query::Term(field, value)),
            Some(Token::RParen) => Err(QueryError::UnbalancedParens),
            Some(tok) => Err(QueryError::Unexpected(tok.to_string())),
            None => Err(QueryError::UnexpectedEnd),
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

fn term_matches(field: Field, value: &Value, md: &CanonicalMetadata) -> bool {
    let texts: Vec<&str> = match field {
        Field::PersistentId => return persistent_id_matches(&md.persistent_id, value),
        Field::Title => vec![md.title.as_str()],
        Field::Author => md.authors.iter().map(String::as_str).collect(),
        Field::Description => md.description.as_deref().into_iter().collect(),
        Field::Subject => md.subjects.iter().map(String::as_str).collect(),
        Field::Keyword => md.keywords.iter().map(String::as_str).collect(),
        Field::Publisher => md.publisher.as_deref().into_iter().collect(),
        Field::Language => md.language.as_deref().into_iter().collect(),
    };

    texts.into_iter().any(|text| text_matches(text, value))
}

fn text_matches(text: &str, value: &Value) -> bool {
    match value {
        Value::Phrase(phrase) => text.to_lowercase().contains(&phrase.to_lowercase()),
        Value::Word(word) => {
            let word = word.to_lowercase();
            words(text).any(|w| w == word)
        }
        Value::Prefix(stem) => {
            let stem = stem.to_lowercase();
            words(text).any(|w| w.starts_with(&stem))
        }
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn persistent_id_matches(pid: &str, value: &Value) -> bool {
    let pid = pid.to_lowercase();
    match value {
        Value::Word(v) | Value::Phrase(v) => {
            let v = v.to_lowercase();
            pid == v
                || pid.split_once(':').is_some_and(|(_, rest)| rest == v)
                || pid.ends_with(&format!("/{v}"))
        }
        Value::Prefix(stem) => {
            let stem = stem.to_lowercase();
            pid.starts_with(&stem)
                || pid
                    .split_once(':')
                    .is_some_and(|(_, rest)| rest.starts_with(&stem))
        }
    }
}
