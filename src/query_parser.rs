//! Prefix-aware query parsing on top of tantivy query objects.
//!
//! Tantivy's own parser resolves `field:term` against schema field names,
//! while records here keep every labelled field inside one pre-tokenized
//! `terms` field under a short prefix. This parser reads the familiar
//! free-text syntax and maps labels through the prefixes it was configured
//! with:
//!
//! - words, `label:word`, `"a phrase"`, `label:"a phrase"`;
//! - `+clause` (required) and `-clause` (excluded);
//! - `AND`, `OR`, `NOT`, `AND NOT` and parentheses, OR binding loosest;
//! - `begin..end` ranges claimed by numeric range processors.
//!
//! Clauses without an operator are OR'd. Boolean-prefixed clauses and
//! ranges act as filters: they restrict matches without adding to the
//! score. Filters on the same prefix (or slot) are OR'd, different ones
//! AND'd.

use std::{collections::BTreeMap, collections::HashMap, ops::Bound};

use tantivy::{
    Index,
    Term,
    query::{
        AllQuery,
        BooleanQuery,
        BoostQuery,
        EmptyQuery,
        Occur,
        PhraseQuery,
        Query,
        RangeQuery,
        TermQuery,
    },
    schema::IndexRecordOption,
};

use crate::{
    error::{Error, Result},
    sortable,
    stopper::Stopper,
    tantivy_index::{
        self,
        IndexFields,
        StemLanguage,
        TermGenerator,
    },
};

/// Receives the mappings held by a
/// [`PrefixRegistry`](crate::prefix::PrefixRegistry).
pub trait ConfigurePrefixes {
    fn add_prefix(&mut self, label: &str, prefix: &str);
    fn add_boolean_prefix(&mut self, label: &str, prefix: &str);
    fn add_range_processor(&mut self, processor: RangeProcessor);
}

/// Which query words get stemmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StemStrategy {
    /// Never stem; match the raw words only.
    None,
    /// Stem words unless they start with a capital letter.
    #[default]
    Some,
    /// Stem every word outside phrases.
    All,
}

/// Claims `begin..end` ranges for a numbered slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeProcessor {
    slot: u32,
    prefix: String,
}

impl RangeProcessor {
    /// A numeric processor recognising ranges whose start (or, for an
    /// open start, whose end) begins with `prefix`.
    pub fn numeric(slot: u32, prefix: &str) -> Self {
        Self {
            slot,
            prefix: prefix.to_string(),
        }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn claim(&self, begin: &str, end: &str) -> Option<NumericBounds> {
        let (begin, end) = match begin.strip_prefix(self.prefix.as_str()) {
            Some(rest) => (
                rest,
                end.strip_prefix(self.prefix.as_str()).unwrap_or(end),
            ),
            None if begin.is_empty() => {
                ("", end.strip_prefix(self.prefix.as_str())?)
            }
            None => return None,
        };

        let low = parse_bound(begin)?;
        let high = parse_bound(end)?;
        if low.is_none() && high.is_none() {
            return None;
        }
        Some(NumericBounds { low, high })
    }
}

struct NumericBounds {
    low: Option<f64>,
    high: Option<f64>,
}

// Outer `None` rejects the text, inner `None` is an open bound.
fn parse_bound(text: &str) -> Option<Option<f64>> {
    if text.is_empty() {
        return Some(None);
    }
    let value = text.parse::<f64>().ok().filter(|v| !v.is_nan())?;
    Some(Some(value))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word { label: Option<String>, text: String },
    Phrase { label: Option<String>, text: String },
    Range { begin: String, end: String },
    Open,
    Close,
    And,
    Or,
    Not,
    Love,
    Hate,
}

fn is_label(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn is_word_break(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"')
}

// `+`/`-` only bind when a clause follows immediately.
fn starts_clause(next: Option<&char>) -> bool {
    next.is_some_and(|c| !c.is_whitespace() && *c != ')')
}

fn lex(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let read_phrase = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && chars[*i] != '"' {
            *i += 1;
        }
        let text: String = chars[start..*i].iter().collect();
        // Skip the closing quote; an unterminated phrase runs to the end.
        if *i < chars.len() {
            *i += 1;
        }
        text
    };

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '"' => {
                i += 1;
                let text = read_phrase(&mut i);
                tokens.push(Token::Phrase { label: None, text });
            }
            '+' | '-' if starts_clause(chars.get(i + 1)) => {
                tokens.push(if c == '+' { Token::Love } else { Token::Hate });
                i += 1;
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_word_break(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();

                if let Some(label) = word.strip_suffix(':')
                    && is_label(label)
                    && chars.get(i) == Some(&'"')
                {
                    i += 1;
                    let text = read_phrase(&mut i);
                    tokens.push(Token::Phrase {
                        label: Some(label.to_string()),
                        text,
                    });
                    continue;
                }

                tokens.push(classify_word(word));
            }
        }
    }

    tokens
}

fn classify_word(word: String) -> Token {
    match word.as_str() {
        "AND" => return Token::And,
        "OR" => return Token::Or,
        "NOT" => return Token::Not,
        _ => {}
    }

    if let Some((begin, end)) = word.split_once("..") {
        return Token::Range {
            begin: begin.to_string(),
            end: end.to_string(),
        };
    }

    if let Some((label, text)) = word.split_once(':')
        && is_label(label)
        && !text.is_empty()
    {
        return Token::Word {
            label: Some(label.to_string()),
            text: text.to_string(),
        };
    }

    Token::Word { label: None, text: word }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    Default,
    Love,
    Hate,
}

#[derive(Debug)]
enum Item {
    Word { label: Option<String>, text: String },
    Phrase { label: Option<String>, text: String },
    Range { begin: String, end: String },
    Sub(Node),
}

#[derive(Debug)]
struct Clause {
    modifier: Modifier,
    item: Item,
}

#[derive(Debug)]
enum Node {
    Group(Vec<Clause>),
    /// Every `must` node matches and no `must_not` node does.
    And {
        must: Vec<Node>,
        must_not: Vec<Node>,
    },
    Or(Vec<Node>),
}

/// Deepest parenthesis nesting a query may use.
const MAX_DEPTH: usize = 256;

struct Grammar {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Grammar {
    fn parse(tokens: Vec<Token>) -> Result<Node> {
        let mut grammar = Self {
            tokens,
            pos: 0,
            depth: 0,
        };
        let node = grammar.or_expr()?;
        if grammar.pos < grammar.tokens.len() {
            return Err(syntax("unbalanced ')'"));
        }
        Ok(node)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or_expr(&mut self) -> Result<Node> {
        let mut nodes = vec![self.and_expr()?];
        while self.peek() == Some(&Token::Or) {
            self.advance();
            nodes.push(self.and_expr()?);
        }
        Ok(if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            Node::Or(nodes)
        })
    }

    fn and_expr(&mut self) -> Result<Node> {
        let mut must = vec![self.group()?];
        let mut must_not = Vec::new();
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.advance();
                    if self.peek() == Some(&Token::Not) {
                        self.advance();
                        must_not.push(self.group()?);
                    } else {
                        must.push(self.group()?);
                    }
                }
                Some(Token::Not) => {
                    self.advance();
                    must_not.push(self.group()?);
                }
                _ => break,
            }
        }
        Ok(if must.len() == 1 && must_not.is_empty() {
            must.remove(0)
        } else {
            Node::And { must, must_not }
        })
    }

    fn group(&mut self) -> Result<Node> {
        let mut clauses = Vec::new();
        while let Some(token) = self.peek() {
            if matches!(token, Token::And | Token::Or | Token::Not | Token::Close)
            {
                break;
            }
            clauses.push(self.clause()?);
        }
        if clauses.is_empty() {
            return Err(syntax("expected a query term"));
        }
        Ok(Node::Group(clauses))
    }

    fn clause(&mut self) -> Result<Clause> {
        let modifier = match self.peek() {
            Some(Token::Love) => {
                self.advance();
                Modifier::Love
            }
            Some(Token::Hate) => {
                self.advance();
                Modifier::Hate
            }
            _ => Modifier::Default,
        };

        let item = match self.advance() {
            Some(Token::Word { label, text }) => Item::Word { label, text },
            Some(Token::Phrase { label, text }) => Item::Phrase { label, text },
            Some(Token::Range { begin, end }) => Item::Range { begin, end },
            Some(Token::Open) => {
                if self.depth == MAX_DEPTH {
                    return Err(syntax("query nested too deeply"));
                }
                self.depth += 1;
                let node = self.or_expr()?;
                if self.advance() != Some(Token::Close) {
                    return Err(syntax("missing ')'"));
                }
                self.depth -= 1;
                Item::Sub(node)
            }
            Some(_) | None => {
                return Err(syntax("expected a query term after '+' or '-'"));
            }
        };

        Ok(Clause { modifier, item })
    }
}

fn syntax(message: &str) -> Error {
    Error::QueryParse(format!("syntax error: {message}"))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum FilterKey {
    Boolean(String),
    Slot(u32),
}

/// Parses query text into tantivy queries over the record schema.
pub struct QueryParser {
    fields: IndexFields,
    generator: TermGenerator,
    stopper: Stopper,
    strategy: StemStrategy,
    text_prefixes: HashMap<String, String>,
    boolean_prefixes: HashMap<String, String>,
    ranges: Vec<RangeProcessor>,
}

impl QueryParser {
    /// A parser bound to `index`, with no stemming, no stop-words and no
    /// prefixes.
    pub fn for_index(index: &Index) -> Result<Self> {
        Ok(Self {
            fields: IndexFields::resolve(&index.schema())?,
            generator: TermGenerator::new(StemLanguage::None),
            stopper: Stopper::default(),
            strategy: StemStrategy::default(),
            text_prefixes: HashMap::new(),
            boolean_prefixes: HashMap::new(),
            ranges: Vec::new(),
        })
    }

    pub fn set_stemmer(&mut self, language: StemLanguage) -> &mut Self {
        self.generator = TermGenerator::new(language);
        self
    }

    pub fn set_stopper(&mut self, stopper: Stopper) -> &mut Self {
        self.stopper = stopper;
        self
    }

    pub fn set_stemming_strategy(&mut self, strategy: StemStrategy) -> &mut Self {
        self.strategy = strategy;
        self
    }

    pub fn parse_query(&mut self, query: &str) -> Result<Box<dyn Query>> {
        let node = Grammar::parse(lex(query))?;
        let parsed = self
            .translate(&node)?
            .unwrap_or_else(|| Box::new(EmptyQuery));
        tracing::trace!(query, parsed = ?parsed, "parsed query");
        Ok(parsed)
    }

    fn translate(&mut self, node: &Node) -> Result<Option<Box<dyn Query>>> {
        match node {
            Node::Group(clauses) => self.translate_group(clauses),
            Node::And { must, must_not } => {
                let mut parts = Vec::new();
                for node in must {
                    if let Some(q) = self.translate(node)? {
                        parts.push((Occur::Must, q));
                    }
                }
                if parts.is_empty() {
                    return Ok(None);
                }
                for node in must_not {
                    if let Some(q) = self.translate(node)? {
                        parts.push((Occur::MustNot, q));
                    }
                }
                Ok(combine(parts))
            }
            Node::Or(nodes) => {
                let mut parts = Vec::new();
                for node in nodes {
                    if let Some(q) = self.translate(node)? {
                        parts.push((Occur::Should, q));
                    }
                }
                Ok(combine(parts))
            }
        }
    }

    fn translate_group(
        &mut self,
        clauses: &[Clause],
    ) -> Result<Option<Box<dyn Query>>> {
        let mut should = Vec::new();
        let mut must = Vec::new();
        let mut must_not = Vec::new();
        let mut filters: BTreeMap<FilterKey, Vec<Box<dyn Query>>> =
            BTreeMap::new();

        for clause in clauses {
            let stoppable = clause.modifier == Modifier::Default;
            let (query, filter_key) = match &clause.item {
                Item::Word { label, text } | Item::Phrase { label, text }
                    if self.boolean_label(label.as_deref()).is_some() =>
                {
                    let prefix = self
                        .boolean_label(label.as_deref())
                        .unwrap_or_default()
                        .to_string();
                    let term = Term::from_field_text(
                        self.fields.boolean,
                        &format!("{prefix}{text}"),
                    );
                    let query: Box<dyn Query> = Box::new(TermQuery::new(
                        term,
                        IndexRecordOption::Basic,
                    ));
                    (Some(query), Some(FilterKey::Boolean(prefix)))
                }
                Item::Word { label, text } => {
                    (self.word_query(label.as_deref(), text, stoppable), None)
                }
                Item::Phrase { label, text } => {
                    (self.phrase_query(label.as_deref(), text), None)
                }
                Item::Range { begin, end } => {
                    let (slot, query) = self.range_query(begin, end)?;
                    (Some(query), Some(FilterKey::Slot(slot)))
                }
                Item::Sub(node) => (self.translate(node)?, None),
            };

            let Some(query) = query else {
                continue;
            };

            match (clause.modifier, filter_key) {
                (Modifier::Hate, _) => must_not.push(query),
                (_, Some(key)) => filters.entry(key).or_default().push(query),
                (Modifier::Love, None) => must.push(query),
                (Modifier::Default, None) => should.push(query),
            }
        }

        let filter = if filters.is_empty() {
            None
        } else {
            let groups = filters
                .into_values()
                .map(|group| {
                    let any = group.into_iter().map(|q| (Occur::Should, q));
                    (Occur::Must, collapse(any.collect()))
                })
                .collect();
            Some(Box::new(BoostQuery::new(collapse(groups), 0.0))
                as Box<dyn Query>)
        };

        let mut parts: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        if must.is_empty() {
            if !should.is_empty() {
                let any = should.into_iter().map(|q| (Occur::Should, q));
                parts.push((Occur::Must, collapse(any.collect())));
            }
        } else {
            parts.extend(must.into_iter().map(|q| (Occur::Must, q)));
            parts.extend(should.into_iter().map(|q| (Occur::Should, q)));
        }
        if let Some(filter) = filter {
            parts.push((Occur::Must, filter));
        }

        if parts.is_empty() {
            if must_not.is_empty() {
                return Ok(None);
            }
            parts.push((Occur::Must, Box::new(AllQuery)));
        }
        parts.extend(must_not.into_iter().map(|q| (Occur::MustNot, q)));

        Ok(combine(parts))
    }

    fn boolean_label(&self, label: Option<&str>) -> Option<&str> {
        label
            .and_then(|l| self.boolean_prefixes.get(l))
            .map(String::as_str)
    }

    /// Resolve a label to a text prefix. Unknown labels are not prefixes:
    /// the label is folded back into the text instead.
    fn text_target(&self, label: Option<&str>, text: &str) -> (String, String) {
        match label {
            None => (String::new(), text.to_string()),
            Some(l) => match self.text_prefixes.get(l) {
                Some(prefix) => (prefix.clone(), text.to_string()),
                None => (String::new(), format!("{l}:{text}")),
            },
        }
    }

    fn word_query(
        &mut self,
        label: Option<&str>,
        text: &str,
        stoppable: bool,
    ) -> Option<Box<dyn Query>> {
        let (prefix, text) = self.text_target(label, text);
        let mut words = self.generator.words(&text);

        if words.len() > 1 {
            return self.positional_query(&prefix, &words);
        }
        let word = words.pop()?;

        if stoppable && self.stopper.is_stopword(&word) {
            tracing::trace!(word, "dropped stop-word");
            return None;
        }

        let explicit = text.chars().next().is_some_and(char::is_uppercase);
        let term = match self.strategy {
            StemStrategy::None => tantivy_index::raw_term(&prefix, &word),
            StemStrategy::Some if explicit => {
                tantivy_index::raw_term(&prefix, &word)
            }
            StemStrategy::Some | StemStrategy::All => {
                let stem = self.generator.stem(&word);
                tantivy_index::stemmed_term(&prefix, &stem)
            }
        };

        Some(Box::new(TermQuery::new(
            Term::from_field_text(self.fields.terms, &term),
            IndexRecordOption::WithFreqs,
        )))
    }

    fn phrase_query(
        &mut self,
        label: Option<&str>,
        text: &str,
    ) -> Option<Box<dyn Query>> {
        let (prefix, text) = match label {
            Some(l) if !self.text_prefixes.contains_key(l) => {
                (String::new(), format!("{l} {text}"))
            }
            _ => self.text_target(label, text),
        };
        let words = self.generator.words(&text);
        self.positional_query(&prefix, &words)
    }

    fn positional_query(
        &self,
        prefix: &str,
        words: &[String],
    ) -> Option<Box<dyn Query>> {
        let mut terms: Vec<Term> = words
            .iter()
            .map(|w| {
                Term::from_field_text(
                    self.fields.terms,
                    &tantivy_index::raw_term(prefix, w),
                )
            })
            .collect();

        match terms.len() {
            0 => None,
            1 => Some(Box::new(TermQuery::new(
                terms.remove(0),
                IndexRecordOption::WithFreqs,
            ))),
            _ => Some(Box::new(PhraseQuery::new(terms))),
        }
    }

    fn range_query(
        &self,
        begin: &str,
        end: &str,
    ) -> Result<(u32, Box<dyn Query>)> {
        let Some((slot, bounds)) = self
            .ranges
            .iter()
            .find_map(|p| p.claim(begin, end).map(|b| (p.slot, b)))
        else {
            return Err(Error::QueryParse(format!(
                "unknown range operation '{begin}..{end}'"
            )));
        };

        let (lowest, highest) = sortable::slot_bounds(slot);
        let low = match bounds.low {
            Some(v) => sortable::slot_term(slot, v)?,
            None => lowest,
        };
        let high = match bounds.high {
            Some(v) => sortable::slot_term(slot, v)?,
            None => highest,
        };

        let query = RangeQuery::new(
            Bound::Included(Term::from_field_text(self.fields.slots, &low)),
            Bound::Included(Term::from_field_text(self.fields.slots, &high)),
        );
        Ok((slot, Box::new(query)))
    }
}

impl ConfigurePrefixes for QueryParser {
    fn add_prefix(&mut self, label: &str, prefix: &str) {
        self.text_prefixes
            .insert(label.to_string(), prefix.to_string());
    }

    fn add_boolean_prefix(&mut self, label: &str, prefix: &str) {
        self.boolean_prefixes
            .insert(label.to_string(), prefix.to_string());
    }

    fn add_range_processor(&mut self, processor: RangeProcessor) {
        self.ranges.push(processor);
    }
}

impl std::fmt::Debug for QueryParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryParser")
            .field("strategy", &self.strategy)
            .field("text_prefixes", &self.text_prefixes)
            .field("boolean_prefixes", &self.boolean_prefixes)
            .field("ranges", &self.ranges)
            .finish_non_exhaustive()
    }
}

/// A single sub-query stands on its own; several become a boolean query.
fn collapse(mut parts: Vec<(Occur, Box<dyn Query>)>) -> Box<dyn Query> {
    if parts.len() == 1 && parts[0].0 != Occur::MustNot {
        return parts.remove(0).1;
    }
    Box::new(BooleanQuery::new(parts))
}

fn combine(parts: Vec<(Occur, Box<dyn Query>)>) -> Option<Box<dyn Query>> {
    if parts.is_empty() {
        None
    } else {
        Some(collapse(parts))
    }
}
