use std::collections::HashSet;

use stop_words::{LANGUAGE, get};

use crate::tantivy_index::StemLanguage;

/// A set of words dropped from optional query clauses.
///
/// Stop-words are matched against the lower-cased query word before
/// stemming. The default stopper is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stopper {
    words: HashSet<String>,
}

impl Stopper {
    pub fn new() -> Self {
        Self::default()
    }

    /// The published stop list for `language`. Languages without one
    /// (and [`StemLanguage::None`]) give an empty stopper.
    pub fn for_language(language: StemLanguage) -> Self {
        match stop_list(language) {
            Some(list) => Self::from_words(get(list).iter()),
            None => Self::new(),
        }
    }

    pub fn english() -> Self {
        Self::for_language(StemLanguage::English)
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stopper = Self::new();
        for word in words {
            stopper.add(word);
        }
        stopper
    }

    pub fn add(&mut self, word: impl AsRef<str>) -> &mut Self {
        let word = word.as_ref().trim().to_lowercase();
        if !word.is_empty() {
            self.words.insert(word);
        }
        self
    }

    pub fn is_stopword(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

fn stop_list(language: StemLanguage) -> Option<LANGUAGE> {
    Some(match language {
        StemLanguage::None | StemLanguage::Tamil => return None,
        StemLanguage::Arabic => LANGUAGE::Arabic,
        StemLanguage::Danish => LANGUAGE::Danish,
        StemLanguage::Dutch => LANGUAGE::Dutch,
        StemLanguage::English => LANGUAGE::English,
        StemLanguage::Finnish => LANGUAGE::Finnish,
        StemLanguage::French => LANGUAGE::French,
        StemLanguage::German => LANGUAGE::German,
        StemLanguage::Greek => LANGUAGE::Greek,
        StemLanguage::Hungarian => LANGUAGE::Hungarian,
        StemLanguage::Italian => LANGUAGE::Italian,
        StemLanguage::Norwegian => LANGUAGE::Norwegian,
        StemLanguage::Portuguese => LANGUAGE::Portuguese,
        StemLanguage::Romanian => LANGUAGE::Romanian,
        StemLanguage::Russian => LANGUAGE::Russian,
        StemLanguage::Spanish => LANGUAGE::Spanish,
        StemLanguage::Swedish => LANGUAGE::Swedish,
        StemLanguage::Turkish => LANGUAGE::Turkish,
    })
}
