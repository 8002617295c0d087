use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use tantivy::{
    Index,
    TantivyDocument,
    directory::MmapDirectory,
    schema::*,
    tokenizer::{
        Language,
        LowerCaser,
        PreTokenizedString,
        RawTokenizer,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        TextAnalyzer,
        Token,
        TokenStream,
    },
};

use crate::{
    error::{Error, Result},
    sortable,
};

/// Field names used in the schema.
pub mod fields {
    pub const DOCID: &str = "docid";
    pub const TERMS: &str = "terms";
    pub const BOOLEAN: &str = "boolean";
    pub const SLOTS: &str = "slots";
    pub const RECORD: &str = "record";
    pub const DATA: &str = "data";
}

/// Marker placed in front of stemmed terms, ahead of the field prefix.
pub const STEM_MARKER: &str = "Z";

/// Resolved field handles for the schema.
#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
    pub docid: Field,
    pub terms: Field,
    pub boolean: Field,
    pub slots: Field,
    pub record: Field,
    pub data: Field,
}

impl IndexFields {
    pub fn resolve(schema: &Schema) -> Result<Self> {
        Ok(Self {
            docid: schema.get_field(fields::DOCID)?,
            terms: schema.get_field(fields::TERMS)?,
            boolean: schema.get_field(fields::BOOLEAN)?,
            slots: schema.get_field(fields::SLOTS)?,
            record: schema.get_field(fields::RECORD)?,
            data: schema.get_field(fields::DATA)?,
        })
    }
}

pub fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_u64_field(fields::DOCID, INDEXED | STORED | FAST);

    // Terms arrive pre-tokenized, so the tokenizer named here never runs.
    let terms_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("raw")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    builder.add_text_field(fields::TERMS, terms_opts);

    builder.add_text_field(fields::BOOLEAN, STRING);
    builder.add_text_field(fields::SLOTS, STRING);
    builder.add_text_field(fields::RECORD, STORED);
    builder.add_bytes_field(fields::DATA, STORED);

    builder.build()
}

/// Open an index that must already exist.
pub fn open_existing(dir: &Path) -> Result<Index> {
    let not_found = || Error::NotFound {
        kind: "index",
        name: dir.display().to_string(),
    };

    if !dir.is_dir() {
        return Err(not_found());
    }

    let mmap_dir = MmapDirectory::open(dir)?;
    if !Index::exists(&mmap_dir)
        .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
    {
        return Err(not_found());
    }

    Ok(Index::open(mmap_dir)?)
}

/// Open the index at `dir`, creating the directory and index when missing.
pub fn open_or_create(dir: &Path) -> Result<Index> {
    std::fs::create_dir_all(dir)?;
    let mmap_dir = MmapDirectory::open(dir)?;
    Ok(Index::open_or_create(mmap_dir, build_schema())?)
}

/// Snowball stemming languages understood by the term generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StemLanguage {
    None,
    Arabic,
    Danish,
    Dutch,
    #[default]
    English,
    Finnish,
    French,
    German,
    Greek,
    Hungarian,
    Italian,
    Norwegian,
    Portuguese,
    Romanian,
    Russian,
    Spanish,
    Swedish,
    Tamil,
    Turkish,
}

impl StemLanguage {
    fn language(self) -> Option<Language> {
        Some(match self {
            StemLanguage::None => return None,
            StemLanguage::Arabic => Language::Arabic,
            StemLanguage::Danish => Language::Danish,
            StemLanguage::Dutch => Language::Dutch,
            StemLanguage::English => Language::English,
            StemLanguage::Finnish => Language::Finnish,
            StemLanguage::French => Language::French,
            StemLanguage::German => Language::German,
            StemLanguage::Greek => Language::Greek,
            StemLanguage::Hungarian => Language::Hungarian,
            StemLanguage::Italian => Language::Italian,
            StemLanguage::Norwegian => Language::Norwegian,
            StemLanguage::Portuguese => Language::Portuguese,
            StemLanguage::Romanian => Language::Romanian,
            StemLanguage::Russian => Language::Russian,
            StemLanguage::Spanish => Language::Spanish,
            StemLanguage::Swedish => Language::Swedish,
            StemLanguage::Tamil => Language::Tamil,
            StemLanguage::Turkish => Language::Turkish,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            StemLanguage::None => "none",
            StemLanguage::Arabic => "arabic",
            StemLanguage::Danish => "danish",
            StemLanguage::Dutch => "dutch",
            StemLanguage::English => "english",
            StemLanguage::Finnish => "finnish",
            StemLanguage::French => "french",
            StemLanguage::German => "german",
            StemLanguage::Greek => "greek",
            StemLanguage::Hungarian => "hungarian",
            StemLanguage::Italian => "italian",
            StemLanguage::Norwegian => "norwegian",
            StemLanguage::Portuguese => "portuguese",
            StemLanguage::Romanian => "romanian",
            StemLanguage::Russian => "russian",
            StemLanguage::Spanish => "spanish",
            StemLanguage::Swedish => "swedish",
            StemLanguage::Tamil => "tamil",
            StemLanguage::Turkish => "turkish",
        }
    }
}

impl FromStr for StemLanguage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lang = match s.trim().to_lowercase().as_str() {
            "" | "none" => StemLanguage::None,
            "ar" | "arabic" => StemLanguage::Arabic,
            "da" | "danish" => StemLanguage::Danish,
            "nl" | "dutch" => StemLanguage::Dutch,
            "en" | "english" => StemLanguage::English,
            "fi" | "finnish" => StemLanguage::Finnish,
            "fr" | "french" => StemLanguage::French,
            "de" | "german" => StemLanguage::German,
            "el" | "greek" => StemLanguage::Greek,
            "hu" | "hungarian" => StemLanguage::Hungarian,
            "it" | "italian" => StemLanguage::Italian,
            "no" | "nb" | "norwegian" => StemLanguage::Norwegian,
            "pt" | "portuguese" => StemLanguage::Portuguese,
            "ro" | "romanian" => StemLanguage::Romanian,
            "ru" | "russian" => StemLanguage::Russian,
            "es" | "spanish" => StemLanguage::Spanish,
            "sv" | "swedish" => StemLanguage::Swedish,
            "ta" | "tamil" => StemLanguage::Tamil,
            "tr" | "turkish" => StemLanguage::Turkish,
            _ => return Err(Error::UnknownStemLanguage(s.to_string())),
        };
        Ok(lang)
    }
}

impl fmt::Display for StemLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Splits text into words and stems them with the configured language.
///
/// Used on both sides of the index: when a record is committed every word
/// produces a raw term and a stemmed term at the same position, and the
/// query parser uses the same analyzers so the two always agree.
pub struct TermGenerator {
    words: TextAnalyzer,
    stemmer: Option<TextAnalyzer>,
}

impl TermGenerator {
    pub fn new(language: StemLanguage) -> Self {
        let words = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .build();
        let stemmer = language.language().map(|lang| {
            TextAnalyzer::builder(RawTokenizer::default())
                .filter(Stemmer::new(lang))
                .build()
        });
        Self { words, stemmer }
    }

    /// Lower-cased words of `text`, in order.
    pub fn words(&mut self, text: &str) -> Vec<String> {
        let mut stream = self.words.token_stream(text);
        let mut out = Vec::new();
        while let Some(token) = stream.next() {
            out.push(token.text.clone());
        }
        out
    }

    /// Stem a single lower-cased word. Without a language the word is
    /// returned unchanged.
    pub fn stem(&mut self, word: &str) -> String {
        let Some(stemmer) = self.stemmer.as_mut() else {
            return word.to_string();
        };
        let mut stream = stemmer.token_stream(word);
        match stream.next() {
            Some(token) => token.text.clone(),
            None => word.to_string(),
        }
    }

    /// Generate the positional terms for one text value under `prefix`.
    pub fn index_text(
        &mut self,
        text: &str,
        prefix: &str,
    ) -> PreTokenizedString {
        let mut words = Vec::new();
        {
            let mut stream = self.words.token_stream(text);
            while let Some(token) = stream.next() {
                words.push(token.clone());
            }
        }

        let mut tokens = Vec::with_capacity(words.len() * 2);
        for word in words {
            let stem = self.stem(&word.text);
            tokens.push(Token {
                offset_from: word.offset_from,
                offset_to: word.offset_to,
                position: word.position,
                text: raw_term(prefix, &word.text),
                position_length: 1,
            });
            tokens.push(Token {
                offset_from: word.offset_from,
                offset_to: word.offset_to,
                position: word.position,
                text: stemmed_term(prefix, &stem),
                position_length: 1,
            });
        }

        PreTokenizedString {
            text: text.to_string(),
            tokens,
        }
    }
}

impl fmt::Debug for TermGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermGenerator")
            .field("stemming", &self.stemmer.is_some())
            .finish_non_exhaustive()
    }
}

pub fn raw_term(prefix: &str, word: &str) -> String {
    format!("{prefix}{word}")
}

pub fn stemmed_term(prefix: &str, stem: &str) -> String {
    format!("{STEM_MARKER}{prefix}{stem}")
}

/// A text value as committed, keyed by its prefix (`None` = unprefixed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextField {
    pub prefix: Option<String>,
    pub value: String,
}

/// The committed content of a record, stored alongside its terms so a match
/// can hand it back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub text: Vec<TextField>,
    pub boolean_terms: Vec<String>,
    pub slots: Vec<(u32, f64)>,
}

impl StoredRecord {
    /// Text stored under `prefix` (`None` for unprefixed text).
    pub fn text(&self, prefix: Option<&str>) -> Option<&str> {
        self.text
            .iter()
            .find(|t| t.prefix.as_deref() == prefix)
            .map(|t| t.value.as_str())
    }

    pub fn slot(&self, slot: u32) -> Option<f64> {
        self.slots
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, v)| *v)
    }
}

/// Everything a search hit carries, read back from the stored fields.
pub fn read_stored(
    doc: &TantivyDocument,
    fields: &IndexFields,
) -> Result<(u64, StoredRecord, Option<Vec<u8>>)> {
    let docid = doc
        .get_first(fields.docid)
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let record = match doc.get_first(fields.record).and_then(|v| v.as_str())
    {
        Some(json) => serde_json::from_str(json)?,
        None => StoredRecord::default(),
    };
    let data = doc
        .get_first(fields.data)
        .and_then(|v| v.as_bytes())
        .map(<[u8]>::to_vec);
    Ok((docid, record, data))
}

/// Assemble the complete engine document for a record.
///
/// Nothing here touches the index; the caller performs the single upsert
/// once this has succeeded.
pub fn stage_document(
    fields: &IndexFields,
    generator: &mut TermGenerator,
    docid: u64,
    record: &StoredRecord,
    data: Option<&[u8]>,
) -> Result<TantivyDocument> {
    let mut doc = TantivyDocument::default();
    doc.add_u64(fields.docid, docid);

    for field in &record.text {
        let prefix = field.prefix.as_deref().unwrap_or("");
        let tokens = generator.index_text(&field.value, prefix);
        doc.add_pre_tokenized_text(fields.terms, tokens);
    }

    for term in &record.boolean_terms {
        doc.add_text(fields.boolean, term);
    }

    for (slot, value) in &record.slots {
        doc.add_text(fields.slots, sortable::slot_term(*slot, *value)?);
    }

    doc.add_text(fields.record, serde_json::to_string(record)?);

    if let Some(data) = data {
        doc.add_bytes(fields.data, data);
    }

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_has_all_fields() {
        let schema = build_schema();
        assert!(IndexFields::resolve(&schema).is_ok());
    }

    #[test]
    fn language_names() {
        assert_eq!(
            "english".parse::<StemLanguage>().unwrap(),
            StemLanguage::English
        );
        assert_eq!("FR".parse::<StemLanguage>().unwrap(), StemLanguage::French);
        assert_eq!("none".parse::<StemLanguage>().unwrap(), StemLanguage::None);
        assert!(matches!(
            "klingon".parse::<StemLanguage>(),
            Err(Error::UnknownStemLanguage(_))
        ));
    }

    #[test]
    fn words_are_lowercased() {
        let mut generator = TermGenerator::new(StemLanguage::English);
        assert_eq!(
            generator.words("Red BICYCLE, fast!"),
            vec!["red", "bicycle", "fast"]
        );
    }

    #[test]
    fn stemming_follows_language() {
        let mut english = TermGenerator::new(StemLanguage::English);
        assert_eq!(english.stem("running"), "run");

        let mut plain = TermGenerator::new(StemLanguage::None);
        assert_eq!(plain.stem("running"), "running");
    }

    #[test]
    fn index_text_emits_raw_and_stemmed_terms() {
        let mut generator = TermGenerator::new(StemLanguage::English);
        let tokens = generator.index_text("red bicycles", "S");
        let texts: Vec<&str> =
            tokens.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["Sred", "ZSred", "Sbicycles", "ZSbicycl"]);
        assert_eq!(tokens.tokens[0].position, tokens.tokens[1].position);
        assert!(tokens.tokens[2].position > tokens.tokens[0].position);
    }

    #[test]
    fn stored_record_lookups() {
        let record = StoredRecord {
            text: vec![
                TextField {
                    prefix: None,
                    value: "body".to_string(),
                },
                TextField {
                    prefix: Some("S".to_string()),
                    value: "subject".to_string(),
                },
            ],
            boolean_terms: vec![],
            slots: vec![(0, 1.5)],
        };
        assert_eq!(record.text(None), Some("body"));
        assert_eq!(record.text(Some("S")), Some("subject"));
        assert_eq!(record.text(Some("X")), None);
        assert_eq!(record.slot(0), Some(1.5));
        assert_eq!(record.slot(1), None);
    }

    #[test]
    fn open_existing_requires_index() {
        let tmp = tempfile::tempdir().unwrap();
        let err = open_existing(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "index", .. }));

        let err = open_existing(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn create_then_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");
        open_or_create(&dir).unwrap();
        assert!(open_existing(&dir).is_ok());
        assert!(open_or_create(&dir).is_ok());
    }
}
