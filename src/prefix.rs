//! Application-wide mapping from query labels to index prefixes.
//!
//! A [`PrefixRegistry`] is filled once at startup and then shared, through
//! an `Arc`, with every [`QueryExecutor`](crate::query::QueryExecutor). A
//! shared registry is immutable, so queries never see it change while they
//! run. For programs that prefer a single ambient instance,
//! [`PrefixRegistry::global`] hands out the process-wide one.
//!
//! ```
//! use docket::prefix::{PrefixRegistry, RangeProcessorKind};
//!
//! let mut registry = PrefixRegistry::new();
//! registry
//!     .add_boolean_prefix("gender", "XG")?
//!     .add_text_prefix("keyword", "K")?
//!     .add_slot_prefix(0, "XY:", RangeProcessorKind::NumericRange);
//! assert_eq!(registry.text_prefix("keyword"), Some("K"));
//! # Ok::<(), docket::Error>(())
//! ```

use std::{
    fmt,
    str::FromStr,
    sync::{Arc, LazyLock, PoisonError, RwLock},
};

use crate::{
    config::PrefixConfig,
    error::{Error, Result},
    query_parser::{ConfigurePrefixes, RangeProcessor},
};

static GLOBAL: LazyLock<RwLock<Arc<PrefixRegistry>>> =
    LazyLock::new(|| RwLock::new(Arc::new(PrefixRegistry::new())));

/// How a numbered slot is exposed to range queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RangeProcessorKind {
    /// `begin..end` over numbers, compared in numeric order.
    NumericRange,
}

impl FromStr for RangeProcessorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "numeric" | "numeric-range" | "numeric_range" | "number" => {
                Ok(RangeProcessorKind::NumericRange)
            }
            _ => Err(Error::InvalidRangeProcessorKind(s.to_string())),
        }
    }
}

impl fmt::Display for RangeProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeProcessorKind::NumericRange => f.write_str("numeric"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPrefix {
    pub prefix: String,
    pub kind: RangeProcessorKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixRegistry {
    text: Vec<(String, String)>,
    boolean: Vec<(String, String)>,
    slots: Vec<(u32, SlotPrefix)>,
}

impl PrefixRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration, validating every slot kind
    /// before anything is registered.
    pub fn from_config(config: &PrefixConfig) -> Result<Self> {
        let slot_kinds = config
            .slots
            .iter()
            .map(|s| s.kind.parse::<RangeProcessorKind>())
            .collect::<Result<Vec<_>>>()?;

        let mut registry = Self::new();
        for (label, prefix) in &config.text {
            registry.add_text_prefix(label, prefix)?;
        }
        for (label, prefix) in &config.boolean {
            registry.add_boolean_prefix(label, prefix)?;
        }
        for (slot, kind) in config.slots.iter().zip(slot_kinds) {
            registry.add_slot_prefix(slot.slot, &slot.prefix, kind);
        }
        Ok(registry)
    }

    /// The process-wide registry. Empty until
    /// [`install_global`](Self::install_global) is called.
    pub fn global() -> Arc<PrefixRegistry> {
        GLOBAL
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the process-wide registry. Executors created earlier keep
    /// the registry they were handed.
    pub fn install_global(registry: PrefixRegistry) {
        *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(registry);
    }

    /// Restore the process-wide registry to an empty one.
    pub fn reset_global() {
        Self::install_global(PrefixRegistry::new());
    }

    pub fn add_text_prefix(
        &mut self,
        label: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Result<&mut Self> {
        upsert(&mut self.text, non_empty(label.into())?, prefix.into());
        Ok(self)
    }

    pub fn add_boolean_prefix(
        &mut self,
        label: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Result<&mut Self> {
        upsert(&mut self.boolean, non_empty(label.into())?, prefix.into());
        Ok(self)
    }

    pub fn add_slot_prefix(
        &mut self,
        slot: u32,
        prefix: impl Into<String>,
        kind: RangeProcessorKind,
    ) -> &mut Self {
        let entry = SlotPrefix {
            prefix: prefix.into(),
            kind,
        };
        upsert(&mut self.slots, slot, entry);
        self
    }

    /// Register a slot from a kind name, as read from configuration.
    /// Unknown kinds leave the registry untouched.
    pub fn try_add_slot_prefix(
        &mut self,
        slot: u32,
        prefix: impl Into<String>,
        kind: &str,
    ) -> Result<&mut Self> {
        let kind = kind.parse()?;
        Ok(self.add_slot_prefix(slot, prefix, kind))
    }

    /// Apply every mapping to `parser`: text prefixes first, then boolean
    /// prefixes, then range processors.
    pub fn configure<P>(&self, parser: &mut P) -> &Self
    where
        P: ConfigurePrefixes + ?Sized,
    {
        for (label, prefix) in &self.text {
            parser.add_prefix(label, prefix);
        }
        for (label, prefix) in &self.boolean {
            parser.add_boolean_prefix(label, prefix);
        }
        for (slot, entry) in &self.slots {
            match entry.kind {
                RangeProcessorKind::NumericRange => parser
                    .add_range_processor(RangeProcessor::numeric(
                        *slot,
                        &entry.prefix,
                    )),
            }
        }
        self
    }

    pub fn text_prefix(&self, label: &str) -> Option<&str> {
        lookup(&self.text, label)
    }

    pub fn boolean_prefix(&self, label: &str) -> Option<&str> {
        lookup(&self.boolean, label)
    }

    pub fn slot_prefix(&self, slot: u32) -> Option<&SlotPrefix> {
        self.slots
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, entry)| entry)
    }

    pub fn text_prefixes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.text.iter().map(|(l, p)| (l.as_str(), p.as_str()))
    }

    pub fn boolean_prefixes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.boolean.iter().map(|(l, p)| (l.as_str(), p.as_str()))
    }

    pub fn slot_prefixes(&self) -> impl Iterator<Item = (u32, &SlotPrefix)> {
        self.slots.iter().map(|(s, entry)| (*s, entry))
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.boolean.is_empty() && self.slots.is_empty()
    }
}

fn non_empty(label: String) -> Result<String> {
    if label.is_empty() {
        return Err(Error::EmptyLabel);
    }
    Ok(label)
}

// Last write wins, first insertion keeps its place.
fn upsert<K: PartialEq, V>(entries: &mut Vec<(K, V)>, key: K, value: V) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

fn lookup<'a>(entries: &'a [(String, String)], label: &str) -> Option<&'a str> {
    entries
        .iter()
        .find(|(l, _)| l == label)
        .map(|(_, p)| p.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlotConfig;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl ConfigurePrefixes for Recorder {
        fn add_prefix(&mut self, label: &str, prefix: &str) {
            self.calls.push(format!("text {label}={prefix}"));
        }

        fn add_boolean_prefix(&mut self, label: &str, prefix: &str) {
            self.calls.push(format!("boolean {label}={prefix}"));
        }

        fn add_range_processor(&mut self, processor: RangeProcessor) {
            self.calls.push(format!(
                "range {}={}",
                processor.slot(),
                processor.prefix()
            ));
        }
    }

    fn sample() -> PrefixRegistry {
        let mut registry = PrefixRegistry::new();
        registry
            .add_slot_prefix(0, "XY:", RangeProcessorKind::NumericRange)
            .add_boolean_prefix("gender", "XG")
            .unwrap()
            .add_text_prefix("keyword", "K")
            .unwrap()
            .add_text_prefix("title", "S")
            .unwrap();
        registry
    }

    #[test]
    fn last_write_wins() {
        let mut registry = sample();
        registry.add_text_prefix("keyword", "XK").unwrap();
        assert_eq!(registry.text_prefix("keyword"), Some("XK"));
        assert_eq!(registry.text_prefixes().count(), 2);

        registry.add_slot_prefix(0, "price:", RangeProcessorKind::NumericRange);
        assert_eq!(registry.slot_prefix(0).unwrap().prefix, "price:");
        assert_eq!(registry.slot_prefixes().count(), 1);
    }

    #[test]
    fn empty_label_rejected() {
        let mut registry = PrefixRegistry::new();
        assert!(matches!(
            registry.add_text_prefix("", "S"),
            Err(Error::EmptyLabel)
        ));
        assert!(matches!(
            registry.add_boolean_prefix("", "XC"),
            Err(Error::EmptyLabel)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn invalid_kind_leaves_registry_untouched() {
        let mut registry = sample();
        let before = registry.clone();

        let err = registry.try_add_slot_prefix(5, "date:", "date").unwrap_err();
        assert!(
            matches!(err, Error::InvalidRangeProcessorKind(kind) if kind == "date")
        );
        assert_eq!(registry, before);

        registry.try_add_slot_prefix(5, "n:", "numeric").unwrap();
        assert_eq!(
            registry.slot_prefix(5).unwrap().kind,
            RangeProcessorKind::NumericRange
        );
    }

    #[test]
    fn configure_applies_text_then_boolean_then_slots() {
        let registry = sample();
        let mut recorder = Recorder::default();
        registry.configure(&mut recorder);

        assert_eq!(
            recorder.calls,
            vec![
                "text keyword=K",
                "text title=S",
                "boolean gender=XG",
                "range 0=XY:",
            ]
        );
    }

    #[test]
    fn configure_is_repeatable() {
        let registry = sample();
        let mut first = Recorder::default();
        let mut second = Recorder::default();
        registry.configure(&mut first).configure(&mut second);
        assert_eq!(first.calls, second.calls);
        assert_eq!(registry, sample());
    }

    #[test]
    fn from_config_validates_kinds_first() {
        let mut config = PrefixConfig::default();
        config.text.insert("title".into(), "S".into());
        config.slots.push(SlotConfig {
            slot: 1,
            prefix: "price:".into(),
            kind: "numeric".into(),
        });
        let registry = PrefixRegistry::from_config(&config).unwrap();
        assert_eq!(registry.text_prefix("title"), Some("S"));
        assert_eq!(registry.slot_prefix(1).unwrap().prefix, "price:");

        config.slots.push(SlotConfig {
            slot: 2,
            prefix: "when:".into(),
            kind: "date".into(),
        });
        assert!(matches!(
            PrefixRegistry::from_config(&config),
            Err(Error::InvalidRangeProcessorKind(_))
        ));
    }

    #[test]
    fn global_instance_install_and_reset() {
        PrefixRegistry::reset_global();
        assert!(PrefixRegistry::global().is_empty());

        PrefixRegistry::install_global(sample());
        let snapshot = PrefixRegistry::global();
        assert_eq!(snapshot.text_prefix("title"), Some("S"));

        PrefixRegistry::reset_global();
        assert!(PrefixRegistry::global().is_empty());
        // Snapshots taken earlier are unaffected.
        assert_eq!(snapshot.text_prefix("title"), Some("S"));
    }
}
