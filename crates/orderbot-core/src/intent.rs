//! Order-intent parsing
//!
//! Turns free text such as `"2 naan and remove 1 coke"` into separate add and
//! remove quantities, scoped to the item names of one menu section.
//!
//! Matching is deterministic and best-effort:
//! - items are tried longest name first, and text claimed by a longer item is
//!   never reused by a shorter one (`"chicken biryani"` shadows `"chicken"`);
//! - a removal keyword (`remove`, `cancel`, `delete`, `no`) directly before
//!   the optional quantity turns the match into a removal, otherwise it adds;
//! - a missing quantity means 1, and the per-message quantity of an item is
//!   capped at [`MAX_QUANTITY`];
//! - item names must stand as words, a trailing plural `s`/`es` is allowed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Ceiling for one item's quantity parsed from a single message
pub const MAX_QUANTITY: u32 = 20;

const REMOVE_KEYWORDS: &str = "remove|cancel|delete|no";

/// Item names compiled for matching, longest first
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    terms: Vec<Term>,
}

#[derive(Debug, Clone)]
struct Term {
    name: String,
    pattern: Regex,
}

impl Vocabulary {
    pub fn new<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut terms: Vec<Term> = Vec::new();
        for name in names {
            let name = name.trim().to_lowercase();
            if name.is_empty() || terms.iter().any(|t| t.name == name) {
                continue;
            }
            let source = format!(
                r"(?:\b(?P<remove>{})\b\s*|\b(?P<add>add)\b\s*)?(?P<qty>\d+)?\s*(?P<item>{})",
                REMOVE_KEYWORDS,
                regex::escape(&name)
            );
            match Regex::new(&source) {
                Ok(pattern) => terms.push(Term { name, pattern }),
                Err(e) => tracing::warn!(item = %name, "Skipping unmatchable item: {}", e),
            }
        }
        terms.sort_by(|a, b| b.name.len().cmp(&a.name.len()).then(a.name.cmp(&b.name)));
        Self { terms }
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        self.terms.iter().any(|t| t.name == name)
    }

    /// Item names, longest first
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Item quantities in order of first mention
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantities(Vec<(String, u32)>);

impl Quantities {
    pub fn get(&self, item: &str) -> Option<u32> {
        self.0.iter().find(|(name, _)| name == item).map(|(_, q)| *q)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(name, q)| (name.as_str(), *q))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add `qty` to `item`, saturating at [`MAX_QUANTITY`]. Zero is ignored.
    fn accumulate(&mut self, item: &str, qty: u32) {
        if qty == 0 {
            return;
        }
        match self.0.iter_mut().find(|(name, _)| name == item) {
            Some((_, existing)) => *existing = existing.saturating_add(qty).min(MAX_QUANTITY),
            None => self.0.push((item.to_string(), qty.min(MAX_QUANTITY))),
        }
    }
}

/// Parsed add/remove quantities extracted from one message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub add: Quantities,
    pub remove: Quantities,
}

impl OrderIntent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_add(mut self, item: impl AsRef<str>, qty: u32) -> Self {
        self.add.accumulate(item.as_ref(), qty);
        self
    }

    pub fn with_remove(mut self, item: impl AsRef<str>, qty: u32) -> Self {
        self.remove.accumulate(item.as_ref(), qty);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// The intent that undoes this one: adds become removals and vice versa.
    pub fn inverse(&self) -> Self {
        Self {
            add: self.remove.clone(),
            remove: self.add.clone(),
        }
    }
}

/// Maps text plus a vocabulary onto an [`OrderIntent`]
pub trait IntentParser: Send + Sync {
    fn parse(&self, text: &str, vocabulary: &Vocabulary) -> OrderIntent;
}

/// Deterministic keyword and quantity matcher
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordParser;

impl IntentParser for KeywordParser {
    fn parse(&self, text: &str, vocabulary: &Vocabulary) -> OrderIntent {
        let text = text.to_lowercase();
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let mut hits: Vec<Hit> = Vec::new();

        for term in &vocabulary.terms {
            for caps in term.pattern.captures_iter(&text) {
                let (Some(whole), Some(item)) = (caps.get(0), caps.name("item")) else {
                    continue;
                };
                if !starts_word(&text, item.start()) {
                    continue;
                }
                let Some(end) = word_end(&text, item.end()) else {
                    continue;
                };
                let span = (whole.start(), end);
                if claimed.iter().any(|&c| overlaps(c, span)) {
                    continue;
                }
                claimed.push(span);

                let qty = match caps.name("qty") {
                    Some(q) => q.as_str().parse::<u32>().unwrap_or(MAX_QUANTITY),
                    None => 1,
                };
                hits.push(Hit {
                    position: whole.start(),
                    item: term.name.clone(),
                    qty,
                    removal: caps.name("remove").is_some(),
                });
            }
        }

        hits.sort_by_key(|h| h.position);
        let mut intent = OrderIntent::default();
        for hit in hits {
            if hit.removal {
                intent.remove.accumulate(&hit.item, hit.qty);
            } else {
                intent.add.accumulate(&hit.item, hit.qty);
            }
        }

        tracing::debug!(?intent, "Parsed order intent");
        intent
    }
}

struct Hit {
    position: usize,
    item: String,
    qty: u32,
    removal: bool,
}

fn overlaps(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

fn starts_word(text: &str, at: usize) -> bool {
    text[..at]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphabetic())
}

/// End of the matched word, allowing a plural suffix; `None` when the item
/// name is only the prefix of a longer word.
fn word_end(text: &str, at: usize) -> Option<usize> {
    let rest = &text[at..];
    for suffix in ["es", "s", ""] {
        if let Some(after) = rest.strip_prefix(suffix) {
            if after.chars().next().map_or(true, |c| !c.is_alphabetic()) {
                return Some(at + suffix.len());
            }
        }
    }
    None
}

/// Secondary interpreter consulted when keyword matching finds nothing.
///
/// Implementations return item to quantity, or `None` when they cannot help.
pub trait FallbackInterpreter: Send + Sync {
    fn interpret(&self, text: &str, items: &[&str]) -> Option<HashMap<String, u32>>;
}

/// [`KeywordParser`] first, then an optional fallback for empty results
#[derive(Clone, Default)]
pub struct ChainedParser {
    primary: KeywordParser,
    fallback: Option<Arc<dyn FallbackInterpreter>>,
}

impl ChainedParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackInterpreter>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

impl IntentParser for ChainedParser {
    fn parse(&self, text: &str, vocabulary: &Vocabulary) -> OrderIntent {
        let intent = self.primary.parse(text, vocabulary);
        if !intent.is_empty() {
            return intent;
        }
        let Some(fallback) = &self.fallback else {
            return intent;
        };

        let items: Vec<&str> = vocabulary.names().collect();
        let Some(guess) = fallback.interpret(text, &items) else {
            return intent;
        };

        let mut guessed: Vec<(String, u32)> = guess
            .into_iter()
            .map(|(item, qty)| (item.trim().to_lowercase(), qty))
            .filter(|(item, _)| vocabulary.contains(item))
            .collect();
        guessed.sort();

        let mut intent = OrderIntent::default();
        for (item, qty) in guessed {
            intent.add.accumulate(&item, qty);
        }
        tracing::debug!(?intent, "Fallback interpreter supplied intent");
        intent
    }
}
