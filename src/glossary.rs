/*!
 * Glossary of required term translations.
 *
 * The glossary is an ordered list of `src -> dst` pairs supplied by the
 * termbase. It is read-only for the duration of a session and shared by
 * the detector and the prompt builders.
 */

use serde::{Deserialize, Serialize};

/// One required term translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    /// Term as it appears in the source text
    pub src: String,
    /// Term that must appear in the destination text
    pub dst: String,
    /// Disabled entries are kept in configuration but never enforced
    #[serde(default = "default_enable")]
    pub enable: bool,
}

fn default_enable() -> bool {
    true
}

impl GlossaryEntry {
    /// Create an enabled entry
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            enable: true,
        }
    }

    fn is_enforced(&self) -> bool {
        self.enable && !self.src.trim().is_empty() && !self.dst.trim().is_empty()
    }
}

/// Ordered set of enforced term translations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<GlossaryEntry>", from = "Vec<GlossaryEntry>")]
pub struct Glossary {
    entries: Vec<GlossaryEntry>,
}

impl From<Vec<GlossaryEntry>> for Glossary {
    fn from(entries: Vec<GlossaryEntry>) -> Self {
        Self::new(entries)
    }
}

impl From<Glossary> for Vec<GlossaryEntry> {
    fn from(glossary: Glossary) -> Self {
        glossary.entries
    }
}

impl Glossary {
    /// Build a glossary, dropping disabled and blank entries
    pub fn new(entries: impl IntoIterator<Item = GlossaryEntry>) -> Self {
        Self {
            entries: entries.into_iter().filter(|e| e.is_enforced()).collect(),
        }
    }

    /// All enforced entries in configured order
    pub fn entries(&self) -> &[GlossaryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries whose source term occurs in `source_text`
    pub fn relevant_to<'a>(&'a self, source_text: &'a str) -> impl Iterator<Item = &'a GlossaryEntry> + 'a {
        self.entries.iter().filter(move |e| source_text.contains(&e.src))
    }

    /// Entries whose source term occurs in `source_text` but whose
    /// destination term is missing from `destination_text`
    pub fn missed_in<'a>(
        &'a self,
        source_text: &'a str,
        destination_text: &'a str,
    ) -> impl Iterator<Item = &'a GlossaryEntry> + 'a {
        self.relevant_to(source_text)
            .filter(move |e| !destination_text.contains(&e.dst))
    }
}
