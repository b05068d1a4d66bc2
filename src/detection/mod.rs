/*!
 * Problem detection.
 *
 * Classifies a translated item against a closed set of defects:
 * - `untranslated`: first pass failed or produced nothing
 * - `residue`: source-script characters survived in the destination text
 * - `glossary_miss`: a required destination term is missing
 *
 * Detection is a pure function of item text, languages and glossary. At
 * most one problem is reported per item, by the priority above, so that no
 * item is ever repaired twice at the same time.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::database::models::{Item, ItemStatus};
use crate::glossary::{Glossary, GlossaryEntry};
use crate::language::{Language, Script};

/// Characters shown in a residue preview
const RESIDUE_PREVIEW_CHARS: usize = 5;

/// Missed terms listed in problem details
const GLOSSARY_DETAIL_TERMS: usize = 3;

/// Kind of defect found in an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    Untranslated,
    Residue,
    GlossaryMiss,
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefectKind::Untranslated => write!(f, "untranslated"),
            DefectKind::Residue => write!(f, "residue"),
            DefectKind::GlossaryMiss => write!(f, "glossary_miss"),
        }
    }
}

/// A detected defect with the context that explains it
#[derive(Debug, Clone, PartialEq)]
pub enum Defect {
    /// No usable destination text
    Untranslated,
    /// Source-script characters in the destination text
    Residue {
        /// Number of offending characters
        count: usize,
        /// Offending characters as a share of non-whitespace characters
        ratio: f64,
        /// First offending characters
        preview: String,
    },
    /// Required terms missing from the destination text
    GlossaryMiss {
        /// Entries whose destination term is missing
        missed: Vec<GlossaryEntry>,
    },
}

impl Defect {
    pub fn kind(&self) -> DefectKind {
        match self {
            Defect::Untranslated => DefectKind::Untranslated,
            Defect::Residue { .. } => DefectKind::Residue,
            Defect::GlossaryMiss { .. } => DefectKind::GlossaryMiss,
        }
    }

    /// Human readable description
    pub fn details(&self) -> String {
        match self {
            Defect::Untranslated => "No usable translation".to_string(),
            Defect::Residue {
                count,
                ratio,
                preview,
            } => format!(
                "{} untranslated source characters ({:.1}% of text): {}",
                count,
                ratio * 100.0,
                preview
            ),
            Defect::GlossaryMiss { missed } => {
                let listed: Vec<String> = missed
                    .iter()
                    .take(GLOSSARY_DETAIL_TERMS)
                    .map(|e| format!("{} -> {}", e.src, e.dst))
                    .collect();
                let mut details = format!("Missing glossary terms: {}", listed.join(", "));
                if missed.len() > GLOSSARY_DETAIL_TERMS {
                    details.push_str(&format!(" (+{} more)", missed.len() - GLOSSARY_DETAIL_TERMS));
                }
                details
            }
        }
    }
}

/// An item paired with the defect found in it
#[derive(Debug, Clone, PartialEq)]
pub struct FixProblem {
    /// Snapshot of the item at detection time
    pub item: Item,
    /// What is wrong with it
    pub defect: Defect,
}

impl FixProblem {
    pub fn kind(&self) -> DefectKind {
        self.defect.kind()
    }

    pub fn details(&self) -> String {
        self.defect.details()
    }
}

/// Detects defects in translated items
#[derive(Debug, Clone)]
pub struct ProblemDetector {
    source_language: Language,
    target_language: Language,
    residue_scripts: Vec<Script>,
    glossary: Arc<Glossary>,
}

impl ProblemDetector {
    pub fn new(source_language: Language, target_language: Language, glossary: Arc<Glossary>) -> Self {
        Self {
            source_language,
            target_language,
            residue_scripts: source_language.residue_scripts(target_language),
            glossary,
        }
    }

    pub fn source_language(&self) -> Language {
        self.source_language
    }

    pub fn target_language(&self) -> Language {
        self.target_language
    }

    /// The most important defect of an item, if any
    ///
    /// Items that were never attempted are not inspected.
    pub fn detect(&self, item: &Item) -> Option<FixProblem> {
        let defect = match item.status {
            ItemStatus::Pending => return None,
            ItemStatus::Failed => Some(Defect::Untranslated),
            ItemStatus::Done => self.check_untranslated(item).or_else(|| {
                self.check_residue(&item.destination_text)
                    .or_else(|| self.check_glossary(&item.source_text, &item.destination_text))
            }),
        }?;

        Some(FixProblem {
            item: item.clone(),
            defect,
        })
    }

    /// Problems for every defective item, in input order
    pub fn detect_all(&self, items: &[Item]) -> Vec<FixProblem> {
        items.iter().filter_map(|item| self.detect(item)).collect()
    }

    /// Whether `candidate` is free of the given defect kind
    pub fn is_cleared(&self, kind: DefectKind, source_text: &str, candidate: &str) -> bool {
        match kind {
            DefectKind::Untranslated => !candidate.trim().is_empty(),
            DefectKind::Residue => self.check_residue(candidate).is_none(),
            DefectKind::GlossaryMiss => self.check_glossary(source_text, candidate).is_none(),
        }
    }

    fn check_untranslated(&self, item: &Item) -> Option<Defect> {
        let blank = item.destination_text.trim().is_empty() && !item.source_text.trim().is_empty();
        blank.then_some(Defect::Untranslated)
    }

    /// Residue check over the destination text alone
    pub fn check_residue(&self, text: &str) -> Option<Defect> {
        if self.residue_scripts.is_empty() {
            return None;
        }

        let offending: Vec<&str> = self
            .residue_scripts
            .iter()
            .flat_map(|script| script.find_chars(text))
            .collect();
        if offending.is_empty() {
            return None;
        }

        // Preview in text order rather than script order
        let preview: String = text
            .chars()
            .filter(|c| self.residue_scripts.iter().any(|s| s.is_present(c.encode_utf8(&mut [0; 4]))))
            .take(RESIDUE_PREVIEW_CHARS)
            .collect();
        let total = text.chars().filter(|c| !c.is_whitespace()).count().max(1);

        Some(Defect::Residue {
            count: offending.len(),
            ratio: offending.len() as f64 / total as f64,
            preview,
        })
    }

    /// Glossary check of a destination text against its source text
    pub fn check_glossary(&self, source_text: &str, destination_text: &str) -> Option<Defect> {
        let missed: Vec<GlossaryEntry> = self
            .glossary
            .missed_in(source_text, destination_text)
            .cloned()
            .collect();
        (!missed.is_empty()).then_some(Defect::GlossaryMiss { missed })
    }
}
