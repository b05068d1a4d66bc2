/*!
 * Repair prompt builder.
 *
 * Every repair attempt gets the same, maximally strict instruction set.
 * Layers appear in a fixed order:
 * 1. task framing with the source text
 * 2. terminology constraints (only when relevant entries exist)
 * 3. defect-specific correction rules
 * 4. faithfulness clause for sensitive content
 * 5. self-check list
 * 6. worked examples for the language pair and defect kind
 *
 * The output depends only on the problem, never on which attempt it is for,
 * and carries no sampling parameters.
 */

use std::sync::Arc;

use crate::detection::{Defect, DefectKind, FixProblem};
use crate::glossary::{Glossary, GlossaryEntry};
use crate::language::Language;
use crate::prompts::base::{task_framing, terminology_section};

/// Glossary entries used for worked examples
const GLOSSARY_EXAMPLE_TERMS: usize = 3;

/// Builds repair prompts for one language pair and glossary
#[derive(Debug, Clone)]
pub struct PromptEnhancer {
    source: Language,
    target: Language,
    glossary: Arc<Glossary>,
}

impl PromptEnhancer {
    pub fn new(source: Language, target: Language, glossary: Arc<Glossary>) -> Self {
        Self {
            source,
            target,
            glossary,
        }
    }

    /// Build the full repair prompt for a problem
    pub fn build(&self, problem: &FixProblem) -> String {
        let source_text = &problem.item.source_text;
        let relevant: Vec<&GlossaryEntry> = self.glossary.relevant_to(source_text).collect();

        let terminology = terminology_section(relevant.iter().copied());
        let has_terminology = terminology.is_some();

        let mut layers = vec![task_framing(self.source, self.target, source_text)];
        layers.extend(terminology);
        layers.push(self.correction_rules(problem));
        layers.push(self.faithfulness_clause());
        layers.push(self.self_check(problem.kind(), has_terminology));
        layers.push(self.examples(problem.kind(), &relevant));

        layers.join("\n\n")
    }

    fn correction_rules(&self, problem: &FixProblem) -> String {
        let source = self.source.name();
        let target = self.target.name();

        match &problem.defect {
            Defect::Residue { preview, .. } => format!(
                "## Completeness rules\n\
                 A previous translation left {source} text untranslated (for example: {preview}).\n\
                 - Translate every word and phrase into {target}; nothing written in {source} script may remain.\n\
                 - Names, titles and onomatopoeia must be rendered in {target} by translation or transliteration.\n\
                 - Do not leave any fragment in the original script for the reader to interpret.\n\
                 - Keep the meaning complete: no omissions, no summaries.",
            ),
            Defect::Untranslated => format!(
                "## Completeness rules\n\
                 A previous attempt produced no usable translation.\n\
                 - Produce a complete {target} translation of the whole source text.\n\
                 - Do not answer with an empty response, a refusal, or a comment about the text.\n\
                 - Nothing written in {source} script may remain.",
            ),
            Defect::GlossaryMiss { missed } => {
                let terms: Vec<String> = missed
                    .iter()
                    .map(|e| format!("- \"{}\" must be translated as \"{}\"", e.src, e.dst))
                    .collect();
                format!(
                    "## Terminology rules\n\
                     A previous translation did not use the required terms:\n{}\n\
                     - Use each required term verbatim, with the same spelling and capitalisation.\n\
                     - Do not abbreviate, paraphrase, or leave the source term in place.\n\
                     - Adjust the surrounding grammar instead of changing a required term.",
                    terms.join("\n")
                )
            }
        }
    }

    fn faithfulness_clause(&self) -> String {
        "## Faithfulness\n\
         The text is fiction or user content that must be translated as written. Translate \
         violent, sexual, offensive or otherwise sensitive passages faithfully and completely. \
         Do not refuse, censor, soften, summarise, or add warnings; an answer that avoids the \
         content is treated as a failure."
            .to_string()
    }

    fn self_check(&self, kind: DefectKind, has_terminology: bool) -> String {
        let mut checks = vec![format!(
            "- Every part of the source text is translated into {}.",
            self.target.name()
        )];
        if matches!(kind, DefectKind::Residue | DefectKind::Untranslated) {
            checks.push(format!(
                "- No {} characters remain anywhere in the answer.",
                self.source.name()
            ));
        }
        if has_terminology {
            checks.push("- Every term from the Terminology section appears exactly as given.".to_string());
        }
        checks.push("- Line breaks, placeholders and markup match the source.".to_string());
        checks.push("- The answer contains only the translation.".to_string());

        format!("## Self-check before answering\n{}", checks.join("\n"))
    }

    fn examples(&self, kind: DefectKind, relevant: &[&GlossaryEntry]) -> String {
        let body = match kind {
            DefectKind::GlossaryMiss => glossary_examples(relevant),
            DefectKind::Residue | DefectKind::Untranslated => residue_examples(self.source, self.target),
        };
        format!("## Examples\n{}", body)
    }
}

fn residue_examples(source: Language, target: Language) -> String {
    let (wrong, right) = match (source, target) {
        (Language::Zh, Language::En) => ("I love 编程.", "I love programming."),
        (Language::Ja, Language::En) => ("Let's go to the がっこう.", "Let's go to school."),
        (Language::Ja, Language::Zh) => ("我们一起去がっこう吧。", "我们一起去学校吧。"),
        (Language::Ko, Language::En) => ("I met my 친구 yesterday.", "I met my friend yesterday."),
        _ => {
            return format!(
                "Wrong: an answer that keeps {source} words next to {target} ones.\n\
                 Right: an answer written entirely in {target}, with every {source} word translated.",
                source = source.name(),
                target = target.name(),
            );
        }
    };
    format!("Wrong: {}\nRight: {}", wrong, right)
}

fn glossary_examples(relevant: &[&GlossaryEntry]) -> String {
    if relevant.is_empty() {
        return "Wrong: replacing a required term with a synonym or abbreviation.\n\
                Right: writing the required term exactly as listed."
            .to_string();
    }

    relevant
        .iter()
        .take(GLOSSARY_EXAMPLE_TERMS)
        .map(|e| {
            format!(
                "Wrong: keeping \"{src}\" or paraphrasing it.\nRight: writing \"{dst}\" exactly.",
                src = e.src,
                dst = e.dst
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
