use crate::glossary::{Glossary, GlossaryEntry};
use crate::language::Language;

/// Task framing with the source text embedded
pub fn task_framing(source: Language, target: Language, source_text: &str) -> String {
    format!(
        "## Task\n\
         You are a professional translator. Translate the following {source} text into {target}.\n\
         Return only the translation, without explanations, notes, or surrounding quotes. \
         Preserve line breaks, placeholders, markup and escape sequences exactly as they appear.\n\n\
         <source>\n{text}\n</source>",
        source = source.name(),
        target = target.name(),
        text = source_text,
    )
}

/// Glossary section listing `entries`, or `None` when there are none
pub(crate) fn terminology_section<'a>(
    entries: impl IntoIterator<Item = &'a GlossaryEntry>,
) -> Option<String> {
    let lines: Vec<String> = entries
        .into_iter()
        .map(|e| format!("- {} -> {}", e.src, e.dst))
        .collect();
    if lines.is_empty() {
        return None;
    }

    Some(format!(
        "## Terminology\n\
         The following terms occur in the source text. Translate each one exactly as given:\n{}",
        lines.join("\n")
    ))
}

/// Prompt for the first translation pass: framing plus relevant glossary terms
pub fn first_pass_prompt(
    source: Language,
    target: Language,
    glossary: &Glossary,
    source_text: &str,
) -> String {
    let mut prompt = task_framing(source, target, source_text);
    if let Some(section) = terminology_section(glossary.relevant_to(source_text)) {
        prompt.push_str("\n\n");
        prompt.push_str(&section);
    }
    prompt
}
