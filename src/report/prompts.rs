//! Prompt templates per audit mode

use crate::context::{AuditContext, AuditMode, ContextChunk, ContextError};
use crate::crawler::Language;

const PREAMBLE: &str = "You are an experienced SEO auditor. You analyse website crawl data \
and give practical, prioritized recommendations with concrete examples. Base every statement \
on the data you are given and never invent pages or measurements.";

const FORMAT_RULES: &str = "Use Markdown. Do not repeat the score table, the issue counts or \
the metadata; they are already part of the report. Refer to pages by URL.";

/// System preamble, including the answer language
pub fn preamble(language: Option<Language>) -> String {
    match language {
        Some(lang) if lang != Language::Other => {
            format!("{PREAMBLE} Write your answer in {}, the language of the audited pages.", lang.name())
        }
        _ => format!("{PREAMBLE} Write your answer in the language of the audited pages."),
    }
}

fn mode_instructions(mode: AuditMode) -> &'static str {
    match mode {
        AuditMode::Overview => {
            "Write an SEO overview of the whole website. Cover the domain-wide strengths, the \
             most widespread issues and their impact, content depth, internal linking, mobile \
             readiness and accessibility. Finish with immediate, mid-term and long-term \
             recommendations."
        }
        AuditMode::Technical => {
            "Write a technical SEO audit. Cover status codes, response times and page weight, \
             canonical and robots directives, structured data, HTTPS and security headers, and \
             mobile optimization. Finish with a prioritized list of technical fixes."
        }
        AuditMode::Pages => {
            "Review the individual pages. For every page with detail, list what it does well, \
             its problems and a concrete fix for each, including an improved title or meta \
             description where they are weak. Then summarize the patterns of the remaining pages."
        }
        AuditMode::Full => {
            "Write a complete SEO audit: a domain overview, a technical analysis and a review of \
             the pages with detail. Explain which issues matter most for search visibility and \
             why, with examples of improved titles, descriptions or headings where useful."
        }
        AuditMode::Single => {
            "Audit this single page in depth. Cover title and meta description quality, heading \
             structure, content depth and search intent, images, internal and external links, \
             structured data, technical metrics, mobile usability and accessibility. Suggest \
             improved wording for weak elements and finish with actionable next steps."
        }
    }
}

/// Prompt for one chunk of the remaining pages
pub fn chunk_prompt(context: &AuditContext, chunk: &ContextChunk) -> Result<String, ContextError> {
    let summary = serde_json::to_string(&chunk.summary)?;
    Ok(format!(
        "This is part {part} of {total} of the page data of {domain} that did not fit into the \
         main audit context ({mode} audit). Summarize the most important SEO problems and \
         patterns of these pages in at most 8 bullet points and name the worst pages.\n\n\
         Part summary:\n{summary}\n\nPages:\n{payload}",
        part = chunk.index + 1,
        total = context.chunks.len(),
        domain = context.digest.domain,
        mode = context.mode,
        payload = chunk.payload,
    ))
}

/// Prompt for the final synthesis call
///
/// `notes` are the answers of the chunk calls, in chunk order.
pub fn synthesis_prompt(context: &AuditContext, notes: &[String]) -> Result<String, ContextError> {
    let mut prompt = format!(
        "{instructions}\n\n{FORMAT_RULES}\n\nAudit data ({mode} audit, {included} pages with \
         detail, {omitted} pages summarized or omitted):\n{payload}",
        instructions = mode_instructions(context.mode),
        mode = context.mode,
        included = context.metadata.included.len(),
        omitted = context.metadata.omitted_for_brevity(),
        payload = context.primary_payload()?,
    );
    if !notes.is_empty() {
        prompt.push_str(&format!(
            "\n\nNotes from analysing the remaining pages in {} parts:\n",
            notes.len()
        ));
        for (i, note) in notes.iter().enumerate() {
            prompt.push_str(&format!("\n### Part {}\n{}\n", i + 1, note.trim()));
        }
    }
    Ok(prompt)
}

/// Prompt that merges neighbouring chunk notes into one
pub fn merge_prompt(context: &AuditContext, notes: &[String]) -> String {
    let mut prompt = format!(
        "These are notes from analysing {count} parts of the page data of {domain} ({mode} \
         audit). Merge them into one list of at most 8 bullet points that keeps the most \
         important SEO problems and names the worst pages.\n",
        count = notes.len(),
        domain = context.digest.domain,
        mode = context.mode,
    );
    for (i, note) in notes.iter().enumerate() {
        prompt.push_str(&format!("\n### Part {}\n{}\n", i + 1, note.trim()));
    }
    prompt
}

/// Bytes of note text carried by a prompt
pub fn notes_bytes(notes: &[String]) -> usize {
    notes.iter().map(|note| note.trim().len()).sum()
}

/// Cut `text` to at most `max_bytes` on a char boundary, ellipsis included
pub fn truncate_note(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes.saturating_sub('…'.len_utf8());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextBudget, ContextBuilder, ContextConfig};
    use crate::crawler::test_support::sample_page;
    use crate::scoring::ScoringRubric;

    #[test]
    fn test_preamble_language() {
        assert!(preamble(Some(Language::El)).contains("Greek"));
        assert!(!preamble(Some(Language::Other)).contains("Other"));
    }

    #[test]
    fn test_prompts_embed_payloads() {
        let records: Vec<_> = (0..30)
            .map(|i| sample_page(&format!("https://example.com/p/{i}"), i))
            .collect();
        let config = ContextConfig::builder().chunk_threshold_bytes(4000).build();
        let context = ContextBuilder::new(config, ScoringRubric::default())
            .build(&records, AuditMode::Technical, ContextBudget::from_bytes(4000))
            .unwrap();
        assert!(context.is_chunked());

        let chunk = &context.chunks[0];
        let prompt = chunk_prompt(&context, chunk).unwrap();
        assert!(prompt.contains(&format!("part 1 of {}", context.chunks.len())));
        assert!(prompt.contains(&chunk.payload));

        let synthesis = synthesis_prompt(&context, &["- thin pages".to_string()]).unwrap();
        assert!(synthesis.contains(&context.primary_payload().unwrap()));
        assert!(synthesis.contains("### Part 1\n- thin pages"));

        let notes = vec!["- thin pages ".to_string(), "- slow pages".to_string()];
        let merge = merge_prompt(&context, &notes);
        assert!(merge.contains("2 parts of the page data of example.com"));
        assert!(merge.contains("### Part 2\n- slow pages"));
        assert_eq!(notes_bytes(&notes), 24);
    }

    #[test]
    fn test_truncate_note_respects_char_boundaries() {
        assert_eq!(truncate_note("short", 10), "short");
        assert_eq!(truncate_note("αβγδ", 5), "α…");
        assert!(truncate_note(&"note ".repeat(100), 40).len() <= 40);
    }
}
