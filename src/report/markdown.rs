//! Report skeleton and post-processing of model output

use std::ops::Range;

use chrono::{DateTime, Utc};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::context::{AuditContext, AuditMode, IssueCount};
use crate::model::ModelInfo;
use crate::scoring::{IssueKind, Severity};

/// Heading level the analysis section starts at
const ANALYSIS_TOP_LEVEL: usize = 3;
/// Issues turned into next steps
const NEXT_STEPS: usize = 5;

/// What to do about an issue, phrased as an instruction
pub fn recommendation(kind: IssueKind) -> &'static str {
    use IssueKind::*;
    match kind {
        FetchFailed => "Fix or redirect the URLs that return errors so crawlers and users reach real content.",
        MissingTitle => "Add a unique, descriptive <title> of 10-60 characters to every page.",
        MissingDescription => "Write a meta description of 50-160 characters that summarizes each page and invites the click.",
        BrokenCanonical => "Point the canonical link at a valid absolute http(s) URL of the preferred page.",
        NotHttps => "Serve every page over HTTPS and redirect plain HTTP to it.",
        TitleLength => "Rewrite titles to 10-60 characters so they are not truncated in results.",
        DescriptionLength => "Bring meta descriptions into the 50-160 character range.",
        MissingH1 => "Give each page exactly one H1 that states its main topic.",
        MultipleH1 => "Keep a single H1 per page and demote the other top-level headings.",
        SkippedHeadingLevel => "Nest headings without skipping levels (H1, H2, H3).",
        ThinContent => "Expand thin pages to at least 300 words of useful content or consolidate them.",
        MissingAltText => "Add descriptive alt text to every meaningful image.",
        BrokenLinks => "Replace empty, '#' and javascript: links with real destinations.",
        FewInternalLinks => "Link each page to at least three related internal pages.",
        MissingViewport => "Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">.",
        MissingLanguage => "Declare the page language with the lang attribute on <html>.",
        UnlabeledInputs => "Associate every form input with a <label> or an aria-label.",
        Noindex => "Check that noindex directives are intended; remove them from pages that should rank.",
        SlowResponse => "Reduce server response time below 3 seconds (caching, compression, lighter pages).",
        GenericAnchors => "Replace generic anchors such as \"click here\" with descriptive link text.",
        NoLazyImages => "Lazy load images below the fold with loading=\"lazy\".",
        NoStructuredData => "Add JSON-LD structured data for the page type (Organization, Product, Article...).",
        MissingLandmarks => "Use landmark elements (<main>, <nav>, <header>, <footer>) or ARIA roles.",
        LowContrast => "Check inline colour pairs for sufficient contrast (WCAG AA 4.5:1).",
        MissingSecurityHeaders => "Send HSTS, CSP, X-Frame-Options, X-Content-Type-Options and Referrer-Policy headers.",
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "critical",
        Severity::Warning => "warning",
        Severity::Notice => "notice",
    }
}

fn pages(n: usize) -> String {
    if n == 1 { "1 page".to_string() } else { format!("{n} pages") }
}

/// Inputs of the report skeleton besides the context
pub struct ReportMeta<'a> {
    pub model: &'a ModelInfo,
    pub attempts: usize,
    pub generated_at: DateTime<Utc>,
    pub source: Option<&'a str>,
}

/// Render the full report around the model's analysis
pub fn render_report(context: &AuditContext, analysis: &str, meta: &ReportMeta<'_>) -> String {
    let findings = &context.findings;
    let mut out = String::new();

    let subject = match context.mode {
        AuditMode::Single => context
            .single
            .as_ref()
            .map(|s| s.record.url.clone())
            .unwrap_or_else(|| findings.domain.clone()),
        _ => findings.domain.clone(),
    };
    out.push_str(&format!("# SEO Audit Report: {subject}\n\n"));
    out.push_str(&format!(
        "**Audit type:** {}  \n**Generated:** {}  \n**Model:** {}\n\n",
        context.mode,
        meta.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        meta.model,
    ));

    out.push_str("## Overall Score\n\n");
    out.push_str(&format!(
        "**{:.1} / 100 ({})** across {}\n\n",
        findings.score.overall,
        findings.band,
        pages(findings.pages)
    ));
    out.push_str("| Category | Score |\n|---|---|\n");
    for (name, score) in findings.score.categories() {
        out.push_str(&format!("| {name} | {score:.1} |\n"));
    }
    out.push('\n');

    out.push_str("## Positive Points\n\n");
    if findings.strengths.is_empty() {
        out.push_str("- No strength is shared by most pages yet.\n");
    }
    for strength in &findings.strengths {
        out.push_str(&format!("- {strength}\n"));
    }
    out.push('\n');

    out.push_str("## Issues Found\n\n");
    if findings.issues.is_empty() {
        out.push_str("- No issues detected.\n");
    }
    for issue in &findings.issues {
        out.push_str(&format!(
            "- **{}** ({}): {}\n",
            issue.issue,
            severity_label(issue.severity),
            pages(issue.pages)
        ));
    }
    if !findings.failed.is_empty() {
        out.push_str("\nFailed fetches:\n\n");
        for failed in &findings.failed {
            out.push_str(&format!("- {} (HTTP {}): {}\n", failed.url, failed.status, failed.error));
        }
    }
    out.push('\n');

    out.push_str("## Prioritized Next Steps\n\n");
    write_next_steps(&mut out, &findings.issues, !findings.failed.is_empty());
    out.push('\n');

    out.push_str("## Analysis\n\n");
    let analysis = normalize_analysis(analysis);
    if analysis.trim().is_empty() {
        out.push_str("_The model returned no analysis._\n");
    } else {
        out.push_str(analysis.trim());
        out.push('\n');
    }
    out.push('\n');

    let metadata = &context.metadata;
    out.push_str("## Audit Metadata\n\n");
    if let Some(source) = meta.source {
        out.push_str(&format!("- Source: {source}\n"));
    }
    out.push_str(&format!("- Pages analysed: {}\n", findings.pages));
    out.push_str(&format!("- Pages with detail: {}\n", metadata.included.len()));
    out.push_str(&format!(
        "- Pages omitted for brevity: {}\n",
        metadata.omitted_for_brevity()
    ));
    out.push_str(&format!("- Failed fetches: {}\n", findings.failed.len()));
    out.push_str(&format!("- Chunks: {}\n", context.chunks.len()));
    out.push_str(&format!("- Completion attempts: {}\n", meta.attempts));
    if metadata.reductions > 0 {
        out.push_str(&format!("- Context reductions: {}\n", metadata.reductions));
    }
    out.push_str(&format!(
        "- Context size: {} of {} bytes\n",
        metadata.payload_bytes, metadata.budget_bytes
    ));
    out.push_str(&format!("- Model: {}\n", meta.model));
    out
}

fn write_next_steps(out: &mut String, issues: &[IssueCount], failures: bool) {
    let mut steps: Vec<(IssueKind, usize)> = issues.iter().map(|i| (i.kind, i.pages)).collect();
    if failures && !steps.iter().any(|(kind, _)| *kind == IssueKind::FetchFailed) {
        steps.insert(0, (IssueKind::FetchFailed, 0));
    }
    if steps.is_empty() {
        out.push_str("1. Keep monitoring; no action is required right now.\n");
        return;
    }
    for (i, (kind, n)) in steps.into_iter().take(NEXT_STEPS).enumerate() {
        let affected = if n > 0 { format!(" ({})", pages(n)) } else { String::new() };
        out.push_str(&format!(
            "{}. **{}**{}: {}\n",
            i + 1,
            kind.label(),
            affected,
            recommendation(kind)
        ));
    }
}

/// Strip a fence wrapping the whole answer and demote its headings under the analysis section
pub fn normalize_analysis(text: &str) -> String {
    let unwrapped = strip_outer_fence(text.trim());
    demote_headings(&unwrapped, ANALYSIS_TOP_LEVEL)
}

/// Return the content of a fenced block that spans the whole text
///
/// Only untagged or `markdown`/`md` fences are removed; any other text is
/// returned unchanged.
pub fn strip_outer_fence(text: &str) -> String {
    let mut events = Parser::new_ext(text, Options::all()).into_offset_iter();
    let Some((Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang))), range)) = events.next() else {
        return text.to_string();
    };
    if range != (0..text.len()) && range != (0..text.trim_end().len()) {
        return text.to_string();
    }
    if !matches!(&*lang, "" | "markdown" | "md") {
        return text.to_string();
    }

    let mut inner = String::new();
    for (event, _) in events {
        match event {
            Event::Text(t) => inner.push_str(&t),
            Event::End(TagEnd::CodeBlock) => break,
            _ => {}
        }
    }
    inner
}

struct HeadingSpan {
    range: Range<usize>,
    level: usize,
    text: String,
}

/// Shift headings so the highest one lands on `top`, capped at level 6
pub fn demote_headings(text: &str, top: usize) -> String {
    let mut headings: Vec<HeadingSpan> = Vec::new();
    let mut current: Option<HeadingSpan> = None;
    for (event, range) in Parser::new_ext(text, Options::all()).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some(HeadingSpan {
                    range,
                    level: level as usize,
                    text: String::new(),
                });
            }
            Event::Text(t) => {
                if let Some(heading) = current.as_mut() {
                    heading.text.push_str(&t);
                }
            }
            Event::Code(code) => {
                if let Some(heading) = current.as_mut() {
                    heading.text.push_str(&format!("`{code}`"));
                }
            }
            Event::End(TagEnd::Heading(_)) => headings.extend(current.take()),
            _ => {}
        }
    }

    let Some(highest) = headings.iter().map(|h| h.level).min() else {
        return text.to_string();
    };
    let shift = top.saturating_sub(highest);
    if shift == 0 {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + headings.len() * shift);
    let mut cursor = 0;
    for heading in headings {
        out.push_str(&text[cursor..heading.range.start]);
        let level = (heading.level + shift).min(6);
        out.push_str(&format!("{} {}", "#".repeat(level), heading.text.trim()));
        if text[heading.range.clone()].ends_with('\n') {
            out.push('\n');
        }
        cursor = heading.range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demote_headings() {
        let text = "# Summary\n\nBody text.\n\n## Details `code`\n\nMore.\n";
        let demoted = demote_headings(text, 3);
        assert_eq!(demoted, "### Summary\n\nBody text.\n\n#### Details `code`\n\nMore.\n");
    }

    #[test]
    fn test_demote_setext_and_cap() {
        let text = "Title\n=====\n\n###### Deep\n";
        let demoted = demote_headings(text, 3);
        assert!(demoted.starts_with("### Title\n"));
        assert!(demoted.contains("###### Deep"));
        assert!(!demoted.contains("====="));
    }

    #[test]
    fn test_headings_already_low_are_kept() {
        let text = "### Fine\n\ntext";
        assert_eq!(demote_headings(text, 3), text);
        assert_eq!(demote_headings("no headings", 3), "no headings");
    }

    #[test]
    fn test_strip_outer_fence() {
        let wrapped = "```markdown\n## Findings\n- one\n```";
        assert_eq!(strip_outer_fence(wrapped), "## Findings\n- one\n");

        let code = "```rust\nfn main() {}\n```";
        assert_eq!(strip_outer_fence(code), code);

        let mixed = "Intro\n\n```\nblock\n```";
        assert_eq!(strip_outer_fence(mixed), mixed);
    }

    #[test]
    fn test_normalize_analysis() {
        let answer = "```\n# Audit\n\n## Problems\n- slow\n```\n";
        assert_eq!(normalize_analysis(answer), "### Audit\n\n#### Problems\n- slow\n");
    }

    #[test]
    fn test_render_report_sections() {
        use crate::context::{ContextBudget, ContextBuilder};
        use crate::crawler::PageRecord;
        use crate::crawler::test_support::{bare_page, sample_page};
        use crate::model::ProviderKind;

        let records = vec![
            sample_page("https://example.com/", 0),
            bare_page("https://example.com/empty", 1),
            PageRecord::failed("https://example.com/gone", 2, 404, 12, "HTTP 404"),
        ];
        let context = ContextBuilder::default()
            .build(&records, AuditMode::Full, ContextBudget::default())
            .unwrap();
        let model = ModelInfo {
            provider: ProviderKind::Local,
            model: "mock".to_string(),
            endpoint: "memory".to_string(),
        };
        let meta = ReportMeta {
            model: &model,
            attempts: 1,
            generated_at: Utc::now(),
            source: Some("crawl_data/example.com"),
        };
        let report = render_report(&context, "# Notes\n\nFix the empty page.", &meta);

        assert!(report.starts_with("# SEO Audit Report: example.com\n\n"));
        let sections = [
            "## Overall Score",
            "## Positive Points",
            "## Issues Found",
            "## Prioritized Next Steps",
            "## Analysis",
            "## Audit Metadata",
        ];
        let positions: Vec<usize> = sections.iter().map(|s| report.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        assert!(report.contains("| Performance | 100.0 |\n"));
        assert!(report.contains("\nFailed fetches:\n\n- https://example.com/gone (HTTP 404): HTTP 404\n"));
        assert!(report.contains(&format!(
            "1. **{}**: {}\n",
            IssueKind::FetchFailed.label(),
            recommendation(IssueKind::FetchFailed)
        )));
        assert!(report.contains("### Notes\n\nFix the empty page.\n"));
        assert!(report.contains("- Source: crawl_data/example.com\n"));
        assert!(report.contains("- Failed fetches: 1\n"));
        assert!(report.contains("- Completion attempts: 1\n"));
        assert!(report.ends_with(&format!("- Model: {model}\n")));
    }

    #[test]
    fn test_every_issue_has_a_recommendation() {
        assert!(recommendation(IssueKind::MissingTitle).contains("<title>"));
        assert!(!recommendation(IssueKind::LowContrast).is_empty());
    }
}
