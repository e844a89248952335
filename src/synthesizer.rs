use std::fmt;

use tracing::debug;

use crate::{
    cypher,
    errors::{CypherError, GenerationError, PipelineError, TemplateError, TimeoutSource},
    llm::TextGenerator,
    prompt::{PromptTemplate, Slot},
    result_set::ResultSet,
    schema::SchemaSnapshot,
};

pub const DEFAULT_MAX_CONTEXT_ROWS: usize = 50;

/// Clause keywords that may open a statement.
const LEADING_KEYWORDS: &[&str] = &[
    "MATCH", "OPTIONAL", "WITH", "UNWIND", "RETURN", "CREATE", "MERGE", "CALL",
];

/// Keywords that may open a continuation line of a statement.
const CONTINUATION_KEYWORDS: &[&str] = &[
    "MATCH", "OPTIONAL", "WITH", "UNWIND", "RETURN", "CREATE", "MERGE", "CALL", "WHERE", "ORDER",
    "SKIP", "LIMIT", "SET", "DELETE", "DETACH", "REMOVE", "UNION", "AND", "OR", "XOR", "NOT",
    "CASE", "WHEN", "THEN", "ELSE", "END", "AS", "ON", "DISTINCT", "YIELD",
];

/// Query text extracted from a generator completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedQuery(String);

impl GeneratedQuery {
    pub fn new<T: Into<String>>(text: T) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for GeneratedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct QuerySynthesizer<G> {
    generator: G,
    template: PromptTemplate,
}

impl<G: TextGenerator> QuerySynthesizer<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            template: PromptTemplate::cypher_generation(),
        }
    }

    /// Custom template; it must declare exactly the `schema` and `question` slots.
    pub fn with_template(generator: G, template: PromptTemplate) -> Result<Self, TemplateError> {
        require_slots(&template, &[Slot::Schema, Slot::Question])?;
        Ok(Self {
            generator,
            template,
        })
    }

    pub fn synthesize(
        &self,
        question: &str,
        schema: &SchemaSnapshot,
    ) -> Result<GeneratedQuery, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::synthesis("question is empty"));
        }
        let schema_text = schema.render();
        let prompt = self
            .template
            .render(&[(Slot::Schema, schema_text.as_str()), (Slot::Question, question)])
            .map_err(|e| PipelineError::synthesis(e.to_string()))?;
        let raw = self.generator.generate(&prompt).map_err(generation_failure)?;
        debug!(completion_chars = raw.len(), "query completion received");
        extract_query(&raw)
            .map(GeneratedQuery)
            .ok_or_else(|| PipelineError::synthesis("completion contains no recognisable query"))
    }
}

pub struct AnswerSynthesizer<G> {
    generator: G,
    template: PromptTemplate,
    max_rows: usize,
}

impl<G: TextGenerator> AnswerSynthesizer<G> {
    pub fn new(generator: G, max_rows: usize) -> Self {
        Self {
            generator,
            template: PromptTemplate::qa(),
            max_rows,
        }
    }

    /// Custom template; it must declare exactly the `context` and `question` slots.
    pub fn with_template(
        generator: G,
        template: PromptTemplate,
        max_rows: usize,
    ) -> Result<Self, TemplateError> {
        require_slots(&template, &[Slot::Context, Slot::Question])?;
        Ok(Self {
            generator,
            template,
            max_rows,
        })
    }

    pub fn synthesize_answer(
        &self,
        question: &str,
        results: &ResultSet,
    ) -> Result<String, PipelineError> {
        let context = render_context(results, self.max_rows);
        let prompt = self
            .template
            .render(&[(Slot::Context, context.as_str()), (Slot::Question, question.trim())])
            .map_err(|e| PipelineError::synthesis(e.to_string()))?;
        let answer = self.generator.generate(&prompt).map_err(generation_failure)?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(PipelineError::synthesis("generator returned an empty answer"));
        }
        Ok(answer.to_string())
    }
}

fn require_slots(template: &PromptTemplate, wanted: &[Slot]) -> Result<(), TemplateError> {
    for slot in wanted {
        if !template.slots().contains(slot) {
            return Err(TemplateError::MissingValue(slot.name()));
        }
    }
    for slot in template.slots() {
        if !wanted.contains(slot) {
            return Err(TemplateError::UnexpectedValue(slot.name()));
        }
    }
    Ok(())
}

fn generation_failure(err: GenerationError) -> PipelineError {
    match err {
        GenerationError::Timeout(elapsed) => {
            PipelineError::timeout(TimeoutSource::Generation, elapsed)
        }
        other => PipelineError::synthesis(other.to_string()),
    }
}

/// One JSON object per row, at most `max_rows` of them, followed by an
/// omission marker when rows were dropped. An empty set renders `(no rows)`.
pub fn render_context(results: &ResultSet, max_rows: usize) -> String {
    if results.is_empty() {
        return "(no rows)".to_string();
    }
    let mut lines: Vec<String> = (0..results.len().min(max_rows))
        .filter_map(|idx| results.row_json(idx))
        .collect();
    if results.len() > max_rows {
        lines.push(format!(
            "... {} additional rows omitted",
            results.len() - max_rows
        ));
    }
    lines.join("\n")
}

/// Pulls one statement out of a completion.
///
/// Candidates are read from fenced code blocks first, then from the whole
/// completion. A candidate starts at a line opening with a clause keyword and
/// runs until a blank line, a fence, or a line that does not read as query
/// text; it is cut at the first `;` outside string literals. The first
/// candidate the Cypher parser accepts wins. Prose never passes through.
pub fn extract_query(raw: &str) -> Option<String> {
    fenced_blocks(raw)
        .into_iter()
        .chain(std::iter::once(raw))
        .find_map(first_parsable_statement)
}

fn fenced_blocks(raw: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = raw;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let line_end = after_fence.find('\n').unwrap_or(after_fence.len());
        if let Some(close) = after_fence[..line_end].find("```") {
            // One-line fence such as ```MATCH (n) RETURN n```.
            blocks.push(&after_fence[..close]);
            rest = &after_fence[close + 3..];
            continue;
        }
        // The rest of the opening line is a language tag.
        let body = after_fence.get(line_end + 1..).unwrap_or_default();
        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => {
                blocks.push(body);
                break;
            }
        }
    }
    blocks
}

fn first_parsable_statement(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    (0..lines.len())
        .filter(|&idx| starts_with_keyword(lines[idx].trim_start(), LEADING_KEYWORDS))
        .find_map(|idx| {
            let kept = statement_lines(&lines[idx..]);
            // Trailing prose can read like a clause ("Return the result."), so
            // drop lines from the end until the parser accepts.
            (1..=kept.len())
                .rev()
                .map(|end| cut_at_semicolon(&kept[..end].join("\n")).trim().to_string())
                .find(|statement| parses(statement))
        })
}

fn statement_lines<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    let mut kept = vec![lines[0].trim_start()];
    for line in &lines[1..] {
        if line.trim().is_empty()
            || line.trim_start().starts_with("```")
            || !continues_statement(line, kept.last().copied())
        {
            break;
        }
        kept.push(*line);
    }
    kept
}

/// A recognised clause outside the executable subset still counts as query
/// text when its keyword is written upper-case ("Call me" stays prose); the
/// executor reports it as unsupported.
fn parses(statement: &str) -> bool {
    match cypher::parse(statement) {
        Ok(_) => !statement.is_empty(),
        Err(CypherError::Unsupported(_)) => LEADING_KEYWORDS
            .iter()
            .any(|keyword| statement.starts_with(keyword)),
        Err(_) => false,
    }
}

fn continues_statement(line: &str, previous: Option<&str>) -> bool {
    if line.starts_with(char::is_whitespace) {
        return true;
    }
    let trimmed = line.trim_start();
    if starts_with_keyword(trimmed, CONTINUATION_KEYWORDS) {
        return true;
    }
    if trimmed.starts_with(['(', ')', '-', '<', '[', ']', '{', '}', ',', '.', '\'', '"', '`']) {
        return true;
    }
    previous
        .map(str::trim_end)
        .is_some_and(|prev| prev.ends_with([',', '(', '[', '{', '=', '+', '-', '>', '<']))
}

fn starts_with_keyword(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| {
        text.len() >= keyword.len()
            && text.is_char_boundary(keyword.len())
            && text[..keyword.len()].eq_ignore_ascii_case(keyword)
            && text[keyword.len()..]
                .chars()
                .next()
                .is_none_or(|c| c.is_whitespace() || c == '(')
    })
}

fn cut_at_semicolon(text: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in text.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            ';' => return &text[..idx],
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_fenced_block() {
        let raw = "Here you go:\n```cypher\nMATCH (n:Contract)\nRETURN n.name;\n```\nDone.";
        assert_eq!(
            extract_query(raw).as_deref(),
            Some("MATCH (n:Contract)\nRETURN n.name")
        );
    }

    #[test]
    fn unfenced_stops_at_prose() {
        let raw = "MATCH (n:Contract)\nWHERE n.name = 'x'\nRETURN n\nThis query returns contracts.";
        assert_eq!(
            extract_query(raw).as_deref(),
            Some("MATCH (n:Contract)\nWHERE n.name = 'x'\nRETURN n")
        );
    }

    #[test]
    fn trailing_keyword_prose_is_dropped() {
        let raw = "MATCH (n:Contract)\nRETURN n.name\nReturn the names above to the user.";
        assert_eq!(
            extract_query(raw).as_deref(),
            Some("MATCH (n:Contract)\nRETURN n.name")
        );
    }

    #[test]
    fn semicolon_inside_string_is_kept() {
        assert_eq!(
            extract_query("MATCH (n) WHERE n.name = 'a;b' RETURN n; MATCH (m) RETURN m").as_deref(),
            Some("MATCH (n) WHERE n.name = 'a;b' RETURN n")
        );
    }

    #[test]
    fn later_fence_used_when_first_holds_prose() {
        let raw = "```\nno query here\n```\n```cypher\nMATCH (n) RETURN n\n```";
        assert_eq!(extract_query(raw).as_deref(), Some("MATCH (n) RETURN n"));
    }

    #[test]
    fn prose_only_yields_nothing() {
        assert_eq!(extract_query("I cannot answer that."), None);
        assert_eq!(extract_query("Matchmaking is fun"), None);
    }
}
