//! Typed prompt templates. A template declares the slots it uses; parsing
//! rejects holes it does not declare and rendering rejects missing or extra
//! values, so a prompt can never be sent with an unfilled `{placeholder}`.

use crate::errors::TemplateError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Schema,
    Question,
    Context,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Schema, Slot::Question, Slot::Context];

    pub fn name(self) -> &'static str {
        match self {
            Slot::Schema => "schema",
            Slot::Question => "question",
            Slot::Context => "context",
        }
    }

    pub fn from_name(name: &str) -> Option<Slot> {
        Slot::ALL.into_iter().find(|slot| slot.name() == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Text(String),
    Hole(Slot),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    slots: Vec<Slot>,
}

impl PromptTemplate {
    /// Parses `{name}` holes; `{{` and `}}` are literal braces.
    pub fn parse(text: &str, slots: &[Slot]) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|(_, n)| *n) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|(_, n)| *n) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, n) in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(TemplateError::Unbalanced(idx));
                    }
                    let slot = Slot::from_name(name.trim())
                        .ok_or_else(|| TemplateError::UnknownSlot(name.clone()))?;
                    if !slots.contains(&slot) {
                        return Err(TemplateError::UndeclaredSlot(slot.name()));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Hole(slot));
                }
                '}' => return Err(TemplateError::Unbalanced(idx)),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Text(literal));
        }
        Self::from_segments(segments, slots.to_vec())
    }

    fn from_segments(segments: Vec<Segment>, slots: Vec<Slot>) -> Result<Self, TemplateError> {
        for slot in &slots {
            if !segments.contains(&Segment::Hole(*slot)) {
                return Err(TemplateError::UnusedSlot(slot.name()));
            }
        }
        Ok(Self { segments, slots })
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Every declared slot must be supplied; nothing else may be.
    pub fn render(&self, values: &[(Slot, &str)]) -> Result<String, TemplateError> {
        for (slot, _) in values {
            if !self.slots.contains(slot) {
                return Err(TemplateError::UnexpectedValue(slot.name()));
            }
        }
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Hole(slot) => {
                    let (_, value) = values
                        .iter()
                        .find(|(candidate, _)| candidate == slot)
                        .ok_or(TemplateError::MissingValue(slot.name()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Query generation prompt with the `schema` and `question` slots.
    pub fn cypher_generation() -> Self {
        Self {
            segments: vec![
                Segment::Text(
                    "Task: Generate a Cypher statement to query a graph database.\n\
                     Instructions:\n\
                     Use only the provided node labels, relationship types and properties in the schema.\n\
                     Do not use any other labels, relationship types or properties that are not provided.\n\
                     Schema:\n"
                        .to_string(),
                ),
                Segment::Hole(Slot::Schema),
                Segment::Text(
                    "\nNote: Do not include any explanations or apologies in your responses.\n\
                     Do not respond to any questions that might ask anything else than for you to construct a Cypher statement.\n\
                     Do not include any text except the generated Cypher statement.\n\
                     Return exactly one statement.\n\n\
                     The question is:\n"
                        .to_string(),
                ),
                Segment::Hole(Slot::Question),
            ],
            slots: vec![Slot::Schema, Slot::Question],
        }
    }

    /// Answer prompt with the `context` and `question` slots.
    pub fn qa() -> Self {
        Self {
            segments: vec![
                Segment::Text(
                    "You are an assistant that helps to form nice and human understandable answers.\n\
                     The information part contains the provided information that you must use to construct an answer.\n\
                     The provided information is authoritative, you must never doubt it or try to use your internal knowledge to correct it.\n\
                     Make the answer sound as a response to the question. Do not mention that you based the result on the given information.\n\
                     If the provided information is empty or reads (no rows), say that you don't know the answer instead of inventing one.\n\
                     Information:\n"
                        .to_string(),
                ),
                Segment::Hole(Slot::Context),
                Segment::Text("\n\nQuestion: ".to_string()),
                Segment::Hole(Slot::Question),
                Segment::Text("\nHelpful Answer:".to_string()),
            ],
            slots: vec![Slot::Context, Slot::Question],
        }
    }
}
