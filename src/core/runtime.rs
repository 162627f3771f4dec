use serde_json::{Map, Value};

use super::dsl::{Node, Template};
use super::media::DataUri;
use crate::error::RenderError;

/// One piece of a rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Media(DataUri),
}

/// A rendered prompt: text interleaved with inline media, in template order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Prompt {
    parts: Vec<Part>,
}

impl Prompt {
    /// Builds a prompt, merging adjacent text parts.
    pub fn from_parts(parts: impl IntoIterator<Item = Part>) -> Self {
        let mut prompt = Self::default();
        for part in parts {
            match part {
                Part::Text(text) => prompt.push_text(&text),
                Part::Media(media) => prompt.parts.push(Part::Media(media)),
            }
        }
        prompt
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Text parts joined; media contributes nothing.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Media(_) => None,
            })
            .collect()
    }

    pub fn media(&self) -> impl Iterator<Item = &DataUri> {
        self.parts.iter().filter_map(|p| match p {
            Part::Media(m) => Some(m),
            Part::Text(_) => None,
        })
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.parts.last_mut() {
            Some(Part::Text(last)) => last.push_str(text),
            _ => self.parts.push(Part::Text(text.to_string())),
        }
    }
}

/// Renders a template against an already validated record.
///
/// Pure: no I/O, and identical inputs always produce identical prompts.
/// Absent fields render as empty text and absent flags as false.
pub fn render(template: &Template, input: &Map<String, Value>) -> Result<Prompt, RenderError> {
    let mut prompt = Prompt::default();
    render_nodes(template.nodes(), input, None, &mut prompt)?;
    Ok(prompt)
}

fn render_nodes(
    nodes: &[Node],
    input: &Map<String, Value>,
    current: Option<&Value>,
    out: &mut Prompt,
) -> Result<(), RenderError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_text(text),
            Node::Field(field) => out.push_text(&scalar_text(input.get(field))),
            Node::This => out.push_text(&scalar_text(current)),
            Node::Each { field, body } => {
                let items = input
                    .get(field)
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                for item in items {
                    render_nodes(body, input, Some(item), out)?;
                }
            }
            Node::If { field, then, otherwise } => {
                let branch = if is_set(input.get(field)) { then } else { otherwise };
                render_nodes(branch, input, current, out)?;
            }
            Node::Media { field } => {
                let raw = input.get(field).and_then(Value::as_str).unwrap_or_default();
                let media = raw.parse::<DataUri>().map_err(|source| RenderError::Media {
                    field: field.clone(),
                    source,
                })?;
                out.parts.push(Part::Media(media));
            }
        }
    }
    Ok(())
}

fn is_set(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
}

fn scalar_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}
