//! Prompt template language.
//!
//! A deliberately small Handlebars dialect:
//!
//! - `{{field}}` / `{{{field}}}`: scalar substitution (no escaping either way)
//! - `{{#each field}} .. {{this}} .. {{/each}}`: iteration over a list of strings
//! - `{{#if field}} .. {{else}} .. {{/if}}`: inclusion guarded by a boolean
//! - `{{media url=field}}`: inline media taken from a data URI field
//! - `{{! comment }}`
//!
//! Block tags standing alone on a line take the whole line with them, so
//! templates can be laid out one tag per line without leaving blank lines
//! behind in the rendered prompt.

use crate::error::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Field(String),
    This,
    Each {
        field: String,
        body: Vec<Node>,
    },
    If {
        field: String,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Media {
        field: String,
    },
}

/// How a template uses a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Scalar,
    Each,
    If,
    Media,
}

impl Marker {
    pub fn label(&self) -> &'static str {
        match self {
            Marker::Scalar => "substitution",
            Marker::Each => "each",
            Marker::If => "if",
            Marker::Media => "media",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub field: String,
    pub marker: Marker,
}

/// A parsed template. Parsing happens once, at flow definition time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut tokens = tokenize(source)?;
        strip_standalone(&mut tokens);

        let mut parser = Parser { tokens: &tokens, pos: 0 };
        let (nodes, _) = parser.parse_nodes(None, 0, false)?;
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Every field reference in document order.
    pub fn references(&self) -> Vec<FieldRef> {
        let mut refs = Vec::new();
        collect_refs(&self.nodes, &mut refs);
        refs
    }
}

fn collect_refs(nodes: &[Node], refs: &mut Vec<FieldRef>) {
    for node in nodes {
        let (field, marker) = match node {
            Node::Text(_) | Node::This => continue,
            Node::Field(field) => (field, Marker::Scalar),
            Node::Media { field } => (field, Marker::Media),
            Node::Each { field, body } => {
                refs.push(FieldRef { field: field.clone(), marker: Marker::Each });
                collect_refs(body, refs);
                continue;
            }
            Node::If { field, then, otherwise } => {
                refs.push(FieldRef { field: field.clone(), marker: Marker::If });
                collect_refs(then, refs);
                collect_refs(otherwise, refs);
                continue;
            }
        };
        refs.push(FieldRef { field: field.clone(), marker });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Each,
    If,
}

impl Block {
    fn name(&self) -> &'static str {
        match self {
            Block::Each => "each",
            Block::If => "if",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "each" => Some(Block::Each),
            "if" => Some(Block::If),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tag {
    Open(Block, String),
    Else,
    Close(Block),
    This,
    Field(String),
    Media(String),
    Comment,
}

impl Tag {
    fn is_block(&self) -> bool {
        matches!(self, Tag::Open(..) | Tag::Else | Tag::Close(_) | Tag::Comment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Tag(Tag, usize),
}

fn tokenize(source: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            tokens.push(Token::Text(rest[..start].to_string()));
        }
        let tag_offset = offset + start;
        let tail = &rest[start..];
        let (open, close) = if tail.starts_with("{{{") { ("{{{", "}}}") } else { ("{{", "}}") };

        let end = tail[open.len()..]
            .find(close)
            .ok_or(TemplateError::Unterminated { offset: tag_offset })?;
        let body = tail[open.len()..open.len() + end].trim();
        tokens.push(Token::Tag(classify(body, tag_offset)?, tag_offset));

        let consumed = start + open.len() + end + close.len();
        rest = &rest[consumed..];
        offset += consumed;
    }
    if !rest.is_empty() {
        tokens.push(Token::Text(rest.to_string()));
    }
    Ok(tokens)
}

fn classify(body: &str, offset: usize) -> Result<Tag, TemplateError> {
    let unknown = || TemplateError::UnknownTag {
        tag: body.to_string(),
        offset,
    };

    if body.starts_with('!') {
        return Ok(Tag::Comment);
    }
    if let Some(rest) = body.strip_prefix('#') {
        let (helper, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let block = Block::from_name(helper).ok_or_else(unknown)?;
        return Ok(Tag::Open(block, field_name(arg.trim(), offset)?));
    }
    if let Some(rest) = body.strip_prefix('/') {
        return Block::from_name(rest.trim()).map(Tag::Close).ok_or_else(unknown);
    }
    match body {
        "else" => return Ok(Tag::Else),
        "this" => return Ok(Tag::This),
        _ => {}
    }
    if let Some(args) = body
        .strip_prefix("media")
        .filter(|args| args.starts_with(char::is_whitespace))
    {
        let url = args.trim().strip_prefix("url=").ok_or_else(unknown)?;
        return Ok(Tag::Media(field_name(url.trim(), offset)?));
    }
    Ok(Tag::Field(field_name(body, offset)?))
}

fn field_name(name: &str, offset: usize) -> Result<String, TemplateError> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name.to_string())
    } else {
        Err(TemplateError::InvalidFieldName {
            name: name.to_string(),
            offset,
        })
    }
}

fn is_blank(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || c == '\t' || c == '\r')
}

fn blank_before(tokens: &[Token], i: usize) -> bool {
    if i == 0 {
        return true;
    }
    match &tokens[i - 1] {
        Token::Text(s) => match s.rfind('\n') {
            Some(n) => is_blank(&s[n + 1..]),
            None => i == 1 && is_blank(s),
        },
        Token::Tag(..) => false,
    }
}

fn blank_after(tokens: &[Token], i: usize) -> bool {
    let last = tokens.len() - 1;
    if i == last {
        return true;
    }
    match &tokens[i + 1] {
        Token::Text(s) => match s.find('\n') {
            Some(n) => is_blank(&s[..n]),
            None => i + 1 == last && is_blank(s),
        },
        Token::Tag(..) => false,
    }
}

/// Removes the line of every block tag that stands alone on it. Decisions are
/// made against the original text before any cut is applied.
fn strip_standalone(tokens: &mut [Token]) {
    if tokens.is_empty() {
        return;
    }
    let standalone: Vec<usize> = (0..tokens.len())
        .filter(|&i| matches!(&tokens[i], Token::Tag(tag, _) if tag.is_block()))
        .filter(|&i| blank_before(tokens, i) && blank_after(tokens, i))
        .collect();

    let mut cuts: Vec<(usize, usize)> = tokens
        .iter()
        .map(|t| match t {
            Token::Text(s) => (0, s.len()),
            Token::Tag(..) => (0, 0),
        })
        .collect();

    for i in standalone {
        if i > 0 {
            if let Token::Text(s) = &tokens[i - 1] {
                cuts[i - 1].1 = s.rfind('\n').map_or(0, |n| n + 1);
            }
        }
        if let Some(Token::Text(s)) = tokens.get(i + 1) {
            cuts[i + 1].0 = s.find('\n').map_or(s.len(), |n| n + 1);
        }
    }

    for (token, (start, end)) in tokens.iter_mut().zip(cuts) {
        if let Token::Text(s) = token {
            *s = if start < end { s[start..end].to_string() } else { String::new() };
        }
    }
}

enum Ending {
    Eof,
    Else,
    Close,
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    /// Parses until the end of input or the end of the enclosing block.
    fn parse_nodes(
        &mut self,
        open: Option<(Block, usize)>,
        each_depth: usize,
        in_else: bool,
    ) -> Result<(Vec<Node>, Ending), TemplateError> {
        let tokens = self.tokens;
        let mut nodes = Vec::new();

        while let Some(token) = tokens.get(self.pos) {
            self.pos += 1;
            let (tag, offset) = match token {
                Token::Text(text) => {
                    if !text.is_empty() {
                        nodes.push(Node::Text(text.clone()));
                    }
                    continue;
                }
                Token::Tag(tag, offset) => (tag, *offset),
            };

            match tag {
                Tag::Comment => {}
                Tag::Field(field) => nodes.push(Node::Field(field.clone())),
                Tag::Media(field) => nodes.push(Node::Media { field: field.clone() }),
                Tag::This if each_depth == 0 => {
                    return Err(TemplateError::ThisOutsideEach { offset });
                }
                Tag::This => nodes.push(Node::This),
                Tag::Open(block, field) => {
                    nodes.push(self.parse_block(*block, field, offset, each_depth)?);
                }
                Tag::Else => match open {
                    Some((Block::If, _)) if !in_else => return Ok((nodes, Ending::Else)),
                    _ => return Err(TemplateError::StrayElse { offset }),
                },
                Tag::Close(block) => {
                    return match open {
                        None => Err(TemplateError::UnexpectedClose {
                            found: block.name().to_string(),
                            offset,
                        }),
                        Some((expected, _)) if expected != *block => {
                            Err(TemplateError::MismatchedClose {
                                expected: expected.name().to_string(),
                                found: block.name().to_string(),
                                offset,
                            })
                        }
                        Some(_) => Ok((nodes, Ending::Close)),
                    };
                }
            }
        }

        match open {
            Some((block, offset)) => Err(TemplateError::Unclosed {
                block: block.name().to_string(),
                offset,
            }),
            None => Ok((nodes, Ending::Eof)),
        }
    }

    fn parse_block(
        &mut self,
        block: Block,
        field: &str,
        offset: usize,
        each_depth: usize,
    ) -> Result<Node, TemplateError> {
        let field = field.to_string();
        match block {
            Block::Each => {
                let (body, _) = self.parse_nodes(Some((block, offset)), each_depth + 1, false)?;
                Ok(Node::Each { field, body })
            }
            Block::If => {
                let (then, ending) = self.parse_nodes(Some((block, offset)), each_depth, false)?;
                let otherwise = match ending {
                    Ending::Else => self.parse_nodes(Some((block, offset)), each_depth, true)?.0,
                    Ending::Close | Ending::Eof => Vec::new(),
                };
                Ok(Node::If { field, then, otherwise })
            }
        }
    }
}
