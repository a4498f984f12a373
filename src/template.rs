//! Typed URL templates.
//!
//! Hosts describe their page URLs with a `str.format`-style string such as
//! `{url}/manga/{chapter}/{page:03}.jpg`. A [`UrlTemplate`] is parsed and
//! validated once, bound to a chapter with [`UrlTemplate::bind_chapter`], and
//! the resulting [`PageTemplate`] resolves one URL per page index.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template has no `{{{0}}}` slot")]
    MissingSlot(&'static str),

    #[error("unknown slot `{{{0}}}` in template")]
    UnknownSlot(String),

    #[error("unsupported format spec `{spec}` for slot `{slot}`")]
    UnsupportedSpec { slot: &'static str, spec: String },

    #[error("unmatched `{brace}` at byte {position}")]
    UnmatchedBrace { brace: char, position: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Url,
    Chapter,
    Page,
}

impl Slot {
    fn from_name(name: &str) -> Result<Self, TemplateError> {
        match name {
            "url" => Ok(Slot::Url),
            "chapter" => Ok(Slot::Chapter),
            "page" => Ok(Slot::Page),
            other => Err(TemplateError::UnknownSlot(other.to_string())),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Slot::Url => "url",
            Slot::Chapter => "chapter",
            Slot::Page => "page",
        }
    }
}

/// Width and padding of a numeric slot, e.g. `03` in `{page:03}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Padding {
    width: usize,
    zeros: bool,
}

impl Padding {
    fn parse(slot: Slot, spec: &str) -> Result<Self, TemplateError> {
        let unsupported = || TemplateError::UnsupportedSpec {
            slot: slot.name(),
            spec: spec.to_string(),
        };

        if spec.is_empty() {
            return Ok(Self::default());
        }
        if slot == Slot::Url {
            return Err(unsupported());
        }

        let digits = spec.strip_suffix('d').unwrap_or(spec);
        if digits.is_empty() {
            return Ok(Self::default());
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(unsupported());
        }

        let width = digits.parse::<usize>().map_err(|_| unsupported())?;
        Ok(Self {
            width,
            zeros: digits.starts_with('0'),
        })
    }

    fn render(self, value: u32) -> String {
        if self.zeros {
            format!("{:0width$}", value, width = self.width)
        } else {
            format!("{:>width$}", value, width = self.width)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Slot, Padding),
}

/// A validated host URL format with `url`, `chapter` and `page` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    format: String,
    segments: Vec<Segment>,
}

impl UrlTemplate {
    /// Parses `format`, rejecting unknown slots, malformed braces and
    /// templates without a `page` slot.
    pub fn parse(format: &str) -> Result<Self, TemplateError> {
        let segments = parse_segments(format)?;

        let has_page = segments
            .iter()
            .any(|segment| matches!(segment, Segment::Field(Slot::Page, _)));
        if !has_page {
            return Err(TemplateError::MissingSlot("page"));
        }

        Ok(Self {
            format: format.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.format
    }

    /// Resolves the chapter-level slots, leaving `page` open.
    pub fn bind_chapter(&self, url: &str, chapter: u32) -> PageTemplate {
        let mut parts = Vec::new();
        let mut literal = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => literal.push_str(text),
                Segment::Field(Slot::Url, _) => literal.push_str(url),
                Segment::Field(Slot::Chapter, padding) => literal.push_str(&padding.render(chapter)),
                Segment::Field(Slot::Page, padding) => {
                    if !literal.is_empty() {
                        parts.push(PagePart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(PagePart::Page(*padding));
                }
            }
        }
        if !literal.is_empty() {
            parts.push(PagePart::Literal(literal));
        }

        PageTemplate { parts }
    }
}

impl FromStr for UrlTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PagePart {
    Literal(String),
    Page(Padding),
}

/// A template bound to one chapter; only the page index is still open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTemplate {
    parts: Vec<PagePart>,
}

impl PageTemplate {
    pub fn bind_page(&self, index: u32) -> String {
        let mut url = String::new();
        for part in &self.parts {
            match part {
                PagePart::Literal(text) => url.push_str(text),
                PagePart::Page(padding) => url.push_str(&padding.render(index)),
            }
        }
        url
    }
}

impl fmt::Display for PageTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                PagePart::Literal(text) => f.write_str(text)?,
                PagePart::Page(_) => f.write_str("{page}")?,
            }
        }
        Ok(())
    }
}

fn parse_segments(format: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = format.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, '{')) | None => {
                            return Err(TemplateError::UnmatchedBrace { brace: '{', position })
                        }
                        Some((_, c)) => field.push(c),
                    }
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(parse_field(&field)?);
            }
            '}' => return Err(TemplateError::UnmatchedBrace { brace: '}', position }),
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn parse_field(field: &str) -> Result<Segment, TemplateError> {
    let (name, spec) = field.split_once(':').unwrap_or((field, ""));
    let slot = Slot::from_name(name.trim())?;
    let padding = Padding::parse(slot, spec)?;
    Ok(Segment::Field(slot, padding))
}
