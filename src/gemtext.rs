//! Parsing of `text/gemini` documents ("gemtext").
//!
//! Gemtext is line oriented: every line is classified on its own by its prefix,
//! except inside a preformatted block, where lines are collected verbatim until
//! the closing fence.

use crate::url::resolve;
use nom::{
    IResult,
    Parser as _,
    bytes::complete::{tag, take_till1, take_while1},
    combinator::{map, rest, verify},
};
use tracing::warn;
use url::Url;

/// The marker that opens and closes a preformatted block.
const FENCE: &str = "```";

/// The default cap on the length of a single line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024;

/// A single parsed gemtext element.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// A heading (`#`, `##`, `###`, ...).
    Heading {
        /// The number of leading `#` markers.
        level: usize,
        /// The heading text.
        text: String,
    },
    /// A plain paragraph line.
    Text {
        /// The trimmed line.
        content: String,
    },
    /// A link (`=> url label`).
    Link {
        /// The URL exactly as written in the document.
        url_hint: String,
        /// The URL resolved against the URL of the page it appeared on.
        absolute_url: Url,
        /// The link label.
        label: String,
    },
    /// A list item (`* item`).
    ListItem {
        /// The item text.
        content: String,
    },
    /// A quote (`> quote`).
    Quote {
        /// The quoted text.
        content: String,
    },
    /// A preformatted block, rendered verbatim.
    Preformatted {
        /// The text after the opening fence.
        alt_text: String,
        /// The lines between the fences, joined with `\n`.
        body: String,
    },
}

/// A preformatted block that has been opened but not yet closed.
#[derive(Debug)]
struct PendingBlock {
    alt_text: String,
    lines: Vec<String>,
}

impl PendingBlock {
    fn finish(self) -> Line {
        Line::Preformatted { alt_text: self.alt_text, body: self.lines.join("\n") }
    }
}

fn whitespace(input: &str) -> IResult<&str, &str> {
    take_while1(char::is_whitespace).parse(input)
}

/// The rest of the line, trimmed, if it is not empty.
fn trailing_text(input: &str) -> IResult<&str, &str> {
    verify(map(rest, |text: &str| text.trim()), |text: &str| !text.is_empty()).parse(input)
}

/// `#`+, whitespace, text.
fn heading(input: &str) -> IResult<&str, (usize, &str)> {
    let (input, markers) = take_while1(|c: char| c == '#').parse(input)?;
    let (input, _) = whitespace(input)?;
    let (input, text) = trailing_text(input)?;

    Ok((input, (markers.len(), text)))
}

/// `=>`, whitespace, url, whitespace, label.
fn link(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, _) = tag("=>").parse(input)?;
    let (input, _) = whitespace(input)?;
    let (input, url) = take_till1(char::is_whitespace).parse(input)?;
    let (input, _) = whitespace(input)?;
    let (input, label) = trailing_text(input)?;

    Ok((input, (url, label)))
}

/// Cut `line` down to at most `max` bytes without splitting a character.
fn truncate(line: &str, max: usize) -> &str {
    if line.len() <= max {
        return line;
    }

    let mut end = max;
    while !line.is_char_boundary(end) {
        end -= 1;
    }

    warn!(length = line.len(), max, "truncating over-long gemtext line");
    &line[..end]
}

/// A lazy gemtext parser over a sequence of lines.
///
/// Links are resolved against `base`, the URL the document was requested from.
/// The parser yields each element as soon as it is complete; a preformatted
/// block is yielded when its closing fence is seen, or at the end of input if
/// the fence is never closed.
pub struct Parser<'a, I> {
    base: &'a Url,
    lines: I,
    max_line_length: usize,
    pending: Option<PendingBlock>,
}

impl<'a, I> Parser<'a, I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    /// Create a parser over `lines`, resolving links against `base`.
    pub fn new<T>(base: &'a Url, lines: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            base,
            lines: lines.into_iter(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            pending: None,
        }
    }

    /// Set the longest line, in bytes, that is classified in full.
    ///
    /// Longer lines are truncated before they are classified. Lines inside a
    /// preformatted block are kept whole.
    pub fn max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Classify a line outside of a preformatted block.
    fn classify(&mut self, line: &str) -> Option<Line> {
        if line.trim().is_empty() {
            return None;
        }

        if let Ok((_, (level, text))) = heading(line) {
            return Some(Line::Heading { level, text: text.to_string() });
        }

        if let Ok((_, (url_hint, label))) = link(line) {
            // an unresolvable target is shown as text, like a link without a label
            if let Ok(absolute_url) = resolve(self.base, url_hint) {
                return Some(Line::Link {
                    url_hint: url_hint.to_string(),
                    absolute_url,
                    label: label.to_string(),
                });
            }
        }

        if let Some(content) = line.strip_prefix("* ") {
            return Some(Line::ListItem { content: content.trim().to_string() });
        }

        if let Some(content) = line.strip_prefix('>') {
            return Some(Line::Quote { content: content.trim().to_string() });
        }

        if let Some(alt_text) = line.strip_prefix(FENCE) {
            self.pending = Some(PendingBlock { alt_text: alt_text.trim().to_string(), lines: Vec::new() });
            return None;
        }

        Some(Line::Text { content: line.trim().to_string() })
    }
}

impl<I> Iterator for Parser<'_, I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = Line;

    fn next(&mut self) -> Option<Line> {
        while let Some(line) = self.lines.next() {
            let line = line.as_ref();

            if let Some(block) = self.pending.as_mut() {
                if !line.starts_with(FENCE) {
                    block.lines.push(line.to_string());
                    continue;
                }
                return self.pending.take().map(PendingBlock::finish);
            }

            let line = truncate(line, self.max_line_length);
            if let Some(parsed) = self.classify(line) {
                return Some(parsed);
            }
        }

        // an unterminated block is still returned rather than dropped
        self.pending.take().map(PendingBlock::finish)
    }
}

/// Parse a whole document into its elements.
pub fn parse<I>(base: &Url, lines: I) -> Vec<Line>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    Parser::new(base, lines).collect()
}

/// Split decoded text into lines on `\n`, dropping a `\r` before each `\n`.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
}
