//! Grammars shared by the diff model, the prompt responder and the CLI.
//!
//! The hunk header and patch prompt grammars are written with [`nom`]; the
//! `FILE:N` chunk reference syntax accepted on the command line is a plain
//! split, like the rest of the user-facing syntax.
//!
//! # Hunk headers
//!
//! ```text
//! @@ -<start>[,<count>] +<start>[,<count>] @@[ <context>]
//! @@@ -<start>,<count> -<start>,<count> +<start>,<count> @@@[ <context>]
//! ```
//!
//! The number of `@` characters minus one is the number of pre-images, so the
//! second form is the combined diff git prints for unmerged paths.
//!
//! # Examples
//!
//! ```
//! use git_chunk_stager::parse::{parse_chunk_ref, parse_hunk_header};
//!
//! let header = parse_hunk_header("@@ -10,2 +10,3 @@ fn main()").unwrap();
//! assert_eq!(header.new.start, 10);
//! assert_eq!(header.new.count, 3);
//! assert_eq!(header.context, "fn main()");
//!
//! let chunk = parse_chunk_ref("src/lib.rs:2").unwrap();
//! assert_eq!(chunk.file, "src/lib.rs");
//! assert_eq!(chunk.index.get(), 2);
//! ```

use crate::diff::chunk::{HunkHeader, LineRange};
use error_set::error_set;
use nom::bytes::complete::{tag, take_till1, take_until, take_while_m_n};
use nom::character::complete::{char, space1, u32 as dec_u32};
use nom::combinator::{eof, opt};
use nom::multi::count;
use nom::sequence::{delimited, preceded, separated_pair};
use nom::{IResult, Parser};
use std::fmt;
use std::num::NonZeroUsize;

error_set! {
    /// Errors from parsing diff text, status output and chunk references
    ParseError := {
        /// Text does not begin with a `diff --git` (or combined `diff --cc`) line
        #[display("Missing diff header: expected 'diff --git', got '{line}'")]
        MissingHeader { line: String },
        /// First line of a chunk does not follow the hunk header grammar
        #[display("Malformed hunk header '{header}'")]
        MalformedHunkHeader { header: String },
        /// Chunk reference does not contain a colon separator
        #[display("Invalid chunk reference '{input}': expected 'file:N'")]
        InvalidChunkRef { input: String },
        /// Path portion of a reference or status entry is empty
        #[display("Invalid format '{input}': path cannot be empty")]
        EmptyPath { input: String },
        /// Chunk index is not a positive integer
        #[display("Invalid chunk index '{value}'")]
        InvalidChunkIndex { value: String },
        /// Porcelain status record is truncated or has no path
        #[display("Malformed status entry '{entry}'")]
        MalformedStatusEntry { entry: String },
    }
}

/// A recoverable problem found while parsing.
///
/// Warnings never abort parsing: the offending chunk or file is skipped (or a
/// conflict marker is demoted to a plain line) and the rest is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// Position of the chunk within its file, when the warning is chunk-local
    pub ordinal: Option<usize>,
    pub message: String,
}

impl ParseWarning {
    pub(crate) fn chunk(ordinal: usize, message: impl Into<String>) -> Self {
        Self {
            ordinal: Some(ordinal),
            message: message.into(),
        }
    }

    pub(crate) fn file(message: impl Into<String>) -> Self {
        Self {
            ordinal: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ordinal {
            Some(ordinal) => write!(f, "chunk {}: {}", ordinal + 1, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Parse a hunk header line into its ranges and trailing context.
///
/// # Errors
///
/// Returns [`ParseError::MalformedHunkHeader`] when the line does not follow
/// the `@@ -a,b +c,d @@` grammar.
pub fn parse_hunk_header(line: &str) -> Result<HunkHeader, ParseError> {
    hunk_header(line)
        .map(|(_, header)| header)
        .map_err(|_| ParseError::MalformedHunkHeader {
            header: line.to_string(),
        })
}

fn hunk_header(input: &str) -> IResult<&str, HunkHeader> {
    let (input, marker) = hunk_marker(input)?;
    let (input, old) = count(old_range, marker.len() - 1).parse(input)?;
    let (input, new) = new_range(input)?;
    let (context, _) = closing_marker(input, marker)?;

    Ok((
        "",
        HunkHeader {
            old,
            new,
            context: context.trim_start().to_string(),
        },
    ))
}

fn hunk_marker(input: &str) -> IResult<&str, &str> {
    take_while_m_n(2, 8, |c| c == '@').parse(input)
}

fn old_range(input: &str) -> IResult<&str, LineRange> {
    preceded((space1, char('-')), line_range).parse(input)
}

fn new_range(input: &str) -> IResult<&str, LineRange> {
    preceded((space1, char('+')), line_range).parse(input)
}

fn closing_marker<'a>(input: &'a str, marker: &str) -> IResult<&'a str, &'a str> {
    preceded(space1, tag(marker)).parse(input)
}

/// `<start>[,<count>]`, where an omitted count means one line
fn line_range(input: &str) -> IResult<&str, LineRange> {
    (dec_u32, opt(preceded(char(','), dec_u32)))
        .map(|(start, count)| LineRange {
            start,
            count: count.unwrap_or(1),
        })
        .parse(input)
}

/// The pieces of an interactive patch prompt line such as
/// `(2/3) Stage this hunk [y,n,q,a,d,j,J,g,/,e,p,?]? `.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PromptLine<'a> {
    /// `(k/N)`: one-based position and total, absent on older git versions
    pub position: Option<(u32, u32)>,
    pub action: &'a str,
    pub choices: &'a str,
}

pub(crate) fn parse_prompt_line(line: &str) -> Option<PromptLine<'_>> {
    prompt_line(line).ok().map(|(_, prompt)| prompt)
}

fn prompt_line(input: &str) -> IResult<&str, PromptLine<'_>> {
    let (input, position) = opt(prompt_position).parse(input)?;
    let (input, action) = prompt_action(input)?;
    let (input, choices) = prompt_choices(input)?;
    let (input, _) = end_of_line(input)?;

    Ok((
        input,
        PromptLine {
            position,
            action,
            choices,
        },
    ))
}

fn prompt_position(input: &str) -> IResult<&str, (u32, u32)> {
    delimited(
        char('('),
        separated_pair(dec_u32, char('/'), dec_u32),
        tag(") "),
    )
    .parse(input)
}

fn prompt_action(input: &str) -> IResult<&str, &str> {
    take_until(" [").parse(input)
}

fn prompt_choices(input: &str) -> IResult<&str, &str> {
    delimited(tag(" ["), take_till1(|c| c == ']'), tag("]? ")).parse(input)
}

fn end_of_line(input: &str) -> IResult<&str, &str> {
    eof.parse(input)
}

/// A `FILE:N` reference naming the N-th chunk (one-based) of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRef {
    pub file: String,
    pub index: NonZeroUsize,
}

/// Parse a `FILE:N` chunk reference.
///
/// The split happens at the last colon, so paths containing colons work.
///
/// # Errors
///
/// Returns [`ParseError`] if:
/// - Input doesn't contain `:` separator
/// - File name is empty or whitespace
/// - The index is not a positive integer
pub fn parse_chunk_ref(input: &str) -> Result<ChunkRef, ParseError> {
    let Some((file, index)) = input.rsplit_once(':') else {
        return Err(ParseError::InvalidChunkRef {
            input: input.to_string(),
        });
    };

    let file = file.trim();
    if file.is_empty() {
        return Err(ParseError::EmptyPath {
            input: input.to_string(),
        });
    }

    let index = index
        .trim()
        .parse::<NonZeroUsize>()
        .map_err(|_| ParseError::InvalidChunkIndex {
            value: index.to_string(),
        })?;

    Ok(ChunkRef {
        file: file.to_string(),
        index,
    })
}
