//! Nom-based IRC line parser.
//!
//! Parsing never fails: malformed input yields whatever structure could be
//! recovered, with an empty command when none was found.

use nom::{
    bytes::complete::{take_till, take_until, take_while, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    error::{context, VerboseError},
    sequence::preceded,
    IResult,
};

type ParseResult<I, O> = IResult<I, O, VerboseError<I>>;

/// Parse IRCv3 message tags (the part after `@` and before the first space).
fn parse_tags(input: &str) -> ParseResult<&str, &str> {
    context(
        "parsing IRCv3 message tags",
        preceded(char('@'), take_until(" ")),
    )(input)
}

/// Parse the prefix: everything after `:` up to the next space.
fn parse_prefix(input: &str) -> ParseResult<&str, &str> {
    context(
        "parsing message prefix",
        preceded(char(':'), take_while(|c| c != ' ')),
    )(input)
}

/// Parse the command token.
fn parse_command(input: &str) -> ParseResult<&str, &str> {
    context("parsing IRC command", take_while1(|c| c != ' '))(input)
}

/// A parsed IRC line holding slices of its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine<'a> {
    /// Raw tags string (without the leading `@`), if present.
    pub tags: Option<&'a str>,
    /// Raw prefix string (without the leading `:`), if present.
    pub prefix: Option<&'a str>,
    /// The command token, empty when the line had none.
    pub command: &'a str,
    /// Byte offset of the command token in the (CR/LF-trimmed) input.
    pub command_offset: usize,
    /// Parameters, the trailing one with its `:` removed.
    pub params: Vec<&'a str>,
}

/// Parse a line of the form `[@tags] [:prefix] <command> [params...] [:trailing]`.
pub fn parse_line(input: &str) -> RawLine<'_> {
    let input = input.trim_end_matches(['\r', '\n']);

    let (rest, tags) = opt(parse_tags)(input).unwrap_or((input, None));
    let (rest, _) = space0::<_, VerboseError<&str>>(rest).unwrap_or((rest, ""));

    let (rest, prefix) = opt(parse_prefix)(rest).unwrap_or((rest, None));
    let (rest, _) = space0::<_, VerboseError<&str>>(rest).unwrap_or((rest, ""));

    let command_offset = input.len() - rest.len();
    let (rest, command) = match parse_command(rest) {
        Ok(parsed) => parsed,
        Err(_) => {
            return RawLine {
                tags,
                prefix,
                command: "",
                command_offset,
                params: Vec::new(),
            }
        }
    };

    let mut params: Vec<&str> = Vec::new();
    let mut rest = rest;

    while let Some(b' ') = rest.as_bytes().first().copied() {
        rest = &rest[1..];

        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing);
            break;
        }

        let (after, param) = take_till::<_, _, VerboseError<&str>>(|c| c == ' ')(rest)
            .unwrap_or(("", rest));
        // A zero-length token (doubled or trailing space) ends the list.
        if param.is_empty() {
            break;
        }
        params.push(param);
        rest = after;
    }

    RawLine {
        tags,
        prefix,
        command,
        command_offset,
        params,
    }
}
