//! Line-oriented request parsing.
//!
//! A request line is decoded, split into a command token and the
//! remainder, then the remainder has its recognized suffixes — encoding,
//! range, mode — stripped from the right in that fixed order, leaving the
//! pattern. A pattern that happens to contain a literal ` RANGE ` or
//! ` --mode ` token is parsed as if that were the real suffix, provided it
//! is the rightmost occurrence -- an inherited quirk, not a bug, and
//! deliberately left in place rather than fixed.

use std::fmt;

/// Matching mode requested for a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Exact,
    Partial,
}

/// The recognized command verbs. `Batch` is accepted by the
/// parser unconditionally; whether a given server variant supports it is a
/// session-layer concern (the basic server rejects it before dispatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Find,
    Count,
    FindMulti,
    Batch,
    Stats,
    Quit,
}

impl Command {
    fn from_token(token: &str) -> Option<Command> {
        match token {
            "FIND" => Some(Command::Find),
            "COUNT" => Some(Command::Count),
            "FIND_MULTI" => Some(Command::FindMulti),
            "BATCH" => Some(Command::Batch),
            "STATS" => Some(Command::Stats),
            "QUIT" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// A fully parsed request line, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    /// Raw pattern text (may itself contain whitespace, e.g. for `FIND_MULTI`
    /// or a `BATCH` JSON array).
    pub pattern: String,
    pub mode_override: Option<Mode>,
    pub range: Option<(usize, usize)>,
    pub gzip: bool,
}

/// Everything that maps to a `400 BAD-REQUEST <reason>` response. The
/// `Display` text is exactly the reason text that follows the status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Syntax,
    InvalidEncoding,
    InvalidRange,
    InvalidMode,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ParseError::Syntax => {
                "expected 'FIND <pattern>' or 'COUNT <pattern>' or 'STATS'"
            }
            ParseError::InvalidEncoding => "invalid encoding",
            ParseError::InvalidRange => "invalid RANGE",
            ParseError::InvalidMode => "invalid mode",
        };
        f.write_str(text)
    }
}

/// Parses one decoded request line (no trailing `\n`/`\r\n`).
///
/// `STATS` and `QUIT` have no pattern and are returned immediately after
/// the command token is recognized. Anything else requires a non-empty
/// remainder, which is a syntax error.
pub fn parse(line: &str) -> Result<Request, ParseError> {
    let mut parts = line.splitn(2, ' ');
    let command_token = parts.next().unwrap_or("").to_uppercase();
    let command = Command::from_token(&command_token).ok_or(ParseError::Syntax)?;

    if matches!(command, Command::Quit) {
        return Ok(Request {
            command,
            pattern: String::new(),
            mode_override: None,
            range: None,
            gzip: false,
        });
    }
    if matches!(command, Command::Stats) {
        return Ok(Request {
            command,
            pattern: String::new(),
            mode_override: None,
            range: None,
            gzip: false,
        });
    }

    let remainder = parts.next().unwrap_or("");
    if remainder.is_empty() {
        return Err(ParseError::Syntax);
    }

    let mut rest = remainder.to_string();
    let mut gzip = false;
    let mut range = None;
    let mut mode_override = None;

    if let Some(idx) = rest.rfind(" --accept-encoding ") {
        let tail = rest[idx + " --accept-encoding ".len()..].trim().to_string();
        rest.truncate(idx);
        if !tail.eq_ignore_ascii_case("gzip") {
            return Err(ParseError::InvalidEncoding);
        }
        gzip = true;
    }

    if let Some(idx) = rest.rfind(" RANGE ") {
        let tail = rest[idx + " RANGE ".len()..].trim().to_string();
        rest.truncate(idx);
        let tokens: Vec<&str> = tail.split_whitespace().collect();
        if tokens.len() != 2 || !tokens.iter().all(|t| t.chars().all(|c| c.is_ascii_digit()) && !t.is_empty()) {
            return Err(ParseError::InvalidRange);
        }
        let offset: usize = tokens[0].parse().map_err(|_| ParseError::InvalidRange)?;
        let limit: usize = tokens[1].parse().map_err(|_| ParseError::InvalidRange)?;
        range = Some((offset, limit));
    }

    if let Some(idx) = rest.rfind(" --mode ") {
        let tail = rest[idx + " --mode ".len()..].trim().to_lowercase();
        let pattern_part = rest[..idx].to_string();
        if pattern_part.is_empty() {
            return Err(ParseError::Syntax);
        }
        mode_override = Some(match tail.as_str() {
            "exact" => Mode::Exact,
            "partial" => Mode::Partial,
            _ => return Err(ParseError::InvalidMode),
        });
        rest = pattern_part;
    }

    if rest.is_empty() {
        return Err(ParseError::Syntax);
    }

    Ok(Request {
        command,
        pattern: rest,
        mode_override,
        range,
        gzip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_find() {
        let req = parse("FIND h?llo").unwrap();
        assert_eq!(req.command, Command::Find);
        assert_eq!(req.pattern, "h?llo");
        assert!(req.mode_override.is_none());
        assert!(req.range.is_none());
        assert!(!req.gzip);
    }

    #[test]
    fn find_with_range_and_mode() {
        // RANGE is stripped before --mode, so --mode must come first in the
        // request text for both to be recognized.
        let req = parse("FIND h?llo --mode exact RANGE 0 2").unwrap();
        assert_eq!(req.pattern, "h?llo");
        assert_eq!(req.range, Some((0, 2)));
        assert_eq!(req.mode_override, Some(Mode::Exact));
    }

    #[test]
    fn find_with_gzip_negotiation() {
        let req = parse("FIND ell --accept-encoding gzip").unwrap();
        assert!(req.gzip);
        assert_eq!(req.pattern, "ell");
    }

    #[test]
    fn suffixes_parsed_right_to_left_order() {
        // Stripped in this order: encoding, then range, then mode -- so in
        // the request text mode must precede range, which must precede
        // encoding, for all three to be recognized together.
        let req = parse("FIND ab --mode partial RANGE 1 2 --accept-encoding gzip").unwrap();
        assert_eq!(req.pattern, "ab");
        assert_eq!(req.range, Some((1, 2)));
        assert_eq!(req.mode_override, Some(Mode::Partial));
        assert!(req.gzip);
    }

    #[test]
    fn invalid_encoding_rejected() {
        assert_eq!(parse("FIND ell --accept-encoding brotli"), Err(ParseError::InvalidEncoding));
    }

    #[test]
    fn invalid_range_rejected() {
        assert_eq!(parse("FIND ell RANGE a b"), Err(ParseError::InvalidRange));
        assert_eq!(parse("FIND ell RANGE 1"), Err(ParseError::InvalidRange));
    }

    #[test]
    fn invalid_mode_rejected() {
        assert_eq!(parse("FIND ell --mode weird"), Err(ParseError::InvalidMode));
    }

    #[test]
    fn unknown_command_is_syntax_error() {
        assert_eq!(parse("PING"), Err(ParseError::Syntax));
    }

    #[test]
    fn quit_and_stats_need_no_pattern() {
        assert_eq!(parse("QUIT").unwrap().command, Command::Quit);
        assert_eq!(parse("STATS").unwrap().command, Command::Stats);
    }

    #[test]
    fn command_token_is_case_folded() {
        assert_eq!(parse("find ab").unwrap().command, Command::Find);
    }

    #[test]
    fn literal_range_token_rightmost_wins() {
        // A pattern that itself contains the literal word RANGE followed by
        // two digits is parsed as an actual RANGE suffix -- inherited
        // behavior, not a bug.
        let req = parse("FIND xRANGE RANGE 1 2").unwrap();
        assert_eq!(req.pattern, "xRANGE");
        assert_eq!(req.range, Some((1, 2)));
    }
}
