//! Quote-aware splitting of a line into words, and of a word into quoting segments.

use crate::error::{Result, ShellError};

/// The quoting context a piece of text was captured under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    Unquoted,
    Single,
    Double,
    /// The body of a `$(...)` command substitution.
    Substitution,
}

/// A run of text from one word together with its quoting context.
///
/// `text` excludes the delimiters: `'a b'` yields `a b` with [`Quoting::Single`].
/// Backslash escapes are kept as written; the interpolator resolves them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub quoting: Quoting,
}

impl Token {
    pub fn new(text: impl Into<String>, quoting: Quoting) -> Self {
        Token {
            text: text.into(),
            quoting,
        }
    }
}

/// Quote tracking shared by every char-by-char scanner in the crate.
///
/// Feed each char in order; [`QuoteState::feed`] reports whether the char is
/// "free": unquoted, unescaped and outside any `$(...)`.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct QuoteState {
    sq: bool,
    dq: bool,
    esc: bool,
    /// Nesting depth of `$(` (and plain parens inside it).
    depth: usize,
    /// The `(` of a `$(` is still to come.
    opening: bool,
    sub_sq: bool,
    sub_dq: bool,
}

impl QuoteState {
    pub(crate) fn feed(&mut self, c: char, next: Option<char>) -> bool {
        if self.esc {
            self.esc = false;
            return false;
        }
        if self.opening {
            self.opening = false;
            return false;
        }
        if self.depth > 0 {
            if self.sub_sq {
                self.sub_sq = c != '\'';
                return false;
            }
            match c {
                '\\' => self.esc = true,
                '\'' if !self.sub_dq => self.sub_sq = true,
                '"' => self.sub_dq = !self.sub_dq,
                '(' if !self.sub_dq => self.depth += 1,
                ')' if !self.sub_dq => self.depth -= 1,
                _ => {}
            }
            return false;
        }
        if self.sq {
            self.sq = c != '\'';
            return false;
        }
        match c {
            '\\' => {
                self.esc = true;
                false
            }
            '\'' if !self.dq => {
                self.sq = true;
                false
            }
            '"' => {
                self.dq = !self.dq;
                false
            }
            '$' if next == Some('(') => {
                self.depth = 1;
                self.opening = true;
                false
            }
            _ => !self.dq,
        }
    }

    /// Fail if anything opened is still open.
    pub(crate) fn finish(&self) -> Result<()> {
        if self.depth > 0 {
            Err(ShellError::UnmatchedSubstitution)
        } else if self.sq {
            Err(ShellError::UnmatchedQuote('\''))
        } else if self.dq {
            Err(ShellError::UnmatchedQuote('"'))
        } else {
            Ok(())
        }
    }
}

/// Split a line into raw words and operator words.
///
/// Quotes and escapes are kept in the words so later stages still see the
/// quoting context. Operators (`;`, `&`, `&&`, `||`, `|`, `|&`, `<`, `>`,
/// `>>`, `2>`, `2>>`, `&>`, `&>>`, `2>&1`) become words of their own even
/// without surrounding whitespace. An unquoted word starting with `#`
/// ends the line.
pub fn split_words(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut buf = String::new();

    let chars: Vec<char> = line.chars().collect();
    let len = chars.len();
    let mut i = 0;
    let mut state = QuoteState::default();

    while i < len {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if !state.feed(c, next) {
            buf.push(c);
            i += 1;
            continue;
        }

        if c.is_whitespace() {
            flush(&mut buf, &mut words);
            i += 1;
            continue;
        }
        if c == '#' && buf.is_empty() {
            break;
        }

        let rest = &chars[i..];
        let op = match c {
            '>' if buf == "2" => {
                buf.clear();
                if starts_with(rest, ">&1") {
                    "2>&1"
                } else if starts_with(rest, ">>") {
                    "2>>"
                } else {
                    "2>"
                }
            }
            '>' if starts_with(rest, ">>") => ">>",
            '>' => ">",
            '<' => "<",
            ';' => ";",
            '&' if starts_with(rest, "&&") => "&&",
            '&' if starts_with(rest, "&>>") => "&>>",
            '&' if starts_with(rest, "&>") => "&>",
            '&' => "&",
            '|' if starts_with(rest, "||") => "||",
            '|' if starts_with(rest, "|&") => "|&",
            '|' => "|",
            _ => {
                buf.push(c);
                i += 1;
                continue;
            }
        };
        flush(&mut buf, &mut words);
        words.push(op.to_string());
        // "2>..." consumed the "2" from the buffer, not from `rest`
        i += if op.starts_with('2') {
            op.len() - 1
        } else {
            op.len()
        };
    }

    state.finish()?;
    flush(&mut buf, &mut words);
    Ok(words)
}

fn flush(buf: &mut String, words: &mut Vec<String>) {
    if !buf.is_empty() {
        words.push(std::mem::take(buf));
    }
}

fn starts_with(chars: &[char], pattern: &str) -> bool {
    let mut it = chars.iter();
    pattern.chars().all(|p| it.next() == Some(&p))
}

/// Whether a raw word is an operator or redirection token.
pub fn is_operator(word: &str) -> bool {
    super::Operator::from_word(word).is_some() || super::RedirectKind::from_word(word).is_some()
}

/// Split one raw word into its quoting segments.
///
/// `a"b c"'d'$(e)` becomes `a` (unquoted), `b c` (double), `d` (single)
/// and `e` (substitution).
pub fn tokenize(word: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut cur = String::new();

    let chars: Vec<char> = word.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        match c {
            '\\' => {
                cur.push(c);
                if let Some(&n) = chars.get(i + 1) {
                    cur.push(n);
                    i += 1;
                }
                i += 1;
            }
            '\'' => {
                push_plain(&mut cur, &mut tokens);
                let end = (i + 1..len)
                    .find(|&j| chars[j] == '\'')
                    .ok_or(ShellError::UnmatchedQuote('\''))?;
                tokens.push(Token::new(collect(&chars[i + 1..end]), Quoting::Single));
                i = end + 1;
            }
            '"' => {
                push_plain(&mut cur, &mut tokens);
                let end = closing_double(&chars, i + 1).ok_or(ShellError::UnmatchedQuote('"'))?;
                tokens.push(Token::new(collect(&chars[i + 1..end]), Quoting::Double));
                i = end + 1;
            }
            '$' if chars.get(i + 1) == Some(&'(') => {
                push_plain(&mut cur, &mut tokens);
                let end = closing_paren(&chars, i + 2).ok_or(ShellError::UnmatchedSubstitution)?;
                tokens.push(Token::new(
                    collect(&chars[i + 2..end]),
                    Quoting::Substitution,
                ));
                i = end + 1;
            }
            _ => {
                cur.push(c);
                i += 1;
            }
        }
    }
    push_plain(&mut cur, &mut tokens);
    Ok(tokens)
}

fn push_plain(cur: &mut String, tokens: &mut Vec<Token>) {
    if !cur.is_empty() {
        tokens.push(Token::new(std::mem::take(cur), Quoting::Unquoted));
    }
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

/// Index of the `"` closing a double-quoted run that starts at `start`.
pub(crate) fn closing_double(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' => return Some(i),
            '$' if chars.get(i + 1) == Some(&'(') => i = closing_paren(chars, i + 2)? + 1,
            _ => i += 1,
        }
    }
    None
}

/// Index of the `)` closing a `$(` whose body starts at `start`.
pub(crate) fn closing_paren(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let (mut sq, mut dq, mut esc) = (false, false, false);
    for (i, &c) in chars.iter().enumerate().skip(start) {
        if esc {
            esc = false;
            continue;
        }
        if sq {
            sq = c != '\'';
            continue;
        }
        match c {
            '\\' => esc = true,
            '\'' if !dq => sq = true,
            '"' => dq = !dq,
            '(' if !dq => depth += 1,
            ')' if !dq => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
