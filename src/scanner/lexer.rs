//! Line lexer separating code from comments and string literals
//!
//! Detectors never look at raw source text. Each line is turned into a
//! [`MaskedLine`] whose `code` has the same byte length as the original, with
//! every byte that belongs to a comment or to the inside of a string/char
//! literal replaced by a space. Byte offsets found in the masked text are
//! therefore valid offsets into the original line.
//!
//! Block comments carry across lines, so the lexer must see the lines of a
//! file in order. Raw string literals (`R"(...)"`) and strings continued with
//! a trailing backslash are not recognised.

/// Lexer state carried from one line to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Code,
    BlockComment,
}

/// A double-quoted string literal found on a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringToken {
    /// Byte offset of the opening quote
    pub start: usize,
    /// Byte offset just past the closing quote (or end of line if unterminated)
    pub end: usize,
    /// Contents between the quotes, escapes left as written
    pub text: String,
}

/// One source line with non-code bytes blanked out
#[derive(Debug, Clone, Default)]
pub struct MaskedLine {
    pub code: String,
    pub strings: Vec<StringToken>,
}

impl MaskedLine {
    /// Net change in brace depth contributed by this line
    pub fn brace_delta(&self) -> i32 {
        self.code.bytes().fold(0, |depth, b| match b {
            b'{' => depth + 1,
            b'}' => depth - 1,
            _ => depth,
        })
    }

    /// True when the line carries no code at all
    pub fn is_blank(&self) -> bool {
        self.code.trim().is_empty()
    }
}

/// Incremental lexer over the lines of one file
#[derive(Debug, Default)]
pub struct LineLexer {
    state: State,
}

impl LineLexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lex one line, updating the carried block-comment state
    pub fn mask_line(&mut self, line: &str) -> MaskedLine {
        let bytes = line.as_bytes();
        let len = bytes.len();
        let mut out: Vec<u8> = Vec::with_capacity(len);
        let mut strings = Vec::new();
        let mut i = 0;

        while i < len {
            match self.state {
                State::BlockComment => {
                    if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        out.extend_from_slice(b"  ");
                        i += 2;
                        self.state = State::Code;
                    } else {
                        out.push(b' ');
                        i += 1;
                    }
                }
                State::Code => match (bytes[i], bytes.get(i + 1)) {
                    (b'/', Some(b'/')) => {
                        out.resize(len, b' ');
                        i = len;
                    }
                    (b'/', Some(b'*')) => {
                        out.extend_from_slice(b"  ");
                        i += 2;
                        self.state = State::BlockComment;
                    }
                    (b'"', _) => {
                        let (end, content_end) = skip_quoted(bytes, i, b'"', &mut out);
                        strings.push(StringToken {
                            start: i,
                            end,
                            text: line[i + 1..content_end].to_string(),
                        });
                        i = end;
                    }
                    (b'\'', _) if !is_digit_separator(bytes, i) => {
                        let (end, _) = skip_quoted(bytes, i, b'\'', &mut out);
                        i = end;
                    }
                    (b, _) => {
                        out.push(b);
                        i += 1;
                    }
                },
            }
        }

        // Only ASCII spaces were substituted and code characters copied whole.
        let code = String::from_utf8(out)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());

        MaskedLine { code, strings }
    }
}

/// Mask a quoted literal starting at `start`. Quotes are kept, contents blanked.
///
/// Returns (offset past the literal, offset of the closing quote or line end).
fn skip_quoted(bytes: &[u8], start: usize, quote: u8, out: &mut Vec<u8>) -> (usize, usize) {
    out.push(quote);
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                out.push(b' ');
                i += 1;
                if i < bytes.len() {
                    out.push(b' ');
                    i += 1;
                }
            }
            b if b == quote => {
                out.push(quote);
                return (i + 1, i);
            }
            _ => {
                out.push(b' ');
                i += 1;
            }
        }
    }
    (i, i)
}

/// C++14 digit separator (`1'000'000`, `0xFF'FF`).
///
/// Only inside a token that starts with a digit, so the quote after a
/// character-literal prefix (`L'a'`, `u8'A'`) or an identifier opens a literal.
fn is_digit_separator(bytes: &[u8], i: usize) -> bool {
    if i == 0
        || !bytes[i - 1].is_ascii_alphanumeric()
        || !bytes.get(i + 1).is_some_and(|b| b.is_ascii_hexdigit())
    {
        return false;
    }
    let mut start = i;
    while start > 0 && matches!(bytes[start - 1], b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'\'' | b'.') {
        start -= 1;
    }
    bytes[start].is_ascii_digit() || (bytes[start] == b'.' && bytes.get(start + 1).is_some_and(u8::is_ascii_digit))
}

/// Lex every line of a file
pub fn mask_lines<'a, I>(lines: I) -> Vec<MaskedLine>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut lexer = LineLexer::new();
    lines.into_iter().map(|l| lexer.mask_line(l)).collect()
}
