//! Lightweight lexical scanning over script text.
//!
//! Only enough of the grammar is understood to find matching braces and
//! top-level separators: string literals (`'`, `"`, backticks), regex
//! literals and comments are skipped, everything else is treated as code.
//! A `/` starts a regex literal only after an operator or opening bracket, so
//! a regex following a keyword such as `return` is read as division.

/// Bytes after which a `/` begins a regex literal rather than a division
const REGEX_PREFIX: &[u8] = b"(,=:[!&|?{};+-*%<>~^";

/// Iterates over the bytes of `text` that are outside strings, regex
/// literals and comments
struct CodeBytes<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Last non-whitespace code byte
    prev: Option<u8>,
}

impl<'a> CodeBytes<'a> {
    fn new(text: &'a str, start: usize) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: start,
            prev: None,
        }
    }

    fn regex_allowed(&self) -> bool {
        self.prev.map_or(true, |b| REGEX_PREFIX.contains(&b))
    }

    /// End of the regex literal starting at `start`, if it closes on this line
    fn skip_regex(&self, start: usize) -> Option<usize> {
        let mut in_class = false;
        let mut i = start + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                b'\n' => return None,
                b'[' => {
                    in_class = true;
                    i += 1;
                }
                b']' => {
                    in_class = false;
                    i += 1;
                }
                b'/' if !in_class => return Some(i + 1),
                _ => i += 1,
            }
        }
        None
    }

    fn skip_string(&self, start: usize) -> usize {
        let quote = self.bytes[start];
        let mut i = start + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                b if b == quote => return i + 1,
                _ => i += 1,
            }
        }
        self.bytes.len()
    }

    fn skip_line_comment(&self, start: usize) -> usize {
        self.bytes[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(self.bytes.len(), |offset| start + offset + 1)
    }

    fn skip_block_comment(&self, start: usize) -> usize {
        self.bytes[start + 2..]
            .windows(2)
            .position(|w| w == b"*/")
            .map_or(self.bytes.len(), |offset| start + 2 + offset + 2)
    }
}

impl Iterator for CodeBytes<'_> {
    type Item = (usize, u8);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.bytes.len() {
            let i = self.pos;
            let b = self.bytes[i];
            let next = self.bytes.get(i + 1).copied();
            match (b, next) {
                (b'"' | b'\'' | b'`', _) => {
                    self.pos = self.skip_string(i);
                    self.prev = Some(b);
                }
                (b'/', Some(b'/')) => self.pos = self.skip_line_comment(i),
                (b'/', Some(b'*')) => self.pos = self.skip_block_comment(i),
                (b'/', _) if self.regex_allowed() => match self.skip_regex(i) {
                    Some(end) => {
                        self.pos = end;
                        self.prev = Some(b'/');
                    }
                    None => {
                        self.pos = i + 1;
                        self.prev = Some(b);
                        return Some((i, b));
                    }
                },
                _ => {
                    self.pos = i + 1;
                    if !b.is_ascii_whitespace() {
                        self.prev = Some(b);
                    }
                    return Some((i, b));
                }
            }
        }
        None
    }
}

/// Find the `}` matching the `{` at byte offset `open`
pub fn matching_brace(text: &str, open: usize) -> Option<usize> {
    if text.as_bytes().get(open) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    for (i, b) in CodeBytes::new(text, open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
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

/// Text between the `{` at `open` and its matching `}`
pub fn block_body(text: &str, open: usize) -> Option<&str> {
    let close = matching_brace(text, open)?;
    Some(&text[open + 1..close])
}

/// Split `text` on `sep` where it appears outside any bracket pair.
///
/// Pieces are trimmed and empty pieces dropped.
pub fn split_top_level(text: &str, sep: u8) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, b) in CodeBytes::new(text, 0) {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            _ if b == sep && depth == 0 => {
                pieces.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&text[start..]);
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Remove all whitespace, for shape comparisons that ignore formatting
pub fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
