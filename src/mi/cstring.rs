//! C-string literals as used by MI: escaping for the input side and
//! transcoding of escaped output strings.
//!
//! The backend emits non-ASCII text either raw or as octal escaped bytes.
//! Decoded bytes are treated as UTF-8 when they form valid UTF-8 and as
//! Latin-1 otherwise.

use super::ParseError;

/// Decode the content of a C-string literal (without surrounding quotes).
pub fn unescape(raw: &str) -> Result<String, ParseError> {
    let mut bytes: Vec<u8> = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }

        let Some(esc) = chars.next() else {
            return Err(ParseError::CString("dangling escape at the end of string"));
        };
        match esc {
            'a' => bytes.push(0x07),
            'b' => bytes.push(0x08),
            'e' | 'E' => bytes.push(0x1b),
            'f' => bytes.push(0x0c),
            'n' => bytes.push(b'\n'),
            'r' => bytes.push(b'\r'),
            't' => bytes.push(b'\t'),
            'v' => bytes.push(0x0b),
            '\'' | '"' | '\\' | '?' => bytes.push(esc as u8),
            '0'..='7' => {
                let mut value = esc as u32 - '0' as u32;
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                let byte =
                    u8::try_from(value).map_err(|_| ParseError::CString("octal escape overflow"))?;
                bytes.push(byte);
            }
            other => {
                // unknown escapes keep the escaped character
                let mut buf = [0; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    Ok(transcode(bytes))
}

fn transcode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

/// Escape a string into C-string literal content.
///
/// `"` and non-printable characters are always escaped. `\`, `'` and `?` are
/// escaped only if `escape_backslash` is set.
pub fn escape(s: &str, escape_backslash: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        push_escaped(&mut out, c, escape_backslash);
    }
    out
}

/// Render an argument as a quoted C-string literal suitable for MI input.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '\\' {
            out.push_str("\\\\");
        } else {
            push_escaped(&mut out, c, false);
        }
    }
    out.push('"');
    out
}

fn push_escaped(out: &mut String, c: char, escape_backslash: bool) {
    match c {
        '"' => out.push_str("\\\""),
        '\\' | '\'' | '?' if escape_backslash => {
            out.push('\\');
            out.push(c);
        }
        '\0' => out.push_str("\\0"),
        '\x07' => out.push_str("\\a"),
        '\x08' => out.push_str("\\b"),
        '\t' => out.push_str("\\t"),
        '\n' => out.push_str("\\n"),
        '\x0b' => out.push_str("\\v"),
        '\x0c' => out.push_str("\\f"),
        '\r' => out.push_str("\\r"),
        '\x1b' => out.push_str("\\e"),
        c if (c as u32) <= 0xff && c.is_control() => {
            out.push_str(&format!("\\{:03o}", c as u32));
        }
        c => out.push(c),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unescape() {
        struct TestCase {
            raw: &'static str,
            expected: &'static str,
        }
        let cases = vec![
            TestCase {
                raw: "",
                expected: "",
            },
            TestCase {
                raw: "ASCII",
                expected: "ASCII",
            },
            TestCase {
                raw: "abc\\ndef\\tghi",
                expected: "abc\ndef\tghi",
            },
            TestCase {
                raw: "say \\\"hi\\\"",
                expected: "say \"hi\"",
            },
            // utf-8 sequence as octal bytes
            TestCase {
                raw: "abc\\303\\244def",
                expected: "abc\u{e4}def",
            },
            // lone latin-1 byte
            TestCase {
                raw: "abc\\344",
                expected: "abc\u{e4}",
            },
            TestCase {
                raw: "\\0\\1\\177",
                expected: "\0\u{1}\u{7f}",
            },
            TestCase {
                raw: "\\e\\E\\?\\'",
                expected: "\x1b\x1b?'",
            },
        ];

        for tc in cases {
            assert_eq!(unescape(tc.raw).unwrap(), tc.expected, "{}", tc.raw);
        }
    }

    #[test]
    fn test_unescape_errors() {
        assert!(unescape("abc\\").is_err());
        assert!(unescape("\\777").is_err());
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("", true), "");
        assert_eq!(escape("abc", true), "abc");
        assert_eq!(escape("\n\x08", true), "\\n\\b");
        assert_eq!(
            escape("\0\x01\x02\x03\x04\x05\x06\x07\x08\t\n\x0b\x0c\r\x0e\x0f", true),
            "\\0\\001\\002\\003\\004\\005\\006\\a\\b\\t\\n\\v\\f\\r\\016\\017"
        );
        assert_eq!(escape("\x1b", true), "\\e");
        assert_eq!(escape("\\", true), "\\\\");
        assert_eq!(escape("\\", false), "\\");
        assert_eq!(escape("'\t\\", true), "\\'\\t\\\\");
        assert_eq!(escape("'\t\\", false), "'\\t\\");
        assert_eq!(escape("abc\u{7f}def", true), "abc\\177def");
        assert_eq!(escape("\u{98}", true), "\\230");
        assert_eq!(escape("?mno\"", true), "\\?mno\\\"");
        assert_eq!(escape("?mno\"", false), "?mno\\\"");
        assert_eq!(escape("\u{e4}", true), "\u{e4}");
    }

    #[test]
    fn test_quote_roundtrip() {
        let arg = "C:\\dir with space\\\"x\".c\n";
        let quoted = quote(arg);
        assert!(quoted.starts_with('"') && quoted.ends_with('"'));
        assert_eq!(unescape(&quoted[1..quoted.len() - 1]).unwrap(), arg);
    }
}
