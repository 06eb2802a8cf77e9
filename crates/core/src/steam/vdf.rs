//! Valve KeyValues text, the format of `libraryfolders.vdf` and
//! `appmanifest_*.acf`.
//!
//! ```text
//! "AppState"
//! {
//!     "appid"      "1245620"
//!     "installdir" "ELDEN RING"
//! }
//! ```
//!
//! Keys and values are quoted or bare tokens, blocks nest with braces, and
//! `//` starts a comment. Platform conditionals such as `[$WIN32]` are
//! skipped.

use crate::error::{Error, Result};
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdfValue {
    Str(String),
    Map(VdfMap),
}

/// An ordered block of key/value pairs. Lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VdfMap {
    entries: Vec<(String, VdfValue)>,
}

impl VdfMap {
    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&VdfValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            VdfValue::Str(s) => Some(s),
            VdfValue::Map(_) => None,
        }
    }

    pub fn get_map(&self, key: &str) -> Option<&VdfMap> {
        match self.get(key)? {
            VdfValue::Map(m) => Some(m),
            VdfValue::Str(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VdfValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a whole document into its top-level block.
pub fn parse(text: &str) -> Result<VdfMap> {
    let mut lexer = Lexer::new(text.trim_start_matches('\u{feff}'));
    parse_block(&mut lexer, true)
}

fn parse_block(lexer: &mut Lexer<'_>, top_level: bool) -> Result<VdfMap> {
    let mut map = VdfMap::default();
    loop {
        let key = match lexer.next_token()? {
            None if top_level => return Ok(map),
            None => return Err(lexer.error("unexpected end of input inside a block")),
            Some(Token::Close) if !top_level => return Ok(map),
            Some(Token::Close) => return Err(lexer.error("unmatched '}'")),
            Some(Token::Open) => return Err(lexer.error("block without a key")),
            Some(Token::Text(key)) => key,
        };
        let value = match lexer.next_token()? {
            Some(Token::Text(value)) => VdfValue::Str(value),
            Some(Token::Open) => VdfValue::Map(parse_block(lexer, false)?),
            Some(Token::Close) | None => {
                return Err(lexer.error(&format!("key \"{key}\" has no value")))
            }
        };
        map.entries.push((key, value));
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Text(String),
    Open,
    Close,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, msg: &str) -> Error {
        Error::Steam(format!("VDF line {}: {msg}", self.line))
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        loop {
            let Some(&c) = self.chars.peek() else {
                return Ok(None);
            };
            match c {
                '\n' => {
                    self.line += 1;
                    self.chars.next();
                }
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '/' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'/') {
                        self.skip_line();
                    } else {
                        return Ok(Some(Token::Text(self.bare("/".to_string()))));
                    }
                }
                '[' => self.skip_conditional(),
                '{' => {
                    self.chars.next();
                    return Ok(Some(Token::Open));
                }
                '}' => {
                    self.chars.next();
                    return Ok(Some(Token::Close));
                }
                '"' => {
                    self.chars.next();
                    return self.quoted().map(|s| Some(Token::Text(s)));
                }
                _ => return Ok(Some(Token::Text(self.bare(String::new())))),
            }
        }
    }

    // stops before the newline so line counting stays in one place
    fn skip_line(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.chars.next();
        }
    }

    fn skip_conditional(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.chars.next();
            if c == ']' {
                break;
            }
        }
    }

    fn quoted(&mut self) -> Result<String> {
        let start = self.line;
        let mut out = String::new();
        loop {
            match self.chars.next() {
                None => {
                    return Err(Error::Steam(format!(
                        "VDF line {start}: unterminated string"
                    )))
                }
                Some('"') => return Ok(out),
                Some('\\') => match self.chars.next() {
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => {
                        return Err(Error::Steam(format!(
                            "VDF line {start}: unterminated string"
                        )))
                    }
                },
                Some('\n') => {
                    self.line += 1;
                    out.push('\n');
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn bare(&mut self, mut out: String) -> String {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || matches!(c, '"' | '{' | '}') {
                break;
            }
            out.push(c);
            self.chars.next();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIBRARY_FOLDERS: &str = r#"
"libraryfolders"
{
	"0"
	{
		"path"		"C:\\Program Files (x86)\\Steam"
		"label"		""
		"contentid"		"4213213371188887711"
		"apps"
		{
			"228980"		"460016478"
			"1245620"		"52301224110"
		}
	}
	"1"
	{
		"path"		"D:\\SteamLibrary"
		"label"		"Games SSD"
	}
}
"#;

    #[test]
    fn parses_nested_blocks() {
        let root = parse(LIBRARY_FOLDERS).unwrap();
        assert_eq!(root.len(), 1);
        let folders = root.get_map("libraryfolders").unwrap();
        assert_eq!(folders.len(), 2);

        let main = folders.get_map("0").unwrap();
        assert_eq!(main.get_str("path"), Some(r"C:\Program Files (x86)\Steam"));
        assert_eq!(main.get_str("label"), Some(""));
        assert_eq!(main.get_map("apps").unwrap().len(), 2);

        let second = folders.get_map("1").unwrap();
        assert_eq!(second.get_str("label"), Some("Games SSD"));
    }

    #[test]
    fn lookups_ignore_case() {
        let root = parse("\"AppState\" { \"InstallDir\" \"ELDEN RING\" }").unwrap();
        let state = root.get_map("appstate").unwrap();
        assert_eq!(state.get_str("installdir"), Some("ELDEN RING"));
        assert!(state.get_map("installdir").is_none());
    }

    #[test]
    fn comments_bare_tokens_and_conditionals() {
        let text = r#"
// generated
"root"
{
    key value // trailing
    "flag" "1" [$WIN32]
    "url" "https://store.steampowered.com/"
}
"#;
        let root = parse(text).unwrap();
        let block = root.get_map("root").unwrap();
        assert_eq!(block.get_str("key"), Some("value"));
        assert_eq!(block.get_str("flag"), Some("1"));
        assert_eq!(block.get_str("url"), Some("https://store.steampowered.com/"));
    }

    #[test]
    fn escapes() {
        let root = parse(r#""k" "a \"quoted\" \\ path\n""#).unwrap();
        assert_eq!(root.get_str("k"), Some("a \"quoted\" \\ path\n"));
    }

    #[test]
    fn iteration_keeps_file_order() {
        let root = parse(r#""b" "2" "a" "1" "b" "3""#).unwrap();
        let keys: Vec<&str> = root.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "b"]);
        assert_eq!(root.get_str("b"), Some("2"));
    }

    #[test]
    fn empty_document() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\u{feff}  // nothing\n").unwrap().is_empty());
    }

    #[test]
    fn malformed_input_reports_line() {
        let err = parse("\"root\"\n{\n  \"key\" \"value\"\n").unwrap_err();
        assert!(matches!(err, Error::Steam(ref m) if m.contains("line 4")), "{err}");

        assert!(parse("\"a\" \"b\" }").is_err());
        assert!(parse("{ }").is_err());
        assert!(parse("\"key\"").is_err());
        assert!(parse("\"key\" \"unterminated").is_err());
    }
}
