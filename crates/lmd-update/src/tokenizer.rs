//! Tokenizer adapter: turns a document into a lazy stream of classified tokens.

use flate2::read::GzDecoder;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

/// A classified unit of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word: contains at least one letter or digit.
    Word(String),
    /// Whitespace, punctuation and everything else.
    Other(String),
}

impl Token {
    fn classify(segment: &str) -> Self {
        if segment.chars().any(char::is_alphanumeric) {
            Token::Word(segment.to_string())
        } else {
            Token::Other(segment.to_string())
        }
    }

    pub fn is_word(&self) -> bool {
        matches!(self, Token::Word(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Token::Word(s) | Token::Other(s) => s,
        }
    }
}

/// Boxed token stream handed to the extractor.
pub type Tokens = Box<dyn Iterator<Item = io::Result<Token>> + Send>;

/// Source of token streams for documents.
pub trait Tokenizer: Send + Sync {
    /// Open a document and start streaming its tokens.
    fn open(&self, path: &Path) -> io::Result<Tokens>;
}

/// Tokenizer for plain UTF-8 text, splitting on Unicode word boundaries.
///
/// Files ending in `.gz` are decompressed on the fly. Invalid UTF-8 is
/// replaced rather than rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextTokenizer;

impl Tokenizer for PlainTextTokenizer {
    fn open(&self, path: &Path) -> io::Result<Tokens> {
        let file = File::open(path)?;
        let reader: Box<dyn BufRead + Send> =
            if path.extension().is_some_and(|ext| ext == "gz") {
                Box::new(BufReader::with_capacity(1 << 20, GzDecoder::new(file)))
            } else {
                Box::new(BufReader::with_capacity(1 << 20, file))
            };
        Ok(Box::new(TokenStream::new(reader)))
    }
}

/// Lazy, non-restartable token iterator over a reader, one line at a time.
pub struct TokenStream<R> {
    reader: R,
    line: Vec<u8>,
    pending: VecDeque<Token>,
    done: bool,
}

impl<R: BufRead> TokenStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for TokenStream<R> {
    type Item = io::Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }
            if self.done {
                return None;
            }

            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {
                    let text = String::from_utf8_lossy(&self.line);
                    self.pending
                        .extend(text.split_word_bounds().map(Token::classify));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn words(text: &str) -> Vec<String> {
        TokenStream::new(text.as_bytes())
            .filter_map(|t| match t.unwrap() {
                Token::Word(w) => Some(w),
                Token::Other(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_words_and_other_tokens() {
        let tokens: Vec<Token> = TokenStream::new("The cat, sat.".as_bytes())
            .map(|t| t.unwrap())
            .collect();
        assert_eq!(tokens[0], Token::Word("The".to_string()));
        assert!(tokens.contains(&Token::Other(",".to_string())));
        assert_eq!(tokens.iter().filter(|t| t.is_word()).count(), 3);
    }

    #[test]
    fn test_words_across_lines() {
        assert_eq!(
            words("one two\nthree\n\nfour 5th"),
            vec!["one", "two", "three", "four", "5th"]
        );
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let bytes: &[u8] = b"ok \xff fine";
        let got: Vec<String> = TokenStream::new(bytes)
            .filter_map(|t| t.ok())
            .filter(Token::is_word)
            .map(|t| t.text().to_string())
            .collect();
        assert_eq!(got, vec!["ok", "fine"]);
    }

    #[test]
    fn test_open_plain_and_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("doc.txt");
        std::fs::write(&plain, "alpha beta gamma").unwrap();

        let gz = dir.path().join("doc.txt.gz");
        let mut enc = flate2::write::GzEncoder::new(
            File::create(&gz).unwrap(),
            flate2::Compression::default(),
        );
        enc.write_all(b"alpha beta gamma").unwrap();
        enc.finish().unwrap();

        for path in [&plain, &gz] {
            let got: Vec<String> = PlainTextTokenizer
                .open(path)
                .unwrap()
                .filter_map(|t| t.ok())
                .filter(Token::is_word)
                .map(|t| t.text().to_string())
                .collect();
            assert_eq!(got, vec!["alpha", "beta", "gamma"]);
        }
    }

    #[test]
    fn test_open_missing_file_fails() {
        assert!(PlainTextTokenizer
            .open(Path::new("/definitely/not/here.txt"))
            .is_err());
    }
}
