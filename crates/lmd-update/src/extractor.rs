//! Per-document extraction of local character and token trigram tables.

use crate::tokenizer::{Token, Tokenizer};
use lmd_core::{Error, Result};
use lmd_model::{CharTrigrams, Trigrams};
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Local tables built from one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub char3grams: CharTrigrams,
    pub trigrams: Trigrams,
    /// Number of word tokens seen.
    pub words: usize,
}

/// Build both tables from a token stream.
///
/// Only word tokens count; they are lowercased first. Documents with fewer
/// than three words produce an empty token trigram table.
pub fn extract<I>(tokens: I) -> io::Result<Extracted>
where
    I: IntoIterator<Item = io::Result<Token>>,
{
    let mut words = Vec::new();
    for token in tokens {
        if let Token::Word(w) = token? {
            words.push(w.to_lowercase());
        }
    }

    let mut char3grams = CharTrigrams::new();
    char3grams.add_tokens(words.iter().map(String::as_str));
    let mut trigrams = Trigrams::new();
    trigrams.add_all(&words);

    Ok(Extracted {
        char3grams,
        trigrams,
        words: words.len(),
    })
}

/// Open and extract one document. `ordinal` only appears in logs.
pub fn extract_document(
    tokenizer: &dyn Tokenizer,
    path: &Path,
    ordinal: usize,
) -> Result<Extracted> {
    info!("{}: {}", ordinal, path.display());

    let document_error = |source| Error::Document {
        path: path.display().to_string(),
        source,
    };
    let tokens = tokenizer.open(path).map_err(document_error)?;
    let extracted = extract(tokens).map_err(document_error)?;

    debug!(
        "{}: {} words, {} token trigrams",
        ordinal,
        extracted.words,
        extracted.trigrams.total()
    );
    Ok(extracted)
}
