//! Python bindings for the gpt-bpe tokenizer.
//!
//! ```python
//! from gpt_bpe import Tokenizer
//!
//! tokenizer = Tokenizer.from_dir("models/gpt2")
//! ids = tokenizer.encode("Hello, world!")
//! text = tokenizer.decode(ids)
//! ```

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;

use crate::core::{TokenId, Tokenizer, TokenizerError, UnknownPolicy, VocabError};

fn to_py_err(err: TokenizerError) -> PyErr {
    match err {
        TokenizerError::VocabError(VocabError::IoError(e)) => PyIOError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

fn parse_policy(policy: &str) -> PyResult<UnknownPolicy> {
    policy.parse().map_err(PyValueError::new_err)
}

/// Python wrapper for the Rust Tokenizer.
#[pyclass(name = "Tokenizer")]
pub struct PyTokenizer {
    inner: Tokenizer,
}

#[pymethods]
impl PyTokenizer {
    /// Create a tokenizer from `encoder.json` and `vocab.bpe` paths.
    ///
    /// Args:
    ///     encoder_path: Path to the token table
    ///     merges_path: Path to the merge list
    ///     unknown: "drop" (default) or "fail"
    #[new]
    #[pyo3(signature = (encoder_path, merges_path, unknown="drop"))]
    fn new(encoder_path: &str, merges_path: &str, unknown: &str) -> PyResult<Self> {
        let policy = parse_policy(unknown)?;
        let inner = Tokenizer::from_files(encoder_path, merges_path)
            .map_err(to_py_err)?
            .unknown_policy(policy);
        Ok(Self { inner })
    }

    /// Create a tokenizer from a directory containing `encoder.json` and `vocab.bpe`.
    #[staticmethod]
    #[pyo3(signature = (path, unknown="drop"))]
    fn from_dir(path: &str, unknown: &str) -> PyResult<Self> {
        let policy = parse_policy(unknown)?;
        let inner = Tokenizer::from_dir(path)
            .map_err(to_py_err)?
            .unknown_policy(policy);
        Ok(Self { inner })
    }

    /// Create a tokenizer from raw file contents.
    #[staticmethod]
    #[pyo3(signature = (encoder_json, merges, unknown="drop"))]
    fn from_bytes(encoder_json: &[u8], merges: &[u8], unknown: &str) -> PyResult<Self> {
        let policy = parse_policy(unknown)?;
        let inner = Tokenizer::from_bytes(encoder_json, merges)
            .map_err(to_py_err)?
            .unknown_policy(policy);
        Ok(Self { inner })
    }

    /// Encode text to token IDs. Special tokens are treated as regular text.
    fn encode(&self, text: &str) -> PyResult<Vec<TokenId>> {
        self.inner.encode(text).map_err(to_py_err)
    }

    /// Encode text, recognizing special tokens such as `<|endoftext|>`.
    fn encode_with_special(&self, text: &str) -> PyResult<Vec<TokenId>> {
        self.inner.encode_with_special(text).map_err(to_py_err)
    }

    /// Decode token IDs to a string.
    ///
    /// Raises:
    ///     ValueError: If the bytes are not valid UTF-8 or, in "fail" mode,
    ///         an id is unknown
    fn decode(&self, ids: Vec<TokenId>) -> PyResult<String> {
        self.inner.decode(&ids).map_err(to_py_err)
    }

    /// Decode token IDs to raw bytes.
    fn decode_bytes(&self, ids: Vec<TokenId>) -> PyResult<Vec<u8>> {
        self.inner.decode_bytes(&ids).map_err(to_py_err)
    }

    /// Decode token IDs, replacing invalid UTF-8 with U+FFFD.
    fn decode_lossy(&self, ids: Vec<TokenId>) -> String {
        self.inner.decode_lossy(&ids)
    }

    /// Final BPE symbols for a single fragment.
    fn bpe(&self, fragment: &str) -> Vec<String> {
        self.inner.bpe(fragment)
    }

    fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.inner.token_to_id(token)
    }

    fn id_to_token(&self, id: TokenId) -> Option<String> {
        self.inner.id_to_token(id).map(String::from)
    }

    #[getter]
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    /// Number of cached fragments.
    fn cache_len(&self) -> usize {
        self.inner.cache_len()
    }

    /// Clear the fragment cache.
    fn clear_cache(&self) {
        self.inner.clear_cache();
    }

    fn __repr__(&self) -> String {
        format!(
            "Tokenizer(vocab_size={}, merges={})",
            self.inner.vocab_size(),
            self.inner.merge_ranks().len()
        )
    }
}
