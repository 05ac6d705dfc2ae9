mod bindings;

use crate::core::GPT2_PATTERN;
pub use bindings::PyTokenizer;

use pyo3::prelude::*;

/// gpt_bpe - GPT-2 byte-level BPE tokenizer
#[pymodule]
fn _gpt_bpe(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTokenizer>()?;
    m.add("GPT2_PATTERN", GPT2_PATTERN)?;
    Ok(())
}
