use crate::error::Result;

/// Machine translation between two languages, by language code.
pub trait Translator {
    fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String>;
}

/// Returns text unchanged. Used when corpus, queries and models share a
/// language.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Translator for Passthrough {
    fn translate(
        &self,
        text: &str,
        _source: &str,
        _target: &str,
    ) -> Result<String> {
        Ok(text.to_string())
    }
}

/// Translate `text`, or `None` when the translator fails (the failure is
/// logged).
pub fn try_translate(
    translator: &dyn Translator,
    text: &str,
    source: &str,
    target: &str,
) -> Option<String> {
    if source == target {
        return Some(text.to_string());
    }
    match translator.translate(text, source, target) {
        Ok(translated) => Some(translated),
        Err(e) => {
            tracing::warn!(source, target, error = %e, "translation failed");
            None
        }
    }
}
