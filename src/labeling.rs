//! Expression labels for extracted faces.
//!
//! A label either comes from the caller (the expression folder being
//! extracted) or is decoded from a fixed-position code in the image's file
//! name. The file-name convention is brittle: anything that does not match a
//! known code yields the [`Expression::Error`] sentinel.

use std::path::Path;

use tracing::warn;

use crate::error::{Error, Result};
use crate::record::Expression;

/// Decodes an expression from a fixed-offset code in a base file name.
#[derive(Debug, Clone, PartialEq)]
pub struct FilenameConvention {
    offset: usize,
    width: usize,
    codes: Vec<(String, Expression)>,
}

impl FilenameConvention {
    /// Create a convention reading `width` characters at `offset`.
    pub fn new(offset: usize, width: usize, codes: Vec<(String, Expression)>) -> Self {
        Self {
            offset,
            width,
            codes,
        }
    }

    /// Extract the raw code from a base file name, if the name is long enough.
    pub fn code<'a>(&self, filename: &'a str) -> Option<&'a str> {
        let mut indices = filename.char_indices().map(|(i, _)| i);
        let start = indices.nth(self.offset)?;
        let end = filename
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(filename.len()))
            .nth(self.offset + self.width)?;
        Some(&filename[start..end])
    }

    /// Decode the expression of `filename`, or `None` when no code matches.
    pub fn decode(&self, filename: &str) -> Option<Expression> {
        let code = self.code(filename)?;
        self.codes
            .iter()
            .find(|(known, _)| known == code)
            .map(|(_, expression)| *expression)
    }

    /// Decode the expression of `filename`, falling back to the `ERROR` sentinel.
    pub fn infer(&self, filename: &str) -> Expression {
        self.decode(filename).unwrap_or(Expression::Error)
    }
}

impl Default for FilenameConvention {
    /// Two lowercase letters at offset 4, e.g. `img_an_001.jpg`.
    fn default() -> Self {
        let codes = [
            ("an", Expression::Angry),
            ("di", Expression::Disgust),
            ("fe", Expression::Fear),
            ("ha", Expression::Joy),
            ("ne", Expression::Neutral),
            ("sa", Expression::Sadness),
            ("su", Expression::Surprise),
        ];
        Self::new(
            4,
            2,
            codes
                .into_iter()
                .map(|(code, expression)| (code.to_string(), expression))
                .collect(),
        )
    }
}

/// Where the label of an extracted face comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelStrategy {
    /// Every face gets this label; the file name is ignored.
    Explicit(Expression),
    /// Decode the label from the image's base file name.
    FilenameConvention(FilenameConvention),
}

impl Default for LabelStrategy {
    fn default() -> Self {
        LabelStrategy::FilenameConvention(FilenameConvention::default())
    }
}

impl LabelStrategy {
    /// Label for the image at `path`, using the `ERROR` sentinel when the
    /// file name carries no recognisable code.
    pub fn resolve(&self, path: &Path) -> Expression {
        match self {
            LabelStrategy::Explicit(expression) => *expression,
            LabelStrategy::FilenameConvention(convention) => {
                let filename = base_name(path);
                let expression = convention.infer(&filename);
                if expression == Expression::Error {
                    warn!(file = %filename, "unrecognized label encoding, labelling as ERROR");
                }
                expression
            }
        }
    }

    /// Like [`resolve`](Self::resolve) but fails instead of returning the sentinel.
    pub fn resolve_strict(&self, path: &Path) -> Result<Expression> {
        match self {
            LabelStrategy::Explicit(expression) => Ok(*expression),
            LabelStrategy::FilenameConvention(convention) => {
                let filename = base_name(path);
                convention
                    .decode(&filename)
                    .ok_or(Error::UnrecognizedLabelEncoding { filename })
            }
        }
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Infer an expression from a file name using the default convention.
pub fn infer_label(filename: &str) -> Expression {
    FilenameConvention::default().infer(&base_name(Path::new(filename)))
}
