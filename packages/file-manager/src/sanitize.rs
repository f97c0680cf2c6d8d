//! Turning user-supplied names into safe object-key segments.
//!
//! The output alphabet is `[A-Za-z0-9_-]`. Accented Latin letters fold to
//! their ASCII base, whitespace runs become a single underscore, and
//! everything else is dropped. A name that folds to nothing is an error,
//! never an unnamed folder.

use std::fmt;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::SeparatorPolicy;
use crate::error::NameError;

/// A non-empty segment drawn from `[A-Za-z0-9_-]`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SafeSegment(String);

impl SafeSegment {
    /// Accept a name that is already in sanitized form, such as a folder
    /// name read back from a listing.
    pub fn try_new(name: &str) -> Result<Self, NameError> {
        if is_sanitized(name) {
            Ok(SafeSegment(name.to_string()))
        } else {
            Err(NameError::NotSanitized {
                name: name.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for SafeSegment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SafeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// True if `s` is non-empty and uses only `[A-Za-z0-9_-]`.
pub fn is_sanitized(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_segment_char)
}

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Letters that carry no combining mark under NFD and would otherwise be
/// dropped entirely.
fn fold_undecomposable(c: char) -> Option<&'static str> {
    Some(match c {
        'đ' => "d",
        'Đ' => "D",
        'ł' => "l",
        'Ł' => "L",
        'ø' => "o",
        'Ø' => "O",
        'ħ' => "h",
        'Ħ' => "H",
        'ı' => "i",
        'ß' => "ss",
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        'þ' => "th",
        'Þ' => "Th",
        _ => return None,
    })
}

/// Sanitize with the default policy (separators are rejected).
pub fn sanitize(raw: &str) -> Result<SafeSegment, NameError> {
    sanitize_with(raw, SeparatorPolicy::Reject)
}

/// Sanitize a folder or file-stem name into a [`SafeSegment`].
pub fn sanitize_with(raw: &str, policy: SeparatorPolicy) -> Result<SafeSegment, NameError> {
    let trimmed = strip_separators(raw, policy)?;

    let folded: String = trimmed
        .chars()
        .fold(String::with_capacity(trimmed.len()), |mut acc, c| {
            match fold_undecomposable(c) {
                Some(ascii) => acc.push_str(ascii),
                None => acc.push(c),
            }
            acc
        })
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let mut out = String::with_capacity(folded.len());
    let mut in_whitespace = false;
    for c in folded.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if is_segment_char(c) {
            out.push(c);
        }
    }

    if out.is_empty() {
        return Err(NameError::NoAsciiContent {
            name: raw.to_string(),
        });
    }
    Ok(SafeSegment(out))
}

fn strip_separators(raw: &str, policy: SeparatorPolicy) -> Result<String, NameError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }
    if !trimmed.contains(is_separator) {
        return Ok(trimmed.to_string());
    }

    match policy {
        SeparatorPolicy::Reject => Err(NameError::ContainsSeparator {
            name: raw.to_string(),
        }),
        SeparatorPolicy::Strip => {
            let stripped: String = trimmed.chars().filter(|c| !is_separator(*c)).collect();
            let stripped = stripped.trim();
            if stripped.is_empty() {
                Err(NameError::Empty)
            } else {
                Ok(stripped.to_string())
            }
        }
    }
}

/// Sanitize an uploaded file name, keeping its extension.
///
/// The stem goes through [`sanitize_with`]; the extension keeps only ASCII
/// alphanumerics and is lowercased. `Hợp đồng (v2).PDF` becomes
/// `Hop_dong_v2.pdf`.
pub fn sanitize_file_name(raw: &str, policy: SeparatorPolicy) -> Result<String, NameError> {
    let trimmed = strip_separators(raw, policy)?;

    let (stem, extension) = match trimmed.rsplit_once('.') {
        Some((stem, ext)) if !stem.trim().is_empty() => (stem, ext),
        _ => (trimmed.as_str(), ""),
    };

    let stem = sanitize_with(stem, policy).map_err(|e| match e {
        NameError::NoAsciiContent { .. } => NameError::NoAsciiContent {
            name: raw.to_string(),
        },
        other => other,
    })?;
    let extension: String = extension
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if extension.is_empty() {
        Ok(stem.into_string())
    } else {
        Ok(format!("{}.{}", stem, extension))
    }
}
