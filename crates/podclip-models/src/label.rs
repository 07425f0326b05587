//! Label slug normalization.
//!
//! A label becomes a directory name on disk, so it is folded to a
//! conservative character set before it ever touches the filesystem.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SlugError {
    #[error("label produces an empty slug: {0:?}")]
    Empty(String),
}

/// Normalize a label to its on-disk directory name.
///
/// Lower-case, spaces become underscores, anything outside `[a-z0-9_-]`
/// is stripped. An empty result is an error, not a fallback name.
///
/// # Examples
/// ```
/// use podclip_models::label::label_slug;
/// assert_eq!(label_slug("Music Intro").unwrap(), "music_intro");
/// assert_eq!(label_slug("ad").unwrap(), "ad");
/// ```
pub fn label_slug(label: &str) -> Result<String, SlugError> {
    let slug: String = label
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect();

    if slug.is_empty() {
        return Err(SlugError::Empty(label.to_string()));
    }
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_slugs() {
        assert_eq!(label_slug("ad").unwrap(), "ad");
        assert_eq!(label_slug("Volume Spike").unwrap(), "volume_spike");
        assert_eq!(label_slug("intro-music").unwrap(), "intro-music");
        assert_eq!(label_slug("Track 01").unwrap(), "track_01");
    }

    #[test]
    fn test_strips_unsafe_characters() {
        assert_eq!(label_slug("ad/../../etc").unwrap(), "adetc");
        assert_eq!(label_slug("Caf\u{e9} r\u{e9}sum\u{e9}").unwrap(), "caf_rsum");
        assert_eq!(label_slug("A!@#B").unwrap(), "ab");
    }

    #[test]
    fn test_empty_slug_is_error() {
        assert_eq!(label_slug("!!!"), Err(SlugError::Empty("!!!".to_string())));
        assert!(label_slug("\u{4e16}\u{754c}").is_err());
    }
}
