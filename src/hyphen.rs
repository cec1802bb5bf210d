//! Language-aware hyphenation positions for the line breaker.
//!
//! Positive results are byte offsets of `-` characters already present in
//! the word; negative results encode algorithmic split points as
//! `-(pos + 1)`, where a hyphen must be inserted when the word is split.
//! All offsets are byte positions that never land inside a multi-byte
//! UTF-8 sequence.

mod english;
mod german;

pub const DEFAULT_MIN_WORD_LEN: usize = 6;
pub const DEFAULT_MIN_FRAGMENT_LEN: usize = 3;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Language {
	/// No hyphenation at all, not even on existing hyphens.
	None,
	/// Split only on hyphens already present in the text.
	Basic,
	#[default]
	English,
	German,
}

impl Language {
	/// Map a BCP-47-ish language tag (e.g. from EPUB metadata) onto a
	/// hyphenation language. Unknown tags fall back to English.
	pub fn from_tag(tag: &str) -> Language
	{
		let lower = tag.to_ascii_lowercase();
		if lower.starts_with("de") {
			Language::German
		} else {
			Language::English
		}
	}
}

/// All split positions of `word` for `language`.
///
/// Existing hyphens win: when the word already contains `-`, only those
/// positions are returned. Otherwise the language algorithm contributes
/// positions filtered so at least `min_fragment_len` bytes remain on each
/// side and the word is at least `min_word_len` bytes long.
pub fn find_hyphen_positions(
	word: &str, language: Language, min_word_len: usize, min_fragment_len: usize,
) -> Vec<i32>
{
	if language == Language::None {
		return Vec::new();
	}

	let mut positions: Vec<i32> = word
		.bytes()
		.enumerate()
		.filter(|(_, b)| *b == b'-')
		.map(|(i, _)| i as i32)
		.collect();

	if positions.is_empty() && word.len() >= min_word_len {
		let algorithmic = match language {
			Language::English => english::hyphenate(word),
			Language::German => german::hyphenate(word),
			_ => Vec::new(),
		};
		for byte_pos in algorithmic {
			if byte_pos >= min_fragment_len && byte_pos + min_fragment_len <= word.len() {
				positions.push(-(byte_pos as i32 + 1));
			}
		}
	}
	positions
}

/// Convert a character index to its byte offset; used by both language
/// modules after working in character space.
pub(crate) fn char_to_byte_positions(word: &str, char_positions: &[usize]) -> Vec<usize>
{
	let mut byte_of_char: Vec<usize> = word.char_indices().map(|(i, _)| i).collect();
	byte_of_char.push(word.len());
	char_positions
		.iter()
		.filter_map(|&cp| byte_of_char.get(cp).copied())
		.collect()
}
