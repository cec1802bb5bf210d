//! English syllable-boundary heuristic: vowel/consonant cluster analysis
//! with a table of legal syllable onsets. Not Liang patterns; tuned for
//! the common cases a line breaker meets.

use super::char_to_byte_positions;

const ONSETS: &[&str] = &[
	"b", "c", "d", "f", "g", "h", "j", "k", "l", "m",
	"n", "p", "q", "r", "s", "t", "v", "w", "x", "y", "z",
	"bl", "br", "ch", "cl", "cr", "dr", "dw", "fl", "fr",
	"gh", "gl", "gn", "gr", "kn", "ph", "pl", "pr", "qu",
	"sc", "sh", "sk", "sl", "sm", "sn", "sp", "sq", "st",
	"sw", "th", "tr", "tw", "wh", "wr",
	"chr", "sch", "scr", "shr", "sph", "spl", "spr", "squ",
	"str", "thr",
];

const INSEPARABLE_PAIRS: &[&str] = &["ch", "ck", "gh", "gn", "kn", "ph", "sh", "th", "wh", "wr"];

fn is_letter(c: char) -> bool
{
	c.is_ascii_alphabetic()
}

fn is_vowel(c: char) -> bool
{
	matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

/// `y` acts as a vowel after a consonant (rhythm, myth, try).
fn is_vowel_in_context(lower: &[char], pos: usize) -> bool
{
	let c = lower[pos];
	if is_vowel(c) {
		return true;
	}
	if c == 'y' && pos > 0 {
		let prev = lower[pos - 1];
		return is_letter(prev) && !is_vowel(prev);
	}
	false
}

fn is_consonant(c: char) -> bool
{
	is_letter(c) && !is_vowel(c)
}

fn is_allowed_onset(onset: &[char]) -> bool
{
	let s: String = onset.iter().collect();
	ONSETS.contains(&s.as_str())
}

fn is_inseparable_pair(pair: &[char]) -> bool
{
	if pair.len() != 2 {
		return false;
	}
	let s: String = pair.iter().collect();
	INSEPARABLE_PAIRS.contains(&s.as_str())
}

fn is_double_consonant(pair: &[char]) -> bool
{
	pair.len() == 2 && pair[0] == pair[1] && is_consonant(pair[0])
}

/// Algorithmic hyphenation points as byte positions, unfiltered.
pub(super) fn hyphenate(word: &str) -> Vec<usize>
{
	let chars: Vec<char> = word.chars().collect();
	let lower: Vec<char> = chars
		.iter()
		.map(|c| c.to_lowercase().next().unwrap_or(*c))
		.collect();

	let mut vowel_indices = Vec::new();
	for i in 0..lower.len() {
		if is_vowel_in_context(&lower, i) {
			vowel_indices.push(i);
		}
	}
	if vowel_indices.len() < 2 {
		return Vec::new();
	}

	let mut char_positions = Vec::new();
	for pair in vowel_indices.windows(2) {
		let (left_vowel, right_vowel) = (pair[0], pair[1]);
		if right_vowel <= left_vowel + 1 {
			// diphthong or hiatus
			continue;
		}
		let consonant_count = right_vowel - left_vowel - 1;
		let cluster_start = left_vowel + 1;
		let cluster_end = right_vowel;
		let cluster = &lower[cluster_start..cluster_end];
		let mut boundary = 0usize;

		// double consonants split between them (run-ning, let-ter)
		if consonant_count == 2 && is_double_consonant(cluster) {
			boundary = cluster_start + 1;
		}
		// inseparable pairs stay with the right syllable (fa-ther)
		if boundary == 0 && consonant_count == 2 && is_inseparable_pair(cluster) {
			boundary = cluster_start;
		}
		// whole cluster is a legal onset (o-pen, ta-ble onsets)
		if boundary == 0 && is_allowed_onset(cluster) {
			boundary = cluster_start;
		}
		// largest legal onset from the right with a short coda on the left
		if boundary == 0 && consonant_count >= 2 {
			for split in 1..cluster.len() {
				if is_allowed_onset(&cluster[split..]) && split <= 2 {
					boundary = cluster_start + split;
					break;
				}
			}
		}
		if boundary == 0 {
			boundary = match consonant_count {
				1 => cluster_start,
				2 => {
					if is_inseparable_pair(cluster) {
						cluster_start
					} else {
						cluster_start + 1
					}
				}
				_ => {
					let last_two = &lower[cluster_end - 2..cluster_end];
					if is_inseparable_pair(last_two) || is_allowed_onset(last_two) {
						cluster_end - 2
					} else {
						cluster_end - 1
					}
				}
			};
		}

		if boundary > 0 && boundary < chars.len() {
			char_positions.push(boundary);
		}
	}

	char_to_byte_positions(word, &char_positions)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn split(word: &str) -> Vec<String>
	{
		let positions = hyphenate(word);
		let mut parts = vec![];
		let mut last = 0;
		for p in positions {
			parts.push(word[last..p].to_string());
			last = p;
		}
		parts.push(word[last..].to_string());
		parts
	}

	#[test]
	fn test_double_consonants()
	{
		assert_eq!(split("running"), ["run", "ning"]);
		assert_eq!(split("letter"), ["let", "ter"]);
	}

	#[test]
	fn test_inseparable_pairs_go_right()
	{
		assert_eq!(split("father"), ["fa", "ther"]);
		assert!(split("graphic").contains(&"phic".to_string()) || split("graphic").contains(&"gra".to_string()));
	}

	#[test]
	fn test_single_consonant_goes_right()
	{
		assert_eq!(split("open"), ["o", "pen"]);
	}

	#[test]
	fn test_y_as_vowel()
	{
		// y after consonant makes "rhythm"-like words hyphenatable at all
		assert!(!hyphenate("syllable").is_empty());
	}

	#[test]
	fn test_too_few_vowels()
	{
		assert!(hyphenate("strength").len() <= 1);
		assert!(hyphenate("try").is_empty());
	}

	#[test]
	fn test_long_word_has_many_positions()
	{
		let positions = hyphenate("supercalifragilisticexpialidocious");
		assert!(positions.len() >= 5);
		let mut sorted = positions.clone();
		sorted.sort_unstable();
		assert_eq!(positions, sorted);
	}
}
