//! German syllable-boundary heuristic. Umlauts and ß are letters, `y`
//! counts as a vowel, and the digraphs ch/ck/tz and the sch trigraph are
//! never torn apart.

use super::char_to_byte_positions;

const ONSETS: &[&str] = &[
	"b", "c", "d", "f", "g", "h", "j", "k", "l", "m", "n", "p", "q",
	"r", "s", "t", "v", "w", "z", "ch", "pf", "ph", "qu", "sch", "sp", "st",
	"sk", "kl", "kn", "kr", "pl", "pr", "tr", "dr", "gr", "gl", "br", "bl", "fr",
	"fl", "schl", "schm", "schn", "schr", "schw", "spr", "spl", "str", "th",
];

const INSEPARABLE_PAIRS: &[&str] = &["ch", "ck", "ph", "qu", "tz"];

fn to_lower_german(c: char) -> char
{
	match c {
		'Ä' => 'ä',
		'Ö' => 'ö',
		'Ü' => 'ü',
		'ẞ' => 'ß',
		_ => c.to_lowercase().next().unwrap_or(c),
	}
}

fn is_vowel(c: char) -> bool
{
	matches!(to_lower_german(c), 'a' | 'e' | 'i' | 'o' | 'u' | 'ä' | 'ö' | 'ü' | 'y')
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

fn starts_with_sch(cluster: &[char]) -> bool
{
	cluster.len() >= 3 && cluster[0] == 's' && cluster[1] == 'c' && cluster[2] == 'h'
}

/// Algorithmic hyphenation points as byte positions, unfiltered.
pub(super) fn hyphenate(word: &str) -> Vec<usize>
{
	let chars: Vec<char> = word.chars().collect();
	let lower: Vec<char> = chars.iter().map(|c| to_lower_german(*c)).collect();

	let mut vowel_indices = Vec::new();
	for (i, c) in lower.iter().enumerate() {
		if is_vowel(*c) {
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
			// diphthong or adjacent vowels
			continue;
		}
		let consonant_count = right_vowel - left_vowel - 1;
		let cluster_start = left_vowel + 1;
		let cluster_end = right_vowel;
		let cluster = &lower[cluster_start..cluster_end];
		let mut boundary = 0usize;

		if starts_with_sch(cluster) {
			boundary = cluster_start;
		}
		if boundary == 0 && consonant_count == 2 && is_inseparable_pair(cluster) {
			// digraph stays with the left syllable
			boundary = cluster_end;
		}
		if boundary == 0 && is_allowed_onset(cluster) {
			boundary = cluster_start;
		}
		if boundary == 0 && consonant_count >= 2 {
			for split in 1..cluster.len() {
				if is_allowed_onset(&cluster[split..]) {
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
						cluster_end
					} else {
						cluster_start + 1
					}
				}
				_ => {
					let last_two = &lower[cluster_end - 2..cluster_end];
					if is_inseparable_pair(last_two) {
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
