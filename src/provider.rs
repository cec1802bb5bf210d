//! Bidirectional, seekable word cursors over converted text streams.
//!
//! A provider hands out tokens, not parsed structures: a token is either a
//! maximal run of spaces, a single `\n` (paragraph separator), a single
//! `\t`, or a maximal run of everything else. `\r` never comes back.
//! Style tokens ride along inside word tokens; measurement and rendering
//! treat them as zero-width.

use crate::convert::{align_for_cmd, ESC};
use crate::css::TextAlign;

pub mod epub;
pub mod file;
pub mod string;

pub use epub::EpubWordProvider;
pub use file::FileWordProvider;
pub use string::StringWordProvider;

/// The capability set layout and navigation are written against.
///
/// The byte-position contract: for any token read forward from `p0`
/// ending at `p1`, seeking to `p0` and reading forward returns the same
/// token, and seeking to `p1` and reading backward returns it too.
pub trait WordProvider {
	fn has_next_word(&self) -> bool;
	fn has_prev_word(&self) -> bool;
	/// Next token in stream order; empty string when exhausted.
	fn next_word(&mut self) -> String;
	/// Previous token; prepending successive results reconstructs the
	/// stream.
	fn prev_word(&mut self) -> String;

	/// Book-wide progress of the current position, 0.0..=1.0.
	fn percentage(&self) -> f32
	{
		self.percentage_at(self.current_index())
	}
	fn percentage_at(&self, index: usize) -> f32;
	fn chapter_percentage(&self) -> f32
	{
		self.chapter_percentage_at(self.current_index())
	}
	fn chapter_percentage_at(&self, index: usize) -> f32
	{
		self.percentage_at(index)
	}

	/// Clamp and set the cursor; also resets the unget position.
	fn set_position(&mut self, index: usize);
	fn current_index(&self) -> usize;
	/// Size in bytes of the current chapter stream.
	fn chapter_size(&self) -> usize;

	/// Byte at `current_index + offset`, 0 when out of range.
	fn peek_char(&mut self, offset: isize) -> u8;
	/// Advance over `n` characters, not counting `\r`; returns how many
	/// were actually consumed. Commits a mid-word split position.
	fn consume_chars(&mut self, n: usize) -> usize;
	/// True when the bytes on both sides of the cursor are word bytes.
	fn is_inside_word(&mut self) -> bool;
	/// Restore the position from before the most recent token read.
	fn unget_word(&mut self);
	fn reset(&mut self);

	/// Definitive end-of-chapter test; percentages are display-only.
	fn at_chapter_end(&self) -> bool
	{
		self.current_index() >= self.chapter_size()
	}

	// chapter navigation; single-stream providers are one chapter
	fn chapter_count(&self) -> usize
	{
		1
	}
	fn current_chapter(&self) -> usize
	{
		0
	}
	fn set_chapter(&mut self, chapter: usize) -> bool
	{
		chapter == 0
	}
	fn has_chapters(&self) -> bool
	{
		false
	}
	fn chapter_name(&self) -> String
	{
		String::new()
	}

	/// Alignment of the paragraph most recently scanned forward, from
	/// alignment tokens seen in the stream.
	fn paragraph_alignment(&self) -> Option<TextAlign>
	{
		None
	}
}

#[inline]
pub(crate) fn is_word_byte(b: u8) -> bool
{
	b != 0 && b != b' ' && b != b'\n' && b != b'\t' && b != b'\r'
}

/// Byte-addressable backing of a provider; returns 0 past either end.
pub(crate) trait ByteCursor {
	fn size(&self) -> usize;
	fn byte(&mut self, pos: usize) -> u8;
}

/// Shared token scanner over a [`ByteCursor`]. Forward leaves the cursor
/// index after the token, backward leaves it at the token start.
pub(crate) fn scan_token<C: ByteCursor>(cur: &mut C, index: &mut usize, forward: bool) -> String
{
	let file_size = cur.size();
	let mut bytes = Vec::new();
	loop {
		let current = if forward {
			if *index >= file_size {
				break;
			}
			*index
		} else {
			if *index == 0 {
				break;
			}
			*index - 1
		};
		let c = cur.byte(current);

		if c == b' ' {
			if forward {
				let mut end = current;
				while end < file_size && cur.byte(end) == b' ' {
					end += 1;
				}
				for i in current..end {
					bytes.push(cur.byte(i));
				}
				*index = end;
			} else {
				let mut start = current;
				while start > 0 && cur.byte(start - 1) == b' ' {
					start -= 1;
				}
				for i in start..*index {
					bytes.push(cur.byte(i));
				}
				*index = start;
			}
			break;
		} else if c == b'\r' {
			// carriage returns are invisible to the token stream
			if forward {
				*index += 1;
			} else {
				*index = current;
			}
			continue;
		} else if c == b'\n' || c == b'\t' {
			if forward {
				*index += 1;
			} else {
				*index = current;
			}
			bytes.push(c);
			break;
		} else {
			if forward {
				let mut end = current;
				while end < file_size {
					let cc = cur.byte(end);
					if !is_word_byte(cc) {
						break;
					}
					end += 1;
				}
				for i in current..end {
					bytes.push(cur.byte(i));
				}
				*index = end;
			} else {
				let mut start = current;
				while start > 0 && is_word_byte(cur.byte(start - 1)) {
					start -= 1;
				}
				for i in start..*index {
					bytes.push(cur.byte(i));
				}
				*index = start;
			}
			break;
		}
	}
	String::from_utf8_lossy(&bytes).into_owned()
}

/// Track paragraph alignment from style tokens passing through a forward
/// scan: an open alignment command sets it, its close clears it.
pub(crate) fn update_alignment(token: &str, alignment: &mut Option<TextAlign>)
{
	let bytes = token.as_bytes();
	let mut i = 0;
	while i + 1 < bytes.len() {
		if bytes[i] == ESC {
			let cmd = bytes[i + 1];
			if let Some(align) = align_for_cmd(cmd) {
				*alignment = Some(align);
			} else if align_for_cmd(cmd.to_ascii_uppercase()).is_some() {
				*alignment = None;
			}
			i += 2;
		} else {
			i += 1;
		}
	}
}

/// Shared `consume_chars` walk: advances `index` over `n` non-`\r`
/// bytes.
pub(crate) fn consume_n<C: ByteCursor>(cur: &mut C, index: &mut usize, n: usize) -> usize
{
	let file_size = cur.size();
	let mut consumed = 0;
	while consumed < n && *index < file_size {
		let c = cur.byte(*index);
		*index += 1;
		if c != b'\r' {
			consumed += 1;
		}
	}
	consumed
}
