//! Word provider over a converted chapter file, reading through a small
//! sliding window so chapter size never dictates memory use.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::css::TextAlign;
use crate::error::Result;
use crate::provider::{consume_n, is_word_byte, scan_token, update_alignment, ByteCursor, WordProvider};

/// Default sliding-window size in bytes.
pub const DEFAULT_WINDOW: usize = 2048;
const MIN_WINDOW: usize = 64;

struct FileCursor {
	file: File,
	file_size: usize,
	window: Vec<u8>,
	window_size: usize,
	window_start: usize,
	window_len: usize,
}

impl FileCursor {
	fn ensure_window_for(&mut self, pos: usize) -> bool
	{
		if pos >= self.window_start && pos < self.window_start + self.window_len {
			return true;
		}
		// center the window on the requested byte
		let mut start = pos.saturating_sub(self.window_size / 2);
		if start + self.window_size > self.file_size {
			start = self.file_size.saturating_sub(self.window_size);
		}
		if self.file.seek(SeekFrom::Start(start as u64)).is_err() {
			return false;
		}
		let mut filled = 0;
		while filled < self.window_size {
			match self.file.read(&mut self.window[filled..]) {
				Ok(0) => break,
				Ok(n) => filled += n,
				Err(_) => return false,
			}
		}
		if filled == 0 {
			return false;
		}
		self.window_start = start;
		self.window_len = filled;
		pos >= self.window_start && pos < self.window_start + self.window_len
	}
}

impl ByteCursor for FileCursor {
	fn size(&self) -> usize
	{
		self.file_size
	}

	fn byte(&mut self, pos: usize) -> u8
	{
		if pos >= self.file_size || !self.ensure_window_for(pos) {
			return 0;
		}
		self.window[pos - self.window_start]
	}
}

pub struct FileWordProvider {
	cursor: FileCursor,
	index: usize,
	prev_index: usize,
	alignment: Option<TextAlign>,
}

impl FileWordProvider {
	pub fn open(path: impl AsRef<Path>) -> Result<Self>
	{
		Self::with_window(path, DEFAULT_WINDOW)
	}

	pub fn with_window(path: impl AsRef<Path>, window_size: usize) -> Result<Self>
	{
		let file = File::open(path.as_ref())?;
		let file_size = file.metadata()?.len() as usize;
		let window_size = window_size.max(MIN_WINDOW);
		Ok(FileWordProvider {
			cursor: FileCursor {
				file,
				file_size,
				window: vec![0; window_size],
				window_size,
				window_start: 0,
				window_len: 0,
			},
			index: 0,
			prev_index: 0,
			alignment: None,
		})
	}
}

impl WordProvider for FileWordProvider {
	fn has_next_word(&self) -> bool
	{
		self.index < self.cursor.file_size
	}

	fn has_prev_word(&self) -> bool
	{
		self.index > 0
	}

	fn next_word(&mut self) -> String
	{
		self.prev_index = self.index;
		let token = scan_token(&mut self.cursor, &mut self.index, true);
		update_alignment(&token, &mut self.alignment);
		token
	}

	fn prev_word(&mut self) -> String
	{
		self.prev_index = self.index;
		scan_token(&mut self.cursor, &mut self.index, false)
	}

	fn percentage_at(&self, index: usize) -> f32
	{
		if self.cursor.file_size == 0 {
			return 1.0;
		}
		index as f32 / self.cursor.file_size as f32
	}

	fn set_position(&mut self, index: usize)
	{
		let clamped = index.min(self.cursor.file_size);
		self.index = clamped;
		self.prev_index = clamped;
	}

	fn current_index(&self) -> usize
	{
		self.index
	}

	fn chapter_size(&self) -> usize
	{
		self.cursor.file_size
	}

	fn peek_char(&mut self, offset: isize) -> u8
	{
		let pos = self.index as isize + offset;
		if pos < 0 || pos >= self.cursor.file_size as isize {
			return 0;
		}
		self.cursor.byte(pos as usize)
	}

	fn consume_chars(&mut self, n: usize) -> usize
	{
		consume_n(&mut self.cursor, &mut self.index, n)
	}

	fn is_inside_word(&mut self) -> bool
	{
		if self.index == 0 || self.index >= self.cursor.file_size {
			return false;
		}
		let prev = self.cursor.byte(self.index - 1);
		let current = self.cursor.byte(self.index);
		is_word_byte(prev) && is_word_byte(current)
	}

	fn unget_word(&mut self)
	{
		self.index = self.prev_index;
	}

	fn reset(&mut self)
	{
		self.index = 0;
		self.prev_index = 0;
	}

	fn paragraph_alignment(&self) -> Option<TextAlign>
	{
		self.alignment
	}
}
