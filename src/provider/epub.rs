//! Chapter-aware word provider: owns the book metadata, converts
//! chapters on demand (through the extraction cache) and exposes the
//! current chapter's converted stream through the common cursor
//! interface. Also opens bare XHTML files as single-chapter books.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Result};
use log::{info, warn};

use crate::book::cache::nonempty_file;
use crate::book::EpubBook;
use crate::convert::convert_chapter;
use crate::css::TextAlign;
use crate::hyphen::Language;
use crate::provider::{FileWordProvider, WordProvider};
use crate::xml::XmlParser;

pub struct EpubWordProvider {
	book: Option<EpubBook>,
	provider: FileWordProvider,
	current_chapter: usize,
	chapter_name: String,
}

impl EpubWordProvider {
	/// Open an `.epub` archive or a bare `.xhtml`/`.html`/`.htm` file.
	/// `cache_root` hosts the per-book extraction cache (unused for bare
	/// files, whose converted stream sits next to them).
	pub fn open(path: impl AsRef<Path>, cache_root: impl AsRef<Path>) -> Result<Self>
	{
		let path = path.as_ref();
		let ext = path
			.extension()
			.map(|e| e.to_string_lossy().to_ascii_lowercase())
			.unwrap_or_default();
		if matches!(ext.as_str(), "xhtml" | "html" | "htm") {
			let txt = path.with_extension("txt");
			if !nonempty_file(&txt) {
				let mut parser = XmlParser::open(path)?;
				let mut out = BufWriter::new(File::create(&txt)?);
				match convert_chapter(&mut parser, None, &mut out) {
					Ok(bytes) => {
						out.flush()?;
						info!("converted {} ({} bytes)", path.display(), bytes);
					}
					Err(e) => {
						drop(out);
						let _ = fs::remove_file(&txt);
						return Err(anyhow!("conversion of {} failed: {}", path.display(), e));
					}
				}
			}
			let provider = FileWordProvider::open(&txt)?;
			return Ok(EpubWordProvider {
				book: None,
				provider,
				current_chapter: 0,
				chapter_name: String::new(),
			});
		}

		let book = EpubBook::open(path, cache_root)?;
		let txt = book.chapter_txt_path(0)?;
		let provider = FileWordProvider::open(&txt)?;
		let chapter_name = book.chapter_name_for_spine(0);
		Ok(EpubWordProvider { book: Some(book), provider, current_chapter: 0, chapter_name })
	}

	/// Hyphenation language from the book metadata; bare files default
	/// to splitting on existing hyphens only.
	pub fn language(&self) -> Language
	{
		match &self.book {
			Some(book) => book.hyphen_language(),
			None => Language::Basic,
		}
	}

	#[inline]
	pub fn book(&self) -> Option<&EpubBook>
	{
		self.book.as_ref()
	}
}

impl WordProvider for EpubWordProvider {
	fn has_next_word(&self) -> bool
	{
		self.provider.has_next_word()
	}

	fn has_prev_word(&self) -> bool
	{
		self.provider.has_prev_word()
	}

	fn next_word(&mut self) -> String
	{
		self.provider.next_word()
	}

	fn prev_word(&mut self) -> String
	{
		self.provider.prev_word()
	}

	fn percentage_at(&self, index: usize) -> f32
	{
		let Some(book) = &self.book else {
			return self.provider.percentage_at(index);
		};
		let total = book.total_book_size();
		if total == 0 {
			return 1.0;
		}
		// the very end of the last chapter is exactly 1.0
		if self.current_chapter + 1 == book.spine_count() && index >= self.provider.chapter_size() {
			return 1.0;
		}
		let offset = book
			.spine_item(self.current_chapter)
			.map(|item| item.offset)
			.unwrap_or(0);
		(((offset + index as u64) as f64) / total as f64).min(1.0) as f32
	}

	fn chapter_percentage_at(&self, index: usize) -> f32
	{
		self.provider.percentage_at(index)
	}

	fn set_position(&mut self, index: usize)
	{
		self.provider.set_position(index);
	}

	fn current_index(&self) -> usize
	{
		self.provider.current_index()
	}

	fn chapter_size(&self) -> usize
	{
		self.provider.chapter_size()
	}

	fn peek_char(&mut self, offset: isize) -> u8
	{
		self.provider.peek_char(offset)
	}

	fn consume_chars(&mut self, n: usize) -> usize
	{
		self.provider.consume_chars(n)
	}

	fn is_inside_word(&mut self) -> bool
	{
		self.provider.is_inside_word()
	}

	fn unget_word(&mut self)
	{
		self.provider.unget_word();
	}

	fn reset(&mut self)
	{
		self.provider.reset();
	}

	fn chapter_count(&self) -> usize
	{
		match &self.book {
			Some(book) => book.spine_count(),
			None => 1,
		}
	}

	fn current_chapter(&self) -> usize
	{
		self.current_chapter
	}

	/// Swap in another chapter's converted stream; the position resets to
	/// its beginning.
	fn set_chapter(&mut self, chapter: usize) -> bool
	{
		let Some(book) = &self.book else {
			return chapter == 0;
		};
		if chapter == self.current_chapter {
			self.reset();
			return true;
		}
		if chapter >= book.spine_count() {
			return false;
		}
		let txt = match book.chapter_txt_path(chapter) {
			Ok(path) => path,
			Err(e) => {
				warn!("chapter {} unusable: {}", chapter, e);
				return false;
			}
		};
		match FileWordProvider::open(&txt) {
			Ok(provider) => {
				self.provider = provider;
				self.chapter_name = book.chapter_name_for_spine(chapter);
				self.current_chapter = chapter;
				true
			}
			Err(e) => {
				warn!("chapter {} unreadable: {}", chapter, e);
				false
			}
		}
	}

	fn has_chapters(&self) -> bool
	{
		self.book.is_some()
	}

	fn chapter_name(&self) -> String
	{
		self.chapter_name.clone()
	}

	fn paragraph_alignment(&self) -> Option<TextAlign>
	{
		self.provider.paragraph_alignment()
	}
}
