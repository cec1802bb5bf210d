//! Reading-position persistence: a `.pos` sibling file holding
//! `<chapter>,<position>` in ASCII. The legacy form is a bare
//! `<position>`; a missing or unreadable file means the beginning of the
//! book.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::Result;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ReadingPosition {
	pub chapter: usize,
	pub position: usize,
}

fn pos_path(book_path: &Path) -> PathBuf
{
	let mut os = book_path.as_os_str().to_os_string();
	os.push(".pos");
	PathBuf::from(os)
}

pub fn save_position(book_path: &Path, chapter: usize, position: usize) -> Result<()>
{
	let path = pos_path(book_path);
	fs::write(&path, format!("{},{}", chapter, position))?;
	debug!("saved position {}:{} for {}", chapter, position, book_path.display());
	Ok(())
}

pub fn load_position(book_path: &Path) -> ReadingPosition
{
	let path = pos_path(book_path);
	let Ok(content) = fs::read_to_string(&path) else {
		return ReadingPosition::default();
	};
	parse_position(&content)
}

fn parse_position(content: &str) -> ReadingPosition
{
	let content = content.trim();
	if content.is_empty() {
		return ReadingPosition::default();
	}
	let (chapter_text, position_text) = match content.split_once(',') {
		Some((c, p)) => (c, p),
		// legacy format: bare position in chapter 0
		None => ("0", content),
	};
	let chapter = chapter_text.trim().parse::<i64>().unwrap_or(0).max(0) as usize;
	let position = position_text.trim().parse::<i64>().unwrap_or(0).max(0) as usize;
	ReadingPosition { chapter, position }
}
