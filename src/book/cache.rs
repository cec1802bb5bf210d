//! On-disk extraction cache, one directory per book.
//!
//! `<root>/epub_<ID>/` holds extracted archive members under their
//! relative paths, converted `.txt` chapter streams next to their XHTML
//! sources, and a one-line `epub_meta.txt` version stamp. A stamp that
//! does not match the current extraction format wipes the directory.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::Result;

const META_FILENAME: &str = "epub_meta.txt";
const CURRENT_VERSION: &str = "1";

pub(crate) struct ExtractCache {
	root: PathBuf,
}

impl ExtractCache {
	/// Open (and validate) the cache directory for one book.
	pub(crate) fn open(cache_root: &Path, book_id: &str) -> Result<Self>
	{
		let root = cache_root.join(format!("epub_{}", book_id));
		let cache = ExtractCache { root };
		cache.check_version()?;
		Ok(cache)
	}

	fn check_version(&self) -> Result<()>
	{
		let meta = self.root.join(META_FILENAME);
		if self.root.exists() {
			let stamped = fs::read_to_string(&meta)
				.ok()
				.and_then(|content| {
					content
						.lines()
						.find_map(|line| line.strip_prefix("version=").map(|v| v.trim().to_string()))
				});
			match stamped {
				Some(version) if version == CURRENT_VERSION => return Ok(()),
				Some(version) => {
					warn!("cache version {} != {}, clearing {}", version, CURRENT_VERSION, self.root.display());
				}
				None => {
					warn!("cache meta missing version entry, clearing {}", self.root.display());
				}
			}
			fs::remove_dir_all(&self.root)?;
		}
		fs::create_dir_all(&self.root)?;
		fs::write(&meta, format!("version={}\n", CURRENT_VERSION))?;
		info!("extraction cache ready at {}", self.root.display());
		Ok(())
	}

	/// Absolute path of an extracted archive member.
	pub(crate) fn member_path(&self, inner: &str) -> PathBuf
	{
		let mut path = self.root.clone();
		for part in inner.split('/') {
			if !part.is_empty() && part != "." && part != ".." {
				path.push(part);
			}
		}
		path
	}

	/// Path of the converted text stream for an inner XHTML path: the
	/// member path with its extension replaced by `.txt`.
	pub(crate) fn converted_path(&self, inner: &str) -> PathBuf
	{
		self.member_path(inner).with_extension("txt")
	}

	/// Create the parent directories for a member about to be written.
	pub(crate) fn ensure_parent(&self, path: &Path) -> Result<()>
	{
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		Ok(())
	}
}

/// A non-empty file at `path`, reusable without reconversion.
pub(crate) fn nonempty_file(path: &Path) -> bool
{
	fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

/// Book identifier from the archive file name: the stem with anything
/// outside `[A-Za-z0-9_-]` mapped to `_`.
pub(crate) fn book_id(path: &Path) -> String
{
	let stem = path
		.file_stem()
		.map(|s| s.to_string_lossy().into_owned())
		.unwrap_or_else(|| "book".to_string());
	let mut id: String = stem
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
		.collect();
	if id.is_empty() {
		id.push_str("book");
	}
	id
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fresh_cache_gets_stamp()
	{
		let dir = tempfile::tempdir().unwrap();
		let cache = ExtractCache::open(dir.path(), "abc").unwrap();
		let meta = cache.root.join(META_FILENAME);
		assert_eq!(fs::read_to_string(meta).unwrap(), "version=1\n");
	}

	#[test]
	fn test_version_mismatch_wipes_directory()
	{
		let dir = tempfile::tempdir().unwrap();
		let root = dir.path().join("epub_abc");
		fs::create_dir_all(&root).unwrap();
		fs::write(root.join(META_FILENAME), "version=0\n").unwrap();
		fs::write(root.join("stale.txt"), "old content").unwrap();

		let _cache = ExtractCache::open(dir.path(), "abc").unwrap();
		assert!(!root.join("stale.txt").exists());
		assert_eq!(fs::read_to_string(root.join(META_FILENAME)).unwrap(), "version=1\n");
	}

	#[test]
	fn test_matching_version_keeps_contents()
	{
		let dir = tempfile::tempdir().unwrap();
		let cache = ExtractCache::open(dir.path(), "abc").unwrap();
		let kept = cache.member_path("OEBPS/ch1.txt");
		cache.ensure_parent(&kept).unwrap();
		fs::write(&kept, "converted").unwrap();
		let _again = ExtractCache::open(dir.path(), "abc").unwrap();
		assert!(nonempty_file(&kept));
	}

	#[test]
	fn test_paths()
	{
		let dir = tempfile::tempdir().unwrap();
		let cache = ExtractCache::open(dir.path(), "b").unwrap();
		let converted = cache.converted_path("OEBPS/text/ch1.xhtml");
		assert!(converted.ends_with("epub_b/OEBPS/text/ch1.txt"));
		assert_eq!(book_id(Path::new("/books/My Novel (2).epub")), "My_Novel__2_");
	}
}
