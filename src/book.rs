//! Book-level metadata shared by the EPUB loader and the chapter-aware
//! word provider.

pub mod cache;
pub mod epub;

pub use epub::EpubBook;

/// One reading-order entry: a content document with its uncompressed
/// size and the cumulative size of everything before it.
#[derive(Clone, Debug)]
pub struct SpineItem {
	pub idref: String,
	/// Full inner archive path, resolved against the package directory.
	pub href: String,
	pub size: u64,
	pub offset: u64,
}

/// One table-of-contents entry from the navigation document.
#[derive(Clone, Debug)]
pub struct TocItem {
	pub title: String,
	pub href: String,
	pub anchor: Option<String>,
}
