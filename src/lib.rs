//! EPUB text pipeline for small monochrome readers.
//!
//! The crate covers the path from an opened book file to a rendered
//! page: ZIP access with streaming DEFLATE, XHTML-to-styled-text
//! conversion driven by a bidirectional XML pull parser, a seekable word
//! cursor over the converted stream, and Knuth–Plass page layout with
//! language-aware hyphenation and exact backward pagination.
//!
//! Rendering stays outside: layout measures text through a caller
//! function and produces [`layout::PageLayout`] values for the host's
//! renderer, which interprets the in-band style tokens described in
//! [`convert`].
//!
//! ```no_run
//! use inkpage::layout::{layout_page, LayoutConfig};
//! use inkpage::provider::{EpubWordProvider, WordProvider};
//!
//! # fn measure_px(text: &str) -> i32 { text.len() as i32 * 10 }
//! # fn main() -> anyhow::Result<()> {
//! let mut provider = EpubWordProvider::open("book.epub", "/cache")?;
//! let mut config = LayoutConfig::default();
//! config.language = provider.language();
//! let mut measure = |text: &str| measure_px(text);
//! let page = layout_page(&mut provider, &mut measure, &config);
//! provider.set_position(page.end_position); // next page
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod book;
pub mod convert;
pub mod css;
pub mod error;
pub mod hyphen;
pub mod layout;
pub mod position;
pub mod provider;
pub mod xml;

#[cfg(test)]
pub(crate) mod testutil;

pub use book::EpubBook;
pub use error::{Error, Result};
pub use hyphen::Language;
pub use layout::{layout_page, previous_page_start, LayoutConfig, PageLayout};
pub use provider::{EpubWordProvider, FileWordProvider, StringWordProvider, WordProvider};
