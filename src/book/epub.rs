//! EPUB metadata and chapter access.
//!
//! The small metadata documents (`META-INF/container.xml`, the OPF
//! package, `toc.ncx`) are deserialized with quick-xml; chapter XHTML is
//! never held in memory — it streams straight out of the archive through
//! the pull parser into a converted `.txt` file in the extraction cache.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use serde_derive::Deserialize;

use crate::archive::ZipReader;
use crate::book::cache::{book_id, nonempty_file, ExtractCache};
use crate::book::{SpineItem, TocItem};
use crate::convert::convert_chapter;
use crate::css::CssRules;
use crate::hyphen::Language;
use crate::xml::{PullFn, XmlParser};

/// epub container.xml
#[derive(Deserialize)]
struct RootFile {
	#[serde(rename = "@full-path")]
	full_path: String,
}
#[derive(Deserialize)]
struct RootFiles {
	rootfile: Vec<RootFile>,
}
#[derive(Deserialize)]
struct EpubContainer {
	rootfiles: RootFiles,
}

/// epub content.opf
#[derive(Deserialize)]
struct OpfMetadata {
	#[serde(default, rename = "title", alias = "dc:title")]
	title: Vec<String>,
	#[serde(default, rename = "creator", alias = "dc:creator")]
	creator: Vec<String>,
	#[serde(rename = "language", alias = "dc:language")]
	language: Option<String>,
}
#[derive(Deserialize)]
struct OpfItem {
	#[serde(rename = "@id")]
	id: String,
	#[serde(rename = "@href")]
	href: String,
	#[serde(rename = "@media-type")]
	media_type: String,
}
#[derive(Deserialize)]
struct OpfManifest {
	#[serde(default, rename = "item")]
	items: Vec<OpfItem>,
}
#[derive(Deserialize)]
struct OpfSpineItem {
	#[serde(rename = "@idref")]
	idref: String,
}
#[derive(Deserialize)]
struct OpfSpine {
	#[serde(rename = "@toc")]
	toc: Option<String>,
	#[serde(default, rename = "itemref")]
	itemrefs: Vec<OpfSpineItem>,
}
#[derive(Deserialize)]
struct ContentOpf {
	metadata: OpfMetadata,
	manifest: OpfManifest,
	spine: OpfSpine,
}

/// epub toc.ncx
#[derive(Deserialize)]
struct NcxNavLabel {
	text: String,
}
#[derive(Deserialize)]
struct NcxContent {
	#[serde(rename = "@src")]
	src: String,
}
#[derive(Deserialize)]
struct NcxNavPoint {
	#[serde(rename = "navLabel")]
	nav_label: Option<NcxNavLabel>,
	content: Option<NcxContent>,
	#[serde(default, rename = "navPoint")]
	nav_points: Vec<NcxNavPoint>,
}
#[derive(Deserialize)]
struct NcxNavMap {
	#[serde(default, rename = "navPoint")]
	nav_points: Vec<NcxNavPoint>,
}
#[derive(Deserialize)]
struct Ncx {
	#[serde(rename = "navMap")]
	nav_map: NcxNavMap,
}

pub struct EpubBook {
	zip: ZipReader,
	cache: ExtractCache,
	title: String,
	author: Option<String>,
	language: String,
	spine: Vec<SpineItem>,
	toc: Vec<TocItem>,
	css: CssRules,
	total_size: u64,
}

impl EpubBook {
	/// Open an EPUB archive, parse its package metadata and prepare the
	/// extraction cache under `cache_root`.
	pub fn open(path: impl AsRef<Path>, cache_root: impl AsRef<Path>) -> Result<Self>
	{
		let path = path.as_ref();
		let mut zip = ZipReader::open(path)
			.with_context(|| format!("failed to open {}", path.display()))?;
		if zip.contains("META-INF/encryption.xml") {
			bail!("encrypted epub");
		}
		let cache = ExtractCache::open(cache_root.as_ref(), &book_id(path))?;

		let container_text = inner_string(&mut zip, "META-INF/container.xml")?;
		let container: EpubContainer = quick_xml::de::from_str(&container_text)
			.map_err(|e| anyhow!("malformed container.xml: {}", e))?;
		let opf_path = container
			.rootfiles
			.rootfile
			.first()
			.ok_or_else(|| anyhow!("container.xml names no rootfile"))?
			.full_path
			.clone();
		let opf_dir = parent_dir(&opf_path);

		let opf_text = inner_string(&mut zip, &opf_path)?;
		let opf: ContentOpf = quick_xml::de::from_str(&opf_text)
			.map_err(|e| anyhow!("malformed package document: {}", e))?;

		let title = opf.metadata.title.first().cloned().unwrap_or_default();
		let author = opf.metadata.creator.first().cloned();
		let language = opf.metadata.language.unwrap_or_default();

		// manifest ids to resolved archive paths
		let manifest: Vec<(String, String, String)> = opf
			.manifest
			.items
			.into_iter()
			.map(|item| {
				let resolved = join_inner(&opf_dir, &item.href);
				(item.id, resolved, item.media_type)
			})
			.collect();

		let mut spine = Vec::new();
		let mut offset = 0u64;
		for itemref in &opf.spine.itemrefs {
			let Some((_, href, _)) = manifest.iter().find(|(id, ..)| *id == itemref.idref) else {
				warn!("spine idref {} not in manifest", itemref.idref);
				continue;
			};
			let Ok(index) = zip.locate(href) else {
				warn!("spine item {} missing from archive", href);
				continue;
			};
			let size = zip.info(index)?.uncompressed_size;
			spine.push(SpineItem { idref: itemref.idref.clone(), href: href.clone(), size, offset });
			offset += size;
		}
		let total_size = offset;
		if spine.is_empty() {
			bail!("no readable spine items");
		}

		let toc_id = opf.spine.toc.clone().unwrap_or_else(|| "ncx".to_string());
		let toc = match manifest.iter().find(|(id, ..)| *id == toc_id) {
			Some((_, href, _)) => match parse_ncx(&mut zip, href) {
				Ok(toc) => toc,
				Err(e) => {
					warn!("unusable ncx {}: {}", href, e);
					Vec::new()
				}
			},
			None => Vec::new(),
		};

		let mut css = CssRules::new();
		for (_, href, media_type) in &manifest {
			if media_type.to_ascii_lowercase().contains("css") {
				match inner_string(&mut zip, href) {
					Ok(text) => css.parse(&text),
					Err(e) => warn!("skipping stylesheet {}: {}", href, e),
				}
			}
		}

		info!(
			"opened '{}': {} chapters, {} toc entries, {} css rules, language '{}'",
			title,
			spine.len(),
			toc.len(),
			css.rule_count(),
			language
		);
		Ok(EpubBook { zip, cache, title, author, language, spine, toc, css, total_size })
	}

	#[inline]
	pub fn title(&self) -> &str
	{
		&self.title
	}

	#[inline]
	pub fn author(&self) -> Option<&str>
	{
		self.author.as_deref()
	}

	#[inline]
	pub fn language(&self) -> &str
	{
		&self.language
	}

	/// Hyphenation language for this book's metadata language tag.
	#[inline]
	pub fn hyphen_language(&self) -> Language
	{
		Language::from_tag(&self.language)
	}

	#[inline]
	pub fn spine_count(&self) -> usize
	{
		self.spine.len()
	}

	#[inline]
	pub fn spine(&self) -> &[SpineItem]
	{
		&self.spine
	}

	pub fn spine_item(&self, index: usize) -> Option<&SpineItem>
	{
		self.spine.get(index)
	}

	#[inline]
	pub fn toc(&self) -> &[TocItem]
	{
		&self.toc
	}

	#[inline]
	pub fn total_book_size(&self) -> u64
	{
		self.total_size
	}

	#[inline]
	pub fn css(&self) -> &CssRules
	{
		&self.css
	}

	/// Chapter title for a spine index, from the TOC entry that points at
	/// the same content document. Empty when there is none.
	pub fn chapter_name_for_spine(&self, index: usize) -> String
	{
		let Some(item) = self.spine.get(index) else { return String::new() };
		self.toc
			.iter()
			.find(|t| t.href == item.href)
			.map(|t| t.title.clone())
			.unwrap_or_default()
	}

	/// Path of the converted text stream for a chapter, converting it on
	/// first use. A non-empty existing conversion is reused as is.
	pub fn chapter_txt_path(&self, index: usize) -> Result<PathBuf>
	{
		let item = self
			.spine
			.get(index)
			.ok_or_else(|| anyhow!("chapter index {} out of range", index))?;
		let txt_path = self.cache.converted_path(&item.href);
		if nonempty_file(&txt_path) {
			debug!("reusing converted chapter {}", txt_path.display());
			return Ok(txt_path);
		}
		self.cache.ensure_parent(&txt_path)?;

		let zip_index = self.zip.locate(&item.href)?;
		let mut pull = self.zip.pull_open(zip_index, 8192)?;
		let cb: PullFn = Box::new(move |buf: &mut [u8]| pull.read(buf));
		let mut parser = XmlParser::open_stream(cb);
		let mut out = BufWriter::new(File::create(&txt_path)?);
		match convert_chapter(&mut parser, Some(&self.css), &mut out) {
			Ok(bytes) => {
				out.flush()?;
				info!("converted {} ({} bytes)", item.href, bytes);
				Ok(txt_path)
			}
			Err(e) => {
				// a partial conversion must not be mistaken for a cache hit
				drop(out);
				let _ = fs::remove_file(&txt_path);
				Err(anyhow!("conversion of {} failed: {}", item.href, e))
			}
		}
	}
}

fn inner_string(zip: &mut ZipReader, name: &str) -> Result<String>
{
	let index = zip.locate(name)?;
	let bytes = zip.extract_to_vec(index)?;
	Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn parse_ncx(zip: &mut ZipReader, href: &str) -> Result<Vec<TocItem>>
{
	let text = inner_string(zip, href)?;
	let ncx: Ncx = quick_xml::de::from_str(&text).map_err(|e| anyhow!("malformed ncx: {}", e))?;
	let cwd = parent_dir(href);
	let mut toc = Vec::new();
	collect_nav_points(&ncx.nav_map.nav_points, &cwd, &mut toc);
	Ok(toc)
}

fn collect_nav_points(points: &[NcxNavPoint], cwd: &str, toc: &mut Vec<TocItem>)
{
	for point in points {
		if let Some(content) = &point.content {
			let title = point
				.nav_label
				.as_ref()
				.map(|l| l.text.trim().to_string())
				.unwrap_or_default();
			let mut src = content.src.split('#');
			let file = src.next().unwrap_or("");
			let anchor = src.next().map(|a| a.to_string());
			toc.push(TocItem { title, href: join_inner(cwd, file), anchor });
		}
		collect_nav_points(&point.nav_points, cwd, toc);
	}
}

fn parent_dir(inner: &str) -> String
{
	match inner.rfind('/') {
		Some(slash) => inner[..slash].to_string(),
		None => String::new(),
	}
}

/// Join an archive-relative path against a directory, resolving `.` and
/// `..` segments the way package hrefs use them.
fn join_inner(dir: &str, sub: &str) -> String
{
	let mut parts: Vec<&str> = if dir.is_empty() { Vec::new() } else { dir.split('/').collect() };
	for segment in sub.split('/') {
		match segment {
			"" | "." => {}
			".." => {
				parts.pop();
			}
			s => parts.push(s),
		}
	}
	parts.join("/")
}
