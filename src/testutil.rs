//! Shared helpers for the in-file test modules: a minimal ZIP writer for
//! building fixture archives (stored and DEFLATE entries) and a lock that
//! serializes tests driving the process-wide DEFLATE decoder.

use std::sync::{Mutex, MutexGuard, OnceLock};

/// Tests that decompress must hold this guard; the decoder scratch state is
/// process-wide with at-most-one-in-use semantics and the test harness runs
/// threads in parallel.
pub(crate) fn decoder_guard() -> MutexGuard<'static, ()>
{
	static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
	LOCK.get_or_init(|| Mutex::new(()))
		.lock()
		.unwrap_or_else(|e| e.into_inner())
}

pub(crate) const METHOD_STORED: u16 = 0;
pub(crate) const METHOD_DEFLATE: u16 = 8;

struct Entry {
	name: Vec<u8>,
	method: u16,
	crc32: u32,
	comp: Vec<u8>,
	uncomp_size: u32,
	local_offset: u32,
}

/// Just enough of a ZIP writer to author test archives.
pub(crate) struct ZipBuilder {
	out: Vec<u8>,
	entries: Vec<Entry>,
}

impl ZipBuilder {
	pub(crate) fn new() -> Self
	{
		ZipBuilder { out: Vec::new(), entries: Vec::new() }
	}

	pub(crate) fn add(&mut self, name: &str, data: &[u8], method: u16) -> &mut Self
	{
		let comp = match method {
			METHOD_DEFLATE => miniz_oxide::deflate::compress_to_vec(data, 6),
			_ => data.to_vec(),
		};
		let crc32 = crc32(data);
		let local_offset = self.out.len() as u32;
		// local file header
		self.out.extend_from_slice(&0x04034b50u32.to_le_bytes());
		self.out.extend_from_slice(&20u16.to_le_bytes()); // version needed
		self.out.extend_from_slice(&0u16.to_le_bytes()); // flags
		self.out.extend_from_slice(&method.to_le_bytes());
		self.out.extend_from_slice(&0u16.to_le_bytes()); // mod time
		self.out.extend_from_slice(&0u16.to_le_bytes()); // mod date
		self.out.extend_from_slice(&crc32.to_le_bytes());
		self.out.extend_from_slice(&(comp.len() as u32).to_le_bytes());
		self.out.extend_from_slice(&(data.len() as u32).to_le_bytes());
		self.out.extend_from_slice(&(name.len() as u16).to_le_bytes());
		self.out.extend_from_slice(&0u16.to_le_bytes()); // extra len
		self.out.extend_from_slice(name.as_bytes());
		self.out.extend_from_slice(&comp);
		self.entries.push(Entry {
			name: name.as_bytes().to_vec(),
			method,
			crc32,
			comp,
			uncomp_size: data.len() as u32,
			local_offset,
		});
		self
	}

	pub(crate) fn finish(mut self) -> Vec<u8>
	{
		let cd_offset = self.out.len() as u32;
		for e in &self.entries {
			self.out.extend_from_slice(&0x02014b50u32.to_le_bytes());
			self.out.extend_from_slice(&20u16.to_le_bytes()); // version made by
			self.out.extend_from_slice(&20u16.to_le_bytes()); // version needed
			self.out.extend_from_slice(&0u16.to_le_bytes()); // flags
			self.out.extend_from_slice(&e.method.to_le_bytes());
			self.out.extend_from_slice(&0u16.to_le_bytes()); // mod time
			self.out.extend_from_slice(&0u16.to_le_bytes()); // mod date
			self.out.extend_from_slice(&e.crc32.to_le_bytes());
			self.out.extend_from_slice(&(e.comp.len() as u32).to_le_bytes());
			self.out.extend_from_slice(&e.uncomp_size.to_le_bytes());
			self.out.extend_from_slice(&(e.name.len() as u16).to_le_bytes());
			self.out.extend_from_slice(&0u16.to_le_bytes()); // extra len
			self.out.extend_from_slice(&0u16.to_le_bytes()); // comment len
			self.out.extend_from_slice(&0u16.to_le_bytes()); // disk start
			self.out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
			self.out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
			self.out.extend_from_slice(&e.local_offset.to_le_bytes());
			self.out.extend_from_slice(&e.name);
		}
		let cd_size = self.out.len() as u32 - cd_offset;
		let count = self.entries.len() as u16;
		self.out.extend_from_slice(&0x06054b50u32.to_le_bytes());
		self.out.extend_from_slice(&0u16.to_le_bytes()); // disk number
		self.out.extend_from_slice(&0u16.to_le_bytes()); // cd start disk
		self.out.extend_from_slice(&count.to_le_bytes());
		self.out.extend_from_slice(&count.to_le_bytes());
		self.out.extend_from_slice(&cd_size.to_le_bytes());
		self.out.extend_from_slice(&cd_offset.to_le_bytes());
		self.out.extend_from_slice(&0u16.to_le_bytes()); // comment len
		self.out
	}
}

fn crc32(data: &[u8]) -> u32
{
	let mut crc = !0u32;
	for &b in data {
		crc ^= b as u32;
		for _ in 0..8 {
			let mask = (crc & 1).wrapping_neg();
			crc = (crc >> 1) ^ (0xEDB88320 & mask);
		}
	}
	!crc
}

/// Write a small but structurally complete EPUB to `path`.
///
/// `chapters` is a list of `(href, xhtml)` pairs placed under `OEBPS/`;
/// `css` (when given) is referenced from the manifest as `style.css`.
pub(crate) fn write_epub(
	path: &std::path::Path, chapters: &[(&str, &str)], css: Option<&str>, language: &str,
) -> std::io::Result<()>
{
	let mut zip = ZipBuilder::new();
	zip.add("mimetype", b"application/epub+zip", METHOD_STORED);
	zip.add(
		"META-INF/container.xml",
		br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
		METHOD_DEFLATE,
	);

	let mut manifest = String::new();
	let mut spine = String::new();
	for (i, (href, _)) in chapters.iter().enumerate() {
		manifest.push_str(&format!(
			"<item id=\"ch{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
			i, href
		));
		spine.push_str(&format!("<itemref idref=\"ch{}\"/>\n", i));
	}
	if css.is_some() {
		manifest.push_str("<item id=\"css\" href=\"style.css\" media-type=\"text/css\"/>\n");
	}
	manifest.push_str("<item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n");
	let opf = format!(
		r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Fixture Book</dc:title>
    <dc:creator>inkpage tests</dc:creator>
    <dc:language>{}</dc:language>
  </metadata>
  <manifest>
{}  </manifest>
  <spine toc="ncx">
{}  </spine>
</package>"#,
		language, manifest, spine
	);
	zip.add("OEBPS/content.opf", opf.as_bytes(), METHOD_DEFLATE);

	let mut nav_points = String::new();
	for (i, (href, _)) in chapters.iter().enumerate() {
		nav_points.push_str(&format!(
			r#"<navPoint id="np{}" playOrder="{}"><navLabel><text>Chapter {}</text></navLabel><content src="{}"/></navPoint>"#,
			i,
			i + 1,
			i + 1,
			href
		));
	}
	let ncx = format!(
		r#"<?xml version="1.0" encoding="utf-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>{}</navMap>
</ncx>"#,
		nav_points
	);
	zip.add("OEBPS/toc.ncx", ncx.as_bytes(), METHOD_DEFLATE);

	if let Some(css_text) = css {
		zip.add("OEBPS/style.css", css_text.as_bytes(), METHOD_DEFLATE);
	}
	for (href, xhtml) in chapters {
		let full = format!("OEBPS/{}", href);
		zip.add(&full, xhtml.as_bytes(), METHOD_DEFLATE);
	}
	std::fs::write(path, zip.finish())
}

/// Fixed-advance measurement used by layout tests: every visible character
/// is 10 px wide; style tokens and indent-run markers are zero width.
pub(crate) fn mono_measure(text: &str) -> i32
{
	crate::convert::visible_len(text.as_bytes()) as i32 * 10
}
