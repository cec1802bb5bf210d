//! Bidirectional XML pull parser over a byte-addressable source.
//!
//! Built for chapter streams: nodes can be visited forward or backward,
//! any byte position can be sought to, and text nodes expose a
//! character-level cursor in both directions. The source is either a file
//! read through an 8 KiB window centered on the requested position, an
//! in-memory buffer, or a forward-only pull callback (stream-from-ZIP).
//!
//! The parser is deliberately lenient: malformed tags skip to the next
//! `>`, unterminated comments and CDATA read to end of input, and a
//! malformed attribute stops attribute collection for that tag only.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;

const WINDOW_SIZE: usize = 8192;
const PULL_CHUNK: usize = 2048;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeType {
	None,
	Element,
	EndElement,
	Text,
	Comment,
	Cdata,
	ProcessingInstruction,
	EndOfFile,
}

pub type PullFn = Box<dyn FnMut(&mut [u8]) -> Result<usize>>;

enum Backing {
	File(File),
	Memory(Vec<u8>),
	Pull { cb: PullFn, eof: bool },
}

struct ByteSource {
	backing: Backing,
	size: Option<u64>,
	window: Vec<u8>,
	window_start: u64,
}

impl ByteSource {
	fn from_file(mut file: File) -> Result<Self>
	{
		let size = file.metadata()?.len();
		file.seek(SeekFrom::Start(0))?;
		Ok(ByteSource {
			backing: Backing::File(file),
			size: Some(size),
			window: Vec::new(),
			window_start: 0,
		})
	}

	fn from_memory(data: Vec<u8>) -> Self
	{
		let size = data.len() as u64;
		ByteSource { backing: Backing::Memory(data), size: Some(size), window: Vec::new(), window_start: 0 }
	}

	fn from_pull(cb: PullFn) -> Self
	{
		ByteSource {
			backing: Backing::Pull { cb, eof: false },
			size: None,
			window: Vec::new(),
			window_start: 0,
		}
	}

	/// Byte at an absolute position, or `None` past the end of input (and,
	/// for pull sources, behind the forward-only window).
	fn byte_at(&mut self, pos: u64) -> Option<u8>
	{
		if let Some(size) = self.size {
			if pos >= size {
				return None;
			}
		}
		if pos >= self.window_start && pos < self.window_start + self.window.len() as u64 {
			return Some(self.window[(pos - self.window_start) as usize]);
		}
		match &mut self.backing {
			Backing::Memory(data) => data.get(pos as usize).copied(),
			Backing::File(file) => {
				let size = self.size.unwrap_or(0);
				// center the window on the miss
				let half = (WINDOW_SIZE / 2) as u64;
				let mut start = pos.saturating_sub(half);
				if start + WINDOW_SIZE as u64 > size {
					start = size.saturating_sub(WINDOW_SIZE as u64);
				}
				if file.seek(SeekFrom::Start(start)).is_err() {
					return None;
				}
				self.window.resize(WINDOW_SIZE.min((size - start) as usize), 0);
				let mut filled = 0;
				while filled < self.window.len() {
					match file.read(&mut self.window[filled..]) {
						Ok(0) => break,
						Ok(n) => filled += n,
						Err(_) => return None,
					}
				}
				self.window.truncate(filled);
				self.window_start = start;
				if pos >= start && pos < start + self.window.len() as u64 {
					Some(self.window[(pos - start) as usize])
				} else {
					None
				}
			}
			Backing::Pull { cb, eof } => {
				if pos < self.window_start {
					// behind the forward-only window
					return None;
				}
				while !*eof && pos >= self.window_start + self.window.len() as u64 {
					let old_len = self.window.len();
					self.window.resize(old_len + PULL_CHUNK, 0);
					let n = match cb(&mut self.window[old_len..]) {
						Ok(n) => n,
						Err(_) => 0,
					};
					self.window.truncate(old_len + n);
					if n == 0 {
						*eof = true;
						self.size = Some(self.window_start + self.window.len() as u64);
						break;
					}
					// keep only the trailing window once it grows large,
					// but never discard the byte being asked for
					let keep_from = pos.min(self.window_start + self.window.len() as u64);
					if self.window.len() > WINDOW_SIZE * 2 {
						let discard =
							((keep_from - self.window_start) as usize).min(self.window.len() - WINDOW_SIZE);
						if discard > 0 {
							self.window.drain(..discard);
							self.window_start += discard as u64;
						}
					}
				}
				if pos >= self.window_start && pos < self.window_start + self.window.len() as u64 {
					Some(self.window[(pos - self.window_start) as usize])
				} else {
					None
				}
			}
		}
	}

	#[inline]
	fn size(&self) -> Option<u64>
	{
		self.size
	}
}

#[inline]
fn is_ws(b: u8) -> bool
{
	matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

#[inline]
fn is_name_delim(b: u8) -> bool
{
	is_ws(b) || b == b'>' || b == b'/'
}

enum LeftBoundary {
	TextStart(u64),
	InsideTag(u64),
}

pub struct XmlParser {
	src: ByteSource,
	pos: u64,
	node: NodeType,
	name: String,
	attrs: Vec<(String, String)>,
	empty_element: bool,
	elem_start: u64,
	elem_end: u64,
	text_start: u64,
	text_end: u64,
	text_pos: u64,
}

impl XmlParser {
	pub fn open(path: impl AsRef<Path>) -> Result<Self>
	{
		let file = File::open(path.as_ref())?;
		Ok(Self::with_source(ByteSource::from_file(file)?))
	}

	pub fn open_bytes(data: Vec<u8>) -> Self
	{
		Self::with_source(ByteSource::from_memory(data))
	}

	/// Parse a forward-only stream, e.g. straight out of a ZIP pull
	/// context. Backward movement is limited to the in-memory window.
	pub fn open_stream(cb: PullFn) -> Self
	{
		Self::with_source(ByteSource::from_pull(cb))
	}

	fn with_source(src: ByteSource) -> Self
	{
		XmlParser {
			src,
			pos: 0,
			node: NodeType::None,
			name: String::new(),
			attrs: Vec::new(),
			empty_element: false,
			elem_start: 0,
			elem_end: 0,
			text_start: 0,
			text_end: 0,
			text_pos: 0,
		}
	}

	#[inline]
	pub fn node_type(&self) -> NodeType
	{
		self.node
	}

	#[inline]
	pub fn name(&self) -> &str
	{
		&self.name
	}

	#[inline]
	pub fn is_empty_element(&self) -> bool
	{
		self.empty_element
	}

	/// Attribute lookup, ASCII-case-insensitive on the name.
	pub fn attribute(&self, name: &str) -> Option<&str>
	{
		self.attrs
			.iter()
			.find(|(n, _)| n.eq_ignore_ascii_case(name))
			.map(|(_, v)| v.as_str())
	}

	#[inline]
	pub fn file_size(&self) -> Option<u64>
	{
		self.src.size()
	}

	/// Seekable position of the current node: the intra-text cursor for
	/// text nodes, the `<` position for markup.
	pub fn file_position(&self) -> u64
	{
		match self.node {
			NodeType::Text => self.text_pos,
			NodeType::Element
			| NodeType::EndElement
			| NodeType::Comment
			| NodeType::Cdata
			| NodeType::ProcessingInstruction => self.elem_start,
			_ => self.pos,
		}
	}

	/// Position the parser so that the next `read` or `read_backward`
	/// reproduces the node containing `pos`.
	pub fn seek_to_file_position(&mut self, pos: u64)
	{
		let clamped = match self.src.size() {
			Some(size) => pos.min(size),
			None => pos,
		};
		self.pos = clamped;
		self.node = NodeType::None;
	}

	/// Advance to the next node; false at end of input. Whitespace-only
	/// text nodes are skipped.
	pub fn read(&mut self) -> bool
	{
		loop {
			let Some(c) = self.src.byte_at(self.pos) else {
				self.node = NodeType::EndOfFile;
				return false;
			};
			if c == b'<' {
				self.parse_markup(self.pos);
				self.pos = self.elem_end;
				return true;
			}
			match self.left_boundary(self.pos) {
				LeftBoundary::InsideTag(lt) => {
					// seeked into the middle of a tag
					self.parse_markup(lt);
					self.pos = self.elem_end;
					return true;
				}
				LeftBoundary::TextStart(ts) => {
					let te = self.scan_text_end(ts.max(self.pos));
					if self.all_whitespace(ts, te) {
						self.pos = te;
						continue;
					}
					let cursor = self.pos.max(ts);
					self.set_text_node(ts, te, cursor);
					self.pos = te;
					return true;
				}
			}
		}
	}

	/// Move to the previous node; false at the beginning of input. For
	/// text nodes the cursor lands on the text end; use the backward text
	/// API to consume characters.
	pub fn read_backward(&mut self) -> bool
	{
		loop {
			if self.pos == 0 {
				self.node = NodeType::None;
				return false;
			}
			let Some(prev) = self.src.byte_at(self.pos - 1) else {
				self.pos -= 1;
				continue;
			};
			if prev == b'>' {
				let lt = self.scan_left_for_lt(self.pos - 1);
				self.parse_markup(lt);
				self.pos = self.elem_start;
				return true;
			}
			match self.left_boundary(self.pos) {
				LeftBoundary::InsideTag(lt) => {
					self.parse_markup(lt);
					self.pos = self.elem_start;
					return true;
				}
				LeftBoundary::TextStart(ts) => {
					let te = self.scan_text_end(self.pos);
					if self.all_whitespace(ts, te) {
						self.pos = ts;
						continue;
					}
					let cursor = self.pos.min(te);
					self.set_text_node(ts, te, cursor);
					self.pos = ts;
					return true;
				}
			}
		}
	}

	// ---- text-node character cursor ----

	#[inline]
	pub fn has_more_text_chars(&self) -> bool
	{
		self.node == NodeType::Text && self.text_pos < self.text_end
	}

	#[inline]
	pub fn has_more_text_chars_backward(&self) -> bool
	{
		self.node == NodeType::Text && self.text_pos > self.text_start
	}

	pub fn peek_text_char(&mut self) -> u8
	{
		if self.has_more_text_chars() {
			self.src.byte_at(self.text_pos).unwrap_or(0)
		} else {
			0
		}
	}

	pub fn peek_text_char_prev(&mut self) -> u8
	{
		if self.has_more_text_chars_backward() {
			self.src.byte_at(self.text_pos - 1).unwrap_or(0)
		} else {
			0
		}
	}

	pub fn read_text_char_forward(&mut self) -> u8
	{
		if !self.has_more_text_chars() {
			return 0;
		}
		let b = self.src.byte_at(self.text_pos).unwrap_or(0);
		self.text_pos += 1;
		b
	}

	pub fn read_text_char_backward(&mut self) -> u8
	{
		if !self.has_more_text_chars_backward() {
			return 0;
		}
		self.text_pos -= 1;
		self.src.byte_at(self.text_pos).unwrap_or(0)
	}

	// ---- internals ----

	fn set_text_node(&mut self, start: u64, end: u64, cursor: u64)
	{
		self.node = NodeType::Text;
		self.name.clear();
		self.attrs.clear();
		self.empty_element = false;
		self.text_start = start;
		self.text_end = end;
		self.text_pos = cursor;
		self.elem_start = start;
		self.elem_end = end;
	}

	fn scan_text_end(&mut self, from: u64) -> u64
	{
		let mut p = from;
		while let Some(b) = self.src.byte_at(p) {
			if b == b'<' {
				break;
			}
			p += 1;
		}
		p
	}

	fn all_whitespace(&mut self, start: u64, end: u64) -> bool
	{
		let mut p = start;
		while p < end {
			match self.src.byte_at(p) {
				Some(b) if is_ws(b) => p += 1,
				Some(_) => return false,
				None => break,
			}
		}
		true
	}

	/// Classify the region left of `pos`: either the start of the text run
	/// containing it, or the `<` of a tag it sits inside.
	fn left_boundary(&mut self, pos: u64) -> LeftBoundary
	{
		let mut p = pos;
		while p > 0 {
			match self.src.byte_at(p - 1) {
				Some(b'>') => return LeftBoundary::TextStart(p),
				Some(b'<') => return LeftBoundary::InsideTag(p - 1),
				Some(_) => p -= 1,
				// behind a forward-only window: treat as a text boundary
				None => return LeftBoundary::TextStart(p),
			}
		}
		LeftBoundary::TextStart(0)
	}

	fn scan_left_for_lt(&mut self, gt: u64) -> u64
	{
		let mut p = gt;
		while p > 0 {
			match self.src.byte_at(p - 1) {
				Some(b'<') => return p - 1,
				Some(_) | None => p -= 1,
			}
		}
		0
	}

	fn parse_markup(&mut self, lt: u64)
	{
		self.name.clear();
		self.attrs.clear();
		self.empty_element = false;
		self.elem_start = lt;

		match self.src.byte_at(lt + 1) {
			None => {
				// lone '<' at end of input
				self.node = NodeType::Text;
				self.text_start = lt;
				self.text_end = lt + 1;
				self.text_pos = lt;
				self.elem_end = lt + 1;
			}
			Some(b'/') => {
				self.node = NodeType::EndElement;
				let name_end = self.read_name(lt + 2);
				self.elem_end = self.skip_past_gt(name_end);
			}
			Some(b'!') => {
				if self.matches_at(lt + 2, b"--") {
					self.node = NodeType::Comment;
					self.elem_end = self.find_terminator(lt + 4, b"-->");
				} else if self.matches_at(lt + 2, b"[CDATA[") {
					self.node = NodeType::Cdata;
					self.elem_end = self.find_terminator(lt + 9, b"]]>");
				} else {
					// DOCTYPE and friends; treated like a comment
					self.node = NodeType::Comment;
					self.elem_end = self.skip_past_gt(lt + 2);
				}
			}
			Some(b'?') => {
				self.node = NodeType::ProcessingInstruction;
				self.elem_end = self.find_terminator(lt + 2, b"?>");
			}
			Some(_) => {
				self.node = NodeType::Element;
				let name_end = self.read_name(lt + 1);
				self.elem_end = self.parse_attributes(name_end);
			}
		}
	}

	fn matches_at(&mut self, pos: u64, pat: &[u8]) -> bool
	{
		for (i, &p) in pat.iter().enumerate() {
			if self.src.byte_at(pos + i as u64) != Some(p) {
				return false;
			}
		}
		true
	}

	fn find_terminator(&mut self, from: u64, pat: &[u8]) -> u64
	{
		let mut p = from;
		loop {
			if self.src.byte_at(p).is_none() {
				// unterminated construct reads to end of input
				return p;
			}
			if self.matches_at(p, pat) {
				return p + pat.len() as u64;
			}
			p += 1;
		}
	}

	fn read_name(&mut self, from: u64) -> u64
	{
		let mut p = from;
		let mut raw = Vec::new();
		while let Some(b) = self.src.byte_at(p) {
			if is_name_delim(b) {
				break;
			}
			raw.push(b);
			p += 1;
		}
		self.name = String::from_utf8_lossy(&raw).into_owned();
		p
	}

	fn skip_past_gt(&mut self, from: u64) -> u64
	{
		let mut p = from;
		while let Some(b) = self.src.byte_at(p) {
			if b == b'>' {
				return p + 1;
			}
			p += 1;
		}
		p
	}

	/// Attribute scan from just past the element name. A malformed
	/// attribute stops collection for this tag; the rest is skipped to
	/// `>` so the parser itself stays valid.
	fn parse_attributes(&mut self, from: u64) -> u64
	{
		let mut p = from;
		loop {
			while let Some(b) = self.src.byte_at(p) {
				if is_ws(b) {
					p += 1;
				} else {
					break;
				}
			}
			match self.src.byte_at(p) {
				None => return p,
				Some(b'>') => return p + 1,
				Some(b'/') => {
					if self.src.byte_at(p + 1) == Some(b'>') {
						self.empty_element = true;
						return p + 2;
					}
					p += 1;
					continue;
				}
				Some(_) => {}
			}

			let mut attr_name = String::new();
			while let Some(b) = self.src.byte_at(p) {
				if b == b'=' || is_name_delim(b) {
					break;
				}
				if b.is_ascii() {
					attr_name.push(b.to_ascii_lowercase() as char);
				}
				p += 1;
			}
			while let Some(b) = self.src.byte_at(p) {
				if is_ws(b) {
					p += 1;
				} else {
					break;
				}
			}
			if self.src.byte_at(p) != Some(b'=') {
				// valueless attribute; keep scanning
				if attr_name.is_empty() {
					return self.skip_past_gt(p);
				}
				continue;
			}
			p += 1;
			while let Some(b) = self.src.byte_at(p) {
				if is_ws(b) {
					p += 1;
				} else {
					break;
				}
			}
			let quote = match self.src.byte_at(p) {
				Some(q @ (b'"' | b'\'')) => {
					p += 1;
					Some(q)
				}
				Some(_) => None,
				None => return p,
			};
			let mut raw_value = Vec::new();
			match quote {
				Some(q) => loop {
					match self.src.byte_at(p) {
						None => {
							// unterminated quote: first malformed attribute
							// ends collection for this tag
							return p;
						}
						Some(b) if b == q => {
							p += 1;
							break;
						}
						Some(b'>') if raw_value.len() > WINDOW_SIZE => {
							// runaway quoted value; bail at the tag end
							return p + 1;
						}
						Some(b) => {
							raw_value.push(b);
							p += 1;
						}
					}
				},
				None => {
					while let Some(b) = self.src.byte_at(p) {
						if is_ws(b) || b == b'>' || b == b'/' {
							break;
						}
						raw_value.push(b);
						p += 1;
					}
				}
			}
			if !attr_name.is_empty() {
				let value = String::from_utf8_lossy(&raw_value).into_owned();
				self.attrs.push((attr_name, value));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const DOC: &str = r#"<?xml version="1.0"?><html><head><title>T</title></head>
<body><p class="first">Hello <b>bold</b> world</p><br/>
<!-- note --><p>Second paragraph with ümlauts</p></body></html>"#;

	fn forward_nodes(parser: &mut XmlParser) -> Vec<(NodeType, String, bool)>
	{
		let mut nodes = vec![];
		parser.seek_to_file_position(0);
		while parser.read() {
			nodes.push((parser.node_type(), parser.name().to_string(), parser.is_empty_element()));
		}
		nodes
	}

	fn backward_nodes(parser: &mut XmlParser, end: u64) -> Vec<(NodeType, String, bool)>
	{
		let mut nodes = vec![];
		parser.seek_to_file_position(end);
		while parser.read_backward() {
			nodes.push((parser.node_type(), parser.name().to_string(), parser.is_empty_element()));
		}
		nodes.reverse();
		nodes
	}

	#[test]
	fn test_forward_backward_symmetry()
	{
		let mut parser = XmlParser::open_bytes(DOC.as_bytes().to_vec());
		let forward = forward_nodes(&mut parser);
		let end = parser.file_size().unwrap();
		let backward = backward_nodes(&mut parser, end);
		assert_eq!(forward, backward);
		assert!(forward.iter().any(|(t, n, _)| *t == NodeType::Element && n == "b"));
		assert!(forward.iter().any(|(t, ..)| *t == NodeType::Comment));
	}

	#[test]
	fn test_text_node_split_reads()
	{
		let doc = b"<p>abcdefgh</p>".to_vec();
		let mut parser = XmlParser::open_bytes(doc);
		assert!(parser.read()); // <p>
		assert!(parser.read()); // text
		assert_eq!(parser.node_type(), NodeType::Text);
		let start = parser.file_position();
		// consume three chars, remember the middle
		for _ in 0..3 {
			parser.read_text_char_forward();
		}
		let mid = parser.file_position();
		assert_eq!(mid, start + 3);

		// seek to mid and read forward: rest of the text
		parser.seek_to_file_position(mid);
		assert!(parser.read());
		assert_eq!(parser.node_type(), NodeType::Text);
		let mut tail = vec![];
		while parser.has_more_text_chars() {
			tail.push(parser.read_text_char_forward());
		}
		assert_eq!(tail, b"defgh");

		// seek to mid and read backward: front of the text, reversed
		parser.seek_to_file_position(mid);
		assert!(parser.read_backward());
		assert_eq!(parser.node_type(), NodeType::Text);
		let mut head = vec![];
		while parser.has_more_text_chars_backward() {
			head.push(parser.read_text_char_backward());
		}
		head.reverse();
		assert_eq!(head, b"abc");
	}

	#[test]
	fn test_attributes()
	{
		let doc = br#"<item ID="ch1" href='a.xhtml' media-type="application/xhtml+xml"/>"#.to_vec();
		let mut parser = XmlParser::open_bytes(doc);
		assert!(parser.read());
		assert_eq!(parser.node_type(), NodeType::Element);
		assert!(parser.is_empty_element());
		assert_eq!(parser.attribute("id"), Some("ch1"));
		assert_eq!(parser.attribute("HREF"), Some("a.xhtml"));
		assert_eq!(parser.attribute("media-type"), Some("application/xhtml+xml"));
		assert_eq!(parser.attribute("missing"), None);
	}

	#[test]
	fn test_malformed_attribute_does_not_invalidate_parser()
	{
		let doc = br#"<p class="ok" style="unterminated><b>x</b>"#.to_vec();
		let mut parser = XmlParser::open_bytes(doc);
		assert!(parser.read());
		assert_eq!(parser.node_type(), NodeType::Element);
		assert_eq!(parser.attribute("class"), Some("ok"));
		// attributes before the malformed one survive and later reads
		// terminate cleanly instead of crashing
		while parser.read() {}
		assert_eq!(parser.node_type(), NodeType::EndOfFile);
	}

	#[test]
	fn test_unterminated_comment_reads_to_eof()
	{
		let doc = b"<p>a</p><!-- never closed".to_vec();
		let mut parser = XmlParser::open_bytes(doc);
		let mut count = 0;
		while parser.read() {
			count += 1;
		}
		assert_eq!(count, 4); // p, text, /p, comment
	}

	#[test]
	fn test_whitespace_only_text_skipped()
	{
		let doc = b"<a>  \n\t  </a>".to_vec();
		let mut parser = XmlParser::open_bytes(doc);
		assert!(parser.read());
		assert_eq!(parser.node_type(), NodeType::Element);
		assert!(parser.read());
		assert_eq!(parser.node_type(), NodeType::EndElement);
	}

	#[test]
	fn test_seek_reproduces_node()
	{
		let mut parser = XmlParser::open_bytes(DOC.as_bytes().to_vec());
		let mut positions = vec![];
		while parser.read() {
			positions.push((parser.file_position(), parser.node_type(), parser.name().to_string()));
		}
		for (pos, node_type, name) in positions {
			parser.seek_to_file_position(pos);
			assert!(parser.read());
			assert_eq!(parser.node_type(), node_type);
			assert_eq!(parser.name(), name);
			parser.seek_to_file_position(pos);
			assert!(parser.read_backward() || pos == 0);
			if pos > 0 {
				// the node bracketing pos from the left has start <= pos
				assert!(parser.file_position() <= pos);
			}
		}
	}

	#[test]
	fn test_pull_stream_forward_parse()
	{
		let data = DOC.as_bytes().to_vec();
		let mut ofs = 0usize;
		let cb: PullFn = Box::new(move |buf: &mut [u8]| {
			let n = (data.len() - ofs).min(buf.len()).min(119);
			buf[..n].copy_from_slice(&data[ofs..ofs + n]);
			ofs += n;
			Ok(n)
		});
		let mut streamed = XmlParser::open_stream(cb);
		let mut names = vec![];
		while streamed.read() {
			if streamed.node_type() == NodeType::Element {
				names.push(streamed.name().to_string());
			}
		}
		assert_eq!(names, ["html", "head", "title", "body", "p", "b", "br", "p"]);
	}
}
