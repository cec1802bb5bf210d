//! XHTML to styled-text conversion.
//!
//! Drives the pull parser through one chapter and writes a compact byte
//! stream: UTF-8 text plus in-band two-byte style tokens `ESC <cmd>`.
//! Newlines separate paragraphs. Inline style emission is deferred until
//! visible text is about to be written, so nested or redundant style
//! elements never produce dangling tokens; every open token is closed
//! before the newline that ends its paragraph.

use std::io::Write;

use log::{debug, warn};

use crate::css::{parse_inline_style, CssRules, CssStyle, StyleFlags, TextAlign};
use crate::error::Result;
use crate::xml::{NodeType, XmlParser};

/// Escape byte introducing a style token.
pub const ESC: u8 = 0x1B;

pub const CMD_ALIGN_LEFT: u8 = b'L';
pub const CMD_ALIGN_RIGHT: u8 = b'R';
pub const CMD_ALIGN_CENTER: u8 = b'C';
pub const CMD_ALIGN_JUSTIFY: u8 = b'J';
pub const CMD_BOLD: u8 = b'B';
pub const CMD_ITALIC: u8 = b'I';
pub const CMD_BOLD_ITALIC: u8 = b'X';
pub const CMD_INDENT_OPEN: u8 = b'H';
pub const CMD_INDENT_CLOSE: u8 = b'h';

const NBSP: [u8; 2] = [0xC2, 0xA0];
const FLUSH_THRESHOLD: usize = 2048;
const INDENT_MAX_SPACES: i32 = 12;

/// Close command for an open command letter.
#[inline]
pub fn close_cmd(open: u8) -> u8
{
	open.to_ascii_lowercase()
}

#[inline]
pub fn align_open_cmd(align: TextAlign) -> u8
{
	match align {
		TextAlign::Left => CMD_ALIGN_LEFT,
		TextAlign::Right => CMD_ALIGN_RIGHT,
		TextAlign::Center => CMD_ALIGN_CENTER,
		TextAlign::Justify => CMD_ALIGN_JUSTIFY,
	}
}

/// Alignment for an open command letter, if it is one.
#[inline]
pub fn align_for_cmd(cmd: u8) -> Option<TextAlign>
{
	match cmd {
		CMD_ALIGN_LEFT => Some(TextAlign::Left),
		CMD_ALIGN_RIGHT => Some(TextAlign::Right),
		CMD_ALIGN_CENTER => Some(TextAlign::Center),
		CMD_ALIGN_JUSTIFY => Some(TextAlign::Justify),
		_ => None,
	}
}

/// Rendered character count of a token-bearing byte run: style tokens are
/// zero width, indent-run `-` bytes count like the spaces they become,
/// multi-byte sequences count once.
pub fn visible_len(bytes: &[u8]) -> usize
{
	let mut n = 0;
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == ESC {
			i += 2;
			continue;
		}
		if bytes[i] & 0xC0 != 0x80 {
			n += 1;
		}
		i += 1;
	}
	n
}

fn is_block_element(name: &str) -> bool
{
	matches!(
		name,
		"p" | "div"
			| "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
			| "blockquote"
			| "li" | "section"
			| "article"
			| "header"
			| "footer"
			| "nav"
	)
}

fn is_header_element(name: &str) -> bool
{
	matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn is_skipped_element(name: &str) -> bool
{
	matches!(name, "head" | "title" | "style" | "script")
}

fn is_inline_style_element(name: &str) -> bool
{
	matches!(name, "b" | "strong" | "i" | "em" | "span")
}

/// Per-element inline style declaration. `has_*` marks properties the
/// element states explicitly; stated properties override the paragraph
/// base and any ancestor element.
#[derive(Clone, Copy, Default)]
struct InlineState {
	bold: bool,
	italic: bool,
	has_bold: bool,
	has_italic: bool,
}

pub struct Converter<'a> {
	css: Option<&'a CssRules>,
	buffer: Vec<u8>,
	element_stack: Vec<String>,
	/// Open paragraph commands (uppercase letters), plus `\n` sentinels
	/// for margin-bottom; unwound LIFO at block close.
	paragraph_close_stack: Vec<u8>,
	pending_tag: String,
	pending_classes: String,
	pending_inline_style: String,
	paragraph_style_written: bool,
	line_has_content: bool,
	line_has_nbsp: bool,
	inline_stack: Vec<InlineState>,
	base_inline: InlineState,
	/// Combined style that should be in effect for the next text byte.
	effective_inline: u8,
	/// Combined style the output actually has open right now.
	written_inline: u8,
	bytes_written: u64,
}

impl<'a> Converter<'a> {
	pub fn new(css: Option<&'a CssRules>) -> Self
	{
		Converter {
			css,
			buffer: Vec::new(),
			element_stack: Vec::new(),
			paragraph_close_stack: Vec::new(),
			pending_tag: String::new(),
			pending_classes: String::new(),
			pending_inline_style: String::new(),
			paragraph_style_written: false,
			line_has_content: false,
			line_has_nbsp: false,
			inline_stack: Vec::new(),
			base_inline: InlineState::default(),
			effective_inline: 0,
			written_inline: 0,
			bytes_written: 0,
		}
	}

	/// Convert one chapter; returns the number of bytes written.
	pub fn run<W: Write>(mut self, parser: &mut XmlParser, out: &mut W) -> Result<u64>
	{
		while parser.read() {
			match parser.node_type() {
				NodeType::Element => self.on_element(parser),
				NodeType::EndElement => self.on_end_element(parser),
				NodeType::Text => self.on_text(parser),
				_ => {}
			}
			if self.buffer.len() > FLUSH_THRESHOLD {
				self.flush(out)?;
			}
		}

		// end of chapter: everything still open gets closed
		self.close_paragraph_tokens();
		self.flush(out)?;
		debug!("convert: {} bytes", self.bytes_written);
		Ok(self.bytes_written)
	}

	fn on_element(&mut self, parser: &mut XmlParser)
	{
		let name = parser.name().to_ascii_lowercase();
		let empty = parser.is_empty_element();

		if !empty {
			self.element_stack.push(name.clone());
		}

		if is_block_element(&name) {
			if self.line_has_content {
				self.buffer.push(b'\n');
				self.line_has_content = false;
				self.line_has_nbsp = false;
			}
			self.pending_classes = parser.attribute("class").unwrap_or("").to_string();
			self.pending_inline_style = parser.attribute("style").unwrap_or("").to_string();
			self.pending_tag = name.clone();
			self.paragraph_style_written = false;
		}

		if is_inline_style_element(&name) && !empty {
			let class_attr = parser.attribute("class").unwrap_or("").to_string();
			let style_attr = parser.attribute("style").unwrap_or("").to_string();
			self.push_inline_element(&name, &class_attr, &style_attr);
		}

		if empty && (name == "br" || name == "hr") && self.line_has_content {
			self.close_paragraph_tokens();
			self.buffer.push(b'\n');
			self.line_has_content = false;
			self.line_has_nbsp = false;
			// style reopens in front of the next visible text
			self.paragraph_style_written = false;
		}
	}

	fn on_end_element(&mut self, parser: &mut XmlParser)
	{
		let name = parser.name().to_ascii_lowercase();

		if is_inline_style_element(&name) && !self.inline_stack.is_empty() {
			self.inline_stack.pop();
			self.update_effective_inline();
		}

		if is_block_element(&name) {
			if self.line_has_content || self.line_has_nbsp {
				self.close_paragraph_tokens();
				self.buffer.push(b'\n');
			} else {
				self.close_written_inline();
			}
			self.line_has_content = false;
			self.line_has_nbsp = false;
			self.pending_tag.clear();
			self.pending_classes.clear();
			self.pending_inline_style.clear();
			self.paragraph_style_written = false;
			self.paragraph_close_stack.clear();
			self.inline_stack.clear();
			self.base_inline = InlineState::default();
			self.update_effective_inline();
		}

		self.element_stack.pop();
	}

	fn on_text(&mut self, parser: &mut XmlParser)
	{
		if self.inside_skipped_element() {
			return;
		}
		let raw = read_and_decode_text(parser);
		if raw.is_empty() {
			return;
		}
		if contains_nbsp(&raw) {
			self.line_has_nbsp = true;
		}
		let mut text = normalize_whitespace(&raw);
		if !self.line_has_content {
			text = trim_leading_spaces(text);
		}
		if text.is_empty() {
			return;
		}

		self.write_paragraph_style();
		self.ensure_inline_style_written();
		self.buffer.extend_from_slice(&text);
		self.line_has_content = true;
	}

	fn inside_skipped_element(&self) -> bool
	{
		self.element_stack.iter().any(|e| is_skipped_element(e))
	}

	/// First visible text of a block: emit margins, alignment, implicit
	/// header bold and the indent run, and record the paragraph-level
	/// base inline style.
	fn write_paragraph_style(&mut self)
	{
		if self.paragraph_style_written {
			return;
		}
		let mut combined = CssStyle::default();
		if let Some(css) = self.css {
			combined.merge(&css.tag_style(&self.pending_tag));
			if !self.pending_classes.is_empty() {
				combined.merge(&css.combined_style(&self.pending_classes));
			}
		}
		if !self.pending_inline_style.is_empty() {
			combined.merge(&parse_inline_style(&self.pending_inline_style));
		}

		if combined.has(StyleFlags::MARGIN_TOP) {
			for _ in 0..combined.margin_top {
				self.buffer.push(b'\n');
			}
		}
		if combined.has(StyleFlags::MARGIN_BOTTOM) {
			for _ in 0..combined.margin_bottom {
				self.paragraph_close_stack.push(b'\n');
			}
		}
		if combined.has(StyleFlags::TEXT_ALIGN) {
			let cmd = align_open_cmd(combined.text_align);
			self.buffer.push(ESC);
			self.buffer.push(cmd);
			self.paragraph_close_stack.push(cmd);
		}
		if is_header_element(&self.pending_tag) {
			self.buffer.push(ESC);
			self.buffer.push(CMD_BOLD);
			self.paragraph_close_stack.push(CMD_BOLD);
		}
		if combined.has(StyleFlags::TEXT_INDENT) && combined.text_indent > 0.0 {
			let spaces = ((combined.text_indent / 4.0).round() as i32).clamp(0, INDENT_MAX_SPACES);
			self.buffer.push(ESC);
			self.buffer.push(CMD_INDENT_OPEN);
			for _ in 0..spaces {
				self.buffer.push(b'-');
			}
			self.buffer.push(ESC);
			self.buffer.push(CMD_INDENT_CLOSE);
		}

		self.base_inline.has_bold = combined.has(StyleFlags::FONT_WEIGHT);
		self.base_inline.bold = combined.is_bold();
		self.base_inline.has_italic = combined.has(StyleFlags::FONT_STYLE);
		self.base_inline.italic = combined.is_italic();
		self.update_effective_inline();

		self.paragraph_style_written = true;
	}

	fn push_inline_element(&mut self, name: &str, class_attr: &str, style_attr: &str)
	{
		let mut state = InlineState::default();
		match name {
			"b" | "strong" => {
				state.bold = true;
				state.has_bold = true;
			}
			"i" | "em" => {
				state.italic = true;
				state.has_italic = true;
			}
			_ => {}
		}
		let mut combined = CssStyle::default();
		if let Some(css) = self.css {
			if !class_attr.is_empty() {
				combined.merge(&css.combined_style(class_attr));
			}
		}
		if !style_attr.is_empty() {
			combined.merge(&parse_inline_style(style_attr));
		}
		if combined.has(StyleFlags::FONT_WEIGHT) {
			state.has_bold = true;
			state.bold = combined.is_bold();
		}
		if combined.has(StyleFlags::FONT_STYLE) {
			state.has_italic = true;
			state.italic = combined.is_italic();
		}
		self.inline_stack.push(state);
		self.update_effective_inline();
	}

	fn update_effective_inline(&mut self)
	{
		let mut bold = self.base_inline.has_bold && self.base_inline.bold;
		let mut italic = self.base_inline.has_italic && self.base_inline.italic;
		for state in &self.inline_stack {
			if state.has_bold {
				bold = state.bold;
			}
			if state.has_italic {
				italic = state.italic;
			}
		}
		self.effective_inline = match (bold, italic) {
			(true, true) => CMD_BOLD_ITALIC,
			(true, false) => CMD_BOLD,
			(false, true) => CMD_ITALIC,
			(false, false) => 0,
		};
	}

	/// Reconcile the written inline state with the effective one; called
	/// immediately before any visible text byte.
	fn ensure_inline_style_written(&mut self)
	{
		if self.written_inline == self.effective_inline {
			return;
		}
		if self.written_inline != 0 {
			self.buffer.push(ESC);
			self.buffer.push(close_cmd(self.written_inline));
		}
		if self.effective_inline != 0 {
			self.buffer.push(ESC);
			self.buffer.push(self.effective_inline);
		}
		self.written_inline = self.effective_inline;
	}

	fn close_written_inline(&mut self)
	{
		if self.written_inline != 0 {
			self.buffer.push(ESC);
			self.buffer.push(close_cmd(self.written_inline));
			self.written_inline = 0;
		}
	}

	/// Close everything the paragraph left open, innermost first: the
	/// pending inline style (opened just before text, so it nests inside
	/// the paragraph commands), then the close-stack in LIFO order.
	/// Uppercase entries close as `ESC <lowercase>`; `\n` sentinels
	/// (margin-bottom) emit bare newlines after all closes are out.
	fn close_paragraph_tokens(&mut self)
	{
		self.close_written_inline();
		while let Some(cmd) = self.paragraph_close_stack.pop() {
			if cmd.is_ascii_uppercase() {
				self.buffer.push(ESC);
				self.buffer.push(close_cmd(cmd));
			} else {
				self.buffer.push(cmd);
			}
		}
	}

	fn flush<W: Write>(&mut self, out: &mut W) -> Result<()>
	{
		if !self.buffer.is_empty() {
			out.write_all(&self.buffer)?;
			self.bytes_written += self.buffer.len() as u64;
			self.buffer.clear();
		}
		Ok(())
	}
}

/// Convert a whole chapter from `parser` to `out`.
pub fn convert_chapter<W: Write>(parser: &mut XmlParser, css: Option<&CssRules>, out: &mut W) -> Result<u64>
{
	Converter::new(css).run(parser, out)
}

fn contains_nbsp(bytes: &[u8]) -> bool
{
	bytes.windows(2).any(|w| w == NBSP)
}

/// Pull the current text node through entity decoding: `\r` dropped,
/// tabs to spaces, the six named entities decoded, unknown entities kept
/// verbatim.
fn read_and_decode_text(parser: &mut XmlParser) -> Vec<u8>
{
	let mut result = Vec::new();
	while parser.has_more_text_chars() {
		let c = parser.read_text_char_forward();
		match c {
			b'\r' => {}
			b'\t' => result.push(b' '),
			b'&' => {
				let mut entity = vec![b'&'];
				while parser.has_more_text_chars() {
					let next = parser.read_text_char_forward();
					entity.push(next);
					if next == b';' || entity.len() > 10 {
						break;
					}
				}
				decode_entity(&entity, &mut result);
			}
			_ => result.push(c),
		}
	}
	result
}

fn decode_entity(entity: &[u8], out: &mut Vec<u8>)
{
	match entity {
		b"&nbsp;" => out.extend_from_slice(&NBSP),
		b"&amp;" => out.push(b'&'),
		b"&lt;" => out.push(b'<'),
		b"&gt;" => out.push(b'>'),
		b"&quot;" => out.push(b'"'),
		b"&apos;" => out.push(b'\''),
		// unknown entities pass through untouched
		_ => out.extend_from_slice(entity),
	}
}

/// NBSP becomes a plain space; runs of space and newline collapse to a
/// single space.
fn normalize_whitespace(text: &[u8]) -> Vec<u8>
{
	let mut result = Vec::with_capacity(text.len());
	let mut last_was_space = false;
	let mut i = 0;
	while i < text.len() {
		let mut c = text[i];
		if c == NBSP[0] && i + 1 < text.len() && text[i + 1] == NBSP[1] {
			c = b' ';
			i += 1;
		}
		i += 1;
		if c == b' ' || c == b'\n' {
			if !last_was_space {
				result.push(b' ');
				last_was_space = true;
			}
		} else {
			result.push(c);
			last_was_space = false;
		}
	}
	result
}

fn trim_leading_spaces(text: Vec<u8>) -> Vec<u8>
{
	let start = text
		.iter()
		.position(|&c| c != b' ' && c != b'\n')
		.unwrap_or(text.len());
	if start == 0 {
		text
	} else {
		text[start..].to_vec()
	}
}

/// Check the §3 stream invariants; used by the renderer-facing tests and
/// handy when diagnosing a bad chapter in the field.
pub fn check_stream_well_formed(bytes: &[u8]) -> std::result::Result<(), String>
{
	let mut open: Vec<u8> = Vec::new();
	let mut i = 0;
	while i < bytes.len() {
		let b = bytes[i];
		if b == ESC {
			let Some(&cmd) = bytes.get(i + 1) else {
				return Err("dangling escape at end of stream".to_string());
			};
			i += 2;
			if cmd == CMD_INDENT_OPEN {
				// literal indent run: only '-' until ESC h
				loop {
					match bytes.get(i) {
						Some(&ESC) if bytes.get(i + 1) == Some(&CMD_INDENT_CLOSE) => {
							i += 2;
							break;
						}
						Some(b'-') => i += 1,
						Some(other) => {
							return Err(format!("byte 0x{:02x} inside indent run", other));
						}
						None => return Err("unterminated indent run".to_string()),
					}
				}
			} else if cmd.is_ascii_uppercase() {
				open.push(cmd);
			} else if cmd.is_ascii_lowercase() {
				match open.pop() {
					Some(o) if close_cmd(o) == cmd => {}
					Some(o) => {
						return Err(format!("close '{}' does not match open '{}'", cmd as char, o as char));
					}
					None => return Err(format!("close '{}' without open", cmd as char)),
				}
			} else {
				return Err(format!("unknown command byte 0x{:02x}", cmd));
			}
			continue;
		}
		if b == b'\n' && !open.is_empty() {
			return Err(format!("newline with '{}' still open", *open.last().unwrap() as char));
		}
		if b < 0x20 && b != b'\n' && b != b'\t' {
			warn!("control byte 0x{:02x} in converted stream", b);
			return Err(format!("control byte 0x{:02x}", b));
		}
		i += 1;
	}
	if open.is_empty() {
		Ok(())
	} else {
		Err("stream ends with open tokens".to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::xml::XmlParser;

	fn convert(xhtml: &str, css_text: Option<&str>) -> Vec<u8>
	{
		let mut rules = CssRules::new();
		if let Some(text) = css_text {
			rules.parse(text);
		}
		let css = css_text.map(|_| &rules);
		let mut parser = XmlParser::open_bytes(xhtml.as_bytes().to_vec());
		let mut out = Vec::new();
		convert_chapter(&mut parser, css, &mut out).unwrap();
		out
	}

	#[test]
	fn test_centered_paragraph_with_bold_span()
	{
		let out = convert(
			r#"<p class="c">Hello <b>bold</b> world</p>"#,
			Some(".c{text-align:center;}"),
		);
		let expected = b"\x1bCHello \x1bBbold\x1bb world\x1bc\n";
		assert_eq!(out, expected);
	}

	#[test]
	fn test_header_implicit_bold()
	{
		let out = convert("<h2>Title</h2>", None);
		assert_eq!(out, b"\x1bBTitle\x1bb\n");
	}

	#[test]
	fn test_text_indent_run()
	{
		let out = convert(
			r#"<p class="i">Indented</p>"#,
			Some(".i{text-indent:20px;}"),
		);
		assert_eq!(out, b"\x1bH-----\x1bhIndented\n");
	}

	#[test]
	fn test_margins_emit_blank_lines()
	{
		let out = convert(
			r#"<p class="m">body</p>"#,
			Some(".m{margin-top:1em;margin-bottom:2em;}"),
		);
		assert_eq!(out, b"\nbody\n\n\n");
	}

	#[test]
	fn test_nested_bold_italic_combines()
	{
		let out = convert("<p>a<b>b<i>bi</i></b>c</p>", None);
		assert_eq!(out, b"a\x1bBb\x1bb\x1bXbi\x1bxc\n");
	}

	#[test]
	fn test_span_styled_by_class()
	{
		let out = convert(
			r#"<p>a <span class="em">styled</span> z</p>"#,
			Some(".em{font-style:italic}"),
		);
		assert_eq!(out, b"a \x1bIstyled\x1bi z\n");
	}

	#[test]
	fn test_br_closes_and_reopens_alignment()
	{
		let out = convert(
			r#"<p class="c">one<br/>two</p>"#,
			Some(".c{text-align:center}"),
		);
		assert_eq!(out, b"\x1bCone\x1bc\n\x1bCtwo\x1bc\n");
	}

	#[test]
	fn test_skipped_elements_drop_text()
	{
		let out = convert(
			"<html><head><title>Nope</title><style>p{}</style></head><body><p>Yes</p></body></html>",
			None,
		);
		assert_eq!(out, b"Yes\n");
	}

	#[test]
	fn test_entities_and_whitespace()
	{
		let out = convert("<p>a &amp;  b\t&lt;c&gt; &unknown; d</p>", None);
		assert_eq!(out, b"a & b <c> &unknown; d\n");
	}

	#[test]
	fn test_nbsp_only_line_still_breaks_paragraph()
	{
		let out = convert("<p>&nbsp;</p><p>next</p>", None);
		assert_eq!(out, b"\nnext\n");
	}

	#[test]
	fn test_block_inside_block_newline()
	{
		let out = convert("<div>outer<p>inner</p></div>", None);
		assert_eq!(out, b"outer\ninner\n");
	}

	#[test]
	fn test_unclosed_inline_closed_at_paragraph_end()
	{
		let out = convert("<p><b>dangling</p>", None);
		assert_eq!(out, b"\x1bBdangling\x1bb\n");
		check_stream_well_formed(&out).unwrap();
	}

	#[test]
	fn test_margin_bottom_with_open_inline_style()
	{
		// the inline close must come out before the margin newlines
		let out = convert(
			r#"<p class="m"><b>x</b> tail <i>y</p>"#,
			Some(".m{margin-bottom:1em;text-align:center}"),
		);
		check_stream_well_formed(&out).unwrap();
		assert_eq!(out, b"\x1bC\x1bBx\x1bb tail \x1bIy\x1bi\x1bc\n\n");
	}

	#[test]
	fn test_well_formedness_on_varied_documents()
	{
		let docs = [
			r#"<p class="c">Hello <b>bold</b> world</p>"#,
			"<h1>A</h1><p>b<br/>c</p><blockquote><p><i>q</i></p></blockquote>",
			r#"<div style="text-align: justify"><p>j1 j2 j3</p></div>"#,
			"<p><span style=\"font-weight:bold\">s</span> <em>e</em></p>",
			"<p>&nbsp;</p><li>item</li>",
		];
		let css = ".c{text-align:center;margin-top:1em;margin-bottom:1em;text-indent:2em}";
		for doc in docs {
			let out = convert(doc, Some(css));
			check_stream_well_formed(&out).unwrap_or_else(|e| panic!("{}: {}", doc, e));
		}
	}

	#[test]
	fn test_proptest_stream_well_formed()
	{
		use proptest::prelude::*;

		proptest!(|(words in proptest::collection::vec("[a-zäöü]{1,8}", 1..20),
			bold_at in 0usize..20, center in proptest::bool::ANY)| {
			let mut doc = String::new();
			let class = if center { " class=\"c\"" } else { "" };
			doc.push_str(&format!("<p{}>", class));
			for (i, w) in words.iter().enumerate() {
				if i == bold_at % words.len() {
					doc.push_str(&format!("<b>{}</b> ", w));
				} else {
					doc.push_str(w);
					doc.push(' ');
				}
			}
			doc.push_str("</p>");
			let out = convert(&doc, Some(".c{text-align:center}"));
			prop_assert!(check_stream_well_formed(&out).is_ok());
		});
	}
}
