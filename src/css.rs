//! CSS subset for the converter: a single-pass scanner that collects the
//! closed property set for class and tag selectors, plus inline
//! `style="…"` parsing. Everything else in a stylesheet is skipped:
//! at-rules and `@media` blocks by brace counting, comments, unknown
//! properties, and selectors the reader cannot use.

use std::collections::HashMap;

use bitflags::bitflags;
use log::debug;

bitflags! {
	/// Which fields of a [`CssStyle`] were explicitly set.
	#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
	pub struct StyleFlags: u8 {
		const TEXT_ALIGN = 1 << 0;
		const FONT_STYLE = 1 << 1;
		const FONT_WEIGHT = 1 << 2;
		const TEXT_INDENT = 1 << 3;
		const MARGIN_TOP = 1 << 4;
		const MARGIN_BOTTOM = 1 << 5;
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum TextAlign {
	#[default]
	Left,
	Right,
	Center,
	Justify,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum FontStyle {
	#[default]
	Normal,
	Italic,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum FontWeight {
	#[default]
	Normal,
	Bold,
}

/// The supported style properties with presence tracking. Merge semantics:
/// the overriding style wins only for fields it explicitly sets.
#[derive(Clone, Copy, Debug, Default)]
pub struct CssStyle {
	pub flags: StyleFlags,
	pub text_align: TextAlign,
	pub font_style: FontStyle,
	pub font_weight: FontWeight,
	/// Pixels; `em` values are converted at 16 px/em.
	pub text_indent: f32,
	/// Blank lines before the paragraph.
	pub margin_top: u8,
	/// Blank lines after the paragraph.
	pub margin_bottom: u8,
}

impl CssStyle {
	pub fn merge(&mut self, other: &CssStyle)
	{
		if other.flags.contains(StyleFlags::TEXT_ALIGN) {
			self.text_align = other.text_align;
		}
		if other.flags.contains(StyleFlags::FONT_STYLE) {
			self.font_style = other.font_style;
		}
		if other.flags.contains(StyleFlags::FONT_WEIGHT) {
			self.font_weight = other.font_weight;
		}
		if other.flags.contains(StyleFlags::TEXT_INDENT) {
			self.text_indent = other.text_indent;
		}
		if other.flags.contains(StyleFlags::MARGIN_TOP) {
			self.margin_top = other.margin_top;
		}
		if other.flags.contains(StyleFlags::MARGIN_BOTTOM) {
			self.margin_bottom = other.margin_bottom;
		}
		self.flags |= other.flags;
	}

	#[inline]
	pub fn has(&self, flag: StyleFlags) -> bool
	{
		self.flags.contains(flag)
	}

	#[inline]
	pub fn is_bold(&self) -> bool
	{
		self.has(StyleFlags::FONT_WEIGHT) && self.font_weight == FontWeight::Bold
	}

	#[inline]
	pub fn is_italic(&self) -> bool
	{
		self.has(StyleFlags::FONT_STYLE) && self.font_style == FontStyle::Italic
	}
}

/// Parsed rule tables for one book: class selectors (`.name`, `tag.name`)
/// keyed by class name, and bare tag selectors keyed by tag name.
#[derive(Default)]
pub struct CssRules {
	class_rules: HashMap<String, CssStyle>,
	tag_rules: HashMap<String, CssStyle>,
}

impl CssRules {
	pub fn new() -> Self
	{
		Default::default()
	}

	#[inline]
	pub fn is_empty(&self) -> bool
	{
		self.class_rules.is_empty() && self.tag_rules.is_empty()
	}

	#[inline]
	pub fn rule_count(&self) -> usize
	{
		self.class_rules.len() + self.tag_rules.len()
	}

	/// Scan a stylesheet, accumulating rules. May be called once per CSS
	/// file of a book.
	pub fn parse(&mut self, css: &str)
	{
		let mut selector = String::new();
		let mut properties = String::new();
		let mut in_rule = false;
		let mut in_at_rule = false;
		let mut in_string = false;
		let mut string_quote = '\0';
		let mut brace_count = 0i32;

		let mut chars = css.chars().peekable();
		while let Some(c) = chars.next() {
			// comments can appear anywhere outside strings
			if !in_string && c == '/' && chars.peek() == Some(&'*') {
				chars.next();
				let mut prev = '\0';
				for cc in chars.by_ref() {
					if prev == '*' && cc == '/' {
						break;
					}
					prev = cc;
				}
				continue;
			}
			if c == '\r' {
				continue;
			}

			if !in_rule {
				if in_at_rule {
					match c {
						'{' => brace_count += 1,
						'}' => {
							if brace_count > 0 {
								brace_count -= 1;
								if brace_count == 0 {
									in_at_rule = false;
								}
							}
						}
						';' if brace_count == 0 => in_at_rule = false,
						_ => {}
					}
					continue;
				}
				if c == '@' {
					in_at_rule = true;
					brace_count = 0;
					continue;
				}
				if c == '{' {
					in_rule = true;
					brace_count = 1;
					properties.clear();
					continue;
				}
				selector.push(c);
			} else {
				// quoted strings must not terminate the block
				if !in_string && (c == '"' || c == '\'') {
					in_string = true;
					string_quote = c;
					properties.push(c);
					continue;
				}
				if in_string {
					if c == string_quote {
						in_string = false;
					}
					properties.push(c);
					continue;
				}
				match c {
					'{' => {
						brace_count += 1;
						properties.push(c);
					}
					'}' => {
						brace_count -= 1;
						if brace_count == 0 {
							self.add_rule(selector.trim(), properties.trim());
							selector.clear();
							properties.clear();
							in_rule = false;
						} else {
							properties.push(c);
						}
					}
					_ => properties.push(c),
				}
			}
		}
		if in_rule {
			self.add_rule(selector.trim(), properties.trim());
		}
		debug!("css: {} rules loaded", self.rule_count());
	}

	/// Style for a bare tag selector; empty style when none matched.
	pub fn tag_style(&self, tag: &str) -> CssStyle
	{
		self.tag_rules
			.get(&tag.to_ascii_lowercase())
			.copied()
			.unwrap_or_default()
	}

	/// Merged style for a whitespace-separated class list, later classes
	/// overriding earlier ones.
	pub fn combined_style(&self, class_list: &str) -> CssStyle
	{
		let mut combined = CssStyle::default();
		for class_name in class_list.split_ascii_whitespace() {
			if let Some(style) = self.class_rules.get(class_name) {
				combined.merge(style);
			}
		}
		combined
	}

	fn add_rule(&mut self, selector: &str, properties: &str)
	{
		if selector.is_empty() || properties.is_empty() {
			return;
		}
		let style = parse_declarations(properties);
		if style.flags.is_empty() {
			return;
		}
		for single in selector.split(',') {
			let single = single.trim();
			if single.is_empty() {
				continue;
			}
			if let Some(class_name) = extract_class_name(single) {
				self.class_rules
					.entry(class_name)
					.and_modify(|existing| existing.merge(&style))
					.or_insert(style);
			} else if let Some(tag) = plain_tag(single) {
				self.tag_rules
					.entry(tag)
					.and_modify(|existing| existing.merge(&style))
					.or_insert(style);
			}
		}
	}
}

/// Parse a single inline `style="…"` attribute value.
pub fn parse_inline_style(style_attr: &str) -> CssStyle
{
	parse_declarations(style_attr)
}

fn parse_declarations(block: &str) -> CssStyle
{
	let mut style = CssStyle::default();
	for declaration in block.split(';') {
		let declaration = declaration.trim();
		if declaration.is_empty() {
			continue;
		}
		let Some(colon) = declaration.find(':') else { continue };
		let name = declaration[..colon].trim().to_ascii_lowercase();
		let value = declaration[colon + 1..].trim().to_ascii_lowercase();
		if name.is_empty() || value.is_empty() {
			continue;
		}
		parse_property(&name, &value, &mut style);
	}
	style
}

fn parse_property(name: &str, value: &str, style: &mut CssStyle)
{
	match name {
		"text-align" => {
			style.text_align = match value {
				"left" | "start" => TextAlign::Left,
				"right" | "end" => TextAlign::Right,
				"center" => TextAlign::Center,
				"justify" => TextAlign::Justify,
				_ => TextAlign::Left,
			};
			style.flags |= StyleFlags::TEXT_ALIGN;
		}
		"font-style" => {
			style.font_style = if value == "italic" || value == "oblique" {
				FontStyle::Italic
			} else {
				FontStyle::Normal
			};
			style.flags |= StyleFlags::FONT_STYLE;
		}
		"font-weight" => {
			style.font_weight = match value {
				"bold" | "bolder" | "700" | "800" | "900" => FontWeight::Bold,
				_ => FontWeight::Normal,
			};
			style.flags |= StyleFlags::FONT_WEIGHT;
		}
		"text-indent" => {
			let px = parse_length_px(value);
			if px > 0.0 {
				style.text_indent = px;
				style.flags |= StyleFlags::TEXT_INDENT;
			}
		}
		"margin-top" => {
			if let Some(lines) = parse_margin_lines(value) {
				style.margin_top = lines;
				style.flags |= StyleFlags::MARGIN_TOP;
			}
		}
		"margin-bottom" => {
			if let Some(lines) = parse_margin_lines(value) {
				style.margin_bottom = lines;
				style.flags |= StyleFlags::MARGIN_BOTTOM;
			}
		}
		// unknown properties are silently ignored
		_ => {}
	}
}

/// `<num>`, `<num>px` or `<num>em` (16 px per em) to pixels; 0 on parse
/// failure.
fn parse_length_px(value: &str) -> f32
{
	let value = value.trim();
	let (number, factor) = if let Some(stripped) = value.strip_suffix("em") {
		(stripped.trim(), 16.0)
	} else if let Some(stripped) = value.strip_suffix("px") {
		(stripped.trim(), 1.0)
	} else {
		(value, 1.0)
	};
	parse_simple_float(number).map_or(0.0, |v| v * factor)
}

/// Margins are blank-line counts: `em` counts as lines, `px` divides by
/// the nominal 16 px line, bare numbers are lines. Clamped to 0..=10.
fn parse_margin_lines(value: &str) -> Option<u8>
{
	let value = value.trim();
	let (number, per_line) = if let Some(stripped) = value.strip_suffix("em") {
		(stripped.trim(), 1.0)
	} else if let Some(stripped) = value.strip_suffix("px") {
		(stripped.trim(), 16.0)
	} else {
		(value, 1.0)
	};
	let v = parse_simple_float(number)?;
	if v <= 0.0 {
		return None;
	}
	Some(((v / per_line).round() as i64).clamp(0, 10) as u8)
}

fn parse_simple_float(s: &str) -> Option<f32>
{
	let s = s.trim();
	if s.is_empty() {
		return None;
	}
	let (neg, rest) = match s.as_bytes()[0] {
		b'-' => (true, &s[1..]),
		b'+' => (false, &s[1..]),
		_ => (false, s),
	};
	let mut int_part = 0.0f32;
	let mut frac_part = 0.0f32;
	let mut scale = 1.0f32;
	let mut any = false;
	let mut seen_dot = false;
	for c in rest.chars() {
		match c {
			'0'..='9' => {
				any = true;
				let d = (c as u8 - b'0') as f32;
				if seen_dot {
					frac_part = frac_part * 10.0 + d;
					scale *= 10.0;
				} else {
					int_part = int_part * 10.0 + d;
				}
			}
			'.' if !seen_dot => seen_dot = true,
			_ => break,
		}
	}
	if !any {
		return None;
	}
	let v = int_part + frac_part / scale;
	Some(if neg { -v } else { v })
}

/// `.name` or `tag.name` → `name`; class names are letters, digits,
/// hyphens and underscores.
fn extract_class_name(selector: &str) -> Option<String>
{
	let dot = selector.find('.')?;
	let rest = &selector[dot + 1..];
	let end = rest
		.find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
		.unwrap_or(rest.len());
	if end == 0 {
		None
	} else {
		Some(rest[..end].to_string())
	}
}

/// A bare element-name selector (`p`, `h1`); anything with combinators,
/// pseudo-classes or ids is ignored.
fn plain_tag(selector: &str) -> Option<String>
{
	if !selector.is_empty() && selector.chars().all(|c| c.is_ascii_alphanumeric()) {
		Some(selector.to_ascii_lowercase())
	} else {
		None
	}
}
