//! Optimal line breaking: a per-starting-position dynamic program over
//! measured word widths, scoring lines by cubic badness and squared
//! demerits. The last line of a paragraph is free.

pub(crate) const INFINITY_PENALTY: f32 = 10_000.0;

// Reserved cost-function constants. The base algorithm does not consult
// them; extensions may.
pub const HYPHEN_PENALTY: f32 = 50.0;
pub const FITNESS_DEMERITS: f32 = 100.0;

/// Break indices into `widths`, ascending, excluding the final break at
/// `widths.len()`. A break at `k` ends a line just before word `k`.
pub(crate) fn calculate_breaks(widths: &[i32], max_width: i32, space_width: i32) -> Vec<usize>
{
	let n = widths.len();
	if n == 0 {
		return Vec::new();
	}

	let mut min_demerits = vec![INFINITY_PENALTY; n + 1];
	let mut prev_break = vec![-1i32; n + 1];
	min_demerits[0] = 0.0;

	for i in 0..n {
		if min_demerits[i] >= INFINITY_PENALTY {
			// unreachable start
			continue;
		}
		let mut line_width = 0i32;
		for j in i..n {
			if j > i {
				line_width += space_width;
			}
			line_width += widths[j];
			if line_width > max_width {
				break;
			}
			let is_last_line = j == n - 1;
			let badness = badness(line_width, max_width);
			let demerits = demerits(badness, is_last_line);
			let total = min_demerits[i] + demerits;
			if total < min_demerits[j + 1] {
				min_demerits[j + 1] = total;
				prev_break[j + 1] = i as i32;
			}
		}
	}

	let mut breaks = Vec::new();
	let mut pos = n as i32;
	while pos > 0 && prev_break[pos as usize] >= 0 {
		breaks.push(pos as usize);
		pos = prev_break[pos as usize];
	}
	breaks.reverse();
	if breaks.last() == Some(&n) {
		breaks.pop();
	}
	breaks
}

/// Cubic in the stretch ratio; perfect fit is free, over-full is
/// unreachable by construction.
pub(crate) fn badness(actual_width: i32, target_width: i32) -> f32
{
	if actual_width > target_width {
		return INFINITY_PENALTY;
	}
	if actual_width == target_width {
		return 0.0;
	}
	let ratio = (target_width - actual_width) as f32 / target_width as f32;
	ratio * ratio * ratio * 100.0
}

pub(crate) fn demerits(badness: f32, is_last_line: bool) -> f32
{
	if badness >= INFINITY_PENALTY {
		return INFINITY_PENALTY;
	}
	if is_last_line {
		// a loose last line costs nothing
		return 0.0;
	}
	(1.0 + badness) * (1.0 + badness)
}
