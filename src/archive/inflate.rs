use std::sync::atomic::{AtomicBool, Ordering};

use miniz_oxide::inflate::core::{decompress, inflate_flags, DecompressorOxide};
use miniz_oxide::inflate::TINFLStatus;

use crate::error::{Error, Result};

/// Raw-DEFLATE history window. The output buffer doubles as the
/// decompressor dictionary, so it must stay a power of two.
pub(crate) const DICT_SIZE: usize = 32 * 1024;
/// Compressed-input chunk cap; keeps the whole decoder state around 40 KiB.
pub(crate) const INPUT_CHUNK: usize = 2048;

// One decoder in flight per process. On the reader hardware the state below
// lives in a single static allocation; the host build allocates per context
// but keeps the same at-most-one discipline.
static DECODER_IN_USE: AtomicBool = AtomicBool::new(false);

pub(crate) struct DecoderContext {
	decomp: Box<DecompressorOxide>,
	dict: Box<[u8; DICT_SIZE]>,
	in_buf: Box<[u8; INPUT_CHUNK]>,
}

impl DecoderContext {
	pub(crate) fn acquire() -> Result<Self>
	{
		if DECODER_IN_USE
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return Err(Error::DecoderBusy);
		}
		Ok(DecoderContext {
			decomp: Box::default(),
			dict: Box::new([0u8; DICT_SIZE]),
			in_buf: Box::new([0u8; INPUT_CHUNK]),
		})
	}
}

impl Drop for DecoderContext {
	fn drop(&mut self)
	{
		DECODER_IN_USE.store(false, Ordering::Release);
	}
}

/// Streaming raw-DEFLATE decoder over a caller-supplied compressed source.
///
/// `read` fills the destination from the circular dictionary; the source
/// closure is asked for at most [`INPUT_CHUNK`] compressed bytes at a time.
pub(crate) struct InflateStream {
	ctx: DecoderContext,
	dict_pos: usize,
	pending_start: usize,
	pending_len: usize,
	in_ofs: usize,
	in_len: usize,
	comp_left: u64,
	out_expected: u64,
	out_total: u64,
	done: bool,
}

impl InflateStream {
	pub(crate) fn new(comp_size: u64, uncomp_size: u64) -> Result<Self>
	{
		Ok(InflateStream {
			ctx: DecoderContext::acquire()?,
			dict_pos: 0,
			pending_start: 0,
			pending_len: 0,
			in_ofs: 0,
			in_len: 0,
			comp_left: comp_size,
			out_expected: uncomp_size,
			out_total: 0,
			done: false,
		})
	}

	/// Decompress into `dst`; returns the byte count, 0 at end of stream.
	pub(crate) fn read<F>(&mut self, src: &mut F, dst: &mut [u8]) -> Result<usize>
	where
		F: FnMut(&mut [u8]) -> Result<usize>,
	{
		if dst.is_empty() {
			return Ok(0);
		}
		loop {
			// drain bytes produced by the previous decompress call first;
			// the next call would overwrite them in the dictionary
			if self.pending_len > 0 {
				let contiguous = DICT_SIZE - self.pending_start;
				let n = self.pending_len.min(contiguous).min(dst.len());
				dst[..n].copy_from_slice(&self.ctx.dict[self.pending_start..self.pending_start + n]);
				self.pending_start = (self.pending_start + n) % DICT_SIZE;
				self.pending_len -= n;
				return Ok(n);
			}
			if self.done {
				if self.out_total < self.out_expected {
					return Err(Error::ExtractionFailed("deflate stream ended short of declared size"));
				}
				return Ok(0);
			}

			if self.in_ofs == self.in_len && self.comp_left > 0 {
				let want = (self.comp_left as usize).min(INPUT_CHUNK);
				let got = src(&mut self.ctx.in_buf[..want])?;
				if got == 0 {
					return Err(Error::Corrupt("truncated deflate stream"));
				}
				self.in_ofs = 0;
				self.in_len = got;
				self.comp_left -= got as u64;
			}

			let more_input = self.comp_left > 0;
			let flags = if more_input {
				inflate_flags::TINFL_FLAG_HAS_MORE_INPUT
			} else {
				0
			};
			let (status, consumed, produced) = decompress(
				&mut self.ctx.decomp,
				&self.ctx.in_buf[self.in_ofs..self.in_len],
				&mut self.ctx.dict[..],
				self.dict_pos,
				flags,
			);
			self.in_ofs += consumed;
			self.pending_start = self.dict_pos;
			self.pending_len = produced;
			self.dict_pos = (self.dict_pos + produced) % DICT_SIZE;
			self.out_total += produced as u64;
			if self.out_total > self.out_expected {
				return Err(Error::Corrupt("deflate output exceeds declared size"));
			}

			match status {
				TINFLStatus::Done => self.done = true,
				TINFLStatus::NeedsMoreInput => {
					if self.comp_left == 0 && self.in_ofs >= self.in_len {
						return Err(Error::Corrupt("truncated deflate stream"));
					}
					if consumed == 0 && produced == 0 && self.in_ofs >= self.in_len && !more_input {
						return Err(Error::Corrupt("deflate stream stuck"));
					}
				}
				TINFLStatus::HasMoreOutput => {
					// dictionary cycle filled; loop drains it above
				}
				_ => return Err(Error::Corrupt("deflate decompression error")),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn inflate_all(compressed: &[u8], uncomp_size: usize) -> Result<Vec<u8>>
	{
		let mut stream = InflateStream::new(compressed.len() as u64, uncomp_size as u64)?;
		let mut ofs = 0;
		let mut src = move |buf: &mut [u8]| -> Result<usize> {
			let n = (compressed.len() - ofs).min(buf.len());
			buf[..n].copy_from_slice(&compressed[ofs..ofs + n]);
			ofs += n;
			Ok(n)
		};
		let mut out = Vec::new();
		let mut chunk = [0u8; 700];
		loop {
			let n = stream.read(&mut src, &mut chunk)?;
			if n == 0 {
				break;
			}
			out.extend_from_slice(&chunk[..n]);
		}
		Ok(out)
	}

	#[test]
	fn test_round_trip_large_payload()
	{
		let _serial = crate::testutil::decoder_guard();
		// larger than both the input chunk and the 32 KiB dictionary
		let mut payload = Vec::new();
		for i in 0..120_000u32 {
			payload.extend_from_slice(format!("line {} of sample text\n", i % 977).as_bytes());
			if payload.len() > 100_000 {
				break;
			}
		}
		let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);
		let out = inflate_all(&compressed, payload.len()).unwrap();
		assert_eq!(out, payload);
	}

	#[test]
	fn test_truncated_stream_reports_corrupt()
	{
		let _serial = crate::testutil::decoder_guard();
		let payload = b"hello hello hello hello hello hello".repeat(100);
		let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);
		let cut = &compressed[..compressed.len() / 2];
		match inflate_all(cut, payload.len()) {
			Err(Error::Corrupt(_)) => {}
			other => panic!("expected corrupt, got {:?}", other.map(|v| v.len())),
		}
	}

	#[test]
	fn test_second_decoder_fails_cleanly()
	{
		let _serial = crate::testutil::decoder_guard();
		let _first = DecoderContext::acquire().unwrap();
		match DecoderContext::acquire() {
			Err(Error::DecoderBusy) => {}
			_ => panic!("expected DecoderBusy"),
		}
	}
}
