//! Minimal ZIP access for EPUB archives: central-directory enumeration,
//! exact-name lookup, callback streaming extraction and a pull API.
//!
//! Only the stored and DEFLATE methods are accepted. DEFLATE decoding goes
//! through the shared streaming decoder in [`inflate`], which keeps a
//! 32 KiB dictionary and a capped compressed-input chunk so the whole
//! decoder state stays small and singular.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};

mod inflate;

use inflate::InflateStream;

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;

const EOCD_SIG: u32 = 0x0605_4b50;
const CD_SIG: u32 = 0x0201_4b50;
const LOCAL_SIG: u32 = 0x0403_4b50;

/// How far back from the end of the file the end-of-central-directory
/// record is searched for.
const EOCD_SCAN_SPAN: u64 = 1024;

const GP_FLAG_ENCRYPTED: u16 = 0x0001;

#[inline]
fn le_u16(d: &[u8], o: usize) -> u16
{
	u16::from_le_bytes([d[o], d[o + 1]])
}

#[inline]
fn le_u32(d: &[u8], o: usize) -> u32
{
	u32::from_le_bytes([d[o], d[o + 1], d[o + 2], d[o + 3]])
}

/// A central-directory record. Immutable once the reader is open.
pub struct ZipEntry {
	pub name: String,
	pub compressed_size: u64,
	pub uncompressed_size: u64,
	pub local_header_offset: u64,
	pub method: u16,
	flags: u16,
}

/// Result of a streaming-extraction sink call.
#[derive(PartialEq, Eq, Clone, Copy)]
pub enum SinkResult {
	Continue,
	/// Abort the extraction; the extractor releases decoder state and
	/// reports success-with-early-stop.
	Stop,
}

pub struct ZipReader {
	path: PathBuf,
	file: File,
	file_size: u64,
	entries: Vec<ZipEntry>,
}

impl ZipReader {
	/// Open an archive and load its central directory.
	pub fn open(path: impl AsRef<Path>) -> Result<Self>
	{
		let path = path.as_ref().to_path_buf();
		let mut file = File::open(&path)?;
		let file_size = file.metadata()?.len();

		let (cd_offset, cd_size) = find_central_directory(&mut file, file_size)?;
		let mut cd = vec![0u8; cd_size as usize];
		file.seek(SeekFrom::Start(cd_offset))?;
		file.read_exact(&mut cd).map_err(|_| Error::Corrupt("central directory short read"))?;
		let entries = parse_central_directory(&cd)?;
		debug!("zip: {} entries in {}", entries.len(), path.display());
		Ok(ZipReader { path, file, file_size, entries })
	}

	#[inline]
	pub fn count(&self) -> usize
	{
		self.entries.len()
	}

	pub fn info(&self, index: usize) -> Result<&ZipEntry>
	{
		self.entries.get(index).ok_or(Error::InvalidParam("entry index out of range"))
	}

	/// Exact byte-wise name lookup.
	pub fn locate(&self, name: &str) -> Result<usize>
	{
		self.entries
			.iter()
			.position(|e| e.name.as_bytes() == name.as_bytes())
			.ok_or_else(|| Error::NotFound(name.to_string()))
	}

	#[inline]
	pub fn contains(&self, name: &str) -> bool
	{
		self.locate(name).is_ok()
	}

	/// Stream an entry's decompressed bytes to `sink` in chunks of at most
	/// `chunk_size` bytes. Returns `true` when the whole entry was
	/// delivered, `false` when the sink stopped the extraction early.
	pub fn extract_streaming<F>(&mut self, index: usize, mut sink: F, chunk_size: usize) -> Result<bool>
	where
		F: FnMut(&[u8]) -> SinkResult,
	{
		let mut stream = self.pull_open(index, chunk_size)?;
		let mut buf = vec![0u8; clamp_chunk(chunk_size)];
		loop {
			let n = stream.read(&mut buf)?;
			if n == 0 {
				return Ok(true);
			}
			if sink(&buf[..n]) == SinkResult::Stop {
				return Ok(false);
			}
		}
	}

	/// Extract a whole entry into memory. Intended for the small metadata
	/// documents; chapter content goes through the pull API instead.
	pub fn extract_to_vec(&mut self, index: usize) -> Result<Vec<u8>>
	{
		let expected = self.info(index)?.uncompressed_size as usize;
		let mut out = Vec::new();
		out.try_reserve_exact(expected).map_err(|_| Error::Oom)?;
		self.extract_streaming(
			index,
			|chunk| {
				out.extend_from_slice(chunk);
				SinkResult::Continue
			},
			4096,
		)?;
		if out.len() != expected {
			return Err(Error::ExtractionFailed("entry shorter than declared"));
		}
		Ok(out)
	}

	/// Open a pull stream over one entry. The stream owns its own file
	/// handle; the reader stays usable for lookups while it is alive.
	pub fn pull_open(&self, index: usize, chunk_size: usize) -> Result<PullStream>
	{
		let entry = self.info(index)?;
		if entry.flags & GP_FLAG_ENCRYPTED != 0 {
			return Err(Error::Unsupported("encrypted entry"));
		}
		let mut file = File::open(&self.path)?;
		let data_offset = local_data_offset(&mut file, entry)?;
		let inflate = match entry.method {
			METHOD_STORED => None,
			METHOD_DEFLATE => Some(InflateStream::new(entry.compressed_size, entry.uncompressed_size)?),
			_ => return Err(Error::Unsupported("compression method")),
		};
		file.seek(SeekFrom::Start(data_offset))?;
		Ok(PullStream {
			file,
			inflate,
			comp_remaining: entry.compressed_size,
			out_remaining: entry.uncompressed_size,
			chunk: clamp_chunk(chunk_size),
		})
	}

	#[inline]
	pub fn file_size(&self) -> u64
	{
		self.file_size
	}
}

/// Incremental reader over one archive entry. Dropping it releases the
/// decoder state.
pub struct PullStream {
	file: File,
	inflate: Option<InflateStream>,
	comp_remaining: u64,
	out_remaining: u64,
	chunk: usize,
}

impl PullStream {
	/// Read up to `dst.len()` decompressed bytes; 0 means end of entry.
	pub fn read(&mut self, dst: &mut [u8]) -> Result<usize>
	{
		if dst.is_empty() {
			return Ok(0);
		}
		match &mut self.inflate {
			None => {
				if self.out_remaining == 0 {
					return Ok(0);
				}
				let want = (self.out_remaining as usize).min(dst.len()).min(self.chunk);
				let n = self.file.read(&mut dst[..want])?;
				if n == 0 {
					return Err(Error::Corrupt("stored entry truncated"));
				}
				self.out_remaining -= n as u64;
				Ok(n)
			}
			Some(stream) => {
				let file = &mut self.file;
				let comp_remaining = &mut self.comp_remaining;
				let mut src = move |buf: &mut [u8]| -> Result<usize> {
					let want = (*comp_remaining as usize).min(buf.len());
					if want == 0 {
						return Ok(0);
					}
					let n = file.read(&mut buf[..want])?;
					*comp_remaining -= n as u64;
					Ok(n)
				};
				let n = stream.read(&mut src, dst)?;
				self.out_remaining = self.out_remaining.saturating_sub(n as u64);
				Ok(n)
			}
		}
	}
}

#[inline]
fn clamp_chunk(chunk_size: usize) -> usize
{
	chunk_size.clamp(256, 8192)
}

fn find_central_directory(file: &mut File, file_size: u64) -> Result<(u64, u32)>
{
	if file_size < 22 {
		return Err(Error::NotAnArchive);
	}
	let span = EOCD_SCAN_SPAN.min(file_size);
	let mut tail = vec![0u8; span as usize];
	file.seek(SeekFrom::Start(file_size - span))?;
	file.read_exact(&mut tail).map_err(|_| Error::Corrupt("archive tail short read"))?;

	let mut i = tail.len() - 22;
	loop {
		if le_u32(&tail, i) == EOCD_SIG {
			break;
		}
		if i == 0 {
			return Err(Error::NotAnArchive);
		}
		i -= 1;
	}
	let cd_size = le_u32(&tail, i + 12);
	let cd_offset = le_u32(&tail, i + 16) as u64;
	if cd_offset + cd_size as u64 > file_size {
		return Err(Error::Corrupt("central directory extends past end of file"));
	}
	Ok((cd_offset, cd_size))
}

fn parse_central_directory(cd: &[u8]) -> Result<Vec<ZipEntry>>
{
	let mut entries = Vec::new();
	let mut pos = 0;
	while pos + 46 <= cd.len() {
		if le_u32(cd, pos) != CD_SIG {
			return Err(Error::Corrupt("central directory record signature"));
		}
		let flags = le_u16(cd, pos + 8);
		let method = le_u16(cd, pos + 10);
		let compressed_size = le_u32(cd, pos + 20) as u64;
		let uncompressed_size = le_u32(cd, pos + 24) as u64;
		let name_len = le_u16(cd, pos + 28) as usize;
		let extra_len = le_u16(cd, pos + 30) as usize;
		let comment_len = le_u16(cd, pos + 32) as usize;
		let local_header_offset = le_u32(cd, pos + 42) as u64;

		let name_start = pos + 46;
		let record_end = name_start + name_len + extra_len + comment_len;
		if record_end > cd.len() {
			return Err(Error::Corrupt("central directory record extends past buffer"));
		}
		let name = String::from_utf8_lossy(&cd[name_start..name_start + name_len]).into_owned();
		if entries.try_reserve(1).is_err() {
			return Err(Error::Oom);
		}
		entries.push(ZipEntry {
			name,
			compressed_size,
			uncompressed_size,
			local_header_offset,
			method,
			flags,
		});
		pos = record_end;
	}
	Ok(entries)
}

fn local_data_offset(file: &mut File, entry: &ZipEntry) -> Result<u64>
{
	let mut header = [0u8; 30];
	file.seek(SeekFrom::Start(entry.local_header_offset))?;
	file.read_exact(&mut header).map_err(|_| Error::Corrupt("local header short read"))?;
	if le_u32(&header, 0) != LOCAL_SIG {
		return Err(Error::Corrupt("local header signature"));
	}
	let name_len = le_u16(&header, 26) as u64;
	let extra_len = le_u16(&header, 28) as u64;
	Ok(entry.local_header_offset + 30 + name_len + extra_len)
}
