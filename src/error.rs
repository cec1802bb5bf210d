use std::fmt;
use std::io;

/// Error conditions reported by the pipeline components.
///
/// Every component reports its own failure and leaves itself either closed
/// or unchanged; none of them panic across the crate boundary.
#[derive(Debug)]
pub enum Error {
	/// The requested path or archive entry does not exist.
	NotFound(String),
	/// No end-of-central-directory signature in the last 1 KiB of the file.
	NotAnArchive,
	/// A structural invariant of the archive or XML failed.
	Corrupt(&'static str),
	/// A feature this pipeline deliberately rejects (compression method,
	/// encrypted entries, DTDs).
	Unsupported(&'static str),
	/// A scratch or entry-table allocation failed.
	Oom,
	/// Decompression produced fewer bytes than declared, or the sink
	/// refused a write.
	ExtractionFailed(&'static str),
	/// Out-of-range index or unclamped position passed to an API.
	InvalidParam(&'static str),
	/// The shared DEFLATE decoder state is already driving another stream.
	DecoderBusy,
	Io(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{
		match self {
			Error::NotFound(name) => write!(f, "not found: {}", name),
			Error::NotAnArchive => write!(f, "no end-of-central-directory signature found"),
			Error::Corrupt(what) => write!(f, "corrupt input: {}", what),
			Error::Unsupported(what) => write!(f, "unsupported: {}", what),
			Error::Oom => write!(f, "allocation failed"),
			Error::ExtractionFailed(what) => write!(f, "extraction failed: {}", what),
			Error::InvalidParam(what) => write!(f, "invalid parameter: {}", what),
			Error::DecoderBusy => write!(f, "deflate decoder already in use"),
			Error::Io(e) => write!(f, "i/o error: {}", e),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)>
	{
		match self {
			Error::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self
	{
		if e.kind() == io::ErrorKind::NotFound {
			Error::NotFound(e.to_string())
		} else {
			Error::Io(e)
		}
	}
}
