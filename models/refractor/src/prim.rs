//! Count, string and array helpers shared by the mesh and sample codecs.
//! Scalars are plain [`byteorder`] calls at the use site; these cover the fields whose
//! declared size has to be validated before anything is allocated.

use byteorder::{
	LE,
	ReadBytesExt,
	WriteBytesExt
};

use crate::error::CodecError;

/// Upper bound on capacity reserved up front for a count read from the stream.
/// Larger arrays still decode, they just grow as their data actually arrives.
pub const PREALLOC_LIMIT: usize = 1 << 16;

/// Default limit for length-prefixed strings (shader, technique and map names)
pub const MAX_STRING_LEN: usize = 1 << 16;

/// Reads a 32-bit element count, rejecting negative values
#[cfg(feature = "import")]
pub fn read_count<R>(buf: &mut R) -> Result<usize, CodecError>
where
	R: ReadBytesExt,
{
	let n = buf.read_i32::<LE>()?;
	usize::try_from(n).map_err(|_| CodecError::InvalidLength(n as i64))
}

/// Reads a 32-bit length followed by that many raw bytes
#[cfg(feature = "import")]
pub fn read_text<R>(limit: usize, buf: &mut R) -> Result<Vec<u8>, CodecError>
where
	R: ReadBytesExt,
{
	let length = buf.read_i32::<LE>()?;
	if length < 0 || length as usize > limit {
		return Err(CodecError::InvalidLength(length as i64));
	}

	let mut data = vec![0; length as usize];
	buf.read_exact(&mut data)?;

	Ok(data)
}

/// Reads `count` items with `f`, in order
#[cfg(feature = "import")]
pub fn read_array<R, T, F>(count: usize, buf: &mut R, mut f: F) -> Result<Vec<T>, CodecError>
where
	F: FnMut(&mut R) -> Result<T, CodecError>,
{
	let mut items = Vec::with_capacity(count.min(PREALLOC_LIMIT));
	for _ in 0..count {
		items.push(f(buf)?);
	}

	Ok(items)
}

#[cfg(feature = "export")]
pub fn write_count<W>(count: usize, buf: &mut W) -> Result<(), CodecError>
where
	W: WriteBytesExt,
{
	let n = i32::try_from(count).map_err(|_| CodecError::InvalidLength(count as i64))?;
	buf.write_i32::<LE>(n)?;

	Ok(())
}

/// Writes the length then the raw bytes, no terminator or padding
#[cfg(feature = "export")]
pub fn write_text<W>(data: &[u8], buf: &mut W) -> Result<(), CodecError>
where
	W: WriteBytesExt,
{
	write_count(data.len(), buf)?;
	buf.write_all(data)?;

	Ok(())
}
