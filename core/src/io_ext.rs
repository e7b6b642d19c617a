use std::io::{
	Read,
	Result,
	Write
};

use ultraviolet::vec::{
	Vec3,
	Vec4
};

pub trait ReadBinExt: Read {
	/// Reads a little endian 3D vector
	#[inline]
	fn read_vec3_le(&mut self) -> Result<Vec3> {
		let mut x = [0; 4];
		let mut y = x;
		let mut z = y;

		self.read_exact(&mut x)?;
		self.read_exact(&mut y)?;
		self.read_exact(&mut z)?;

		Ok(Vec3::new(f32::from_le_bytes(x), f32::from_le_bytes(y), f32::from_le_bytes(z)))
	}

	/// Reads a little endian 4D vector
	#[inline]
	fn read_vec4_le(&mut self) -> Result<Vec4> {
		let mut x = [0; 4];
		let mut y = x;
		let mut z = y;
		let mut w = z;

		self.read_exact(&mut x)?;
		self.read_exact(&mut y)?;
		self.read_exact(&mut z)?;
		self.read_exact(&mut w)?;

		Ok(Vec4::new(f32::from_le_bytes(x), f32::from_le_bytes(y), f32::from_le_bytes(z),
			f32::from_le_bytes(w)))
	}
}

impl<R> ReadBinExt for R
where
	R: Read + ?Sized,
{
}

pub trait WriteBinExt: Write {
	/// Writes a little endian 3D vector
	#[inline]
	fn write_vec3_le(&mut self, v: Vec3) -> Result<()> {
		self.write_all(&v.x.to_le_bytes())?;
		self.write_all(&v.y.to_le_bytes())?;
		self.write_all(&v.z.to_le_bytes())
	}

	/// Writes a little endian 4D vector
	#[inline]
	fn write_vec4_le(&mut self, v: Vec4) -> Result<()> {
		self.write_all(&v.x.to_le_bytes())?;
		self.write_all(&v.y.to_le_bytes())?;
		self.write_all(&v.z.to_le_bytes())?;
		self.write_all(&v.w.to_le_bytes())
	}
}

impl<W> WriteBinExt for W
where
	W: Write + ?Sized,
{
}

/// Byte offset of a stream, counted from where it was first handed to a codec
pub trait StreamOffset {
	fn stream_offset(&self) -> u64;
}

impl StreamOffset for Vec<u8> {
	fn stream_offset(&self) -> u64 {
		self.len() as u64
	}
}

/// Reader adapter that keeps count of the bytes consumed through it.
/// Useful for reporting where a sequential decoder stopped without requiring [`std::io::Seek`].
#[derive(Debug)]
pub struct Tally<R> {
	inner: R,
	count: u64,
}

impl<R> Tally<R> {
	pub fn new(inner: R) -> Tally<R> {
		Tally {
			inner: inner,
			count: 0,
		}
	}

	pub fn into_inner(self) -> R {
		self.inner
	}
}

impl<R> StreamOffset for Tally<R> {
	fn stream_offset(&self) -> u64 {
		self.count
	}
}

impl<R> Read for Tally<R>
where
	R: Read,
{
	fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
		let n = self.inner.read(buf)?;
		self.count += n as u64;
		Ok(n)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Read;

	use ultraviolet::vec::{
		Vec3,
		Vec4
	};

	use super::*;

	#[test]
	fn test_read_vecs() {
		let mut vec3: &[u8] = &[0x5c, 0x1f, 0x7f, 0x3c, 0xa4, 0xfb, 0xf0, 0x3d, 0xd4, 0xf1, 0xb6, 0x3d][..];
		let mut vec4: &[u8] = &[0x5c, 0x1f, 0x7f, 0x3c, 0xa4, 0xfb, 0xf0, 0x3d, 0xd4, 0xf1, 0xb6, 0x3d,
			0, 0xa0, 0xd9, 0xbd][..];
		assert_eq!(Vec3::new(0.0155714415, 0.117667466, 0.089328438), vec3.read_vec3_le().unwrap());
		assert_eq!(Vec4::new(0.0155714415, 0.117667466, 0.089328438, -0.106262207), vec4.read_vec4_le().unwrap());
	}

	#[test]
	fn test_write_vecs() {
		let mut out = vec![];
		out.write_vec3_le(Vec3::new(0.0155714415, 0.117667466, 0.089328438)).unwrap();
		assert_eq!(&[0x5c, 0x1f, 0x7f, 0x3c, 0xa4, 0xfb, 0xf0, 0x3d, 0xd4, 0xf1, 0xb6, 0x3d][..], &out[..]);
		assert_eq!(12, out.stream_offset());

		out.write_vec4_le(Vec4::new(1.0, 2.0, 3.0, 4.0)).unwrap();
		let mut back = &out[12..];
		assert_eq!(Vec4::new(1.0, 2.0, 3.0, 4.0), back.read_vec4_le().unwrap());
	}

	#[test]
	fn test_tally() {
		let data = [1u8, 2, 3, 4, 5, 6, 7];
		let mut tally = Tally::new(&data[..]);
		let mut buf = [0; 4];

		tally.read_exact(&mut buf).unwrap();
		assert_eq!(4, tally.stream_offset());
		assert!(tally.read_exact(&mut buf).is_err());
		assert_eq!(7, tally.stream_offset());
	}
}
