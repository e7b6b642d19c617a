//! Lightmap sample grids (`.samples`, `.samp_GL`), stored next to a mesh and tied to one of
//! its LODs by file name.

#[cfg(feature = "import")]
use std::{
	fs::File,
	io::{
		BufReader,
		Read
	}
};

#[cfg(feature = "export")]
use std::{
	fs,
	io::Write
};

use std::path::Path;

use byteorder::{
	LE,
	ReadBytesExt,
	WriteBytesExt
};

use ultraviolet::vec::Vec3;

use rgk_core::io_ext::{
	ReadBinExt,
	Tally,
	WriteBinExt
};

use crate::{
	error::{
		CodecError,
		RefractorError,
		Stage,
		within
	},
	prim::*
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleCell {
	pub position: Vec3,
	pub rotation: Vec3,
	pub face: i32,
}

impl SampleCell {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<SampleCell, CodecError>
	where
		R: ReadBytesExt,
	{
		Ok(SampleCell {
			position: buf.read_vec3_le()?,
			rotation: buf.read_vec3_le()?,
			face: buf.read_i32::<LE>()?,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> Result<(), CodecError>
	where
		W: WriteBytesExt,
	{
		buf.write_vec3_le(self.position)?;
		buf.write_vec3_le(self.rotation)?;
		buf.write_i32::<LE>(self.face)?;

		Ok(())
	}
}

/// Triangle a sample cell can point into. On disk each corner's normal follows its vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleFace {
	pub vertices: [Vec3; 3],
	pub normals: [Vec3; 3],
}

impl SampleFace {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<SampleFace, CodecError>
	where
		R: ReadBytesExt,
	{
		let mut face = SampleFace {
			vertices: [Vec3::zero(); 3],
			normals: [Vec3::zero(); 3],
		};

		for i in 0..3 {
			face.vertices[i] = buf.read_vec3_le()?;
			face.normals[i] = buf.read_vec3_le()?;
		}

		Ok(face)
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> Result<(), CodecError>
	where
		W: WriteBytesExt,
	{
		for (v, n) in self.vertices.iter().zip(self.normals.iter()) {
			buf.write_vec3_le(*v)?;
			buf.write_vec3_le(*n)?;
		}

		Ok(())
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
	pub signature: [u8; 4],
	pub width: i32,
	pub height: i32,
	pub cells: Vec<SampleCell>, // row-major, width * height
	pub faces: Vec<SampleFace>,
}

/// Number of cells in a `width` by `height` grid
fn grid_size(width: i32, height: i32) -> Option<usize> {
	let w = usize::try_from(width).ok()?;
	let h = usize::try_from(height).ok()?;
	w.checked_mul(h)
}

impl Sample {
	#[cfg(feature = "import")]
	pub fn read<R>(buf: &mut R) -> Result<Sample, RefractorError>
	where
		R: Read,
	{
		let mut rdr = Tally::new(buf);

		let (signature, width, height) = within(Stage::SampleHeader, &mut rdr, |r| {
			let mut signature = [0; 4];
			r.read_exact(&mut signature)?;
			Ok((signature, r.read_i32::<LE>()?, r.read_i32::<LE>()?))
		})?;

		let cells = within(Stage::SampleCells, &mut rdr, |r| {
			let ncells = grid_size(width, height)
				.ok_or(CodecError::InvalidLength(width as i64 * height as i64))?;
			read_array(ncells, r, SampleCell::read)
		})?;

		let faces = within(Stage::SampleFaces, &mut rdr, |r| {
			let nfaces = read_count(r)?;
			read_array(nfaces, r, SampleFace::read)
		})?;

		Ok(Sample {
			signature: signature,
			width: width,
			height: height,
			cells: cells,
			faces: faces,
		})
	}

	#[cfg(feature = "import")]
	pub fn load<P>(path: P) -> Result<Sample, RefractorError>
	where
		P: AsRef<Path>,
	{
		let mut file = BufReader::new(File::open(path)?);
		Sample::read(&mut file)
	}

	#[cfg(feature = "export")]
	pub fn to_bytes(&self) -> Result<Vec<u8>, RefractorError> {
		let mut out = vec![];

		within(Stage::SampleHeader, &mut out, |w| {
			w.write_all(&self.signature)?;
			w.write_i32::<LE>(self.width)?;
			w.write_i32::<LE>(self.height)?;
			Ok(())
		})?;

		within(Stage::SampleCells, &mut out, |w| {
			if grid_size(self.width, self.height) != Some(self.cells.len()) {
				return Err(CodecError::InconsistentSampleGrid {
					width: self.width,
					height: self.height,
					cells: self.cells.len(),
				});
			}

			for cell in self.cells.iter() {
				cell.write(w)?;
			}
			Ok(())
		})?;

		within(Stage::SampleFaces, &mut out, |w| {
			write_count(self.faces.len(), w)?;
			for face in self.faces.iter() {
				face.write(w)?;
			}
			Ok(())
		})?;

		Ok(out)
	}

	#[cfg(feature = "export")]
	pub fn write<W>(&self, buf: &mut W) -> Result<(), RefractorError>
	where
		W: Write,
	{
		let data = self.to_bytes()?;
		buf.write_all(&data)?;
		buf.flush()?;

		Ok(())
	}

	#[cfg(feature = "export")]
	pub fn save<P>(&self, path: P) -> Result<(), RefractorError>
	where
		P: AsRef<Path>,
	{
		let data = self.to_bytes()?;
		fs::write(path, data)?;

		Ok(())
	}
}

#[cfg(all(test, feature = "import", feature = "export"))]
mod tests {
	use super::*;

	fn grid(width: i32, height: i32, nfaces: usize) -> Sample {
		Sample {
			signature: *b"SMP2",
			width: width,
			height: height,
			cells: (0..(width * height)).map(|i| SampleCell {
				position: Vec3::new(i as f32, 0.5, -(i as f32)),
				rotation: Vec3::new(0.0, 1.0, 0.0),
				face: i % 2,
			}).collect(),
			faces: (0..nfaces).map(|i| SampleFace {
				vertices: [Vec3::zero(), Vec3::new(1.0, 0.0, i as f32), Vec3::new(0.0, 1.0, 0.0)],
				normals: [Vec3::unit_z(); 3],
			}).collect(),
		}
	}

	#[test]
	fn test_round_trip() {
		let sample = grid(2, 3, 2);
		let data = sample.to_bytes().unwrap();

		// signature, width, height, 6 cells, face count, 2 faces
		assert_eq!(4 + 4 + 4 + 6 * 28 + 4 + 2 * 72, data.len());
		assert_eq!(sample, Sample::read(&mut &data[..]).unwrap());
	}

	#[test]
	fn test_face_corners_interleaved() {
		let sample = grid(0, 0, 1);
		let data = sample.to_bytes().unwrap();

		// second corner's vertex sits right after the first corner's normal
		let mut second = &data[16 + 24..16 + 36];
		assert_eq!(Vec3::new(1.0, 0.0, 0.0), second.read_vec3_le().unwrap());
	}

	#[test]
	fn test_inconsistent_grid() {
		let mut sample = grid(2, 3, 0);
		sample.cells.pop();

		let err = sample.to_bytes().unwrap_err();
		assert_eq!(Some(Stage::SampleCells), err.stage());
		assert!(matches!(err.kind(), Some(CodecError::InconsistentSampleGrid { width: 2, height: 3, cells: 5 })));

		sample.width = -2;
		assert!(sample.to_bytes().is_err());
	}

	#[test]
	fn test_negative_dimensions() {
		let mut data = b"SMP2".to_vec();
		data.extend_from_slice(&(-1i32).to_le_bytes());
		data.extend_from_slice(&4i32.to_le_bytes());

		let err = Sample::read(&mut &data[..]).unwrap_err();
		assert_eq!(Some(Stage::SampleCells), err.stage());
		assert!(matches!(err.kind(), Some(CodecError::InvalidLength(-4))));
	}

	#[test]
	fn test_truncated_faces() {
		let data = grid(1, 1, 1).to_bytes().unwrap();

		let err = Sample::read(&mut &data[..data.len() - 4]).unwrap_err();
		assert_eq!(Some(Stage::SampleFaces), err.stage());
		assert!(matches!(err, RefractorError::Codec { kind: CodecError::UnexpectedEof, .. }));
	}
}
