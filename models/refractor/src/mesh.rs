//! Refractor 2 mesh containers (`.skinnedmesh`, `.bundledmesh`, `.staticmesh`).
//!
//! All three variants share one sequential layout; the variant and the header version only
//! switch individual fields on and off:
//! ```text
//! header          5 x i32 (tag, version, 3 reserved)
//! format flag     i8
//! geometry table  i32 count, then i32 LOD count per geometry
//! vertex layout   i32 count, 4 x i16 per attribute, i32 format, i32 stride, i32 vertex count,
//!                 stride / format * vertex count x f32
//! index block     i32 count, u16 per index
//! reserved        i32, all variants but skinned
//! node block      per geometry, per LOD: 2 x vec3 bounds, vec3 pivot (version <= 6),
//!                 i32 node count, 16 x f32 per node (all variants but bundled)
//! material block  per geometry, per LOD: i32 count, then materials
//! ```

#[cfg(feature = "import")]
use std::io::Read;

#[cfg(feature = "export")]
use std::{
	fs,
	io::Write,
	path::Path
};

use byteorder::{
	LE,
	ReadBytesExt,
	WriteBytesExt
};

use log::trace;

use ultraviolet::{
	mat::Mat4,
	vec::Vec3
};

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
	prim::*,
	ImportCfg,
	PolycountMode
};

/// Highest format version that still stores a pivot per LOD
pub const PIVOT_MAX_VERSION: i32 = 6;

/// The only format version whose non-skinned materials carry a normal range
pub const NORMAL_RANGE_VERSION: i32 = 11;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshVariant {
	Skinned,
	Bundled,
	Static,
}

impl MeshVariant {
	/// Builds the variant from one flag per variant. Exactly one has to be set.
	pub fn from_flags(skinned: bool, bundled: bool, is_static: bool) -> Result<MeshVariant, RefractorError> {
		match (skinned, bundled, is_static) {
			(true, false, false) => Ok(MeshVariant::Skinned),
			(false, true, false) => Ok(MeshVariant::Bundled),
			(false, false, true) => Ok(MeshVariant::Static),
			_ => Err(RefractorError::UnknownVariant(format!("skinned={} bundled={} static={}",
				skinned, bundled, is_static))),
		}
	}

	/// Picks the variant from a file extension, with or without the leading dot
	pub fn from_extension(ext: &str) -> Result<MeshVariant, RefractorError> {
		let ext = ext.trim_start_matches('.').to_ascii_lowercase();
		MeshVariant::from_flags(ext == "skinnedmesh", ext == "bundledmesh", ext == "staticmesh")
			.map_err(|_| RefractorError::UnknownVariant(ext))
	}

	pub fn from_path<P>(path: P) -> Result<MeshVariant, RefractorError>
	where
		P: AsRef<std::path::Path>,
	{
		let path = path.as_ref();
		match path.extension().and_then(|e| e.to_str()) {
			Some(ext) => MeshVariant::from_extension(ext),
			None => Err(RefractorError::UnknownVariant(path.display().to_string())),
		}
	}

	pub fn extension(self) -> &'static str {
		match self {
			MeshVariant::Skinned => "skinnedmesh",
			MeshVariant::Bundled => "bundledmesh",
			MeshVariant::Static => "staticmesh",
		}
	}

	/// Whether the i32 after the index block is present
	pub fn has_reserved(self) -> bool {
		self != MeshVariant::Skinned
	}

	/// Whether LODs store their node matrices
	pub fn has_transforms(self) -> bool {
		self != MeshVariant::Bundled
	}

	/// Whether materials of the given format version carry a normal range
	pub fn has_normal_range(self, version: i32) -> bool {
		self != MeshVariant::Skinned && version == NORMAL_RANGE_VERSION
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Header {
	pub tag: i32,
	pub version: i32,
	pub reserved3: i32,
	pub reserved4: i32,
	pub reserved5: i32,
}

impl Header {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<Header, CodecError>
	where
		R: ReadBytesExt,
	{
		Ok(Header {
			tag: buf.read_i32::<LE>()?,
			version: buf.read_i32::<LE>()?,
			reserved3: buf.read_i32::<LE>()?,
			reserved4: buf.read_i32::<LE>()?,
			reserved5: buf.read_i32::<LE>()?,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> Result<(), CodecError>
	where
		W: WriteBytesExt,
	{
		buf.write_i32::<LE>(self.tag)?;
		buf.write_i32::<LE>(self.version)?;
		buf.write_i32::<LE>(self.reserved3)?;
		buf.write_i32::<LE>(self.reserved4)?;
		buf.write_i32::<LE>(self.reserved5)?;

		Ok(())
	}
}

/// One channel of the shared vertex buffer. The tags follow Direct3D 9's
/// `D3DDECLTYPE` and `D3DDECLUSAGE` enums.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VertexAttribute {
	pub flag: i16,
	pub offset: i16, // in bytes, from the start of a vertex
	pub var_type: i16,
	pub usage: i16,
}

impl VertexAttribute {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<VertexAttribute, CodecError>
	where
		R: ReadBytesExt,
	{
		Ok(VertexAttribute {
			flag: buf.read_i16::<LE>()?,
			offset: buf.read_i16::<LE>()?,
			var_type: buf.read_i16::<LE>()?,
			usage: buf.read_i16::<LE>()?,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> Result<(), CodecError>
	where
		W: WriteBytesExt,
	{
		buf.write_i16::<LE>(self.flag)?;
		buf.write_i16::<LE>(self.offset)?;
		buf.write_i16::<LE>(self.var_type)?;
		buf.write_i16::<LE>(self.usage)?;

		Ok(())
	}
}

/// Describes how the flat vertex buffer is cut into vertices
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexLayout {
	pub attributes: Vec<VertexAttribute>,
	pub format: i32, // size of one buffer element in bytes, always 4 in shipped files
	pub stride: i32,
	pub count: usize,
}

impl VertexLayout {
	/// Number of f32 elements the vertex buffer must hold
	pub fn element_count(&self) -> Result<usize, CodecError> {
		if self.format <= 0 || self.stride < 0 || self.stride % self.format != 0 {
			return Err(CodecError::InconsistentVertexLayout {
				stride: self.stride,
				format: self.format,
			});
		}

		let per_vertex = (self.stride / self.format) as usize;
		per_vertex.checked_mul(self.count)
			.ok_or(CodecError::InvalidLength(self.count as i64))
	}

	/// Reads the attribute table, layout scalars and the vertex buffer that follows them
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<(VertexLayout, Vec<f32>), CodecError>
	where
		R: ReadBytesExt,
	{
		let nattrs = read_count(buf)?;
		let layout = VertexLayout {
			attributes: read_array(nattrs, buf, VertexAttribute::read)?,
			format: buf.read_i32::<LE>()?,
			stride: buf.read_i32::<LE>()?,
			count: read_count(buf)?,
		};

		let vertices = read_array(layout.element_count()?, buf, |b| Ok(b.read_f32::<LE>()?))?;

		Ok((layout, vertices))
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, vertices: &[f32], buf: &mut W) -> Result<(), CodecError>
	where
		W: WriteBytesExt,
	{
		let expected = self.element_count()?;
		if expected != vertices.len() {
			return Err(CodecError::VertexBufferLength {
				expected: expected,
				found: vertices.len(),
			});
		}

		write_count(self.attributes.len(), buf)?;
		for attr in self.attributes.iter() {
			attr.write(buf)?;
		}

		buf.write_i32::<LE>(self.format)?;
		buf.write_i32::<LE>(self.stride)?;
		write_count(self.count, buf)?;

		for v in vertices.iter() {
			buf.write_f32::<LE>(*v)?;
		}

		Ok(())
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalRange {
	pub min: Vec3,
	pub max: Vec3,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Material {
	pub alpha_mode: i32,
	pub shader: Vec<u8>, // .fx file
	pub technique: Vec<u8>,
	pub maps: Vec<Vec<u8>>,
	pub vertex_start: i32,
	pub index_start: i32,
	pub index_count: i32,
	pub vertex_count: i32,
	pub reserved4: i32,
	pub reserved5: i32,
	pub normal_range: Option<NormalRange>,
}

impl Material {
	/// Shader file name, lossily decoded for display
	pub fn shader_name(&self) -> String {
		String::from_utf8_lossy(&self.shader).into_owned()
	}

	pub fn technique_name(&self) -> String {
		String::from_utf8_lossy(&self.technique).into_owned()
	}

	#[cfg(feature = "import")]
	fn read<R>(has_normal_range: bool, max_string_len: usize, buf: &mut R) -> Result<Material, CodecError>
	where
		R: ReadBytesExt,
	{
		let alpha_mode = buf.read_i32::<LE>()?;
		let shader = read_text(max_string_len, buf)?;
		let technique = read_text(max_string_len, buf)?;
		let nmaps = read_count(buf)?;
		let maps = read_array(nmaps, buf, |b| read_text(max_string_len, b))?;

		Ok(Material {
			alpha_mode: alpha_mode,
			shader: shader,
			technique: technique,
			maps: maps,
			vertex_start: buf.read_i32::<LE>()?,
			index_start: buf.read_i32::<LE>()?,
			index_count: buf.read_i32::<LE>()?,
			vertex_count: buf.read_i32::<LE>()?,
			reserved4: buf.read_i32::<LE>()?,
			reserved5: buf.read_i32::<LE>()?,
			normal_range: match has_normal_range {
				true => Some(NormalRange {
					min: buf.read_vec3_le()?,
					max: buf.read_vec3_le()?,
				}),
				false => None,
			},
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, has_normal_range: bool, buf: &mut W) -> Result<(), CodecError>
	where
		W: WriteBytesExt,
	{
		buf.write_i32::<LE>(self.alpha_mode)?;
		write_text(&self.shader, buf)?;
		write_text(&self.technique, buf)?;

		write_count(self.maps.len(), buf)?;
		for map in self.maps.iter() {
			write_text(map, buf)?;
		}

		buf.write_i32::<LE>(self.vertex_start)?;
		buf.write_i32::<LE>(self.index_start)?;
		buf.write_i32::<LE>(self.index_count)?;
		buf.write_i32::<LE>(self.vertex_count)?;
		buf.write_i32::<LE>(self.reserved4)?;
		buf.write_i32::<LE>(self.reserved5)?;

		match (has_normal_range, &self.normal_range) {
			(true, Some(range)) => {
				buf.write_vec3_le(range.min)?;
				buf.write_vec3_le(range.max)?;
			},
			(false, None) => (),
			_ => return Err(CodecError::FieldMismatch("material normal range")),
		}

		Ok(())
	}
}

/// One level of detail of a geometry
#[derive(Clone, Debug, PartialEq)]
pub struct Lod {
	pub version: i32, // copy of the header version, must match it on encode
	pub min: Vec3,
	pub max: Vec3,
	pub pivot: Option<Vec3>,
	pub node_count: usize,
	pub transforms: Vec<Mat4>, // empty for bundled meshes
	pub materials: Vec<Material>,
	pub polycount: i64,
}

impl Lod {
	/// Derives the polygon count from the material index ranges
	pub fn count_polygons(&self, mode: PolycountMode) -> i64 {
		match mode {
			PolycountMode::Summed => self.materials.iter().map(|m| (m.index_count / 3) as i64).sum(),
			PolycountMode::LastMaterial => self.materials.last().map_or(0, |m| (m.index_count / 3) as i64),
		}
	}

	/// Reads the bounds/pivot/node part. Materials are filled in by a later pass.
	#[cfg(feature = "import")]
	fn read_nodes<R>(variant: MeshVariant, version: i32, buf: &mut R) -> Result<Lod, CodecError>
	where
		R: ReadBytesExt,
	{
		let min = buf.read_vec3_le()?;
		let max = buf.read_vec3_le()?;
		let pivot = match version <= PIVOT_MAX_VERSION {
			true => Some(buf.read_vec3_le()?),
			false => None,
		};

		let node_count = read_count(buf)?;
		let transforms = match variant.has_transforms() {
			true => read_array(node_count, buf, read_matrix)?,
			false => vec![],
		};

		trace!("LOD: {} nodes, {} matrices", node_count, transforms.len());

		Ok(Lod {
			version: version,
			min: min,
			max: max,
			pivot: pivot,
			node_count: node_count,
			transforms: transforms,
			materials: vec![],
			polycount: 0,
		})
	}

	#[cfg(feature = "import")]
	fn read_materials<R>(&mut self, variant: MeshVariant, cfg: &ImportCfg, buf: &mut R) -> Result<(), CodecError>
	where
		R: ReadBytesExt,
	{
		let has_normal_range = variant.has_normal_range(self.version);
		let nmats = read_count(buf)?;

		self.materials = read_array(nmats, buf, |b| Material::read(has_normal_range, cfg.max_string_len, b))?;
		self.polycount = self.count_polygons(cfg.polycount);

		trace!("LOD: {} materials, {} polygons", self.materials.len(), self.polycount);

		Ok(())
	}

	#[cfg(feature = "export")]
	fn write_nodes<W>(&self, variant: MeshVariant, version: i32, buf: &mut W) -> Result<(), CodecError>
	where
		W: WriteBytesExt,
	{
		if self.version != version {
			return Err(CodecError::FieldMismatch("LOD version"));
		}

		buf.write_vec3_le(self.min)?;
		buf.write_vec3_le(self.max)?;

		match (version <= PIVOT_MAX_VERSION, self.pivot) {
			(true, Some(pivot)) => buf.write_vec3_le(pivot)?,
			(false, None) => (),
			_ => return Err(CodecError::FieldMismatch("LOD pivot")),
		}

		if variant.has_transforms() {
			if self.node_count != self.transforms.len() {
				return Err(CodecError::FieldMismatch("node count"));
			}
			write_count(self.transforms.len(), buf)?;
			for m in self.transforms.iter() {
				for col in m.cols.iter() {
					buf.write_vec4_le(*col)?;
				}
			}
		} else {
			if !self.transforms.is_empty() {
				return Err(CodecError::FieldMismatch("node transforms in bundled mesh"));
			}
			write_count(self.node_count, buf)?;
		}

		Ok(())
	}

	#[cfg(feature = "export")]
	fn write_materials<W>(&self, variant: MeshVariant, version: i32, buf: &mut W) -> Result<(), CodecError>
	where
		W: WriteBytesExt,
	{
		let has_normal_range = variant.has_normal_range(version);

		write_count(self.materials.len(), buf)?;
		for mat in self.materials.iter() {
			mat.write(has_normal_range, buf)?;
		}

		Ok(())
	}
}

#[cfg(feature = "import")]
fn read_matrix<R>(buf: &mut R) -> Result<Mat4, CodecError>
where
	R: ReadBytesExt,
{
	Ok(Mat4::new(buf.read_vec4_le()?, buf.read_vec4_le()?, buf.read_vec4_le()?, buf.read_vec4_le()?))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
	pub lods: Vec<Lod>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
	pub variant: MeshVariant,
	pub header: Header,
	pub format_flag: i8,
	pub geometries: Vec<Geometry>,
	pub layout: VertexLayout,
	pub vertices: Vec<f32>,
	pub indices: Vec<u16>,
	pub reserved: Option<i32>, // absent in skinned meshes
}

impl Mesh {
	/// Looks up a LOD by geometry and LOD index
	pub fn lod(&self, geom: usize, lod: usize) -> Option<&Lod> {
		self.geometries.get(geom).and_then(|g| g.lods.get(lod))
	}

	/// Total polygon count of every LOD of every geometry
	pub fn polycount(&self) -> i64 {
		self.geometries.iter()
			.flat_map(|g| g.lods.iter())
			.map(|l| l.polycount)
			.sum()
	}

	/// Decodes a complete mesh. On failure nothing partially read is returned.
	#[cfg(feature = "import")]
	pub fn read<R>(variant: MeshVariant, cfg: &ImportCfg, buf: &mut R) -> Result<Mesh, RefractorError>
	where
		R: Read,
	{
		let mut rdr = Tally::new(buf);

		let header = within(Stage::Header, &mut rdr, |r| Header::read(r))?;
		let format_flag = within(Stage::FormatFlag, &mut rdr, |r| Ok(r.read_i8()?))?;

		// LOD counts for every geometry come in one block, long before the LODs themselves
		let lod_counts = within(Stage::GeometryTable, &mut rdr, |r| {
			let ngeoms = read_count(r)?;
			read_array(ngeoms, r, read_count)
		})?;

		let (layout, vertices) = within(Stage::VertexLayout, &mut rdr, |r| VertexLayout::read(r))?;

		let indices = within(Stage::IndexBlock, &mut rdr, |r| {
			let nindices = read_count(r)?;
			read_array(nindices, r, |b| Ok(b.read_u16::<LE>()?))
		})?;

		let reserved = match variant.has_reserved() {
			true => Some(within(Stage::Reserved, &mut rdr, |r| Ok(r.read_i32::<LE>()?))?),
			false => None,
		};

		let mut geometries = within(Stage::Nodes, &mut rdr, |r| {
			let mut geoms = Vec::with_capacity(lod_counts.len());
			for nlods in lod_counts.iter() {
				geoms.push(Geometry {
					lods: read_array(*nlods, r, |b| Lod::read_nodes(variant, header.version, b))?,
				});
			}
			Ok(geoms)
		})?;

		within(Stage::Materials, &mut rdr, |r| {
			for geom in geometries.iter_mut() {
				for lod in geom.lods.iter_mut() {
					lod.read_materials(variant, cfg, r)?;
				}
			}
			Ok(())
		})?;

		Ok(Mesh {
			variant: variant,
			header: header,
			format_flag: format_flag,
			geometries: geometries,
			layout: layout,
			vertices: vertices,
			indices: indices,
			reserved: reserved,
		})
	}

	/// Encodes the whole mesh into memory, in the same field order [`Mesh::read`] consumes
	#[cfg(feature = "export")]
	pub fn to_bytes(&self) -> Result<Vec<u8>, RefractorError> {
		let mut out = vec![];
		let version = self.header.version;

		within(Stage::Header, &mut out, |w| self.header.write(w))?;
		within(Stage::FormatFlag, &mut out, |w| Ok(w.write_i8(self.format_flag)?))?;

		within(Stage::GeometryTable, &mut out, |w| {
			write_count(self.geometries.len(), w)?;
			for geom in self.geometries.iter() {
				write_count(geom.lods.len(), w)?;
			}
			Ok(())
		})?;

		within(Stage::VertexLayout, &mut out, |w| self.layout.write(&self.vertices, w))?;

		within(Stage::IndexBlock, &mut out, |w| {
			write_count(self.indices.len(), w)?;
			for i in self.indices.iter() {
				w.write_u16::<LE>(*i)?;
			}
			Ok(())
		})?;

		if self.variant.has_reserved() {
			within(Stage::Reserved, &mut out, |w| match self.reserved {
				Some(v) => Ok(w.write_i32::<LE>(v)?),
				None => Err(CodecError::FieldMismatch("reserved field after index block")),
			})?;
		}

		within(Stage::Nodes, &mut out, |w| {
			for lod in self.geometries.iter().flat_map(|g| g.lods.iter()) {
				lod.write_nodes(self.variant, version, w)?;
			}
			Ok(())
		})?;

		within(Stage::Materials, &mut out, |w| {
			for lod in self.geometries.iter().flat_map(|g| g.lods.iter()) {
				lod.write_materials(self.variant, version, w)?;
			}
			Ok(())
		})?;

		Ok(out)
	}

	/// Encodes the mesh and only then hands the bytes to `buf`
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
