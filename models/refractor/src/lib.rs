pub mod error;
pub mod mesh;
pub mod prim;
pub mod sample;

use bitflags::bitflags;
use log::{
	debug,
	warn
};

use std::collections::BTreeMap;

#[cfg(feature = "import")]
use std::{
	fs::{
		self,
		File
	},
	io::BufReader,
	path::Path
};

pub use error::{
	CodecError,
	RefractorError,
	Stage
};
pub use mesh::{
	Geometry,
	Header,
	Lod,
	Material,
	Mesh,
	MeshVariant,
	NormalRange,
	VertexAttribute,
	VertexLayout
};
pub use sample::{
	Sample,
	SampleCell,
	SampleFace
};

bitflags! {
	pub struct ImportFlag: u32 {
		/// Look for `.samples`/`.samp_GL` files beside the mesh and attach them
		const LOAD_SAMPLES = 1;
	}
}

impl Default for ImportFlag {
	fn default() -> Self {
		ImportFlag::empty()
	}
}

/// How [`Lod::polycount`] is derived from the material index ranges
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolycountMode {
	/// `index_count / 3` summed over every material of the LOD
	Summed,
	/// Only the last material's `index_count / 3`, matching what older BF2 tooling reports.
	/// A LOD without materials counts as 0; that tooling instead reused the previous LOD's last material.
	LastMaterial,
}

impl Default for PolycountMode {
	fn default() -> Self {
		PolycountMode::Summed
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportCfg {
	pub flags: ImportFlag,
	pub polycount: PolycountMode,
	pub max_string_len: usize,
}

impl Default for ImportCfg {
	fn default() -> Self {
		Self {
			flags: ImportFlag::default(),
			polycount: PolycountMode::default(),
			max_string_len: prim::MAX_STRING_LEN,
		}
	}
}

/// A mesh plus the sample grids attached to its LODs, keyed by (geometry, LOD)
#[derive(Clone, Debug, PartialEq)]
pub struct RefractorModel {
	pub mesh: Mesh,
	pub samples: BTreeMap<(usize, usize), Sample>,
}

impl RefractorModel {
	pub fn new(mesh: Mesh) -> RefractorModel {
		RefractorModel {
			mesh: mesh,
			samples: BTreeMap::new(),
		}
	}

	/// Attaches `sample` to a LOD of the mesh, returning the sample it replaces
	pub fn attach_sample(&mut self, geom: usize, lod: usize, sample: Sample) -> Result<Option<Sample>, RefractorError> {
		if self.mesh.lod(geom, lod).is_none() {
			return Err(RefractorError::LodIndex {
				geom: geom,
				lod: lod,
			});
		}

		Ok(self.samples.insert((geom, lod), sample))
	}

	pub fn sample(&self, geom: usize, lod: usize) -> Option<&Sample> {
		self.samples.get(&(geom, lod))
	}
}

/// Maps a sample file extension to the (geometry, LOD) it belongs to.
/// `samples` means the first LOD of the first geometry; `samp_GL` carries both indices as digits.
pub fn parse_sample_extension(ext: &str) -> Option<(usize, usize)> {
	let ext = ext.trim_start_matches('.').to_ascii_lowercase();
	if ext == "samples" {
		return Some((0, 0));
	}

	let digits = ext.strip_prefix("samp_")?.as_bytes();
	match digits {
		[g, l] if g.is_ascii_digit() && l.is_ascii_digit() => {
			Some(((g - b'0') as usize, (l - b'0') as usize))
		},
		_ => None,
	}
}

/// Reads a mesh file, picking the variant from its extension
#[cfg(feature = "import")]
pub fn read_mesh<P>(path: P, cfg: &ImportCfg) -> Result<RefractorModel, RefractorError>
where
	P: AsRef<Path>,
{
	let path = path.as_ref();
	let variant = MeshVariant::from_path(path)?;

	let mut file = BufReader::new(File::open(path)?);
	let mesh = Mesh::read(variant, cfg, &mut file)?;
	debug!("{}: {:?} mesh, {} geometries", path.display(), variant, mesh.geometries.len());

	let mut model = RefractorModel::new(mesh);
	if cfg.flags.contains(ImportFlag::LOAD_SAMPLES) {
		attach_sidecar_samples(path, &mut model)?;
	}

	Ok(model)
}

/// Scans the mesh's directory for sample files sharing its stem
#[cfg(feature = "import")]
fn attach_sidecar_samples(path: &Path, model: &mut RefractorModel) -> Result<(), RefractorError> {
	let stem = match path.file_stem().and_then(|s| s.to_str()) {
		Some(s) => s,
		None => return Ok(()),
	};

	let dir = match path.parent() {
		Some(d) if !d.as_os_str().is_empty() => d,
		_ => Path::new("."),
	};

	let mut candidates = vec![];
	for entry in fs::read_dir(dir)? {
		let candidate = entry?.path();
		let (cstem, ext) = match (candidate.file_stem().and_then(|s| s.to_str()),
			candidate.extension().and_then(|s| s.to_str())) {
			(Some(cstem), Some(ext)) => (cstem, ext.to_ascii_lowercase()),
			_ => continue,
		};

		if cstem.eq_ignore_ascii_case(stem) && ext.starts_with("samp") {
			candidates.push((candidate, ext));
		}
	}
	candidates.sort();

	for (candidate, ext) in candidates {
		let (geom, lod) = match parse_sample_extension(&ext) {
			Some(pair) => pair,
			None => {
				warn!("Skipping sample file with unrecognised extension: {}", candidate.display());
				continue;
			},
		};

		let sample = Sample::load(&candidate)?;
		match model.attach_sample(geom, lod, sample) {
			Ok(_) => debug!("Attached {} to geometry {} LOD {}", candidate.display(), geom, lod),
			Err(RefractorError::LodIndex { .. }) => {
				warn!("Skipping {}: mesh has no geometry {} LOD {}", candidate.display(), geom, lod);
			},
			Err(e) => return Err(e),
		}
	}

	Ok(())
}

#[cfg(all(test, feature = "import", feature = "export"))]
mod tests {
	use ultraviolet::vec::Vec3;

	use super::*;

	fn two_geometry_mesh() -> Mesh {
		let lod = Lod {
			version: 11,
			min: Vec3::zero(),
			max: Vec3::one(),
			pivot: None,
			node_count: 0,
			transforms: vec![],
			materials: vec![],
			polycount: 0,
		};

		Mesh {
			variant: MeshVariant::Static,
			header: Header {
				tag: 0,
				version: 11,
				..Header::default()
			},
			format_flag: 0,
			geometries: vec![
				Geometry { lods: vec![lod.clone(), lod.clone()] },
				Geometry { lods: vec![lod] },
			],
			layout: VertexLayout {
				format: 4,
				..VertexLayout::default()
			},
			vertices: vec![],
			indices: vec![],
			reserved: Some(0),
		}
	}

	fn sample(face: i32) -> Sample {
		Sample {
			signature: *b"SMP2",
			width: 1,
			height: 1,
			cells: vec![SampleCell {
				position: Vec3::zero(),
				rotation: Vec3::zero(),
				face: face,
			}],
			faces: vec![],
		}
	}

	#[test]
	fn test_parse_sample_extension() {
		assert_eq!(Some((0, 0)), parse_sample_extension(".samples"));
		assert_eq!(Some((0, 0)), parse_sample_extension("SAMPLES"));
		assert_eq!(Some((1, 0)), parse_sample_extension("samp_10"));
		assert_eq!(Some((0, 2)), parse_sample_extension(".samp_02"));
		assert_eq!(None, parse_sample_extension("samp_1"));
		assert_eq!(None, parse_sample_extension("samp_123"));
		assert_eq!(None, parse_sample_extension("samp_ab"));
		assert_eq!(None, parse_sample_extension("sampled"));
	}

	#[test]
	fn test_attach_sample() {
		let mut model = RefractorModel::new(two_geometry_mesh());

		assert!(model.attach_sample(0, 1, sample(1)).unwrap().is_none());
		assert_eq!(Some(sample(1)), model.attach_sample(0, 1, sample(2)).unwrap());
		assert_eq!(Some(&sample(2)), model.sample(0, 1));
		assert!(matches!(model.attach_sample(1, 1, sample(3)), Err(RefractorError::LodIndex { geom: 1, lod: 1 })));
		assert_eq!(None, model.sample(1, 1));
	}

	#[test]
	fn test_read_mesh_with_sidecars() {
		let dir = tempfile::tempdir().unwrap();
		let mesh = two_geometry_mesh();
		mesh.save(dir.path().join("Jeep.staticmesh")).unwrap();

		sample(10).save(dir.path().join("jeep.samples")).unwrap();
		sample(11).save(dir.path().join("jeep.samp_01")).unwrap();
		sample(12).save(dir.path().join("jeep.samp_10")).unwrap();
		sample(13).save(dir.path().join("jeep.samp_21")).unwrap(); // no such LOD
		sample(14).save(dir.path().join("jeep.samp_x")).unwrap();
		sample(15).save(dir.path().join("tank.samples")).unwrap(); // other mesh

		let cfg = ImportCfg {
			flags: ImportFlag::LOAD_SAMPLES,
			..ImportCfg::default()
		};
		let model = read_mesh(dir.path().join("Jeep.staticmesh"), &cfg).unwrap();

		assert_eq!(mesh, model.mesh);
		assert_eq!(3, model.samples.len());
		assert_eq!(Some(&sample(10)), model.sample(0, 0));
		assert_eq!(Some(&sample(11)), model.sample(0, 1));
		assert_eq!(Some(&sample(12)), model.sample(1, 0));

		let plain = read_mesh(dir.path().join("Jeep.staticmesh"), &ImportCfg::default()).unwrap();
		assert!(plain.samples.is_empty());
	}

	#[test]
	fn test_read_mesh_rejects_unknown_extension() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("Jeep.collisionmesh");
		two_geometry_mesh().save(&path).unwrap();

		assert!(matches!(read_mesh(&path, &ImportCfg::default()), Err(RefractorError::UnknownVariant(_))));
	}
}
