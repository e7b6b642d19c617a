use std::{
	env,
	path::Path,
	process
};

use rgk_models_refractor::{
	parse_sample_extension,
	read_mesh,
	ImportCfg,
	ImportFlag,
	RefractorError,
	Sample
};

fn main() -> Result<(), RefractorError> {
	env_logger::init();

	let args: Vec<String> = env::args().collect();
	if args.len() < 2 {
		eprintln!("Usage: {} <mesh or sample file>", args[0]);
		process::exit(1);
	}

	let path = Path::new(&args[1]);
	let is_sample = path.extension()
		.and_then(|e| e.to_str())
		.map_or(false, |e| parse_sample_extension(e).is_some());

	if is_sample {
		println!("{:#?}", Sample::load(path)?);
		return Ok(());
	}

	let cfg = ImportCfg {
		flags: ImportFlag::LOAD_SAMPLES,
		..ImportCfg::default()
	};
	let model = read_mesh(path, &cfg)?;

	println!("{:#?}", model);
	for (g, geom) in model.mesh.geometries.iter().enumerate() {
		for (l, lod) in geom.lods.iter().enumerate() {
			println!("geometry {} LOD {}: {} polygons", g, l, lod.polycount);
		}
	}

	Ok(())
}
