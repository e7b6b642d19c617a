use log::debug;

use std::{
	fmt::{
		Display,
		Formatter,
		self
	},
	io
};

use thiserror::Error;

use rgk_core::io_ext::StreamOffset;

/// Named step of the mesh or sample pipeline, in file order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
	Header,
	FormatFlag,
	GeometryTable,
	VertexLayout,
	IndexBlock,
	Reserved,
	Nodes,
	Materials,
	SampleHeader,
	SampleCells,
	SampleFaces,
}

impl Display for Stage {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let name = match self {
			Stage::Header => "header",
			Stage::FormatFlag => "format flag",
			Stage::GeometryTable => "geometry table",
			Stage::VertexLayout => "vertex layout",
			Stage::IndexBlock => "index block",
			Stage::Reserved => "reserved field",
			Stage::Nodes => "node block",
			Stage::Materials => "material block",
			Stage::SampleHeader => "sample header",
			Stage::SampleCells => "sample cells",
			Stage::SampleFaces => "sample faces",
		};

		f.write_str(name)
	}
}

/// Failure of a single field or block, before stage/offset context is attached
#[derive(Error, Debug)]
pub enum CodecError {
	#[error("Field presence does not match version/variant: {0}")]
	FieldMismatch(&'static str),
	#[error("Sample grid holds {cells} cells, expected {width}x{height}")]
	InconsistentSampleGrid {
		width: i32,
		height: i32,
		cells: usize,
	},
	#[error("Vertex stride {stride} is not a multiple of vertex format size {format}")]
	InconsistentVertexLayout {
		stride: i32,
		format: i32,
	},
	#[error("Invalid length or count: {0}")]
	InvalidLength(i64),
	#[error("I/O error")]
	IO(#[source] io::Error),
	#[error("Unexpected end of stream")]
	UnexpectedEof,
	#[error("Vertex buffer holds {found} floats, layout requires {expected}")]
	VertexBufferLength {
		expected: usize,
		found: usize,
	},
}

impl From<io::Error> for CodecError {
	fn from(e: io::Error) -> Self {
		match e.kind() {
			io::ErrorKind::UnexpectedEof => CodecError::UnexpectedEof,
			_ => CodecError::IO(e),
		}
	}
}

#[derive(Error, Debug)]
pub enum RefractorError {
	#[error("{stage} failed at byte {offset}: {kind}")]
	Codec {
		stage: Stage,
		offset: u64,
		#[source]
		kind: CodecError,
	},
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Geometry {geom} has no LOD {lod}")]
	LodIndex {
		geom: usize,
		lod: usize,
	},
	#[error("Unknown/ambiguous mesh variant: {0}")]
	UnknownVariant(String),
}

impl RefractorError {
	/// The field-level failure, if this error came out of the codec pipeline
	pub fn kind(&self) -> Option<&CodecError> {
		match self {
			RefractorError::Codec { kind, .. } => Some(kind),
			_ => None,
		}
	}

	pub fn stage(&self) -> Option<Stage> {
		match self {
			RefractorError::Codec { stage, .. } => Some(*stage),
			_ => None,
		}
	}
}

/// Runs one pipeline stage against `stream`, tagging any failure with the stage and the
/// byte offset the stream had reached when it failed.
pub(crate) fn within<S, T, F>(stage: Stage, stream: &mut S, f: F) -> Result<T, RefractorError>
where
	S: StreamOffset,
	F: FnOnce(&mut S) -> Result<T, CodecError>,
{
	debug!("{} at byte {}", stage, stream.stream_offset());

	match f(stream) {
		Ok(v) => Ok(v),
		Err(kind) => Err(RefractorError::Codec {
			stage: stage,
			offset: stream.stream_offset(),
			kind: kind,
		}),
	}
}
