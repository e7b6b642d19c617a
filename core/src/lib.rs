#[cfg(feature = "io_ext")]
pub mod io_ext;
