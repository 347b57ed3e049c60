//! Playlist handling: parsing channel entries out of M3U text while keeping
//! every original line verbatim, and reconstructing the annotated playlist
//! plus reports afterwards.

pub mod output;
pub mod parser;

pub use output::OutputComposer;
pub use parser::Playlist;
