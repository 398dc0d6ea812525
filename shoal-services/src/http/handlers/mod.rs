//! The middleware chain: wrapping handlers transform the request on the
//! way in; the leaf resolves it against the filesystem.

mod static_files;
mod uri_decode;

pub use static_files::StaticFiles;
pub use uri_decode::{DecodedPath, UriDecode};
