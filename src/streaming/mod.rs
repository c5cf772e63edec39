//! Byte-range media streaming.
//!
//! # Routes
//!
//! - `GET /media/*path` - File below the media root, with range support

mod direct;
mod range;

pub use direct::{resolve_media_path, serve_file, stream_media};
pub use range::{resolve_range, ByteRange, RangeError, RangeWindow};

use axum::{routing::get, Router};

use crate::server::AppContext;

/// Create the media streaming router.
pub fn media_router() -> Router<AppContext> {
    Router::new().route("/*path", get(stream_media))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_router_creation() {
        let _router: Router<AppContext> = media_router();
    }
}
