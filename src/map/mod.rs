// Moving map: projection, tile decoding and caching, zoom, rendering

pub mod png;
pub mod projection;
pub mod renderer;
pub mod tiles;
pub mod zoom;

pub use projection::TileKey;
pub use renderer::{MapRenderer, MapView};
pub use tiles::TileCache;
pub use zoom::ZoomController;
