// lib.rs
//
// icon-engine: raster/mask compositing and geometric transforms for icons
//
// Design goals:
// - Raster and mask never disagree on size
// - Every transform maps both planes with one coordinate map
// - Failed operations leave the icon exactly as it was
// - Lazy operation lists, batch processing across icons

pub mod engine;
pub mod error;
pub mod ops;

pub use engine::{create_empty_icon, Icon, IconHandle, MaskType, PixelType};
pub use error::{IconError, Result};
pub use ops::Operation;
