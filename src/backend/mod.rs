//! Native graphics abstraction layer
//!
//! The renderer talks to the graphics API only through [`NativeGraphics`],
//! and to its host through [`HostCallbacks`]. [`recording`] provides
//! in-memory implementations of both.

pub mod recording;
pub mod traits;
pub mod types;

pub use traits::*;
pub use types::*;
