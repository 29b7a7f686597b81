//! Remote collections as observable state.

mod atom;
mod registry;
mod state;

pub use atom::ResourceAtom;
pub use registry::{Collection, Resources, Scope};
pub use state::ResourceState;
