mod fragment;
mod state;
mod track;

pub use fragment::*;
pub use state::*;
pub use track::*;
