mod datagram;
mod objects;
mod skip;
mod stream;

pub use datagram::*;
pub use objects::*;
pub use skip::*;
pub use stream::*;
