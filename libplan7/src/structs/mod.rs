pub mod background;
pub use background::Background;

pub mod hmm;
pub use hmm::Hmm;

pub mod profile;
pub use profile::{AlignmentMode, Profile};

pub mod sequence;
pub use sequence::Sequence;
