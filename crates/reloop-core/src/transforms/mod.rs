pub mod loop_demote;
pub mod loop_extract;
pub mod loop_simplify;
pub mod util;
pub mod value_namer;


pub use loop_demote::LoopDemote;
pub use loop_extract::{LoopExtract, CAPTURE_NEXT, LOOPER};
pub use loop_simplify::LoopSimplify;
pub use value_namer::ValueNamer;
