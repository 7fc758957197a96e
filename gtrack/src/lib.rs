#[cfg(feature = "core")]
#[doc(inline)]
pub use gtrack_core as core;

#[cfg(feature = "overlaprs")]
#[doc(inline)]
pub use gtrack_overlaprs as overlaprs;

#[cfg(feature = "bbi")]
#[doc(inline)]
pub use gtrack_bbi as bbi;
