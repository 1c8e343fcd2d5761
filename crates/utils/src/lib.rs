pub mod debounce;
pub mod dedupe;

pub use debounce::{Coalescer, KeyedDebounce};
pub use dedupe::{KeyedDedupe, Singleflight};
