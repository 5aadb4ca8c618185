// Host implementations of the kernels in `shaders/`.

pub mod reduce_op;
pub use reduce_op::{handle_reduce, THREADS_PER_WORKGROUP};
