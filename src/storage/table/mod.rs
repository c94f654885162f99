pub mod table_heap;

pub use table_heap::{HeapError, TableHeap};
