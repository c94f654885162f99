pub mod delete;
pub mod index_scan;
pub mod insert;
pub mod limit;
pub mod seq_scan;
pub mod sort;
pub mod top_n;
pub mod update;
pub mod values;

use byteorder::{ByteOrder, LittleEndian};

use crate::query::executor::Tuple;

/// DML executors report how many rows they touched, as a single-column
/// count tuple
pub(crate) fn count_tuple(count: i64) -> Tuple {
    let mut buf = vec![0u8; 8];
    LittleEndian::write_i64(&mut buf, count);
    buf
}

/// Sort key: the little-endian i64 at a byte offset, zero when out of range
pub(crate) fn sort_key(tuple: &[u8], offset: usize) -> i64 {
    if offset + 8 > tuple.len() {
        return 0;
    }
    LittleEndian::read_i64(&tuple[offset..offset + 8])
}
