#![allow(dead_code)]

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use tempfile::TempDir;

use stratadb::storage::buffer::BufferPoolManager;
use stratadb::storage::disk::DiskManager;
use stratadb::{DbConfig, Engine};

/// Initialize test logging once per binary
pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_buffer_pool(pool_size: usize, replacer_k: usize) -> (TempDir, Arc<BufferPoolManager>) {
    let dir = TempDir::new().unwrap();
    let disk = Arc::new(DiskManager::new(dir.path().join("test.db")).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, replacer_k, 4, disk));
    (dir, bpm)
}

pub fn test_engine(config: DbConfig) -> (TempDir, Engine) {
    let dir = TempDir::new().unwrap();
    let engine = Engine::new(config, dir.path().join("test.db")).unwrap();
    (dir, engine)
}

/// A tuple whose leading key column is `key`, padded with a payload byte
pub fn tuple_with_key(key: i64, payload: u8) -> Vec<u8> {
    let mut data = vec![0u8; 16];
    LittleEndian::write_i64(&mut data[0..8], key);
    data[8] = payload;
    data
}

pub fn key_of(tuple: &[u8]) -> i64 {
    LittleEndian::read_i64(&tuple[0..8])
}
