/// Hash of a record name: CRC32 over the UTF-8 bytes, reinterpreted as a
/// two's-complement 32-bit value.
///
/// Flags and the actor index share this function, so a renamed actor and its
/// regenerated flags always agree on the same key.
pub fn hash_of(name: &str) -> i32 {
    crc32fast::hash(name.as_bytes()) as i32
}

/// The same hash viewed as its raw unsigned bit pattern, used for actor index ordering.
pub fn unsigned_hash_of(name: &str) -> u32 {
    hash_of(name) as u32
}
