/// Packs a vector into four signed normalized bytes, x in the lowest byte.
pub fn vector_to_snorm8(v: [f32; 4]) -> u32 {
    let pack = |value: f32| -> u32 {
        let value = if value.is_nan() { 0.0 } else { value };
        ((value.clamp(-1.0, 1.0) * 127.0).round() as i8) as u8 as u32
    };
    pack(v[0]) | (pack(v[1]) << 8) | (pack(v[2]) << 16) | (pack(v[3]) << 24)
}

pub fn snorm8_to_vector(packed: u32) -> [f32; 4] {
    let unpack = |shift: u32| -> f32 { (((packed >> shift) & 0xFF) as u8 as i8) as f32 / 127.0 };
    [unpack(0), unpack(8), unpack(16), unpack(24)]
}
