// Licensed under the Apache-2.0 license

pub fn swap32(value: u32) -> u32 {
    value.swap_bytes()
}

pub fn swap16(value: u16) -> u16 {
    value.swap_bytes()
}
