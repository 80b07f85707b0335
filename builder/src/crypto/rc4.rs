// Licensed under the Apache-2.0 license

use crate::error::{ImageError, ImageResult};

/// RC4 keystream state.
pub struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    pub fn new(key: &[u8]) -> ImageResult<Self> {
        if key.is_empty() {
            return Err(ImageError::InvalidArgument("RC4 key must not be empty"));
        }

        let mut s = [0u8; 256];
        for (i, v) in s.iter_mut().enumerate() {
            *v = i as u8;
        }

        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }

        Ok(Self { s, i: 0, j: 0 })
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.s[self.i as usize]);
        self.s.swap(self.i as usize, self.j as usize);
        let t = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
        self.s[t as usize]
    }

    /// XORs the keystream into `data`.
    pub fn apply(&mut self, data: &mut [u8]) -> ImageResult<()> {
        if data.is_empty() {
            return Err(ImageError::InvalidArgument("RC4 data must not be empty"));
        }
        for b in data.iter_mut() {
            *b ^= self.next_byte();
        }
        Ok(())
    }
}
