// src/pixel.rs
//
// Canonical pixel: four 8-bit channels, R,G,B,A order.

/// Map an 8-bit channel value onto [0.0, 1.0].
#[inline]
pub fn to_normalized(value: u8) -> f64 {
    value as f64 / 255.0
}

/// Map a [0.0, 1.0] value back onto 8 bits, rounding to the nearest step.
///
/// Out-of-range input is not clamped explicitly: the float-to-int cast
/// saturates, so anything below 0.0 lands on 0 and anything above 1.0 on 255.
#[inline]
pub fn from_normalized(value: f64) -> u8 {
    (value * 255.0).round() as u8
}

/// One canonical pixel.
///
/// Equality is byte-wise over all four channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Default for Rgba {
    fn default() -> Self {
        Self::new(0, 0, 0, 255)
    }
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Unpack `0xRRGGBBAA`.
    pub const fn from_u32(packed: u32) -> Self {
        let [r, g, b, a] = packed.to_be_bytes();
        Self::new(r, g, b, a)
    }

    /// Pack into `0xRRGGBBAA`.
    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes([self.r, self.g, self.b, self.a])
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Channels as `[r, g, b, a]` in [0.0, 1.0].
    pub fn to_normalized(self) -> [f64; 4] {
        [
            to_normalized(self.r),
            to_normalized(self.g),
            to_normalized(self.b),
            to_normalized(self.a),
        ]
    }

    /// Build from `[r, g, b, a]` in [0.0, 1.0]. Conversion is lossy: each
    /// channel is rounded to the nearest of 256 steps.
    pub fn from_normalized(channels: [f64; 4]) -> Self {
        Self::new(
            from_normalized(channels[0]),
            from_normalized(channels[1]),
            from_normalized(channels[2]),
            from_normalized(channels[3]),
        )
    }

    pub fn red(self) -> f64 {
        to_normalized(self.r)
    }

    pub fn green(self) -> f64 {
        to_normalized(self.g)
    }

    pub fn blue(self) -> f64 {
        to_normalized(self.b)
    }

    pub fn alpha(self) -> f64 {
        to_normalized(self.a)
    }

    pub fn set_red(&mut self, value: f64) {
        self.r = from_normalized(value);
    }

    pub fn set_green(&mut self, value: f64) {
        self.g = from_normalized(value);
    }

    pub fn set_blue(&mut self, value: f64) {
        self.b = from_normalized(value);
    }

    pub fn set_alpha(&mut self, value: f64) {
        self.a = from_normalized(value);
    }
}

impl From<[u8; 4]> for Rgba {
    fn from(bytes: [u8; 4]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Rgba> for [u8; 4] {
    fn from(px: Rgba) -> Self {
        px.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_opaque_black() {
        assert_eq!(Rgba::default(), Rgba::new(0, 0, 0, 255));
        assert_eq!(Rgba::rgb(1, 2, 3).a, 255);
    }

    #[test]
    fn normalized_endpoints() {
        assert_eq!(to_normalized(0), 0.0);
        assert_eq!(to_normalized(255), 1.0);
        assert_eq!(from_normalized(0.0), 0);
        assert_eq!(from_normalized(1.0), 255);
    }

    #[test]
    fn from_normalized_rounds() {
        // 0.5 * 255 = 127.5 -> 128
        assert_eq!(from_normalized(0.5), 128);
        // 0.498 * 255 = 126.99 -> 127, truncation would give 126
        assert_eq!(from_normalized(0.498), 127);
    }

    #[test]
    fn from_normalized_saturates_out_of_range() {
        assert_eq!(from_normalized(-0.25), 0);
        assert_eq!(from_normalized(4.0), 255);
    }

    #[test]
    fn every_byte_survives_normalized_roundtrip() {
        for v in 0..=255u8 {
            assert_eq!(from_normalized(to_normalized(v)), v);
        }
    }

    #[test]
    fn packed_u32_roundtrip() {
        let px = Rgba::from_u32(0x7F7F7FFF);
        assert_eq!(px, Rgba::new(0x7F, 0x7F, 0x7F, 0xFF));
        assert_eq!(px.to_u32(), 0x7F7F7FFF);
    }

    #[test]
    fn channel_setters() {
        let mut px = Rgba::BLACK;
        px.set_red(1.0);
        px.set_alpha(0.0);
        assert_eq!(px, Rgba::new(255, 0, 0, 0));
        assert_eq!(px.red(), 1.0);
        assert_eq!(px.to_normalized(), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(Rgba::from_normalized(px.to_normalized()), px);
    }
}
