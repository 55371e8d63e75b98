//! GF(2^8) arithmetic with the AES reduction polynomial x^8 + x^4 + x^3 + x + 1.
//!
//! Multiplication and inversion never branch on operand values.

use zeroize::Zeroize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Zeroize)]
pub(crate) struct Gf256(pub(crate) u8);

impl Gf256 {
    const REDUCTION: u16 = 0x11B;

    pub(crate) const ZERO: Self = Self(0);
    pub(crate) const ONE: Self = Self(1);

    #[inline]
    pub(crate) fn add(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }

    #[inline]
    pub(crate) fn mul(self, rhs: Self) -> Self {
        let mut a = u16::from(self.0);
        let mut b = rhs.0;
        let mut acc: u16 = 0;

        for _ in 0..8 {
            acc ^= a & 0u16.wrapping_sub(u16::from(b & 1));
            let carry = 0u16.wrapping_sub((a >> 7) & 1);
            a = (a << 1) ^ (Self::REDUCTION & carry);
            b >>= 1;
        }

        Self((acc & 0xFF) as u8)
    }

    /// a^254 == a^-1 for non-zero a; zero maps to zero.
    pub(crate) fn inv(self) -> Self {
        let mut result = Self::ONE;
        let mut power = self;
        // 254 = 0b1111_1110
        for _ in 1..8 {
            power = power.mul(power);
            result = result.mul(power);
        }
        result
    }

    #[inline]
    pub(crate) fn div(self, rhs: Self) -> Self {
        self.mul(rhs.inv())
    }
}
