//! Curve arithmetic for the legacy ec25519 point format
//!
//! Operations on the Edwards curve `486664 x^2 + y^2 = 1 + 486660 x^2 y^2`
//! over GF(2^255 - 19), which is birationally equivalent to Curve25519. The
//! legacy packed format stores the little-endian x coordinate with the parity
//! of y in the top bit; this is the 32-byte point representation Curve25519
//! implementations used before the standardised X25519 encoding.
//!
//! Field elements use 32 limbs of 8 bits, following the classic public domain
//! reference implementation. Arithmetic in the prime-order scalar group
//! ([`gf_add`], [`gf_mult`]) is delegated to `curve25519-dalek`, whose group
//! order matches.

use curve25519_dalek::scalar::Scalar;

/// Length of packed points, secrets and derived keys in bytes
pub const KEY_SIZE: usize = 32;

// x and y of the legacy base point, the image of the Curve25519 base point
// u = 9 under the birational map
const BASE_X: [u8; 32] = [
    0xd4, 0x6b, 0xfe, 0x7f, 0x39, 0xfa, 0x8c, 0x22, 0xe1, 0x96, 0x23, 0xeb, 0x26, 0xb7, 0x8e,
    0x6a, 0x34, 0x74, 0x8b, 0x66, 0xd6, 0xa3, 0x26, 0xdd, 0x19, 0x5e, 0x9f, 0x21, 0x50, 0x43,
    0x7c, 0x54,
];
const BASE_Y: [u8; 32] = [
    0x58, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
    0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
    0x66, 0x66,
];

// sqrt(-1), used to fix up the candidate root during decompression
const SQRT_M1: [u8; 32] = [
    0xb0, 0xa0, 0x0e, 0x4a, 0x27, 0x1b, 0xee, 0xc4, 0x78, 0xe4, 0x2f, 0xad, 0x06, 0x18, 0x43,
    0x2f, 0xa7, 0xd7, 0xfb, 0x3d, 0x99, 0x00, 0x4d, 0x2b, 0x0b, 0xdf, 0xc1, 0x4f, 0x80, 0x24,
    0x83, 0x2b,
];

// p - 2 and (p + 3) / 8 = 2^252 - 2, little-endian
const INVERT_EXP: [u8; 32] = [
    0xeb, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0x7f,
];
const SQRT_EXP: [u8; 32] = [
    0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0x0f,
];

const CURVE_A: u32 = 486664;
const CURVE_D: u32 = 486660;

/// An element of GF(2^255 - 19) in 32 limbs of 8 bits
#[derive(Clone, Copy)]
struct FieldElem([u32; 32]);

impl FieldElem {
    const fn zero() -> FieldElem {
        FieldElem([0; 32])
    }

    fn one() -> FieldElem {
        let mut limbs = [0u32; 32];
        limbs[0] = 1;
        FieldElem(limbs)
    }

    fn from_u32(v: u32) -> FieldElem {
        FieldElem([
            v & 0xff,
            (v >> 8) & 0xff,
            (v >> 16) & 0xff,
            (v >> 24) & 0xff,
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ])
    }

    fn from_bytes(bytes: &[u8; 32]) -> FieldElem {
        let mut limbs = [0u32; 32];
        for (limb, b) in limbs.iter_mut().zip(bytes) {
            *limb = *b as u32;
        }
        FieldElem(limbs)
    }

    /// Freezes to the canonical representative and packs little-endian.
    fn to_bytes(mut self) -> [u8; 32] {
        self.freeze();
        let mut out = [0u8; 32];
        for (b, limb) in out.iter_mut().zip(&self.0) {
            *b = *limb as u8;
        }
        out
    }

    fn squeeze(&mut self) {
        let a = &mut self.0;
        let mut u = 0u32;
        for limb in a.iter_mut().take(31) {
            u += *limb;
            *limb = u & 255;
            u >>= 8;
        }
        u += a[31];
        a[31] = u & 127;
        u = 19 * (u >> 7);
        for limb in a.iter_mut().take(31) {
            u += *limb;
            *limb = u & 255;
            u >>= 8;
        }
        a[31] += u;
    }

    fn freeze(&mut self) {
        const MINUS_P: [u32; 32] = [
            19, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 128,
        ];
        self.squeeze();
        let orig = self.0;
        let a = &mut self.0;
        let mut u = 0u32;
        for j in 0..31 {
            u += a[j] + MINUS_P[j];
            a[j] = u & 255;
            u >>= 8;
        }
        a[31] = a[31].wrapping_add(u).wrapping_add(MINUS_P[31]);
        let negative = ((a[31] >> 7) & 1).wrapping_neg();
        for (limb, orig) in a.iter_mut().zip(&orig) {
            *limb ^= negative & (*orig ^ *limb);
        }
    }

    fn add(&self, other: &FieldElem) -> FieldElem {
        let (a, b) = (&self.0, &other.0);
        let mut out = [0u32; 32];
        let mut u = 0u32;
        for j in 0..31 {
            u += a[j] + b[j];
            out[j] = u & 255;
            u >>= 8;
        }
        out[31] = u + a[31] + b[31];
        let mut r = FieldElem(out);
        r.squeeze();
        r
    }

    fn sub(&self, other: &FieldElem) -> FieldElem {
        let (a, b) = (&self.0, &other.0);
        let mut out = [0u32; 32];
        let mut u = 218u32;
        for j in 0..31 {
            u += a[j] + 65280 - b[j];
            out[j] = u & 255;
            u >>= 8;
        }
        out[31] = u + a[31] - b[31];
        let mut r = FieldElem(out);
        r.squeeze();
        r
    }

    fn mul(&self, other: &FieldElem) -> FieldElem {
        let (a, b) = (&self.0, &other.0);
        let mut out = [0u32; 32];
        for i in 0..32 {
            let mut u = 0u32;
            for j in 0..=i {
                u += a[j] * b[i - j];
            }
            for j in i + 1..32 {
                u += 38 * a[j] * b[i + 32 - j];
            }
            out[i] = u;
        }
        let mut r = FieldElem(out);
        r.squeeze();
        r
    }

    fn square(&self) -> FieldElem {
        self.mul(self)
    }

    /// Raises to the power given as little-endian bytes.
    fn pow(&self, exp: &[u8; 32]) -> FieldElem {
        let mut r = FieldElem::one();
        for byte in exp.iter().rev() {
            for bit in (0..8).rev() {
                r = r.square();
                if (byte >> bit) & 1 == 1 {
                    r = r.mul(self);
                }
            }
        }
        r
    }

    fn invert(&self) -> FieldElem {
        self.pow(&INVERT_EXP)
    }

    fn is_zero(&self) -> bool {
        self.to_bytes() == [0u8; 32]
    }

    fn equals(&self, other: &FieldElem) -> bool {
        self.to_bytes() == other.to_bytes()
    }

    fn negate(&self) -> FieldElem {
        FieldElem::zero().sub(self)
    }
}

/// A curve point in projective coordinates
#[derive(Clone, Copy)]
pub struct Point {
    x: FieldElem,
    y: FieldElem,
    z: FieldElem,
}

impl Point {
    pub fn identity() -> Point {
        Point {
            x: FieldElem::zero(),
            y: FieldElem::one(),
            z: FieldElem::one(),
        }
    }

    pub fn base() -> Point {
        Point {
            x: FieldElem::from_bytes(&BASE_X),
            y: FieldElem::from_bytes(&BASE_Y),
            z: FieldElem::one(),
        }
    }

    /// Unified Edwards addition; complete on this curve because the `a`
    /// coefficient is a square and `d` is not, so it doubles as well.
    pub fn add(&self, other: &Point) -> Point {
        let curve_a = FieldElem::from_u32(CURVE_A);
        let curve_d = FieldElem::from_u32(CURVE_D);

        let a = self.z.mul(&other.z);
        let b = a.square();
        let c = self.x.mul(&other.x);
        let d = self.y.mul(&other.y);
        let e = curve_d.mul(&c).mul(&d);
        let f = b.sub(&e);
        let g = b.add(&e);

        let mixed = self.x.add(&self.y).mul(&other.x.add(&other.y));
        let x3 = a.mul(&f).mul(&mixed.sub(&c).sub(&d));
        let y3 = a.mul(&g).mul(&d.sub(&curve_a.mul(&c)));
        let z3 = f.mul(&g);

        Point { x: x3, y: y3, z: z3 }
    }

    fn double(&self) -> Point {
        self.add(self)
    }

    /// Multiplies by the low `bits` bits of the little-endian scalar.
    pub fn scalar_mult_bits(&self, n: &[u8; 32], bits: usize) -> Point {
        let mut r = Point::identity();
        for i in (0..bits).rev() {
            r = r.double();
            if (n[i >> 3] >> (i & 7)) & 1 == 1 {
                r = r.add(self);
            }
        }
        r
    }

    pub fn scalar_mult(&self, n: &[u8; 32]) -> Point {
        self.scalar_mult_bits(n, 256)
    }

    pub fn scalar_mult_base(n: &[u8; 32]) -> Point {
        Point::base().scalar_mult(n)
    }

    pub fn is_identity(&self) -> bool {
        self.x.is_zero() && self.y.equals(&self.z)
    }

    /// Packs into the legacy format: little-endian x with the parity of y in
    /// bit 255.
    pub fn pack_legacy(&self) -> [u8; KEY_SIZE] {
        let z_inv = self.z.invert();
        let x = self.x.mul(&z_inv).to_bytes();
        let y = self.y.mul(&z_inv).to_bytes();
        let mut out = x;
        out[31] |= (y[0] & 1) << 7;
        out
    }

    /// Loads a legacy packed point, solving the curve equation for y.
    /// Returns None for values that are not the x coordinate of any point.
    pub fn unpack_legacy(packed: &[u8; KEY_SIZE]) -> Option<Point> {
        let mut x_bytes = *packed;
        let y_parity = x_bytes[31] >> 7;
        x_bytes[31] &= 0x7f;

        let x = FieldElem::from_bytes(&x_bytes);
        if x.to_bytes() != x_bytes {
            // not the canonical representative
            return None;
        }

        // y^2 = (1 - a x^2) / (1 - d x^2)
        let one = FieldElem::one();
        let x2 = x.square();
        let num = one.sub(&FieldElem::from_u32(CURVE_A).mul(&x2));
        let den = one.sub(&FieldElem::from_u32(CURVE_D).mul(&x2));
        let y2 = num.mul(&den.invert());

        let mut y = y2.pow(&SQRT_EXP);
        if !y.square().equals(&y2) {
            y = y.mul(&FieldElem::from_bytes(&SQRT_M1));
        }
        if !y.square().equals(&y2) {
            return None;
        }
        if y.to_bytes()[0] & 1 != y_parity {
            y = y.negate();
        }

        Some(Point { x, y, z: one })
    }
}

/// Clamps a 32-byte secret for use as a curve scalar.
pub fn sanitize_secret(secret: &mut [u8; KEY_SIZE]) {
    secret[0] &= 0xf8;
    secret[31] &= 0x7f;
    secret[31] |= 0x40;
}

/// Addition modulo the order of the prime-order subgroup.
pub fn gf_add(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    (Scalar::from_bytes_mod_order(*a) + Scalar::from_bytes_mod_order(*b)).to_bytes()
}

/// Multiplication modulo the order of the prime-order subgroup.
pub fn gf_mult(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    (Scalar::from_bytes_mod_order(*a) * Scalar::from_bytes_mod_order(*b)).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_point_is_on_curve() {
        // a x^2 + y^2 == 1 + d x^2 y^2
        let x2 = FieldElem::from_bytes(&BASE_X).square();
        let y2 = FieldElem::from_bytes(&BASE_Y).square();
        let lhs = FieldElem::from_u32(CURVE_A).mul(&x2).add(&y2);
        let rhs = FieldElem::one().add(&FieldElem::from_u32(CURVE_D).mul(&x2).mul(&y2));
        assert!(lhs.equals(&rhs));
    }

    #[test]
    fn addition_matches_scalar_mult() {
        let base = Point::base();
        let mut two = [0u8; 32];
        two[0] = 2;
        let mut three = [0u8; 32];
        three[0] = 3;

        let doubled = base.add(&base);
        assert_eq!(doubled.pack_legacy(), base.scalar_mult(&two).pack_legacy());
        assert_eq!(
            doubled.add(&base).pack_legacy(),
            base.scalar_mult(&three).pack_legacy()
        );
    }

    #[test]
    fn identity_is_neutral() {
        let base = Point::base();
        assert!(Point::identity().is_identity());
        assert!(!base.is_identity());
        assert_eq!(
            base.add(&Point::identity()).pack_legacy(),
            base.pack_legacy()
        );
        assert!(base.scalar_mult(&[0u8; 32]).is_identity());
    }

    #[test]
    fn pack_unpack_round_trip() {
        let mut n = [0u8; 32];
        n[0] = 0x30;
        n[7] = 0x99;
        let p = Point::scalar_mult_base(&n);
        let packed = p.pack_legacy();
        let unpacked = Point::unpack_legacy(&packed).unwrap();
        assert_eq!(unpacked.pack_legacy(), packed);
    }

    #[test]
    fn scalar_mult_bits_masks_high_bits() {
        let base = Point::base();
        let mut n = [0xffu8; 32];
        n[16..].fill(0);
        // 128-bit multiply ignores everything above bit 127
        let mut full = n;
        full[16] = 0xaa;
        assert_eq!(
            base.scalar_mult_bits(&full, 128).pack_legacy(),
            base.scalar_mult(&n).pack_legacy()
        );
    }

    #[test]
    fn gf_ops() {
        let mut two = [0u8; 32];
        two[0] = 2;
        let mut three = [0u8; 32];
        three[0] = 3;
        let mut five = [0u8; 32];
        five[0] = 5;
        let mut six = [0u8; 32];
        six[0] = 6;
        assert_eq!(gf_add(&two, &three), five);
        assert_eq!(gf_mult(&two, &three), six);
    }

    #[test]
    fn sanitize_clamps() {
        let mut secret = [0xffu8; 32];
        sanitize_secret(&mut secret);
        assert_eq!(secret[0] & 0x07, 0);
        assert_eq!(secret[31] & 0x80, 0);
        assert_eq!(secret[31] & 0x40, 0x40);
    }
}
