use gemm::{gemm, Parallelism};

/// Strides of a matrix operand, in elements.
#[derive(Clone, Copy, Debug)]
pub struct Strides {
    pub rs: isize,
    pub cs: isize,
}

impl Strides {
    /// Row-major `rows x cols`.
    #[inline]
    pub const fn row_major(cols: usize) -> Self {
        Self {
            rs: cols as _,
            cs: 1,
        }
    }

    /// A row-major `cols x rows` buffer read as its transpose.
    #[inline]
    pub const fn transposed(rows: usize) -> Self {
        Self {
            rs: 1,
            cs: rows as _,
        }
    }

    #[inline]
    fn span(&self, rows: usize, cols: usize) -> usize {
        (rows - 1) * self.rs as usize + (cols - 1) * self.cs as usize + 1
    }
}

/// c = a x b
///
/// - c: [m, n], row-major
/// - a: [m, k], row-major
/// - b: [k, n], any strides
pub fn mat_mul(c: &mut [f32], a: &[f32], b: &[f32], b_strides: Strides, (m, n, k): (usize, usize, usize)) {
    if m == 0 || n == 0 {
        return;
    }
    assert!(k > 0);
    assert!(c.len() >= m * n);
    assert!(a.len() >= m * k);
    assert!(b.len() >= b_strides.span(k, n));

    unsafe {
        gemm(
            m,
            n,
            k,
            c.as_mut_ptr(),
            1,
            n as _,
            false,
            a.as_ptr(),
            1,
            k as _,
            b.as_ptr(),
            b_strides.cs,
            b_strides.rs,
            0.,
            1.,
            false,
            false,
            false,
            Parallelism::Rayon(0),
        )
    }
}

#[test]
fn test_mat_mul() {
    let a = [
        1., 2., 3., //
        4., 5., 6., //
    ];
    let b = [
        1., 0., //
        0., 1., //
        1., 1., //
    ];
    let mut c = [0.; 4];
    mat_mul(&mut c, &a, &b, Strides::row_major(2), (2, 2, 3));
    assert_eq!(c, [4., 5., 10., 11.]);

    // same product with b stored as its transpose
    let bt = [
        1., 0., 1., //
        0., 1., 1., //
    ];
    let mut c = [0.; 4];
    mat_mul(&mut c, &a, &bt, Strides::transposed(3), (2, 2, 3));
    assert_eq!(c, [4., 5., 10., 11.]);
}
