use crate::{udim, Tensor};
use std::{fmt, ops::Deref};

macro_rules! slice {
    ($blob:expr; $width:expr; [$line:expr]) => {
        $blob[$line * $width..][..$width]
    };
}

fn write_tensor(to: &mut fmt::Formatter<'_>, buf: &[f32], shape: &[udim]) -> fmt::Result {
    match shape {
        [] => {
            writeln!(to, "<>")?;
            write_matrix(to, buf, (1, 1))
        }
        [len] => {
            writeln!(to, "<{len}>")?;
            write_matrix(to, buf, (*len as usize, 1))
        }
        [rows, cols] => {
            writeln!(to, "<{rows}x{cols}>")?;
            write_matrix(to, buf, (*rows as usize, *cols as usize))
        }
        [batch @ .., rows, cols] => {
            let (rows, cols) = (*rows as usize, *cols as usize);
            let mut strides = vec![1usize; batch.len()];
            for i in (1..batch.len()).rev() {
                strides[i - 1] = strides[i] * batch[i] as usize;
            }
            for i in 0..batch[0] as usize * strides[0] {
                let mut rem = i;
                let which = strides
                    .iter()
                    .map(|&stride| {
                        let idx = rem / stride;
                        rem %= stride;
                        idx.to_string()
                    })
                    .collect::<Vec<_>>();
                writeln!(to, "<{rows}x{cols}>[{}]", which.join(", "))?;
                write_matrix(to, &slice!(buf; rows * cols; [i]), (rows, cols))?;
            }
            Ok(())
        }
    }
}

fn write_matrix(to: &mut fmt::Formatter<'_>, buf: &[f32], shape: (usize, usize)) -> fmt::Result {
    let (rows, cols) = shape;
    for r in 0..rows {
        for it in &slice!(buf; cols; [r]) {
            write!(to, "{it:>9.3e} ")?;
        }
        writeln!(to)?;
    }
    Ok(())
}

impl<Physical: Deref<Target = [f32]>> fmt::Display for Tensor<Physical> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tensor(f, self.as_slice(), self.shape())
    }
}

#[test]
fn test_fmt() {
    let data = vec![
        0.0f32, 1., 2., 3., //
        04., 05., 06., 07., //
        08., 09., 10., 11., //
        //
        12., 13., 14., 15., //
        16., 17., 18., 19., //
        20., 21., 22., 23., //
    ];
    let t = Tensor::new(&[2, 3, 4], data);
    let text = t.to_string();
    assert!(text.starts_with("<3x4>[0]\n"));
    assert!(text.contains("<3x4>[1]\n"));
    assert_eq!(text.lines().count(), 8);

    let t = t.reshape(&[24]);
    assert!(t.to_string().starts_with("<24>\n"));
}
