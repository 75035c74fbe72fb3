//! Small dense linear algebra on plain fixed-size arrays.
//!
//! Everything here is value math on `[f64; N]` vectors and `[[f64; N]; N]`
//! matrices stored as arrays of columns. The adaptation engine consumes
//! these as numeric collaborators: symmetric eigendecomposition for the
//! metric layer, Householder QR for least-squares fits, and the cubic
//! solver behind the 3x3 eigenvalue problem.

mod algebra;
mod eigen;
mod qr;

pub use algebra::*;
pub use eigen::{
    compose_eigen2, compose_eigen3, compose_ortho2, compose_ortho3, decompose_eigen2,
    decompose_eigen3, solve_cubic, CubicRoots, Eigen2, Eigen3,
};
pub use qr::{
    factorize_qr_householder, implicit_q_trans_b, implicit_q_x, solve_upper, solve_using_qr,
    QrFactors,
};
