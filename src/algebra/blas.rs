#![cfg_attr(rustfmt, rustfmt_skip)]
#![allow(clippy::too_many_arguments)]

// standard imports via blas-lapack-rs crates
extern crate blas_src;
extern crate lapack_src;
use lapack::*;

pub trait BlasFloatT:
    private::BlasFloatSealed
    + XgetrfScalar
    + XgetrsScalar
    + XpptrfScalar
    + XpptrsScalar
{}

impl BlasFloatT for f32 {}
impl BlasFloatT for f64 {}

mod private {
    pub trait BlasFloatSealed {}
    impl BlasFloatSealed for f32 {}
    impl BlasFloatSealed for f64 {}
}

// --------------------------------------
// ?getrf : LU factorization with partial pivoting
// --------------------------------------

pub trait XgetrfScalar: Sized {
    fn xgetrf(
        m: i32, n: i32, a: &mut [Self], lda: i32, ipiv: &mut [i32], info: &mut i32
    );
}

macro_rules! impl_blas_xgetrf {
    ($T:ty, $XGETRF:path) => {
        impl XgetrfScalar for $T {
            fn xgetrf(
                m: i32, n: i32, a: &mut [Self], lda: i32, ipiv: &mut [i32], info: &mut i32
            ) {
                unsafe{
                    $XGETRF(m, n, a, lda, ipiv, info);
                }
            }
        }
    };
}

impl_blas_xgetrf!(f32, sgetrf);
impl_blas_xgetrf!(f64, dgetrf);

// --------------------------------------
// ?getrs : solve using a computed LU factorization
// --------------------------------------

pub trait XgetrsScalar: Sized {
    fn xgetrs(
        trans: u8, n: i32, nrhs: i32, a: &[Self], lda: i32,
        ipiv: &[i32], b: &mut [Self], ldb: i32, info: &mut i32
    );
}

macro_rules! impl_blas_xgetrs {
    ($T:ty, $XGETRS:path) => {
        impl XgetrsScalar for $T {
            fn xgetrs(
                trans: u8, n: i32, nrhs: i32, a: &[Self], lda: i32,
                ipiv: &[i32], b: &mut [Self], ldb: i32, info: &mut i32
            ) {
                unsafe{
                    $XGETRS(trans, n, nrhs, a, lda, ipiv, b, ldb, info);
                }
            }
        }
    };
}

impl_blas_xgetrs!(f32, sgetrs);
impl_blas_xgetrs!(f64, dgetrs);

// --------------------------------------
// ?pptrf : Cholesky factorization, packed triangular storage
// --------------------------------------

pub trait XpptrfScalar: Sized {
    fn xpptrf(
        uplo: u8, n: i32, ap: &mut [Self], info: &mut i32
    );
}

macro_rules! impl_blas_xpptrf {
    ($T:ty, $XPPTRF:path) => {
        impl XpptrfScalar for $T {
            fn xpptrf(
                uplo: u8, n: i32, ap: &mut [Self], info: &mut i32
            ) {
                unsafe{
                    $XPPTRF(uplo, n, ap, info);
                }
            }
        }
    };
}

impl_blas_xpptrf!(f32, spptrf);
impl_blas_xpptrf!(f64, dpptrf);

// --------------------------------------
// ?pptrs : solve using a packed Cholesky factorization
// --------------------------------------

pub trait XpptrsScalar: Sized {
    fn xpptrs(
        uplo: u8, n: i32, nrhs: i32, ap: &[Self], b: &mut [Self], ldb: i32, info: &mut i32
    );
}

macro_rules! impl_blas_xpptrs {
    ($T:ty, $XPPTRS:path) => {
        impl XpptrsScalar for $T {
            fn xpptrs(
                uplo: u8, n: i32, nrhs: i32, ap: &[Self], b: &mut [Self], ldb: i32, info: &mut i32
            ) {
                unsafe{
                    $XPPTRS(uplo, n, nrhs, ap, b, ldb, info);
                }
            }
        }
    };
}

impl_blas_xpptrs!(f32, spptrs);
impl_blas_xpptrs!(f64, dpptrs);
