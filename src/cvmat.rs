//! Conversions between `image` buffers and OpenCV matrices

use crate::error::Result;
use image::{GrayImage, RgbImage};
use opencv::{core, imgproc, prelude::*};

fn to_mat(data: &[u8], width: u32, height: u32, typ: i32) -> Result<Mat> {
    let mut mat =
        Mat::new_rows_cols_with_default(height as i32, width as i32, typ, core::Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(data);
    Ok(mat)
}

fn malformed(what: &str, mat: &Mat) -> opencv::Error {
    opencv::Error::new(
        core::StsBadArg,
        format!("cannot read {}x{} matrix as {}", mat.cols(), mat.rows(), what),
    )
}

/// RGB frame as a BGR matrix, the channel order OpenCV works in
pub fn rgb_to_bgr(frame: &RgbImage) -> Result<Mat> {
    let rgb = to_mat(frame.as_raw(), frame.width(), frame.height(), core::CV_8UC3)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color(
        &rgb,
        &mut bgr,
        imgproc::COLOR_RGB2BGR,
        0,
        core::AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;
    Ok(bgr)
}

/// RGB frame reduced to one luma channel
pub fn rgb_to_gray(frame: &RgbImage) -> Result<Mat> {
    let rgb = to_mat(frame.as_raw(), frame.width(), frame.height(), core::CV_8UC3)?;
    let mut gray = Mat::default();
    imgproc::cvt_color(
        &rgb,
        &mut gray,
        imgproc::COLOR_RGB2GRAY,
        0,
        core::AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;
    Ok(gray)
}

pub fn gray_to_mat(mask: &GrayImage) -> Result<Mat> {
    to_mat(mask.as_raw(), mask.width(), mask.height(), core::CV_8UC1)
}

pub fn bgr_to_rgb(mat: &Mat) -> Result<RgbImage> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(
        mat,
        &mut rgb,
        imgproc::COLOR_BGR2RGB,
        0,
        core::AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;
    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    let bytes = rgb.data_bytes()?.to_vec();
    Ok(RgbImage::from_raw(width, height, bytes).ok_or_else(|| malformed("RGB", &rgb))?)
}

pub fn mat_to_gray(mat: &Mat) -> Result<GrayImage> {
    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let bytes = mat.data_bytes()?.to_vec();
    Ok(GrayImage::from_raw(width, height, bytes).ok_or_else(|| malformed("gray", mat))?)
}
