//! 图像处理模块入口。
//!
//! 负责位图缓冲、4×4 拼图还原以及右开本拼页。

pub mod descrambler;
pub mod raster;
pub mod spread;
