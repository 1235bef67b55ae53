//! 交互层入口。
//!
//! 只有命令行一种交互方式。

pub mod noui;
