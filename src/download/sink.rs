//! 输出落盘。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 接收 (相对路径, 字节)，负责创建目录。
pub trait PersistSink {
    fn persist(&mut self, relative: &Path, bytes: &[u8]) -> io::Result<()>;

    /// 落盘后的完整路径，用于日志。
    fn describe(&self, relative: &Path) -> PathBuf {
        relative.to_path_buf()
    }
}

/// 写入本地目录，先写 `*.jpgpart` 再改名。
pub struct DirSink {
    root: PathBuf,
    allow_overwrite: bool,
}

impl DirSink {
    pub fn new(root: impl Into<PathBuf>, allow_overwrite: bool) -> Self {
        Self {
            root: root.into(),
            allow_overwrite,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PersistSink for DirSink {
    fn persist(&mut self, relative: &Path, bytes: &[u8]) -> io::Result<()> {
        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.allow_overwrite && target.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            ));
        }
        write_atomic(&target, bytes)
    }

    fn describe(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(format!(
        "{}part",
        path.extension().and_then(|s| s.to_str()).unwrap_or("")
    ));
    fs::write(&tmp, bytes)?;
    if path.exists() {
        fs::remove_file(path)?;
    }
    fs::rename(tmp, path)
}
