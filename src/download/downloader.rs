//! 下载主流程编排。
//!
//! 清单 → 逐张拉取并还原 →（可选）拼页 → 编码 JPEG → 落盘。全程串行，
//! 输出顺序与清单顺序一致；任何阶段失败即中止，已写出的文件不回滚。

use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::{debug, error, info, warn};

use super::models::{ImageDescriptor, Mode, PipelineError, RunFailure, RunOutcome};
use super::progress::{
    MANIFEST_PRIMARY, MANIFEST_SECONDARY, MERGE_SPREADS, ProgressReporter, ProgressSink,
    decode_percent, page_percent, spread_percent,
};
use super::session::Session;
use super::sink::PersistSink;
use crate::base_system::context::Config;
use crate::base_system::output_paths::{page_file, spread_file, title_folder_name};
use crate::comic_parser::descrambler::{DescrambleError, Permutation, descramble};
use crate::comic_parser::raster::RasterBuffer;
use crate::comic_parser::spread::compose_right_to_left;
use crate::network_parser::manifest::ManifestFetcher;
use crate::network_parser::network::Transport;

/// 一次运行的输入。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub primary: String,
    pub secondary: Option<String>,
    pub mode: Mode,
    /// 当前页面标题，用来生成输出文件夹名。
    pub title: String,
}

impl RunRequest {
    /// 取会话中锁定的地址与模式；URL-1 未锁定时返回 `None`。
    pub fn from_session(session: &Session, title: impl Into<String>) -> Option<Self> {
        let slots = session.slots();
        Some(Self {
            primary: slots.url1?,
            secondary: slots.url2,
            mode: slots.mode,
            title: title.into(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub jpeg_quality: u8,
    pub abort_on_scramble_error: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            abort_on_scramble_error: config.abort_on_scramble_error,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 100,
            abort_on_scramble_error: true,
        }
    }
}

pub struct DownloadPipeline<'a, T: Transport + ?Sized> {
    transport: &'a T,
    options: PipelineOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, T: Transport + ?Sized> DownloadPipeline<'a, T> {
    pub fn new(transport: &'a T, options: PipelineOptions) -> Self {
        Self {
            transport,
            options,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// 执行一次下载。会话忙时直接拒绝；守卫在返回前释放。
    pub fn run(
        &self,
        session: &Session,
        request: &RunRequest,
        progress: &mut dyn ProgressSink,
        sink: &mut dyn PersistSink,
    ) -> Result<RunOutcome, RunFailure> {
        let _guard = match session.try_begin_run() {
            Ok(guard) => guard,
            Err(err) => {
                warn!(target: "download", "已有下载任务在进行，忽略本次请求");
                return Err(err.into());
            }
        };

        info!(
            target: "download",
            primary = %request.primary,
            secondary = request.secondary.as_deref().unwrap_or("-"),
            mode = %request.mode,
            "启动下载"
        );

        let mut reporter = ProgressReporter::new(progress);
        let mut persisted = 0usize;
        match self.execute(request, &mut reporter, sink, &mut persisted) {
            Ok(folder) => {
                let summary = format!("完成！{persisted} 张已保存到「{folder}」");
                reporter.finish(&summary);
                info!(target: "download", persisted, folder = %folder, "下载完成");
                Ok(RunOutcome { persisted, folder })
            }
            Err(error) => {
                if matches!(error, PipelineError::Cancelled) {
                    warn!(target: "download", persisted, "下载已取消");
                } else {
                    error!(target: "download", stage = error.stage(), persisted, "下载失败: {error}");
                }
                Err(RunFailure { error, persisted })
            }
        }
    }

    fn execute(
        &self,
        request: &RunRequest,
        reporter: &mut ProgressReporter<'_>,
        sink: &mut dyn PersistSink,
        persisted: &mut usize,
    ) -> Result<String, PipelineError> {
        let mut urls = vec![request.primary.as_str()];
        if let Some(second) = request.secondary.as_deref() {
            urls.push(second);
        }

        let descriptors = ManifestFetcher::new(self.transport).fetch_all(&urls, |i| {
            self.check_cancel()?;
            if i == 0 {
                reporter.update(MANIFEST_PRIMARY, "获取图片列表…");
            } else {
                reporter.update(MANIFEST_SECONDARY, "获取第二段图片列表…");
            }
            Ok(())
        })?;

        let folder = title_folder_name(&request.title);
        info!(target: "download", total = descriptors.len(), folder = %folder, "图片列表就绪");

        if request.mode.composes() {
            self.run_composed(&descriptors, request.mode, &folder, reporter, sink, persisted)?;
        } else {
            self.run_pages(&descriptors, &folder, reporter, sink, persisted)?;
        }
        Ok(folder)
    }

    /// 不拼页：解码一张、写出一张，同一时间只持有一张图。
    fn run_pages(
        &self,
        descriptors: &[ImageDescriptor],
        folder: &str,
        reporter: &mut ProgressReporter<'_>,
        sink: &mut dyn PersistSink,
        persisted: &mut usize,
    ) -> Result<(), PipelineError> {
        let total = descriptors.len();
        for (i, descriptor) in descriptors.iter().enumerate() {
            self.check_cancel()?;
            reporter.update(
                page_percent(i, total),
                &format!("下载并解码 {} / {}…", i + 1, total),
            );
            let Some(permutation) = self.permutation(i, descriptor)? else {
                continue;
            };
            let page = self.fetch_page(i, descriptor, &permutation)?;
            let jpeg = self.encode(&page)?;
            drop(page);
            self.persist(sink, page_file(folder, i + 1), &jpeg, persisted)?;
        }
        Ok(())
    }

    /// 拼页：先全部解码，拼好后释放源页，再逐张编码写出。
    fn run_composed(
        &self,
        descriptors: &[ImageDescriptor],
        mode: Mode,
        folder: &str,
        reporter: &mut ProgressReporter<'_>,
        sink: &mut dyn PersistSink,
        persisted: &mut usize,
    ) -> Result<(), PipelineError> {
        let total = descriptors.len();
        let mut pages = Vec::with_capacity(total);
        for (i, descriptor) in descriptors.iter().enumerate() {
            self.check_cancel()?;
            reporter.update(
                decode_percent(i, total),
                &format!("下载并解码 {} / {}…", i + 1, total),
            );
            let Some(permutation) = self.permutation(i, descriptor)? else {
                continue;
            };
            pages.push(self.fetch_page(i, descriptor, &permutation)?);
        }

        self.check_cancel()?;
        reporter.update(MERGE_SPREADS, "合并跨页…");
        let spreads = compose_right_to_left(pages, mode).map_err(|err| PipelineError::Compose {
            reason: err.to_string(),
        })?;
        let count = spreads.len();
        debug!(target: "download", pages = total, spreads = count, "跨页合并完成");

        for (i, spread) in spreads.into_iter().enumerate() {
            self.check_cancel()?;
            reporter.update(
                spread_percent(i, count),
                &format!("下载跨页 {} / {}…", i + 1, count),
            );
            let jpeg = self.encode(&spread)?;
            drop(spread);
            self.persist(sink, spread_file(folder, i + 1), &jpeg, persisted)?;
        }
        Ok(())
    }

    /// 拉图之前先校验打乱表；配置为跳过时返回 `None`。
    fn permutation(
        &self,
        index: usize,
        descriptor: &ImageDescriptor,
    ) -> Result<Option<Permutation>, PipelineError> {
        match Permutation::new(&descriptor.scramble_permutation) {
            Ok(permutation) => Ok(Some(permutation)),
            Err(err) => {
                let error = PipelineError::ScrambleFormat {
                    index: index + 1,
                    url: descriptor.source_image_url.clone(),
                    reason: err.to_string(),
                };
                if self.options.abort_on_scramble_error {
                    return Err(error);
                }
                warn!(target: "download", "跳过第 {} 张: {error}", index + 1);
                Ok(None)
            }
        }
    }

    fn fetch_page(
        &self,
        index: usize,
        descriptor: &ImageDescriptor,
        permutation: &Permutation,
    ) -> Result<RasterBuffer, PipelineError> {
        let url = &descriptor.source_image_url;
        let bytes = self.transport.get_bytes(url)?;
        let page = descramble(&bytes, permutation, descriptor.width, descriptor.height).map_err(
            |err| match err {
                DescrambleError::Decode(source) => PipelineError::ImageDecode {
                    index: index + 1,
                    url: url.clone(),
                    source,
                },
                err @ DescrambleError::DeclaredSize { .. } => PipelineError::ImageSize {
                    index: index + 1,
                    url: url.clone(),
                    reason: err.to_string(),
                },
            },
        )?;
        debug!(target: "download", index = index + 1, width = descriptor.width, height = descriptor.height, "还原完成");
        Ok(page)
    }

    fn encode(&self, raster: &RasterBuffer) -> Result<Vec<u8>, PipelineError> {
        raster
            .encode_jpeg(self.options.jpeg_quality)
            .map_err(|source| PipelineError::Encode { source })
    }

    fn persist(
        &self,
        sink: &mut dyn PersistSink,
        relative: PathBuf,
        bytes: &[u8],
        persisted: &mut usize,
    ) -> Result<(), PipelineError> {
        sink.persist(&relative, bytes)
            .map_err(|source| PipelineError::Persist {
                path: sink.describe(&relative),
                source,
            })?;
        *persisted += 1;
        debug!(target: "download", path = %relative.display(), size = bytes.len(), "已保存");
        Ok(())
    }

    fn check_cancel(&self) -> Result<(), PipelineError> {
        if self
            .cancel
            .as_ref()
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(false)
        {
            info!(target: "download", "收到停止信号，结束任务");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::session::Slot;
    use image::{ImageFormat, Rgb, RgbImage};
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io::{self, Cursor};
    use std::path::Path;

    const MARKER: &str = "/api/book/contentsInfo";
    const TITLE: &str = "第1話 | コミックグロウル";
    const IDENTITY: [i64; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

    #[derive(Default)]
    struct FakeTransport {
        texts: HashMap<String, String>,
        bytes: HashMap<String, Vec<u8>>,
        fetched: RefCell<Vec<String>>,
        cancel_after_images: Option<(usize, Arc<AtomicBool>)>,
    }

    impl FakeTransport {
        fn with_manifest(mut self, url: &str, images: &[(&str, Vec<i64>)]) -> Self {
            let result: Vec<_> = images
                .iter()
                .map(|(image, perm)| {
                    let scramble = format!("{perm:?}");
                    json!({"imageUrl": image, "scramble": scramble, "width": 8, "height": 8})
                })
                .collect();
            self.texts
                .insert(url.to_string(), json!({ "result": result }).to_string());
            for (image, _) in images {
                self.bytes.insert(image.to_string(), png(8, 8));
            }
            self
        }
    }

    impl Transport for FakeTransport {
        fn get_text(&self, url: &str) -> Result<String, PipelineError> {
            self.fetched.borrow_mut().push(url.to_string());
            self.texts.get(url).cloned().ok_or(PipelineError::Network {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
            })
        }

        fn get_bytes(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
            self.fetched.borrow_mut().push(url.to_string());
            if let Some((after, cancel)) = &self.cancel_after_images {
                let fetched = self.fetched.borrow();
                let images = fetched.iter().filter(|u| u.starts_with("https://cdn/")).count();
                if images >= *after {
                    cancel.store(true, Ordering::Relaxed);
                }
            }
            self.bytes.get(url).cloned().ok_or(PipelineError::Network {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct MemorySink {
        files: Vec<(PathBuf, Vec<u8>)>,
        fail_at: Option<usize>,
        cancel_after_first: Option<Arc<AtomicBool>>,
    }

    impl MemorySink {
        fn names(&self) -> Vec<String> {
            self.files
                .iter()
                .map(|(p, _)| p.to_string_lossy().replace('\\', "/"))
                .collect()
        }
    }

    impl PersistSink for MemorySink {
        fn persist(&mut self, relative: &Path, bytes: &[u8]) -> io::Result<()> {
            if self.fail_at == Some(self.files.len()) {
                return Err(io::Error::other("disk full"));
            }
            self.files.push((relative.to_path_buf(), bytes.to_vec()));
            if let Some(cancel) = &self.cancel_after_first {
                cancel.store(true, Ordering::Relaxed);
            }
            Ok(())
        }
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, 90]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn images(prefix: &str, n: usize) -> Vec<(String, Vec<i64>)> {
        (1..=n)
            .map(|i| (format!("https://cdn/{prefix}{i}.png"), IDENTITY.to_vec()))
            .collect()
    }

    fn borrow(list: &[(String, Vec<i64>)]) -> Vec<(&str, Vec<i64>)> {
        list.iter().map(|(u, p)| (u.as_str(), p.clone())).collect()
    }

    fn request(mode: Mode) -> RunRequest {
        RunRequest {
            primary: "https://comic-growl.com/api/book/contentsInfo?cid=1&page-to=9".into(),
            secondary: None,
            mode,
            title: TITLE.into(),
        }
    }

    fn run(
        transport: &FakeTransport,
        options: PipelineOptions,
        request: &RunRequest,
        sink: &mut MemorySink,
    ) -> (Result<RunOutcome, RunFailure>, Vec<u8>) {
        let session = Session::new(MARKER);
        let mut seen = Vec::new();
        let result = {
            let mut progress = |p: u8, _: &str| seen.push(p);
            DownloadPipeline::new(transport, options).run(&session, request, &mut progress, sink)
        };
        assert!(!session.is_busy());
        (result, seen)
    }

    fn assert_progress_contract(seen: &[u8]) {
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went back: {seen:?}");
        assert_eq!(seen.iter().filter(|&&p| p == 100).count(), 1);
        assert_eq!(seen.last(), Some(&100));
    }

    #[test]
    fn no_compose_writes_one_page_per_descriptor() {
        let req = request(Mode::NoCompose);
        let list = images("p", 4);
        let transport = FakeTransport::default().with_manifest(&req.primary, &borrow(&list));
        let mut sink = MemorySink::default();

        let (result, seen) = run(&transport, PipelineOptions::default(), &req, &mut sink);
        let outcome = result.unwrap();

        assert_eq!(outcome.persisted, 4);
        assert_eq!(outcome.folder, "第1話");
        assert_eq!(
            sink.names(),
            [
                "第1話/page_001.jpg",
                "第1話/page_002.jpg",
                "第1話/page_003.jpg",
                "第1話/page_004.jpg"
            ]
        );
        assert_progress_contract(&seen);
        assert!(seen.len() >= 5);

        let decoded = image::load_from_memory(&sink.files[0].1).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[test]
    fn cover_mode_writes_spreads() {
        let req = request(Mode::RightOpenCover);
        let list = images("p", 5);
        let transport = FakeTransport::default().with_manifest(&req.primary, &borrow(&list));
        let mut sink = MemorySink::default();

        let (result, seen) = run(&transport, PipelineOptions::default(), &req, &mut sink);

        assert_eq!(result.unwrap().persisted, 3);
        assert_eq!(
            sink.names(),
            [
                "第1話/spread_001.jpg",
                "第1話/spread_002.jpg",
                "第1話/spread_003.jpg"
            ]
        );
        assert_progress_contract(&seen);
        assert!(seen.contains(&66));

        let decoded = image::load_from_memory(&sink.files[2].1).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn second_manifest_is_appended() {
        let mut req = request(Mode::NoCompose);
        req.secondary =
            Some("https://comic-growl.com/api/book/contentsInfo?cid=2&page-to=3".into());
        let first = images("a", 2);
        let second = images("b", 1);
        let transport = FakeTransport::default()
            .with_manifest(&req.primary, &borrow(&first))
            .with_manifest(req.secondary.as_deref().unwrap(), &borrow(&second));
        let mut sink = MemorySink::default();

        let (result, seen) = run(&transport, PipelineOptions::default(), &req, &mut sink);

        assert_eq!(result.unwrap().persisted, 3);
        let images: Vec<String> = transport
            .fetched
            .borrow()
            .iter()
            .filter(|u| u.starts_with("https://cdn/"))
            .cloned()
            .collect();
        assert_eq!(
            images,
            ["https://cdn/a1.png", "https://cdn/a2.png", "https://cdn/b1.png"]
        );
        assert_eq!(seen[..2], [2, 5]);
    }

    #[test]
    fn cancel_stops_between_items_and_keeps_written_files() {
        let req = request(Mode::NoCompose);
        let list = images("p", 3);
        let transport = FakeTransport::default().with_manifest(&req.primary, &borrow(&list));
        let cancel = Arc::new(AtomicBool::new(false));
        let mut sink = MemorySink {
            cancel_after_first: Some(Arc::clone(&cancel)),
            ..Default::default()
        };

        let session = Session::new(MARKER);
        let mut progress = |_: u8, _: &str| {};
        let failure = DownloadPipeline::new(&transport, PipelineOptions::default())
            .with_cancel(cancel)
            .run(&session, &req, &mut progress, &mut sink)
            .unwrap_err();

        assert!(matches!(failure.error, PipelineError::Cancelled));
        assert_eq!(failure.persisted, 1);
        assert_eq!(sink.files.len(), 1);
        assert!(!session.is_busy());
    }

    #[test]
    fn cancel_before_merge_writes_nothing() {
        let req = request(Mode::RightOpenCover);
        let list = images("p", 3);
        let cancel = Arc::new(AtomicBool::new(false));
        let mut transport = FakeTransport::default().with_manifest(&req.primary, &borrow(&list));
        transport.cancel_after_images = Some((3, Arc::clone(&cancel)));
        let mut sink = MemorySink::default();

        let session = Session::new(MARKER);
        let mut seen = Vec::new();
        let failure = {
            let mut progress = |p: u8, _: &str| seen.push(p);
            DownloadPipeline::new(&transport, PipelineOptions::default())
                .with_cancel(cancel)
                .run(&session, &req, &mut progress, &mut sink)
                .unwrap_err()
        };

        assert!(matches!(failure.error, PipelineError::Cancelled));
        assert_eq!(failure.persisted, 0);
        assert!(sink.files.is_empty());
        assert!(seen.iter().all(|&p| p < 66), "merge started: {seen:?}");
        assert!(!session.is_busy());
    }

    #[test]
    fn cancel_during_spread_output_keeps_written_spreads() {
        let req = request(Mode::RightOpenCover);
        let list = images("p", 5);
        let transport = FakeTransport::default().with_manifest(&req.primary, &borrow(&list));
        let cancel = Arc::new(AtomicBool::new(false));
        let mut sink = MemorySink {
            cancel_after_first: Some(Arc::clone(&cancel)),
            ..Default::default()
        };

        let session = Session::new(MARKER);
        let mut progress = |_: u8, _: &str| {};
        let failure = DownloadPipeline::new(&transport, PipelineOptions::default())
            .with_cancel(cancel)
            .run(&session, &req, &mut progress, &mut sink)
            .unwrap_err();

        assert!(matches!(failure.error, PipelineError::Cancelled));
        assert_eq!(failure.persisted, 1);
        assert_eq!(sink.names(), ["第1話/spread_001.jpg"]);
        assert!(!session.is_busy());
    }

    #[test]
    fn concurrent_run_is_rejected_without_side_effects() {
        let req = request(Mode::NoCompose);
        let transport = FakeTransport::default();
        let session = Session::new(MARKER);
        let _held = session.try_begin_run().unwrap();

        let mut calls = 0;
        let mut progress = |_: u8, _: &str| calls += 1;
        let mut sink = MemorySink::default();
        let failure = DownloadPipeline::new(&transport, PipelineOptions::default())
            .run(&session, &req, &mut progress, &mut sink)
            .unwrap_err();

        assert!(matches!(failure.error, PipelineError::ConcurrentRunRejected));
        assert_eq!(failure.persisted, 0);
        assert!(transport.fetched.borrow().is_empty());
        assert_eq!(calls, 0);
        assert!(session.is_busy());
    }

    #[test]
    fn persist_failure_reports_earlier_files() {
        let req = request(Mode::NoCompose);
        let list = images("p", 3);
        let transport = FakeTransport::default().with_manifest(&req.primary, &borrow(&list));
        let mut sink = MemorySink {
            fail_at: Some(1),
            ..Default::default()
        };

        let (result, seen) = run(&transport, PipelineOptions::default(), &req, &mut sink);
        let failure = result.unwrap_err();

        assert!(matches!(failure.error, PipelineError::Persist { .. }));
        assert_eq!(failure.persisted, 1);
        assert!(!seen.contains(&100));
        assert!(failure.to_string().starts_with("[persist]"));
    }

    #[test]
    fn malformed_permutation_fails_before_fetching_the_image() {
        let req = request(Mode::NoCompose);
        let mut list = images("p", 3);
        list[1].1 = (0..15).collect();
        let transport = FakeTransport::default().with_manifest(&req.primary, &borrow(&list));
        let mut sink = MemorySink::default();

        let (result, _) = run(&transport, PipelineOptions::default(), &req, &mut sink);
        let failure = result.unwrap_err();

        match &failure.error {
            PipelineError::ScrambleFormat { index, url, .. } => {
                assert_eq!(*index, 2);
                assert_eq!(url, "https://cdn/p2.png");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(failure.persisted, 1);
        assert!(!transport.fetched.borrow().iter().any(|u| u == "https://cdn/p2.png"));
    }

    #[test]
    fn malformed_permutation_can_be_skipped() {
        let req = request(Mode::NoCompose);
        let mut list = images("p", 3);
        list[1].1[0] = 1;
        let transport = FakeTransport::default().with_manifest(&req.primary, &borrow(&list));
        let mut sink = MemorySink::default();
        let options = PipelineOptions {
            abort_on_scramble_error: false,
            ..Default::default()
        };

        let (result, seen) = run(&transport, options, &req, &mut sink);

        assert_eq!(result.unwrap().persisted, 2);
        assert_eq!(sink.names(), ["第1話/page_001.jpg", "第1話/page_003.jpg"]);
        assert_progress_contract(&seen);
    }

    #[test]
    fn missing_image_is_a_network_error_naming_the_url() {
        let req = request(Mode::RightOpenNormal);
        let list = images("p", 2);
        let mut transport = FakeTransport::default().with_manifest(&req.primary, &borrow(&list));
        transport.bytes.remove("https://cdn/p2.png");
        let mut sink = MemorySink::default();

        let (result, _) = run(&transport, PipelineOptions::default(), &req, &mut sink);
        let failure = result.unwrap_err();

        assert!(failure.to_string().contains("https://cdn/p2.png"));
        assert_eq!(failure.persisted, 0);
        assert!(sink.files.is_empty());
    }

    #[test]
    fn undecodable_image_is_a_decode_error() {
        let req = request(Mode::NoCompose);
        let list = images("p", 1);
        let mut transport = FakeTransport::default().with_manifest(&req.primary, &borrow(&list));
        transport
            .bytes
            .insert("https://cdn/p1.png".into(), b"<html>".to_vec());
        let mut sink = MemorySink::default();

        let (result, _) = run(&transport, PipelineOptions::default(), &req, &mut sink);
        assert!(matches!(
            result.unwrap_err().error,
            PipelineError::ImageDecode { index: 1, .. }
        ));
    }

    #[test]
    fn oversized_declared_size_is_rejected_with_index_and_url() {
        let req = request(Mode::RightOpenNormal);
        let list = images("p", 1);
        let mut transport = FakeTransport::default().with_manifest(&req.primary, &borrow(&list));
        let manifest = json!({"result": [{
            "imageUrl": "https://cdn/p1.png",
            "scramble": format!("{IDENTITY:?}"),
            "width": u32::MAX,
            "height": u32::MAX
        }]});
        transport.texts.insert(req.primary.clone(), manifest.to_string());
        let mut sink = MemorySink::default();

        let (result, _) = run(&transport, PipelineOptions::default(), &req, &mut sink);
        let failure = result.unwrap_err();

        match &failure.error {
            PipelineError::ImageSize { index, url, .. } => {
                assert_eq!(*index, 1);
                assert_eq!(url, "https://cdn/p1.png");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(failure.persisted, 0);
        assert!(failure.to_string().starts_with("[decode]"));
    }

    #[test]
    fn request_is_built_from_locked_slots() {
        let session = Session::new(MARKER).with_mode(Mode::RightOpenNormal);
        assert_eq!(RunRequest::from_session(&session, TITLE), None);

        session.lock_slot(Slot::Url1, "https://a");
        let req = RunRequest::from_session(&session, TITLE).unwrap();
        assert_eq!(req.primary, "https://a");
        assert_eq!(req.secondary, None);
        assert_eq!(req.mode, Mode::RightOpenNormal);
    }
}
