use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::assets::AvatarImage;
use crate::assets::decode::decode_avatar;
use crate::config::AssetLocator;
use crate::foundation::error::{VizError, VizResult};

/// Produces the raw bytes of a named resource.
///
/// This is the only asynchronous boundary of the visualizer.
pub trait ImageSource {
    fn fetch(&self, name: &str) -> impl Future<Output = VizResult<Vec<u8>>>;
}

/// Reads resources from files below a root directory.
///
/// `fetch` reads the file synchronously before its future first resolves. Hosts that
/// drive `mount` on a multi-task executor should run it where blocking is allowed.
#[derive(Clone, Debug)]
pub struct FsImageSource {
    root: PathBuf,
}

impl FsImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImageSource for FsImageSource {
    async fn fetch(&self, name: &str) -> VizResult<Vec<u8>> {
        let rel = normalize_rel_path(name)?;
        let path = self.root.join(rel);
        std::fs::read(&path)
            .map_err(|e| VizError::fetch(format!("read '{}': {e}", path.display())))
    }
}

/// Serves resources from a name-to-bytes map.
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    entries: HashMap<String, Vec<u8>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(name.into(), bytes);
    }
}

impl ImageSource for InMemorySource {
    async fn fetch(&self, name: &str) -> VizResult<Vec<u8>> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| VizError::fetch(format!("no resource named '{name}'")))
    }
}

/// Loads the avatar by trying each candidate of `locator` in order.
///
/// A candidate is abandoned when its fetch or its decode fails; the first success wins
/// and later candidates are never fetched. `cancel` is checked before every fetch and
/// after every fetch completes, so a cancelled load never returns an image.
pub async fn load_avatar<S: ImageSource>(
    source: &S,
    locator: &AssetLocator,
    cancel: &CancellationToken,
) -> VizResult<AvatarImage> {
    let candidates = locator.candidates();
    if candidates.is_empty() {
        return Err(VizError::validation("asset locator lists no formats"));
    }

    let mut tried = Vec::with_capacity(candidates.len());
    for name in candidates {
        if cancel.is_cancelled() {
            return Err(VizError::Cancelled);
        }

        let fetched = source.fetch(&name).await;
        if cancel.is_cancelled() {
            return Err(VizError::Cancelled);
        }

        match fetched.and_then(|bytes| decode_avatar(&bytes)) {
            Ok(image) => {
                debug!(
                    candidate = %name,
                    width = image.width,
                    height = image.height,
                    "avatar decoded"
                );
                return Ok(image);
            }
            Err(err) => {
                debug!(candidate = %name, error = %err, "avatar candidate failed");
                tried.push(name);
            }
        }
    }

    Err(VizError::AllFormatsFailed {
        base: locator.base.clone(),
        tried,
    })
}

/// Normalize and validate source-relative resource names.
///
/// The normalized result uses `/` separators, removes `.` segments, and rejects absolute
/// paths or parent traversals (`..`).
pub fn normalize_rel_path(name: &str) -> VizResult<String> {
    let s = name.replace('\\', "/");
    if s.starts_with('/') {
        return Err(VizError::validation("resource names must be relative"));
    }
    if s.is_empty() {
        return Err(VizError::validation("resource name must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(VizError::validation(
                "resource names must not contain '..'",
            ));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(VizError::validation(
            "resource name must contain a file name",
        ));
    }
    Ok(out.join("/"))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;

    use super::*;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn locator() -> AssetLocator {
        AssetLocator {
            base: "avatar".to_string(),
            formats: vec![".webp".into(), ".png".into(), ".jpg".into()],
        }
    }

    /// Records every fetched name, optionally cancelling once a given name is fetched.
    struct RecordingSource {
        inner: InMemorySource,
        fetched: Mutex<Vec<String>>,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl RecordingSource {
        fn new(inner: InMemorySource) -> Self {
            Self {
                inner,
                fetched: Mutex::new(Vec::new()),
                cancel_on: None,
            }
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    impl ImageSource for RecordingSource {
        async fn fetch(&self, name: &str) -> VizResult<Vec<u8>> {
            self.fetched.lock().unwrap().push(name.to_string());
            if let Some((trigger, token)) = &self.cancel_on
                && trigger == name
            {
                token.cancel();
            }
            self.inner.fetch(name).await
        }
    }

    #[test]
    fn first_decodable_candidate_wins() {
        let source = RecordingSource::new(
            InMemorySource::new()
                .with("avatar.png", png_bytes(3, 4))
                .with("avatar.jpg", png_bytes(1, 1)),
        );
        let image =
            pollster::block_on(load_avatar(&source, &locator(), &CancellationToken::new()))
                .unwrap();

        assert_eq!((image.width, image.height), (3, 4));
        assert_eq!(source.fetched(), vec!["avatar.webp", "avatar.png"]);
    }

    #[test]
    fn undecodable_candidate_falls_through() {
        let source = RecordingSource::new(
            InMemorySource::new()
                .with("avatar.webp", b"not really webp".to_vec())
                .with("avatar.png", png_bytes(2, 2)),
        );
        let image =
            pollster::block_on(load_avatar(&source, &locator(), &CancellationToken::new()))
                .unwrap();
        assert_eq!(image.width, 2);
    }

    #[test]
    fn all_candidates_failing_lists_every_name() {
        let source = RecordingSource::new(InMemorySource::new());
        let err = pollster::block_on(load_avatar(&source, &locator(), &CancellationToken::new()))
            .unwrap_err();

        let VizError::AllFormatsFailed { base, tried } = err else {
            panic!("expected AllFormatsFailed");
        };
        assert_eq!(base, "avatar");
        assert_eq!(tried, vec!["avatar.webp", "avatar.png", "avatar.jpg"]);
        assert_eq!(source.fetched().len(), 3);
    }

    #[test]
    fn cancelled_before_start_fetches_nothing() {
        let source = RecordingSource::new(InMemorySource::new().with("avatar.webp", png_bytes(1, 1)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pollster::block_on(load_avatar(&source, &locator(), &cancel)).unwrap_err();
        assert!(matches!(err, VizError::Cancelled));
        assert!(source.fetched().is_empty());
    }

    #[test]
    fn cancellation_during_fetch_discards_result() {
        let cancel = CancellationToken::new();
        let mut source =
            RecordingSource::new(InMemorySource::new().with("avatar.webp", png_bytes(1, 1)));
        source.cancel_on = Some(("avatar.webp".to_string(), cancel.clone()));

        let err = pollster::block_on(load_avatar(&source, &locator(), &cancel)).unwrap_err();
        assert!(matches!(err, VizError::Cancelled));
    }

    #[test]
    fn empty_format_list_is_rejected() {
        let loc = AssetLocator {
            base: "avatar".to_string(),
            formats: vec![],
        };
        let err = pollster::block_on(load_avatar(
            &InMemorySource::new(),
            &loc,
            &CancellationToken::new(),
        ))
        .unwrap_err();
        assert!(matches!(err, VizError::Validation(_)));
    }

    #[test]
    fn fs_source_reads_below_root() {
        let dir = std::env::temp_dir().join(format!("bodyviz_fs_source_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("avatar.png"), png_bytes(5, 6)).unwrap();

        let source = FsImageSource::new(&dir);
        let image =
            pollster::block_on(load_avatar(&source, &locator(), &CancellationToken::new()))
                .unwrap();
        assert_eq!((image.width, image.height), (5, 6));

        let err = pollster::block_on(source.fetch("../escape.png")).unwrap_err();
        assert!(matches!(err, VizError::Validation(_)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn normalize_rel_path_rules() {
        assert_eq!(normalize_rel_path("a/b.png").unwrap(), "a/b.png");
        assert_eq!(normalize_rel_path("a\\b.png").unwrap(), "a/b.png");
        assert_eq!(normalize_rel_path("./a//b.png").unwrap(), "a/b.png");
        assert!(normalize_rel_path("../x.png").is_err());
        assert!(normalize_rel_path("/abs.png").is_err());
        assert!(normalize_rel_path("./").is_err());
    }
}
