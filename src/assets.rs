use std::sync::Arc;

pub mod decode;
pub mod loader;

/// Decoded avatar raster; shared, never mutated after decode.
#[derive(Clone, Debug)]
pub struct AvatarImage {
    pub width: u32,
    pub height: u32,
    pixmap: Arc<vello_cpu::Pixmap>,
}

impl AvatarImage {
    pub(crate) fn new(pixmap: vello_cpu::Pixmap) -> Self {
        Self {
            width: u32::from(pixmap.width()),
            height: u32::from(pixmap.height()),
            pixmap: Arc::new(pixmap),
        }
    }

    /// Premultiplied RGBA8, row-major, tightly packed.
    pub fn rgba8_premul(&self) -> &[u8] {
        self.pixmap.data_as_u8_slice()
    }

    /// Image paint sampling the avatar in its own pixel space.
    pub(crate) fn paint(&self) -> vello_cpu::Image {
        vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::clone(&self.pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        }
    }
}
