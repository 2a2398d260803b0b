/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crossbeam_channel::Sender;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use log::debug;

use super::Completion;
use crate::engine::{RenderEngine, SessionGeneration};
use crate::model::TabId;

/// Ask `engine` for a snapshot; the result comes back through `completion_tx`
/// tagged with `generation`.
pub(super) fn request_snapshot(
    engine: &dyn RenderEngine,
    tab: TabId,
    generation: SessionGeneration,
    max_dimension: Option<u32>,
    completion_tx: &Sender<Completion>,
) {
    let sender = completion_tx.clone();
    engine.take_snapshot(Box::new(move |result| {
        let result = result.map(|image| fit_to_max_dimension(image, max_dimension));
        if sender
            .send(Completion::Snapshot {
                tab,
                generation,
                result,
            })
            .is_err()
        {
            debug!("Snapshot for tab {tab} finished after the registry was dropped");
        }
    }));
}

/// Downscale so neither side exceeds `max_dimension`, keeping aspect ratio.
/// Smaller images pass through untouched.
pub fn fit_to_max_dimension(image: RgbaImage, max_dimension: Option<u32>) -> RgbaImage {
    let Some(max) = max_dimension.filter(|max| *max > 0) else {
        return image;
    };
    let (width, height) = image.dimensions();
    if width <= max && height <= max {
        return image;
    }
    DynamicImage::ImageRgba8(image)
        .resize(max, max, FilterType::Triangle)
        .to_rgba8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case((2048, 1024), Some(1024), (1024, 512))]
    #[case((800, 600), Some(1024), (800, 600))]
    #[case((3000, 3000), None, (3000, 3000))]
    #[case((500, 1500), Some(300), (100, 300))]
    fn snapshot_fits_within_bound(
        #[case] input: (u32, u32),
        #[case] max: Option<u32>,
        #[case] expected: (u32, u32),
    ) {
        let image = RgbaImage::new(input.0, input.1);
        assert_eq!(fit_to_max_dimension(image, max).dimensions(), expected);
    }
}
