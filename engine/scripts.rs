/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Page scripts evaluated through `RenderEngine::evaluate`.
//!
//! Each script evaluates to a JSON value; the registry only reads booleans.

/// True when any unmuted, unpaused media element has started playback.
pub const AUDIO_PROBE: &str = r#"(() => {
  const media = Array.from(document.querySelectorAll('video, audio'));
  return media.some((el) => !el.paused && !el.muted && el.currentTime > 0);
})()"#;

/// Play the first media element. Evaluates to whether one existed.
pub const MEDIA_PLAY: &str = r#"(() => {
  const el = document.querySelector('video, audio');
  if (!el) { return false; }
  el.play();
  return true;
})()"#;

pub const MEDIA_PAUSE: &str = r#"(() => {
  const el = document.querySelector('video, audio');
  if (!el) { return false; }
  el.pause();
  return true;
})()"#;

pub const MEDIA_TOGGLE: &str = r#"(() => {
  const el = document.querySelector('video, audio');
  if (!el) { return false; }
  if (el.paused) { el.play(); } else { el.pause(); }
  return true;
})()"#;

/// Put the first playing video into picture-in-picture. Evaluates to
/// whether a request was made.
pub const PIP_ENTER: &str = r#"(() => {
  if (!document.pictureInPictureEnabled) { return false; }
  const video = Array.from(document.querySelectorAll('video'))
    .find((v) => !v.paused && v.currentTime > 0);
  if (!video || video.disablePictureInPicture) { return false; }
  video.requestPictureInPicture().catch(() => {});
  return true;
})()"#;

pub const PIP_EXIT: &str = r#"(() => {
  if (document.pictureInPictureElement) {
    document.exitPictureInPicture().catch(() => {});
    return true;
  }
  return false;
})()"#;
