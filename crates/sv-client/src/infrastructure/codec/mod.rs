//! Video codecs for `SCREEN_UPDATE` payloads.
//!
//! Only the uncompressed [`raw::RawVideoCodec`] is built in. Compressed
//! codecs plug in through the same `VideoEncoder`/`VideoDecoder` traits.

pub mod raw;
