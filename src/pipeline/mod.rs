//! Pipeline stages for png/jpeg/pdf conversion.
//!
//! Each submodule implements exactly one transformation step; the
//! dispatcher in [`crate::convert`] picks which of them a request runs.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──▶ encode ───────────────────────────▶ 1 image
//! input ─────┼──▶ encode ──▶ embed ─────────────────▶ 1 pdf
//! (sniff)    ├──▶ (byte copy) ──────────────────────▶ 1 pdf
//!            └──▶ engine ──▶ render ×N ──▶ archive ─▶ N images + zip
//! ```
//!
//! 1. [`input`]: wrap the uploaded bytes with their sniffed format
//! 2. [`encode`]: strict png/jpeg decode and encode
//! 3. [`engine`]: per-conversion pdfium binding, released on drop
//! 4. [`render`]: page count and page rasterisation; blocking, so async
//!    callers run it under `spawn_blocking`
//! 5. [`embed`]: one image as a one-page PDF
//! 6. [`archive`]: zip a multi-page bundle directory

pub mod archive;
pub mod embed;
pub mod encode;
pub mod engine;
pub mod input;
pub mod render;
