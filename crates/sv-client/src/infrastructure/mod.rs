//! Infrastructure layer for the client application.
//!
//! **Dependency rule**: this layer may depend on `application` and `sv_core`,
//! but MUST NOT be imported by the `application` layer outside its tests.
//!
//! # Sub-modules
//!
//! - **`network`** – TLS connection to the relay (`ClientSocket`) and its
//!   blocking facade.
//! - **`io_controller`** – Screen source and input sink for the streamer:
//!   a synthetic test pattern and a recording mock.
//! - **`codec`** – `SCREEN_UPDATE` packet formats.
//! - **`display`** – Where the viewer puts decoded frames.

pub mod codec;
pub mod display;
pub mod io_controller;
pub mod network;
