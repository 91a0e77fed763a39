//! Vulkan mesh viewer with an ImGui overlay.
//!
//! Device memory is handed out from explicit arenas, and every frame is recorded as one render
//! pass whose subpasses are drawn by a fixed, compile-time list of passes.

pub mod app;
pub mod mesh;
pub mod renderer;
